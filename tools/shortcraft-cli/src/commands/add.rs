//! Add media to a project and synthesize clips for new audio.

use std::path::{Path, PathBuf};

use shortcraft_project_model::MediaKind;
use shortcraft_render_engine::audio::probe_library_durations;

use super::load_project;

pub async fn run(project: PathBuf, images: Vec<PathBuf>, audio: Vec<PathBuf>) -> anyhow::Result<()> {
    if images.is_empty() && audio.is_empty() {
        anyhow::bail!("Nothing to add: pass --images and/or --audio");
    }

    let (file, mut project) = load_project(&project)?;
    let images = absolute_paths(&images)?;
    let audio = absolute_paths(&audio)?;

    let timeline = &mut project.timeline;
    let before = timeline.len();
    timeline.add_media_files(&images, MediaKind::Image);
    timeline.add_media_files(&audio, MediaKind::Audio);

    let probed = probe_library_durations(timeline.library_mut()).await;
    tracing::info!(
        images = images.len(),
        audio = audio.len(),
        probed,
        "Media added"
    );

    let timeline = &project.timeline;
    let created = &timeline.clips()[before..];
    println!("Added {} image(s) and {} audio file(s)", images.len(), audio.len());
    if created.is_empty() {
        println!("No new clips (all audio already has a clip)");
    } else {
        println!("New clips:");
        for clip in created {
            let audio_name = timeline.clip_audio(clip).map(|f| f.name.as_str()).unwrap_or("-");
            let image_name = timeline.clip_image(clip).map(|f| f.name.as_str()).unwrap_or("-");
            println!(
                "  {}  {:>6.2}s  image: {}  audio: {}  \"{}\"",
                clip.id,
                timeline.clip_duration(clip),
                image_name,
                audio_name,
                clip.subtitle
            );
        }
    }

    let failed: Vec<_> = timeline.library().iter().filter(|f| f.is_error()).collect();
    for media in &failed {
        println!("  Warning: could not read {}", media.path.display());
    }

    project
        .save(&file)
        .map_err(|e| anyhow::anyhow!("Failed to save project: {e}"))?;
    println!("Saved {}", file.display());
    Ok(())
}

fn absolute_paths(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    paths
        .iter()
        .map(|p| absolute(p))
        .collect()
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::canonicalize(path)
        .map_err(|e| anyhow::anyhow!("Media file not found: {} ({e})", path.display()))
}
