//! Show project information.

use std::path::PathBuf;

use super::load_project;

pub fn run(project: PathBuf) -> anyhow::Result<()> {
    let (file, project) = load_project(&project)?;
    let settings = &project.settings;
    let timeline = &project.timeline;
    let (width, height) = settings.dimensions();

    println!("Project: {}", project.name);
    println!("  File: {}", file.display());
    println!("  Version: {}", project.version);
    println!("  Created: {}", project.created_at);
    println!("  Modified: {}", project.modified_at);
    println!();
    println!("Output:");
    println!(
        "  Aspect ratio: {} ({}x{})",
        settings.aspect_ratio.label(),
        width,
        height
    );
    println!(
        "  Guidelines: top {:.0}%, bottom {:.0}%, CTA {:.0}%",
        settings.top_guideline, settings.bottom_guideline, settings.cta_guideline
    );
    if !settings.cta_text.is_empty() {
        println!("  CTA: {}", settings.cta_text);
    }
    println!();

    let library = timeline.library();
    println!(
        "Media: {} image(s), {} audio file(s)",
        library.images().count(),
        library.audios().count()
    );

    println!("Clips: {}", timeline.len());
    for span in timeline.spans() {
        let Some(clip) = timeline.clip(span.clip_id) else {
            continue;
        };
        let image = timeline.clip_image(clip).map(|f| f.name.as_str()).unwrap_or("-");
        let audio = timeline.clip_audio(clip).map(|f| f.name.as_str()).unwrap_or("-");
        println!(
            "  {:>2}. {:>7.2}s - {:>7.2}s  image: {}  audio: {}",
            span.index + 1,
            span.start_secs,
            span.end_secs(),
            image,
            audio
        );
        if !clip.subtitle.is_empty() {
            println!("      \"{}\"", clip.subtitle);
        }
    }
    println!("Total duration: {:.2}s", timeline.total_duration());

    let missing = project.validate_sources();
    if !missing.is_empty() {
        println!();
        println!("Missing sources:");
        for issue in missing {
            println!("  {issue}");
        }
    }

    Ok(())
}
