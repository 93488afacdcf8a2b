//! Render a single preview frame to PNG.

use std::path::PathBuf;

use shortcraft_common::config::AppConfig;
use shortcraft_playback::{PlaybackClock, PreviewRenderer};
use shortcraft_render_engine::ImageAssets;

use super::{compositor, load_project};

pub async fn run(
    config: &AppConfig,
    project: PathBuf,
    time: f64,
    output: PathBuf,
) -> anyhow::Result<()> {
    let (_, mut project) = load_project(&project)?;
    let assets = ImageAssets::load_library(project.timeline.library_mut()).await;

    let timeline = &project.timeline;
    let mut clock = PlaybackClock::new();
    let position = clock.seek(time, timeline.total_duration());
    let resolved = clock.resolve(timeline);

    let mut preview = PreviewRenderer::new(compositor(&config.render));
    let frame = preview.frame_at(timeline, &project.settings, &assets, position);

    frame
        .save(&output)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", output.display()))?;

    match resolved.and_then(|r| timeline.clip(r.span.clip_id)) {
        Some(clip) => println!(
            "Frame at {:.2}s ({}, clip {} of {}) written to {}",
            position,
            clip.id,
            resolved.map(|r| r.span.index + 1).unwrap_or_default(),
            timeline.len(),
            output.display()
        ),
        None => println!(
            "Timeline is empty; background frame written to {}",
            output.display()
        ),
    }
    Ok(())
}
