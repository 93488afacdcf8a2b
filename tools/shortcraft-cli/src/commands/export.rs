//! Export a project to MP4.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use shortcraft_common::config::AppConfig;
use shortcraft_render_engine::{
    ExportProgress, Exporter, FfmpegBackend, ImageAssets, ProgressCallback, RenderError,
};

use super::{compositor, load_project};

pub async fn run(config: &AppConfig, project: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let (file, mut project) = load_project(&project)?;
    let output = output.unwrap_or_else(|| {
        file.parent()
            .map(|dir| dir.join(format!("{}.mp4", project.name)))
            .unwrap_or_else(|| PathBuf::from("export.mp4"))
    });

    for issue in project.validate_sources() {
        println!("  Warning: {issue}");
    }

    let assets = ImageAssets::load_library(project.timeline.library_mut()).await;
    let (width, height) = project.settings.dimensions();
    println!("Exporting project '{}'", project.name);
    println!("  Clips: {}", project.timeline.len());
    println!("  Duration: {:.2}s", project.timeline.total_duration());
    println!("  Format: {}x{} @ {} fps", width, height, config.render.fps);
    println!("  Output: {}", output.display());

    let backend = Arc::new(FfmpegBackend::from_config(&config.render));
    let mut exporter = Exporter::new(backend, compositor(&config.render), config.render.clone());

    let progress: ProgressCallback = Box::new(|p: ExportProgress| {
        print!(
            "\r  Progress: {:>5.1}%  {:<16} {}/{} frames",
            p.percent,
            p.stage.label(),
            p.frames_encoded,
            p.total_frames
        );
        let _ = std::io::stdout().flush();
    });

    let result = exporter
        .export(&project.timeline, &project.settings, &assets, Some(progress))
        .await;
    println!();

    let artifact = result.map_err(export_error)?;

    tokio::fs::write(&output, &artifact.bytes)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", output.display()))?;

    println!(
        "Export complete: {} ({:.1} MB, {})",
        output.display(),
        artifact.len() as f64 / (1024.0 * 1024.0),
        artifact.mime
    );
    Ok(())
}

/// Render errors already say what went wrong and at which stage.
fn export_error(err: RenderError) -> anyhow::Error {
    anyhow::anyhow!("{err}")
}
