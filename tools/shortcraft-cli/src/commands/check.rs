//! Check system capabilities.

use shortcraft_common::config::AppConfig;
use shortcraft_render_engine::{EncoderBackend, FfmpegBackend, RustTypeRasterizer};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Shortcraft System Check");
    println!("=======================");
    println!();
    println!("Platform: {} / {}", std::env::consts::OS, std::env::consts::ARCH);
    println!();

    let backend = FfmpegBackend::from_config(&config.render);
    let encoder_ok = backend.is_available();
    println!(
        "Encoder ({}): {}",
        backend.binary(),
        if encoder_ok { "OK" } else { "NOT FOUND" }
    );
    if !encoder_ok {
        println!("  Export needs ffmpeg with libx264 and the native AAC encoder.");
    }

    match RustTypeRasterizer::discover(config.render.font_path.as_deref()) {
        Ok(font) => println!(
            "Font: OK ({})",
            font.source()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "embedded".to_string())
        ),
        Err(e) => {
            println!("Font: NOT FOUND ({e})");
            println!("  Text will be drawn as blocks. Set render.font_path in the config.");
        }
    }

    println!();
    println!(
        "Render defaults: {} fps, video {} kbps, audio {} kbps, keyframe every {}s",
        config.render.fps,
        config.render.video_bitrate / 1000,
        config.render.audio_bitrate / 1000,
        config.render.keyframe_interval_secs
    );
    println!(
        "Playback: drift tolerance {:.2}s",
        config.playback.drift_tolerance_secs
    );

    if encoder_ok {
        println!();
        println!("System is ready for export.");
    }
    Ok(())
}
