//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Offline render parameters.
    pub render: RenderDefaults,

    /// Interactive playback parameters.
    pub playback: PlaybackDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    /// Output frame rate.
    pub fps: u32,

    /// H.264 target bitrate in bits per second.
    pub video_bitrate: u32,

    /// AAC target bitrate in bits per second.
    pub audio_bitrate: u32,

    /// Samples per submitted audio chunk (one AAC frame).
    pub audio_chunk_frames: usize,

    /// Seconds between forced keyframes.
    pub keyframe_interval_secs: u32,

    /// Name or path of the ffmpeg executable used by the encoder backend.
    pub ffmpeg_binary: String,

    /// TrueType font used for overlay text. Falls back to well-known
    /// system locations when unset.
    pub font_path: Option<PathBuf>,
}

/// Default playback parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackDefaults {
    /// Audio drift (seconds) tolerated before the sink is re-seeked.
    pub drift_tolerance_secs: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "shortcraft=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            video_bitrate: 5_000_000,
            audio_bitrate: 128_000,
            audio_chunk_frames: 1024,
            keyframe_interval_secs: 2,
            ffmpeg_binary: "ffmpeg".to_string(),
            font_path: None,
        }
    }
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            drift_tolerance_secs: 0.25,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("shortcraft").join("config.json")
}
