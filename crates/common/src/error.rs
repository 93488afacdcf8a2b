//! Error types shared across Shortcraft crates.

use std::path::PathBuf;

/// Top-level error type for Shortcraft operations.
#[derive(Debug, thiserror::Error)]
pub enum ShortcraftError {
    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Media error: {message}")]
    Media { message: String },

    #[error("Project error: {message}")]
    Project { message: String },

    #[error("Playback error: {message}")]
    Playback { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ShortcraftError.
pub type ShortcraftResult<T> = Result<T, ShortcraftError>;

impl ShortcraftError {
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media {
            message: msg.into(),
        }
    }

    pub fn project(msg: impl Into<String>) -> Self {
        Self::Project {
            message: msg.into(),
        }
    }

    pub fn playback(msg: impl Into<String>) -> Self {
        Self::Playback {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error was raised before any work started
    /// (missing capability or an invalid timeline).
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. } | Self::Unsupported { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShortcraftError::precondition("no clips");
        assert_eq!(err.to_string(), "Precondition failed: no clips");
        assert!(err.is_precondition());
        assert!(!ShortcraftError::render("boom").is_precondition());
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ShortcraftError = io.into();
        assert!(matches!(err, ShortcraftError::Io(_)));
    }
}
