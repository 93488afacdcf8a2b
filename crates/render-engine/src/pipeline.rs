//! Render state machine, errors and progress reporting.

use serde::{Deserialize, Serialize};
use shortcraft_common::error::ShortcraftError;

/// Stage of an export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderState {
    Idle,
    Initializing,
    EncodingVideo,
    EncodingAudio,
    Finalizing,
    Done,
    Failed,
}

impl RenderState {
    /// Whether a run is in progress.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::EncodingVideo | Self::EncodingAudio | Self::Finalizing
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::EncodingVideo => "encoding video",
            Self::EncodingAudio => "encoding audio",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Validate a state change. Runs start from `Idle`, `Done` or `Failed`;
/// any active stage may fail.
pub fn transition(from: RenderState, to: RenderState) -> RenderResult<RenderState> {
    use RenderState::*;

    let allowed = match (from, to) {
        (Idle | Done | Failed, Initializing) => true,
        (Initializing, EncodingVideo) => true,
        (EncodingVideo, EncodingAudio) => true,
        (EncodingAudio, Finalizing) => true,
        (Finalizing, Done) => true,
        (stage, Failed) => stage.is_active(),
        _ => false,
    };
    if allowed {
        Ok(to)
    } else {
        Err(RenderError::InvalidTransition { from, to })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Cannot export: {0}")]
    Precondition(String),

    #[error("Export not supported here: {0}")]
    Unsupported(String),

    #[error("Invalid render transition: {from} -> {to}")]
    InvalidTransition { from: RenderState, to: RenderState },

    #[error("Export failed while {stage}: {source}")]
    Failed {
        stage: RenderState,
        #[source]
        source: ShortcraftError,
    },
}

pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn failed(stage: RenderState, source: impl Into<ShortcraftError>) -> Self {
        Self::Failed {
            stage,
            source: source.into(),
        }
    }

    /// Raised before any work started; nothing was produced.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_) | Self::Unsupported(_))
    }
}

/// Progress report for an export run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportProgress {
    /// Overall progress in `[0, 100]`.
    pub percent: f64,
    pub stage: RenderState,
    pub frames_encoded: u64,
    pub total_frames: u64,
}

/// Progress callback for export runs.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Video takes the first half, advancing per finished clip.
pub fn video_progress(clips_done: usize, clip_count: usize) -> f64 {
    if clip_count == 0 {
        return 50.0;
    }
    (clips_done as f64 / clip_count as f64 * 50.0).clamp(0.0, 50.0)
}

/// Audio takes the second half, advancing per submitted chunk.
pub fn audio_progress(frames_done: usize, total_frames: usize) -> f64 {
    if total_frames == 0 {
        return 100.0;
    }
    50.0 + (frames_done as f64 / total_frames as f64 * 50.0).clamp(0.0, 50.0)
}
