//! Timeline clips.

use serde::{Deserialize, Serialize};

use crate::media::MediaId;

/// Duration given to a clip whose audio is missing or has no known length.
pub const FALLBACK_CLIP_DURATION_SECS: f64 = 1.0;

/// Stable clip identifier, unique within one timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(pub u64);

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "clip#{}", self.0)
    }
}

/// One timeline unit pairing an image, an audio track, and a subtitle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    #[serde(default)]
    pub image: Option<MediaId>,
    #[serde(default)]
    pub audio: Option<MediaId>,
    /// May embed `[color]` and `[bg_opacity]` tags.
    #[serde(default)]
    pub subtitle: String,
}

/// Where a clip sits on the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipSpan {
    pub index: usize,
    pub clip_id: ClipId,
    pub start_secs: f64,
    pub duration_secs: f64,
}

impl ClipSpan {
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }
}

/// The clip owning a timeline position, and the offset into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPosition {
    pub span: ClipSpan,
    pub offset_secs: f64,
}
