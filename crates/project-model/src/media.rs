//! Media library: the arena that owns every ingested image and audio file.
//!
//! Files are addressed by [`MediaId`], a plain index into the arena. Ids are
//! never reused and entries are never released individually, so a clip (or an
//! in-flight render) holding an id can always resolve it for as long as the
//! library lives.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Index of a file inside a [`MediaLibrary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub usize);

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "media#{}", self.0)
    }
}

/// What a media file is used for on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
}

/// Decode/load progress of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    #[default]
    Pending,
    Loaded,
    Error,
}

/// A user-supplied asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: MediaId,

    /// Byte source on disk.
    pub path: PathBuf,

    /// Display name (the file name component of `path`).
    pub name: String,

    pub kind: MediaKind,

    /// Decoded duration in seconds. Only audio files ever carry one, and
    /// only once the duration probe has resolved.
    #[serde(default)]
    pub duration_secs: Option<f64>,

    #[serde(default)]
    pub state: LoadState,
}

impl MediaFile {
    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    pub fn is_error(&self) -> bool {
        self.state == LoadState::Error
    }
}

/// Arena of media files in ingestion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaLibrary {
    files: Vec<MediaFile>,
}

impl MediaLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest files of one kind, returning their ids in submission order.
    pub fn add_files<P: AsRef<Path>>(
        &mut self,
        paths: impl IntoIterator<Item = P>,
        kind: MediaKind,
    ) -> Vec<MediaId> {
        paths
            .into_iter()
            .map(|p| {
                let path = p.as_ref().to_path_buf();
                let id = MediaId(self.files.len());
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                self.files.push(MediaFile {
                    id,
                    path,
                    name,
                    kind,
                    duration_secs: None,
                    state: LoadState::Pending,
                });
                id
            })
            .collect()
    }

    pub fn get(&self, id: MediaId) -> Option<&MediaFile> {
        self.files.get(id.0)
    }

    /// Resolve an id only if it refers to a file of the given kind.
    pub fn get_kind(&self, id: MediaId, kind: MediaKind) -> Option<&MediaFile> {
        self.get(id).filter(|f| f.kind == kind)
    }

    /// Record a successful audio duration probe. Non-finite or non-positive
    /// durations leave the duration unset so dependents fall back to the
    /// default clip length.
    pub fn set_duration(&mut self, id: MediaId, duration_secs: f64) -> bool {
        let duration = Some(duration_secs).filter(|d| d.is_finite() && *d > 0.0);
        self.apply(id, LoadState::Loaded, duration)
    }

    pub fn mark_loaded(&mut self, id: MediaId) -> bool {
        self.apply(id, LoadState::Loaded, None)
    }

    /// A failed load keeps the file in the library; dependents render a
    /// placeholder or skip it.
    pub fn mark_error(&mut self, id: MediaId) -> bool {
        self.apply(id, LoadState::Error, None)
    }

    fn apply(&mut self, id: MediaId, state: LoadState, duration: Option<f64>) -> bool {
        let Some(file) = self.files.get_mut(id.0) else {
            return false;
        };
        file.state = state;
        if file.kind == MediaKind::Audio && duration.is_some() {
            file.duration_secs = duration;
        }
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaFile> {
        self.files.iter()
    }

    pub fn images(&self) -> impl Iterator<Item = &MediaFile> {
        self.files.iter().filter(|f| f.kind == MediaKind::Image)
    }

    pub fn audios(&self) -> impl Iterator<Item = &MediaFile> {
        self.files.iter().filter(|f| f.kind == MediaKind::Audio)
    }

    /// Files still waiting on a load or probe.
    pub fn pending(&self) -> impl Iterator<Item = &MediaFile> {
        self.files.iter().filter(|f| f.state == LoadState::Pending)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
