//! Project documents.
//!
//! Two shapes live here: the local `project.json` that captures an editing
//! session (settings, media, clips) so it can be rebuilt, and the storage
//! backend's short document, whose only field the editor relies on is
//! `images`, a list of permanent image URLs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::settings::ProjectSettings;
use crate::timeline::ClipTimeline;

/// Local session file (`project.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Schema version.
    pub version: String,

    /// Human-readable project name.
    pub name: String,

    /// Creation timestamp (ISO 8601).
    pub created_at: String,

    /// Last modified timestamp (ISO 8601).
    pub modified_at: String,

    #[serde(default)]
    pub settings: ProjectSettings,

    /// Media library and clip order.
    #[serde(default)]
    pub timeline: ClipTimeline,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            version: "1.0".to_string(),
            name: name.into(),
            created_at: now.clone(),
            modified_at: now,
            settings: ProjectSettings::default(),
            timeline: ClipTimeline::new(),
        }
    }

    /// Load a project file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ProjectError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ProjectError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write the project file, stamping `modified_at`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ProjectError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        self.modified_at = chrono::Utc::now().to_rfc3339();
        let json = serde_json::to_string_pretty(self).map_err(|e| ProjectError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| ProjectError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Create a new project file. Fails if one already exists.
    pub fn create(path: impl AsRef<Path>, name: impl Into<String>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        if path.exists() {
            return Err(ProjectError::ValidationError {
                message: format!("project already exists at {}", path.display()),
            });
        }
        let mut project = Self::new(name);
        project.save(path)?;
        Ok(project)
    }

    /// Report media files that no longer exist on disk.
    pub fn validate_sources(&self) -> Vec<String> {
        self.timeline
            .library()
            .iter()
            .filter(|f| !f.path.exists())
            .map(|f| format!("{:?} source missing: {}", f.kind, f.path.display()))
            .collect()
    }
}

/// A short as stored by the CRUD backend.
///
/// Unknown fields are carried through untouched so the document can be
/// written back in the shape it was read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortDocument {
    #[serde(default)]
    pub images: Vec<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An entry of a short's image list before it is saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Already stored; a permanent URL.
    Remote(String),
    /// Added locally, not yet uploaded.
    Local(PathBuf),
}

/// Upload endpoint for image files.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Upload files, returning one permanent URL per file in submission
    /// order.
    async fn upload(&self, files: &[PathBuf]) -> Result<Vec<String>, ProjectError>;
}

/// Resolve every image source to a permanent URL, uploading local files in
/// a single batch. Order is preserved.
///
/// The uploader must return exactly one URL per submitted file.
pub async fn publish_images(
    sources: &[ImageSource],
    uploader: &dyn ImageUploader,
) -> Result<Vec<String>, ProjectError> {
    let locals: Vec<PathBuf> = sources
        .iter()
        .filter_map(|s| match s {
            ImageSource::Local(path) => Some(path.clone()),
            ImageSource::Remote(_) => None,
        })
        .collect();

    let mut uploaded = if locals.is_empty() {
        Vec::new().into_iter()
    } else {
        let urls = uploader.upload(&locals).await?;
        if urls.len() != locals.len() {
            return Err(ProjectError::UploadMismatch {
                submitted: locals.len(),
                returned: urls.len(),
            });
        }
        tracing::info!(count = urls.len(), "Uploaded local images");
        urls.into_iter()
    };

    Ok(sources
        .iter()
        .map(|s| match s {
            ImageSource::Remote(url) => url.clone(),
            ImageSource::Local(_) => uploaded.next().unwrap_or_default(),
        })
        .collect())
}

impl ShortDocument {
    /// Replace the image list after publishing `sources`. On failure the
    /// document is left unchanged.
    pub async fn publish_images(
        &mut self,
        sources: &[ImageSource],
        uploader: &dyn ImageUploader,
    ) -> Result<(), ProjectError> {
        self.images = publish_images(sources, uploader).await?;
        Ok(())
    }
}

/// Errors that can occur when working with projects.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid project: {message}")]
    ValidationError { message: String },

    #[error("Upload failed: {message}")]
    UploadFailed { message: String },

    #[error("Upload returned {returned} URLs for {submitted} files")]
    UploadMismatch { submitted: usize, returned: usize },
}
