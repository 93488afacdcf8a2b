//! Decoded image assets.
//!
//! Images are decoded once, ahead of compositing, and the outcome is
//! written back to the media library as the file's load state. A decode
//! failure is never fatal: the compositor draws a placeholder instead.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;
use shortcraft_common::error::{ShortcraftError, ShortcraftResult};
use shortcraft_project_model::{Clip, LoadState, MediaId, MediaKind, MediaLibrary};

use crate::compositor::ClipImage;

/// Decode an image file into RGBA.
pub fn load_image(path: impl AsRef<Path>) -> ShortcraftResult<RgbaImage> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ShortcraftError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let decoded = image::open(path)
        .map_err(|e| ShortcraftError::media(format!("Failed to decode {}: {e}", path.display())))?;
    Ok(decoded.to_rgba8())
}

/// Decoded images keyed by media id.
#[derive(Debug, Clone, Default)]
pub struct ImageAssets {
    images: HashMap<MediaId, Arc<RgbaImage>>,
}

impl ImageAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: MediaId, image: RgbaImage) {
        self.images.insert(id, Arc::new(image));
    }

    pub fn get(&self, id: MediaId) -> Option<&Arc<RgbaImage>> {
        self.images.get(&id)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Decode every image in the library on the blocking pool, marking
    /// each file `Loaded` or `Error`.
    pub async fn load_library(library: &mut MediaLibrary) -> Self {
        let jobs: Vec<_> = library
            .images()
            .map(|f| {
                let id = f.id;
                let path = f.path.clone();
                (id, tokio::task::spawn_blocking(move || load_image(path)))
            })
            .collect();

        let mut assets = Self::new();
        for (id, job) in jobs {
            let outcome = match job.await {
                Ok(result) => result,
                Err(e) => Err(ShortcraftError::media(format!("Image decode task failed: {e}"))),
            };
            assets.record(library, id, outcome);
        }
        tracing::info!(
            loaded = assets.len(),
            total = library.images().count(),
            "Image assets decoded"
        );
        assets
    }

    fn record(&mut self, library: &mut MediaLibrary, id: MediaId, outcome: ShortcraftResult<RgbaImage>) {
        match outcome {
            Ok(image) => {
                self.insert(id, image);
                library.mark_loaded(id);
            }
            Err(e) => {
                tracing::warn!(media = %id, error = %e, "Image failed to load");
                library.mark_error(id);
            }
        }
    }

    /// What the compositor should draw for a clip's image slot.
    pub fn clip_image<'a>(&'a self, library: &MediaLibrary, clip: &Clip) -> ClipImage<'a> {
        let Some(id) = clip.image else {
            return ClipImage::None;
        };
        let Some(file) = library.get_kind(id, MediaKind::Image) else {
            return ClipImage::None;
        };
        match file.state {
            LoadState::Error => ClipImage::Broken,
            LoadState::Pending => ClipImage::Pending,
            LoadState::Loaded => match self.images.get(&id) {
                Some(image) => ClipImage::Loaded(image.as_ref()),
                None => ClipImage::Pending,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use shortcraft_project_model::ClipTimeline;

    #[tokio::test]
    async fn test_load_library_marks_states() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]))
            .save(&good)
            .unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"not an image").unwrap();

        let mut timeline = ClipTimeline::new();
        let ids = timeline.add_media_files([&good, &bad], MediaKind::Image);
        let assets = ImageAssets::load_library(timeline.library_mut()).await;

        assert_eq!(assets.len(), 1);
        assert!(timeline.library().get(ids[0]).unwrap().is_loaded());
        assert!(timeline.library().get(ids[1]).unwrap().is_error());
    }

    #[test]
    fn test_clip_image_states() {
        let mut timeline = ClipTimeline::new();
        let ids = timeline.add_media_files(["a.png", "b.png", "c.png"], MediaKind::Image);
        let clip = timeline.add_clip();

        let mut assets = ImageAssets::new();
        assets.insert(ids[0], RgbaImage::new(2, 2));
        timeline.library_mut().mark_loaded(ids[0]);
        timeline.library_mut().mark_error(ids[1]);

        let image_for = |timeline: &ClipTimeline, assets: &ImageAssets| {
            let clip = timeline.clip(clip).unwrap();
            match assets.clip_image(timeline.library(), clip) {
                ClipImage::None => "none",
                ClipImage::Pending => "pending",
                ClipImage::Loaded(_) => "loaded",
                ClipImage::Broken => "broken",
            }
        };

        assert_eq!(image_for(&timeline, &assets), "none");
        timeline.reassign_image(clip, Some(ids[0]));
        assert_eq!(image_for(&timeline, &assets), "loaded");
        timeline.reassign_image(clip, Some(ids[1]));
        assert_eq!(image_for(&timeline, &assets), "broken");
        timeline.reassign_image(clip, Some(ids[2]));
        assert_eq!(image_for(&timeline, &assets), "pending");
    }
}
