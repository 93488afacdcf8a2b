//! Preview frames for the clip under the playhead.
//!
//! A frame depends only on the clip, its image state and the settings, so
//! composited frames are cached per clip and reused until any input
//! changes or the entry expires.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::Duration;
use image::RgbaImage;
use shortcraft_common::clock::{Clock, SystemClock};
use shortcraft_common::store::ExpiringStore;
use shortcraft_project_model::{Clip, ClipId, ClipTimeline, ProjectSettings};
use shortcraft_render_engine::compositor::BACKGROUND_COLOR;
use shortcraft_render_engine::{ClipImage, Compositor, FrameRequest, ImageAssets};

/// How long an unused preview frame stays cached.
pub const DEFAULT_FRAME_TTL_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FrameKey {
    clip: ClipId,
    inputs: u64,
}

pub struct PreviewRenderer<C: Clock = SystemClock> {
    compositor: Compositor,
    frames: ExpiringStore<FrameKey, Arc<RgbaImage>, C>,
    ttl: Duration,
    renders: usize,
}

impl PreviewRenderer<SystemClock> {
    pub fn new(compositor: Compositor) -> Self {
        Self::with_clock(
            compositor,
            SystemClock,
            Duration::seconds(DEFAULT_FRAME_TTL_SECS),
        )
    }
}

impl<C: Clock> PreviewRenderer<C> {
    pub fn with_clock(compositor: Compositor, clock: C, ttl: Duration) -> Self {
        Self {
            compositor,
            frames: ExpiringStore::with_clock(clock),
            ttl,
            renders: 0,
        }
    }

    /// Frames composited so far (cache misses).
    pub fn renders(&self) -> usize {
        self.renders
    }

    pub fn cached_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn invalidate(&mut self) {
        self.frames.clear();
    }

    /// Frame at a timeline position. Without clips the frame is the bare
    /// background.
    pub fn frame_at(
        &mut self,
        timeline: &ClipTimeline,
        settings: &ProjectSettings,
        assets: &ImageAssets,
        position_secs: f64,
    ) -> Arc<RgbaImage> {
        let clip = timeline
            .resolve(position_secs)
            .and_then(|resolved| timeline.clip(resolved.span.clip_id));
        match clip {
            Some(clip) => self.frame_for_clip(timeline, settings, assets, clip),
            None => {
                let (width, height) = settings.dimensions();
                Arc::new(RgbaImage::from_pixel(width, height, BACKGROUND_COLOR))
            }
        }
    }

    pub fn frame_for_clip(
        &mut self,
        timeline: &ClipTimeline,
        settings: &ProjectSettings,
        assets: &ImageAssets,
        clip: &Clip,
    ) -> Arc<RgbaImage> {
        let image = assets.clip_image(timeline.library(), clip);
        let key = FrameKey {
            clip: clip.id,
            inputs: fingerprint(settings, clip, &image),
        };
        if let Some(frame) = self.frames.get(&key) {
            return Arc::clone(frame);
        }

        let request = FrameRequest {
            image,
            subtitle: &clip.subtitle,
        };
        let frame = Arc::new(self.compositor.render_frame(settings, &request));
        self.renders += 1;
        self.frames.purge_expired();
        self.frames
            .insert_with_ttl(key, Arc::clone(&frame), self.ttl);
        tracing::trace!(clip = %clip.id, "Preview frame composited");
        frame
    }
}

fn fingerprint(settings: &ProjectSettings, clip: &Clip, image: &ClipImage<'_>) -> u64 {
    let mut hasher = DefaultHasher::new();
    // Settings hold floats, so hash their serialized form.
    serde_json::to_string(settings)
        .unwrap_or_default()
        .hash(&mut hasher);
    clip.subtitle.hash(&mut hasher);
    clip.image.hash(&mut hasher);
    let state: u8 = match image {
        ClipImage::None => 0,
        ClipImage::Pending => 1,
        ClipImage::Loaded(_) => 2,
        ClipImage::Broken => 3,
    };
    state.hash(&mut hasher);
    hasher.finish()
}
