//! Interactive playback: clock, audio sink and preview in lockstep.

use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use shortcraft_common::clock::{Clock, SystemClock};
use shortcraft_project_model::{ClipId, ClipTimeline, ProjectSettings};
use shortcraft_render_engine::ImageAssets;

use crate::audio_sync::{audio_target, AudioSink, AudioSyncController, SyncAction};
use crate::clock::PlaybackClock;
use crate::preview::PreviewRenderer;

/// Result of one host frame.
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub position_secs: f64,
    pub clip: Option<ClipId>,
    pub frame: Arc<RgbaImage>,
    pub audio: SyncAction,
}

pub struct PlaybackSession<S, C: Clock = SystemClock> {
    clock: PlaybackClock,
    audio: AudioSyncController<S>,
    preview: PreviewRenderer<C>,
}

impl<S: AudioSink, C: Clock> PlaybackSession<S, C> {
    pub fn new(audio: AudioSyncController<S>, preview: PreviewRenderer<C>) -> Self {
        Self {
            clock: PlaybackClock::new(),
            audio,
            preview,
        }
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn audio(&self) -> &AudioSyncController<S> {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut AudioSyncController<S> {
        &mut self.audio
    }

    pub fn preview(&self) -> &PreviewRenderer<C> {
        &self.preview
    }

    pub fn toggle_play(&mut self, timeline: &ClipTimeline) -> bool {
        self.clock.toggle_play(timeline.total_duration())
    }

    /// Pausing takes effect on the sink immediately.
    pub fn pause(&mut self) {
        self.clock.pause();
        self.audio.sync(false, None);
    }

    pub fn seek(&mut self, timeline: &ClipTimeline, position_secs: f64) -> f64 {
        self.clock.seek(position_secs, timeline.total_duration())
    }

    /// Jump to the start of a clip, as clicking it in the timeline does.
    pub fn jump_to_clip(&mut self, timeline: &mut ClipTimeline, clip: ClipId) -> Option<f64> {
        let start = timeline.select(clip)?;
        Some(self.seek(timeline, start))
    }

    /// Advance the clock, resync audio and produce the frame to show.
    pub fn tick(
        &mut self,
        now: Duration,
        timeline: &ClipTimeline,
        settings: &ProjectSettings,
        assets: &ImageAssets,
    ) -> TickOutput {
        let total = timeline.total_duration();
        self.clock.clamp_to(total);
        let position_secs = self.clock.tick(now, total);
        let resolved = self.clock.resolve(timeline);

        let audio = self.audio.sync(
            self.clock.is_playing(),
            audio_target(timeline, resolved.as_ref()),
        );
        let frame = self
            .preview
            .frame_at(timeline, settings, assets, position_secs);

        TickOutput {
            position_secs,
            clip: resolved.map(|r| r.span.clip_id),
            frame,
            audio,
        }
    }
}
