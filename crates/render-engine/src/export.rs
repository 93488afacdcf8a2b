//! Offline export.
//!
//! One pass over the timeline: every clip's frame is composited once and
//! submitted for each of its frame slots, then the assembled audio track
//! is submitted in fixed-size chunks. Both encoders are flushed and their
//! output muxed into a single in-memory MP4.

use std::sync::Arc;

use shortcraft_common::config::RenderDefaults;
use shortcraft_common::error::{ShortcraftError, ShortcraftResult};
use shortcraft_project_model::{ClipTimeline, ProjectSettings};

use crate::assets::ImageAssets;
use crate::audio::{build_audio_track, AudioTrack};
use crate::compositor::{Compositor, FrameRequest};
use crate::encoder::{
    AudioChunk, AudioEncoder, AudioSettings, EncodedChunk, EncoderBackend, VideoFrame,
    VideoSettings,
};
use crate::pipeline::{
    audio_progress, transition, video_progress, ExportProgress, ProgressCallback, RenderError,
    RenderResult, RenderState,
};

/// A finished export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl ExportArtifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Number of frames a clip occupies, ignoring float noise just below a
/// whole frame.
pub fn clip_frame_count(duration_secs: f64, fps: u32) -> u64 {
    (duration_secs.max(0.0) * fps as f64 + 1e-9).floor() as u64
}

pub fn frame_timestamp_us(frame: u64, fps: u32) -> i64 {
    (frame as f64 / fps as f64 * 1_000_000.0).round() as i64
}

pub fn sample_timestamp_us(offset: usize, sample_rate: u32) -> i64 {
    (offset as f64 / sample_rate as f64 * 1_000_000.0).round() as i64
}

struct Reporter {
    callback: Option<ProgressCallback>,
    frames_encoded: u64,
    total_frames: u64,
}

impl Reporter {
    fn emit(&self, percent: f64, stage: RenderState) {
        if let Some(callback) = &self.callback {
            callback(ExportProgress {
                percent,
                stage,
                frames_encoded: self.frames_encoded,
                total_frames: self.total_frames,
            });
        }
    }
}

/// Drives export runs and owns the render state.
pub struct Exporter {
    backend: Arc<dyn EncoderBackend>,
    compositor: Compositor,
    defaults: RenderDefaults,
    state: RenderState,
}

impl Exporter {
    pub fn new(
        backend: Arc<dyn EncoderBackend>,
        compositor: Compositor,
        defaults: RenderDefaults,
    ) -> Self {
        Self {
            backend,
            compositor,
            defaults,
            state: RenderState::Idle,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn backend(&self) -> &dyn EncoderBackend {
        self.backend.as_ref()
    }

    /// Checks that must pass before any work starts.
    pub fn check_preconditions(&self, timeline: &ClipTimeline) -> RenderResult<()> {
        if timeline.is_empty() {
            return Err(RenderError::precondition("the timeline has no clips"));
        }
        if !timeline.has_audio() {
            return Err(RenderError::precondition("no clip has audio"));
        }
        if !self.backend.is_available() {
            return Err(RenderError::unsupported(format!(
                "encoder backend '{}' is not available",
                self.backend.name()
            )));
        }
        Ok(())
    }

    /// Render the whole timeline to an MP4.
    ///
    /// On failure everything produced so far is discarded and the state
    /// becomes [`RenderState::Failed`]; calling again starts over.
    pub async fn export(
        &mut self,
        timeline: &ClipTimeline,
        settings: &ProjectSettings,
        assets: &ImageAssets,
        progress: Option<ProgressCallback>,
    ) -> RenderResult<ExportArtifact> {
        self.check_preconditions(timeline)?;
        self.state = transition(self.state, RenderState::Initializing)?;

        let fps = self.defaults.fps.max(1);
        let mut reporter = Reporter {
            callback: progress,
            frames_encoded: 0,
            total_frames: timeline
                .spans()
                .iter()
                .map(|span| clip_frame_count(span.duration_secs, fps))
                .sum(),
        };
        tracing::info!(
            clips = timeline.len(),
            duration_secs = timeline.total_duration(),
            frames = reporter.total_frames,
            backend = self.backend.name(),
            "Starting export"
        );
        reporter.emit(0.0, RenderState::Initializing);

        match self.run(timeline, settings, assets, &mut reporter).await {
            Ok(artifact) => {
                self.state = transition(self.state, RenderState::Done)?;
                reporter.emit(100.0, RenderState::Done);
                tracing::info!(bytes = artifact.len(), mime = artifact.mime, "Export complete");
                Ok(artifact)
            }
            Err(err) => {
                let stage = self.state;
                self.state = transition(stage, RenderState::Failed)?;
                reporter.emit(0.0, RenderState::Failed);
                tracing::error!(stage = %stage, error = %err, "Export failed");
                Err(RenderError::failed(stage, err))
            }
        }
    }

    fn enter(&mut self, next: RenderState) -> ShortcraftResult<()> {
        self.state = transition(self.state, next)
            .map_err(|e| ShortcraftError::render(e.to_string()))?;
        Ok(())
    }

    async fn run(
        &mut self,
        timeline: &ClipTimeline,
        settings: &ProjectSettings,
        assets: &ImageAssets,
        reporter: &mut Reporter,
    ) -> ShortcraftResult<ExportArtifact> {
        let fps = self.defaults.fps.max(1);
        let (width, height) = settings.dimensions();

        let audio = build_audio_track(timeline).await?;
        let video_settings = VideoSettings {
            width,
            height,
            fps,
            bitrate: self.defaults.video_bitrate,
            keyframe_interval_frames: self.defaults.keyframe_interval_secs.max(1) * fps,
        };
        let audio_settings = AudioSettings {
            format: audio.format,
            bitrate: self.defaults.audio_bitrate,
        };
        let mut video_encoder = self.backend.video_encoder(&video_settings)?;
        let mut audio_encoder = self.backend.audio_encoder(&audio_settings)?;
        let mut muxer = self.backend.muxer();
        let mut video_chunks = Vec::new();
        let mut audio_chunks = Vec::new();

        self.enter(RenderState::EncodingVideo)?;
        let spans = timeline.spans();
        let frame_duration_us = (1_000_000.0 / fps as f64).round() as i64;
        let keyframe_interval = video_settings.keyframe_interval_frames as u64;
        let mut counter: u64 = 0;
        for span in &spans {
            let clip = timeline.clip(span.clip_id).ok_or_else(|| {
                ShortcraftError::render(format!("{} vanished during export", span.clip_id))
            })?;
            let request = FrameRequest {
                image: assets.clip_image(timeline.library(), clip),
                subtitle: &clip.subtitle,
            };
            // Nothing in a frame varies within a clip.
            let image = Arc::new(self.compositor.render_frame(settings, &request));

            let frames = clip_frame_count(span.duration_secs, fps);
            for _ in 0..frames {
                let frame = VideoFrame {
                    image: Arc::clone(&image),
                    timestamp_us: frame_timestamp_us(counter, fps),
                    duration_us: frame_duration_us,
                    keyframe: counter % keyframe_interval == 0,
                };
                video_chunks.extend(video_encoder.encode(&frame).await?);
                counter += 1;
            }
            reporter.frames_encoded = counter;
            tracing::debug!(clip = %span.clip_id, frames, "Clip frames submitted");
            reporter.emit(
                video_progress(span.index + 1, spans.len()),
                RenderState::EncodingVideo,
            );
        }

        self.enter(RenderState::EncodingAudio)?;
        self.submit_audio(&audio, audio_encoder.as_mut(), &mut audio_chunks, reporter)
            .await?;

        self.enter(RenderState::Finalizing)?;
        reporter.emit(100.0, RenderState::Finalizing);
        video_chunks.extend(video_encoder.flush().await?);
        audio_chunks.extend(audio_encoder.flush().await?);

        let video_config = video_encoder
            .config()
            .ok_or_else(|| ShortcraftError::render("video encoder produced no decoder config"))?;
        let audio_config = audio_encoder
            .config()
            .ok_or_else(|| ShortcraftError::render("audio encoder produced no decoder config"))?;
        muxer.set_video_config(video_config);
        muxer.set_audio_config(audio_config);
        for chunk in video_chunks {
            muxer.add_video_chunk(chunk)?;
        }
        for chunk in audio_chunks {
            muxer.add_audio_chunk(chunk)?;
        }

        Ok(ExportArtifact {
            bytes: muxer.finalize()?,
            mime: muxer.mime_type(),
        })
    }

    async fn submit_audio(
        &self,
        audio: &AudioTrack,
        encoder: &mut dyn AudioEncoder,
        chunks: &mut Vec<EncodedChunk>,
        reporter: &mut Reporter,
    ) -> ShortcraftResult<()> {
        let chunk_frames = self.defaults.audio_chunk_frames.max(1);
        let total = audio.frames();
        let mut offset = 0;
        while offset < total {
            let frames = chunk_frames.min(total - offset);
            let chunk = AudioChunk {
                format: audio.format,
                frames,
                planar: audio.planar_chunk(offset, frames),
                timestamp_us: sample_timestamp_us(offset, audio.format.sample_rate),
            };
            chunks.extend(encoder.encode(&chunk).await?);
            offset += frames;
            reporter.emit(audio_progress(offset, total), RenderState::EncodingAudio);
        }
        tracing::debug!(frames = total, "Audio submitted");
        Ok(())
    }
}
