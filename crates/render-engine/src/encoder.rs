//! Encoder and muxer contracts.
//!
//! The export pipeline submits raw frames and PCM chunks in presentation
//! order, collects the encoded chunks each encoder hands back, and feeds
//! them to a muxer. Backends provide concrete encoders; the MP4 muxer is
//! shared by all of them unless a backend overrides it.

use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;
use shortcraft_common::error::{ShortcraftError, ShortcraftResult};

use crate::audio::AudioFormat;
use crate::mux::Mp4Muxer;

/// One raw video frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Shared so consecutive identical frames cost nothing to submit.
    pub image: Arc<RgbaImage>,
    pub timestamp_us: i64,
    pub duration_us: i64,
    /// Request a keyframe at this frame.
    pub keyframe: bool,
}

/// A block of PCM samples, planar: all of channel 0, then channel 1, ...
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub format: AudioFormat,
    pub frames: usize,
    pub planar: Vec<f32>,
    pub timestamp_us: i64,
}

impl AudioChunk {
    /// Samples re-interleaved frame by frame.
    pub fn interleaved(&self) -> Vec<f32> {
        let ch = self.format.channels as usize;
        let mut out = Vec::with_capacity(self.frames * ch);
        for f in 0..self.frames {
            for c in 0..ch {
                out.push(self.planar.get(c * self.frames + f).copied().unwrap_or(0.0));
            }
        }
        out
    }
}

/// One encoded access unit (video) or frame (audio).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Container-ready payload: length-prefixed NAL units for H.264, raw
    /// AAC frames for audio.
    pub data: Vec<u8>,
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub keyframe: bool,
}

/// Decoder configuration for an H.264 track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTrackConfig {
    pub width: u32,
    pub height: u32,
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
}

/// Decoder configuration for an AAC track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrackConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// MPEG-4 AudioSpecificConfig.
    pub audio_specific_config: Vec<u8>,
}

/// Parameters for creating a video encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate: u32,
    pub keyframe_interval_frames: u32,
}

/// Parameters for creating an audio encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSettings {
    pub format: AudioFormat,
    pub bitrate: u32,
}

#[async_trait]
pub trait VideoEncoder: Send {
    /// Submit a frame. Returns any chunks that became available.
    async fn encode(&mut self, frame: &VideoFrame) -> ShortcraftResult<Vec<EncodedChunk>>;

    /// Drain the encoder. Returns the remaining chunks.
    async fn flush(&mut self) -> ShortcraftResult<Vec<EncodedChunk>>;

    /// Decoder configuration, known once the first keyframe was produced.
    fn config(&self) -> Option<VideoTrackConfig>;
}

#[async_trait]
pub trait AudioEncoder: Send {
    async fn encode(&mut self, chunk: &AudioChunk) -> ShortcraftResult<Vec<EncodedChunk>>;

    async fn flush(&mut self) -> ShortcraftResult<Vec<EncodedChunk>>;

    fn config(&self) -> Option<AudioTrackConfig>;
}

/// Combines one video and one audio track into a container.
pub trait Muxer: Send {
    fn set_video_config(&mut self, config: VideoTrackConfig);

    fn set_audio_config(&mut self, config: AudioTrackConfig);

    fn add_video_chunk(&mut self, chunk: EncodedChunk) -> ShortcraftResult<()>;

    fn add_audio_chunk(&mut self, chunk: EncodedChunk) -> ShortcraftResult<()>;

    /// Write the finished container.
    fn finalize(&mut self) -> ShortcraftResult<Vec<u8>>;

    /// MIME type of the finished container.
    fn mime_type(&self) -> &'static str;
}

/// A family of encoders plus the muxer that packages their output.
pub trait EncoderBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this backend can run on this machine.
    fn is_available(&self) -> bool;

    fn video_encoder(&self, settings: &VideoSettings) -> ShortcraftResult<Box<dyn VideoEncoder>>;

    fn audio_encoder(&self, settings: &AudioSettings) -> ShortcraftResult<Box<dyn AudioEncoder>>;

    fn muxer(&self) -> Box<dyn Muxer> {
        Box::new(Mp4Muxer::new())
    }
}

/// Rejects timestamps that do not strictly increase.
#[derive(Debug, Clone, Default)]
pub struct TimestampGuard {
    last: Option<i64>,
}

impl TimestampGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, kind: &str, timestamp_us: i64) -> ShortcraftResult<()> {
        if let Some(last) = self.last {
            if timestamp_us <= last {
                return Err(ShortcraftError::render(format!(
                    "{kind} timestamp {timestamp_us}us does not follow {last}us"
                )));
            }
        }
        self.last = Some(timestamp_us);
        Ok(())
    }

    pub fn last(&self) -> Option<i64> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_guard_rejects_repeats() {
        let mut guard = TimestampGuard::new();
        guard.check("video", 0).unwrap();
        guard.check("video", 33_333).unwrap();
        assert!(guard.check("video", 33_333).is_err());
        assert!(guard.check("video", 10).is_err());
        assert_eq!(guard.last(), Some(33_333));
    }

    #[test]
    fn test_audio_chunk_interleaves_planar() {
        let chunk = AudioChunk {
            format: AudioFormat {
                sample_rate: 48_000,
                channels: 2,
            },
            frames: 3,
            planar: vec![1.0, 2.0, 3.0, -1.0, -2.0, -3.0],
            timestamp_us: 0,
        };
        assert_eq!(chunk.interleaved(), vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
    }
}
