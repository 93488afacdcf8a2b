//! In-memory MP4 muxer for one H.264 video track and one AAC audio track.
//!
//! Samples are buffered until [`Mp4Muxer::finalize`], which lays the file
//! out as `ftyp`, `moov`, `mdat` so players can start without seeking to
//! the end.

pub mod atoms;
pub mod mp4;

use shortcraft_common::error::{ShortcraftError, ShortcraftResult};
use thiserror::Error;

use crate::encoder::{AudioTrackConfig, EncodedChunk, Muxer, VideoTrackConfig};
use atoms::{micros_to_ticks, VIDEO_TIMESCALE};
use mp4::{SampleTable, Track, TrackMedia};

#[derive(Error, Debug)]
pub enum MuxError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid muxer config: {0}")]
    InvalidConfig(String),

    #[error("Track error: {0}")]
    TrackError(String),

    #[error("Buffer full: {0}")]
    BufferFull(String),
}

pub type MuxResult<T> = Result<T, MuxError>;

impl From<MuxError> for ShortcraftError {
    fn from(err: MuxError) -> Self {
        ShortcraftError::render(format!("MP4 mux failed: {err}"))
    }
}

pub const MP4_MIME_TYPE: &str = "video/mp4";

#[derive(Debug, Default)]
pub struct Mp4Muxer {
    video_config: Option<VideoTrackConfig>,
    audio_config: Option<AudioTrackConfig>,
    video: Vec<EncodedChunk>,
    audio: Vec<EncodedChunk>,
    finalized: bool,
}

impl Mp4Muxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn video_samples(&self) -> usize {
        self.video.len()
    }

    pub fn audio_samples(&self) -> usize {
        self.audio.len()
    }

    fn push(&mut self, kind: &str, chunk: EncodedChunk) -> MuxResult<()> {
        if self.finalized {
            return Err(MuxError::TrackError("muxer already finalized".into()));
        }
        let samples = if kind == "video" {
            &mut self.video
        } else {
            &mut self.audio
        };
        if let Some(last) = samples.last() {
            if chunk.timestamp_us <= last.timestamp_us {
                return Err(MuxError::TrackError(format!(
                    "{kind} sample at {}us does not follow {}us",
                    chunk.timestamp_us, last.timestamp_us
                )));
            }
        }
        samples.push(chunk);
        Ok(())
    }

    fn build(&mut self) -> MuxResult<Vec<u8>> {
        if self.finalized {
            return Err(MuxError::TrackError("muxer already finalized".into()));
        }
        let video_config = self
            .video_config
            .clone()
            .ok_or_else(|| MuxError::InvalidConfig("video track config not set".into()))?;
        if self.video.is_empty() {
            return Err(MuxError::InvalidConfig("no video samples".into()));
        }
        if !self.audio.is_empty() && self.audio_config.is_none() {
            return Err(MuxError::InvalidConfig("audio track config not set".into()));
        }

        let mut payload_len = 0u64;
        let mut tracks = vec![Track {
            id: 1,
            timescale: VIDEO_TIMESCALE,
            media: TrackMedia::Video(video_config),
            samples: sample_table(&self.video, VIDEO_TIMESCALE, &mut payload_len, true)?,
        }];
        if let Some(config) = self.audio_config.clone().filter(|_| !self.audio.is_empty()) {
            let timescale = config.sample_rate;
            tracks.push(Track {
                id: 2,
                timescale,
                media: TrackMedia::Audio(config),
                samples: sample_table(&self.audio, timescale, &mut payload_len, false)?,
            });
        }

        let mut head = Vec::new();
        mp4::write_ftyp(&mut head)?;
        // Measure moov first; its size does not depend on the offsets it holds.
        let mut probe = Vec::new();
        mp4::write_moov(&mut probe, &tracks, 0)?;
        let payload_start = (head.len() + probe.len() + 8) as u64;
        mp4::write_moov(&mut head, &tracks, payload_start)?;
        mp4::write_mdat_header(&mut head, payload_len)?;

        let mut file = head;
        file.reserve(payload_len as usize);
        for chunk in self.video.iter().chain(self.audio.iter()) {
            file.extend_from_slice(&chunk.data);
        }
        self.finalized = true;

        tracing::info!(
            video_samples = self.video.len(),
            audio_samples = self.audio.len(),
            bytes = file.len(),
            "MP4 finalized"
        );
        Ok(file)
    }
}

/// Sample table for chunks laid out back to back from `*cursor`, which is
/// advanced past them.
fn sample_table(
    chunks: &[EncodedChunk],
    timescale: u32,
    cursor: &mut u64,
    with_sync: bool,
) -> MuxResult<SampleTable> {
    let origin = chunks.first().map(|c| c.timestamp_us).unwrap_or(0);
    let ticks = |us: i64| micros_to_ticks(us - origin, timescale);

    let mut table = SampleTable::default();
    let mut sync = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let start = ticks(chunk.timestamp_us);
        let end = match chunks.get(i + 1) {
            Some(next) => ticks(next.timestamp_us),
            None => start + micros_to_ticks(chunk.duration_us, timescale),
        };
        let size = u32::try_from(chunk.data.len())
            .map_err(|_| MuxError::BufferFull(format!("sample {i} exceeds 32-bit size")))?;

        table
            .durations
            .push(end.saturating_sub(start).min(u32::MAX as u64) as u32);
        table.sizes.push(size);
        table.offsets.push(*cursor);
        *cursor += size as u64;
        if chunk.keyframe {
            sync.push(i as u32 + 1);
        }
    }
    if with_sync {
        table.sync = Some(sync);
    }
    Ok(table)
}

impl Muxer for Mp4Muxer {
    fn set_video_config(&mut self, config: VideoTrackConfig) {
        self.video_config = Some(config);
    }

    fn set_audio_config(&mut self, config: AudioTrackConfig) {
        self.audio_config = Some(config);
    }

    fn add_video_chunk(&mut self, chunk: EncodedChunk) -> ShortcraftResult<()> {
        Ok(self.push("video", chunk)?)
    }

    fn add_audio_chunk(&mut self, chunk: EncodedChunk) -> ShortcraftResult<()> {
        Ok(self.push("audio", chunk)?)
    }

    fn finalize(&mut self) -> ShortcraftResult<Vec<u8>> {
        Ok(self.build()?)
    }

    fn mime_type(&self) -> &'static str {
        MP4_MIME_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_config() -> VideoTrackConfig {
        VideoTrackConfig {
            width: 1080,
            height: 1920,
            sps: vec![0x67, 0x42, 0xC0, 0x1F],
            pps: vec![0x68, 0xCE],
        }
    }

    fn chunk(data: &[u8], timestamp_us: i64, duration_us: i64, keyframe: bool) -> EncodedChunk {
        EncodedChunk {
            data: data.to_vec(),
            timestamp_us,
            duration_us,
            keyframe,
        }
    }

    fn top_level_boxes(file: &[u8]) -> Vec<(String, usize)> {
        let mut boxes = Vec::new();
        let mut pos = 0;
        while pos + 8 <= file.len() {
            let size = u32::from_be_bytes([file[pos], file[pos + 1], file[pos + 2], file[pos + 3]])
                as usize;
            boxes.push((String::from_utf8_lossy(&file[pos + 4..pos + 8]).into_owned(), size));
            pos += size;
        }
        boxes
    }

    fn first_chunk_offsets(file: &[u8]) -> Vec<usize> {
        file.windows(4)
            .enumerate()
            .filter(|(_, w)| *w == b"stco")
            .map(|(pos, _)| {
                let entry = pos + 12;
                u32::from_be_bytes([file[entry], file[entry + 1], file[entry + 2], file[entry + 3]])
                    as usize
            })
            .collect()
    }

    #[test]
    fn test_finalize_layout() {
        let mut muxer = Mp4Muxer::new();
        muxer.set_video_config(video_config());
        muxer.set_audio_config(AudioTrackConfig {
            sample_rate: 48_000,
            channels: 2,
            audio_specific_config: vec![0x11, 0x90],
        });
        muxer.add_video_chunk(chunk(&[0xA1; 5], 0, 33_333, true)).unwrap();
        muxer.add_video_chunk(chunk(&[0xA2; 3], 33_333, 33_333, false)).unwrap();
        muxer.add_audio_chunk(chunk(&[0xB1; 4], 0, 21_333, true)).unwrap();

        let file = muxer.finalize().unwrap();
        let boxes = top_level_boxes(&file);
        let names: Vec<&str> = boxes.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["ftyp", "moov", "mdat"]);
        assert_eq!(boxes.iter().map(|(_, s)| s).sum::<usize>(), file.len());
        assert_eq!(muxer.mime_type(), "video/mp4");

        // Each track's first chunk offset points at its first sample.
        let offsets = first_chunk_offsets(&file);
        assert_eq!(offsets.len(), 2);
        assert_eq!(&file[offsets[0]..offsets[0] + 5], &[0xA1; 5]);
        assert_eq!(&file[offsets[1]..offsets[1] + 4], &[0xB1; 4]);
    }

    #[test]
    fn test_sync_samples_follow_keyframes() {
        let chunks = vec![
            chunk(&[1], 0, 33_333, true),
            chunk(&[2], 33_333, 33_333, false),
            chunk(&[3], 66_667, 33_333, true),
        ];
        let mut cursor = 10;
        let table = sample_table(&chunks, VIDEO_TIMESCALE, &mut cursor, true).unwrap();
        assert_eq!(table.sync, Some(vec![1, 3]));
        assert_eq!(table.durations, vec![3_000, 3_000, 3_000]);
        assert_eq!(table.offsets, vec![10, 11, 12]);
        assert_eq!(cursor, 13);
    }

    #[test]
    fn test_rejects_non_increasing_timestamps() {
        let mut muxer = Mp4Muxer::new();
        muxer.add_video_chunk(chunk(&[1], 100, 10, true)).unwrap();
        assert!(muxer.add_video_chunk(chunk(&[2], 100, 10, false)).is_err());
        // Tracks are independent.
        muxer.add_audio_chunk(chunk(&[3], 0, 10, true)).unwrap();
        assert_eq!(muxer.video_samples(), 1);
        assert_eq!(muxer.audio_samples(), 1);
    }

    #[test]
    fn test_finalize_requires_video() {
        let mut muxer = Mp4Muxer::new();
        assert!(muxer.finalize().is_err());

        muxer.set_video_config(video_config());
        assert!(muxer.finalize().is_err());

        muxer.add_video_chunk(chunk(&[1], 0, 33_333, true)).unwrap();
        muxer.add_audio_chunk(chunk(&[2], 0, 21_333, true)).unwrap();
        // Audio samples without a config.
        assert!(muxer.finalize().is_err());
    }

    #[test]
    fn test_finalize_only_once() {
        let mut muxer = Mp4Muxer::new();
        muxer.set_video_config(video_config());
        muxer.add_video_chunk(chunk(&[1], 0, 33_333, true)).unwrap();
        muxer.finalize().unwrap();
        assert!(muxer.finalize().is_err());
        assert!(muxer.add_video_chunk(chunk(&[2], 40_000, 33_333, false)).is_err());
    }
}
