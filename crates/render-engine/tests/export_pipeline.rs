//! End-to-end export runs against recording fake encoders.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shortcraft_common::config::RenderDefaults;
use shortcraft_common::error::{ShortcraftError, ShortcraftResult};
use shortcraft_project_model::{ClipTimeline, MediaKind, ProjectSettings};
use shortcraft_render_engine::encoder::{
    AudioChunk, AudioEncoder, AudioSettings, AudioTrackConfig, EncodedChunk, EncoderBackend,
    VideoEncoder, VideoFrame, VideoSettings, VideoTrackConfig,
};
use shortcraft_render_engine::{
    BlockRasterizer, Compositor, ExportProgress, Exporter, ImageAssets, RenderError, RenderState,
};

const RATE: u32 = 8_000;

#[derive(Debug, Default)]
struct Recorded {
    video_timestamps: Vec<i64>,
    keyframes: Vec<bool>,
    audio_timestamps: Vec<i64>,
    audio_frames: usize,
    /// First channel of every submitted chunk, in order.
    audio_samples: Vec<f32>,
}

struct FakeBackend {
    available: bool,
    fail_video: Arc<AtomicBool>,
    recorded: Arc<Mutex<Recorded>>,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            available: true,
            fail_video: Arc::new(AtomicBool::new(false)),
            recorded: Arc::new(Mutex::new(Recorded::default())),
        }
    }
}

struct FakeVideo {
    settings: VideoSettings,
    fail: Arc<AtomicBool>,
    recorded: Arc<Mutex<Recorded>>,
}

#[async_trait]
impl VideoEncoder for FakeVideo {
    async fn encode(&mut self, frame: &VideoFrame) -> ShortcraftResult<Vec<EncodedChunk>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ShortcraftError::render("encoder crashed"));
        }
        assert_eq!(frame.image.dimensions(), (self.settings.width, self.settings.height));
        let mut recorded = self.recorded.lock().unwrap();
        recorded.video_timestamps.push(frame.timestamp_us);
        recorded.keyframes.push(frame.keyframe);
        Ok(vec![EncodedChunk {
            data: vec![0, 0, 0, 1, if frame.keyframe { 0x65 } else { 0x41 }],
            timestamp_us: frame.timestamp_us,
            duration_us: frame.duration_us,
            keyframe: frame.keyframe,
        }])
    }

    async fn flush(&mut self) -> ShortcraftResult<Vec<EncodedChunk>> {
        Ok(Vec::new())
    }

    fn config(&self) -> Option<VideoTrackConfig> {
        Some(VideoTrackConfig {
            width: self.settings.width,
            height: self.settings.height,
            sps: vec![0x67, 0x42, 0xC0, 0x1F],
            pps: vec![0x68, 0xCE],
        })
    }
}

struct FakeAudio {
    settings: AudioSettings,
    recorded: Arc<Mutex<Recorded>>,
}

#[async_trait]
impl AudioEncoder for FakeAudio {
    async fn encode(&mut self, chunk: &AudioChunk) -> ShortcraftResult<Vec<EncodedChunk>> {
        assert_eq!(chunk.format, self.settings.format);
        assert_eq!(chunk.planar.len(), chunk.frames * chunk.format.channels as usize);
        let mut recorded = self.recorded.lock().unwrap();
        recorded.audio_timestamps.push(chunk.timestamp_us);
        recorded.audio_frames += chunk.frames;
        recorded
            .audio_samples
            .extend_from_slice(&chunk.planar[..chunk.frames]);
        Ok(vec![EncodedChunk {
            data: vec![0x21; 4],
            timestamp_us: chunk.timestamp_us,
            duration_us: (chunk.frames as f64 / RATE as f64 * 1e6).round() as i64,
            keyframe: true,
        }])
    }

    async fn flush(&mut self) -> ShortcraftResult<Vec<EncodedChunk>> {
        Ok(Vec::new())
    }

    fn config(&self) -> Option<AudioTrackConfig> {
        Some(AudioTrackConfig {
            sample_rate: self.settings.format.sample_rate,
            channels: self.settings.format.channels,
            audio_specific_config: vec![0x15, 0x88],
        })
    }
}

impl EncoderBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn video_encoder(&self, settings: &VideoSettings) -> ShortcraftResult<Box<dyn VideoEncoder>> {
        Ok(Box::new(FakeVideo {
            settings: *settings,
            fail: Arc::clone(&self.fail_video),
            recorded: Arc::clone(&self.recorded),
        }))
    }

    fn audio_encoder(&self, settings: &AudioSettings) -> ShortcraftResult<Box<dyn AudioEncoder>> {
        Ok(Box::new(FakeAudio {
            settings: *settings,
            recorded: Arc::clone(&self.recorded),
        }))
    }
}

fn write_wav(path: &Path, seconds: f64) {
    let frames = (seconds * RATE as f64) as u32;
    let data_len = frames * 2;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&RATE.to_le_bytes());
    bytes.extend_from_slice(&(RATE * 2).to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for _ in 0..frames {
        bytes.extend_from_slice(&4_000i16.to_le_bytes());
    }
    std::fs::write(path, bytes).unwrap();
}

/// Two clips, 2.0 s and 3.0 s.
fn two_clip_timeline(dir: &Path) -> ClipTimeline {
    let intro = dir.join("audio_01_intro.wav");
    let outro = dir.join("audio_02_outro.wav");
    write_wav(&intro, 2.0);
    write_wav(&outro, 3.0);

    let mut timeline = ClipTimeline::new();
    let audio = timeline.add_media_files([intro, outro], MediaKind::Audio);
    timeline.library_mut().set_duration(audio[0], 2.0);
    timeline.library_mut().set_duration(audio[1], 3.0);
    timeline
}

fn exporter(backend: Arc<FakeBackend>) -> Exporter {
    Exporter::new(
        backend,
        Compositor::new(Arc::new(BlockRasterizer)),
        RenderDefaults::default(),
    )
}

#[tokio::test]
async fn test_two_clip_export() {
    let dir = tempfile::tempdir().unwrap();
    let timeline = two_clip_timeline(dir.path());
    let backend = Arc::new(FakeBackend::new());
    let mut exporter = exporter(Arc::clone(&backend));

    let reports: Arc<Mutex<Vec<ExportProgress>>> = Arc::default();
    let sink = Arc::clone(&reports);
    let artifact = exporter
        .export(
            &timeline,
            &ProjectSettings::default(),
            &ImageAssets::new(),
            Some(Box::new(move |p: ExportProgress| sink.lock().unwrap().push(p))),
        )
        .await
        .unwrap();

    assert_eq!(exporter.state(), RenderState::Done);
    assert_eq!(artifact.mime, "video/mp4");
    assert_eq!(&artifact.bytes[4..8], b"ftyp");

    let recorded = backend.recorded.lock().unwrap();
    assert_eq!(recorded.video_timestamps.len(), 60 + 90);
    assert!(recorded.video_timestamps.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(recorded.video_timestamps[0], 0);
    assert_eq!(recorded.video_timestamps[60], 2_000_000);

    let keyframes: Vec<usize> = recorded
        .keyframes
        .iter()
        .enumerate()
        .filter(|(_, &k)| k)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(keyframes, vec![0, 60, 120]);

    assert_eq!(recorded.audio_frames, 5 * RATE as usize);
    assert!(recorded.audio_timestamps.windows(2).all(|w| w[0] < w[1]));

    let reports = reports.lock().unwrap();
    assert!(reports.windows(2).all(|w| w[0].percent <= w[1].percent));
    let last = reports.last().unwrap();
    assert_eq!(last.stage, RenderState::Done);
    assert_eq!(last.percent, 100.0);
    assert_eq!(last.frames_encoded, 150);
}

#[tokio::test]
async fn test_export_without_audio_is_rejected() {
    let mut timeline = ClipTimeline::new();
    let images = timeline.add_media_files(["cover.png"], MediaKind::Image);
    let clip = timeline.add_clip();
    timeline.reassign_image(clip, Some(images[0]));

    let backend = Arc::new(FakeBackend::new());
    let mut exporter = exporter(Arc::clone(&backend));
    let err = exporter
        .export(
            &timeline,
            &ProjectSettings::default(),
            &ImageAssets::new(),
            None,
        )
        .await
        .unwrap_err();

    assert!(err.is_precondition());
    assert_eq!(exporter.state(), RenderState::Idle);
    assert!(backend.recorded.lock().unwrap().video_timestamps.is_empty());
}

#[tokio::test]
async fn test_empty_timeline_and_missing_backend() {
    let err = exporter(Arc::new(FakeBackend::new()))
        .export(
            &ClipTimeline::new(),
            &ProjectSettings::default(),
            &ImageAssets::new(),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::Precondition(_)));

    let dir = tempfile::tempdir().unwrap();
    let timeline = two_clip_timeline(dir.path());
    let mut unavailable = FakeBackend::new();
    unavailable.available = false;
    let err = exporter(Arc::new(unavailable))
        .export(&timeline, &ProjectSettings::default(), &ImageAssets::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::Unsupported(_)));
}

#[tokio::test]
async fn test_failure_then_fresh_run() {
    let dir = tempfile::tempdir().unwrap();
    let timeline = two_clip_timeline(dir.path());
    let backend = Arc::new(FakeBackend::new());
    backend.fail_video.store(true, Ordering::SeqCst);
    let mut exporter = exporter(Arc::clone(&backend));

    let err = exporter
        .export(&timeline, &ProjectSettings::default(), &ImageAssets::new(), None)
        .await
        .unwrap_err();
    assert!(!err.is_precondition());
    assert!(matches!(
        err,
        RenderError::Failed {
            stage: RenderState::EncodingVideo,
            ..
        }
    ));
    assert_eq!(exporter.state(), RenderState::Failed);

    backend.fail_video.store(false, Ordering::SeqCst);
    let artifact = exporter
        .export(&timeline, &ProjectSettings::default(), &ImageAssets::new(), None)
        .await
        .unwrap();
    assert!(!artifact.is_empty());
    assert_eq!(exporter.state(), RenderState::Done);
}

#[tokio::test]
async fn test_undecodable_audio_is_dropped_from_the_track() {
    let dir = tempfile::tempdir().unwrap();
    let mut timeline = two_clip_timeline(dir.path());
    let broken = dir.path().join("audio_03_broken.wav");
    std::fs::write(&broken, b"not audio at all").unwrap();
    let audio = timeline.add_media_files([broken], MediaKind::Audio);
    timeline.library_mut().set_duration(audio[0], 1.0);
    // Broken clip first: the good audio must move up to fill its place.
    assert!(timeline.reorder(2, 0));

    let backend = Arc::new(FakeBackend::new());
    let mut exporter = exporter(Arc::clone(&backend));
    exporter
        .export(&timeline, &ProjectSettings::default(), &ImageAssets::new(), None)
        .await
        .unwrap();

    let recorded = backend.recorded.lock().unwrap();
    let rate = RATE as usize;
    assert_eq!(recorded.audio_frames, 6 * rate);
    assert_eq!(recorded.audio_samples.len(), 6 * rate);
    assert_eq!(recorded.video_timestamps.len(), 180);

    // Five seconds of decoded audio from the start, then silence.
    assert!(recorded.audio_samples[..5 * rate].iter().all(|&s| s > 0.0));
    assert!(recorded.audio_samples[5 * rate..].iter().all(|&s| s == 0.0));
}

#[tokio::test]
async fn test_export_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let timeline = two_clip_timeline(dir.path());
    let settings = ProjectSettings::default();

    let first = exporter(Arc::new(FakeBackend::new()))
        .export(&timeline, &settings, &ImageAssets::new(), None)
        .await
        .unwrap();
    let second = exporter(Arc::new(FakeBackend::new()))
        .export(&timeline, &settings, &ImageAssets::new(), None)
        .await
        .unwrap();
    assert_eq!(first, second);
}
