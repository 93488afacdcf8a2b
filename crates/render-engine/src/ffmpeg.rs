//! Encoder backend that pipes raw media through `ffmpeg` subprocesses.
//!
//! Video goes in as raw RGBA and comes out as H.264 Annex-B with access
//! unit delimiters; audio goes in as interleaved `f32le` and comes out as
//! AAC in ADTS framing. Both outputs are parsed back into container-ready
//! samples, so the MP4 itself is written natively.

use std::process::Stdio;

use async_trait::async_trait;
use byteorder::{ByteOrder, LittleEndian};
use shortcraft_common::config::RenderDefaults;
use shortcraft_common::error::{ShortcraftError, ShortcraftResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use crate::bitstream::{parse_adts, parse_h264};
use crate::encoder::{
    AudioChunk, AudioEncoder, AudioSettings, AudioTrackConfig, EncodedChunk, EncoderBackend,
    TimestampGuard, VideoEncoder, VideoFrame, VideoSettings, VideoTrackConfig,
};

/// Samples per AAC frame.
pub const AAC_FRAME_SAMPLES: u32 = 1024;

/// H.264 + AAC encoding through the `ffmpeg` command-line tool.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    binary: String,
}

impl FfmpegBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn from_config(config: &RenderDefaults) -> Self {
        Self::new(config.ffmpeg_binary.clone())
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl EncoderBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    fn video_encoder(&self, settings: &VideoSettings) -> ShortcraftResult<Box<dyn VideoEncoder>> {
        Ok(Box::new(FfmpegVideoEncoder::spawn(&self.binary, *settings)?))
    }

    fn audio_encoder(&self, settings: &AudioSettings) -> ShortcraftResult<Box<dyn AudioEncoder>> {
        Ok(Box::new(FfmpegAudioEncoder::spawn(&self.binary, *settings)?))
    }
}

/// Whether `binary` can be executed: an existing path, or a name on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    if binary.is_empty() {
        return false;
    }
    if binary.contains(std::path::MAIN_SEPARATOR) || binary.contains('/') {
        return std::path::Path::new(binary).is_file();
    }
    std::env::var_os("PATH")
        .and_then(|path| find_in_path(binary, &path))
        .is_some()
}

/// First file named `binary` in a `PATH`-style list of directories.
pub fn find_in_path(binary: &str, path: &std::ffi::OsStr) -> Option<std::path::PathBuf> {
    let suffix = std::env::consts::EXE_SUFFIX;
    std::env::split_paths(path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| {
            let plain = dir.join(binary);
            let suffixed = (!suffix.is_empty()).then(|| dir.join(format!("{binary}{suffix}")));
            std::iter::once(plain).chain(suffixed)
        })
        .find(|candidate| candidate.is_file())
}

/// The ffmpeg process fixes keyframe placement at spawn time
/// (`-force_key_frames` every `interval` frames); a frame asking for
/// anything else cannot be honoured.
pub fn check_keyframe_request(index: u64, requested: bool, interval: u32) -> ShortcraftResult<()> {
    let scheduled = index % u64::from(interval.max(1)) == 0;
    if requested != scheduled {
        return Err(ShortcraftError::unsupported(format!(
            "frame {index} {} a keyframe, but the ffmpeg encoder places one every {} frames",
            if requested { "requests" } else { "refuses" },
            interval.max(1)
        )));
    }
    Ok(())
}

fn to_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

pub fn video_args(settings: &VideoSettings) -> Vec<String> {
    let gop = settings.keyframe_interval_frames.max(1).to_string();
    let size = format!("{}x{}", settings.width, settings.height);
    let fps = settings.fps.to_string();
    let bitrate = settings.bitrate.to_string();
    let force_key_frames = format!("expr:eq(mod(n,{gop}),0)");
    to_args(&[
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
        &size,
        "-r",
        &fps,
        "-i",
        "pipe:0",
        "-c:v",
        "libx264",
        "-profile:v",
        "baseline",
        "-pix_fmt",
        "yuv420p",
        "-b:v",
        &bitrate,
        "-g",
        &gop,
        "-keyint_min",
        &gop,
        "-sc_threshold",
        "0",
        "-force_key_frames",
        &force_key_frames,
        "-bf",
        "0",
        "-x264-params",
        "aud=1",
        "-f",
        "h264",
        "pipe:1",
    ])
}

pub fn audio_args(settings: &AudioSettings) -> Vec<String> {
    let rate = settings.format.sample_rate.to_string();
    let channels = settings.format.channels.to_string();
    let bitrate = settings.bitrate.to_string();
    to_args(&[
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "f32le",
        "-ar",
        &rate,
        "-ac",
        &channels,
        "-i",
        "pipe:0",
        "-c:a",
        "aac",
        "-b:a",
        &bitrate,
        "-f",
        "adts",
        "pipe:1",
    ])
}

/// A running ffmpeg with stdout and stderr drained in the background.
struct FfmpegProcess {
    label: &'static str,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout_task: JoinHandle<std::io::Result<Vec<u8>>>,
    stderr_task: JoinHandle<String>,
}

impl FfmpegProcess {
    fn spawn(binary: &str, label: &'static str, args: &[String]) -> ShortcraftResult<Self> {
        tracing::debug!(encoder = label, ?args, "Running ffmpeg");
        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ShortcraftError::render(format!("Failed to start ffmpeg: {e}")))?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ShortcraftError::render("Failed to capture ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ShortcraftError::render("Failed to capture ffmpeg stderr"))?;

        // Both pipes are drained concurrently so ffmpeg never blocks on a
        // full pipe while we are still writing its input.
        let stdout_task = tokio::spawn(async move {
            let mut output = Vec::new();
            stdout.read_to_end(&mut output).await?;
            Ok::<_, std::io::Error>(output)
        });
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        tracing::info!(encoder = label, pid = ?child.id(), "ffmpeg process started");
        Ok(Self {
            label,
            child,
            stdin,
            stdout_task,
            stderr_task,
        })
    }

    async fn write(&mut self, bytes: &[u8]) -> ShortcraftResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ShortcraftError::render("ffmpeg input already closed"))?;
        stdin.write_all(bytes).await.map_err(|e| {
            ShortcraftError::render(format!("Failed writing to ffmpeg ({}): {e}", self.label))
        })
    }

    /// Close the input, wait for exit, and return everything ffmpeg wrote.
    async fn finish(mut self) -> ShortcraftResult<Vec<u8>> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .shutdown()
                .await
                .map_err(|e| ShortcraftError::render(format!("Failed to close ffmpeg input: {e}")))?;
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ShortcraftError::render(format!("Failed to wait on ffmpeg: {e}")))?;

        let stderr_output = self
            .stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());
        if !status.success() {
            return Err(ShortcraftError::render(format!(
                "ffmpeg {} encoder failed (status {}): {}",
                self.label,
                status,
                stderr_output.trim()
            )));
        }

        let output = self
            .stdout_task
            .await
            .map_err(|e| ShortcraftError::render(format!("ffmpeg output reader failed: {e}")))?
            .map_err(|e| ShortcraftError::render(format!("Failed reading ffmpeg output: {e}")))?;
        tracing::debug!(encoder = self.label, bytes = output.len(), "ffmpeg finished");
        Ok(output)
    }
}

/// H.264 encoder. Keyframes land every `keyframe_interval_frames` frames,
/// which is the cadence the pipeline requests them at.
pub struct FfmpegVideoEncoder {
    settings: VideoSettings,
    process: Option<FfmpegProcess>,
    guard: TimestampGuard,
    submitted: Vec<(i64, i64)>,
    config: Option<VideoTrackConfig>,
}

impl FfmpegVideoEncoder {
    pub fn spawn(binary: &str, settings: VideoSettings) -> ShortcraftResult<Self> {
        let process = FfmpegProcess::spawn(binary, "video", &video_args(&settings))?;
        Ok(Self {
            settings,
            process: Some(process),
            guard: TimestampGuard::new(),
            submitted: Vec::new(),
            config: None,
        })
    }
}

#[async_trait]
impl VideoEncoder for FfmpegVideoEncoder {
    async fn encode(&mut self, frame: &VideoFrame) -> ShortcraftResult<Vec<EncodedChunk>> {
        self.guard.check("video", frame.timestamp_us)?;
        let dims = frame.image.dimensions();
        if dims != (self.settings.width, self.settings.height) {
            return Err(ShortcraftError::render(format!(
                "Frame is {}x{}, encoder expects {}x{}",
                dims.0, dims.1, self.settings.width, self.settings.height
            )));
        }
        check_keyframe_request(
            self.submitted.len() as u64,
            frame.keyframe,
            self.settings.keyframe_interval_frames,
        )?;
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| ShortcraftError::render("Video encoder already flushed"))?;
        process.write(frame.image.as_raw()).await?;
        self.submitted.push((frame.timestamp_us, frame.duration_us));
        Ok(Vec::new())
    }

    async fn flush(&mut self) -> ShortcraftResult<Vec<EncodedChunk>> {
        let process = self
            .process
            .take()
            .ok_or_else(|| ShortcraftError::render("Video encoder already flushed"))?;
        let stream = parse_h264(&process.finish().await?);

        if stream.access_units.len() != self.submitted.len() {
            return Err(ShortcraftError::render(format!(
                "ffmpeg produced {} video frames for {} submitted",
                stream.access_units.len(),
                self.submitted.len()
            )));
        }
        let (Some(sps), Some(pps)) = (stream.sps, stream.pps) else {
            return Err(ShortcraftError::render(
                "ffmpeg output carries no H.264 parameter sets",
            ));
        };
        self.config = Some(VideoTrackConfig {
            width: self.settings.width,
            height: self.settings.height,
            sps,
            pps,
        });

        Ok(stream
            .access_units
            .into_iter()
            .zip(self.submitted.drain(..))
            .map(|(au, (timestamp_us, duration_us))| EncodedChunk {
                data: au.data,
                timestamp_us,
                duration_us,
                keyframe: au.keyframe,
            })
            .collect())
    }

    fn config(&self) -> Option<VideoTrackConfig> {
        self.config.clone()
    }
}

/// AAC-LC encoder.
pub struct FfmpegAudioEncoder {
    settings: AudioSettings,
    process: Option<FfmpegProcess>,
    guard: TimestampGuard,
    config: Option<AudioTrackConfig>,
}

impl FfmpegAudioEncoder {
    pub fn spawn(binary: &str, settings: AudioSettings) -> ShortcraftResult<Self> {
        let process = FfmpegProcess::spawn(binary, "audio", &audio_args(&settings))?;
        Ok(Self {
            settings,
            process: Some(process),
            guard: TimestampGuard::new(),
            config: None,
        })
    }
}

#[async_trait]
impl AudioEncoder for FfmpegAudioEncoder {
    async fn encode(&mut self, chunk: &AudioChunk) -> ShortcraftResult<Vec<EncodedChunk>> {
        self.guard.check("audio", chunk.timestamp_us)?;
        if chunk.format != self.settings.format {
            return Err(ShortcraftError::render(format!(
                "Audio chunk format {:?} does not match encoder format {:?}",
                chunk.format, self.settings.format
            )));
        }
        let samples = chunk.interleaved();
        let mut bytes = vec![0u8; samples.len() * 4];
        LittleEndian::write_f32_into(&samples, &mut bytes);

        let process = self
            .process
            .as_mut()
            .ok_or_else(|| ShortcraftError::render("Audio encoder already flushed"))?;
        process.write(&bytes).await?;
        Ok(Vec::new())
    }

    async fn flush(&mut self) -> ShortcraftResult<Vec<EncodedChunk>> {
        let process = self
            .process
            .take()
            .ok_or_else(|| ShortcraftError::render("Audio encoder already flushed"))?;
        let stream = parse_adts(&process.finish().await?)?;
        let header = stream
            .header
            .ok_or_else(|| ShortcraftError::render("ffmpeg produced no AAC frames"))?;

        let rate = self.settings.format.sample_rate as f64;
        self.config = Some(AudioTrackConfig {
            sample_rate: self.settings.format.sample_rate,
            channels: self.settings.format.channels,
            audio_specific_config: header.audio_specific_config(),
        });

        let frame_us = |index: usize| {
            (index as f64 * AAC_FRAME_SAMPLES as f64 / rate * 1_000_000.0).round() as i64
        };
        Ok(stream
            .frames
            .into_iter()
            .enumerate()
            .map(|(i, data)| EncodedChunk {
                data,
                timestamp_us: frame_us(i),
                duration_us: frame_us(i + 1) - frame_us(i),
                keyframe: true,
            })
            .collect())
    }

    fn config(&self) -> Option<AudioTrackConfig> {
        self.config.clone()
    }
}
