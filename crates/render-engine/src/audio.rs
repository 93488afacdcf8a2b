//! Audio decoding and export track assembly.
//!
//! Clip audio is decoded with Symphonia into interleaved `f32` samples,
//! converted to one shared format, and laid end to end on a silent buffer
//! that spans the whole timeline.

use std::fs::File;
use std::path::{Path, PathBuf};

use shortcraft_common::error::{ShortcraftError, ShortcraftResult};
use shortcraft_project_model::{ClipId, ClipTimeline, MediaLibrary};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Sample rate and channel count of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Fully decoded audio, interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub format: AudioFormat,
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        match self.format.channels {
            0 => 0,
            ch => self.samples.len() / ch as usize,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.format.sample_rate as f64
    }
}

struct OpenedAudio {
    reader: Box<dyn FormatReader>,
    track_id: u32,
    params: CodecParameters,
}

fn open(path: &Path) -> ShortcraftResult<OpenedAudio> {
    if !path.exists() {
        return Err(ShortcraftError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ShortcraftError::media(format!("{}: unsupported audio: {e}", path.display())))?;

    let reader = probed.format;
    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ShortcraftError::media(format!("{}: no audio track", path.display())))?;

    Ok(OpenedAudio {
        track_id: track.id,
        params: track.codec_params.clone(),
        reader,
    })
}

/// Duration of an audio file in seconds.
///
/// Uses the container's frame count when present, otherwise decodes the
/// whole stream.
pub fn probe_duration(path: impl AsRef<Path>) -> ShortcraftResult<f64> {
    let path = path.as_ref();
    let opened = open(path)?;
    if let (Some(frames), Some(rate)) = (opened.params.n_frames, opened.params.sample_rate) {
        if rate > 0 {
            return Ok(frames as f64 / rate as f64);
        }
    }
    Ok(decode_opened(path, opened)?.duration_secs())
}

/// Probe every audio file in the library that has no duration yet.
///
/// Each probe runs on the blocking pool; results are written back as they
/// resolve. A failed probe marks the file `Error` and leaves its duration
/// unset. Returns how many durations were resolved.
pub async fn probe_library_durations(library: &mut MediaLibrary) -> usize {
    let jobs: Vec<_> = library
        .audios()
        .filter(|f| f.duration_secs.is_none())
        .map(|f| {
            let path = f.path.clone();
            (f.id, tokio::task::spawn_blocking(move || probe_duration(path)))
        })
        .collect();

    let mut resolved = 0;
    for (id, job) in jobs {
        let outcome = job
            .await
            .unwrap_or_else(|e| Err(ShortcraftError::media(format!("Audio probe task failed: {e}"))));
        match outcome {
            Ok(duration) => {
                library.set_duration(id, duration);
                library.mark_loaded(id);
                resolved += 1;
            }
            Err(e) => {
                tracing::warn!(media = %id, error = %e, "Audio duration probe failed");
                library.mark_error(id);
            }
        }
    }
    resolved
}

/// Decode an entire audio file into interleaved `f32` samples.
pub fn decode_file(path: impl AsRef<Path>) -> ShortcraftResult<DecodedAudio> {
    let path = path.as_ref();
    let opened = open(path)?;
    decode_opened(path, opened)
}

fn decode_opened(path: &Path, opened: OpenedAudio) -> ShortcraftResult<DecodedAudio> {
    let OpenedAudio {
        mut reader,
        track_id,
        params,
    } = opened;

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| ShortcraftError::media(format!("{}: codec init failed: {e}", path.display())))?;

    let mut sample_rate = params.sample_rate.unwrap_or(0);
    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut samples = Vec::new();

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(ShortcraftError::media(format!(
                    "{}: read failed: {e}",
                    path.display()
                )))
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::warn!(file = %path.display(), error = %msg, "Skipping corrupt audio packet");
                continue;
            }
            Err(e) => {
                return Err(ShortcraftError::media(format!(
                    "{}: decode failed: {e}",
                    path.display()
                )))
            }
        };
        if decoded.frames() == 0 {
            continue;
        }

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if sample_rate == 0 || channels == 0 {
        return Err(ShortcraftError::media(format!(
            "{}: stream has no sample rate or channel layout",
            path.display()
        )));
    }

    tracing::debug!(
        file = %path.display(),
        sample_rate,
        channels,
        frames = samples.len() / channels as usize,
        "Decoded audio"
    );

    Ok(DecodedAudio {
        format: AudioFormat {
            sample_rate,
            channels,
        },
        samples,
    })
}

/// Convert interleaved samples between channel layouts.
///
/// Mono is duplicated across channels; downmixing averages the source
/// channels that fold onto each target channel.
pub fn mix_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }
    let (from, to) = (from as usize, to as usize);
    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);

    for frame in samples.chunks_exact(from) {
        if from < to {
            for c in 0..to {
                out.push(frame[c.min(from - 1)]);
            }
        } else {
            for c in 0..to {
                let (sum, n) = frame
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| i % to == c)
                    .fold((0.0f32, 0u32), |(s, n), (_, v)| (s + v, n + 1));
                out.push(if n == 0 { 0.0 } else { sum / n as f32 });
            }
        }
    }
    out
}

/// Linear-interpolation sample rate conversion of interleaved audio.
pub fn resample_linear(samples: &[f32], channels: u16, from_rate: u32, to_rate: u32) -> Vec<f32> {
    let ch = channels as usize;
    if ch == 0 || samples.is_empty() || from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }
    let in_frames = samples.len() / ch;
    let ratio = to_rate as f64 / from_rate as f64;
    let out_frames = (in_frames as f64 * ratio).round() as usize;
    // Input frames per output frame.
    let step = 1.0 / ratio;

    let mut out = Vec::with_capacity(out_frames * ch);
    for i in 0..out_frames {
        let pos = i as f64 * step;
        let idx = (pos.floor() as usize).min(in_frames - 1);
        let next = (idx + 1).min(in_frames - 1);
        let frac = (pos - idx as f64) as f32;
        for c in 0..ch {
            let a = samples[idx * ch + c];
            let b = samples[next * ch + c];
            out.push(a + (b - a) * frac);
        }
    }
    out
}

impl DecodedAudio {
    /// Samples converted to `target`, interleaved.
    pub fn convert_to(&self, target: AudioFormat) -> Vec<f32> {
        let mixed = mix_channels(&self.samples, self.format.channels, target.channels);
        resample_linear(
            &mixed,
            target.channels,
            self.format.sample_rate,
            target.sample_rate,
        )
    }
}

/// One clip's decoded audio, in timeline order.
#[derive(Debug)]
pub struct AudioPlacement {
    pub clip: ClipId,
    /// Longest stretch of audio the clip may contribute.
    pub duration_secs: f64,
    pub decoded: ShortcraftResult<DecodedAudio>,
}

/// The concatenated audio of a whole timeline, interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub format: AudioFormat,
    pub samples: Vec<f32>,
}

impl AudioTrack {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels.max(1) as usize
    }

    /// Frames `[start, start + len)` as planar samples, channel after
    /// channel. The range is clamped to the track.
    pub fn planar_chunk(&self, start: usize, len: usize) -> Vec<f32> {
        let ch = self.format.channels as usize;
        let end = (start + len).min(self.frames());
        let start = start.min(end);
        let mut planar = Vec::with_capacity((end - start) * ch);
        for c in 0..ch {
            planar.extend((start..end).map(|f| self.samples[f * ch + c]));
        }
        planar
    }
}

/// Concatenate clip audio onto one silent buffer of `ceil(total × rate)`
/// frames.
///
/// The output format is that of the first placement that decoded. Decoded
/// clips are laid back to back in order, each cut to its clip's duration; a
/// clip that failed to decode is dropped from the sequence, so the clips
/// after it move up and the unused frames stay silent at the end. Fails
/// only when nothing decoded.
pub fn assemble_track(total_secs: f64, placements: Vec<AudioPlacement>) -> ShortcraftResult<AudioTrack> {
    let format = placements
        .iter()
        .find_map(|p| p.decoded.as_ref().ok().map(|d| d.format))
        .ok_or_else(|| ShortcraftError::render("None of the clips' audio could be decoded"))?;

    let ch = format.channels as usize;
    let rate = format.sample_rate as f64;
    let total_frames = (total_secs.max(0.0) * rate).ceil() as usize;
    let mut samples = vec![0.0f32; total_frames * ch];

    let mut cursor = 0usize;
    for placement in placements {
        let decoded = match placement.decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(clip = %placement.clip, error = %e, "Skipping clip audio");
                continue;
            }
        };
        let converted = decoded.convert_to(format);
        let span = (placement.duration_secs.max(0.0) * rate).round() as usize;
        let frames = (converted.len() / ch)
            .min(span)
            .min(total_frames.saturating_sub(cursor));
        samples[cursor * ch..(cursor + frames) * ch].copy_from_slice(&converted[..frames * ch]);
        cursor += frames;
    }

    tracing::info!(
        sample_rate = format.sample_rate,
        channels = format.channels,
        frames = total_frames,
        "Assembled export audio track"
    );
    Ok(AudioTrack { format, samples })
}

/// Decode every clip's audio on the blocking pool and assemble the track.
pub async fn build_audio_track(timeline: &ClipTimeline) -> ShortcraftResult<AudioTrack> {
    let jobs: Vec<(ClipId, f64, Option<PathBuf>)> = timeline
        .spans()
        .into_iter()
        .map(|span| {
            let path = timeline
                .clip(span.clip_id)
                .and_then(|clip| timeline.clip_audio(clip))
                .map(|file| file.path.clone());
            (span.clip_id, span.duration_secs, path)
        })
        .collect();

    let mut placements = Vec::with_capacity(jobs.len());
    for (clip, duration_secs, path) in jobs {
        let Some(path) = path else {
            continue;
        };
        let decoded = tokio::task::spawn_blocking(move || decode_file(path))
            .await
            .unwrap_or_else(|e| Err(ShortcraftError::media(format!("Audio decode task failed: {e}"))));
        placements.push(AudioPlacement {
            clip,
            duration_secs,
            decoded,
        });
    }

    assemble_track(timeline.total_duration(), placements)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    /// Write a 16-bit PCM WAV holding a constant level.
    pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize, level: i16) {
        let data_len = frames as u32 * channels as u32 * 2;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        bytes.extend_from_slice(&(channels * 2).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for _ in 0..frames * channels as usize {
            bytes.extend_from_slice(&level.to_le_bytes());
        }
        std::fs::write(path, bytes).unwrap();
    }
}
