//! Box writers for a progressive MP4 holding one H.264 and one AAC track.

use byteorder::{BigEndian, WriteBytesExt};

use super::atoms::{
    pack_language, rescale, write_box, write_descriptor, write_fixed_16_16, write_fixed_8_8,
    write_full_box, write_unity_matrix, write_zeros, MOVIE_TIMESCALE,
};
use super::{MuxError, MuxResult};
use crate::encoder::{AudioTrackConfig, VideoTrackConfig};

/// Codec-specific part of a track.
#[derive(Debug, Clone)]
pub enum TrackMedia {
    Video(VideoTrackConfig),
    Audio(AudioTrackConfig),
}

/// Per-sample tables of one track, one sample per chunk.
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    /// In track timescale units.
    pub durations: Vec<u32>,
    pub sizes: Vec<u32>,
    /// Offsets relative to the start of the `mdat` payload.
    pub offsets: Vec<u64>,
    /// 1-based indices of sync samples; `None` when every sample is one.
    pub sync: Option<Vec<u32>>,
}

impl SampleTable {
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn total_duration(&self) -> u64 {
        self.durations.iter().map(|&d| d as u64).sum()
    }

    pub fn total_size(&self) -> u64 {
        self.sizes.iter().map(|&s| s as u64).sum()
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub timescale: u32,
    pub media: TrackMedia,
    pub samples: SampleTable,
}

impl Track {
    fn movie_duration(&self) -> u64 {
        rescale(self.samples.total_duration(), self.timescale, MOVIE_TIMESCALE)
    }

    /// Average bitrate in bits per second.
    fn average_bitrate(&self) -> u32 {
        let duration = self.samples.total_duration();
        if duration == 0 {
            return 0;
        }
        let bits = self.samples.total_size() as u128 * 8 * self.timescale as u128;
        (bits / duration as u128).min(u32::MAX as u128) as u32
    }
}

pub fn write_ftyp(out: &mut Vec<u8>) -> MuxResult<()> {
    write_box(out, b"ftyp", |out| {
        out.extend_from_slice(b"isom");
        out.write_u32::<BigEndian>(0x200)?;
        for brand in [b"isom", b"iso2", b"avc1", b"mp41"] {
            out.extend_from_slice(brand);
        }
        Ok(())
    })
}

/// Header of an `mdat` box carrying `payload_len` bytes.
pub fn write_mdat_header(out: &mut Vec<u8>, payload_len: u64) -> MuxResult<()> {
    let size = u32::try_from(payload_len + 8)
        .map_err(|_| MuxError::BufferFull("media data exceeds 32-bit box size".into()))?;
    out.write_u32::<BigEndian>(size)?;
    out.extend_from_slice(b"mdat");
    Ok(())
}

/// Write the movie box. Sample offsets are shifted by `mdat_payload_start`,
/// the absolute file offset of the first media byte.
pub fn write_moov(out: &mut Vec<u8>, tracks: &[Track], mdat_payload_start: u64) -> MuxResult<()> {
    write_box(out, b"moov", |out| {
        let duration = tracks.iter().map(Track::movie_duration).max().unwrap_or(0);
        write_mvhd(out, duration, tracks.len() as u32 + 1)?;
        for track in tracks {
            write_trak(out, track, mdat_payload_start)?;
        }
        Ok(())
    })
}

fn write_mvhd(out: &mut Vec<u8>, duration: u64, next_track_id: u32) -> MuxResult<()> {
    write_full_box(out, b"mvhd", 0, 0, |out| {
        // Creation and modification times stay zero so output is reproducible.
        out.write_u32::<BigEndian>(0)?;
        out.write_u32::<BigEndian>(0)?;
        out.write_u32::<BigEndian>(MOVIE_TIMESCALE)?;
        out.write_u32::<BigEndian>(clamp_u32(duration))?;
        write_fixed_16_16(out, 1.0)?;
        write_fixed_8_8(out, 1.0)?;
        write_zeros(out, 10);
        write_unity_matrix(out)?;
        write_zeros(out, 24);
        out.write_u32::<BigEndian>(next_track_id)?;
        Ok(())
    })
}

fn write_trak(out: &mut Vec<u8>, track: &Track, mdat_payload_start: u64) -> MuxResult<()> {
    write_box(out, b"trak", |out| {
        write_tkhd(out, track)?;
        write_box(out, b"mdia", |out| {
            write_mdhd(out, track)?;
            write_hdlr(out, &track.media)?;
            write_box(out, b"minf", |out| {
                match track.media {
                    TrackMedia::Video(_) => write_full_box(out, b"vmhd", 0, 1, |out| {
                        write_zeros(out, 8);
                        Ok(())
                    })?,
                    TrackMedia::Audio(_) => write_full_box(out, b"smhd", 0, 0, |out| {
                        write_zeros(out, 4);
                        Ok(())
                    })?,
                }
                write_dinf(out)?;
                write_stbl(out, track, mdat_payload_start)
            })
        })
    })
}

fn write_tkhd(out: &mut Vec<u8>, track: &Track) -> MuxResult<()> {
    // Flags: enabled | in movie.
    write_full_box(out, b"tkhd", 0, 0x3, |out| {
        out.write_u32::<BigEndian>(0)?;
        out.write_u32::<BigEndian>(0)?;
        out.write_u32::<BigEndian>(track.id)?;
        out.write_u32::<BigEndian>(0)?;
        out.write_u32::<BigEndian>(clamp_u32(track.movie_duration()))?;
        write_zeros(out, 8);
        out.write_i16::<BigEndian>(0)?; // layer
        out.write_i16::<BigEndian>(0)?; // alternate group
        let (volume, width, height) = match &track.media {
            TrackMedia::Video(config) => (0.0, config.width as f64, config.height as f64),
            TrackMedia::Audio(_) => (1.0, 0.0, 0.0),
        };
        write_fixed_8_8(out, volume)?;
        write_zeros(out, 2);
        write_unity_matrix(out)?;
        write_fixed_16_16(out, width)?;
        write_fixed_16_16(out, height)?;
        Ok(())
    })
}

fn write_mdhd(out: &mut Vec<u8>, track: &Track) -> MuxResult<()> {
    write_full_box(out, b"mdhd", 0, 0, |out| {
        out.write_u32::<BigEndian>(0)?;
        out.write_u32::<BigEndian>(0)?;
        out.write_u32::<BigEndian>(track.timescale)?;
        out.write_u32::<BigEndian>(clamp_u32(track.samples.total_duration()))?;
        out.write_u16::<BigEndian>(pack_language("und"))?;
        out.write_u16::<BigEndian>(0)?;
        Ok(())
    })
}

fn write_hdlr(out: &mut Vec<u8>, media: &TrackMedia) -> MuxResult<()> {
    let (handler, name): (&[u8; 4], &[u8]) = match media {
        TrackMedia::Video(_) => (b"vide", &b"VideoHandler\0"[..]),
        TrackMedia::Audio(_) => (b"soun", &b"SoundHandler\0"[..]),
    };
    write_full_box(out, b"hdlr", 0, 0, |out| {
        out.write_u32::<BigEndian>(0)?;
        out.extend_from_slice(handler);
        write_zeros(out, 12);
        out.extend_from_slice(name);
        Ok(())
    })
}

fn write_dinf(out: &mut Vec<u8>) -> MuxResult<()> {
    write_box(out, b"dinf", |out| {
        write_full_box(out, b"dref", 0, 0, |out| {
            out.write_u32::<BigEndian>(1)?;
            // Flag 1: media data lives in this file.
            write_full_box(out, b"url ", 0, 1, |_| Ok(()))
        })
    })
}

fn write_stbl(out: &mut Vec<u8>, track: &Track, mdat_payload_start: u64) -> MuxResult<()> {
    let samples = &track.samples;
    write_box(out, b"stbl", |out| {
        write_full_box(out, b"stsd", 0, 0, |out| {
            out.write_u32::<BigEndian>(1)?;
            match &track.media {
                TrackMedia::Video(config) => write_avc1(out, config),
                TrackMedia::Audio(config) => write_mp4a(out, config, track.average_bitrate()),
            }
        })?;
        write_stts(out, &samples.durations)?;
        write_full_box(out, b"stsc", 0, 0, |out| {
            // One entry: every chunk holds a single sample.
            for value in [1, 1, 1, 1u32] {
                out.write_u32::<BigEndian>(value)?;
            }
            Ok(())
        })?;
        write_stsz(out, &samples.sizes)?;
        write_full_box(out, b"stco", 0, 0, |out| {
            out.write_u32::<BigEndian>(samples.offsets.len() as u32)?;
            for &offset in &samples.offsets {
                let absolute = u32::try_from(offset + mdat_payload_start).map_err(|_| {
                    MuxError::BufferFull(format!("chunk offset {offset} exceeds 32 bits"))
                })?;
                out.write_u32::<BigEndian>(absolute)?;
            }
            Ok(())
        })?;
        if let Some(sync) = &samples.sync {
            write_full_box(out, b"stss", 0, 0, |out| {
                out.write_u32::<BigEndian>(sync.len() as u32)?;
                for &index in sync {
                    out.write_u32::<BigEndian>(index)?;
                }
                Ok(())
            })?;
        }
        Ok(())
    })
}

/// Time-to-sample table, run-length encoded.
fn write_stts(out: &mut Vec<u8>, durations: &[u32]) -> MuxResult<()> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &duration in durations {
        match runs.last_mut() {
            Some((count, delta)) if *delta == duration => *count += 1,
            _ => runs.push((1, duration)),
        }
    }
    write_full_box(out, b"stts", 0, 0, |out| {
        out.write_u32::<BigEndian>(runs.len() as u32)?;
        for (count, delta) in &runs {
            out.write_u32::<BigEndian>(*count)?;
            out.write_u32::<BigEndian>(*delta)?;
        }
        Ok(())
    })
}

fn write_stsz(out: &mut Vec<u8>, sizes: &[u32]) -> MuxResult<()> {
    let uniform = sizes
        .first()
        .filter(|&&first| sizes.iter().all(|&s| s == first))
        .copied();
    write_full_box(out, b"stsz", 0, 0, |out| {
        out.write_u32::<BigEndian>(uniform.unwrap_or(0))?;
        out.write_u32::<BigEndian>(sizes.len() as u32)?;
        if uniform.is_none() {
            for &size in sizes {
                out.write_u32::<BigEndian>(size)?;
            }
        }
        Ok(())
    })
}

fn write_avc1(out: &mut Vec<u8>, config: &VideoTrackConfig) -> MuxResult<()> {
    if config.sps.len() < 4 {
        return Err(MuxError::InvalidConfig(format!(
            "SPS too short ({} bytes)",
            config.sps.len()
        )));
    }
    let width = u16::try_from(config.width)
        .map_err(|_| MuxError::InvalidConfig(format!("width {} too large", config.width)))?;
    let height = u16::try_from(config.height)
        .map_err(|_| MuxError::InvalidConfig(format!("height {} too large", config.height)))?;

    write_box(out, b"avc1", |out| {
        write_zeros(out, 6);
        out.write_u16::<BigEndian>(1)?; // data reference index
        write_zeros(out, 16);
        out.write_u16::<BigEndian>(width)?;
        out.write_u16::<BigEndian>(height)?;
        out.write_u32::<BigEndian>(0x0048_0000)?; // 72 dpi
        out.write_u32::<BigEndian>(0x0048_0000)?;
        out.write_u32::<BigEndian>(0)?;
        out.write_u16::<BigEndian>(1)?; // frames per sample
        write_zeros(out, 32);
        out.write_u16::<BigEndian>(0x0018)?;
        out.write_i16::<BigEndian>(-1)?;
        write_avcc(out, &config.sps, &config.pps)
    })
}

fn write_avcc(out: &mut Vec<u8>, sps: &[u8], pps: &[u8]) -> MuxResult<()> {
    write_box(out, b"avcC", |out| {
        out.push(1);
        out.extend_from_slice(&sps[1..4]);
        out.push(0xFF); // 4-byte NAL lengths
        out.push(0xE1); // one SPS
        out.write_u16::<BigEndian>(sps.len() as u16)?;
        out.extend_from_slice(sps);
        out.push(1);
        out.write_u16::<BigEndian>(pps.len() as u16)?;
        out.extend_from_slice(pps);
        Ok(())
    })
}

fn write_mp4a(out: &mut Vec<u8>, config: &AudioTrackConfig, bitrate: u32) -> MuxResult<()> {
    write_box(out, b"mp4a", |out| {
        write_zeros(out, 6);
        out.write_u16::<BigEndian>(1)?;
        write_zeros(out, 8);
        out.write_u16::<BigEndian>(config.channels)?;
        out.write_u16::<BigEndian>(16)?;
        write_zeros(out, 4);
        // 16.16 rate; rates above 65535 Hz do not fit and are left to the esds.
        let rate = if config.sample_rate <= u16::MAX as u32 {
            config.sample_rate << 16
        } else {
            0
        };
        out.write_u32::<BigEndian>(rate)?;
        write_esds(out, &config.audio_specific_config, bitrate)
    })
}

fn write_esds(out: &mut Vec<u8>, audio_specific_config: &[u8], bitrate: u32) -> MuxResult<()> {
    let mut decoder_config = vec![
        0x40, // MPEG-4 audio
        0x15, // audio stream
        0,
        0,
        0,
    ];
    decoder_config.write_u32::<BigEndian>(bitrate)?;
    decoder_config.write_u32::<BigEndian>(bitrate)?;
    write_descriptor(&mut decoder_config, 0x05, audio_specific_config);

    let mut es = vec![0, 1, 0]; // ES_ID 1, no flags
    write_descriptor(&mut es, 0x04, &decoder_config);
    write_descriptor(&mut es, 0x06, &[0x02]);

    write_full_box(out, b"esds", 0, 0, |out| {
        write_descriptor(out, 0x03, &es);
        Ok(())
    })
}

fn clamp_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_body<'a>(data: &'a [u8], kind: &[u8; 4]) -> &'a [u8] {
        let pos = data
            .windows(4)
            .position(|w| w == kind)
            .expect("box present");
        let size = u32::from_be_bytes([data[pos - 4], data[pos - 3], data[pos - 2], data[pos - 1]]);
        &data[pos + 4..pos - 4 + size as usize]
    }

    #[test]
    fn test_stts_run_length() {
        let mut out = Vec::new();
        write_stts(&mut out, &[3000, 3000, 3000, 1500]).unwrap();
        let body = box_body(&out, b"stts");
        assert_eq!(
            body,
            &[0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0x0B, 0xB8, 0, 0, 0, 1, 0, 0, 0x05, 0xDC]
        );
    }

    #[test]
    fn test_stsz_uniform_and_varied() {
        let mut uniform = Vec::new();
        write_stsz(&mut uniform, &[6, 6, 6]).unwrap();
        assert_eq!(box_body(&uniform, b"stsz"), &[0, 0, 0, 0, 0, 0, 0, 6, 0, 0, 0, 3]);

        let mut varied = Vec::new();
        write_stsz(&mut varied, &[6, 7]).unwrap();
        assert_eq!(
            box_body(&varied, b"stsz"),
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 6, 0, 0, 0, 7]
        );
    }

    #[test]
    fn test_avcc_layout() {
        let mut out = Vec::new();
        write_avcc(&mut out, &[0x67, 0x42, 0xC0, 0x1F], &[0x68, 0xCE]).unwrap();
        assert_eq!(
            box_body(&out, b"avcC"),
            &[1, 0x42, 0xC0, 0x1F, 0xFF, 0xE1, 0, 4, 0x67, 0x42, 0xC0, 0x1F, 1, 0, 2, 0x68, 0xCE]
        );
    }

    #[test]
    fn test_avc1_rejects_short_sps() {
        let config = VideoTrackConfig {
            width: 1080,
            height: 1920,
            sps: vec![0x67],
            pps: vec![0x68],
        };
        assert!(matches!(
            write_avc1(&mut Vec::new(), &config),
            Err(MuxError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_esds_carries_audio_config() {
        let mut out = Vec::new();
        write_esds(&mut out, &[0x11, 0x90], 128_000).unwrap();
        let body = box_body(&out, b"esds");
        // version/flags, then the ES descriptor.
        assert_eq!(&body[..4], &[0, 0, 0, 0]);
        assert_eq!(body[4], 0x03);
        assert!(body.windows(4).any(|w| w == [0x05, 2, 0x11, 0x90]));
        assert!(body.ends_with(&[0x06, 1, 0x02]));
    }

    #[test]
    fn test_stco_offsets_are_shifted() {
        let track = Track {
            id: 1,
            timescale: 48_000,
            media: TrackMedia::Audio(AudioTrackConfig {
                sample_rate: 48_000,
                channels: 2,
                audio_specific_config: vec![0x11, 0x90],
            }),
            samples: SampleTable {
                durations: vec![1024, 1024],
                sizes: vec![10, 12],
                offsets: vec![0, 10],
                sync: None,
            },
        };
        let mut out = Vec::new();
        write_moov(&mut out, &[track], 100).unwrap();
        let stco = box_body(&out, b"stco");
        assert_eq!(stco, &[0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 100, 0, 0, 0, 110]);
        assert!(!out.windows(4).any(|w| w == b"stss"));
    }
}
