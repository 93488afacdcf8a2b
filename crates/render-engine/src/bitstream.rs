//! Elementary stream parsing: H.264 Annex-B and AAC ADTS.
//!
//! Encoders emit byte streams; MP4 wants discrete samples plus decoder
//! configuration. These parsers bridge the two.

use shortcraft_common::error::{ShortcraftError, ShortcraftResult};

pub const NAL_IDR: u8 = 5;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
pub const NAL_AUD: u8 = 9;

/// Sampling frequencies indexed by the ADTS/ASC frequency index.
pub const AAC_SAMPLE_RATES: [u32; 13] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025, 8_000,
    7_350,
];

/// Split an Annex-B byte stream into NAL units (start codes removed).
pub fn split_nal_units(stream: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= stream.len() {
        if stream[i] == 0 && stream[i + 1] == 0 && stream[i + 2] == 1 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    starts
        .iter()
        .enumerate()
        .filter_map(|(n, &start)| {
            let mut end = starts.get(n + 1).map(|next| next - 3).unwrap_or(stream.len());
            // A 4-byte start code leaves one zero byte behind.
            while end > start && stream[end - 1] == 0 {
                end -= 1;
            }
            (end > start).then(|| &stream[start..end])
        })
        .collect()
}

pub fn nal_type(nal: &[u8]) -> u8 {
    nal.first().map(|b| b & 0x1F).unwrap_or(0)
}

/// One decoded-order access unit, ready for a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    /// NAL units with 4-byte big-endian length prefixes.
    pub data: Vec<u8>,
    pub keyframe: bool,
}

/// Access units and parameter sets found in an H.264 stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct H264Stream {
    pub access_units: Vec<AccessUnit>,
    pub sps: Option<Vec<u8>>,
    pub pps: Option<Vec<u8>>,
}

/// Group an Annex-B stream into access units.
///
/// The stream must carry access unit delimiters. Parameter sets are
/// lifted out into [`H264Stream::sps`]/[`H264Stream::pps`] and dropped
/// from the samples along with the delimiters.
pub fn parse_h264(stream: &[u8]) -> H264Stream {
    let mut parsed = H264Stream::default();
    let mut current: Option<AccessUnit> = None;

    for nal in split_nal_units(stream) {
        match nal_type(nal) {
            NAL_AUD => {
                if let Some(au) = current.take().filter(|au| !au.data.is_empty()) {
                    parsed.access_units.push(au);
                }
                current = Some(AccessUnit {
                    data: Vec::new(),
                    keyframe: false,
                });
            }
            NAL_SPS => {
                parsed.sps.get_or_insert_with(|| nal.to_vec());
            }
            NAL_PPS => {
                parsed.pps.get_or_insert_with(|| nal.to_vec());
            }
            kind => {
                let au = current.get_or_insert_with(|| AccessUnit {
                    data: Vec::new(),
                    keyframe: false,
                });
                au.keyframe |= kind == NAL_IDR;
                au.data.extend_from_slice(&(nal.len() as u32).to_be_bytes());
                au.data.extend_from_slice(nal);
            }
        }
    }
    if let Some(au) = current.filter(|au| !au.data.is_empty()) {
        parsed.access_units.push(au);
    }
    parsed
}

/// Header fields of one ADTS frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// MPEG-4 audio object type (AAC-LC is 2).
    pub object_type: u8,
    pub frequency_index: u8,
    pub channel_config: u8,
    pub header_len: usize,
    pub frame_len: usize,
}

impl AdtsHeader {
    pub fn parse(bytes: &[u8]) -> ShortcraftResult<Self> {
        if bytes.len() < 7 || bytes[0] != 0xFF || bytes[1] & 0xF0 != 0xF0 {
            return Err(ShortcraftError::render("ADTS sync word not found"));
        }
        let protection_absent = bytes[1] & 0x01 == 1;
        let profile = (bytes[2] >> 6) & 0x03;
        let frequency_index = (bytes[2] >> 2) & 0x0F;
        let channel_config = ((bytes[2] & 0x01) << 2) | (bytes[3] >> 6);
        let frame_len = (((bytes[3] & 0x03) as usize) << 11)
            | ((bytes[4] as usize) << 3)
            | ((bytes[5] as usize) >> 5);
        let header_len = if protection_absent { 7 } else { 9 };
        if frame_len < header_len {
            return Err(ShortcraftError::render(format!(
                "ADTS frame length {frame_len} shorter than its header"
            )));
        }
        Ok(Self {
            object_type: profile + 1,
            frequency_index,
            channel_config,
            header_len,
            frame_len,
        })
    }

    pub fn sample_rate(&self) -> Option<u32> {
        AAC_SAMPLE_RATES.get(self.frequency_index as usize).copied()
    }

    /// Two-byte AudioSpecificConfig describing this stream.
    pub fn audio_specific_config(&self) -> Vec<u8> {
        vec![
            (self.object_type << 3) | (self.frequency_index >> 1),
            ((self.frequency_index & 0x01) << 7) | (self.channel_config << 3),
        ]
    }
}

/// Raw AAC frames of an ADTS stream plus the stream's header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdtsStream {
    pub header: Option<AdtsHeader>,
    pub frames: Vec<Vec<u8>>,
}

/// Strip ADTS headers, returning raw AAC frames.
pub fn parse_adts(mut stream: &[u8]) -> ShortcraftResult<AdtsStream> {
    let mut parsed = AdtsStream {
        header: None,
        frames: Vec::new(),
    };
    while !stream.is_empty() {
        let header = AdtsHeader::parse(stream)?;
        if header.frame_len > stream.len() {
            return Err(ShortcraftError::render("Truncated ADTS frame"));
        }
        parsed
            .frames
            .push(stream[header.header_len..header.frame_len].to_vec());
        parsed.header.get_or_insert(header);
        stream = &stream[header.frame_len..];
    }
    Ok(parsed)
}


#[cfg(test)]
mod tests {
    use super::test_support::adts_frame;
    use super::*;

    fn annexb(nals: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, nal) in nals.iter().enumerate() {
            if i % 2 == 0 {
                out.extend_from_slice(&[0, 0, 0, 1]);
            } else {
                out.extend_from_slice(&[0, 0, 1]);
            }
            out.extend_from_slice(nal);
        }
        out
    }

    #[test]
    fn test_split_mixed_start_codes() {
        let stream = annexb(&[&[0x09, 0xF0], &[0x67, 1, 2], &[0x68, 3]]);
        let nals = split_nal_units(&stream);
        assert_eq!(nals, vec![&[0x09, 0xF0][..], &[0x67, 1, 2][..], &[0x68, 3][..]]);
    }

    #[test]
    fn test_parse_h264_groups_by_delimiter() {
        let stream = annexb(&[
            &[0x09, 0x10],
            &[0x67, 0x42, 0xC0, 0x1F],
            &[0x68, 0xCE],
            &[0x65, 0xAA, 0xBB],
            &[0x09, 0x30],
            &[0x41, 0xCC],
        ]);
        let parsed = parse_h264(&stream);
        assert_eq!(parsed.sps.as_deref(), Some(&[0x67, 0x42, 0xC0, 0x1F][..]));
        assert_eq!(parsed.pps.as_deref(), Some(&[0x68, 0xCE][..]));
        assert_eq!(parsed.access_units.len(), 2);

        let first = &parsed.access_units[0];
        assert!(first.keyframe);
        assert_eq!(first.data, vec![0, 0, 0, 3, 0x65, 0xAA, 0xBB]);
        assert!(!parsed.access_units[1].keyframe);
    }

    #[test]
    fn test_adts_header_fields() {
        // 44.1 kHz (index 4), stereo.
        let frame = adts_frame(4, 2, &[1, 2, 3]);
        let header = AdtsHeader::parse(&frame).unwrap();
        assert_eq!(header.object_type, 2);
        assert_eq!(header.sample_rate(), Some(44_100));
        assert_eq!(header.channel_config, 2);
        assert_eq!(header.frame_len, 10);
        assert_eq!(header.audio_specific_config(), vec![0x12, 0x10]);
    }

    #[test]
    fn test_parse_adts_strips_headers() {
        let mut stream = adts_frame(3, 1, &[9, 9]);
        stream.extend(adts_frame(3, 1, &[8]));
        let parsed = parse_adts(&stream).unwrap();
        assert_eq!(parsed.frames, vec![vec![9, 9], vec![8]]);
        assert_eq!(parsed.header.unwrap().sample_rate(), Some(48_000));
    }

    #[test]
    fn test_parse_adts_rejects_garbage() {
        assert!(parse_adts(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]).is_err());
        let mut truncated = adts_frame(4, 2, &[1, 2, 3]);
        truncated.pop();
        assert!(parse_adts(&truncated).is_err());
    }
}
