//! Box (atom) writing primitives.
//!
//! Every box starts with a 4-byte big-endian size that covers the whole
//! box, followed by its 4-character type. Full boxes add a version byte
//! and 24 bits of flags.

use byteorder::{BigEndian, WriteBytesExt};

use super::{MuxError, MuxResult};

/// Timescale of video tracks (90 kHz).
pub const VIDEO_TIMESCALE: u32 = 90_000;

/// Timescale of the movie header and track headers (milliseconds).
pub const MOVIE_TIMESCALE: u32 = 1_000;

/// Write a box whose body is produced by `body`; the size is patched in
/// afterwards.
pub fn write_box<F>(out: &mut Vec<u8>, kind: &[u8; 4], body: F) -> MuxResult<()>
where
    F: FnOnce(&mut Vec<u8>) -> MuxResult<()>,
{
    let start = out.len();
    out.write_u32::<BigEndian>(0)?;
    out.extend_from_slice(kind);
    body(out)?;
    patch_size(out, start, kind)
}

/// Like [`write_box`] with a version/flags word ahead of the body.
pub fn write_full_box<F>(
    out: &mut Vec<u8>,
    kind: &[u8; 4],
    version: u8,
    flags: u32,
    body: F,
) -> MuxResult<()>
where
    F: FnOnce(&mut Vec<u8>) -> MuxResult<()>,
{
    write_box(out, kind, |out| {
        out.write_u32::<BigEndian>(((version as u32) << 24) | (flags & 0x00FF_FFFF))?;
        body(out)
    })
}

fn patch_size(out: &mut [u8], start: usize, kind: &[u8; 4]) -> MuxResult<()> {
    let size = u32::try_from(out.len() - start).map_err(|_| {
        MuxError::BufferFull(format!(
            "'{}' box exceeds 32-bit size",
            String::from_utf8_lossy(kind)
        ))
    })?;
    out[start..start + 4].copy_from_slice(&size.to_be_bytes());
    Ok(())
}

pub fn write_zeros(out: &mut Vec<u8>, count: usize) {
    out.resize(out.len() + count, 0);
}

pub fn write_fixed_16_16(out: &mut Vec<u8>, value: f64) -> MuxResult<()> {
    out.write_i32::<BigEndian>((value * 65_536.0).round() as i32)?;
    Ok(())
}

pub fn write_fixed_8_8(out: &mut Vec<u8>, value: f64) -> MuxResult<()> {
    out.write_i16::<BigEndian>((value * 256.0).round() as i16)?;
    Ok(())
}

/// Identity transformation matrix used by movie and track headers.
pub fn write_unity_matrix(out: &mut Vec<u8>) -> MuxResult<()> {
    for value in [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000u32] {
        out.write_u32::<BigEndian>(value)?;
    }
    Ok(())
}

/// Pack an ISO-639-2 code into 15 bits (three 5-bit letters).
pub fn pack_language(code: &str) -> u16 {
    code.bytes()
        .take(3)
        .fold(0u16, |acc, b| (acc << 5) | (b.saturating_sub(0x60) as u16 & 0x1F))
}

/// Convert microseconds to ticks of `timescale`, rounding to nearest.
pub fn micros_to_ticks(micros: i64, timescale: u32) -> u64 {
    let micros = micros.max(0) as u128;
    ((micros * timescale as u128 + 500_000) / 1_000_000) as u64
}

/// Rescale a tick count between timescales, rounding to nearest.
pub fn rescale(ticks: u64, from: u32, to: u32) -> u64 {
    if from == 0 {
        return 0;
    }
    ((ticks as u128 * to as u128 + from as u128 / 2) / from as u128) as u64
}

/// Write an MPEG-4 descriptor: tag, expandable length, payload.
pub fn write_descriptor(out: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    out.push(tag);
    let len = payload.len();
    let mut groups = Vec::with_capacity(4);
    let mut rest = len;
    loop {
        groups.push((rest & 0x7F) as u8);
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for (i, group) in groups.iter().rev().enumerate() {
        let more = if i + 1 < groups.len() { 0x80 } else { 0 };
        out.push(group | more);
    }
    out.extend_from_slice(payload);
}
