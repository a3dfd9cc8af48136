//! Variable-length integer codec.
//!
//! EBML encodes element IDs and element sizes with a leading-zero length
//! prefix: the number of leading zero bits in the first byte, plus one, is the
//! total encoded length (1-8 bytes). The first set bit is the marker; the
//! remaining bits hold the value, most significant byte first.
//!
//! ```text
//! 1xxxxxxx                              1 byte,  7 value bits
//! 01xxxxxx xxxxxxxx                     2 bytes, 14 value bits
//! 001xxxxx xxxxxxxx xxxxxxxx            3 bytes, 21 value bits
//! ...
//! 00000001 xxxxxxxx ... (7 more)        8 bytes, 56 value bits
//! ```
//!
//! For sizes, the all-ones value of a given width is reserved and means
//! "unknown size". Plain integer payloads (element values, not headers) use a
//! separate fixed-width big-endian representation handled by
//! [`decode_uint`] and [`decode_int`].

use crate::error::{Error, Result};
use std::ops::Deref;

/// Maximum varint length in bytes.
pub const MAX_VINT_LENGTH: usize = 8;

/// Maximum element ID length in bytes.
pub const MAX_ID_LENGTH: usize = 4;

/// Largest finite value an 8-byte size varint can carry.
pub const MAX_SIZE_VALUE: u64 = (1 << 56) - 2;

/// Width used for size fields that are rewritten after the fact.
pub const PATCHABLE_SIZE_WIDTH: usize = 8;

/// A varint encoded into a fixed stack buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedVint {
    buf: [u8; MAX_VINT_LENGTH],
    len: usize,
}

impl EncodedVint {
    fn from_u64(value: u64, len: usize) -> Self {
        let all = value.to_be_bytes();
        let mut buf = [0u8; MAX_VINT_LENGTH];
        buf[..len].copy_from_slice(&all[MAX_VINT_LENGTH - len..]);
        Self { buf, len }
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; a varint occupies at least one byte.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for EncodedVint {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

fn marker(width: usize) -> u64 {
    1u64 << (7 * width)
}

/// Bytes needed to encode `value` as a size varint.
///
/// The all-ones pattern of each width is reserved for "unknown", so e.g.
/// `0x7F` needs two bytes.
pub fn coded_size(value: u64) -> usize {
    (1..MAX_VINT_LENGTH)
        .find(|&width| value < marker(width) - 1)
        .unwrap_or(MAX_VINT_LENGTH)
}

/// Encode a size varint using exactly `width` bytes.
pub fn encode_size(value: u64, width: usize) -> Result<EncodedVint> {
    if !(1..=MAX_VINT_LENGTH).contains(&width) {
        return Err(Error::validation(format!("varint width {width} out of range")));
    }
    if value > MAX_SIZE_VALUE || coded_size(value) > width {
        return Err(Error::validation(format!(
            "value {value} does not fit a {width}-byte varint"
        )));
    }
    Ok(EncodedVint::from_u64(value | marker(width), width))
}

/// Encode a size varint using the minimal width.
pub fn encode_size_minimal(value: u64) -> Result<EncodedVint> {
    encode_size(value, coded_size(value))
}

/// The reserved "unknown size" encoding for a width.
pub fn encode_unknown_size(width: usize) -> Result<EncodedVint> {
    if !(1..=MAX_VINT_LENGTH).contains(&width) {
        return Err(Error::validation(format!("varint width {width} out of range")));
    }
    Ok(EncodedVint::from_u64((marker(width) << 1) - 1, width))
}

/// Encoded length of an element ID.
pub fn id_size(id: u32) -> usize {
    match id {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

/// Encode an element ID. IDs carry their own marker bits.
pub fn encode_id(id: u32) -> EncodedVint {
    EncodedVint::from_u64(id as u64, id_size(id))
}

/// Length in bytes announced by the first byte of a varint.
pub fn vint_length(first: u8) -> Option<usize> {
    if first == 0 {
        None
    } else {
        Some(first.leading_zeros() as usize + 1)
    }
}

/// Decode a varint from the start of `buf`.
///
/// Returns the value with the marker bit stripped and the encoded length.
pub fn decode_vint(buf: &[u8]) -> Result<(u64, usize)> {
    let first = *buf.first().ok_or(Error::EndOfStream { offset: 0 })?;
    let len = vint_length(first).ok_or(Error::InvalidVint { offset: 0 })?;
    if buf.len() < len {
        return Err(Error::EndOfStream {
            offset: buf.len() as u64,
        });
    }

    let mut value = first as u64 & (0xFF >> len);
    for &byte in &buf[1..len] {
        value = (value << 8) | byte as u64;
    }
    Ok((value, len))
}

/// Decode a size varint. `None` means the reserved "unknown size" value.
pub fn decode_size(buf: &[u8]) -> Result<(Option<u64>, usize)> {
    let (value, len) = decode_vint(buf)?;
    if value == marker(len) - 1 {
        Ok((None, len))
    } else {
        Ok((Some(value), len))
    }
}

/// Decode an element ID, keeping its marker bits.
pub fn decode_id(buf: &[u8]) -> Result<(u32, usize)> {
    let first = *buf.first().ok_or(Error::EndOfStream { offset: 0 })?;
    let len = match vint_length(first) {
        Some(len) if len <= MAX_ID_LENGTH => len,
        _ => return Err(Error::InvalidElementId { offset: 0 }),
    };
    if buf.len() < len {
        return Err(Error::EndOfStream {
            offset: buf.len() as u64,
        });
    }

    let id = buf[..len]
        .iter()
        .fold(0u32, |acc, &byte| (acc << 8) | byte as u32);

    // All value bits set is reserved.
    let value_mask = (1u32 << (7 * len)) - 1;
    if id & value_mask == value_mask {
        return Err(Error::InvalidElementId { offset: 0 });
    }
    Ok((id, len))
}

fn signed_bias(width: usize) -> i64 {
    (1i64 << (7 * width - 1)) - 1
}

/// Encode a signed varint (EBML lace size difference) at minimal width.
///
/// The value is stored with a bias of `2^(7n-1) - 1` added.
pub fn encode_signed_vint(value: i64) -> Result<EncodedVint> {
    let width = (1..=MAX_VINT_LENGTH)
        .find(|&width| value.unsigned_abs() <= signed_bias(width) as u64)
        .ok_or_else(|| Error::validation(format!("signed value {value} out of varint range")))?;
    encode_size((value + signed_bias(width)) as u64, width)
}

/// Decode a signed varint. Returns `(value, len)`.
pub fn decode_signed_vint(buf: &[u8]) -> Result<(i64, usize)> {
    let (raw, len) = decode_vint(buf)?;
    Ok((raw as i64 - signed_bias(len), len))
}

/// Minimal width of an unsigned integer payload.
pub fn uint_size(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

/// Minimal width of a signed (two's-complement) integer payload.
pub fn int_size(value: i64) -> usize {
    let magnitude = if value < 0 { !value } else { value } as u64;
    // One extra bit keeps the sign bit of the top byte correct.
    uint_size(magnitude << 1)
}

/// Big-endian bytes of `value` in `width` bytes.
pub fn encode_uint(value: u64, width: usize) -> Result<EncodedVint> {
    if !(1..=MAX_VINT_LENGTH).contains(&width) || uint_size(value) > width {
        return Err(Error::validation(format!(
            "unsigned value {value} does not fit {width} bytes"
        )));
    }
    Ok(EncodedVint::from_u64(value, width))
}

/// Two's-complement bytes of `value` truncated to `width` bytes.
pub fn encode_int(value: i64, width: usize) -> Result<EncodedVint> {
    if !(1..=MAX_VINT_LENGTH).contains(&width) || int_size(value) > width {
        return Err(Error::validation(format!(
            "signed value {value} does not fit {width} bytes"
        )));
    }
    Ok(EncodedVint::from_u64(value as u64, width))
}

/// Decode an unsigned integer payload of 0-8 bytes.
pub fn decode_uint(bytes: &[u8]) -> Result<u64> {
    if bytes.len() > MAX_VINT_LENGTH {
        return Err(Error::format(format!(
            "unsigned integer of {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

/// Decode a signed integer payload of 0-8 bytes.
///
/// The sign is taken from the top bit of the declared width, so `[0x80]`
/// is -128 while `[0x00, 0xC3, 0x77, 0x10]` is 12810000.
pub fn decode_int(bytes: &[u8]) -> Result<i64> {
    let raw = decode_uint(bytes)?;
    if bytes.is_empty() {
        return Ok(0);
    }
    let shift = 64 - 8 * bytes.len() as u32;
    Ok(((raw << shift) as i64) >> shift)
}

/// Decode a 0, 4 or 8 byte IEEE-754 float payload.
pub fn decode_float(bytes: &[u8]) -> Result<f64> {
    match bytes.len() {
        0 => Ok(0.0),
        4 => {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(bytes);
            Ok(f32::from_be_bytes(raw) as f64)
        }
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            Ok(f64::from_be_bytes(raw))
        }
        n => Err(Error::format(format!("float of {n} bytes"))),
    }
}
