//! Cluster buffering and block encoding.
//!
//! Blocks are encoded once, before the cluster policy runs, with a zero
//! relative timecode. Once the owning cluster is known the 16-bit timecode is
//! patched in place.
//!
//! ```text
//! SimpleBlock / Block body:
//! +--------------+----------------+-------+------------+---------+
//! | track (vint) | timecode (i16) | flags | lace head? | frames  |
//! +--------------+----------------+-------+------------+---------+
//! ```

use crate::frame::Frame;
use bytes::{BufMut, BytesMut};
use webmforge_ebml::element::{header_size, put_master};
use webmforge_ebml::lacing::{Lacing, FLAG_KEY};
use webmforge_ebml::vint::{self, PATCHABLE_SIZE_WIDTH};
use webmforge_ebml::{EbmlBufMut, ElementId, Error, Result};

/// Bytes taken by a Cluster header with a patchable 8-byte size.
pub const CLUSTER_HEADER_SIZE: u64 = 4 + PATCHABLE_SIZE_WIDTH as u64;

/// Maximum frames in one lace.
pub const MAX_LACED_FRAMES: usize = 256;

/// A fully encoded SimpleBlock or BlockGroup awaiting its cluster.
#[derive(Debug, Clone)]
pub struct EncodedBlock {
    bytes: BytesMut,
    timecode_offset: usize,
    is_group: bool,
}

impl EncodedBlock {
    /// Encoded length in bytes.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether this is a BlockGroup rather than a SimpleBlock.
    pub fn is_group(&self) -> bool {
        self.is_group
    }

    fn set_timecode(&mut self, relative: i16) {
        let at = self.timecode_offset;
        self.bytes[at..at + 2].copy_from_slice(&relative.to_be_bytes());
    }
}

/// Block body: track number, timecode placeholder, flags, frame data.
/// Returns the offset of the timecode within `buf`.
fn put_block_body(buf: &mut BytesMut, track: u64, flags: u8, data: &[u8]) -> Result<usize> {
    buf.put_slice(&vint::encode_size_minimal(track)?);
    let offset = buf.len();
    buf.put_i16(0);
    buf.put_u8(flags);
    buf.put_slice(data);
    Ok(offset)
}

/// Encode a frame as a SimpleBlock or BlockGroup.
///
/// `reference` is the relative timecode (ticks) of the referenced block, used
/// for non-key frames that need a BlockGroup.
pub fn encode_frame(frame: &Frame<'_>, timecode_scale: u64, reference: Option<i64>) -> Result<EncodedBlock> {
    if frame.can_be_simple_block() {
        let flags = if frame.is_key { FLAG_KEY } else { 0 };
        return encode_simple_block(frame.track, flags, frame.payload);
    }

    let mut block = BytesMut::with_capacity(frame.payload.len() + 4);
    let body_offset = put_block_body(&mut block, frame.track, 0, frame.payload)?;

    let mut children = BytesMut::with_capacity(block.len() + 32);
    children.put_element_header(ElementId::BLOCK, block.len() as u64);
    let timecode_offset_in_children = children.len() + body_offset;
    children.put_slice(&block);

    if let Some((add_id, data)) = frame.additional {
        put_master(&mut children, ElementId::BLOCK_ADDITIONS, |buf| {
            put_master(buf, ElementId::BLOCK_MORE, |buf| {
                buf.put_uint_element(ElementId::BLOCK_ADD_ID, add_id);
                buf.put_bytes_element(ElementId::BLOCK_ADDITIONAL, data);
            });
        });
    }
    if let Some(padding) = frame.discard_padding {
        children.put_int_element(ElementId::DISCARD_PADDING, padding);
    }
    if !frame.is_key {
        children.put_int_element(ElementId::REFERENCE_BLOCK, reference.unwrap_or(0));
    }
    if let Some(duration) = frame.duration {
        children.put_uint_element(ElementId::BLOCK_DURATION, duration / timecode_scale);
    }

    let group_header = header_size(ElementId::BLOCK_GROUP, children.len() as u64) as usize;
    let mut bytes = BytesMut::with_capacity(group_header + children.len());
    bytes.put_element_header(ElementId::BLOCK_GROUP, children.len() as u64);
    bytes.put_slice(&children);

    Ok(EncodedBlock {
        bytes,
        timecode_offset: group_header + timecode_offset_in_children,
        is_group: true,
    })
}

fn encode_simple_block(track: u64, flags: u8, data: &[u8]) -> Result<EncodedBlock> {
    let mut body = BytesMut::with_capacity(data.len() + 4);
    let body_offset = put_block_body(&mut body, track, flags, data)?;
    wrap_simple_block(body, body_offset)
}

fn wrap_simple_block(body: BytesMut, body_offset: usize) -> Result<EncodedBlock> {
    let header = header_size(ElementId::SIMPLE_BLOCK, body.len() as u64) as usize;
    let mut bytes = BytesMut::with_capacity(header + body.len());
    bytes.put_element_header(ElementId::SIMPLE_BLOCK, body.len() as u64);
    bytes.put_slice(&body);
    Ok(EncodedBlock {
        bytes,
        timecode_offset: header + body_offset,
        is_group: false,
    })
}

/// Encode several frames sharing one timestamp as an EBML-laced SimpleBlock.
pub fn encode_laced(track: u64, payloads: &[&[u8]], is_key: bool) -> Result<EncodedBlock> {
    if payloads.is_empty() || payloads.len() > MAX_LACED_FRAMES {
        return Err(Error::validation(format!(
            "lace must hold 1 to {MAX_LACED_FRAMES} frames, got {}",
            payloads.len()
        )));
    }
    if payloads.iter().any(|p| p.is_empty()) {
        return Err(Error::EmptyPayload);
    }
    let key = if is_key { FLAG_KEY } else { 0 };
    if let [single] = payloads {
        return encode_simple_block(track, key, single);
    }

    let total: usize = payloads.iter().map(|p| p.len()).sum();
    let mut lace = BytesMut::with_capacity(total + payloads.len() * 2 + 1);
    lace.put_u8((payloads.len() - 1) as u8);
    lace.put_slice(&vint::encode_size_minimal(payloads[0].len() as u64)?);
    for pair in payloads[..payloads.len() - 1].windows(2) {
        let diff = pair[1].len() as i64 - pair[0].len() as i64;
        lace.put_slice(&vint::encode_signed_vint(diff)?);
    }
    for payload in payloads {
        lace.put_slice(payload);
    }

    let mut body = BytesMut::with_capacity(lace.len() + 4);
    let body_offset = put_block_body(&mut body, track, key | Lacing::Ebml.flag_bits(), &lace)?;
    wrap_simple_block(body, body_offset)
}

/// The cluster currently accepting blocks.
///
/// Its payload is buffered so it can be written with an exact size when
/// closed, on any sink.
#[derive(Debug)]
pub struct ActiveCluster {
    timecode: u64,
    position: u64,
    payload: BytesMut,
    block_count: u64,
}

impl ActiveCluster {
    /// Open a cluster with base `timecode` (ticks) at `position`, relative to
    /// the segment payload.
    pub fn new(timecode: u64, position: u64) -> Self {
        let mut payload = BytesMut::with_capacity(64 * 1024);
        payload.put_uint_element(ElementId::TIMECODE, timecode);
        Self {
            timecode,
            position,
            payload,
            block_count: 0,
        }
    }

    /// Base timecode in ticks.
    pub fn timecode(&self) -> u64 {
        self.timecode
    }

    /// Position relative to the segment payload.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Encoded size of the cluster element so far.
    pub fn encoded_size(&self) -> u64 {
        CLUSTER_HEADER_SIZE + self.payload.len() as u64
    }

    /// Timecode of `ticks` relative to this cluster, if it fits a block.
    pub fn relative_timecode(&self, ticks: u64) -> Option<i16> {
        let relative = ticks as i128 - self.timecode as i128;
        i16::try_from(relative).ok()
    }

    /// Append a block at `relative` ticks. Returns its 1-based block number.
    pub fn add_block(&mut self, mut block: EncodedBlock, relative: i16) -> u64 {
        block.set_timecode(relative);
        self.payload.put_slice(&block.bytes);
        self.block_count += 1;
        self.block_count
    }

    /// Serialize the closed cluster.
    pub fn finish(self) -> BytesMut {
        let mut out = BytesMut::with_capacity(self.encoded_size() as usize);
        out.put_element_id(ElementId::CLUSTER);
        out.put_element_size_width(self.payload.len() as u64, PATCHABLE_SIZE_WIDTH);
        out.put_slice(&self.payload);
        out
    }
}
