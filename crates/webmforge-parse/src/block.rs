//! Block, SimpleBlock and BlockGroup decoding.
//!
//! Only headers are decoded here. Each frame is recorded as an absolute
//! `(pos, len)` range and its bytes are read on request.
//!
//! ```text
//! Block body:
//! +--------------+----------------+-------+---------------------+--------+
//! | track (vint) | timecode (i16) | flags | lace count + sizes? | frames |
//! +--------------+----------------+-------+---------------------+--------+
//! ```

use crate::skip_unknown;
use tracing::trace;
use webmforge_ebml::lacing::{FLAG_DISCARDABLE, FLAG_INVISIBLE, FLAG_KEY};
use webmforge_ebml::reader::{children, read_int, read_uint, read_vint, MAX_ELEMENT_PAYLOAD};
use webmforge_ebml::vint::{self, MAX_VINT_LENGTH};
use webmforge_ebml::{ElementHeader, ElementId, Error, Lacing, MkvReader, Result};

/// Byte range of one frame inside the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFrame {
    /// Absolute position of the first payload byte.
    pub pos: u64,
    pub len: u64,
}

impl BlockFrame {
    /// Read the frame payload.
    pub fn read<R: MkvReader + ?Sized>(&self, reader: &mut R) -> Result<Vec<u8>> {
        if self.len > MAX_ELEMENT_PAYLOAD {
            return Err(Error::format(format!(
                "frame of {} bytes at {} exceeds maximum {MAX_ELEMENT_PAYLOAD}",
                self.len, self.pos
            )));
        }
        let mut data = vec![0u8; self.len as usize];
        reader.read_at(self.pos, &mut data)?;
        Ok(data)
    }
}

/// A decoded Block or SimpleBlock header.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pos: u64,
    track: u64,
    cluster_timecode: u64,
    relative_timecode: i16,
    flags: u8,
    is_key: bool,
    lacing: Lacing,
    frames: Vec<BlockFrame>,
    discard_padding: i64,
}

impl Block {
    /// Decode the block whose element header is `header`.
    ///
    /// `cluster_timecode` is the owning cluster's Timecode, kept so the
    /// absolute time can be resolved without a back-reference.
    pub fn parse<R: MkvReader + ?Sized>(
        reader: &mut R,
        header: &ElementHeader,
        cluster_timecode: u64,
    ) -> Result<Self> {
        let end = header
            .end()
            .ok_or_else(|| Error::format(format!("{} at {} has unknown size", header.id, header.pos)))?;
        let (track, track_len) = read_vint(reader, header.payload_pos())?;
        let mut cursor = LaceCursor {
            pos: header.payload_pos() + track_len as u64,
            end,
        };

        let timecode = [cursor.u8(reader)?, cursor.u8(reader)?];
        let relative_timecode = i16::from_be_bytes(timecode);
        let flags = cursor.u8(reader)?;
        let lacing = Lacing::from_flags(flags);
        let frames = decode_frames(reader, &mut cursor, lacing)?;

        let block = Self {
            pos: header.pos,
            track,
            cluster_timecode,
            relative_timecode,
            flags,
            is_key: header.id == ElementId::SIMPLE_BLOCK && flags & FLAG_KEY != 0,
            lacing,
            frames,
            discard_padding: 0,
        };
        trace!(
            track,
            timecode = block.timecode(),
            frames = block.frames.len(),
            pos = header.pos,
            "decoded block"
        );
        Ok(block)
    }

    /// Position of the Block or SimpleBlock element.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn track_number(&self) -> u64 {
        self.track
    }

    /// Timecode relative to the owning cluster, in ticks.
    pub fn relative_timecode(&self) -> i16 {
        self.relative_timecode
    }

    /// Timecode of the owning cluster, in ticks.
    pub fn cluster_timecode(&self) -> u64 {
        self.cluster_timecode
    }

    /// Absolute timecode in ticks.
    pub fn timecode(&self) -> i64 {
        i64::try_from(self.cluster_timecode)
            .unwrap_or(i64::MAX)
            .saturating_add(self.relative_timecode as i64)
    }

    /// Absolute time in nanoseconds. Saturates instead of overflowing.
    pub fn time_ns(&self, timecode_scale: u64) -> i64 {
        let scale = i64::try_from(timecode_scale).unwrap_or(i64::MAX);
        self.timecode().saturating_mul(scale)
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    pub fn is_invisible(&self) -> bool {
        self.flags & FLAG_INVISIBLE != 0
    }

    /// Discardable flag. Only meaningful on SimpleBlocks.
    pub fn is_discardable(&self) -> bool {
        self.flags & FLAG_DISCARDABLE != 0
    }

    pub fn lacing(&self) -> Lacing {
        self.lacing
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<&BlockFrame> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[BlockFrame] {
        &self.frames
    }

    /// Discard padding in nanoseconds, 0 when absent.
    pub fn discard_padding(&self) -> i64 {
        self.discard_padding
    }
}

/// Position cursor over the bytes of a block body.
struct LaceCursor {
    pos: u64,
    end: u64,
}

impl LaceCursor {
    fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.pos)
    }

    fn take(&mut self, len: u64) -> Result<()> {
        if len > self.remaining() {
            return Err(Error::format(format!("block header overruns block at {}", self.pos)));
        }
        self.pos += len;
        Ok(())
    }

    fn u8<R: MkvReader + ?Sized>(&mut self, reader: &mut R) -> Result<u8> {
        let mut byte = [0u8; 1];
        let at = self.pos;
        self.take(1)?;
        reader.read_at(at, &mut byte)?;
        Ok(byte[0])
    }

    fn vint<R: MkvReader + ?Sized>(&mut self, reader: &mut R) -> Result<u64> {
        let (value, len) = read_vint(reader, self.pos)?;
        self.take(len as u64)?;
        Ok(value)
    }

    fn signed_vint<R: MkvReader + ?Sized>(&mut self, reader: &mut R) -> Result<i64> {
        let mut buf = [0u8; MAX_VINT_LENGTH];
        reader.read_at(self.pos, &mut buf[..1])?;
        let len = vint::vint_length(buf[0]).ok_or(Error::InvalidVint { offset: self.pos })?;
        if len > 1 {
            reader.read_at(self.pos + 1, &mut buf[1..len])?;
        }
        let (value, _) = vint::decode_signed_vint(&buf[..len])?;
        self.take(len as u64)?;
        Ok(value)
    }
}

fn decode_frames<R: MkvReader + ?Sized>(
    reader: &mut R,
    cursor: &mut LaceCursor,
    lacing: Lacing,
) -> Result<Vec<BlockFrame>> {
    if lacing == Lacing::None {
        if cursor.remaining() == 0 {
            return Err(Error::format(format!("empty block at {}", cursor.pos)));
        }
        return Ok(vec![BlockFrame {
            pos: cursor.pos,
            len: cursor.remaining(),
        }]);
    }

    let count = cursor.u8(reader)? as usize + 1;
    let mut sizes = Vec::with_capacity(count);
    match lacing {
        Lacing::Xiph => {
            for _ in 0..count - 1 {
                let mut size = 0u64;
                loop {
                    let byte = cursor.u8(reader)?;
                    size += byte as u64;
                    if byte != 0xFF {
                        break;
                    }
                }
                sizes.push(size);
            }
        }
        Lacing::Ebml => {
            let mut size = cursor.vint(reader)?;
            sizes.push(size);
            for _ in 1..count - 1 {
                let diff = cursor.signed_vint(reader)?;
                size = size
                    .checked_add_signed(diff)
                    .ok_or_else(|| Error::format(format!("negative EBML lace size near {}", cursor.pos)))?;
                sizes.push(size);
            }
        }
        Lacing::Fixed => {
            let total = cursor.remaining();
            if total % count as u64 != 0 {
                return Err(Error::format(format!(
                    "fixed lace of {total} bytes does not split into {count} frames"
                )));
            }
            sizes.resize(count - 1, total / count as u64);
        }
        Lacing::None => {}
    }

    let laced: u64 = sizes.iter().sum();
    let last = cursor
        .remaining()
        .checked_sub(laced)
        .ok_or_else(|| Error::format(format!("lace sizes overrun block near {}", cursor.pos)))?;
    sizes.push(last);

    let mut frames = Vec::with_capacity(count);
    let mut pos = cursor.pos;
    for len in sizes {
        if len == 0 {
            return Err(Error::format(format!("empty laced frame at {pos}")));
        }
        frames.push(BlockFrame { pos, len });
        pos += len;
    }
    Ok(frames)
}

/// One BlockAdditions entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockAddition {
    pub add_id: u64,
    pub data: BlockFrame,
}

/// A BlockGroup: one Block plus its optional children.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGroup {
    block: Block,
    duration: Option<u64>,
    references: Vec<i64>,
    additions: Vec<BlockAddition>,
}

impl BlockGroup {
    /// Decode a BlockGroup element.
    pub fn parse<R: MkvReader + ?Sized>(
        reader: &mut R,
        header: &ElementHeader,
        cluster_timecode: u64,
    ) -> Result<Self> {
        let mut block = None;
        let mut duration = None;
        let mut references = Vec::new();
        let mut additions = Vec::new();
        let mut discard_padding = 0;

        let mut it = children(reader, header)?;
        while let Some(child) = it.next_header()? {
            let r = it.reader();
            match child.id {
                ElementId::BLOCK if block.is_some() => {
                    return Err(Error::format(format!("BlockGroup at {} holds two Blocks", header.pos)));
                }
                ElementId::BLOCK => block = Some(Block::parse(r, &child, cluster_timecode)?),
                ElementId::BLOCK_DURATION => duration = Some(read_uint(r, &child)?),
                ElementId::REFERENCE_BLOCK => references.push(read_int(r, &child)?),
                ElementId::DISCARD_PADDING => discard_padding = read_int(r, &child)?,
                ElementId::BLOCK_ADDITIONS => parse_additions(r, &child, &mut additions)?,
                _ => skip_unknown(&child, "BlockGroup"),
            }
        }

        let mut block =
            block.ok_or_else(|| Error::format(format!("BlockGroup at {} has no Block", header.pos)))?;
        block.is_key = references.is_empty();
        block.discard_padding = discard_padding;
        Ok(Self {
            block,
            duration,
            references,
            additions,
        })
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    /// BlockDuration in ticks.
    pub fn duration(&self) -> Option<u64> {
        self.duration
    }

    /// ReferenceBlock values, relative timecodes in ticks.
    pub fn references(&self) -> &[i64] {
        &self.references
    }

    pub fn additions(&self) -> &[BlockAddition] {
        &self.additions
    }
}

fn parse_additions<R: MkvReader + ?Sized>(
    reader: &mut R,
    header: &ElementHeader,
    additions: &mut Vec<BlockAddition>,
) -> Result<()> {
    let mut it = children(reader, header)?;
    while let Some(more) = it.next_header()? {
        if more.id != ElementId::BLOCK_MORE {
            skip_unknown(&more, "BlockAdditions");
            continue;
        }
        let mut add_id = 1;
        let mut data = None;
        let mut fields = children(it.reader(), &more)?;
        while let Some(field) = fields.next_header()? {
            match field.id {
                ElementId::BLOCK_ADD_ID => add_id = read_uint(fields.reader(), &field)?,
                ElementId::BLOCK_ADDITIONAL => {
                    data = Some(BlockFrame {
                        pos: field.payload_pos(),
                        len: field.known_size()?,
                    })
                }
                _ => skip_unknown(&field, "BlockMore"),
            }
        }
        match data {
            Some(data) => additions.push(BlockAddition { add_id, data }),
            None => return Err(Error::format(format!("BlockMore at {} has no data", more.pos))),
        }
    }
    Ok(())
}

/// Kind of a cluster entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    SimpleBlock,
    BlockGroup,
}

/// One entry of a cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockEntry {
    Simple(Block),
    Group(BlockGroup),
}

impl BlockEntry {
    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Simple(_) => BlockKind::SimpleBlock,
            Self::Group(_) => BlockKind::BlockGroup,
        }
    }

    pub fn block(&self) -> &Block {
        match self {
            Self::Simple(block) => block,
            Self::Group(group) => group.block(),
        }
    }

    pub fn group(&self) -> Option<&BlockGroup> {
        match self {
            Self::Simple(_) => None,
            Self::Group(group) => Some(group),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bytes::{BufMut, BytesMut};
    use webmforge_ebml::element::put_master;
    use webmforge_ebml::{peek_element, EbmlBufMut};

    fn simple_block(flags: u8, body: &[u8]) -> Vec<u8> {
        let mut payload = BytesMut::new();
        payload.put_u8(0x81);
        payload.put_i16(-3);
        payload.put_u8(flags);
        payload.put_slice(body);
        let mut buf = BytesMut::new();
        buf.put_bytes_element(ElementId::SIMPLE_BLOCK, &payload);
        buf.to_vec()
    }

    fn parse_simple(data: &[u8]) -> Result<Block> {
        let mut reader = data;
        let header = peek_element(&mut reader, 0)?;
        Block::parse(&mut reader, &header, 10)
    }

    #[test]
    fn test_unlaced_simple_block() {
        let data = simple_block(FLAG_KEY | FLAG_INVISIBLE, b"frame");
        let block = parse_simple(&data).unwrap();
        assert_eq!(block.track_number(), 1);
        assert_eq!(block.relative_timecode(), -3);
        assert_eq!(block.timecode(), 7);
        assert_eq!(block.time_ns(1_000_000), 7_000_000);
        assert!(block.is_key());
        assert!(block.is_invisible());
        assert!(!block.is_discardable());
        assert_eq!(block.lacing(), Lacing::None);
        let frame = *block.frame(0).unwrap();
        assert_eq!(frame.read(&mut &data[..]).unwrap(), b"frame");
    }

    #[test]
    fn test_large_timecode_saturates() {
        let data = simple_block(FLAG_KEY, b"frame");
        let mut reader = &data[..];
        let header = peek_element(&mut reader, 0).unwrap();
        let block = Block::parse(&mut reader, &header, 1 << 50).unwrap();
        assert_eq!(block.time_ns(1_000_000), i64::MAX);
        let block = Block::parse(&mut &data[..], &header, u64::MAX).unwrap();
        assert_eq!(block.timecode(), i64::MAX - 3);
    }

    #[test]
    fn test_xiph_lacing() {
        let mut body = vec![2, 0xFF, 0x01, 0x02];
        body.extend(std::iter::repeat(b'a').take(256));
        body.extend_from_slice(b"bb");
        body.extend_from_slice(b"ccc");
        let data = simple_block(Lacing::Xiph.flag_bits(), &body);
        let block = parse_simple(&data).unwrap();
        let lens: Vec<u64> = block.frames().iter().map(|f| f.len).collect();
        assert_eq!(lens, vec![256, 2, 3]);
        assert_eq!(block.frame(2).unwrap().read(&mut &data[..]).unwrap(), b"ccc");
    }

    #[test]
    fn test_fixed_lacing() {
        let data = simple_block(Lacing::Fixed.flag_bits(), &[1, b'a', b'a', b'b', b'b']);
        let block = parse_simple(&data).unwrap();
        assert_eq!(block.frame_count(), 2);
        assert_eq!(block.frame(1).unwrap().read(&mut &data[..]).unwrap(), b"bb");

        let uneven = simple_block(Lacing::Fixed.flag_bits(), &[1, b'a', b'a', b'b']);
        assert_matches!(parse_simple(&uneven), Err(Error::Format(_)));
    }

    #[test]
    fn test_ebml_lacing() {
        // Sizes 4, 2, 3: first 4, diff -2, last implied
        let mut body = vec![2, 0x84, 0xBD];
        body.extend_from_slice(b"aaaabbccc");
        let data = simple_block(Lacing::Ebml.flag_bits(), &body);
        let block = parse_simple(&data).unwrap();
        let lens: Vec<u64> = block.frames().iter().map(|f| f.len).collect();
        assert_eq!(lens, vec![4, 2, 3]);
    }

    #[test]
    fn test_lace_overrun_rejected() {
        let mut body = vec![1, 0x90];
        body.extend_from_slice(b"abc");
        let data = simple_block(Lacing::Ebml.flag_bits(), &body);
        assert_matches!(parse_simple(&data), Err(Error::Format(_)));
    }

    #[test]
    fn test_block_group() {
        let mut block = BytesMut::new();
        block.put_u8(0x82);
        block.put_i16(5);
        block.put_u8(0);
        block.put_slice(b"payload");
        let mut buf = BytesMut::new();
        put_master(&mut buf, ElementId::BLOCK_GROUP, |buf| {
            buf.put_bytes_element(ElementId::BLOCK, &block);
            put_master(buf, ElementId::BLOCK_ADDITIONS, |buf| {
                put_master(buf, ElementId::BLOCK_MORE, |buf| {
                    buf.put_uint_element(ElementId::BLOCK_ADD_ID, 4);
                    buf.put_bytes_element(ElementId::BLOCK_ADDITIONAL, b"alpha");
                });
            });
            buf.put_int_element(ElementId::DISCARD_PADDING, -128);
            buf.put_int_element(ElementId::REFERENCE_BLOCK, -5);
            buf.put_uint_element(ElementId::BLOCK_DURATION, 2);
        });
        let data = buf.to_vec();
        let mut reader = &data[..];
        let header = peek_element(&mut reader, 0).unwrap();
        let group = BlockGroup::parse(&mut reader, &header, 0).unwrap();

        assert_eq!(group.block().track_number(), 2);
        assert!(!group.block().is_key());
        assert_eq!(group.block().discard_padding(), -128);
        assert_eq!(group.references(), &[-5]);
        assert_eq!(group.duration(), Some(2));
        let addition = group.additions()[0];
        assert_eq!(addition.add_id, 4);
        assert_eq!(addition.data.read(&mut reader).unwrap(), b"alpha");
    }

    #[test]
    fn test_block_group_without_block() {
        let mut buf = BytesMut::new();
        put_master(&mut buf, ElementId::BLOCK_GROUP, |buf| {
            buf.put_uint_element(ElementId::BLOCK_DURATION, 2);
        });
        let data = buf.to_vec();
        let mut reader = &data[..];
        let header = peek_element(&mut reader, 0).unwrap();
        assert_matches!(BlockGroup::parse(&mut reader, &header, 0), Err(Error::Format(_)));
    }
}
