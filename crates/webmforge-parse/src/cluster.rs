//! Lazily decoded clusters.

use crate::block::{Block, BlockEntry, BlockGroup};
use crate::skip_unknown;
use tracing::debug;
use webmforge_ebml::reader::read_uint;
use webmforge_ebml::{peek_element, ElementHeader, ElementId, Error, MkvReader, Result};

/// Whether `id` can only appear at the top level of a Segment (or above it).
///
/// Such an element ends an unknown-size cluster.
pub(crate) fn is_top_level(id: ElementId) -> bool {
    matches!(
        id,
        ElementId::CLUSTER
            | ElementId::CUES
            | ElementId::TAGS
            | ElementId::CHAPTERS
            | ElementId::SEEK_HEAD
            | ElementId::INFO
            | ElementId::TRACKS
            | ElementId::SEGMENT
            | ElementId::EBML
    )
}

/// A cluster whose entries are decoded one at a time.
#[derive(Debug, Clone)]
pub struct Cluster {
    pos: u64,
    payload_pos: u64,
    end: Option<u64>,
    limit: Option<u64>,
    timecode: u64,
    entries: Vec<BlockEntry>,
    next_pos: u64,
    done: bool,
}

impl Cluster {
    /// Open the cluster at `header`, reading up to its Timecode.
    ///
    /// `limit` bounds an unknown-size cluster (the segment end, if known).
    pub fn open<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader, limit: Option<u64>) -> Result<Self> {
        let end = header.end();
        let limit = end.or(limit).or(reader.length());
        let mut pos = header.payload_pos();
        let timecode = loop {
            if limit.is_some_and(|limit| pos >= limit) {
                return Err(Error::format(format!("Cluster at {} has no Timecode", header.pos)));
            }
            let child = peek_element(reader, pos)?;
            child.check_within(end)?;
            match child.id {
                ElementId::TIMECODE => {
                    let timecode = read_uint(reader, &child)?;
                    pos = child.payload_pos() + child.known_size()?;
                    break timecode;
                }
                ElementId::SIMPLE_BLOCK | ElementId::BLOCK_GROUP => {
                    return Err(Error::format(format!("block before Timecode in Cluster at {}", header.pos)));
                }
                id if is_top_level(id) => {
                    return Err(Error::format(format!("Cluster at {} has no Timecode", header.pos)));
                }
                ElementId::POSITION | ElementId::PREV_SIZE => {}
                _ => skip_unknown(&child, "Cluster"),
            }
            pos = child.payload_pos() + child.known_size()?;
        };

        debug!(pos = header.pos, timecode, size = ?header.size, "opened cluster");
        Ok(Self {
            pos: header.pos,
            payload_pos: header.payload_pos(),
            end,
            limit,
            timecode,
            entries: Vec::new(),
            next_pos: pos,
            done: false,
        })
    }

    /// Absolute position of the Cluster element.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn payload_position(&self) -> u64 {
        self.payload_pos
    }

    /// Position just past the cluster; `None` for an unknown-size cluster
    /// that has not been fully loaded.
    pub fn end(&self) -> Option<u64> {
        self.end
    }

    /// Cluster Timecode in ticks.
    pub fn timecode(&self) -> u64 {
        self.timecode
    }

    /// Cluster time in nanoseconds, saturating at `u64::MAX`.
    pub fn time_ns(&self, timecode_scale: u64) -> u64 {
        self.timecode.saturating_mul(timecode_scale)
    }

    /// Number of entries decoded so far.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, index: usize) -> Option<&BlockEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    /// Whether every entry has been decoded.
    pub fn is_fully_loaded(&self) -> bool {
        self.done
    }

    /// Decode the next entry. Returns `false` once the cluster is exhausted.
    pub fn load_next_entry<R: MkvReader + ?Sized>(&mut self, reader: &mut R) -> Result<bool> {
        while !self.done {
            if self.limit.is_some_and(|limit| self.next_pos >= limit) {
                self.finish();
                break;
            }
            let header = peek_element(reader, self.next_pos)?;
            if self.end.is_none() && is_top_level(header.id) {
                self.finish();
                break;
            }
            header.check_within(self.end)?;
            let next = header
                .end()
                .ok_or_else(|| Error::format(format!("{} at {} has unknown size", header.id, header.pos)))?;

            let entry = match header.id {
                ElementId::SIMPLE_BLOCK => Some(BlockEntry::Simple(Block::parse(reader, &header, self.timecode)?)),
                ElementId::BLOCK_GROUP => {
                    Some(BlockEntry::Group(BlockGroup::parse(reader, &header, self.timecode)?))
                }
                ElementId::TIMECODE => {
                    return Err(Error::format(format!("second Timecode in Cluster at {}", self.pos)));
                }
                ElementId::POSITION | ElementId::PREV_SIZE => None,
                _ => {
                    skip_unknown(&header, "Cluster");
                    None
                }
            };
            self.next_pos = next;
            if let Some(entry) = entry {
                self.entries.push(entry);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Decode all remaining entries.
    pub fn load_all<R: MkvReader + ?Sized>(&mut self, reader: &mut R) -> Result<()> {
        while self.load_next_entry(reader)? {}
        Ok(())
    }

    fn finish(&mut self) {
        self.done = true;
        if self.end.is_none() {
            self.end = Some(self.next_pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::block::BlockKind;
    use bytes::{BufMut, BytesMut};
    use webmforge_ebml::element::put_master;
    use webmforge_ebml::EbmlBufMut;

    fn put_simple_block(buf: &mut BytesMut, relative: i16, key: bool, payload: &[u8]) {
        let mut body = BytesMut::new();
        body.put_u8(0x81);
        body.put_i16(relative);
        body.put_u8(if key { 0x80 } else { 0 });
        body.put_slice(payload);
        buf.put_bytes_element(ElementId::SIMPLE_BLOCK, &body);
    }

    fn cluster_bytes() -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_master(&mut buf, ElementId::CLUSTER, |buf| {
            buf.put_uint_element(ElementId::TIMECODE, 100);
            put_simple_block(buf, 0, true, b"one");
            buf.put_bytes_element(ElementId::VOID, &[0, 0]);
            put_simple_block(buf, 33, false, b"two");
        });
        buf.to_vec()
    }

    #[test]
    fn test_entries_load_one_at_a_time() {
        let data = cluster_bytes();
        let mut reader = &data[..];
        let header = peek_element(&mut reader, 0).unwrap();
        let mut cluster = Cluster::open(&mut reader, &header, None).unwrap();
        assert_eq!(cluster.timecode(), 100);
        assert_eq!(cluster.entry_count(), 0);

        assert!(cluster.load_next_entry(&mut reader).unwrap());
        assert_eq!(cluster.entry_count(), 1);
        assert_eq!(cluster.entry(0).unwrap().kind(), BlockKind::SimpleBlock);
        assert!(cluster.entry(0).unwrap().block().is_key());

        assert!(cluster.load_next_entry(&mut reader).unwrap());
        assert_eq!(cluster.entry(1).unwrap().block().timecode(), 133);
        assert!(!cluster.load_next_entry(&mut reader).unwrap());
        assert!(cluster.is_fully_loaded());
        assert!(!cluster.load_next_entry(&mut reader).unwrap());
        assert_eq!(cluster.end(), Some(data.len() as u64));
    }

    #[test]
    fn test_unknown_size_cluster_ends_at_next_cluster() {
        let mut buf = BytesMut::new();
        buf.put_slice(&[0x1F, 0x43, 0xB6, 0x75, 0xFF]);
        buf.put_uint_element(ElementId::TIMECODE, 0);
        put_simple_block(&mut buf, 0, true, b"one");
        put_simple_block(&mut buf, 1, false, b"two");
        let boundary = buf.len() as u64;
        put_master(&mut buf, ElementId::CLUSTER, |buf| {
            buf.put_uint_element(ElementId::TIMECODE, 2);
        });
        let data = buf.to_vec();
        let mut reader = &data[..];

        let header = peek_element(&mut reader, 0).unwrap();
        let mut cluster = Cluster::open(&mut reader, &header, None).unwrap();
        assert_eq!(cluster.end(), None);
        cluster.load_all(&mut reader).unwrap();
        assert_eq!(cluster.entry_count(), 2);
        assert_eq!(cluster.end(), Some(boundary));
    }

    #[test]
    fn test_unknown_size_cluster_ends_at_stream_end() {
        let mut buf = BytesMut::new();
        buf.put_slice(&[0x1F, 0x43, 0xB6, 0x75, 0xFF]);
        buf.put_uint_element(ElementId::TIMECODE, 0);
        put_simple_block(&mut buf, 0, true, b"one");
        let data = buf.to_vec();
        let mut reader = &data[..];
        let header = peek_element(&mut reader, 0).unwrap();
        let mut cluster = Cluster::open(&mut reader, &header, None).unwrap();
        cluster.load_all(&mut reader).unwrap();
        assert_eq!(cluster.entry_count(), 1);
        assert_eq!(cluster.end(), Some(data.len() as u64));
    }

    #[test]
    fn test_large_timecode_saturates() {
        let mut buf = BytesMut::new();
        put_master(&mut buf, ElementId::CLUSTER, |buf| {
            buf.put_uint_element(ElementId::TIMECODE, 1 << 50);
        });
        let data = buf.to_vec();
        let mut reader = &data[..];
        let header = peek_element(&mut reader, 0).unwrap();
        let cluster = Cluster::open(&mut reader, &header, None).unwrap();
        assert_eq!(cluster.time_ns(1_000_000), u64::MAX);
        assert_eq!(cluster.time_ns(1), 1 << 50);
    }

    #[test]
    fn test_missing_timecode() {
        let mut buf = BytesMut::new();
        put_master(&mut buf, ElementId::CLUSTER, |buf| {
            put_simple_block(buf, 0, true, b"one");
        });
        let data = buf.to_vec();
        let mut reader = &data[..];
        let header = peek_element(&mut reader, 0).unwrap();
        assert_matches!(Cluster::open(&mut reader, &header, None), Err(Error::Format(_)));
    }
}
