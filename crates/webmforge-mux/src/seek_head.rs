//! SeekHead reservation and back-filling.
//!
//! Space for the SeekHead is reserved with a Void when the segment header is
//! written. At finalize the real SeekHead is written over the reservation and
//! the unused tail stays a Void.

use crate::Result;
use bytes::{BufMut, BytesMut};
use webmforge_ebml::element::put_master;
use webmforge_ebml::writer::write_void;
use webmforge_ebml::{EbmlBufMut, ElementId, Error, MkvWriter};

/// Info, Tracks, Chapters, Cues, Tags.
pub const MAX_SEEK_ENTRIES: usize = 5;

/// Encoded size of one Seek element with an 8-byte position.
const SEEK_ENTRY_SIZE: u64 = 21;

/// SeekHead element ID plus a 1-byte size.
const SEEK_HEAD_HEADER_SIZE: u64 = 5;

/// Bytes reserved for the SeekHead.
pub const RESERVED_SIZE: u64 = SEEK_HEAD_HEADER_SIZE + MAX_SEEK_ENTRIES as u64 * SEEK_ENTRY_SIZE;

/// Seek entries for one segment.
#[derive(Debug, Clone)]
pub struct SeekHead {
    /// Absolute position of the reservation.
    reserved_pos: u64,
    entries: Vec<(ElementId, u64)>,
}

impl SeekHead {
    /// Reserve space at the writer's current position.
    pub fn reserve<W: MkvWriter + ?Sized>(writer: &mut W) -> Result<Self> {
        let reserved_pos = writer.position();
        write_void(writer, RESERVED_SIZE)?;
        Ok(Self {
            reserved_pos,
            entries: Vec::with_capacity(MAX_SEEK_ENTRIES),
        })
    }

    /// Absolute position of the reservation.
    pub fn position(&self) -> u64 {
        self.reserved_pos
    }

    /// Record or replace the position of a top-level element, relative to the
    /// segment payload.
    pub fn set(&mut self, id: ElementId, position: u64) -> Result<()> {
        if let Some(entry) = self.entries.iter_mut().find(|(e, _)| *e == id) {
            entry.1 = position;
            return Ok(());
        }
        if self.entries.len() == MAX_SEEK_ENTRIES {
            return Err(Error::validation(format!("no SeekHead slot left for {id}")));
        }
        self.entries.push((id, position));
        Ok(())
    }

    pub fn get(&self, id: ElementId) -> Option<u64> {
        self.entries.iter().find(|(e, _)| *e == id).map(|(_, pos)| *pos)
    }

    /// Serialize the SeekHead padded with a Void to the reserved size.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(RESERVED_SIZE as usize);
        put_master(&mut buf, ElementId::SEEK_HEAD, |buf| {
            for (id, position) in &self.entries {
                put_master(buf, ElementId::SEEK, |buf| {
                    buf.put_bytes_element(ElementId::SEEK_ID, &id.0.to_be_bytes()[4 - id.encoded_len()..]);
                    buf.put_element_header(ElementId::SEEK_POSITION, 8);
                    buf.put_u64(*position);
                });
            }
        });
        let used = buf.len() as u64;
        buf.put_void_element(RESERVED_SIZE - used);
        buf
    }

    /// Overwrite the reservation and return to the current position.
    pub fn finalize<W: MkvWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        let end = writer.position();
        writer.seek(self.reserved_pos)?;
        writer.write(&self.encode())?;
        writer.seek(end)?;
        tracing::debug!("Wrote SeekHead with {} entries", self.entries.len());
        Ok(())
    }
}
