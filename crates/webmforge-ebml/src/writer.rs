//! Output sinks and sink-level element writing.

use crate::element::{void_layout, EbmlBufMut};
use crate::error::{Error, Result};
use crate::ids::ElementId;
use crate::vint::{self, PATCHABLE_SIZE_WIDTH};
use bytes::BytesMut;
use std::io::{Seek, SeekFrom, Write};

/// Destination for muxed bytes.
///
/// Seekable writers allow sizes to be patched after the fact. Append-only
/// writers leave unknown-size elements as they are.
pub trait MkvWriter {
    /// Write all of `buf` at the current position.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Current absolute position.
    fn position(&self) -> u64;

    /// Move to an absolute position.
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Whether [`MkvWriter::seek`] is supported.
    fn seekable(&self) -> bool;
}

impl<T: MkvWriter + ?Sized> MkvWriter for &mut T {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write(buf)
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        (**self).seek(pos)
    }

    fn seekable(&self) -> bool {
        (**self).seekable()
    }
}

/// Seekable writer over any `Write + Seek` (files, `Cursor<Vec<u8>>`).
#[derive(Debug)]
pub struct IoWriter<W> {
    inner: W,
    pos: u64,
}

impl<W: Write + Seek> IoWriter<W> {
    /// Wrap a writer, starting at its current position.
    pub fn new(mut inner: W) -> Result<Self> {
        let pos = inner.stream_position()?;
        Ok(Self { inner, pos })
    }

    /// Get a reference to the inner writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flush and return the inner writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write + Seek> MkvWriter for IoWriter<W> {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_all(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.pos = self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn seekable(&self) -> bool {
        true
    }
}

/// Append-only writer for pipes, sockets and live output.
#[derive(Debug)]
pub struct StreamWriter<W> {
    inner: W,
    pos: u64,
}

impl<W: Write> StreamWriter<W> {
    /// Wrap a writer. Positions are counted from zero.
    pub fn new(inner: W) -> Self {
        Self { inner, pos: 0 }
    }

    /// Get a reference to the inner writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flush and return the inner writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> MkvWriter for StreamWriter<W> {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_all(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, _pos: u64) -> Result<()> {
        Err(Error::SeekUnsupported)
    }

    fn seekable(&self) -> bool {
        false
    }
}

/// Write an element header.
pub fn write_id_size<W: MkvWriter + ?Sized>(writer: &mut W, id: ElementId, size: u64) -> Result<()> {
    if size > vint::MAX_SIZE_VALUE {
        return Err(Error::validation(format!("element size {size} too large")));
    }
    let mut buf = BytesMut::with_capacity(12);
    buf.put_element_header(id, size);
    writer.write(&buf)
}

/// Write a complete binary element.
pub fn write_element<W: MkvWriter + ?Sized>(writer: &mut W, id: ElementId, payload: &[u8]) -> Result<()> {
    write_id_size(writer, id, payload.len() as u64)?;
    writer.write(payload)
}

/// Write a Void element of exactly `total` bytes.
pub fn write_void<W: MkvWriter + ?Sized>(writer: &mut W, total: u64) -> Result<()> {
    if void_layout(total).is_none() {
        return Err(Error::validation(format!("void of {total} bytes")));
    }
    let mut buf = BytesMut::with_capacity(total as usize);
    buf.put_void_element(total);
    writer.write(&buf)
}

/// Handle to an element written with an unknown size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownSizeElement {
    /// Element ID.
    pub id: ElementId,
    /// Position of the element's first byte.
    pub element_pos: u64,
    /// Position of the 8-byte size field.
    pub size_pos: u64,
    /// Position of the first payload byte.
    pub payload_pos: u64,
}

/// Start an element whose size is not known yet.
///
/// The size field is written as the 8-byte unknown marker so it can be
/// rewritten in place by [`close_unknown_size_element`].
pub fn start_unknown_size_element<W: MkvWriter + ?Sized>(
    writer: &mut W,
    id: ElementId,
) -> Result<UnknownSizeElement> {
    let element_pos = writer.position();
    writer.write(&vint::encode_id(id.0))?;
    let size_pos = writer.position();
    writer.write(&vint::encode_unknown_size(PATCHABLE_SIZE_WIDTH)?)?;
    Ok(UnknownSizeElement {
        id,
        element_pos,
        size_pos,
        payload_pos: writer.position(),
    })
}

/// Close an element started with [`start_unknown_size_element`].
///
/// The payload is taken to end at the writer's current position. On a
/// seekable writer the size field is patched and the position restored; on an
/// append-only writer the element keeps its unknown size. Returns the payload
/// size either way.
pub fn close_unknown_size_element<W: MkvWriter + ?Sized>(
    writer: &mut W,
    element: UnknownSizeElement,
) -> Result<u64> {
    let end = writer.position();
    let size = end
        .checked_sub(element.payload_pos)
        .ok_or(Error::InvalidState("writer is before the element payload"))?;

    if !writer.seekable() {
        tracing::warn!(
            "Leaving {} at {} with unknown size on append-only writer",
            element.id,
            element.element_pos
        );
        return Ok(size);
    }

    writer.seek(element.size_pos)?;
    writer.write(&vint::encode_size(size, PATCHABLE_SIZE_WIDTH)?)?;
    writer.seek(end)?;
    Ok(size)
}
