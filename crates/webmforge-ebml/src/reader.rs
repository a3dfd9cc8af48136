//! Input sources and element header decoding.

use crate::error::{Error, Result};
use crate::ids::ElementId;
use crate::vint::{self, MAX_ID_LENGTH, MAX_VINT_LENGTH};
use bytes::Bytes;
use std::io::{self, Read, Seek, SeekFrom};

/// Maximum element payload read into memory at once (64 MB), to avoid OOM on
/// corrupt sizes.
pub const MAX_ELEMENT_PAYLOAD: u64 = 64 * 1024 * 1024;

/// Random-access byte source.
pub trait MkvReader {
    /// Fill `buf` with the bytes starting at `pos`.
    ///
    /// Fails with [`Error::EndOfStream`] if the full range is not available.
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<()>;

    /// Total stream length, if known.
    fn length(&self) -> Option<u64>;
}

impl<T: MkvReader + ?Sized> MkvReader for &mut T {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_at(pos, buf)
    }

    fn length(&self) -> Option<u64> {
        (**self).length()
    }
}

fn read_slice(data: &[u8], pos: u64, buf: &mut [u8]) -> Result<()> {
    let start = usize::try_from(pos).map_err(|_| Error::EndOfStream { offset: pos })?;
    let end = start
        .checked_add(buf.len())
        .filter(|&end| end <= data.len())
        .ok_or(Error::EndOfStream { offset: pos })?;
    buf.copy_from_slice(&data[start..end]);
    Ok(())
}

impl MkvReader for Vec<u8> {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        read_slice(&self[..], pos, buf)
    }

    fn length(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

impl MkvReader for &[u8] {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        read_slice(&self[..], pos, buf)
    }

    fn length(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

impl MkvReader for Bytes {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        read_slice(&self[..], pos, buf)
    }

    fn length(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

/// Reader over any `Read + Seek` source such as a file.
#[derive(Debug)]
pub struct IoReader<R> {
    inner: R,
    length: Option<u64>,
}

impl<R: Read + Seek> IoReader<R> {
    /// Wrap a reader, measuring its length.
    pub fn new(mut inner: R) -> Result<Self> {
        let length = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner,
            length: Some(length),
        })
    }

    /// Return the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> MkvReader for IoReader<R> {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::EndOfStream { offset: pos },
            _ => Error::Io(e),
        })
    }

    fn length(&self) -> Option<u64> {
        self.length
    }
}

/// Decoded element header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    /// Element ID.
    pub id: ElementId,
    /// Payload size, `None` when unknown.
    pub size: Option<u64>,
    /// Position of the element's first byte.
    pub pos: u64,
    /// Length of ID plus size field.
    pub header_len: u8,
}

impl ElementHeader {
    /// Position of the first payload byte.
    pub fn payload_pos(&self) -> u64 {
        self.pos + self.header_len as u64
    }

    /// Position just past the payload, when the size is known.
    pub fn end(&self) -> Option<u64> {
        self.size.map(|size| self.payload_pos() + size)
    }

    /// Whether the size is the unknown marker.
    pub fn is_unknown_size(&self) -> bool {
        self.size.is_none()
    }

    /// Known payload size, or a format error.
    pub fn known_size(&self) -> Result<u64> {
        self.size
            .ok_or_else(|| Error::format(format!("{} at {} has unknown size", self.id, self.pos)))
    }

    /// Fail unless the payload ends at or before `limit`.
    pub fn check_within(&self, limit: Option<u64>) -> Result<()> {
        match (self.end(), limit) {
            (Some(end), Some(limit)) if end > limit => Err(Error::Truncated {
                id: self.id.0,
                offset: self.pos,
                need: self.size.unwrap_or_default(),
                have: limit.saturating_sub(self.payload_pos()),
            }),
            _ => Ok(()),
        }
    }
}

fn with_offset(err: Error, pos: u64) -> Error {
    match err {
        Error::InvalidVint { offset } => Error::InvalidVint { offset: pos + offset },
        Error::InvalidElementId { offset } => Error::InvalidElementId {
            offset: pos + offset,
        },
        Error::EndOfStream { offset } => Error::EndOfStream { offset: pos + offset },
        other => other,
    }
}

/// Read the bytes of a varint (ID or size) starting at `pos`.
fn read_vint_bytes<R: MkvReader + ?Sized>(
    reader: &mut R,
    pos: u64,
    max_len: usize,
    invalid: Error,
) -> Result<([u8; MAX_VINT_LENGTH], usize)> {
    let mut buf = [0u8; MAX_VINT_LENGTH];
    reader.read_at(pos, &mut buf[..1])?;
    let len = match vint::vint_length(buf[0]) {
        Some(len) if len <= max_len => len,
        _ => return Err(invalid),
    };
    if len > 1 {
        reader.read_at(pos + 1, &mut buf[1..len])?;
    }
    Ok((buf, len))
}

/// Decode a varint value at `pos`. Returns `(value, len)`.
pub fn read_vint<R: MkvReader + ?Sized>(reader: &mut R, pos: u64) -> Result<(u64, usize)> {
    let (buf, len) = read_vint_bytes(reader, pos, MAX_VINT_LENGTH, Error::InvalidVint { offset: pos })?;
    vint::decode_vint(&buf[..len]).map_err(|e| with_offset(e, pos))
}

/// Decode the element header at `pos` without consuming anything.
///
/// Safe to call speculatively while scanning for element boundaries. A payload
/// that extends past the known stream length is reported as
/// [`Error::Truncated`].
pub fn peek_element<R: MkvReader + ?Sized>(reader: &mut R, pos: u64) -> Result<ElementHeader> {
    let (id_buf, id_len) =
        read_vint_bytes(reader, pos, MAX_ID_LENGTH, Error::InvalidElementId { offset: pos })?;
    let (id, _) = vint::decode_id(&id_buf[..id_len]).map_err(|e| with_offset(e, pos))?;

    let size_pos = pos + id_len as u64;
    let (size_buf, size_len) =
        read_vint_bytes(reader, size_pos, MAX_VINT_LENGTH, Error::InvalidVint { offset: size_pos })?;
    let (size, _) = vint::decode_size(&size_buf[..size_len]).map_err(|e| with_offset(e, size_pos))?;

    let header = ElementHeader {
        id: ElementId(id),
        size,
        pos,
        header_len: (id_len + size_len) as u8,
    };
    header.check_within(reader.length())?;
    Ok(header)
}

/// Read a known-size payload into memory.
pub fn read_payload<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<Vec<u8>> {
    let size = header.known_size()?;
    if size > MAX_ELEMENT_PAYLOAD {
        return Err(Error::format(format!(
            "{} payload of {size} bytes exceeds maximum {MAX_ELEMENT_PAYLOAD}",
            header.id
        )));
    }
    let mut data = vec![0u8; size as usize];
    reader.read_at(header.payload_pos(), &mut data)?;
    Ok(data)
}

/// Read a binary element payload.
pub fn read_bytes<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<Vec<u8>> {
    read_payload(reader, header)
}

fn read_small<R: MkvReader + ?Sized>(
    reader: &mut R,
    header: &ElementHeader,
) -> Result<([u8; MAX_VINT_LENGTH], usize)> {
    let size = header.known_size()?;
    if size > MAX_VINT_LENGTH as u64 {
        return Err(Error::format(format!(
            "{} at {} has {size}-byte numeric payload",
            header.id, header.pos
        )));
    }
    let mut buf = [0u8; MAX_VINT_LENGTH];
    reader.read_at(header.payload_pos(), &mut buf[..size as usize])?;
    Ok((buf, size as usize))
}

/// Read an unsigned integer element payload.
pub fn read_uint<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<u64> {
    let (buf, len) = read_small(reader, header)?;
    vint::decode_uint(&buf[..len])
}

/// Read a signed integer element payload.
pub fn read_int<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<i64> {
    let (buf, len) = read_small(reader, header)?;
    vint::decode_int(&buf[..len])
}

/// Read a float element payload.
pub fn read_float<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<f64> {
    let (buf, len) = read_small(reader, header)?;
    vint::decode_float(&buf[..len])
}

/// Read a string element payload, dropping trailing NUL padding.
pub fn read_string<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<String> {
    let mut data = read_payload(reader, header)?;
    while data.last() == Some(&0) {
        data.pop();
    }
    String::from_utf8(data)
        .map_err(|_| Error::format(format!("{} at {} is not valid UTF-8", header.id, header.pos)))
}

/// Iterate the children of a known-size master element.
///
/// Yields each child header; a child extending past the parent is an error.
pub fn children<'r, R: MkvReader + ?Sized>(
    reader: &'r mut R,
    parent: &ElementHeader,
) -> Result<Children<'r, R>> {
    let end = parent.end().ok_or_else(|| {
        Error::format(format!("{} at {} has unknown size", parent.id, parent.pos))
    })?;
    Ok(Children {
        reader,
        pos: parent.payload_pos(),
        end,
    })
}

/// Iterator returned by [`children`].
pub struct Children<'r, R: ?Sized> {
    reader: &'r mut R,
    pos: u64,
    end: u64,
}

impl<R: MkvReader + ?Sized> Children<'_, R> {
    /// Access the underlying reader to decode the current child.
    pub fn reader(&mut self) -> &mut R {
        &mut *self.reader
    }

    /// Next child header, or `None` at the end of the parent.
    pub fn next_header(&mut self) -> Result<Option<ElementHeader>> {
        if self.pos >= self.end {
            return Ok(None);
        }
        let header = peek_element(&mut *self.reader, self.pos)?;
        header.check_within(Some(self.end))?;
        self.pos = header.end().ok_or_else(|| {
            Error::format(format!("{} at {} has unknown size", header.id, header.pos))
        })?;
        Ok(Some(header))
    }
}
