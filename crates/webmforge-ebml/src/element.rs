//! EBML element serialization into in-memory buffers.
//!
//! Every element is `ID | size varint | payload`. Master elements carry their
//! children as payload. The helpers here append to any [`BufMut`], the same
//! way box writers append to a `BytesMut`, and the `*_element_size`
//! functions compute encoded sizes up front so parents can write their
//! headers before their children.

use crate::ids::ElementId;
use crate::vint::{self, coded_size, int_size, uint_size};
use bytes::{BufMut, BytesMut};

/// Encoded size of an element header (ID + minimal size varint).
pub fn header_size(id: ElementId, payload_size: u64) -> u64 {
    (id.encoded_len() + coded_size(payload_size)) as u64
}

/// Total encoded size of a master element with the given payload size.
pub fn master_element_size(id: ElementId, payload_size: u64) -> u64 {
    header_size(id, payload_size) + payload_size
}

/// Total encoded size of an unsigned integer element.
pub fn uint_element_size(id: ElementId, value: u64) -> u64 {
    master_element_size(id, uint_size(value) as u64)
}

/// Total encoded size of a signed integer element.
pub fn int_element_size(id: ElementId, value: i64) -> u64 {
    master_element_size(id, int_size(value) as u64)
}

/// Total encoded size of a float element (always written as 4 bytes).
pub fn float_element_size(id: ElementId) -> u64 {
    master_element_size(id, 4)
}

/// Total encoded size of a binary or string element.
pub fn bytes_element_size(id: ElementId, len: usize) -> u64 {
    master_element_size(id, len as u64)
}

/// Size varint width and payload length for a Void of `total` bytes.
///
/// Returns `None` when `total` is too small to hold a Void (less than 2).
pub fn void_layout(total: u64) -> Option<(usize, u64)> {
    let id_len = ElementId::VOID.encoded_len() as u64;
    (1..=vint::MAX_VINT_LENGTH).find_map(|width| {
        let payload = total.checked_sub(id_len + width as u64)?;
        (coded_size(payload) <= width).then_some((width, payload))
    })
}

/// EBML writing helpers for [`BufMut`] implementors.
pub trait EbmlBufMut: BufMut {
    /// Append an element ID.
    fn put_element_id(&mut self, id: ElementId) {
        self.put_slice(&vint::encode_id(id.0));
    }

    /// Append a size varint of exactly `width` bytes.
    ///
    /// `size` must be representable in `width` bytes.
    fn put_element_size_width(&mut self, size: u64, width: usize) {
        debug_assert!(coded_size(size) <= width);
        let marked = size | (1u64 << (7 * width));
        self.put_slice(&marked.to_be_bytes()[vint::MAX_VINT_LENGTH - width..]);
    }

    /// Append a minimal-width size varint.
    fn put_element_size(&mut self, size: u64) {
        self.put_element_size_width(size, coded_size(size));
    }

    /// Append an element header.
    fn put_element_header(&mut self, id: ElementId, payload_size: u64) {
        self.put_element_id(id);
        self.put_element_size(payload_size);
    }

    /// Append an unsigned integer element at its minimal width.
    fn put_uint_element(&mut self, id: ElementId, value: u64) {
        let width = uint_size(value);
        self.put_element_header(id, width as u64);
        self.put_uint(value, width);
    }

    /// Append a signed integer element at its minimal two's-complement width.
    fn put_int_element(&mut self, id: ElementId, value: i64) {
        let width = int_size(value);
        self.put_element_header(id, width as u64);
        self.put_int(value, width);
    }

    /// Append a 4-byte float element.
    fn put_float_element(&mut self, id: ElementId, value: f32) {
        self.put_element_header(id, 4);
        self.put_f32(value);
    }

    /// Append a UTF-8 string element (no terminator).
    fn put_string_element(&mut self, id: ElementId, value: &str) {
        self.put_bytes_element(id, value.as_bytes());
    }

    /// Append a binary element.
    fn put_bytes_element(&mut self, id: ElementId, value: &[u8]) {
        self.put_element_header(id, value.len() as u64);
        self.put_slice(value);
    }

    /// Append a Void element occupying exactly `total` bytes.
    ///
    /// Does nothing when `total` is below the 2-byte minimum.
    fn put_void_element(&mut self, total: u64) {
        if let Some((width, payload)) = void_layout(total) {
            self.put_element_id(ElementId::VOID);
            self.put_element_size_width(payload, width);
            self.put_bytes(0, payload as usize);
        }
    }
}

impl<B: BufMut + ?Sized> EbmlBufMut for B {}

/// Append a master element whose children are produced by `write_children`.
///
/// Children are staged in a scratch buffer so the parent size is exact.
pub fn put_master<F>(buf: &mut BytesMut, id: ElementId, write_children: F)
where
    F: FnOnce(&mut BytesMut),
{
    let mut children = BytesMut::new();
    write_children(&mut children);
    buf.put_element_header(id, children.len() as u64);
    buf.put_slice(&children);
}
