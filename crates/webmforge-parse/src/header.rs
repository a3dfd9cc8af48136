//! EBML header parsing.

use crate::skip_unknown;
use webmforge_ebml::reader::{children, read_string, read_uint};
use webmforge_ebml::vint::{MAX_ID_LENGTH, MAX_VINT_LENGTH};
use webmforge_ebml::{peek_element, ElementId, Error, MkvReader, Result};

/// The EBML header that starts every WebM file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EbmlHeader {
    pub version: u64,
    pub read_version: u64,
    pub max_id_length: u64,
    pub max_size_length: u64,
    pub doc_type: String,
    pub doc_type_version: u64,
    pub doc_type_read_version: u64,
}

impl Default for EbmlHeader {
    fn default() -> Self {
        Self {
            version: 1,
            read_version: 1,
            max_id_length: MAX_ID_LENGTH as u64,
            max_size_length: MAX_VINT_LENGTH as u64,
            doc_type: "matroska".to_string(),
            doc_type_version: 1,
            doc_type_read_version: 1,
        }
    }
}

impl EbmlHeader {
    /// Parse the header at `*pos` and advance `*pos` past it.
    pub fn parse<R: MkvReader + ?Sized>(reader: &mut R, pos: &mut u64) -> Result<Self> {
        let header = peek_element(reader, *pos)?;
        if header.id != ElementId::EBML {
            return Err(Error::format(format!("expected EBML header at {}, found {}", *pos, header.id)));
        }

        let mut parsed = Self::default();
        let mut it = children(reader, &header)?;
        while let Some(child) = it.next_header()? {
            let r = it.reader();
            match child.id {
                ElementId::EBML_VERSION => parsed.version = read_uint(r, &child)?,
                ElementId::EBML_READ_VERSION => parsed.read_version = read_uint(r, &child)?,
                ElementId::EBML_MAX_ID_LENGTH => parsed.max_id_length = read_uint(r, &child)?,
                ElementId::EBML_MAX_SIZE_LENGTH => parsed.max_size_length = read_uint(r, &child)?,
                ElementId::DOC_TYPE => parsed.doc_type = read_string(r, &child)?,
                ElementId::DOC_TYPE_VERSION => parsed.doc_type_version = read_uint(r, &child)?,
                ElementId::DOC_TYPE_READ_VERSION => parsed.doc_type_read_version = read_uint(r, &child)?,
                _ => skip_unknown(&child, "EBML header"),
            }
        }
        parsed.validate()?;

        *pos = header.end().unwrap_or(*pos);
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if self.read_version > 1 {
            return Err(Error::format(format!("unsupported EBMLReadVersion {}", self.read_version)));
        }
        if !(1..=MAX_ID_LENGTH as u64).contains(&self.max_id_length) {
            return Err(Error::format(format!("invalid EBMLMaxIDLength {}", self.max_id_length)));
        }
        if !(1..=MAX_VINT_LENGTH as u64).contains(&self.max_size_length) {
            return Err(Error::format(format!("invalid EBMLMaxSizeLength {}", self.max_size_length)));
        }
        if self.doc_type.is_empty() || self.doc_type_version == 0 || self.doc_type_read_version == 0 {
            return Err(Error::format("incomplete DocType in EBML header"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bytes::BytesMut;
    use webmforge_ebml::element::put_master;
    use webmforge_ebml::EbmlBufMut;

    fn header_bytes(doc_type: &str, read_version: u64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_master(&mut buf, ElementId::EBML, |buf| {
            buf.put_uint_element(ElementId::EBML_READ_VERSION, read_version);
            buf.put_string_element(ElementId::DOC_TYPE, doc_type);
            buf.put_uint_element(ElementId::DOC_TYPE_VERSION, 4);
            buf.put_uint_element(ElementId::DOC_TYPE_READ_VERSION, 2);
        });
        buf.to_vec()
    }

    #[test]
    fn test_parse_header() {
        let data = header_bytes("webm", 1);
        let mut pos = 0;
        let header = EbmlHeader::parse(&mut data.as_slice(), &mut pos).unwrap();
        assert_eq!(pos, data.len() as u64);
        assert_eq!(header.doc_type, "webm");
        assert_eq!(header.doc_type_version, 4);
        assert_eq!(header.max_size_length, 8);
    }

    #[test]
    fn test_rejects_bad_headers() {
        let mut pos = 0;
        assert_matches!(
            EbmlHeader::parse(&mut header_bytes("webm", 2).as_slice(), &mut pos),
            Err(Error::Format(_))
        );
        assert_matches!(
            EbmlHeader::parse(&mut header_bytes("", 1).as_slice(), &mut pos),
            Err(Error::Format(_))
        );
        let not_ebml = [0xEC, 0x81, 0x00];
        assert_matches!(EbmlHeader::parse(&mut &not_ebml[..], &mut pos), Err(Error::Format(_)));
        assert_eq!(pos, 0);
    }
}
