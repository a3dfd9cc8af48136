//! Segment Info parsing.

use crate::skip_unknown;
use webmforge_ebml::reader::{children, read_float, read_int, read_string, read_uint};
use webmforge_ebml::{ElementHeader, ElementId, Error, MkvReader, Result, SegmentInfo};

/// Parse an Info element.
pub fn parse_info<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<SegmentInfo> {
    let mut info = SegmentInfo::default();
    let mut it = children(reader, header)?;
    while let Some(child) = it.next_header()? {
        let r = it.reader();
        match child.id {
            ElementId::TIMECODE_SCALE => info.timecode_scale = read_uint(r, &child)?,
            ElementId::DURATION => info.duration = Some(read_float(r, &child)?),
            ElementId::DATE_UTC => info.date_utc = Some(read_int(r, &child)?),
            ElementId::TITLE => info.title = Some(read_string(r, &child)?),
            ElementId::MUXING_APP => info.muxing_app = Some(read_string(r, &child)?),
            ElementId::WRITING_APP => info.writing_app = Some(read_string(r, &child)?),
            _ => skip_unknown(&child, "Info"),
        }
    }
    if info.timecode_scale == 0 {
        return Err(Error::format("TimecodeScale is 0"));
    }
    if info.duration.is_some_and(|d| !d.is_finite() || d < 0.0) {
        return Err(Error::format("invalid segment Duration"));
    }
    Ok(info)
}
