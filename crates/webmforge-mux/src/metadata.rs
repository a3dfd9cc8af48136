//! Chapters and Tags element serialization.

use bytes::BytesMut;
use webmforge_ebml::element::put_master;
use webmforge_ebml::{Chapter, EbmlBufMut, ElementId, Error, Result, Tag};

/// Check that a chapter can be written.
pub fn validate_chapter(chapter: &Chapter) -> Result<()> {
    if chapter.uid == 0 {
        return Err(Error::validation("chapter UID cannot be 0"));
    }
    if let Some(end) = chapter.end_ns {
        if end < chapter.start_ns {
            return Err(Error::validation(format!(
                "chapter {} ends at {end} before it starts at {}",
                chapter.uid, chapter.start_ns
            )));
        }
    }
    Ok(())
}

/// Append a Chapters element holding a single edition.
pub fn put_chapters(buf: &mut BytesMut, chapters: &[Chapter]) {
    put_master(buf, ElementId::CHAPTERS, |buf| {
        put_master(buf, ElementId::EDITION_ENTRY, |buf| {
            for chapter in chapters {
                put_chapter_atom(buf, chapter);
            }
        });
    });
}

fn put_chapter_atom(buf: &mut BytesMut, chapter: &Chapter) {
    put_master(buf, ElementId::CHAPTER_ATOM, |buf| {
        buf.put_uint_element(ElementId::CHAPTER_UID, chapter.uid);
        if let Some(string_id) = &chapter.string_id {
            buf.put_string_element(ElementId::CHAPTER_STRING_UID, string_id);
        }
        buf.put_uint_element(ElementId::CHAPTER_TIME_START, chapter.start_ns);
        if let Some(end) = chapter.end_ns {
            buf.put_uint_element(ElementId::CHAPTER_TIME_END, end);
        }
        for display in &chapter.displays {
            put_master(buf, ElementId::CHAPTER_DISPLAY, |buf| {
                buf.put_string_element(ElementId::CHAP_STRING, &display.title);
                if let Some(language) = &display.language {
                    buf.put_string_element(ElementId::CHAP_LANGUAGE, language);
                }
                if let Some(country) = &display.country {
                    buf.put_string_element(ElementId::CHAP_COUNTRY, country);
                }
            });
        }
    });
}

/// Append a Tags element.
pub fn put_tags(buf: &mut BytesMut, tags: &[Tag]) {
    put_master(buf, ElementId::TAGS, |buf| {
        for tag in tags {
            put_master(buf, ElementId::TAG, |buf| {
                for simple in &tag.simple_tags {
                    put_master(buf, ElementId::SIMPLE_TAG, |buf| {
                        buf.put_string_element(ElementId::TAG_NAME, &simple.name);
                        buf.put_string_element(ElementId::TAG_STRING, &simple.value);
                    });
                }
            });
        }
    });
}
