//! Chapters and Tags parsing.

use crate::skip_unknown;
use webmforge_ebml::reader::{children, read_string, read_uint};
use webmforge_ebml::{Chapter, ChapterDisplay, ElementHeader, ElementId, MkvReader, Result, SimpleTag, Tag};

/// Parse a Chapters element. Atoms of every edition are returned in file
/// order; nested atoms are skipped.
pub fn parse_chapters<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<Vec<Chapter>> {
    let mut chapters = Vec::new();
    let mut editions = children(reader, header)?;
    while let Some(edition) = editions.next_header()? {
        if edition.id != ElementId::EDITION_ENTRY {
            skip_unknown(&edition, "Chapters");
            continue;
        }
        let mut atoms = children(editions.reader(), &edition)?;
        while let Some(atom) = atoms.next_header()? {
            match atom.id {
                ElementId::CHAPTER_ATOM => chapters.push(parse_atom(atoms.reader(), &atom)?),
                _ => skip_unknown(&atom, "EditionEntry"),
            }
        }
    }
    Ok(chapters)
}

fn parse_atom<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<Chapter> {
    let mut chapter = Chapter::default();
    let mut it = children(reader, header)?;
    while let Some(child) = it.next_header()? {
        let r = it.reader();
        match child.id {
            ElementId::CHAPTER_UID => chapter.uid = read_uint(r, &child)?,
            ElementId::CHAPTER_STRING_UID => chapter.string_id = Some(read_string(r, &child)?),
            ElementId::CHAPTER_TIME_START => chapter.start_ns = read_uint(r, &child)?,
            ElementId::CHAPTER_TIME_END => chapter.end_ns = Some(read_uint(r, &child)?),
            ElementId::CHAPTER_DISPLAY => chapter.displays.push(parse_display(r, &child)?),
            ElementId::CHAPTER_ATOM => {}
            _ => skip_unknown(&child, "ChapterAtom"),
        }
    }
    Ok(chapter)
}

fn parse_display<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<ChapterDisplay> {
    let mut display = ChapterDisplay::default();
    let mut it = children(reader, header)?;
    while let Some(child) = it.next_header()? {
        let r = it.reader();
        match child.id {
            ElementId::CHAP_STRING => display.title = read_string(r, &child)?,
            ElementId::CHAP_LANGUAGE => display.language = Some(read_string(r, &child)?),
            ElementId::CHAP_COUNTRY => display.country = Some(read_string(r, &child)?),
            _ => skip_unknown(&child, "ChapterDisplay"),
        }
    }
    Ok(display)
}

/// Parse a Tags element.
pub fn parse_tags<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<Vec<Tag>> {
    let mut tags = Vec::new();
    let mut it = children(reader, header)?;
    while let Some(child) = it.next_header()? {
        if child.id != ElementId::TAG {
            skip_unknown(&child, "Tags");
            continue;
        }
        let mut tag = Tag::default();
        let mut entries = children(it.reader(), &child)?;
        while let Some(entry) = entries.next_header()? {
            match entry.id {
                ElementId::SIMPLE_TAG => tag.simple_tags.push(parse_simple_tag(entries.reader(), &entry)?),
                ElementId::TARGETS => {}
                _ => skip_unknown(&entry, "Tag"),
            }
        }
        tags.push(tag);
    }
    Ok(tags)
}

fn parse_simple_tag<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<SimpleTag> {
    let mut tag = SimpleTag::default();
    let mut it = children(reader, header)?;
    while let Some(child) = it.next_header()? {
        let r = it.reader();
        match child.id {
            ElementId::TAG_NAME => tag.name = read_string(r, &child)?,
            ElementId::TAG_STRING => tag.value = read_string(r, &child)?,
            _ => skip_unknown(&child, "SimpleTag"),
        }
    }
    Ok(tag)
}
