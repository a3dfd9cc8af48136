//! Tracks element parsing.

use crate::skip_unknown;
use webmforge_ebml::reader::{children, read_bytes, read_float, read_string, read_uint};
use webmforge_ebml::{
    AudioSettings, ElementHeader, ElementId, Error, MkvReader, Result, Track, TrackKind, VideoSettings,
};

/// Parsed track entries, in file order.
#[derive(Debug, Clone, Default)]
pub struct Tracks {
    entries: Vec<Track>,
}

impl Tracks {
    /// Parse a Tracks element.
    pub fn parse<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<Self> {
        let mut entries = Vec::new();
        let mut it = children(reader, header)?;
        while let Some(child) = it.next_header()? {
            match child.id {
                ElementId::TRACK_ENTRY => entries.push(parse_track_entry(it.reader(), &child)?),
                _ => skip_unknown(&child, "Tracks"),
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_by_index(&self, index: usize) -> Option<&Track> {
        self.entries.get(index)
    }

    pub fn get_by_number(&self, number: u64) -> Option<&Track> {
        self.entries.iter().find(|t| t.number == number)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.entries.iter()
    }
}

fn parse_track_entry<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<Track> {
    let mut track = Track::new(0, 0);
    let mut type_code = None;
    let mut video = None;
    let mut audio = None;

    let mut it = children(reader, header)?;
    while let Some(child) = it.next_header()? {
        let r = it.reader();
        match child.id {
            ElementId::TRACK_NUMBER => track.number = read_uint(r, &child)?,
            ElementId::TRACK_UID => track.uid = read_uint(r, &child)?,
            ElementId::TRACK_TYPE => type_code = Some(read_uint(r, &child)?),
            ElementId::CODEC_ID => track.codec_id = Some(read_string(r, &child)?),
            ElementId::CODEC_PRIVATE => track.codec_private = Some(read_bytes(r, &child)?),
            ElementId::CODEC_NAME => track.codec_name = Some(read_string(r, &child)?),
            ElementId::NAME => track.name = Some(read_string(r, &child)?),
            ElementId::LANGUAGE => track.language = Some(read_string(r, &child)?),
            ElementId::FLAG_LACING => track.lacing = read_uint(r, &child)? != 0,
            ElementId::DEFAULT_DURATION => track.default_duration = read_uint(r, &child)?,
            ElementId::CODEC_DELAY => track.codec_delay = read_uint(r, &child)?,
            ElementId::SEEK_PRE_ROLL => track.seek_pre_roll = read_uint(r, &child)?,
            ElementId::MAX_BLOCK_ADDITION_ID => track.max_block_additional_id = read_uint(r, &child)?,
            ElementId::VIDEO => video = Some(parse_video(r, &child)?),
            ElementId::AUDIO => audio = Some(parse_audio(r, &child)?),
            ElementId::CONTENT_ENCODINGS => track.content_encoding_count = count_encodings(r, &child)?,
            ElementId::FLAG_ENABLED | ElementId::FLAG_DEFAULT | ElementId::FLAG_FORCED => {}
            _ => skip_unknown(&child, "TrackEntry"),
        }
    }

    if track.number == 0 {
        return Err(Error::format(format!("TrackEntry at {} has no TrackNumber", header.pos)));
    }
    track.kind = type_code.map(|code| match code {
        TrackKind::VIDEO_CODE => TrackKind::Video(video.take().unwrap_or_default()),
        TrackKind::AUDIO_CODE => TrackKind::Audio(audio.take().unwrap_or_default()),
        other => TrackKind::from_code(other),
    });
    Ok(track)
}

fn parse_video<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<VideoSettings> {
    let mut video = VideoSettings::default();
    let mut it = children(reader, header)?;
    while let Some(child) = it.next_header()? {
        let r = it.reader();
        match child.id {
            ElementId::PIXEL_WIDTH => video.width = read_uint(r, &child)?,
            ElementId::PIXEL_HEIGHT => video.height = read_uint(r, &child)?,
            ElementId::DISPLAY_WIDTH => video.display_width = Some(read_uint(r, &child)?),
            ElementId::DISPLAY_HEIGHT => video.display_height = Some(read_uint(r, &child)?),
            ElementId::DISPLAY_UNIT => video.display_unit = read_uint(r, &child)?,
            ElementId::FRAME_RATE => video.frame_rate = read_float(r, &child)?,
            ElementId::STEREO_MODE => video.stereo_mode = read_uint(r, &child)?,
            ElementId::ALPHA_MODE => video.alpha_mode = read_uint(r, &child)?,
            ElementId::FLAG_INTERLACED
            | ElementId::PIXEL_CROP_BOTTOM
            | ElementId::PIXEL_CROP_TOP
            | ElementId::PIXEL_CROP_LEFT
            | ElementId::PIXEL_CROP_RIGHT => {}
            _ => skip_unknown(&child, "Video"),
        }
    }
    Ok(video)
}

fn parse_audio<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<AudioSettings> {
    let mut audio = AudioSettings::default();
    let mut it = children(reader, header)?;
    while let Some(child) = it.next_header()? {
        let r = it.reader();
        match child.id {
            ElementId::SAMPLING_FREQUENCY => audio.sample_rate = read_float(r, &child)?,
            ElementId::CHANNELS => audio.channels = read_uint(r, &child)?,
            ElementId::BIT_DEPTH => audio.bit_depth = read_uint(r, &child)?,
            ElementId::OUTPUT_SAMPLING_FREQUENCY => {}
            _ => skip_unknown(&child, "Audio"),
        }
    }
    if audio.sample_rate <= 0.0 || audio.channels == 0 {
        return Err(Error::format(format!("invalid Audio settings at {}", header.pos)));
    }
    Ok(audio)
}

fn count_encodings<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<usize> {
    let mut count = 0;
    let mut it = children(reader, header)?;
    while let Some(child) = it.next_header()? {
        if child.id == ElementId::CONTENT_ENCODING {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use webmforge_ebml::element::put_master;
    use webmforge_ebml::{peek_element, EbmlBufMut};

    fn parse(buf: &BytesMut) -> Result<Tracks> {
        let mut data: &[u8] = buf;
        let header = peek_element(&mut data, 0)?;
        Tracks::parse(&mut data, &header)
    }

    #[test]
    fn test_parse_video_and_audio() {
        let mut buf = BytesMut::new();
        put_master(&mut buf, ElementId::TRACKS, |buf| {
            put_master(buf, ElementId::TRACK_ENTRY, |buf| {
                buf.put_uint_element(ElementId::TRACK_NUMBER, 1);
                buf.put_uint_element(ElementId::TRACK_UID, 1);
                buf.put_uint_element(ElementId::TRACK_TYPE, 1);
                buf.put_string_element(ElementId::CODEC_ID, "V_VP9");
                buf.put_string_element(ElementId::LANGUAGE, "und");
                buf.put_uint_element(ElementId::FLAG_LACING, 0);
                put_master(buf, ElementId::VIDEO, |buf| {
                    buf.put_uint_element(ElementId::PIXEL_WIDTH, 854);
                    buf.put_uint_element(ElementId::PIXEL_HEIGHT, 480);
                    buf.put_float_element(ElementId::FRAME_RATE, 0.5);
                });
            });
            put_master(buf, ElementId::TRACK_ENTRY, |buf| {
                buf.put_uint_element(ElementId::TRACK_NUMBER, 2);
                buf.put_uint_element(ElementId::TRACK_UID, 2);
                buf.put_uint_element(ElementId::TRACK_TYPE, 2);
                buf.put_string_element(ElementId::CODEC_ID, "A_OPUS");
                buf.put_uint_element(ElementId::CODEC_DELAY, 6_500_000);
                buf.put_bytes_element(ElementId::CODEC_PRIVATE, b"OpusHead");
                put_master(buf, ElementId::AUDIO, |buf| {
                    buf.put_float_element(ElementId::SAMPLING_FREQUENCY, 48_000.0);
                    buf.put_uint_element(ElementId::CHANNELS, 6);
                    buf.put_uint_element(ElementId::BIT_DEPTH, 32);
                });
                put_master(buf, ElementId::CONTENT_ENCODINGS, |buf| {
                    put_master(buf, ElementId::CONTENT_ENCODING, |_| {});
                });
            });
        });

        let tracks = parse(&buf).unwrap();
        assert_eq!(tracks.len(), 2);
        let video = tracks.get_by_index(0).unwrap();
        assert_eq!(video.language.as_deref(), Some("und"));
        assert!(!video.lacing);
        assert_eq!(video.name, None);
        let settings = video.video().unwrap();
        assert_eq!((settings.width, settings.height), (854, 480));
        assert_eq!(settings.frame_rate, 0.5);

        let audio = tracks.get_by_number(2).unwrap();
        assert!(audio.lacing);
        assert_eq!(audio.codec_delay, 6_500_000);
        assert_eq!(audio.codec_private.as_deref(), Some(&b"OpusHead"[..]));
        assert_eq!(audio.audio().unwrap().channels, 6);
        assert_eq!(audio.audio().unwrap().bit_depth, 32);
        assert_eq!(audio.content_encoding_count, 1);
    }

    #[test]
    fn test_missing_number_rejected() {
        let mut buf = BytesMut::new();
        put_master(&mut buf, ElementId::TRACKS, |buf| {
            put_master(buf, ElementId::TRACK_ENTRY, |buf| {
                buf.put_uint_element(ElementId::TRACK_TYPE, 1);
            });
        });
        assert!(parse(&buf).is_err());
    }

    #[test]
    fn test_other_track_types() {
        let mut buf = BytesMut::new();
        put_master(&mut buf, ElementId::TRACKS, |buf| {
            put_master(buf, ElementId::TRACK_ENTRY, |buf| {
                buf.put_uint_element(ElementId::TRACK_NUMBER, 3);
                buf.put_uint_element(ElementId::TRACK_TYPE, 0x21);
                buf.put_string_element(ElementId::CODEC_ID, "D_WEBVTT/METADATA");
            });
        });
        let tracks = parse(&buf).unwrap();
        assert!(tracks.get_by_number(3).unwrap().is_metadata());
    }
}
