//! Track table and Tracks element serialization.

use bytes::BytesMut;
use rand::Rng;
use webmforge_ebml::element::put_master;
use webmforge_ebml::model::codec;
use webmforge_ebml::{AudioSettings, EbmlBufMut, ElementId, Error, Result, Track, TrackKind, VideoSettings};

/// Random nonzero 64-bit UID.
pub fn generate_uid() -> u64 {
    rand::thread_rng().gen_range(1..=u64::MAX)
}

/// The tracks of one segment, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Tracks {
    entries: Vec<Track>,
}

impl Tracks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty track. A `number` of 0 picks the lowest unused number.
    pub fn add(&mut self, number: u64) -> Result<&mut Track> {
        let number = match number {
            0 => self.next_free_number(),
            n if self.get(n).is_some() => {
                return Err(Error::validation(format!("track number {n} already in use")));
            }
            n => n,
        };
        self.entries.push(Track::new(number, generate_uid()));
        let index = self.entries.len() - 1;
        Ok(&mut self.entries[index])
    }

    /// Add a video track with VP8 as the default codec.
    pub fn add_video(&mut self, width: u64, height: u64, number: u64) -> Result<&mut Track> {
        let track = self.add(number)?;
        track.kind = Some(TrackKind::Video(VideoSettings::new(width, height)));
        track.codec_id = Some(codec::VP8.to_string());
        Ok(track)
    }

    /// Add an audio track with Vorbis as the default codec.
    pub fn add_audio(&mut self, sample_rate: f64, channels: u64, number: u64) -> Result<&mut Track> {
        if sample_rate <= 0.0 || channels == 0 {
            return Err(Error::validation(format!(
                "invalid audio settings: {sample_rate} Hz, {channels} channels"
            )));
        }
        let track = self.add(number)?;
        track.kind = Some(TrackKind::Audio(AudioSettings::new(sample_rate, channels)));
        track.codec_id = Some(codec::VORBIS.to_string());
        Ok(track)
    }

    fn next_free_number(&self) -> u64 {
        (1..).find(|n| self.get(*n).is_none()).unwrap_or(1)
    }

    pub fn get(&self, number: u64) -> Option<&Track> {
        self.entries.iter().find(|t| t.number == number)
    }

    pub fn get_mut(&mut self, number: u64) -> Option<&mut Track> {
        self.entries.iter_mut().find(|t| t.number == number)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any track needs DocTypeVersion 4 elements.
    pub fn uses_v4_elements(&self) -> bool {
        self.entries
            .iter()
            .any(|t| t.codec_delay > 0 || t.seek_pre_roll > 0)
    }

    /// Check that every track can be written, with unique numbers and UIDs.
    pub fn validate(&self) -> Result<()> {
        for (i, track) in self.entries.iter().enumerate() {
            if track.number == 0 {
                return Err(Error::validation("track number cannot be 0"));
            }
            if track.uid == 0 {
                return Err(Error::validation(format!("track {} has UID 0", track.number)));
            }
            let later = &self.entries[i + 1..];
            if later.iter().any(|t| t.number == track.number) {
                return Err(Error::validation(format!("duplicate track number {}", track.number)));
            }
            if later.iter().any(|t| t.uid == track.uid) {
                return Err(Error::validation(format!("duplicate track UID {}", track.uid)));
            }
        }
        Ok(())
    }

    /// Append the Tracks element.
    pub fn put(&self, buf: &mut BytesMut) {
        put_master(buf, ElementId::TRACKS, |buf| {
            for track in &self.entries {
                put_track_entry(buf, track);
            }
        });
    }
}

fn put_track_entry(buf: &mut BytesMut, track: &Track) {
    put_master(buf, ElementId::TRACK_ENTRY, |buf| {
        buf.put_uint_element(ElementId::TRACK_NUMBER, track.number);
        buf.put_uint_element(ElementId::TRACK_UID, track.uid);
        buf.put_uint_element(ElementId::TRACK_TYPE, track.type_code());
        if let Some(codec_id) = &track.codec_id {
            buf.put_string_element(ElementId::CODEC_ID, codec_id);
        }
        if let Some(private) = &track.codec_private {
            buf.put_bytes_element(ElementId::CODEC_PRIVATE, private);
        }
        if let Some(codec_name) = &track.codec_name {
            buf.put_string_element(ElementId::CODEC_NAME, codec_name);
        }
        if let Some(language) = &track.language {
            buf.put_string_element(ElementId::LANGUAGE, language);
        }
        if let Some(name) = &track.name {
            buf.put_string_element(ElementId::NAME, name);
        }
        // FlagLacing defaults to 1
        if !track.lacing {
            buf.put_uint_element(ElementId::FLAG_LACING, 0);
        }
        if track.max_block_additional_id > 0 {
            buf.put_uint_element(ElementId::MAX_BLOCK_ADDITION_ID, track.max_block_additional_id);
        }
        if track.codec_delay > 0 {
            buf.put_uint_element(ElementId::CODEC_DELAY, track.codec_delay);
        }
        if track.seek_pre_roll > 0 {
            buf.put_uint_element(ElementId::SEEK_PRE_ROLL, track.seek_pre_roll);
        }
        if track.default_duration > 0 {
            buf.put_uint_element(ElementId::DEFAULT_DURATION, track.default_duration);
        }

        match &track.kind {
            Some(TrackKind::Video(video)) => put_video(buf, video),
            Some(TrackKind::Audio(audio)) => put_audio(buf, audio),
            Some(TrackKind::Subtitle | TrackKind::Metadata | TrackKind::Other(_)) | None => {}
        }
    });
}

fn put_video(buf: &mut BytesMut, video: &VideoSettings) {
    put_master(buf, ElementId::VIDEO, |buf| {
        buf.put_uint_element(ElementId::PIXEL_WIDTH, video.width);
        buf.put_uint_element(ElementId::PIXEL_HEIGHT, video.height);
        if let Some(width) = video.display_width {
            buf.put_uint_element(ElementId::DISPLAY_WIDTH, width);
        }
        if let Some(height) = video.display_height {
            buf.put_uint_element(ElementId::DISPLAY_HEIGHT, height);
        }
        if video.display_unit > 0 {
            buf.put_uint_element(ElementId::DISPLAY_UNIT, video.display_unit);
        }
        if video.stereo_mode > 0 {
            buf.put_uint_element(ElementId::STEREO_MODE, video.stereo_mode);
        }
        if video.alpha_mode > 0 {
            buf.put_uint_element(ElementId::ALPHA_MODE, video.alpha_mode);
        }
        if video.frame_rate > 0.0 {
            buf.put_float_element(ElementId::FRAME_RATE, video.frame_rate as f32);
        }
    });
}

fn put_audio(buf: &mut BytesMut, audio: &AudioSettings) {
    put_master(buf, ElementId::AUDIO, |buf| {
        buf.put_float_element(ElementId::SAMPLING_FREQUENCY, audio.sample_rate as f32);
        buf.put_uint_element(ElementId::CHANNELS, audio.channels);
        if audio.bit_depth > 0 {
            buf.put_uint_element(ElementId::BIT_DEPTH, audio.bit_depth);
        }
    });
}
