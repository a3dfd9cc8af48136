//! Stream-level metadata shared by the muxer and the parser.
//!
//! Track kinds are a tagged enum: the common fields live on [`Track`], the
//! kind-specific ones on [`VideoSettings`] / [`AudioSettings`].

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Default timecode scale: one tick per millisecond.
pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// Well-known codec IDs.
pub mod codec {
    pub const VP8: &str = "V_VP8";
    pub const VP9: &str = "V_VP9";
    pub const AV1: &str = "V_AV1";
    pub const VORBIS: &str = "A_VORBIS";
    pub const OPUS: &str = "A_OPUS";
    pub const WEBVTT_SUBTITLES: &str = "D_WEBVTT/SUBTITLES";
    pub const WEBVTT_CAPTIONS: &str = "D_WEBVTT/CAPTIONS";
    pub const WEBVTT_DESCRIPTIONS: &str = "D_WEBVTT/DESCRIPTIONS";
    pub const WEBVTT_METADATA: &str = "D_WEBVTT/METADATA";
}

/// Video-specific track attributes.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct VideoSettings {
    pub width: u64,
    pub height: u64,
    /// Display width, `None` means same as `width`.
    pub display_width: Option<u64>,
    /// Display height, `None` means same as `height`.
    pub display_height: Option<u64>,
    pub display_unit: u64,
    /// Frame rate in frames per second, 0 when unset.
    pub frame_rate: f64,
    pub stereo_mode: u64,
    pub alpha_mode: u64,
}

impl VideoSettings {
    /// Settings for a `width` x `height` video track.
    pub fn new(width: u64, height: u64) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Effective display width.
    pub fn display_width(&self) -> u64 {
        self.display_width.unwrap_or(self.width)
    }

    /// Effective display height.
    pub fn display_height(&self) -> u64 {
        self.display_height.unwrap_or(self.height)
    }
}

/// Audio-specific track attributes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct AudioSettings {
    /// Sampling frequency in Hz.
    pub sample_rate: f64,
    pub channels: u64,
    /// Bits per sample, 0 when unset.
    pub bit_depth: u64,
}

impl AudioSettings {
    /// Settings for an audio track.
    pub fn new(sample_rate: f64, channels: u64) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth: 0,
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self::new(8000.0, 1)
    }
}

/// Track kind with its kind-specific attributes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum TrackKind {
    Video(VideoSettings),
    Audio(AudioSettings),
    Subtitle,
    Metadata,
    /// Any other Matroska track type code.
    Other(u64),
}

impl TrackKind {
    pub const VIDEO_CODE: u64 = 0x01;
    pub const AUDIO_CODE: u64 = 0x02;
    pub const SUBTITLE_CODE: u64 = 0x11;
    pub const METADATA_CODE: u64 = 0x21;

    /// Matroska TrackType value.
    pub fn code(&self) -> u64 {
        match self {
            Self::Video(_) => Self::VIDEO_CODE,
            Self::Audio(_) => Self::AUDIO_CODE,
            Self::Subtitle => Self::SUBTITLE_CODE,
            Self::Metadata => Self::METADATA_CODE,
            Self::Other(code) => *code,
        }
    }

    /// Kind for a TrackType value with default attributes.
    pub fn from_code(code: u64) -> Self {
        match code {
            Self::VIDEO_CODE => Self::Video(VideoSettings::default()),
            Self::AUDIO_CODE => Self::Audio(AudioSettings::default()),
            Self::SUBTITLE_CODE => Self::Subtitle,
            Self::METADATA_CODE => Self::Metadata,
            other => Self::Other(other),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video(_))
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio(_))
    }

    pub fn is_metadata(&self) -> bool {
        matches!(self, Self::Metadata)
    }
}

/// A track entry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Track {
    pub number: u64,
    pub uid: u64,
    /// `None` until the track type is set.
    pub kind: Option<TrackKind>,
    pub codec_id: Option<String>,
    pub codec_private: Option<Vec<u8>>,
    pub codec_name: Option<String>,
    pub name: Option<String>,
    pub language: Option<String>,
    /// FlagLacing. Defaults to true when absent.
    pub lacing: bool,
    /// Default frame duration in ns, 0 when unset.
    pub default_duration: u64,
    /// Codec delay in ns.
    pub codec_delay: u64,
    /// Seek pre-roll in ns.
    pub seek_pre_roll: u64,
    pub max_block_additional_id: u64,
    /// Number of ContentEncoding entries (encryption/compression).
    pub content_encoding_count: usize,
}

impl Track {
    /// Empty track with the given number and UID.
    pub fn new(number: u64, uid: u64) -> Self {
        Self {
            number,
            uid,
            kind: None,
            codec_id: None,
            codec_private: None,
            codec_name: None,
            name: None,
            language: None,
            lacing: true,
            default_duration: 0,
            codec_delay: 0,
            seek_pre_roll: 0,
            max_block_additional_id: 0,
            content_encoding_count: 0,
        }
    }

    /// Whether type and codec ID are both set.
    pub fn is_complete(&self) -> bool {
        self.kind.is_some() && self.codec_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Matroska TrackType value, 0 when unset.
    pub fn type_code(&self) -> u64 {
        self.kind.as_ref().map(TrackKind::code).unwrap_or(0)
    }

    pub fn is_video(&self) -> bool {
        self.kind.as_ref().is_some_and(TrackKind::is_video)
    }

    pub fn is_audio(&self) -> bool {
        self.kind.as_ref().is_some_and(TrackKind::is_audio)
    }

    pub fn is_metadata(&self) -> bool {
        self.kind.as_ref().is_some_and(TrackKind::is_metadata)
    }

    pub fn video(&self) -> Option<&VideoSettings> {
        match &self.kind {
            Some(TrackKind::Video(video)) => Some(video),
            _ => None,
        }
    }

    pub fn video_mut(&mut self) -> Option<&mut VideoSettings> {
        match &mut self.kind {
            Some(TrackKind::Video(video)) => Some(video),
            _ => None,
        }
    }

    pub fn audio(&self) -> Option<&AudioSettings> {
        match &self.kind {
            Some(TrackKind::Audio(audio)) => Some(audio),
            _ => None,
        }
    }

    pub fn audio_mut(&mut self) -> Option<&mut AudioSettings> {
        match &mut self.kind {
            Some(TrackKind::Audio(audio)) => Some(audio),
            _ => None,
        }
    }
}

/// Segment-level information.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SegmentInfo {
    /// Nanoseconds per tick.
    pub timecode_scale: u64,
    /// Duration in ticks.
    pub duration: Option<f64>,
    pub muxing_app: Option<String>,
    pub writing_app: Option<String>,
    pub title: Option<String>,
    /// Nanoseconds since 2001-01-01T00:00:00 UTC.
    pub date_utc: Option<i64>,
}

impl SegmentInfo {
    /// Duration in nanoseconds, if known.
    pub fn duration_ns(&self) -> Option<f64> {
        self.duration.map(|ticks| ticks * self.timecode_scale as f64)
    }
}

impl Default for SegmentInfo {
    fn default() -> Self {
        Self {
            timecode_scale: DEFAULT_TIMECODE_SCALE,
            duration: None,
            muxing_app: None,
            writing_app: None,
            title: None,
            date_utc: None,
        }
    }
}

/// One localized chapter title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ChapterDisplay {
    pub title: String,
    pub language: Option<String>,
    pub country: Option<String>,
}

/// A chapter atom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Chapter {
    pub uid: u64,
    /// ChapterStringUID.
    pub string_id: Option<String>,
    /// Start time in ns (chapter times are not scaled).
    pub start_ns: u64,
    pub end_ns: Option<u64>,
    pub displays: Vec<ChapterDisplay>,
}

impl Chapter {
    /// Add a localized title.
    pub fn add_display(
        &mut self,
        title: impl Into<String>,
        language: Option<&str>,
        country: Option<&str>,
    ) {
        self.displays.push(ChapterDisplay {
            title: title.into(),
            language: language.map(str::to_owned),
            country: country.map(str::to_owned),
        });
    }
}

/// A name/value metadata pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SimpleTag {
    pub name: String,
    pub value: String,
}

/// A group of simple tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Tag {
    pub simple_tags: Vec<SimpleTag>,
}

impl Tag {
    /// Add a name/value pair.
    pub fn add_simple_tag(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.simple_tags.push(SimpleTag {
            name: name.into(),
            value: value.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_completeness() {
        let mut track = Track::new(1, 1);
        assert!(!track.is_complete());
        track.codec_id = Some(codec::WEBVTT_METADATA.to_string());
        assert!(!track.is_complete());
        track.kind = Some(TrackKind::Metadata);
        assert!(track.is_complete());
        assert_eq!(track.type_code(), 0x21);
    }

    #[test]
    fn test_track_kind_codes() {
        for code in [1, 2, 0x11, 0x21, 0x12] {
            assert_eq!(TrackKind::from_code(code).code(), code);
        }
        assert!(TrackKind::from_code(1).is_video());
    }

    #[test]
    fn test_display_dimensions_default_to_pixels() {
        let mut video = VideoSettings::new(320, 240);
        assert_eq!(video.display_width(), 320);
        video.display_height = Some(230);
        assert_eq!(video.display_height(), 230);
    }

    #[test]
    fn test_duration_ns() {
        let info = SegmentInfo {
            duration: Some(8.0),
            ..Default::default()
        };
        assert_eq!(info.duration_ns(), Some(8_000_000.0));
    }
}
