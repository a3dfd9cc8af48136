//! Matroska/WebM element IDs.

use crate::vint;

/// Element ID, including its varint marker bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

impl ElementId {
    // EBML header
    pub const EBML: Self = Self(0x1A45_DFA3);
    pub const EBML_VERSION: Self = Self(0x4286);
    pub const EBML_READ_VERSION: Self = Self(0x42F7);
    pub const EBML_MAX_ID_LENGTH: Self = Self(0x42F2);
    pub const EBML_MAX_SIZE_LENGTH: Self = Self(0x42F3);
    pub const DOC_TYPE: Self = Self(0x4282);
    pub const DOC_TYPE_VERSION: Self = Self(0x4287);
    pub const DOC_TYPE_READ_VERSION: Self = Self(0x4285);

    // Global
    pub const VOID: Self = Self(0xEC);
    pub const CRC32: Self = Self(0xBF);

    // Segment
    pub const SEGMENT: Self = Self(0x1853_8067);

    // SeekHead
    pub const SEEK_HEAD: Self = Self(0x114D_9B74);
    pub const SEEK: Self = Self(0x4DBB);
    pub const SEEK_ID: Self = Self(0x53AB);
    pub const SEEK_POSITION: Self = Self(0x53AC);

    // Info
    pub const INFO: Self = Self(0x1549_A966);
    pub const TIMECODE_SCALE: Self = Self(0x2A_D7B1);
    pub const DURATION: Self = Self(0x4489);
    pub const DATE_UTC: Self = Self(0x4461);
    pub const TITLE: Self = Self(0x7BA9);
    pub const MUXING_APP: Self = Self(0x4D80);
    pub const WRITING_APP: Self = Self(0x5741);

    // Cluster
    pub const CLUSTER: Self = Self(0x1F43_B675);
    pub const TIMECODE: Self = Self(0xE7);
    pub const POSITION: Self = Self(0xA7);
    pub const PREV_SIZE: Self = Self(0xAB);
    pub const SIMPLE_BLOCK: Self = Self(0xA3);
    pub const BLOCK_GROUP: Self = Self(0xA0);
    pub const BLOCK: Self = Self(0xA1);
    pub const BLOCK_ADDITIONS: Self = Self(0x75A1);
    pub const BLOCK_MORE: Self = Self(0xA6);
    pub const BLOCK_ADD_ID: Self = Self(0xEE);
    pub const BLOCK_ADDITIONAL: Self = Self(0xA5);
    pub const BLOCK_DURATION: Self = Self(0x9B);
    pub const REFERENCE_BLOCK: Self = Self(0xFB);
    pub const DISCARD_PADDING: Self = Self(0x75A2);

    // Tracks
    pub const TRACKS: Self = Self(0x1654_AE6B);
    pub const TRACK_ENTRY: Self = Self(0xAE);
    pub const TRACK_NUMBER: Self = Self(0xD7);
    pub const TRACK_UID: Self = Self(0x73C5);
    pub const TRACK_TYPE: Self = Self(0x83);
    pub const FLAG_ENABLED: Self = Self(0xB9);
    pub const FLAG_DEFAULT: Self = Self(0x88);
    pub const FLAG_FORCED: Self = Self(0x55AA);
    pub const FLAG_LACING: Self = Self(0x9C);
    pub const DEFAULT_DURATION: Self = Self(0x23_E383);
    pub const MAX_BLOCK_ADDITION_ID: Self = Self(0x55EE);
    pub const NAME: Self = Self(0x536E);
    pub const LANGUAGE: Self = Self(0x22_B59C);
    pub const CODEC_ID: Self = Self(0x86);
    pub const CODEC_PRIVATE: Self = Self(0x63A2);
    pub const CODEC_NAME: Self = Self(0x25_8688);
    pub const CODEC_DELAY: Self = Self(0x56AA);
    pub const SEEK_PRE_ROLL: Self = Self(0x56BB);

    // Video
    pub const VIDEO: Self = Self(0xE0);
    pub const FLAG_INTERLACED: Self = Self(0x9A);
    pub const STEREO_MODE: Self = Self(0x53B8);
    pub const ALPHA_MODE: Self = Self(0x53C0);
    pub const PIXEL_WIDTH: Self = Self(0xB0);
    pub const PIXEL_HEIGHT: Self = Self(0xBA);
    pub const PIXEL_CROP_BOTTOM: Self = Self(0x54AA);
    pub const PIXEL_CROP_TOP: Self = Self(0x54BB);
    pub const PIXEL_CROP_LEFT: Self = Self(0x54CC);
    pub const PIXEL_CROP_RIGHT: Self = Self(0x54DD);
    pub const DISPLAY_WIDTH: Self = Self(0x54B0);
    pub const DISPLAY_HEIGHT: Self = Self(0x54BA);
    pub const DISPLAY_UNIT: Self = Self(0x54B2);
    pub const FRAME_RATE: Self = Self(0x23_83E3);

    // Audio
    pub const AUDIO: Self = Self(0xE1);
    pub const SAMPLING_FREQUENCY: Self = Self(0xB5);
    pub const OUTPUT_SAMPLING_FREQUENCY: Self = Self(0x78B5);
    pub const CHANNELS: Self = Self(0x9F);
    pub const BIT_DEPTH: Self = Self(0x6264);

    // Content encoding (parsed only to count entries)
    pub const CONTENT_ENCODINGS: Self = Self(0x6D80);
    pub const CONTENT_ENCODING: Self = Self(0x6240);

    // Cues
    pub const CUES: Self = Self(0x1C53_BB6B);
    pub const CUE_POINT: Self = Self(0xBB);
    pub const CUE_TIME: Self = Self(0xB3);
    pub const CUE_TRACK_POSITIONS: Self = Self(0xB7);
    pub const CUE_TRACK: Self = Self(0xF7);
    pub const CUE_CLUSTER_POSITION: Self = Self(0xF1);
    pub const CUE_RELATIVE_POSITION: Self = Self(0xF0);
    pub const CUE_BLOCK_NUMBER: Self = Self(0x5378);

    // Chapters
    pub const CHAPTERS: Self = Self(0x1043_A770);
    pub const EDITION_ENTRY: Self = Self(0x45B9);
    pub const CHAPTER_ATOM: Self = Self(0xB6);
    pub const CHAPTER_UID: Self = Self(0x73C4);
    pub const CHAPTER_STRING_UID: Self = Self(0x5654);
    pub const CHAPTER_TIME_START: Self = Self(0x91);
    pub const CHAPTER_TIME_END: Self = Self(0x92);
    pub const CHAPTER_DISPLAY: Self = Self(0x80);
    pub const CHAP_STRING: Self = Self(0x85);
    pub const CHAP_LANGUAGE: Self = Self(0x437C);
    pub const CHAP_COUNTRY: Self = Self(0x437E);

    // Tags
    pub const TAGS: Self = Self(0x1254_C367);
    pub const TAG: Self = Self(0x7373);
    pub const TARGETS: Self = Self(0x63C0);
    pub const SIMPLE_TAG: Self = Self(0x67C8);
    pub const TAG_NAME: Self = Self(0x45A3);
    pub const TAG_STRING: Self = Self(0x4487);

    /// Encoded length of this ID.
    pub fn encoded_len(&self) -> usize {
        vint::id_size(self.0)
    }

    /// Whether this ID may appear directly inside a Segment.
    pub fn is_top_level(&self) -> bool {
        matches!(
            *self,
            Self::SEEK_HEAD
                | Self::INFO
                | Self::TRACKS
                | Self::CLUSTER
                | Self::CUES
                | Self::CHAPTERS
                | Self::TAGS
                | Self::SEGMENT
                | Self::EBML
        )
    }

    /// Human-readable element name for logs.
    pub fn name(&self) -> &'static str {
        match *self {
            Self::EBML => "EBML",
            Self::SEGMENT => "Segment",
            Self::SEEK_HEAD => "SeekHead",
            Self::INFO => "Info",
            Self::TRACKS => "Tracks",
            Self::CLUSTER => "Cluster",
            Self::CUES => "Cues",
            Self::CHAPTERS => "Chapters",
            Self::TAGS => "Tags",
            Self::VOID => "Void",
            Self::SIMPLE_BLOCK => "SimpleBlock",
            Self::BLOCK_GROUP => "BlockGroup",
            Self::CUE_POINT => "CuePoint",
            _ => "element",
        }
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(0x{:X})", self.name(), self.0)
    }
}

impl From<u32> for ElementId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
