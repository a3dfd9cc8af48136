//! webmforge-ebml: EBML primitives and the shared WebM data model
//!
//! This crate holds everything the muxer and the parser agree on: the
//! variable-length integer codec, element IDs, element serialization, the
//! reader/writer capability traits, the error type, and the track/info/
//! chapter/tag model.
//!
//! # Modules
//!
//! - `vint` - Varint codec for IDs and sizes, fixed-width integer payloads
//! - `ids` - Matroska/WebM element IDs
//! - `element` - Element serialization into `BufMut` buffers, size calculators
//! - `writer` - `MkvWriter` sinks, unknown-size elements, Void padding
//! - `lacing` - Block flags and lacing modes
//! - `reader` - `MkvReader` sources, element header peeking, typed payload reads
//! - `model` - Track, segment info, chapter and tag types
//!
//! # Element layout
//!
//! Every element is serialized as:
//!
//! ```text
//! +----------+-------------+-----------------+
//! | ID (1-4) | size (1-8)  | payload (size)  |
//! +----------+-------------+-----------------+
//! ```
//!
//! The size may be the reserved "unknown" value for master elements whose
//! extent is determined by the next element at the same level.

pub mod element;
pub mod error;
pub mod ids;
pub mod lacing;
pub mod model;
pub mod reader;
pub mod vint;
pub mod writer;

pub use element::EbmlBufMut;
pub use error::{Error, ErrorKind, Result};
pub use ids::ElementId;
pub use lacing::Lacing;
pub use model::{
    AudioSettings, Chapter, ChapterDisplay, SegmentInfo, SimpleTag, Tag, Track, TrackKind,
    VideoSettings,
};
pub use reader::{peek_element, ElementHeader, IoReader, MkvReader};
pub use writer::{IoWriter, MkvWriter, StreamWriter};
