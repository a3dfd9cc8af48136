//! webmforge-mux: WebM muxing engine
//!
//! Turns a timed sequence of frames into a Matroska/WebM byte stream.
//!
//! # Modules
//!
//! - `segment` - Segment state machine: header emission, clusters, finalize
//! - `frame` - Frames handed to the muxer
//! - `cluster` - SimpleBlock/BlockGroup encoding, cluster buffering
//! - `cues` - Cue index and relocation shift
//! - `seek_head` - SeekHead reservation and back-filling
//! - `tracks` - Track table and Tracks element
//! - `metadata` - Chapters and Tags elements
//! - `config` - TOML-loadable muxer settings
//!
//! # Output layout
//!
//! ```text
//! EBML header
//! Segment (size patched at finalize on seekable writers)
//! ├── SeekHead (reserved, seekable writers only)
//! ├── Info
//! ├── Tracks
//! ├── Chapters (optional)
//! ├── Cluster ...
//! ├── Cues
//! └── Tags (optional)
//! ```

pub mod cluster;
pub mod config;
pub mod cues;
pub mod frame;
pub mod metadata;
pub mod seek_head;
pub mod segment;
pub mod tracks;

pub use config::MuxerConfig;
pub use cues::{CuePoint, CueTrackPosition, Cues};
pub use frame::Frame;
pub use segment::{Segment, SegmentState};
pub use tracks::Tracks;
pub use webmforge_ebml::{Error, ErrorKind, Result};
