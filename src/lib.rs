//! webmforge - WebM muxing and parsing
//!
//! This crate re-exports the workspace members under one roof:
//!
//! - [`ebml`] - varint codec, element IDs, reader/writer traits, shared model
//! - [`mux`] - frame-by-frame muxer with cluster, cue and seek-head handling
//! - [`parse`] - lazy parser with cluster/block navigation and cue lookup
//!
//! ```no_run
//! use webmforge::ebml::IoWriter;
//! use webmforge::mux::{Frame, MuxerConfig};
//!
//! # fn main() -> webmforge::Result<()> {
//! let file = std::fs::File::create("out.webm")?;
//! let mut muxer = webmforge::mux::Segment::new(MuxerConfig::default());
//! muxer.init(IoWriter::new(file)?)?;
//! let track = muxer.add_video_track(640, 360, 0)?.number;
//! muxer.add_frame(&Frame::new(track, 0, b"keyframe").key(true))?;
//! muxer.finalize()?;
//!
//! let mut parsed = webmforge::parse::Segment::open(std::fs::read("out.webm")?)?;
//! parsed.load()?;
//! assert_eq!(parsed.tracks().len(), 1);
//! # Ok(())
//! # }
//! ```

pub use webmforge_ebml as ebml;
pub use webmforge_mux as mux;
pub use webmforge_parse as parse;

pub use webmforge_ebml::{Error, ErrorKind, Result};
