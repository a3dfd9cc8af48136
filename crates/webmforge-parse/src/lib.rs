//! webmforge-parse: lazy WebM parser
//!
//! Reads a Matroska/WebM byte stream from any [`MkvReader`] and exposes its
//! metadata, clusters, blocks and cue index without reading frame payloads
//! until they are requested.
//!
//! # Modules
//!
//! - `header` - EBML header
//! - `segment` - Top-level scan, cluster and entry navigation
//! - `cluster` - Clusters decoded one entry at a time
//! - `block` - SimpleBlock/BlockGroup headers and lacing
//! - `cues` - Lazily loaded cue points
//! - `info`, `tracks`, `metadata` - Info, Tracks, Chapters and Tags
//!
//! # Navigation
//!
//! ```text
//! Segment::load()
//!   first_cluster() ──> Cluster(0) ──next_cluster()──> ... ──> Eos
//!     first_entry() ──> Entry{0, 0} ──next_entry()──> ... ──> Eos
//!       read_frame(frame) reads payload bytes
//! ```

pub mod block;
pub mod cluster;
pub mod cues;
pub mod header;
pub mod info;
pub mod metadata;
pub mod segment;
pub mod tracks;

pub use block::{Block, BlockAddition, BlockEntry, BlockFrame, BlockGroup, BlockKind};
pub use cluster::Cluster;
pub use cues::{CuePoint, CueTrackPosition, Cues};
pub use header::EbmlHeader;
pub use segment::{ClusterHandle, EntryHandle, Segment};
pub use tracks::Tracks;
pub use webmforge_ebml::{Error, ErrorKind, MkvReader, Result};

use tracing::warn;
use webmforge_ebml::{ElementHeader, ElementId};

/// Log an element the parser does not interpret. Void and CRC-32 are
/// expected anywhere and skipped silently.
pub(crate) fn skip_unknown(header: &ElementHeader, parent: &str) {
    if header.id != ElementId::VOID && header.id != ElementId::CRC32 {
        warn!(id = %header.id, pos = header.pos, parent, "skipping unknown element");
    }
}
