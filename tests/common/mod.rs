//! Shared test harness for integration tests.
//!
//! Provides [`MuxHarness`], which owns a muxing segment writing into memory,
//! and helpers that load the produced bytes back with the parser and flatten
//! every block into a [`ParsedBlock`].

#![allow(dead_code)]

use std::io::Cursor;

use tracing_subscriber::EnvFilter;
use webmforge::ebml::model::codec;
use webmforge::ebml::IoWriter;
use webmforge::mux::{self, MuxerConfig};
use webmforge::parse::{self, BlockKind, ClusterHandle};

pub const VIDEO_TRACK: u64 = 1;
pub const AUDIO_TRACK: u64 = 2;
pub const METADATA_TRACK: u64 = 3;
pub const WIDTH: u64 = 640;
pub const HEIGHT: u64 = 480;
pub const SAMPLE_RATE: f64 = 30.0;
pub const CHANNELS: u64 = 2;
pub const APP: &str = "unit_test";

/// Frame payload used by most tests.
pub const FRAME: &[u8] = &[0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80, 0x90, 0xA0];

pub type MemoryWriter = IoWriter<Cursor<Vec<u8>>>;

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with fixed app names so output is deterministic.
pub fn test_config() -> MuxerConfig {
    MuxerConfig {
        muxing_app: APP.to_string(),
        writing_app: APP.to_string(),
        ..MuxerConfig::default()
    }
}

/// A muxing segment writing into an in-memory seekable buffer.
pub struct MuxHarness {
    pub segment: mux::Segment<MemoryWriter>,
}

impl MuxHarness {
    /// Create a harness with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Create a harness with a custom config.
    pub fn with_config(config: MuxerConfig) -> Self {
        init_tracing();
        let mut segment = mux::Segment::new(config);
        let writer = IoWriter::new(Cursor::new(Vec::new())).expect("in-memory writer");
        segment.init(writer).expect("init segment");
        Self { segment }
    }

    /// Add the standard video track.
    pub fn add_video_track(&mut self) -> u64 {
        let track = self
            .segment
            .add_video_track(WIDTH, HEIGHT, VIDEO_TRACK)
            .expect("add video track");
        track.uid = VIDEO_TRACK;
        track.number
    }

    /// Add the standard Opus audio track.
    pub fn add_audio_track(&mut self) -> u64 {
        let track = self
            .segment
            .add_audio_track(SAMPLE_RATE, CHANNELS, AUDIO_TRACK)
            .expect("add audio track");
        track.uid = AUDIO_TRACK;
        track.codec_id = Some(codec::OPUS.to_string());
        track.number
    }

    /// Add a WebVTT metadata track.
    pub fn add_metadata_track(&mut self) -> u64 {
        let track = self.segment.add_track(METADATA_TRACK).expect("add metadata track");
        track.uid = METADATA_TRACK;
        track.kind = Some(webmforge::ebml::TrackKind::Metadata);
        track.codec_id = Some(codec::WEBVTT_METADATA.to_string());
        track.number
    }

    /// Add a key frame with [`FRAME`] as payload.
    pub fn add_key_frame(&mut self, track: u64, timestamp: u64) {
        self.segment
            .add_frame(&mux::Frame::new(track, timestamp, FRAME).key(true))
            .expect("add frame");
    }

    /// Finalize and return the written bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.segment.finalize().expect("finalize");
        self.into_bytes()
    }

    /// Return the written bytes without finalizing.
    pub fn into_bytes(self) -> Vec<u8> {
        self.segment
            .into_writer()
            .expect("writer attached")
            .into_inner()
            .expect("flush writer")
            .into_inner()
    }
}

/// Open and load a parsed segment over `data`.
pub fn load(data: Vec<u8>) -> parse::Segment<Vec<u8>> {
    init_tracing();
    let mut segment = parse::Segment::open(data).expect("open segment");
    segment.load().expect("load segment");
    segment
}

/// One block as seen by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBlock {
    pub cluster: usize,
    pub track: u64,
    pub time_ns: i64,
    pub is_key: bool,
    pub kind: BlockKind,
    pub frames: Vec<Vec<u8>>,
    pub discard_padding: i64,
    pub duration: Option<u64>,
    pub additions: Vec<(u64, Vec<u8>)>,
}

/// Walk every cluster and entry, reading all payloads.
pub fn collect_blocks(segment: &mut parse::Segment<Vec<u8>>) -> Vec<ParsedBlock> {
    let scale = segment.timecode_scale();
    let mut blocks = Vec::new();
    let mut cluster = segment.first_cluster().expect("first cluster");
    while let ClusterHandle::Cluster(cluster_index) = cluster {
        let mut entry = segment.first_entry(cluster).expect("first entry");
        while let Some(block_entry) = segment.entry(entry).cloned() {
            let block = block_entry.block();
            let frames = block
                .frames()
                .iter()
                .map(|frame| segment.read_frame(frame).expect("read frame"))
                .collect();
            let group = block_entry.group();
            let additions = group
                .map(|g| g.additions().to_vec())
                .unwrap_or_default()
                .into_iter()
                .map(|a| (a.add_id, segment.read_frame(&a.data).expect("read addition")))
                .collect();
            blocks.push(ParsedBlock {
                cluster: cluster_index,
                track: block.track_number(),
                time_ns: block.time_ns(scale),
                is_key: block.is_key(),
                kind: block_entry.kind(),
                frames,
                discard_padding: block.discard_padding(),
                duration: group.and_then(|g| g.duration()),
                additions,
            });
            entry = segment.next_entry(entry).expect("next entry");
        }
        cluster = segment.next_cluster(cluster).expect("next cluster");
    }
    blocks
}

/// Number of clusters, walking to the end of the segment.
pub fn count_clusters(segment: &mut parse::Segment<Vec<u8>>) -> usize {
    let mut count = 0;
    let mut cluster = segment.first_cluster().expect("first cluster");
    while cluster != ClusterHandle::Eos {
        count += 1;
        cluster = segment.next_cluster(cluster).expect("next cluster");
    }
    count
}
