//! Segment orchestrator: header emission, cluster lifecycle, cues, finalize.

use crate::cluster::{encode_frame, encode_laced, ActiveCluster, EncodedBlock};
use crate::config::MuxerConfig;
use crate::cues::{CueTrackPosition, Cues};
use crate::frame::Frame;
use crate::metadata::{put_chapters, put_tags, validate_chapter};
use crate::seek_head::SeekHead;
use crate::tracks::{generate_uid, Tracks};
use bytes::{BufMut, BytesMut};
use std::collections::HashMap;
use tracing::{debug, warn};
use webmforge_ebml::element::{header_size, put_master};
use webmforge_ebml::vint::{self, PATCHABLE_SIZE_WIDTH};
use webmforge_ebml::writer::{close_unknown_size_element, start_unknown_size_element, UnknownSizeElement};
use webmforge_ebml::{
    Chapter, EbmlBufMut, ElementId, Error, MkvReader, MkvWriter, Result, SegmentInfo, Tag, Track,
};

const DOC_TYPE_VERSION: u64 = 2;
const DOC_TYPE_VERSION_V4: u8 = 4;
const DOC_TYPE_READ_VERSION: u64 = 2;

/// Chunk size used when copying a finished file.
const COPY_CHUNK: u64 = 64 * 1024;

/// Lifecycle of a muxing segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// No writer attached.
    Unopened,
    /// EBML header written, nothing else.
    Initialized,
    /// Tracks or frames have been added.
    Accepting,
    /// Cues, tags and sizes written. Terminal.
    Finalized,
}

/// Byte positions fixed when the segment header is written.
#[derive(Debug, Clone, Copy)]
struct HeaderLayout {
    segment: UnknownSizeElement,
    /// Absolute position of the Duration float payload, when one was written.
    duration_pos: Option<u64>,
}

/// A WebM segment being written.
///
/// ```no_run
/// use webmforge_mux::{Frame, MuxerConfig, Segment};
/// use webmforge_ebml::IoWriter;
///
/// # fn main() -> webmforge_ebml::Result<()> {
/// let file = std::fs::File::create("out.webm")?;
/// let mut segment = Segment::new(MuxerConfig::default());
/// segment.init(IoWriter::new(file)?)?;
/// let track = segment.add_video_track(320, 240, 0)?.number;
/// segment.add_frame(&Frame::new(track, 0, &[0x10, 0x02]).key(true))?;
/// segment.finalize()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Segment<W> {
    config: MuxerConfig,
    state: SegmentState,
    writer: Option<W>,
    info: SegmentInfo,
    tracks: Tracks,
    chapters: Vec<Chapter>,
    tags: Vec<Tag>,
    cues: Cues,
    cues_track: Option<u64>,
    force_new_cluster: bool,
    /// Absolute position of the DocTypeVersion value byte.
    doc_type_version_pos: u64,
    header: Option<HeaderLayout>,
    seek_head: Option<SeekHead>,
    cluster: Option<ActiveCluster>,
    /// `(base ticks, relative position)` of every cluster opened so far.
    cluster_starts: Vec<(u64, u64)>,
    last_timestamps: HashMap<u64, u64>,
    /// Latest frame end time in ns.
    max_end_ns: u64,
    uses_discard_padding: bool,
    /// Relative position of the Cues written at finalize.
    cues_pos: Option<u64>,
    /// Absolute end of the Segment payload at finalize.
    segment_end: u64,
}

impl<W: MkvWriter> Segment<W> {
    /// Create an unopened segment.
    pub fn new(config: MuxerConfig) -> Self {
        let info = SegmentInfo {
            timecode_scale: config.timecode_scale,
            duration: config.duration,
            muxing_app: Some(config.muxing_app.clone()),
            writing_app: Some(config.writing_app.clone()),
            ..SegmentInfo::default()
        };
        Self {
            cues_track: config.cues_track,
            config,
            state: SegmentState::Unopened,
            writer: None,
            info,
            tracks: Tracks::new(),
            chapters: Vec::new(),
            tags: Vec::new(),
            cues: Cues::new(),
            force_new_cluster: false,
            doc_type_version_pos: 0,
            header: None,
            seek_head: None,
            cluster: None,
            cluster_starts: Vec::new(),
            last_timestamps: HashMap::new(),
            max_end_ns: 0,
            uses_discard_padding: false,
            cues_pos: None,
            segment_end: 0,
        }
    }

    /// Attach the writer and write the EBML header.
    pub fn init(&mut self, mut writer: W) -> Result<()> {
        if self.state != SegmentState::Unopened {
            return Err(Error::InvalidState("segment already initialized"));
        }
        self.config.validate()?;

        let mut children = BytesMut::with_capacity(48);
        children.put_uint_element(ElementId::EBML_VERSION, 1);
        children.put_uint_element(ElementId::EBML_READ_VERSION, 1);
        children.put_uint_element(ElementId::EBML_MAX_ID_LENGTH, vint::MAX_ID_LENGTH as u64);
        children.put_uint_element(ElementId::EBML_MAX_SIZE_LENGTH, vint::MAX_VINT_LENGTH as u64);
        children.put_string_element(ElementId::DOC_TYPE, &self.config.doc_type);
        children.put_uint_element(ElementId::DOC_TYPE_VERSION, DOC_TYPE_VERSION);
        let version_offset = children.len() - 1;
        children.put_uint_element(ElementId::DOC_TYPE_READ_VERSION, DOC_TYPE_READ_VERSION);

        let header_len = header_size(ElementId::EBML, children.len() as u64);
        let mut buf = BytesMut::with_capacity(header_len as usize + children.len());
        buf.put_element_header(ElementId::EBML, children.len() as u64);
        buf.put_slice(&children);

        let start = writer.position();
        writer.write(&buf)?;
        self.doc_type_version_pos = start + header_len + version_offset as u64;
        self.writer = Some(writer);
        self.state = SegmentState::Initialized;
        debug!("Wrote EBML header, doc type {}", self.config.doc_type);
        Ok(())
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    pub fn config(&self) -> &MuxerConfig {
        &self.config
    }

    pub fn segment_info(&self) -> &SegmentInfo {
        &self.info
    }

    /// Mutable segment info, until the segment header is written.
    pub fn segment_info_mut(&mut self) -> Result<&mut SegmentInfo> {
        self.check_header_open()?;
        Ok(&mut self.info)
    }

    /// Set an explicit duration in ticks, overriding the computed one.
    pub fn set_duration(&mut self, ticks: f64) -> Result<()> {
        if self.state == SegmentState::Finalized {
            return Err(Error::InvalidState("segment is finalized"));
        }
        if !ticks.is_finite() || ticks < 0.0 {
            return Err(Error::validation(format!("invalid duration {ticks}")));
        }
        self.info.duration = Some(ticks);
        Ok(())
    }

    /// Add an empty track. A `number` of 0 picks the lowest unused number.
    pub fn add_track(&mut self, number: u64) -> Result<&mut Track> {
        self.check_header_open()?;
        let Self { tracks, state, .. } = self;
        let track = tracks.add(number)?;
        *state = SegmentState::Accepting;
        Ok(track)
    }

    /// Add a VP8 video track.
    pub fn add_video_track(&mut self, width: u64, height: u64, number: u64) -> Result<&mut Track> {
        self.check_header_open()?;
        let Self { tracks, state, .. } = self;
        let track = tracks.add_video(width, height, number)?;
        *state = SegmentState::Accepting;
        Ok(track)
    }

    /// Add a Vorbis audio track.
    pub fn add_audio_track(&mut self, sample_rate: f64, channels: u64, number: u64) -> Result<&mut Track> {
        self.check_header_open()?;
        let Self { tracks, state, .. } = self;
        let track = tracks.add_audio(sample_rate, channels, number)?;
        *state = SegmentState::Accepting;
        Ok(track)
    }

    pub fn tracks(&self) -> &Tracks {
        &self.tracks
    }

    pub fn track(&self, number: u64) -> Option<&Track> {
        self.tracks.get(number)
    }

    /// Mutable access to a track. Tracks are frozen once written.
    pub fn track_mut(&mut self, number: u64) -> Result<&mut Track> {
        if self.header.is_some() || self.state == SegmentState::Finalized {
            return Err(Error::validation(format!("track {number} is already written")));
        }
        self.tracks.get_mut(number).ok_or(Error::UnknownTrack(number))
    }

    /// Add a chapter with a random UID.
    pub fn add_chapter(&mut self) -> Result<&mut Chapter> {
        self.check_header_open()?;
        self.chapters.push(Chapter {
            uid: generate_uid(),
            ..Chapter::default()
        });
        let index = self.chapters.len() - 1;
        Ok(&mut self.chapters[index])
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// Add a tag. Tags are written at finalize.
    pub fn add_tag(&mut self) -> Result<&mut Tag> {
        if self.state == SegmentState::Finalized {
            return Err(Error::InvalidState("segment is finalized"));
        }
        self.tags.push(Tag::default());
        let index = self.tags.len() - 1;
        Ok(&mut self.tags[index])
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Restrict automatic cue points to key frames on `track`.
    pub fn set_cues_track(&mut self, track: u64) -> Result<()> {
        if self.tracks.get(track).is_none() {
            return Err(Error::UnknownTrack(track));
        }
        self.cues_track = Some(track);
        Ok(())
    }

    pub fn cues_track(&self) -> Option<u64> {
        self.cues_track
    }

    /// Start a new cluster with the next frame.
    pub fn force_new_cluster(&mut self) {
        self.force_new_cluster = true;
    }

    pub fn cues(&self) -> &Cues {
        &self.cues
    }

    /// Number of clusters opened so far.
    pub fn cluster_count(&self) -> usize {
        self.cluster_starts.len()
    }

    /// Add one frame.
    ///
    /// Nothing is written and no state changes when the frame is rejected.
    pub fn add_frame(&mut self, frame: &Frame<'_>) -> Result<()> {
        let track = self.tracks.get(frame.track).ok_or(Error::UnknownTrack(frame.track))?;
        if !track.is_complete() {
            return Err(Error::IncompleteTrack(frame.track));
        }
        let is_metadata = track.is_metadata();
        let is_video = track.is_video();
        frame.validate()?;
        let last = self.check_timestamp(frame.track, frame.timestamp)?;
        self.check_accepting()?;

        let mut frame = *frame;
        if is_metadata {
            frame.is_key = true;
        }
        let scale = self.timecode_scale()?;
        let ticks = frame.timestamp / scale;
        let reference = (!frame.is_key && !frame.can_be_simple_block()).then(|| {
            let reference_ns = frame.reference_timestamp.or(last).unwrap_or(0);
            (reference_ns / scale) as i64 - ticks as i64
        });
        let block = encode_frame(&frame, scale, reference)?;

        self.ensure_header()?;
        let position = self.place_block(block, frame.timestamp, ticks, frame.is_key && is_video)?;
        if frame.is_key {
            self.auto_cue(ticks, frame.track, position)?;
        }
        self.last_timestamps.insert(frame.track, frame.timestamp);
        self.max_end_ns = self.max_end_ns.max(frame.end_time());
        self.uses_discard_padding |= frame.discard_padding.is_some();
        Ok(())
    }

    /// Add a metadata frame (WebVTT cue and the like) with a duration.
    pub fn add_metadata(&mut self, payload: &[u8], track: u64, timestamp: u64, duration: u64) -> Result<()> {
        let frame = Frame::new(track, timestamp, payload).key(true).with_duration(duration);
        self.add_frame(&frame)
    }

    /// Add several frames sharing `timestamp` as one EBML-laced SimpleBlock.
    pub fn add_laced_frames(&mut self, track: u64, timestamp: u64, payloads: &[&[u8]], is_key: bool) -> Result<()> {
        let entry = self.tracks.get(track).ok_or(Error::UnknownTrack(track))?;
        if !entry.is_complete() {
            return Err(Error::IncompleteTrack(track));
        }
        if !entry.lacing {
            return Err(Error::validation(format!("track {track} does not allow lacing")));
        }
        let is_video = entry.is_video();
        let block = encode_laced(track, payloads, is_key)?;
        self.check_timestamp(track, timestamp)?;
        self.check_accepting()?;

        let ticks = timestamp / self.timecode_scale()?;
        self.ensure_header()?;
        let position = self.place_block(block, timestamp, ticks, is_key && is_video)?;
        if is_key {
            self.auto_cue(ticks, track, position)?;
        }
        self.last_timestamps.insert(track, timestamp);
        self.max_end_ns = self.max_end_ns.max(timestamp);
        Ok(())
    }

    /// Add a cue point for `track` at `timestamp` (ns).
    ///
    /// The cue points at the last cluster opened at or before the timestamp.
    /// Its time may not precede the last cue point in the table.
    pub fn add_cue_point(&mut self, timestamp: u64, track: u64) -> Result<()> {
        if self.tracks.get(track).is_none() {
            return Err(Error::UnknownTrack(track));
        }
        if self.state == SegmentState::Finalized {
            return Err(Error::InvalidState("segment is finalized"));
        }
        let ticks = timestamp / self.timecode_scale()?;
        if let Some(last) = self.cues.points().last() {
            if ticks < last.time {
                return Err(Error::validation(format!(
                    "cue point at {ticks} precedes the last cue point at {}",
                    last.time
                )));
            }
        }
        let (_, cluster_position) = self
            .cluster_starts
            .iter()
            .rev()
            .find(|(base, _)| *base <= ticks)
            .copied()
            .ok_or_else(|| Error::validation(format!("no cluster written at or before {timestamp} ns")))?;
        self.cues.add(
            ticks,
            CueTrackPosition {
                track,
                cluster_position,
                block_number: None,
            },
        )
    }

    /// Close the open cluster and write Cues, Tags, duration and sizes.
    pub fn finalize(&mut self) -> Result<()> {
        match self.state {
            SegmentState::Unopened => return Err(Error::InvalidState("segment not initialized")),
            SegmentState::Finalized => return Err(Error::InvalidState("segment already finalized")),
            _ => {}
        }
        self.ensure_header()?;
        self.close_cluster()?;

        let needs_v4 = self.uses_discard_padding || self.tracks.uses_v4_elements();
        let duration = self.info.duration.unwrap_or_else(|| {
            self.max_end_ns as f64 / self.info.timecode_scale as f64
        });
        let Some(header) = self.header else {
            return Err(Error::InvalidState("segment header missing"));
        };
        let writer = self.writer.as_mut().ok_or(Error::InvalidState("no writer attached"))?;
        let payload_pos = header.segment.payload_pos;

        if self.config.output_cues && !self.cues.is_empty() {
            let position = writer.position() - payload_pos;
            let mut buf = BytesMut::with_capacity(self.cues.encoded_size() as usize);
            self.cues.put(&mut buf);
            writer.write(&buf)?;
            if let Some(seek_head) = self.seek_head.as_mut() {
                seek_head.set(ElementId::CUES, position)?;
            }
            self.cues_pos = Some(position);
            debug!("Wrote {} cue points at {}", self.cues.len(), position);
        }

        if !self.tags.is_empty() {
            let position = writer.position() - payload_pos;
            let mut buf = BytesMut::new();
            put_tags(&mut buf, &self.tags);
            writer.write(&buf)?;
            if let Some(seek_head) = self.seek_head.as_mut() {
                seek_head.set(ElementId::TAGS, position)?;
            }
        }

        if writer.seekable() {
            let end = writer.position();
            if let Some(pos) = header.duration_pos {
                writer.seek(pos)?;
                writer.write(&(duration as f32).to_be_bytes())?;
            }
            if needs_v4 {
                writer.seek(self.doc_type_version_pos)?;
                writer.write(&[DOC_TYPE_VERSION_V4])?;
            }
            writer.seek(end)?;
        } else if needs_v4 {
            warn!("DocTypeVersion 4 elements used but header cannot be rewritten on append-only writer");
        }

        if let Some(seek_head) = &self.seek_head {
            seek_head.finalize(writer)?;
        }
        let size = close_unknown_size_element(writer, header.segment)?;
        self.segment_end = payload_pos + size;
        self.info.duration = Some(duration);
        self.state = SegmentState::Finalized;
        debug!(
            "Finalized segment: {} clusters, {} cue points, duration {duration} ticks",
            self.cluster_starts.len(),
            self.cues.len()
        );
        Ok(())
    }

    /// Rewrite a finalized file into `out` with the Cues placed before the
    /// first cluster.
    ///
    /// `reader` must read back the bytes this segment wrote. Every cluster
    /// position in the cues moves by the encoded size of the Cues element.
    pub fn copy_and_move_cues_before_clusters<R, O>(&mut self, reader: &mut R, out: &mut O) -> Result<()>
    where
        R: MkvReader + ?Sized,
        O: MkvWriter + ?Sized,
    {
        if self.state != SegmentState::Finalized {
            return Err(Error::InvalidState("segment is not finalized"));
        }
        let Some(header) = self.header else {
            return Err(Error::InvalidState("segment header missing"));
        };
        let Some(mut seek_head) = self.seek_head.clone() else {
            return Err(Error::InvalidState("segment has no SeekHead"));
        };
        let Some(cues_pos) = self.cues_pos else {
            return Err(Error::InvalidState("segment has no Cues"));
        };
        let Some(&(_, first_cluster)) = self.cluster_starts.first() else {
            return Err(Error::InvalidState("segment has no clusters"));
        };
        if !out.seekable() {
            return Err(Error::SeekUnsupported);
        }

        let payload_pos = header.segment.payload_pos;
        let old_size = self.cues.encoded_size();
        let mut shift = old_size;
        let cues = loop {
            let mut shifted = self.cues.clone();
            shifted.shift_positions(shift as i64);
            let size = shifted.encoded_size();
            if size == shift {
                break shifted;
            }
            shift = size;
        };

        let start = out.position();
        copy_range(reader, out, 0, payload_pos + first_cluster)?;
        let mut buf = BytesMut::with_capacity(shift as usize);
        cues.put(&mut buf);
        out.write(&buf)?;
        copy_range(reader, out, payload_pos + first_cluster, payload_pos + cues_pos)?;
        copy_range(reader, out, payload_pos + cues_pos + old_size, self.segment_end)?;

        let delta = shift as i64 - old_size as i64;
        seek_head.set(ElementId::CUES, first_cluster)?;
        if let Some(tags) = seek_head.get(ElementId::TAGS) {
            seek_head.set(ElementId::TAGS, tags.saturating_add_signed(delta))?;
        }
        // The header region was copied verbatim, so reserved offsets match.
        let end = out.position();
        out.seek(start + seek_head.position())?;
        out.write(&seek_head.encode())?;
        out.seek(start + header.segment.size_pos)?;
        let new_size = end - (start + payload_pos);
        out.write(&vint::encode_size(new_size, PATCHABLE_SIZE_WIDTH)?)?;
        out.seek(end)?;

        for entry in &mut self.cluster_starts {
            entry.1 += shift;
        }
        self.cues = cues;
        self.cues_pos = Some(first_cluster);
        self.seek_head = Some(seek_head);
        self.segment_end = payload_pos + new_size;
        debug!("Moved {} cue points before clusters, shifting by {shift} bytes", self.cues.len());
        Ok(())
    }

    /// The attached writer.
    pub fn writer(&self) -> Option<&W> {
        self.writer.as_ref()
    }

    /// Detach the writer.
    pub fn into_writer(self) -> Option<W> {
        self.writer
    }

    fn check_header_open(&self) -> Result<()> {
        match self.state {
            SegmentState::Unopened => Err(Error::InvalidState("segment not initialized")),
            SegmentState::Finalized => Err(Error::InvalidState("segment is finalized")),
            _ if self.header.is_some() => Err(Error::InvalidState("segment header already written")),
            _ => Ok(()),
        }
    }

    fn check_accepting(&self) -> Result<()> {
        match self.state {
            SegmentState::Unopened => Err(Error::InvalidState("segment not initialized")),
            SegmentState::Finalized => Err(Error::InvalidState("segment is finalized")),
            _ => Ok(()),
        }
    }

    /// Returns the previous timestamp on the track.
    fn check_timestamp(&self, track: u64, timestamp: u64) -> Result<Option<u64>> {
        match self.last_timestamps.get(&track) {
            Some(&last) if timestamp <= last => Err(Error::NonMonotonicTimestamp { track, timestamp, last }),
            last => Ok(last.copied()),
        }
    }

    fn timecode_scale(&self) -> Result<u64> {
        match self.info.timecode_scale {
            0 => Err(Error::validation("timecode scale cannot be 0")),
            scale => Ok(scale),
        }
    }

    /// Write Segment start, SeekHead reservation, Info, Tracks and Chapters.
    fn ensure_header(&mut self) -> Result<()> {
        if self.header.is_some() {
            return Ok(());
        }
        self.timecode_scale()?;
        self.tracks.validate()?;
        for chapter in &self.chapters {
            validate_chapter(chapter)?;
        }
        let writer = self.writer.as_mut().ok_or(Error::InvalidState("no writer attached"))?;

        let segment = start_unknown_size_element(writer, ElementId::SEGMENT)?;
        let mut seek_head = if writer.seekable() {
            Some(SeekHead::reserve(writer)?)
        } else {
            None
        };

        let info_pos = writer.position();
        let (info, duration_offset) = encode_info(&self.info, writer.seekable());
        writer.write(&info)?;
        let duration_pos = duration_offset.map(|offset| info_pos + offset);

        let tracks_pos = writer.position() - segment.payload_pos;
        let mut buf = BytesMut::new();
        self.tracks.put(&mut buf);
        writer.write(&buf)?;

        let chapters_pos = writer.position() - segment.payload_pos;
        if !self.chapters.is_empty() {
            buf.clear();
            put_chapters(&mut buf, &self.chapters);
            writer.write(&buf)?;
        }

        if let Some(seek_head) = seek_head.as_mut() {
            seek_head.set(ElementId::INFO, info_pos - segment.payload_pos)?;
            seek_head.set(ElementId::TRACKS, tracks_pos)?;
            if !self.chapters.is_empty() {
                seek_head.set(ElementId::CHAPTERS, chapters_pos)?;
            }
        }

        debug!(
            "Wrote segment header: {} tracks, {} chapters",
            self.tracks.len(),
            self.chapters.len()
        );
        self.seek_head = seek_head;
        self.header = Some(HeaderLayout { segment, duration_pos });
        self.state = SegmentState::Accepting;
        Ok(())
    }

    /// Place an encoded block, opening a new cluster when the policy says so.
    /// Returns the cue position of the block.
    fn place_block(&mut self, block: EncodedBlock, timestamp: u64, ticks: u64, video_key: bool) -> Result<CueTrackPosition> {
        let new_cluster = match &self.cluster {
            None => true,
            Some(cluster) => self.should_close(cluster, &block, timestamp, ticks, video_key),
        };
        self.force_new_cluster = false;
        if new_cluster {
            self.close_cluster()?;
            self.open_cluster(ticks)?;
        }

        let Some(cluster) = self.cluster.as_mut() else {
            return Err(Error::InvalidState("no open cluster"));
        };
        let relative = cluster
            .relative_timecode(ticks)
            .ok_or_else(|| Error::validation(format!("timestamp {timestamp} out of cluster range")))?;
        let block_number = cluster.add_block(block, relative);
        Ok(CueTrackPosition {
            track: 0,
            cluster_position: cluster.position(),
            block_number: Some(block_number),
        })
    }

    fn should_close(&self, cluster: &ActiveCluster, block: &EncodedBlock, timestamp: u64, ticks: u64, video_key: bool) -> bool {
        if self.force_new_cluster {
            return true;
        }
        let max_size = self.config.max_cluster_size;
        if max_size > 0 && cluster.block_count() > 0 && cluster.encoded_size() + block.len() > max_size {
            return true;
        }
        let max_duration = self.config.max_cluster_duration;
        let base_ns = cluster.timecode().saturating_mul(self.info.timecode_scale);
        if max_duration > 0 && timestamp.saturating_sub(base_ns) > max_duration {
            return true;
        }
        if cluster.relative_timecode(ticks).is_none() {
            return true;
        }
        self.config.new_cluster_on_video_key && video_key && cluster.block_count() > 0
    }

    fn open_cluster(&mut self, ticks: u64) -> Result<()> {
        let (writer, header) = match (self.writer.as_ref(), self.header.as_ref()) {
            (Some(writer), Some(header)) => (writer, header),
            _ => return Err(Error::InvalidState("segment header missing")),
        };
        let position = writer.position() - header.segment.payload_pos;
        self.cluster = Some(ActiveCluster::new(ticks, position));
        self.cluster_starts.push((ticks, position));
        debug!("Opened cluster at {position}, timecode {ticks}");
        Ok(())
    }

    fn close_cluster(&mut self) -> Result<()> {
        let Some(cluster) = self.cluster.take() else {
            return Ok(());
        };
        let writer = self.writer.as_mut().ok_or(Error::InvalidState("no writer attached"))?;
        let blocks = cluster.block_count();
        let bytes = cluster.finish();
        writer.write(&bytes)?;
        debug!("Closed cluster: {blocks} blocks, {} bytes", bytes.len());
        Ok(())
    }

    fn auto_cue(&mut self, ticks: u64, track: u64, position: CueTrackPosition) -> Result<()> {
        if self.cues_track.is_some_and(|cues_track| cues_track != track) || self.cues.contains(ticks, track) {
            return Ok(());
        }
        self.cues.add(ticks, CueTrackPosition { track, ..position })
    }
}

/// Encode the Info element. Returns the bytes and, when a Duration was
/// written, the offset of its float payload.
fn encode_info(info: &SegmentInfo, seekable: bool) -> (BytesMut, Option<u64>) {
    let mut children = BytesMut::with_capacity(96);
    children.put_uint_element(ElementId::TIMECODE_SCALE, info.timecode_scale);
    let mut duration_offset = None;
    if seekable || info.duration.is_some() {
        duration_offset = Some(children.len() + ElementId::DURATION.encoded_len() + 1);
        children.put_float_element(ElementId::DURATION, info.duration.unwrap_or(0.0) as f32);
    }
    if let Some(date) = info.date_utc {
        children.put_element_header(ElementId::DATE_UTC, 8);
        children.put_i64(date);
    }
    if let Some(title) = &info.title {
        children.put_string_element(ElementId::TITLE, title);
    }
    if let Some(app) = &info.muxing_app {
        children.put_string_element(ElementId::MUXING_APP, app);
    }
    if let Some(app) = &info.writing_app {
        children.put_string_element(ElementId::WRITING_APP, app);
    }

    let header_len = header_size(ElementId::INFO, children.len() as u64);
    let mut buf = BytesMut::new();
    put_master(&mut buf, ElementId::INFO, |buf| buf.put_slice(&children));
    (buf, duration_offset.map(|offset| header_len + offset as u64))
}

fn copy_range<R, O>(reader: &mut R, out: &mut O, start: u64, end: u64) -> Result<()>
where
    R: MkvReader + ?Sized,
    O: MkvWriter + ?Sized,
{
    let mut chunk = vec![0u8; COPY_CHUNK.min(end.saturating_sub(start)) as usize];
    let mut pos = start;
    while pos < end {
        let len = (end - pos).min(COPY_CHUNK) as usize;
        reader.read_at(pos, &mut chunk[..len])?;
        out.write(&chunk[..len])?;
        pos += len as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Cursor;
    use webmforge_ebml::{IoWriter, StreamWriter};

    type MemSegment = Segment<IoWriter<Cursor<Vec<u8>>>>;

    fn open(config: MuxerConfig) -> MemSegment {
        let mut segment = Segment::new(config);
        segment.init(IoWriter::new(Cursor::new(Vec::new())).unwrap()).unwrap();
        segment
    }

    fn bytes(segment: MemSegment) -> Vec<u8> {
        segment.into_writer().unwrap().into_inner().unwrap().into_inner()
    }

    #[test]
    fn test_state_transitions() {
        let mut segment: MemSegment = Segment::new(MuxerConfig::default());
        assert_eq!(segment.state(), SegmentState::Unopened);
        assert_matches!(segment.add_track(0), Err(Error::InvalidState(_)));
        assert_matches!(segment.finalize(), Err(Error::InvalidState(_)));

        segment.init(IoWriter::new(Cursor::new(Vec::new())).unwrap()).unwrap();
        assert_eq!(segment.state(), SegmentState::Initialized);
        segment.add_video_track(320, 240, 1).unwrap();
        assert_eq!(segment.state(), SegmentState::Accepting);
        segment.finalize().unwrap();
        assert_eq!(segment.state(), SegmentState::Finalized);
        assert_matches!(segment.finalize(), Err(Error::InvalidState(_)));
    }

    #[test]
    fn test_validation_order() {
        let mut segment = open(MuxerConfig::default());
        segment.add_track(2).unwrap();
        let track = segment.add_video_track(320, 240, 1).unwrap().number;
        let data = [1u8];

        assert_matches!(segment.add_frame(&Frame::new(9, 0, &data)), Err(Error::UnknownTrack(9)));
        assert_matches!(segment.add_frame(&Frame::new(2, 0, &data)), Err(Error::IncompleteTrack(2)));
        assert_matches!(segment.add_frame(&Frame::new(track, 0, &[])), Err(Error::EmptyPayload));

        segment.add_frame(&Frame::new(track, 1_000_000, &data).key(true)).unwrap();
        assert_matches!(
            segment.add_frame(&Frame::new(track, 1_000_000, &data)),
            Err(Error::NonMonotonicTimestamp { last: 1_000_000, .. })
        );
    }

    #[test]
    fn test_rejected_frame_writes_nothing() {
        let mut segment = open(MuxerConfig::default());
        let track = segment.add_video_track(320, 240, 0).unwrap().number;
        let data = [1u8; 8];
        segment.add_frame(&Frame::new(track, 5_000_000, &data).key(true)).unwrap();
        let before = segment.writer.as_ref().unwrap().position();
        assert!(segment.add_frame(&Frame::new(track, 4_000_000, &data)).is_err());
        assert_eq!(segment.writer.as_ref().unwrap().position(), before);
        assert_eq!(segment.cluster.as_ref().unwrap().block_count(), 1);
    }

    #[test]
    fn test_tracks_frozen_after_header() {
        let mut segment = open(MuxerConfig::default());
        let track = segment.add_video_track(320, 240, 0).unwrap().number;
        segment.track_mut(track).unwrap().name = Some("main".into());
        segment.add_frame(&Frame::new(track, 0, &[1]).key(true)).unwrap();
        assert_matches!(segment.track_mut(track), Err(Error::Validation(_)));
        assert_matches!(segment.add_track(0), Err(Error::InvalidState(_)));
        assert_matches!(segment.add_chapter(), Err(Error::InvalidState(_)));
        assert!(segment.add_tag().is_ok());
    }

    #[test]
    fn test_duration_from_last_frame_end() {
        let mut segment = open(MuxerConfig::default());
        let track = segment.add_video_track(320, 240, 1).unwrap().number;
        let data = [0u8; 16];
        for ts in [0, 2_000_000, 4_000_000] {
            segment.add_frame(&Frame::new(track, ts, &data).key(true)).unwrap();
        }
        segment
            .add_frame(&Frame::new(track, 6_000_000, &data).key(true).with_duration(2_000_000))
            .unwrap();
        segment.finalize().unwrap();
        assert_eq!(segment.segment_info().duration, Some(8.0));
    }

    #[test]
    fn test_cluster_size_limit() {
        let config = MuxerConfig {
            max_cluster_size: 100,
            ..MuxerConfig::default()
        };
        let mut segment = open(config);
        let track = segment.add_video_track(64, 64, 0).unwrap().number;
        let data = [0u8; 40];
        for i in 0..4 {
            segment.add_frame(&Frame::new(track, i * 1_000_000, &data).key(true)).unwrap();
        }
        // 12 + 3 + 2 * 46 = 107 > 100, so each cluster holds one frame
        assert_eq!(segment.cluster_count(), 4);

        let big = [0u8; 500];
        segment.add_frame(&Frame::new(track, 10_000_000, &big).key(true)).unwrap();
        assert_eq!(segment.cluster_count(), 5);
        assert_eq!(segment.cluster.as_ref().unwrap().block_count(), 1);
    }

    #[test]
    fn test_cluster_duration_limit() {
        let config = MuxerConfig {
            max_cluster_duration: 5_000_000,
            ..MuxerConfig::default()
        };
        let mut segment = open(config);
        let track = segment.add_video_track(64, 64, 0).unwrap().number;
        for ts in [0, 5_000_000, 6_000_000, 11_000_000, 12_000_000] {
            segment.add_frame(&Frame::new(track, ts, &[1]).key(true)).unwrap();
        }
        let bases: Vec<u64> = segment.cluster_starts.iter().map(|(base, _)| *base).collect();
        assert_eq!(bases, vec![0, 6, 12]);
    }

    #[test]
    fn test_timecode_overflow_opens_cluster() {
        let mut segment = open(MuxerConfig::default());
        let track = segment.add_audio_track(48_000.0, 2, 0).unwrap().number;
        segment.add_frame(&Frame::new(track, 0, &[1]).key(true)).unwrap();
        segment.add_frame(&Frame::new(track, 32_767_000_000, &[1])).unwrap();
        assert_eq!(segment.cluster_count(), 1);
        segment.add_frame(&Frame::new(track, 32_768_000_000, &[1])).unwrap();
        assert_eq!(segment.cluster_count(), 2);
    }

    #[test]
    fn test_force_and_video_key_clusters() {
        let config = MuxerConfig {
            new_cluster_on_video_key: true,
            ..MuxerConfig::default()
        };
        let mut segment = open(config);
        let video = segment.add_video_track(64, 64, 1).unwrap().number;
        let audio = segment.add_audio_track(48_000.0, 2, 2).unwrap().number;
        segment.add_frame(&Frame::new(video, 0, &[1]).key(true)).unwrap();
        segment.add_frame(&Frame::new(audio, 0, &[1]).key(true)).unwrap();
        segment.add_frame(&Frame::new(audio, 10_000_000, &[1]).key(true)).unwrap();
        assert_eq!(segment.cluster_count(), 1);
        segment.add_frame(&Frame::new(video, 20_000_000, &[1]).key(true)).unwrap();
        assert_eq!(segment.cluster_count(), 2);

        segment.force_new_cluster();
        segment.add_frame(&Frame::new(audio, 30_000_000, &[1])).unwrap();
        segment.add_frame(&Frame::new(audio, 40_000_000, &[1])).unwrap();
        assert_eq!(segment.cluster_count(), 3);
    }

    #[test]
    fn test_auto_cues() {
        let mut segment = open(MuxerConfig::default());
        let video = segment.add_video_track(64, 64, 1).unwrap().number;
        let audio = segment.add_audio_track(48_000.0, 2, 2).unwrap().number;
        segment.add_frame(&Frame::new(video, 0, &[1]).key(true)).unwrap();
        segment.add_frame(&Frame::new(audio, 0, &[1]).key(true)).unwrap();
        segment.add_frame(&Frame::new(video, 1_000_000, &[1])).unwrap();

        let points = segment.cues().points();
        assert_eq!(points.len(), 1);
        let tracks: Vec<u64> = points[0].positions.iter().map(|p| p.track).collect();
        assert_eq!(tracks, vec![video, audio]);
        assert_eq!(points[0].positions[1].block_number, Some(2));
    }

    #[test]
    fn test_cues_track_filters_auto_cues() {
        let mut segment = open(MuxerConfig::default());
        let video = segment.add_video_track(64, 64, 1).unwrap().number;
        let audio = segment.add_audio_track(48_000.0, 2, 2).unwrap().number;
        assert_matches!(segment.set_cues_track(7), Err(Error::UnknownTrack(7)));
        segment.set_cues_track(audio).unwrap();
        segment.add_frame(&Frame::new(video, 0, &[1]).key(true)).unwrap();
        segment.add_frame(&Frame::new(audio, 5_000_000, &[1]).key(true)).unwrap();
        let times: Vec<u64> = segment.cues().points().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![5]);
    }

    #[test]
    fn test_explicit_cue_point() {
        let mut segment = open(MuxerConfig::default());
        let track = segment.add_video_track(64, 64, 1).unwrap().number;
        assert_matches!(segment.add_cue_point(0, track), Err(Error::Validation(_)));
        segment.add_frame(&Frame::new(track, 0, &[1]).key(true)).unwrap();
        segment.add_frame(&Frame::new(track, 6_000_000, &[1])).unwrap();
        segment.add_cue_point(4_000_000, track).unwrap();
        assert_matches!(segment.add_cue_point(4_000_000, track), Err(Error::Validation(_)));
        assert_matches!(segment.add_cue_point(4_000_000, 3), Err(Error::UnknownTrack(3)));
        // Earlier than the last cue point.
        assert_matches!(segment.add_cue_point(2_000_000, track), Err(Error::Validation(_)));
        segment.add_cue_point(6_000_000, track).unwrap();
        let times: Vec<u64> = segment.cues().points().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![0, 4, 6]);
    }

    #[test]
    fn test_doc_type_version_raised_by_discard_padding() {
        let mut segment = open(MuxerConfig::default());
        let track = segment.add_audio_track(48_000.0, 2, 1).unwrap();
        track.codec_id = Some("A_OPUS".into());
        let number = track.number;
        segment
            .add_frame(&Frame::new(number, 0, &[1]).key(true).with_discard_padding(127))
            .unwrap();
        segment.finalize().unwrap();
        let pos = segment.doc_type_version_pos as usize;
        let out = bytes(segment);
        assert_eq!(&out[pos - 3..=pos], &[0x42, 0x87, 0x81, 0x04]);
    }

    #[test]
    fn test_append_only_output() {
        let mut segment = Segment::new(MuxerConfig::default());
        segment.init(StreamWriter::new(Vec::new())).unwrap();
        let track = segment.add_video_track(64, 64, 1).unwrap().number;
        segment.add_frame(&Frame::new(track, 0, &[1]).key(true)).unwrap();
        segment.finalize().unwrap();
        let out = segment.into_writer().unwrap().into_inner().unwrap();
        let segment_start = out.windows(4).position(|w| w == [0x18, 0x53, 0x80, 0x67]).unwrap();
        assert_eq!(out[segment_start + 4], 0x01);
        assert_eq!(&out[segment_start + 5..segment_start + 12], &[0xFF; 7]);
        assert!(!out.windows(4).any(|w| w == [0x11, 0x4D, 0x9B, 0x74]));
    }

    #[test]
    fn test_relocation_requires_finalized_seekable() {
        let mut segment = open(MuxerConfig::default());
        let track = segment.add_video_track(64, 64, 1).unwrap().number;
        segment.add_frame(&Frame::new(track, 0, &[1]).key(true)).unwrap();
        let mut out = IoWriter::new(Cursor::new(Vec::new())).unwrap();
        let mut empty: &[u8] = &[];
        assert_matches!(
            segment.copy_and_move_cues_before_clusters(&mut empty, &mut out),
            Err(Error::InvalidState(_))
        );
    }
}
