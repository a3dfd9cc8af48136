//! Segment loading and navigation.
//!
//! [`Segment::load`] scans the top-level elements once. Metadata is parsed
//! eagerly; clusters are only opened (up to their Timecode) and their
//! entries are decoded on demand through [`ClusterHandle`] and
//! [`EntryHandle`] cursors. An unknown-size cluster stops the scan, and later
//! clusters are discovered when navigation reaches them.

use crate::block::{BlockEntry, BlockFrame};
use crate::cluster::Cluster;
use crate::cues::Cues;
use crate::header::EbmlHeader;
use crate::info::parse_info;
use crate::metadata::{parse_chapters, parse_tags};
use crate::skip_unknown;
use crate::tracks::Tracks;
use tracing::{debug, warn};
use webmforge_ebml::reader::{children, read_bytes, read_uint};
use webmforge_ebml::vint::MAX_ID_LENGTH;
use webmforge_ebml::{
    peek_element, Chapter, ElementHeader, ElementId, Error, MkvReader, Result, SegmentInfo, Tag,
};

/// Cursor over the clusters of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterHandle {
    Cluster(usize),
    /// Past the last cluster.
    Eos,
}

/// Cursor over the entries of one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryHandle {
    Entry { cluster: usize, index: usize },
    /// Past the last entry of the cluster.
    Eos,
}

#[derive(Debug, Default, Clone, Copy)]
struct Found {
    info: bool,
    tracks: bool,
    chapters: bool,
    tags: bool,
}

/// A parsed Segment over a random-access reader.
///
/// ```no_run
/// use webmforge_parse::{ClusterHandle, EntryHandle, Segment};
///
/// # fn main() -> webmforge_ebml::Result<()> {
/// let data = std::fs::read("input.webm")?;
/// let mut segment = Segment::open(data)?;
/// segment.load()?;
///
/// let mut cluster = segment.first_cluster()?;
/// while cluster != ClusterHandle::Eos {
///     let mut entry = segment.first_entry(cluster)?;
///     while let Some(block) = segment.entry(entry).map(|e| e.block().clone()) {
///         for frame in block.frames() {
///             let _payload = segment.read_frame(frame)?;
///         }
///         entry = segment.next_entry(entry)?;
///     }
///     cluster = segment.next_cluster(cluster)?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Segment<R> {
    reader: R,
    ebml_header: Option<EbmlHeader>,
    pos: u64,
    payload_pos: u64,
    size: Option<u64>,
    loaded: bool,
    found: Found,
    info: SegmentInfo,
    tracks: Tracks,
    chapters: Vec<Chapter>,
    tags: Vec<Tag>,
    cues_header: Option<ElementHeader>,
    cues: Option<Cues>,
    seek_entries: Vec<(ElementId, u64)>,
    clusters: Vec<Cluster>,
    scan_pending: bool,
}

impl<R: MkvReader> Segment<R> {
    /// Parse the EBML header at the start of `reader` and locate the Segment
    /// that follows it.
    pub fn open(mut reader: R) -> Result<Self> {
        let mut pos = 0;
        let header = EbmlHeader::parse(&mut reader, &mut pos)?;
        let mut segment = Self::create_instance(reader, pos)?;
        segment.ebml_header = Some(header);
        Ok(segment)
    }

    /// Locate the Segment element at or after `pos`, skipping other
    /// top-level elements.
    pub fn create_instance(mut reader: R, mut pos: u64) -> Result<Self> {
        let header = loop {
            if reader.length().is_some_and(|len| pos >= len) {
                return Err(Error::format("no Segment element found"));
            }
            let header = peek_element(&mut reader, pos)?;
            if header.id == ElementId::SEGMENT {
                break header;
            }
            skip_unknown(&header, "stream");
            pos = header.end().ok_or_else(|| {
                Error::format(format!("{} at {} has unknown size", header.id, header.pos))
            })?;
        };

        Ok(Self {
            reader,
            ebml_header: None,
            pos: header.pos,
            payload_pos: header.payload_pos(),
            size: header.size,
            loaded: false,
            found: Found::default(),
            info: SegmentInfo::default(),
            tracks: Tracks::default(),
            chapters: Vec::new(),
            tags: Vec::new(),
            cues_header: None,
            cues: None,
            seek_entries: Vec::new(),
            clusters: Vec::new(),
            scan_pending: false,
        })
    }

    /// Scan the top-level elements. Calling it again after success is a
    /// no-op and keeps every cluster and entry already loaded.
    pub fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        self.found = Found::default();
        self.clusters.clear();
        self.seek_entries.clear();
        self.cues_header = None;
        self.cues = None;
        self.scan_pending = false;

        self.scan(self.payload_pos)?;
        self.resolve_seek_entries()?;
        if !self.found.info {
            return Err(Error::format("Segment has no Info element"));
        }
        if !self.found.tracks {
            return Err(Error::format("Segment has no Tracks element"));
        }
        self.attach_cues()?;
        self.loaded = true;

        debug!(
            tracks = self.tracks.len(),
            clusters = self.clusters.len(),
            cues = self.cues.is_some(),
            complete = !self.scan_pending,
            "loaded segment"
        );
        Ok(())
    }

    fn end(&self) -> Option<u64> {
        self.size
            .map(|size| self.payload_pos + size)
            .or_else(|| self.reader.length())
    }

    fn scan(&mut self, mut pos: u64) -> Result<()> {
        let end = self.end();
        loop {
            if end.is_some_and(|end| pos >= end) {
                break;
            }
            let header = match peek_element(&mut self.reader, pos) {
                Ok(header) => header,
                Err(Error::EndOfStream { .. }) if end.is_none() => break,
                Err(e) => return Err(e),
            };
            header.check_within(end)?;

            match header.id {
                ElementId::CLUSTER => {
                    let cluster = Cluster::open(&mut self.reader, &header, end)?;
                    self.clusters.push(cluster);
                    if header.is_unknown_size() {
                        debug!(pos = header.pos, "unknown-size cluster, deferring scan");
                        self.scan_pending = true;
                        break;
                    }
                }
                ElementId::EBML | ElementId::SEGMENT if self.size.is_none() => break,
                _ => self.parse_top_level(&header)?,
            }
            pos = header.end().ok_or_else(|| {
                Error::format(format!("{} at {} has unknown size", header.id, header.pos))
            })?;
        }
        Ok(())
    }

    fn parse_top_level(&mut self, header: &ElementHeader) -> Result<()> {
        let reader = &mut self.reader;
        match header.id {
            ElementId::SEEK_HEAD => {
                let entries = parse_seek_head(reader, header)?;
                self.seek_entries.extend(entries);
            }
            ElementId::INFO => {
                self.info = parse_info(reader, header)?;
                self.found.info = true;
            }
            ElementId::TRACKS => {
                self.tracks = Tracks::parse(reader, header)?;
                self.found.tracks = true;
            }
            ElementId::CHAPTERS => {
                self.chapters = parse_chapters(reader, header)?;
                self.found.chapters = true;
            }
            ElementId::TAGS => {
                self.tags = parse_tags(reader, header)?;
                self.found.tags = true;
            }
            ElementId::CUES => self.cues_header = Some(*header),
            _ => skip_unknown(header, "Segment"),
        }
        Ok(())
    }

    /// Follow SeekHead entries to elements the scan did not reach.
    fn resolve_seek_entries(&mut self) -> Result<()> {
        for (id, relative) in self.seek_entries.clone() {
            let wanted = match id {
                ElementId::INFO => !self.found.info,
                ElementId::TRACKS => !self.found.tracks,
                ElementId::CHAPTERS => !self.found.chapters,
                ElementId::TAGS => !self.found.tags,
                ElementId::CUES => self.cues_header.is_none(),
                _ => false,
            };
            if !wanted {
                continue;
            }
            let pos = self.payload_pos + relative;
            let header = peek_element(&mut self.reader, pos)?;
            if header.id != id {
                warn!(expected = %id, found = %header.id, pos, "SeekHead entry points at wrong element");
                continue;
            }
            self.parse_top_level(&header)?;
        }
        Ok(())
    }

    fn attach_cues(&mut self) -> Result<()> {
        if self.cues.is_none() {
            if let Some(header) = self.cues_header {
                self.cues = Some(Cues::new(&header, self.info.timecode_scale)?);
            }
        }
        Ok(())
    }

    fn check_loaded(&self) -> Result<()> {
        if self.loaded {
            Ok(())
        } else {
            Err(Error::InvalidState("segment is not loaded"))
        }
    }

    /// Resume the scan after the last (unknown-size) cluster.
    fn discover(&mut self) -> Result<()> {
        self.scan_pending = false;
        let resume = {
            let Self { reader, clusters, .. } = self;
            match clusters.last_mut() {
                Some(last) => {
                    last.load_all(reader)?;
                    last.end()
                }
                None => None,
            }
        };
        if let Some(pos) = resume {
            self.scan(pos)?;
            self.attach_cues()?;
        }
        Ok(())
    }

    fn discover_all(&mut self) -> Result<()> {
        while self.scan_pending {
            self.discover()?;
        }
        Ok(())
    }

    fn cluster_at(&mut self, index: usize) -> Result<ClusterHandle> {
        while index >= self.clusters.len() && self.scan_pending {
            self.discover()?;
        }
        Ok(if index < self.clusters.len() {
            ClusterHandle::Cluster(index)
        } else {
            ClusterHandle::Eos
        })
    }

    pub fn first_cluster(&mut self) -> Result<ClusterHandle> {
        self.check_loaded()?;
        self.cluster_at(0)
    }

    /// The cluster after `handle`; `Eos` stays `Eos`.
    pub fn next_cluster(&mut self, handle: ClusterHandle) -> Result<ClusterHandle> {
        match handle {
            ClusterHandle::Cluster(index) => self.cluster_at(index + 1),
            ClusterHandle::Eos => Ok(ClusterHandle::Eos),
        }
    }

    pub fn cluster(&self, handle: ClusterHandle) -> Option<&Cluster> {
        match handle {
            ClusterHandle::Cluster(index) => self.clusters.get(index),
            ClusterHandle::Eos => None,
        }
    }

    fn entry_at(&mut self, cluster: usize, index: usize) -> Result<EntryHandle> {
        let Self { reader, clusters, .. } = self;
        let Some(owner) = clusters.get_mut(cluster) else {
            return Ok(EntryHandle::Eos);
        };
        while owner.entry_count() <= index && owner.load_next_entry(reader)? {}
        Ok(if index < owner.entry_count() {
            EntryHandle::Entry { cluster, index }
        } else {
            EntryHandle::Eos
        })
    }

    /// First entry of `cluster`, decoding it if needed.
    pub fn first_entry(&mut self, cluster: ClusterHandle) -> Result<EntryHandle> {
        match cluster {
            ClusterHandle::Cluster(index) => self.entry_at(index, 0),
            ClusterHandle::Eos => Ok(EntryHandle::Eos),
        }
    }

    /// Entry after `entry` in the same cluster; `Eos` stays `Eos`.
    pub fn next_entry(&mut self, entry: EntryHandle) -> Result<EntryHandle> {
        match entry {
            EntryHandle::Entry { cluster, index } => self.entry_at(cluster, index + 1),
            EntryHandle::Eos => Ok(EntryHandle::Eos),
        }
    }

    pub fn entry(&self, handle: EntryHandle) -> Option<&BlockEntry> {
        match handle {
            EntryHandle::Entry { cluster, index } => self.clusters.get(cluster)?.entry(index),
            EntryHandle::Eos => None,
        }
    }

    /// Read a frame payload from the reader.
    pub fn read_frame(&mut self, frame: &BlockFrame) -> Result<Vec<u8>> {
        frame.read(&mut self.reader)
    }

    /// Last cluster starting at or before `time_ns`, or the first cluster
    /// when all start later.
    pub fn find_cluster(&mut self, time_ns: u64) -> Result<ClusterHandle> {
        self.check_loaded()?;
        self.discover_all()?;
        let scale = self.info.timecode_scale;
        let after = self.clusters.partition_point(|c| c.time_ns(scale) <= time_ns);
        Ok(match (self.clusters.is_empty(), after) {
            (true, _) => ClusterHandle::Eos,
            (false, 0) => ClusterHandle::Cluster(0),
            (false, after) => ClusterHandle::Cluster(after - 1),
        })
    }

    /// Cluster at `relative_pos` bytes into the segment payload, as recorded
    /// in cue points.
    pub fn find_cluster_by_position(&mut self, relative_pos: u64) -> Result<ClusterHandle> {
        self.check_loaded()?;
        let pos = self.payload_pos + relative_pos;
        loop {
            if let Some(index) = self.clusters.iter().position(|c| c.position() == pos) {
                return Ok(ClusterHandle::Cluster(index));
            }
            if !self.scan_pending {
                return Ok(ClusterHandle::Eos);
            }
            self.discover()?;
        }
    }

    /// Decode the next cue point. Returns `false` when there are no more.
    pub fn load_cue_point(&mut self) -> Result<bool> {
        let Self { reader, cues, .. } = self;
        match cues {
            Some(cues) => cues.load_cue_point(reader),
            None => Ok(false),
        }
    }

    /// Decode every remaining cue point.
    pub fn load_all_cues(&mut self) -> Result<()> {
        while self.load_cue_point()? {}
        Ok(())
    }

    pub fn ebml_header(&self) -> Option<&EbmlHeader> {
        self.ebml_header.as_ref()
    }

    /// Absolute position of the Segment element.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn payload_position(&self) -> u64 {
        self.payload_pos
    }

    /// Declared payload size, `None` when unknown.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn info(&self) -> &SegmentInfo {
        &self.info
    }

    pub fn timecode_scale(&self) -> u64 {
        self.info.timecode_scale
    }

    pub fn tracks(&self) -> &Tracks {
        &self.tracks
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn cues(&self) -> Option<&Cues> {
        self.cues.as_ref()
    }

    /// Clusters discovered so far.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Whether every cluster has been discovered.
    pub fn is_scan_complete(&self) -> bool {
        !self.scan_pending
    }

    pub fn into_reader(self) -> R {
        self.reader
    }
}

fn parse_seek_head<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<Vec<(ElementId, u64)>> {
    let mut entries = Vec::new();
    let mut seeks = children(reader, header)?;
    while let Some(seek) = seeks.next_header()? {
        if seek.id != ElementId::SEEK {
            skip_unknown(&seek, "SeekHead");
            continue;
        }
        let mut id = None;
        let mut position = None;
        let mut fields = children(seeks.reader(), &seek)?;
        while let Some(field) = fields.next_header()? {
            match field.id {
                ElementId::SEEK_ID => {
                    let bytes = read_bytes(fields.reader(), &field)?;
                    if (1..=MAX_ID_LENGTH).contains(&bytes.len()) {
                        id = Some(ElementId(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)));
                    }
                }
                ElementId::SEEK_POSITION => position = Some(read_uint(fields.reader(), &field)?),
                _ => skip_unknown(&field, "Seek"),
            }
        }
        match (id, position) {
            (Some(id), Some(position)) => entries.push((id, position)),
            _ => warn!(pos = seek.pos, "ignoring incomplete Seek entry"),
        }
    }
    Ok(entries)
}
