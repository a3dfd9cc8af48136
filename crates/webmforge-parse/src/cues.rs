//! Lazily loaded cue index.
//!
//! The Cues element is recorded during the segment scan; its cue points are
//! decoded one per [`Cues::load_cue_point`] call.

use crate::skip_unknown;
use tracing::{debug, warn};
use webmforge_ebml::reader::{children, read_uint};
use webmforge_ebml::{peek_element, ElementHeader, ElementId, Error, MkvReader, Result};

/// One track's entry in a cue point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueTrackPosition {
    pub track: u64,
    /// Cluster position relative to the segment payload.
    pub cluster_position: u64,
    /// Position of the block relative to the cluster payload, if recorded.
    pub relative_position: Option<u64>,
    /// 1-based block number within the cluster.
    pub block_number: u64,
}

/// A decoded CuePoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuePoint {
    pos: u64,
    time: u64,
    positions: Vec<CueTrackPosition>,
}

impl CuePoint {
    /// Absolute position of the CuePoint element.
    pub fn element_position(&self) -> u64 {
        self.pos
    }

    /// Cue time in ticks.
    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn time_ns(&self, timecode_scale: u64) -> u64 {
        self.time.saturating_mul(timecode_scale)
    }

    pub fn positions(&self) -> &[CueTrackPosition] {
        &self.positions
    }

    /// Position recorded for `track`.
    pub fn find(&self, track: u64) -> Option<&CueTrackPosition> {
        self.positions.iter().find(|p| p.track == track)
    }

    fn parse<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<Self> {
        let mut time = None;
        let mut positions = Vec::new();
        let mut it = children(reader, header)?;
        while let Some(child) = it.next_header()? {
            match child.id {
                ElementId::CUE_TIME => time = Some(read_uint(it.reader(), &child)?),
                ElementId::CUE_TRACK_POSITIONS => positions.push(parse_track_position(it.reader(), &child)?),
                _ => skip_unknown(&child, "CuePoint"),
            }
        }
        let time = time.ok_or_else(|| Error::format(format!("CuePoint at {} has no CueTime", header.pos)))?;
        if positions.is_empty() {
            return Err(Error::format(format!("CuePoint at {} has no track positions", header.pos)));
        }
        Ok(Self {
            pos: header.pos,
            time,
            positions,
        })
    }
}

fn parse_track_position<R: MkvReader + ?Sized>(reader: &mut R, header: &ElementHeader) -> Result<CueTrackPosition> {
    let mut track = None;
    let mut cluster_position = None;
    let mut relative_position = None;
    let mut block_number = 1;
    let mut it = children(reader, header)?;
    while let Some(child) = it.next_header()? {
        let r = it.reader();
        match child.id {
            ElementId::CUE_TRACK => track = Some(read_uint(r, &child)?),
            ElementId::CUE_CLUSTER_POSITION => cluster_position = Some(read_uint(r, &child)?),
            ElementId::CUE_RELATIVE_POSITION => relative_position = Some(read_uint(r, &child)?),
            ElementId::CUE_BLOCK_NUMBER => block_number = read_uint(r, &child)?,
            _ => skip_unknown(&child, "CueTrackPositions"),
        }
    }
    match (track, cluster_position) {
        (Some(track), Some(cluster_position)) if track > 0 && block_number > 0 => Ok(CueTrackPosition {
            track,
            cluster_position,
            relative_position,
            block_number,
        }),
        _ => Err(Error::format(format!("incomplete CueTrackPositions at {}", header.pos))),
    }
}

/// The cue index of a segment.
#[derive(Debug, Clone)]
pub struct Cues {
    pos: u64,
    end: u64,
    next_pos: u64,
    timecode_scale: u64,
    points: Vec<CuePoint>,
}

impl Cues {
    pub(crate) fn new(header: &ElementHeader, timecode_scale: u64) -> Result<Self> {
        let end = header
            .end()
            .ok_or_else(|| Error::format(format!("Cues at {} has unknown size", header.pos)))?;
        Ok(Self {
            pos: header.pos,
            end,
            next_pos: header.payload_pos(),
            timecode_scale,
            points: Vec::new(),
        })
    }

    /// Absolute position of the Cues element.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Decode the next cue point. Returns `false` once all are loaded.
    pub fn load_cue_point<R: MkvReader + ?Sized>(&mut self, reader: &mut R) -> Result<bool> {
        while self.next_pos < self.end {
            let header = peek_element(reader, self.next_pos)?;
            header.check_within(Some(self.end))?;
            let next = header
                .end()
                .ok_or_else(|| Error::format(format!("{} at {} has unknown size", header.id, header.pos)))?;
            if header.id != ElementId::CUE_POINT {
                skip_unknown(&header, "Cues");
                self.next_pos = next;
                continue;
            }

            let point = CuePoint::parse(reader, &header)?;
            self.next_pos = next;
            if self.points.last().is_some_and(|last| last.time >= point.time) {
                warn!(pos = header.pos, time = point.time, "cue points out of order");
            }
            self.points.push(point);
            if self.next_pos >= self.end {
                debug!(count = self.points.len(), "loaded all cue points");
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Decode all remaining cue points.
    pub fn load_all<R: MkvReader + ?Sized>(&mut self, reader: &mut R) -> Result<()> {
        while self.load_cue_point(reader)? {}
        Ok(())
    }

    /// Whether every cue point has been decoded.
    pub fn done_parsing(&self) -> bool {
        self.next_pos >= self.end
    }

    /// Number of cue points decoded so far.
    pub fn count(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[CuePoint] {
        &self.points
    }

    pub fn first(&self) -> Option<&CuePoint> {
        self.points.first()
    }

    /// The loaded cue point after `current`.
    pub fn next(&self, current: &CuePoint) -> Option<&CuePoint> {
        let index = self.points.iter().position(|p| p.pos == current.pos)?;
        self.points.get(index + 1)
    }

    pub fn last(&self) -> Option<&CuePoint> {
        self.points.last()
    }

    /// Last loaded cue point at or before `time_ns` with a position for
    /// `track`.
    pub fn find(&self, time_ns: u64, track: u64) -> Option<(&CuePoint, &CueTrackPosition)> {
        self.points
            .iter()
            .rev()
            .filter(|p| p.time_ns(self.timecode_scale) <= time_ns)
            .find_map(|p| p.find(track).map(|position| (p, position)))
    }
}
