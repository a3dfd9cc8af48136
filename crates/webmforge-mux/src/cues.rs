//! Cue index built while muxing.

use bytes::BytesMut;
use webmforge_ebml::element::{master_element_size, put_master, uint_element_size};
use webmforge_ebml::{EbmlBufMut, ElementId, Error, Result};

/// Where one track's frame at a cue time can be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueTrackPosition {
    pub track: u64,
    /// Cluster position relative to the segment payload.
    pub cluster_position: u64,
    /// 1-based block index within the cluster, when known.
    pub block_number: Option<u64>,
}

impl CueTrackPosition {
    fn payload_size(&self) -> u64 {
        let mut size = uint_element_size(ElementId::CUE_TRACK, self.track)
            + uint_element_size(ElementId::CUE_CLUSTER_POSITION, self.cluster_position);
        if let Some(block) = self.block_number.filter(|&b| b > 1) {
            size += uint_element_size(ElementId::CUE_BLOCK_NUMBER, block);
        }
        size
    }

    fn put(&self, buf: &mut BytesMut) {
        put_master(buf, ElementId::CUE_TRACK_POSITIONS, |buf| {
            buf.put_uint_element(ElementId::CUE_TRACK, self.track);
            buf.put_uint_element(ElementId::CUE_CLUSTER_POSITION, self.cluster_position);
            if let Some(block) = self.block_number.filter(|&b| b > 1) {
                buf.put_uint_element(ElementId::CUE_BLOCK_NUMBER, block);
            }
        });
    }
}

/// A seek point: one time, one or more track positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuePoint {
    /// Cue time in ticks.
    pub time: u64,
    pub positions: Vec<CueTrackPosition>,
}

impl CuePoint {
    fn payload_size(&self) -> u64 {
        let positions: u64 = self
            .positions
            .iter()
            .map(|p| master_element_size(ElementId::CUE_TRACK_POSITIONS, p.payload_size()))
            .sum();
        uint_element_size(ElementId::CUE_TIME, self.time) + positions
    }

    fn put(&self, buf: &mut BytesMut) {
        put_master(buf, ElementId::CUE_POINT, |buf| {
            buf.put_uint_element(ElementId::CUE_TIME, self.time);
            for position in &self.positions {
                position.put(buf);
            }
        });
    }
}

/// Cue points in strictly increasing time order.
#[derive(Debug, Clone, Default)]
pub struct Cues {
    points: Vec<CuePoint>,
}

impl Cues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `position` at `time` (ticks).
    ///
    /// A new time gets its own CuePoint, inserted in order. A time that
    /// already has a point gains another track position, in arrival order.
    /// A second position for the same track at the same time is rejected.
    pub fn add(&mut self, time: u64, position: CueTrackPosition) -> Result<()> {
        match self.points.binary_search_by_key(&time, |p| p.time) {
            Ok(index) => {
                let point = &mut self.points[index];
                if point.positions.iter().any(|p| p.track == position.track) {
                    return Err(Error::validation(format!(
                        "track {} already has a cue point at {time}",
                        position.track
                    )));
                }
                point.positions.push(position);
            }
            Err(index) => self.points.insert(
                index,
                CuePoint {
                    time,
                    positions: vec![position],
                },
            ),
        }
        Ok(())
    }

    /// Whether `track` has a cue point at `time`.
    pub fn contains(&self, time: u64, track: u64) -> bool {
        self.points
            .binary_search_by_key(&time, |p| p.time)
            .is_ok_and(|i| self.points[i].positions.iter().any(|p| p.track == track))
    }

    pub fn points(&self) -> &[CuePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Encoded size of the whole Cues element.
    pub fn encoded_size(&self) -> u64 {
        let payload: u64 = self
            .points
            .iter()
            .map(|p| master_element_size(ElementId::CUE_POINT, p.payload_size()))
            .sum();
        master_element_size(ElementId::CUES, payload)
    }

    /// Move every cluster position by `delta` bytes.
    pub fn shift_positions(&mut self, delta: i64) {
        for position in self.points.iter_mut().flat_map(|p| p.positions.iter_mut()) {
            position.cluster_position = position.cluster_position.saturating_add_signed(delta);
        }
    }

    /// Append the Cues element.
    pub fn put(&self, buf: &mut BytesMut) {
        put_master(buf, ElementId::CUES, |buf| {
            for point in &self.points {
                point.put(buf);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn pos(track: u64, cluster_position: u64) -> CueTrackPosition {
        CueTrackPosition {
            track,
            cluster_position,
            block_number: None,
        }
    }

    #[test]
    fn test_sorted_insert() {
        let mut cues = Cues::new();
        cues.add(0, pos(1, 100)).unwrap();
        cues.add(6, pos(1, 200)).unwrap();
        cues.add(4, pos(1, 100)).unwrap();
        let times: Vec<u64> = cues.points().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![0, 4, 6]);
    }

    #[test]
    fn test_coincident_tracks_share_point() {
        let mut cues = Cues::new();
        cues.add(10, pos(2, 50)).unwrap();
        cues.add(10, pos(1, 50)).unwrap();
        assert_eq!(cues.len(), 1);
        let tracks: Vec<u64> = cues.points()[0].positions.iter().map(|p| p.track).collect();
        assert_eq!(tracks, vec![2, 1]);
        assert!(cues.contains(10, 1));
        assert!(!cues.contains(11, 1));
        assert_matches!(cues.add(10, pos(1, 70)), Err(Error::Validation(_)));
    }

    #[test]
    fn test_encoded_size_matches_output() {
        let mut cues = Cues::new();
        cues.add(0, pos(1, 206)).unwrap();
        cues.add(
            6000,
            CueTrackPosition {
                track: 1,
                cluster_position: 70_000,
                block_number: Some(3),
            },
        )
        .unwrap();
        let mut buf = BytesMut::new();
        cues.put(&mut buf);
        assert_eq!(buf.len() as u64, cues.encoded_size());
        assert_eq!(&buf[..4], &[0x1C, 0x53, 0xBB, 0x6B]);
    }

    #[test]
    fn test_block_number_one_is_implicit() {
        let mut cues = Cues::new();
        let first = CueTrackPosition {
            track: 1,
            cluster_position: 5,
            block_number: Some(1),
        };
        cues.add(0, first).unwrap();
        let mut buf = BytesMut::new();
        cues.put(&mut buf);
        assert!(!buf.windows(2).any(|w| w == [0x53, 0x78]));
    }

    #[test]
    fn test_shift_positions() {
        let mut cues = Cues::new();
        cues.add(0, pos(1, 100)).unwrap();
        cues.shift_positions(40);
        assert_eq!(cues.points()[0].positions[0].cluster_position, 140);
    }
}
