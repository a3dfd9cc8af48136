//! Frames handed to the muxer.

use webmforge_ebml::{Error, Result};

/// One timestamped payload for a track.
///
/// The payload is borrowed for the duration of the `add_frame` call and copied
/// into the active cluster buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Track number.
    pub track: u64,
    /// Absolute timestamp in nanoseconds.
    pub timestamp: u64,
    /// Frame bytes.
    pub payload: &'a [u8],
    /// Key frame flag.
    pub is_key: bool,
    /// Duration in nanoseconds.
    pub duration: Option<u64>,
    /// Block additional data as `(BlockAddID, bytes)`.
    pub additional: Option<(u64, &'a [u8])>,
    /// Discard padding in nanoseconds.
    pub discard_padding: Option<i64>,
    /// Timestamp of the frame this one references, in nanoseconds.
    pub reference_timestamp: Option<u64>,
}

impl<'a> Frame<'a> {
    /// Create a non-key frame.
    pub fn new(track: u64, timestamp: u64, payload: &'a [u8]) -> Self {
        Self {
            track,
            timestamp,
            payload,
            is_key: false,
            duration: None,
            additional: None,
            discard_padding: None,
            reference_timestamp: None,
        }
    }

    /// Set the key flag.
    pub fn key(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    /// Set an explicit duration in nanoseconds.
    pub fn with_duration(mut self, duration: u64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Attach block additional data.
    pub fn with_additional(mut self, add_id: u64, data: &'a [u8]) -> Self {
        self.additional = Some((add_id, data));
        self
    }

    /// Set discard padding in nanoseconds.
    pub fn with_discard_padding(mut self, padding: i64) -> Self {
        self.discard_padding = Some(padding);
        self
    }

    /// Set the referenced frame's timestamp.
    pub fn with_reference(mut self, timestamp: u64) -> Self {
        self.reference_timestamp = Some(timestamp);
        self
    }

    /// Whether the frame fits in a SimpleBlock.
    ///
    /// Duration, additional data and discard padding all need a BlockGroup.
    pub fn can_be_simple_block(&self) -> bool {
        self.duration.is_none() && self.additional.is_none() && self.discard_padding.is_none()
    }

    /// Time just past the frame, in nanoseconds.
    pub fn end_time(&self) -> u64 {
        self.timestamp.saturating_add(self.duration.unwrap_or(0))
    }

    /// Check payload invariants that do not depend on segment state.
    pub fn validate(&self) -> Result<()> {
        if self.payload.is_empty() {
            return Err(Error::EmptyPayload);
        }
        if let Some((add_id, data)) = self.additional {
            if data.is_empty() {
                return Err(Error::EmptyPayload);
            }
            if add_id == 0 {
                return Err(Error::validation("BlockAddID must be nonzero"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_simple_block_eligibility() {
        let data = [0u8; 4];
        let frame = Frame::new(1, 0, &data).key(true);
        assert!(frame.can_be_simple_block());
        assert!(!frame.with_duration(10).can_be_simple_block());
        assert!(!frame.with_discard_padding(-1).can_be_simple_block());
        assert!(!frame.with_additional(1, &data).can_be_simple_block());
    }

    #[test]
    fn test_validate() {
        let data = [1u8];
        assert!(Frame::new(1, 0, &data).validate().is_ok());
        assert_matches!(Frame::new(1, 0, &[]).validate(), Err(Error::EmptyPayload));
        assert_matches!(
            Frame::new(1, 0, &data).with_additional(1, &[]).validate(),
            Err(Error::EmptyPayload)
        );
        assert_matches!(
            Frame::new(1, 0, &data).with_additional(0, &data).validate(),
            Err(Error::Validation(_))
        );
    }

    #[test]
    fn test_end_time() {
        let data = [1u8];
        assert_eq!(Frame::new(1, 6_000_000, &data).with_duration(2_000_000).end_time(), 8_000_000);
        assert_eq!(Frame::new(1, 5, &data).end_time(), 5);
    }
}
