//! Block header flags and lacing modes.

/// SimpleBlock key frame flag.
pub const FLAG_KEY: u8 = 0x80;
/// Block invisible flag.
pub const FLAG_INVISIBLE: u8 = 0x08;
/// SimpleBlock discardable flag.
pub const FLAG_DISCARDABLE: u8 = 0x01;
/// Lacing bits of the flags byte.
pub const LACING_MASK: u8 = 0x06;

/// How several frames are packed into one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Lacing {
    None,
    Xiph,
    Fixed,
    Ebml,
}

impl Lacing {
    /// Lacing mode encoded in a block flags byte.
    pub fn from_flags(flags: u8) -> Self {
        match flags & LACING_MASK {
            0x00 => Self::None,
            0x02 => Self::Xiph,
            0x04 => Self::Fixed,
            _ => Self::Ebml,
        }
    }

    /// Flag bits for this mode.
    pub fn flag_bits(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::Xiph => 0x02,
            Self::Fixed => 0x04,
            Self::Ebml => 0x06,
        }
    }
}
