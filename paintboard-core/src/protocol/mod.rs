//! Paintboard wire protocol.
//!
//! | Opcode | Direction       | Payload                                                     |
//! |--------|-----------------|-------------------------------------------------------------|
//! | `0xFE` | client → server | x(2 LE) y(2 LE) rgb(3) owner(3 LE) credential(16) id(4 LE)  |
//! | `0xFF` | server → client | id(4 LE) outcome(1)                                         |
//! | `0xFC` | server → client | —                                                           |
//! | `0xFB` | client → server | —                                                           |

pub mod codec;

use std::fmt;

pub use codec::{Frames, InboundFrame, PaintCodec, PaintRequest};

// ── Opcodes ──────────────────────────────────────────────────────

/// Submit a paint request.
pub const OP_PAINT: u8 = 0xFE;
/// Paint result for a previously submitted request id.
pub const OP_PAINT_RESULT: u8 = 0xFF;
/// Server heartbeat ping.
pub const OP_PING: u8 = 0xFC;
/// Client heartbeat pong.
pub const OP_PONG: u8 = 0xFB;

/// Encoded size of a paint request frame.
pub const PAINT_FRAME_LEN: usize = 31;
/// Encoded size of a paint result frame.
pub const RESULT_FRAME_LEN: usize = 6;

/// Largest owner id representable in the 3-byte wire field.
pub const MAX_OWNER_ID: u32 = 0x00FF_FFFF;

// ── Outcome ──────────────────────────────────────────────────────

/// Server-reported result code for a submitted paint request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The pixel was painted.
    Success,
    /// The owner must wait before the next accepted paint.
    Cooldown,
    /// The session credential was rejected.
    StaleCredential,
    /// Any code outside the known set.
    Unknown(u8),
}

impl Outcome {
    pub const SUCCESS: u8 = 0xEF;
    pub const COOLDOWN: u8 = 0xEE;
    pub const STALE_CREDENTIAL: u8 = 0xED;

    /// The raw wire code.
    pub fn code(&self) -> u8 {
        match self {
            Outcome::Success => Self::SUCCESS,
            Outcome::Cooldown => Self::COOLDOWN,
            Outcome::StaleCredential => Self::STALE_CREDENTIAL,
            Outcome::Unknown(code) => *code,
        }
    }
}

impl From<u8> for Outcome {
    fn from(value: u8) -> Self {
        match value {
            Self::SUCCESS => Outcome::Success,
            Self::COOLDOWN => Outcome::Cooldown,
            Self::STALE_CREDENTIAL => Outcome::StaleCredential,
            other => Outcome::Unknown(other),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Cooldown => write!(f, "cooldown"),
            Outcome::StaleCredential => write!(f, "stale-credential"),
            Outcome::Unknown(code) => write!(f, "unknown({code:#04x})"),
        }
    }
}

// ── Pixel types ──────────────────────────────────────────────────

/// A 24-bit color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A canvas coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: u16,
    pub y: u16,
}

impl Point {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_known_codes() {
        assert_eq!(Outcome::from(0xEF), Outcome::Success);
        assert_eq!(Outcome::from(0xEE), Outcome::Cooldown);
        assert_eq!(Outcome::from(0xED), Outcome::StaleCredential);
    }

    #[test]
    fn outcome_unknown_code_is_preserved() {
        let outcome = Outcome::from(0x01);
        assert_eq!(outcome, Outcome::Unknown(0x01));
        assert_eq!(outcome.code(), 0x01);
        assert_ne!(Outcome::from(0x00), Outcome::Success);
    }

    #[test]
    fn outcome_display() {
        assert_eq!(Outcome::Cooldown.to_string(), "cooldown");
        assert_eq!(Outcome::Unknown(0xab).to_string(), "unknown(0xab)");
    }
}
