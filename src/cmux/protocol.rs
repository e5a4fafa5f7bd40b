//! # CMUX Protocol Constants and Types
//!
//! Core protocol definitions for GSM 07.10 multiplexer framing.

use serde::Deserialize;

use crate::error::{CmuxError, Result};

/// Basic option opening/closing flag
pub const BASIC_FLAG: u8 = 0xF9;

/// Advanced option opening/closing flag
pub const ADVANCED_FLAG: u8 = 0x7E;

/// Advanced option control escape
pub const ADVANCED_ESCAPE: u8 = 0x7D;

/// XOR mask applied to escaped bytes
pub const ESCAPE_MASK: u8 = 0x20;

/// Poll/final bit in the control field
pub const PF_BIT: u8 = 0x10;

/// EA and C/R bits, both fixed to 1 for the initiator role
pub const ADDRESS_EA_CR: u8 = 0x03;

/// Extension bit marking a single-byte address
pub const ADDRESS_EA: u8 = 0x01;

/// Extension bit marking the last byte of a length field
pub const LENGTH_EA: u8 = 0x01;

/// Largest payload a single-byte length field can describe
pub const SHORT_LENGTH_MAX: usize = 0x7F;

/// Largest payload the two-byte Basic length field can describe
pub const MAX_FRAME_SIZE: usize = 0x7F | (0xFF << 7);

/// Default maximum payload per frame (N1)
pub const DEFAULT_FRAME_SIZE: usize = 31;

/// Default port speed used to pick the AT+CMUX speed code
pub const DEFAULT_PORT_SPEED: u32 = 115_200;

/// DLCI reserved for multiplexer control
pub const CONTROL_CHANNEL: u8 = 0;

/// Highest addressable DLCI
pub const MAX_CHANNEL: u8 = 63;

/// Multiplexer close-down command (CLD, command bit and EA set)
pub const CLD_COMMAND: u8 = 0xC3;

/// Close-down payload: CLD followed by an EA-tagged zero length
pub const CLOSE_DOWN_PAYLOAD: [u8; 2] = [CLD_COMMAND, LENGTH_EA];

/// Wire encoding selected for the link
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Length-delimited frames between 0xF9 flags, no escaping
    #[default]
    Basic,
    /// HDLC-like frames between 0x7E flags with byte stuffing
    Advanced,
}

impl Mode {
    /// Mode operand of AT+CMUX
    pub fn code(self) -> u8 {
        match self {
            Mode::Basic => 0,
            Mode::Advanced => 1,
        }
    }

    /// Flag byte delimiting frames in this mode
    pub fn flag(self) -> u8 {
        match self {
            Mode::Basic => BASIC_FLAG,
            Mode::Advanced => ADVANCED_FLAG,
        }
    }
}

/// Frame kinds emitted and consumed by the multiplexer
///
/// | Kind | Base code | On the wire |
/// |------|-----------|-------------|
/// | Establish (SABM) | 0x2F | 0x3F |
/// | Disconnect (DISC) | 0x43 | 0x53 |
/// | Data (UIH) | 0xEF | 0xEF |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Establish,
    Disconnect,
    Data,
}

impl FrameType {
    /// Control value without the P/F bit
    pub fn base_code(self) -> u8 {
        match self {
            FrameType::Establish => 0x2F,
            FrameType::Disconnect => 0x43,
            FrameType::Data => 0xEF,
        }
    }

    /// Control byte as sent: commands carry P/F, UIH never does
    pub fn control(self) -> u8 {
        match self {
            FrameType::Establish | FrameType::Disconnect => self.base_code() | PF_BIT,
            FrameType::Data => self.base_code(),
        }
    }

    /// Recognize a control byte, ignoring P/F
    pub fn from_control(control: u8) -> Option<Self> {
        match control & !PF_BIT {
            0x2F => Some(FrameType::Establish),
            0x43 => Some(FrameType::Disconnect),
            0xEF => Some(FrameType::Data),
            _ => None,
        }
    }
}

/// A data link connection identifier in 1..=63
///
/// DLCI 0 belongs to the multiplexer itself and cannot be constructed here,
/// so channel-table indexing never needs a bounds check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dlci(u8);

impl Dlci {
    pub fn new(channel: u8) -> Result<Self> {
        Self::try_from(i64::from(channel))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Every user channel, ascending
    pub fn all() -> impl Iterator<Item = Dlci> {
        (1..=MAX_CHANNEL).map(Dlci)
    }
}

impl TryFrom<i64> for Dlci {
    type Error = CmuxError;

    fn try_from(channel: i64) -> Result<Self> {
        if (1..=i64::from(MAX_CHANNEL)).contains(&channel) {
            Ok(Dlci(channel as u8))
        } else {
            Err(CmuxError::InvalidChannel(channel))
        }
    }
}

impl TryFrom<i32> for Dlci {
    type Error = CmuxError;

    fn try_from(channel: i32) -> Result<Self> {
        Self::try_from(i64::from(channel))
    }
}

impl TryFrom<u8> for Dlci {
    type Error = CmuxError;

    fn try_from(channel: u8) -> Result<Self> {
        Self::new(channel)
    }
}

impl std::fmt::Display for Dlci {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DLCI {}", self.0)
    }
}

/// Address byte for a channel: DLCI in bits 2..7, C/R and EA set
pub fn address_byte(channel: u8) -> u8 {
    (channel << 2) | ADDRESS_EA_CR
}

/// DLCI carried in an address byte
pub fn channel_of(address: u8) -> u8 {
    address >> 2
}
