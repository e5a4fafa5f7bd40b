//! # Error Types
//!
//! Custom error types for the CMUX multiplexer using `thiserror`.
//!
//! Malformed or corrupted frames on the read path are not errors: they are
//! dropped by the decoder and only show up in its statistics.

use thiserror::Error;

/// Main error type for the multiplexer and its serial shell
#[derive(Debug, Error)]
pub enum CmuxError {
    /// Channel number outside the addressable range 1..=63
    #[error("Invalid channel {0}: must be between 1 and 63")]
    InvalidChannel(i64),

    /// Transport accepted only part of a frame
    #[error("Short write: transport accepted {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    /// Frame size outside 1..=32767
    #[error("Invalid frame size {0}: must be between 1 and 32767")]
    InvalidFrameSize(usize),

    /// Mode or frame size changed after frames were sent
    #[error("Multiplexer settings are fixed once the first frame is sent")]
    SessionActive,

    /// The modem refused the AT+CMUX command
    #[error("CMUX negotiation rejected: {0}")]
    NegotiationRejected(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// No usable serial device
    #[error("Serial port not found: {0}")]
    SerialPortNotFound(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::convert::Infallible> for CmuxError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

/// Result type alias for the multiplexer
pub type Result<T> = std::result::Result<T, CmuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_channel_message() {
        let err = CmuxError::InvalidChannel(64);
        assert_eq!(err.to_string(), "Invalid channel 64: must be between 1 and 63");
    }

    #[test]
    fn test_short_write_message() {
        let err = CmuxError::ShortWrite { expected: 6, written: 2 };
        assert!(err.to_string().contains("2 of 6"));
    }
}
