//! # CMUX Protocol Module
//!
//! Implementation of the GSM 07.10 / 27.010 serial multiplexer.
//!
//! This module handles:
//! - CRC-8 frame check sequence calculation
//! - Basic (0xF9) and Advanced (0x7E, byte-stuffed) frame encoding
//! - Stream reassembly with shared flags between adjacent frames
//! - Channel open/close/shutdown state and AT+CMUX negotiation

pub mod channels;
pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod io;
pub mod mux;
pub mod negotiation;
pub mod protocol;

pub use io::{AtChannel, FrameSink, Transport};
pub use mux::{Multiplexer, MuxConfig};
pub use protocol::{Dlci, FrameType, Mode};
