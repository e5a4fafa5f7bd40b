//! # GSM CMUX Library
//!
//! GSM 07.10 (27.010) serial multiplexer: one serial link to a modem carries
//! up to 63 independent logical channels, e.g. AT commands alongside a data
//! session.
//!
//! The protocol core in [`cmux`] is synchronous and borrows its transport
//! and sinks per call; [`serial`] wraps it for an async tokio serial port.

pub mod cmux;
pub mod config;
pub mod error;
pub mod logging;
pub mod serial;
pub mod telemetry;

pub use error::{CmuxError, Result};
