//! # Telemetry Module
//!
//! Frame capture logging to JSONL files with rotation.
//!
//! This module handles:
//! - Receiving every decoded frame from the multiplexer
//! - Formatting as JSONL (JSON Lines)
//! - Writing to rotating capture files
//! - Managing file rotation (max N records per file)
//! - Retaining only last M files

pub mod logger;

pub use logger::{FrameLog, FrameRecord};
