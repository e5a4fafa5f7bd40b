//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::cmux::protocol::{Mode, MAX_CHANNEL, MAX_FRAME_SIZE};
use crate::cmux::MuxConfig;
use crate::error::{CmuxError, Result};

/// Main configuration structure
#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub mux: MuxSettings,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_at_timeout_ms")]
    pub at_timeout_ms: u64,
}

/// How the multiplexer is brought up
#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Negotiation {
    /// Send AT+CMUX and wait for OK
    #[default]
    At,
    /// Modem is already multiplexing; send Establish frames only
    Frames,
}

/// Multiplexer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MuxSettings {
    #[serde(default)]
    pub mode: Mode,

    #[serde(default = "default_frame_size")]
    pub frame_size: usize,

    #[serde(default = "default_port_speed")]
    pub port_speed: u32,

    #[serde(default)]
    pub negotiation: Negotiation,

    #[serde(default = "default_channels")]
    pub channels: Vec<u8>,
}

/// Frame capture configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_capture_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Mirror logs to this file in addition to stderr
    #[serde(default)]
    pub file: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115_200 }
fn default_at_timeout_ms() -> u64 { 2000 }

fn default_frame_size() -> usize { 31 }
fn default_port_speed() -> u32 { 115_200 }
fn default_channels() -> Vec<u8> { vec![1, 2, 3] }

fn default_capture_dir() -> String { "./captures".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn default_log_level() -> String { "info".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            at_timeout_ms: default_at_timeout_ms(),
        }
    }
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            frame_size: default_frame_size(),
            port_speed: default_port_speed(),
            negotiation: Negotiation::default(),
            channels: default_channels(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_capture_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl MuxSettings {
    /// Wire settings for the multiplexer context
    pub fn to_mux_config(&self) -> MuxConfig {
        MuxConfig {
            mode: self.mode,
            frame_size: self.frame_size,
            port_speed: self.port_speed,
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> CmuxError {
    CmuxError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gsm_cmux::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if self.serial.baud_rate == 0 {
            return Err(invalid("baud_rate must be greater than 0"));
        }

        if self.serial.at_timeout_ms == 0 || self.serial.at_timeout_ms > 60000 {
            return Err(invalid("at_timeout_ms must be between 1 and 60000"));
        }

        if self.mux.frame_size == 0 || self.mux.frame_size > MAX_FRAME_SIZE {
            return Err(invalid(format!(
                "frame_size must be between 1 and {}",
                MAX_FRAME_SIZE
            )));
        }

        let mut seen = HashSet::new();
        for &channel in &self.mux.channels {
            if channel == 0 || channel > MAX_CHANNEL {
                return Err(invalid(format!(
                    "channel {} is out of range (must be 1-{})",
                    channel, MAX_CHANNEL
                )));
            }
            if !seen.insert(channel) {
                return Err(invalid(format!("channel {} is listed twice", channel)));
            }
        }

        if self.capture.enabled && self.capture.log_dir.is_empty() {
            return Err(invalid("capture log_dir cannot be empty when enabled"));
        }

        if self.capture.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.capture.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if !["error", "warn", "info", "debug", "trace"].contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "logging level must be one of: error, warn, info, debug, trace",
            ));
        }

        Ok(())
    }
}
