//! # Frame Capture
//!
//! JSONL frame capture with size-based rotation.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cmux::io::FrameSink;
use crate::config::CaptureConfig;
use crate::error::Result;

const FILE_PREFIX: &str = "frames_";
const FILE_EXTENSION: &str = "jsonl";

/// One captured frame
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FrameRecord {
    pub timestamp: DateTime<Utc>,
    pub channel: u8,
    pub frame_type: u8,
    pub length: usize,
    /// Payload as lowercase hex
    pub payload: String,
}

impl FrameRecord {
    pub fn new(channel: u8, frame_type: u8, payload: &[u8]) -> Self {
        Self {
            timestamp: Utc::now(),
            channel,
            frame_type,
            length: payload.len(),
            payload: hex::encode(payload),
        }
    }
}

/// Rotating JSONL writer
#[derive(Debug)]
struct CaptureWriter {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    current: Option<BufWriter<File>>,
    records_in_file: usize,
    sequence: u32,
}

impl CaptureWriter {
    fn new(config: &CaptureConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file,
            max_files_to_keep: config.max_files_to_keep,
            current: None,
            records_in_file: 0,
            sequence: 0,
        })
    }

    fn append(&mut self, record: &FrameRecord) -> Result<()> {
        if self.current.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }
        let line = serde_json::to_string(record).map_err(std::io::Error::from)?;
        if let Some(writer) = self.current.as_mut() {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
        }
        self.records_in_file += 1;
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.current.take() {
            writer.flush()?;
        }
        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.sequence,
            FILE_EXTENSION
        );
        self.sequence = self.sequence.wrapping_add(1);
        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened capture file {}", path.display());
        self.current = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.prune()
    }

    /// Delete the oldest capture files beyond the retention limit
    fn prune(&self) -> Result<()> {
        let mut files = capture_files(&self.dir)?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }
        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            debug!("Removing old capture file {}", path.display());
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Capture files in `dir`, unsorted
fn capture_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_capture = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(FILE_PREFIX))
            && path.extension().is_some_and(|e| e == FILE_EXTENSION);
        if is_capture {
            files.push(path);
        }
    }
    Ok(files)
}

/// Frame sink that logs every frame and optionally captures it to disk
#[derive(Debug)]
pub struct FrameLog {
    writer: Option<CaptureWriter>,
    frames_seen: u64,
}

impl FrameLog {
    /// Build from configuration; disabled capture only logs
    pub fn new(config: &CaptureConfig) -> Result<Self> {
        let writer = if config.enabled {
            info!("Capturing frames to {}", config.log_dir);
            Some(CaptureWriter::new(config)?)
        } else {
            None
        };
        Ok(Self {
            writer,
            frames_seen: 0,
        })
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl FrameSink for FrameLog {
    fn deliver(&mut self, channel: u8, frame_type: u8, payload: &[u8]) -> bool {
        self.frames_seen += 1;
        debug!(
            "DLCI {} frame 0x{:02X}: {} bytes",
            channel,
            frame_type,
            payload.len()
        );

        let Some(writer) = self.writer.as_mut() else {
            return true;
        };
        match writer.append(&FrameRecord::new(channel, frame_type, payload)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to capture frame on DLCI {}: {}", channel, e);
                false
            }
        }
    }
}
