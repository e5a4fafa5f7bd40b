//! # Serial Communication Module
//!
//! Async shell around the synchronous multiplexer core.
//!
//! This module handles:
//! - Opening the modem's serial port (8N1, no flow control)
//! - Buffering frames between the core and the port (`SerialLink`)
//! - The AT+CMUX command/response exchange
//! - Pumping received bytes into the frame decoder

pub mod port_trait;

use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::cmux::io::{AtChannel, FrameSink, Transport};
use crate::cmux::Multiplexer;
use crate::error::{CmuxError, Result};
use port_trait::SerialPortIO;

/// Read chunk size when pulling from the port
const READ_CHUNK_SIZE: usize = 512;

/// Open a serial port with multiplexer settings
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyUSB0")
/// * `baud_rate` - Line speed
///
/// # Errors
///
/// Returns `SerialPortNotFound` if the device does not exist, `Serial` for
/// any other open failure.
pub fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    if !std::path::Path::new(path).exists() {
        return Err(CmuxError::SerialPortNotFound(path.to_string()));
    }

    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| CmuxError::Serial(format!("Failed to open {}: {}", path, e)))?;

    info!("Opened serial port {} at {} baud", path, baud_rate);
    Ok(port)
}

/// In-memory transport between the multiplexer and the serial port
///
/// Frames written by the core collect in the transmit queue until the shell
/// drains them; bytes read from the port wait in the receive queue until the
/// decoder pulls them.
#[derive(Debug, Default)]
pub struct SerialLink {
    tx: BytesMut,
    rx: BytesMut,
}

impl SerialLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes received from the port
    pub fn push_received(&mut self, bytes: &[u8]) {
        self.rx.extend_from_slice(bytes);
    }

    pub fn has_received(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Take everything queued for transmission
    pub fn take_outgoing(&mut self) -> Bytes {
        self.tx.split().freeze()
    }

    pub fn has_outgoing(&self) -> bool {
        !self.tx.is_empty()
    }
}

impl Transport for SerialLink {
    fn write(&mut self, bytes: &[u8]) -> usize {
        self.tx.extend_from_slice(bytes);
        bytes.len()
    }

    fn read(&mut self, buffer: &mut [u8]) -> usize {
        let n = buffer.len().min(self.rx.len());
        buffer[..n].copy_from_slice(&self.rx[..n]);
        self.rx.advance(n);
        n
    }
}

/// AT sink that captures the command for an async exchange
///
/// Always accepts; the real verdict comes from [`send_at_command`].
#[derive(Debug, Default)]
pub struct PendingCommand {
    command: Option<String>,
}

impl PendingCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Option<String> {
        self.command.take()
    }
}

impl AtChannel for PendingCommand {
    fn send_command(&mut self, command: &str) -> bool {
        self.command = Some(command.to_string());
        true
    }
}

/// Write everything the multiplexer queued to the port
pub async fn flush_link<P: SerialPortIO + ?Sized>(
    port: &mut P,
    link: &mut SerialLink,
) -> Result<()> {
    if !link.has_outgoing() {
        return Ok(());
    }
    let outgoing = link.take_outgoing();
    port.write_all(&outgoing)
        .await
        .map_err(|e| CmuxError::Serial(format!("Failed to write frames: {}", e)))?;
    port.flush()
        .await
        .map_err(|e| CmuxError::Serial(format!("Failed to flush serial port: {}", e)))?;
    debug!("Flushed {} bytes to serial port", outgoing.len());
    Ok(())
}

/// Send one AT command line and wait for `OK` or `ERROR`
///
/// # Errors
///
/// `NegotiationRejected` on `ERROR`, `Serial` on timeout or a closed port.
pub async fn send_at_command<P: SerialPortIO + ?Sized>(
    port: &mut P,
    command: &str,
    timeout: Duration,
) -> Result<()> {
    let line = format!("{}\r", command);
    port.write_all(line.as_bytes())
        .await
        .map_err(|e| CmuxError::Serial(format!("Failed to write AT command: {}", e)))?;
    port.flush()
        .await
        .map_err(|e| CmuxError::Serial(format!("Failed to flush serial port: {}", e)))?;
    debug!("Sent AT command: {}", command);

    let exchange = async {
        let mut response = String::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = port
                .read(&mut chunk)
                .await
                .map_err(|e| CmuxError::Serial(format!("Failed to read AT response: {}", e)))?;
            if n == 0 {
                return Err(CmuxError::Serial("Serial port closed during AT exchange".to_string()));
            }
            response.push_str(&String::from_utf8_lossy(&chunk[..n]));
            if let Some(verdict) = at_verdict(&response) {
                return verdict.map_err(|_| CmuxError::NegotiationRejected(command.to_string()));
            }
        }
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| CmuxError::Serial(format!("No response to {} within {:?}", command, timeout)))?
}

/// Final result code in an AT response, if one has arrived
fn at_verdict(response: &str) -> Option<std::result::Result<(), ()>> {
    response.lines().map(str::trim).find_map(|line| match line {
        "OK" => Some(Ok(())),
        "ERROR" => Some(Err(())),
        _ if line.starts_with("+CME ERROR") => Some(Err(())),
        _ => None,
    })
}

/// Read one chunk from the port and dispatch every complete frame
///
/// Returns the number of frames handed to `sink`.
///
/// # Errors
///
/// `Serial` if the read fails or the port reports end of stream.
pub async fn pump<P: SerialPortIO + ?Sized>(
    port: &mut P,
    link: &mut SerialLink,
    mux: &mut Multiplexer,
    sink: &mut dyn FrameSink,
) -> Result<usize> {
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    let n = port
        .read(&mut chunk)
        .await
        .map_err(|e| CmuxError::Serial(format!("Failed to read from serial port: {}", e)))?;
    if n == 0 {
        warn!("Serial port reported end of stream");
        return Err(CmuxError::Serial("Serial port closed".to_string()));
    }
    link.push_received(&chunk[..n]);

    let mut dispatched = 0;
    while link.has_received() {
        dispatched += mux.read(link, sink);
    }
    Ok(dispatched)
}

/// Close the multiplexer down and flush the close-down frames
///
/// Shutdown and flush failures are only logged, so `outcome` (the reason the
/// session ended) is what the caller gets back.
pub async fn close_session<P: SerialPortIO + ?Sized>(
    port: &mut P,
    link: &mut SerialLink,
    mux: &mut Multiplexer,
    outcome: Result<()>,
) -> Result<()> {
    if let Err(e) = mux.shutdown(link) {
        warn!("Multiplexer shutdown incomplete: {}", e);
    }
    if let Err(e) = flush_link(port, link).await {
        warn!("Close-down frames not sent: {}", e);
    }
    outcome
}
