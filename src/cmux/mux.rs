//! # Multiplexer Context
//!
//! The single owned aggregate: wire settings, channel table and read
//! reassembly state. Transports and sinks are borrowed per call.
//!
//! ## Usage
//!
//! ```
//! use gsm_cmux::cmux::io::{FrameSink, Transport};
//! use gsm_cmux::cmux::mux::Multiplexer;
//!
//! struct Loopback(Vec<u8>);
//!
//! impl Transport for Loopback {
//!     fn write(&mut self, bytes: &[u8]) -> usize {
//!         self.0.extend_from_slice(bytes);
//!         bytes.len()
//!     }
//!     fn read(&mut self, buffer: &mut [u8]) -> usize {
//!         let n = buffer.len().min(self.0.len());
//!         buffer[..n].copy_from_slice(&self.0[..n]);
//!         self.0.drain(..n);
//!         n
//!     }
//! }
//!
//! let mut mux = Multiplexer::new();
//! let mut link = Loopback(Vec::new());
//!
//! mux.open(1, &mut link).unwrap();
//! assert!(mux.is_open(1));
//! assert_eq!(link.0, vec![0xF9, 0x07, 0x3F, 0x01, 0xDE, 0xF9]);
//! ```

use tracing::{debug, info, warn};

use super::channels::ChannelTable;
use super::decoder::{DecoderStats, ReadAssembler};
use super::encoder::encode_frame;
use super::io::{AtChannel, FrameSink, Transport};
use super::negotiation::cmux_command;
use super::protocol::*;
use crate::error::{CmuxError, Result};

/// Flags, address, control, two length bytes and FCS
pub const FRAME_OVERHEAD: usize = 7;

/// Wire settings of a multiplexer session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxConfig {
    pub mode: Mode,
    /// Maximum payload bytes per frame, in both directions
    pub frame_size: usize,
    /// Only used to pick the AT+CMUX speed code
    pub port_speed: u32,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Basic,
            frame_size: DEFAULT_FRAME_SIZE,
            port_speed: DEFAULT_PORT_SPEED,
        }
    }
}

impl MuxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 || self.frame_size > MAX_FRAME_SIZE {
            return Err(CmuxError::InvalidFrameSize(self.frame_size));
        }
        Ok(())
    }
}

/// GSM 07.10 multiplexer state
///
/// Not internally synchronized: share it between threads only behind a lock
/// owned by the caller.
#[derive(Debug)]
pub struct Multiplexer {
    config: MuxConfig,
    channels: ChannelTable,
    assembler: ReadAssembler,
    read_buf: Vec<u8>,
    frames_sent: u64,
}

impl Multiplexer {
    /// Basic mode, 31 byte frames, 115200 baud, no channels open
    pub fn new() -> Self {
        Self::build(MuxConfig::default())
    }

    pub fn with_config(config: MuxConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: MuxConfig) -> Self {
        Self {
            config,
            channels: ChannelTable::new(),
            assembler: ReadAssembler::new(config.mode, config.frame_size),
            read_buf: vec![0u8; config.frame_size + FRAME_OVERHEAD],
            frames_sent: 0,
        }
    }

    pub fn config(&self) -> MuxConfig {
        self.config
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn frame_size(&self) -> usize {
        self.config.frame_size
    }

    pub fn port_speed(&self) -> u32 {
        self.config.port_speed
    }

    /// Replace the wire settings
    ///
    /// # Errors
    ///
    /// Returns `SessionActive` once any frame has been written, or
    /// `InvalidFrameSize` if `frame_size` is outside 1..=32767.
    pub fn configure(&mut self, config: MuxConfig) -> Result<()> {
        if self.frames_sent > 0 {
            return Err(CmuxError::SessionActive);
        }
        config.validate()?;
        self.config = config;
        self.assembler.reconfigure(config.mode, config.frame_size);
        self.read_buf = vec![0u8; config.frame_size + FRAME_OVERHEAD];
        Ok(())
    }

    /// Bring the multiplexer up on the peer
    ///
    /// With `use_at_negotiation`, sends `AT+CMUX=...` through `at` and fails
    /// with `NegotiationRejected` if the modem refuses it. Otherwise sends
    /// Establish on DLCI 0 followed by Establish for every channel already
    /// open, ascending, to reassert a session after a link hiccup.
    pub fn startup(
        &mut self,
        use_at_negotiation: bool,
        at: &mut dyn AtChannel,
        transport: &mut dyn Transport,
    ) -> Result<()> {
        if use_at_negotiation {
            let MuxConfig {
                mode,
                frame_size,
                port_speed,
            } = self.config;
            let command = cmux_command(mode, port_speed, frame_size);
            info!("Negotiating multiplexer: {}", command);
            if !at.send_command(&command) {
                return Err(CmuxError::NegotiationRejected(command));
            }
            return Ok(());
        }

        info!(
            "Re-establishing multiplexer with {} open channel(s)",
            self.channels.open_count()
        );
        self.send_frame(transport, CONTROL_CHANNEL, FrameType::Establish, &[])?;
        let open: Vec<Dlci> = self.channels.open_channels().collect();
        for dlci in open {
            self.send_frame(transport, dlci.get(), FrameType::Establish, &[])?;
        }
        Ok(())
    }

    /// Open a channel, sending Establish unless it is already open
    ///
    /// # Errors
    ///
    /// `InvalidChannel` outside 1..=63; `ShortWrite` if the transport did
    /// not take the whole frame, in which case the channel stays closed.
    pub fn open<C>(&mut self, channel: C, transport: &mut dyn Transport) -> Result<()>
    where
        C: TryInto<Dlci>,
        CmuxError: From<C::Error>,
    {
        let dlci = channel.try_into()?;
        if self.channels.is_open(dlci) {
            debug!("{} already open", dlci);
            return Ok(());
        }
        self.send_frame(transport, dlci.get(), FrameType::Establish, &[])?;
        self.channels.mark_open(dlci);
        info!("Opened {}", dlci);
        Ok(())
    }

    /// Whether a channel is open; false for anything outside 1..=63
    pub fn is_open(&self, channel: u8) -> bool {
        Dlci::new(channel).is_ok_and(|dlci| self.channels.is_open(dlci))
    }

    /// Close a channel, sending Disconnect if it was open
    ///
    /// The channel is considered closed even when the Disconnect write is
    /// short; the short write is still reported.
    pub fn close<C>(&mut self, channel: C, transport: &mut dyn Transport) -> Result<()>
    where
        C: TryInto<Dlci>,
        CmuxError: From<C::Error>,
    {
        let dlci = channel.try_into()?;
        if !self.channels.mark_closed(dlci) {
            debug!("{} already closed", dlci);
            return Ok(());
        }
        info!("Closing {}", dlci);
        self.send_frame(transport, dlci.get(), FrameType::Disconnect, &[])
    }

    /// Disconnect every open channel, ascending, then close down the multiplexer
    ///
    /// Always sends the close-down frame on DLCI 0, even with nothing open.
    /// All channels end up closed; the first write failure is returned after
    /// every frame has been attempted.
    pub fn shutdown(&mut self, transport: &mut dyn Transport) -> Result<()> {
        let open: Vec<Dlci> = self.channels.open_channels().collect();
        info!("Shutting down multiplexer ({} open channel(s))", open.len());

        let mut first_error = None;
        for dlci in open {
            self.channels.mark_closed(dlci);
            if let Err(e) = self.send_frame(transport, dlci.get(), FrameType::Disconnect, &[]) {
                first_error.get_or_insert(e);
            }
        }
        let close_down =
            self.send_frame(transport, CONTROL_CHANNEL, FrameType::Data, &CLOSE_DOWN_PAYLOAD);
        if let Err(e) = close_down {
            first_error.get_or_insert(e);
        }
        self.channels.clear();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Write one frame on any DLCI (0..=63), truncating the payload to `frame_size`
    ///
    /// Returns the number of payload bytes that were framed.
    pub fn write(
        &mut self,
        channel: u8,
        frame_type: FrameType,
        payload: &[u8],
        transport: &mut dyn Transport,
    ) -> Result<usize> {
        if channel > MAX_CHANNEL {
            return Err(CmuxError::InvalidChannel(i64::from(channel)));
        }
        self.send_frame(transport, channel, frame_type, payload)?;
        Ok(payload.len().min(self.config.frame_size))
    }

    /// Pull one buffer of bytes from `transport` and dispatch complete frames
    ///
    /// Returns the number of frames handed to `sink`.
    pub fn read(&mut self, transport: &mut dyn Transport, sink: &mut dyn FrameSink) -> usize {
        let n = transport.read(&mut self.read_buf);
        let n = n.min(self.read_buf.len());
        if n == 0 {
            return 0;
        }
        self.assembler.feed(&self.read_buf[..n], sink)
    }

    /// Dispatch complete frames from bytes the caller already holds
    pub fn feed(&mut self, bytes: &[u8], sink: &mut dyn FrameSink) -> usize {
        self.assembler.feed(bytes, sink)
    }

    pub fn stats(&self) -> DecoderStats {
        self.assembler.stats()
    }

    pub fn open_channels(&self) -> Vec<u8> {
        self.channels.open_channels().map(Dlci::get).collect()
    }

    /// Whether the peer appears to have restarted underneath the session
    ///
    /// Always false: no restart signature is detected yet.
    pub fn reinitialization_detected(&self) -> bool {
        false
    }

    fn send_frame(
        &mut self,
        transport: &mut dyn Transport,
        channel: u8,
        frame_type: FrameType,
        payload: &[u8],
    ) -> Result<()> {
        let MuxConfig {
            mode, frame_size, ..
        } = self.config;
        let frame = encode_frame(mode, channel, frame_type, payload, frame_size);
        self.frames_sent += 1;
        let written = transport.write(&frame);
        if written < frame.len() {
            warn!(
                "Short write of {:?} frame on DLCI {}: {} of {} bytes",
                frame_type,
                channel,
                written,
                frame.len()
            );
            return Err(CmuxError::ShortWrite {
                expected: frame.len(),
                written,
            });
        }
        debug!("Sent {:?} frame on DLCI {} ({} bytes)", frame_type, channel, frame.len());
        Ok(())
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}
