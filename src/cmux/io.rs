//! # Capability Traits
//!
//! Interfaces the multiplexer borrows for the duration of a call.
//!
//! None of these are stored in the context, so there are no unset callbacks
//! to check and no hidden shared state.

#[cfg(test)]
use mockall::automock;

/// Byte transport underneath the multiplexer (usually a serial port)
#[cfg_attr(test, automock)]
pub trait Transport {
    /// Write `bytes`, returning how many were accepted
    fn write(&mut self, bytes: &[u8]) -> usize;

    /// Fill `buffer` with whatever is available, returning the count (0 if idle)
    fn read(&mut self, buffer: &mut [u8]) -> usize;
}

/// Sink for the AT+CMUX negotiation command
#[cfg_attr(test, automock)]
pub trait AtChannel {
    /// Send one AT command line, returning whether the modem accepted it
    fn send_command(&mut self, command: &str) -> bool;
}

/// Delivery point for every decoded frame
#[cfg_attr(test, automock)]
pub trait FrameSink {
    /// `frame_type` has the P/F bit cleared
    fn deliver(&mut self, channel: u8, frame_type: u8, payload: &[u8]) -> bool;
}

#[cfg(test)]
pub mod mocks {
    use super::*;

    /// In-memory transport recording every write as one entry
    #[derive(Default)]
    pub struct RecordingTransport {
        pub written: Vec<Vec<u8>>,
        pub incoming: Vec<u8>,
        /// Cap on bytes accepted per write, to simulate a stalled link
        pub write_limit: Option<usize>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_incoming(bytes: &[u8]) -> Self {
            Self {
                incoming: bytes.to_vec(),
                ..Self::default()
            }
        }

        /// Every byte written so far, in order
        pub fn all_bytes(&self) -> Vec<u8> {
            self.written.concat()
        }
    }

    impl Transport for RecordingTransport {
        fn write(&mut self, bytes: &[u8]) -> usize {
            let accepted = self.write_limit.map_or(bytes.len(), |limit| limit.min(bytes.len()));
            self.written.push(bytes[..accepted].to_vec());
            accepted
        }

        fn read(&mut self, buffer: &mut [u8]) -> usize {
            let n = buffer.len().min(self.incoming.len());
            buffer[..n].copy_from_slice(&self.incoming[..n]);
            self.incoming.drain(..n);
            n
        }
    }
}
