//! # CMUX Frame Decoder
//!
//! Byte-at-a-time reassembly of Basic and Advanced option frames.
//!
//! The scanner never needs two flags between adjacent frames: the flag that
//! closes one frame opens the next. Frames that fail their checksum, or are
//! cut short, are dropped without delivering anything and scanning resumes
//! at the next flag.

use tracing::{debug, trace, warn};

use super::crc::Fcs;
use super::io::FrameSink;
use super::protocol::*;

/// Counters kept by the decoder for the lifetime of the context
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames handed to the sink and accepted
    pub frames_delivered: u64,
    /// Frames handed to the sink and refused
    pub frames_rejected: u64,
    /// Frames dropped because the FCS did not match
    pub checksum_errors: u64,
    /// Frames dropped for structural reasons (bad address, missing flag, aborted escape)
    pub malformed_frames: u64,
    /// Bytes skipped while looking for a flag
    pub bytes_discarded: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BasicState {
    SeekFlag,
    Address,
    Control,
    Length,
    LengthHigh,
    Payload,
    Checksum,
    ClosingFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvancedState {
    SeekFlag,
    Content,
    Escaped,
}

/// Scan position; the variant fixes the wire mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Basic(BasicState),
    Advanced(AdvancedState),
}

impl Scan {
    fn start(mode: Mode) -> Self {
        match mode {
            Mode::Basic => Scan::Basic(BasicState::SeekFlag),
            Mode::Advanced => Scan::Advanced(AdvancedState::SeekFlag),
        }
    }
}

/// Reassembles frames from an arbitrary chunking of the byte stream
///
/// At most `frame_size` payload bytes are buffered per frame; longer payloads
/// are still checksummed in full and delivered truncated.
#[derive(Debug)]
pub struct ReadAssembler {
    frame_size: usize,
    scan: Scan,
    address: u8,
    control: u8,
    length_low: u8,
    declared_len: usize,
    /// Payload bytes seen so far, including those beyond `frame_size`
    received: usize,
    /// Advanced: bytes committed to address/control/payload
    committed: usize,
    /// Advanced: last unescaped byte, which is the FCS if a flag follows
    pending: Option<u8>,
    address_valid: bool,
    fcs: Fcs,
    payload: Vec<u8>,
    stats: DecoderStats,
}

impl ReadAssembler {
    pub fn new(mode: Mode, frame_size: usize) -> Self {
        Self {
            frame_size,
            scan: Scan::start(mode),
            address: 0,
            control: 0,
            length_low: 0,
            declared_len: 0,
            received: 0,
            committed: 0,
            pending: None,
            address_valid: true,
            fcs: Fcs::new(),
            payload: Vec::with_capacity(frame_size),
            stats: DecoderStats::default(),
        }
    }

    /// Switch wire mode or frame size, dropping any partial frame
    pub fn reconfigure(&mut self, mode: Mode, frame_size: usize) {
        self.frame_size = frame_size;
        self.payload = Vec::with_capacity(frame_size);
        self.scan = Scan::start(mode);
        self.reset_frame();
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Scan `bytes`, delivering every complete and valid frame to `sink`
    ///
    /// Returns the number of frames handed to the sink.
    pub fn feed(&mut self, bytes: &[u8], sink: &mut dyn FrameSink) -> usize {
        let mut dispatched = 0;
        for &byte in bytes {
            let complete = match self.scan {
                Scan::Basic(state) => {
                    let (next, complete) = self.step_basic(state, byte);
                    self.scan = Scan::Basic(next);
                    complete
                }
                Scan::Advanced(state) => {
                    let (next, complete) = self.step_advanced(state, byte);
                    self.scan = Scan::Advanced(next);
                    complete
                }
            };
            if complete {
                self.dispatch(sink);
                dispatched += 1;
            }
        }
        dispatched
    }

    fn reset_frame(&mut self) {
        self.address = 0;
        self.control = 0;
        self.length_low = 0;
        self.declared_len = 0;
        self.received = 0;
        self.committed = 0;
        self.pending = None;
        self.address_valid = true;
        self.fcs = Fcs::new();
        self.payload.clear();
    }

    /// Next state, and whether a validated frame is ready for dispatch
    fn step_basic(&mut self, state: BasicState, byte: u8) -> (BasicState, bool) {
        let next = match state {
            BasicState::SeekFlag => {
                if byte == BASIC_FLAG {
                    BasicState::Address
                } else {
                    self.stats.bytes_discarded += 1;
                    BasicState::SeekFlag
                }
            }
            // Repeated flags are idle fill
            BasicState::Address if byte == BASIC_FLAG => BasicState::Address,
            BasicState::Address => {
                self.reset_frame();
                if byte & ADDRESS_EA == 0 {
                    debug!("Dropping Basic frame with multi-byte address 0x{:02X}", byte);
                    self.stats.malformed_frames += 1;
                    return (BasicState::SeekFlag, false);
                }
                self.address = byte;
                self.fcs.update(byte);
                BasicState::Control
            }
            BasicState::Control => {
                self.control = byte;
                self.fcs.update(byte);
                BasicState::Length
            }
            BasicState::Length => {
                self.fcs.update(byte);
                if byte & LENGTH_EA != 0 {
                    self.declared_len = usize::from(byte >> 1);
                    self.after_length()
                } else {
                    self.length_low = byte;
                    BasicState::LengthHigh
                }
            }
            BasicState::LengthHigh => {
                self.fcs.update(byte);
                self.declared_len = usize::from(self.length_low >> 1) | (usize::from(byte) << 7);
                self.after_length()
            }
            BasicState::Payload => {
                self.store_payload(byte);
                if self.received == self.declared_len {
                    BasicState::Checksum
                } else {
                    BasicState::Payload
                }
            }
            BasicState::Checksum => {
                let expected = self.fcs.finish();
                if byte == expected {
                    BasicState::ClosingFlag
                } else {
                    debug!(
                        "Basic FCS mismatch on DLCI {}: expected 0x{:02X}, got 0x{:02X}",
                        channel_of(self.address),
                        expected,
                        byte
                    );
                    self.stats.checksum_errors += 1;
                    // A flag in the checksum slot still opens the next frame
                    if byte == BASIC_FLAG {
                        BasicState::Address
                    } else {
                        BasicState::SeekFlag
                    }
                }
            }
            BasicState::ClosingFlag => {
                if byte == BASIC_FLAG {
                    // This flag also opens the next frame
                    return (BasicState::Address, true);
                }
                debug!("Basic frame missing closing flag, got 0x{:02X}", byte);
                self.stats.malformed_frames += 1;
                BasicState::SeekFlag
            }
        };
        (next, false)
    }

    fn after_length(&self) -> BasicState {
        if self.declared_len == 0 {
            BasicState::Checksum
        } else {
            BasicState::Payload
        }
    }

    fn store_payload(&mut self, byte: u8) {
        if self.payload.len() < self.frame_size {
            self.payload.push(byte);
        }
        self.received += 1;
    }

    /// Next state, and whether a validated frame is ready for dispatch
    fn step_advanced(&mut self, state: AdvancedState, byte: u8) -> (AdvancedState, bool) {
        match state {
            AdvancedState::SeekFlag => {
                if byte == ADVANCED_FLAG {
                    self.reset_frame();
                    return (AdvancedState::Content, false);
                }
                self.stats.bytes_discarded += 1;
                (AdvancedState::SeekFlag, false)
            }
            AdvancedState::Content => match byte {
                ADVANCED_FLAG => {
                    let complete = self.close_advanced();
                    if !complete {
                        self.reset_frame();
                    }
                    (AdvancedState::Content, complete)
                }
                ADVANCED_ESCAPE => (AdvancedState::Escaped, false),
                _ => {
                    self.accept(byte);
                    (AdvancedState::Content, false)
                }
            },
            AdvancedState::Escaped => {
                if byte == ADVANCED_FLAG {
                    debug!("Advanced frame aborted by flag after escape");
                    self.stats.malformed_frames += 1;
                    self.reset_frame();
                } else {
                    self.accept(byte ^ ESCAPE_MASK);
                }
                (AdvancedState::Content, false)
            }
        }
    }

    /// Take one unescaped byte, committing the one before it
    fn accept(&mut self, byte: u8) {
        if let Some(previous) = self.pending.replace(byte) {
            self.commit(previous);
        }
    }

    fn commit(&mut self, byte: u8) {
        match self.committed {
            0 => {
                self.address = byte;
                self.address_valid = byte & ADDRESS_EA != 0;
                self.fcs.update(byte);
            }
            1 => {
                self.control = byte;
                self.fcs.update(byte);
            }
            _ => {
                // UIH checksums cover only address and control
                if self.control & !PF_BIT != FrameType::Data.base_code() {
                    self.fcs.update(byte);
                }
                self.store_payload(byte);
            }
        }
        self.committed += 1;
    }

    /// Validate the content seen since the opening flag
    fn close_advanced(&mut self) -> bool {
        let Some(received_fcs) = self.pending else {
            // Back-to-back flags
            return false;
        };
        if self.committed < 2 || !self.address_valid {
            debug!("Dropping short or malformed Advanced frame ({} bytes)", self.committed + 1);
            self.stats.malformed_frames += 1;
            return false;
        }
        let expected = self.fcs.finish();
        if received_fcs != expected {
            debug!(
                "Advanced FCS mismatch on DLCI {}: expected 0x{:02X}, got 0x{:02X}",
                channel_of(self.address),
                expected,
                received_fcs
            );
            self.stats.checksum_errors += 1;
            return false;
        }
        true
    }

    fn dispatch(&mut self, sink: &mut dyn FrameSink) {
        let channel = channel_of(self.address);
        let frame_type = self.control & !PF_BIT;
        if self.received > self.payload.len() {
            trace!(
                "Truncating {} byte payload on DLCI {} to {}",
                self.received,
                channel,
                self.payload.len()
            );
        }
        trace!(
            "Delivering frame DLCI {} type 0x{:02X} ({} bytes)",
            channel,
            frame_type,
            self.payload.len()
        );
        if sink.deliver(channel, frame_type, &self.payload) {
            self.stats.frames_delivered += 1;
        } else {
            warn!("Frame sink refused frame on DLCI {}", channel);
            self.stats.frames_rejected += 1;
        }
        self.reset_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmux::encoder::encode_frame;

    /// Collects every delivered frame
    #[derive(Default)]
    struct Collector {
        frames: Vec<(u8, u8, Vec<u8>)>,
        accept: bool,
    }

    impl Collector {
        fn new() -> Self {
            Self {
                frames: Vec::new(),
                accept: true,
            }
        }
    }

    impl FrameSink for Collector {
        fn deliver(&mut self, channel: u8, frame_type: u8, payload: &[u8]) -> bool {
            self.frames.push((channel, frame_type, payload.to_vec()));
            self.accept
        }
    }

    #[test]
    fn test_decode_basic_data() {
        let mut assembler = ReadAssembler::new(Mode::Basic, 31);
        let mut sink = Collector::new();

        let n = assembler.feed(&[0xF9, 0x07, 0xEF, 0x07, 0x12, 0x34, 0x56, 0xD3, 0xF9], &mut sink);

        assert_eq!(n, 1);
        assert_eq!(sink.frames, vec![(1, 0xEF, vec![0x12, 0x34, 0x56])]);
        assert_eq!(assembler.stats().frames_delivered, 1);
    }

    #[test]
    fn test_decode_basic_strips_pf() {
        let mut assembler = ReadAssembler::new(Mode::Basic, 31);
        let mut sink = Collector::new();

        assembler.feed(&[0xF9, 0x07, 0x3F, 0x01, 0xDE, 0xF9], &mut sink);

        assert_eq!(sink.frames, vec![(1, 0x2F, vec![])]);
    }

    #[test]
    fn test_decode_basic_joined_frames() {
        let mut assembler = ReadAssembler::new(Mode::Basic, 31);
        let mut sink = Collector::new();
        let stream = [
            0xF9, 0x07, 0xEF, 0x07, 0x12, 0x34, 0x56, 0xD3, 0xF9, 0x07, 0xEF, 0x07, 0x12, 0x34,
            0x56, 0xD3, 0xF9,
        ];

        assert_eq!(assembler.feed(&stream, &mut sink), 2);
        let joined: Vec<u8> = sink.frames.iter().flat_map(|f| f.2.clone()).collect();
        assert_eq!(joined, vec![0x12, 0x34, 0x56, 0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_decode_basic_split_across_reads() {
        let mut assembler = ReadAssembler::new(Mode::Basic, 31);
        let mut sink = Collector::new();
        let frame = [0xF9, 0x07, 0xEF, 0x07, 0x12, 0x34, 0x56, 0xD3, 0xF9];

        for chunk in frame.chunks(2) {
            assembler.feed(chunk, &mut sink);
        }

        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].2, vec![0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_decode_basic_payload_containing_flag() {
        let mut assembler = ReadAssembler::new(Mode::Basic, 31);
        let mut sink = Collector::new();
        let frame = encode_frame(Mode::Basic, 2, FrameType::Data, &[0xF9, 0xF9, 0x00], 31);

        assembler.feed(&frame, &mut sink);

        assert_eq!(sink.frames, vec![(2, 0xEF, vec![0xF9, 0xF9, 0x00])]);
    }

    #[test]
    fn test_decode_basic_bad_checksum_then_recovers() {
        let mut assembler = ReadAssembler::new(Mode::Basic, 31);
        let mut sink = Collector::new();
        let mut stream = vec![0xF9, 0x07, 0xEF, 0x07, 0x12, 0x34, 0x56, 0xD4, 0xF9];
        stream.extend_from_slice(&[0x07, 0xEF, 0x07, 0xAA, 0xBB, 0xCC, 0xD3, 0xF9]);

        assembler.feed(&stream, &mut sink);

        assert_eq!(sink.frames, vec![(1, 0xEF, vec![0xAA, 0xBB, 0xCC])]);
        assert_eq!(assembler.stats().checksum_errors, 1);
    }

    #[test]
    fn test_decode_basic_missing_closing_flag() {
        let mut assembler = ReadAssembler::new(Mode::Basic, 31);
        let mut sink = Collector::new();

        assembler.feed(&[0xF9, 0x07, 0xEF, 0x07, 0x12, 0x34, 0x56, 0xD3, 0x00], &mut sink);

        assert!(sink.frames.is_empty());
        assert_eq!(assembler.stats().malformed_frames, 1);
    }

    #[test]
    fn test_decode_basic_skips_leading_garbage() {
        let mut assembler = ReadAssembler::new(Mode::Basic, 31);
        let mut sink = Collector::new();

        assembler.feed(
            &[0x41, 0x54, 0x0D, 0xF9, 0xF9, 0x07, 0x53, 0x01, 0x3F, 0xF9],
            &mut sink,
        );

        assert_eq!(sink.frames, vec![(1, 0x43, vec![])]);
        assert_eq!(assembler.stats().bytes_discarded, 3);
    }

    #[test]
    fn test_decode_basic_truncates_to_frame_size() {
        let mut assembler = ReadAssembler::new(Mode::Basic, 2);
        let mut sink = Collector::new();

        // Sender used a larger N1 than ours
        let frame = encode_frame(Mode::Basic, 1, FrameType::Data, &[0x12, 0x34, 0x56], 31);
        assembler.feed(&frame, &mut sink);

        assert_eq!(sink.frames, vec![(1, 0xEF, vec![0x12, 0x34])]);
    }

    #[test]
    fn test_decode_basic_two_byte_length() {
        let mut assembler = ReadAssembler::new(Mode::Basic, 300);
        let mut sink = Collector::new();
        let payload: Vec<u8> = (0..200u16).map(|i| i as u8).collect();

        let frame = encode_frame(Mode::Basic, 5, FrameType::Data, &payload, 300);
        assembler.feed(&frame, &mut sink);

        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0].0, 5);
        assert_eq!(sink.frames[0].2, payload);
    }

    #[test]
    fn test_decode_advanced_unescapes() {
        let mut assembler = ReadAssembler::new(Mode::Advanced, 31);
        let mut sink = Collector::new();

        assembler.feed(
            &[0x7E, 0x07, 0xEF, 0x12, 0x34, 0x56, 0x7D, 0x5E, 0x78, 0x7D, 0x5D, 0x05, 0x7E],
            &mut sink,
        );

        assert_eq!(
            sink.frames,
            vec![(1, 0xEF, vec![0x12, 0x34, 0x56, 0x7E, 0x78, 0x7D])]
        );
    }

    #[test]
    fn test_decode_advanced_joined_and_idle_flags() {
        let mut assembler = ReadAssembler::new(Mode::Advanced, 31);
        let mut sink = Collector::new();
        let mut stream = vec![0x7E, 0x7E];
        stream.extend_from_slice(&[0x07, 0x3F, 0x89, 0x7E]);
        stream.extend_from_slice(&[0x07, 0xEF, 0x01, 0x05, 0x7E, 0x7E]);

        assert_eq!(assembler.feed(&stream, &mut sink), 2);
        assert_eq!(sink.frames[0], (1, 0x2F, vec![]));
        assert_eq!(sink.frames[1], (1, 0xEF, vec![0x01]));
        assert_eq!(assembler.stats().malformed_frames, 0);
    }

    #[test]
    fn test_decode_advanced_bad_checksum() {
        let mut assembler = ReadAssembler::new(Mode::Advanced, 31);
        let mut sink = Collector::new();

        assembler.feed(&[0x7E, 0x07, 0xEF, 0x12, 0x06, 0x7E], &mut sink);

        assert!(sink.frames.is_empty());
        assert_eq!(assembler.stats().checksum_errors, 1);
    }

    #[test]
    fn test_decode_advanced_aborted_escape() {
        let mut assembler = ReadAssembler::new(Mode::Advanced, 31);
        let mut sink = Collector::new();
        let mut stream = vec![0x7E, 0x07, 0xEF, 0x7D, 0x7E];
        stream.extend_from_slice(&[0x07, 0xEF, 0x12, 0x05, 0x7E]);

        assembler.feed(&stream, &mut sink);

        assert_eq!(sink.frames, vec![(1, 0xEF, vec![0x12])]);
        assert_eq!(assembler.stats().malformed_frames, 1);
    }

    #[test]
    fn test_decode_basic_multi_byte_address_resyncs() {
        let mut assembler = ReadAssembler::new(Mode::Basic, 31);
        let mut sink = Collector::new();

        assembler.feed(
            &[0xF9, 0x06, 0xEF, 0x01, 0x1C, 0xF9, 0x07, 0x3F, 0x01, 0xDE, 0xF9],
            &mut sink,
        );

        assert_eq!(sink.frames, vec![(1, 0x2F, vec![])]);
        assert_eq!(assembler.stats().malformed_frames, 1);
    }

    #[test]
    fn test_decode_advanced_short_and_bad_address_resync() {
        let mut assembler = ReadAssembler::new(Mode::Advanced, 31);
        let mut sink = Collector::new();
        // Two content bytes, then an address with EA clear, then a valid SABM
        let stream = [
            0x7E, 0x07, 0x05, 0x7E, 0x06, 0xEF, 0x05, 0x7E, 0x07, 0x3F, 0x89, 0x7E,
        ];

        assert_eq!(assembler.feed(&stream, &mut sink), 1);
        assert_eq!(sink.frames, vec![(1, 0x2F, vec![])]);
        assert_eq!(assembler.stats().malformed_frames, 2);
        assert_eq!(assembler.stats().checksum_errors, 0);
    }

    #[test]
    fn test_decode_advanced_escaped_fcs() {
        let mut assembler = ReadAssembler::new(Mode::Advanced, 31);
        let mut sink = Collector::new();

        let mut stream = encode_frame(Mode::Advanced, 40, FrameType::Establish, &[], 31);
        stream.extend(encode_frame(Mode::Advanced, 10, FrameType::Disconnect, &[], 31));
        assembler.feed(&stream, &mut sink);

        assert_eq!(sink.frames, vec![(40, 0x2F, vec![]), (10, 0x43, vec![])]);
        assert_eq!(assembler.stats().checksum_errors, 0);
    }

    #[test]
    fn test_decode_advanced_truncates_to_frame_size() {
        let mut assembler = ReadAssembler::new(Mode::Advanced, 2);
        let mut sink = Collector::new();
        let frame = encode_frame(Mode::Advanced, 1, FrameType::Data, &[0x12, 0x7E, 0x56], 31);

        assembler.feed(&frame, &mut sink);

        assert_eq!(sink.frames, vec![(1, 0xEF, vec![0x12, 0x7E])]);
    }

    #[test]
    fn test_rejected_delivery_is_counted() {
        let mut assembler = ReadAssembler::new(Mode::Basic, 31);
        let mut sink = Collector::new();
        sink.accept = false;

        assembler.feed(&[0xF9, 0x07, 0x53, 0x01, 0x3F, 0xF9], &mut sink);

        assert_eq!(sink.frames.len(), 1);
        assert_eq!(assembler.stats().frames_rejected, 1);
        assert_eq!(assembler.stats().frames_delivered, 0);
    }

    #[test]
    fn test_reconfigure_drops_partial_frame() {
        let mut assembler = ReadAssembler::new(Mode::Basic, 31);
        let mut sink = Collector::new();

        assembler.feed(&[0xF9, 0x07, 0xEF], &mut sink);
        assembler.reconfigure(Mode::Advanced, 31);
        assembler.feed(&[0x07, 0x01, 0xD3, 0xF9], &mut sink);

        assert!(sink.frames.is_empty());
    }
}
