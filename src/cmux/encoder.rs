//! # CMUX Frame Encoder
//!
//! Builds complete Basic or Advanced option frames ready for the transport.

use super::crc::Fcs;
use super::protocol::*;

/// Encode one frame for the given wire mode
///
/// The payload is truncated to `frame_size` bytes before framing.
///
/// # Arguments
///
/// * `mode` - Basic (0xF9, length field) or Advanced (0x7E, byte stuffing)
/// * `channel` - DLCI placed in the address byte (0 for multiplexer control)
/// * `frame_type` - Establish, Disconnect or Data
/// * `payload` - Information field
/// * `frame_size` - Maximum payload bytes per frame
///
/// # Examples
///
/// ```
/// use gsm_cmux::cmux::encoder::encode_frame;
/// use gsm_cmux::cmux::protocol::{FrameType, Mode};
///
/// let frame = encode_frame(Mode::Basic, 1, FrameType::Establish, &[], 31);
/// assert_eq!(frame, vec![0xF9, 0x07, 0x3F, 0x01, 0xDE, 0xF9]);
/// ```
pub fn encode_frame(
    mode: Mode,
    channel: u8,
    frame_type: FrameType,
    payload: &[u8],
    frame_size: usize,
) -> Vec<u8> {
    let payload = &payload[..payload.len().min(frame_size)];
    match mode {
        Mode::Basic => encode_basic(channel, frame_type, payload),
        Mode::Advanced => encode_advanced(channel, frame_type, payload),
    }
}

/// Basic option: F9 ADDR CTRL LEN PAYLOAD FCS F9, payload outside the FCS
fn encode_basic(channel: u8, frame_type: FrameType, payload: &[u8]) -> Vec<u8> {
    let mut header = Vec::with_capacity(4);
    header.push(address_byte(channel));
    header.push(frame_type.control());
    push_length(&mut header, payload.len());

    let mut fcs = Fcs::new();
    fcs.update_slice(&header);

    let mut frame = Vec::with_capacity(header.len() + payload.len() + 3);
    frame.push(BASIC_FLAG);
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    frame.push(fcs.finish());
    frame.push(BASIC_FLAG);
    frame
}

/// Advanced option: 7E ESC(ADDR CTRL PAYLOAD FCS) 7E
///
/// UIH frames checksum the address and control only; other frames also cover
/// the information field.
fn encode_advanced(channel: u8, frame_type: FrameType, payload: &[u8]) -> Vec<u8> {
    let address = address_byte(channel);
    let control = frame_type.control();

    let mut fcs = Fcs::new();
    fcs.update(address);
    fcs.update(control);
    if frame_type != FrameType::Data {
        fcs.update_slice(payload);
    }

    let mut frame = Vec::with_capacity(2 * (payload.len() + 3) + 2);
    frame.push(ADVANCED_FLAG);
    escape_into(&mut frame, &[address, control]);
    escape_into(&mut frame, payload);
    escape_into(&mut frame, &[fcs.finish()]);
    frame.push(ADVANCED_FLAG);
    frame
}

/// Append the length field: one byte up to 127, two bytes above
fn push_length(out: &mut Vec<u8>, len: usize) {
    if len <= SHORT_LENGTH_MAX {
        out.push(((len as u8) << 1) | LENGTH_EA);
    } else {
        out.push(((len & 0x7F) as u8) << 1);
        out.push((len >> 7) as u8);
    }
}

/// Byte-stuff `data` onto `out`, replacing 0x7E and 0x7D with 0x7D, byte ^ 0x20
pub fn escape_into(out: &mut Vec<u8>, data: &[u8]) {
    for &byte in data {
        match byte {
            ADVANCED_FLAG | ADVANCED_ESCAPE => {
                out.push(ADVANCED_ESCAPE);
                out.push(byte ^ ESCAPE_MASK);
            }
            _ => out.push(byte),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_basic_establish() {
        let frame = encode_frame(Mode::Basic, 1, FrameType::Establish, &[], 31);
        assert_eq!(frame, vec![0xF9, 0x07, 0x3F, 0x01, 0xDE, 0xF9]);
    }

    #[test]
    fn test_encode_basic_disconnect() {
        let frame = encode_frame(Mode::Basic, 1, FrameType::Disconnect, &[], 31);
        assert_eq!(frame, vec![0xF9, 0x07, 0x53, 0x01, 0x3F, 0xF9]);
    }

    #[test]
    fn test_encode_basic_data() {
        let frame = encode_frame(Mode::Basic, 1, FrameType::Data, &[0x12, 0x34, 0x56], 31);
        assert_eq!(
            frame,
            vec![0xF9, 0x07, 0xEF, 0x07, 0x12, 0x34, 0x56, 0xD3, 0xF9]
        );
    }

    #[test]
    fn test_encode_basic_close_down() {
        let frame = encode_frame(
            Mode::Basic,
            CONTROL_CHANNEL,
            FrameType::Data,
            &CLOSE_DOWN_PAYLOAD,
            31,
        );
        assert_eq!(frame, vec![0xF9, 0x03, 0xEF, 0x05, 0xC3, 0x01, 0xF2, 0xF9]);
    }

    #[test]
    fn test_encode_basic_truncates_payload() {
        let frame = encode_frame(Mode::Basic, 1, FrameType::Data, &[0x12, 0x34, 0x56], 2);
        // Length 2 -> 0x05, FCS over 07 EF 05
        assert_eq!(frame, vec![0xF9, 0x07, 0xEF, 0x05, 0x12, 0x34, 0x30, 0xF9]);
    }

    #[test]
    fn test_encode_basic_two_byte_length() {
        let payload = vec![0xAA; 128];
        let frame = encode_frame(Mode::Basic, 1, FrameType::Data, &payload, 200);

        assert_eq!(&frame[..5], &[0xF9, 0x07, 0xEF, 0x00, 0x01]);
        assert_eq!(frame.len(), 1 + 4 + 128 + 2);
        assert_eq!(frame[frame.len() - 2], 0x9D);
        assert_eq!(frame[frame.len() - 1], 0xF9);
    }

    #[test]
    fn test_encode_advanced_data_with_escapes() {
        let frame = encode_frame(
            Mode::Advanced,
            1,
            FrameType::Data,
            &[0x12, 0x34, 0x56, 0x7E, 0x78, 0x7D],
            31,
        );
        assert_eq!(
            frame,
            vec![0x7E, 0x07, 0xEF, 0x12, 0x34, 0x56, 0x7D, 0x5E, 0x78, 0x7D, 0x5D, 0x05, 0x7E]
        );
    }

    #[test]
    fn test_encode_advanced_establish() {
        let frame = encode_frame(Mode::Advanced, 1, FrameType::Establish, &[], 31);
        assert_eq!(frame, vec![0x7E, 0x07, 0x3F, 0x89, 0x7E]);
    }

    #[test]
    fn test_encode_advanced_truncates_payload() {
        let frame = encode_frame(Mode::Advanced, 1, FrameType::Data, &[0x12, 0x34, 0x56], 1);
        assert_eq!(frame, vec![0x7E, 0x07, 0xEF, 0x12, 0x05, 0x7E]);
    }

    #[test]
    fn test_escape_into() {
        let mut out = Vec::new();
        escape_into(&mut out, &[0x7E, 0x00, 0x7D, 0x5E]);
        assert_eq!(out, vec![0x7D, 0x5E, 0x00, 0x7D, 0x5D, 0x5E]);
    }

    #[test]
    fn test_escape_fcs_flag_byte() {
        // crc8(A3, 3F) == 0x7E
        let frame = encode_frame(Mode::Advanced, 40, FrameType::Establish, &[], 31);
        assert_eq!(frame, vec![0x7E, 0xA3, 0x3F, 0x7D, 0x5E, 0x7E]);
    }

    #[test]
    fn test_escape_fcs_escape_byte() {
        // crc8(2B, 53) == 0x7D
        let frame = encode_frame(Mode::Advanced, 10, FrameType::Disconnect, &[], 31);
        assert_eq!(frame, vec![0x7E, 0x2B, 0x53, 0x7D, 0x5D, 0x7E]);
    }
}
