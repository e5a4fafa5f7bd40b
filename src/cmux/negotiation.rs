//! # AT+CMUX Negotiation
//!
//! Formats the command that switches the modem into multiplexed mode.

use super::protocol::Mode;

/// Speed code used when the port speed has no entry in the table (115200)
pub const DEFAULT_SPEED_CODE: u8 = 5;

/// Port speeds with a defined AT+CMUX `<port_speed>` code
const SPEED_CODES: &[(u32, u8)] = &[
    (9_600, 1),
    (19_200, 2),
    (38_400, 3),
    (57_600, 4),
    (115_200, 5),
    (230_400, 6),
];

/// AT+CMUX speed code for a port speed
///
/// Unlisted speeds fall back to the 115200 code.
pub fn speed_code(port_speed: u32) -> u8 {
    SPEED_CODES
        .iter()
        .find(|&&(speed, _)| speed == port_speed)
        .map_or(DEFAULT_SPEED_CODE, |&(_, code)| code)
}

/// Build `AT+CMUX=<mode>,0,<speed>,<frame_size>`
///
/// The subset operand is always 0 (UIH frames only).
///
/// # Examples
///
/// ```
/// use gsm_cmux::cmux::negotiation::cmux_command;
/// use gsm_cmux::cmux::protocol::Mode;
///
/// assert_eq!(cmux_command(Mode::Basic, 9600, 31), "AT+CMUX=0,0,1,31");
/// ```
pub fn cmux_command(mode: Mode, port_speed: u32, frame_size: usize) -> String {
    format!(
        "AT+CMUX={},0,{},{}",
        mode.code(),
        speed_code(port_speed),
        frame_size
    )
}
