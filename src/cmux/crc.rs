//! # CRC-8 Frame Check Sequence
//!
//! Reflected CRC-8 used by GSM 07.10 / 27.010 framing.
//!
//! **Polynomial**: 0x07 (x^8 + x^2 + x + 1), processed LSB-first (reflected 0xE0)
//! **Initial Value**: 0xFF
//! **Final XOR**: 0xFF (the returned byte is ready to transmit)

/// Reflected CRC-8 polynomial
const CRC8_POLY_REFLECTED: u8 = 0xE0;

/// Initial register value
const CRC8_INIT: u8 = 0xFF;

/// Precomputed CRC8 lookup table for fast calculation
const CRC8_TABLE: [u8; 256] = generate_crc8_table();

/// Generate CRC8 lookup table at compile time
const fn generate_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x01) != 0 {
                crc = (crc >> 1) ^ CRC8_POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate the frame check sequence over `data`
///
/// The result is the one's complement of the final register, i.e. the byte
/// that goes on the wire. Callers must not invert it again.
///
/// # Examples
///
/// ```
/// use gsm_cmux::cmux::crc::compute_crc;
///
/// // Address 0x07 (DLCI 1), control 0x3F (SABM with P/F)
/// assert_eq!(compute_crc(&[0x07, 0x3F]), 0x89);
/// ```
pub fn compute_crc(data: &[u8]) -> u8 {
    let mut fcs = Fcs::new();
    fcs.update_slice(data);
    fcs.finish()
}

/// Running FCS register for byte-at-a-time decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fcs {
    register: u8,
}

impl Fcs {
    pub const fn new() -> Self {
        Self { register: CRC8_INIT }
    }

    #[inline]
    pub fn update(&mut self, byte: u8) {
        self.register = CRC8_TABLE[(self.register ^ byte) as usize];
    }

    pub fn update_slice(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    /// Transmittable checksum for everything fed so far
    pub fn finish(&self) -> u8 {
        !self.register
    }
}

impl Default for Fcs {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculate the checksum bit by bit (slow, for verifying the table)
#[allow(dead_code)]
fn compute_crc_slow(data: &[u8]) -> u8 {
    let mut crc: u8 = CRC8_INIT;

    for &byte in data {
        crc ^= byte;

        for _ in 0..8 {
            if (crc & 0x01) != 0 {
                crc = (crc >> 1) ^ CRC8_POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }

    !crc
}
