//! Unsigned LEB128 varints as used by CIDs and multihashes.

use super::PieceCidError;

/// Multiformats caps varints at 9 bytes (63 bits of payload).
const MAX_VARINT_LEN: usize = 9;

pub(crate) fn encode(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Decodes one varint from the front of `bytes`, returning the value and the
/// remaining input. Non-minimal encodings are rejected.
pub(crate) fn decode(bytes: &[u8]) -> Result<(u64, &[u8]), PieceCidError> {
    let mut value: u64 = 0;
    for (i, byte) in bytes.iter().enumerate().take(MAX_VARINT_LEN) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            if *byte == 0 && i > 0 {
                return Err(PieceCidError::InvalidVarint);
            }
            return Ok((value, &bytes[i + 1..]));
        }
    }
    Err(PieceCidError::InvalidVarint)
}
