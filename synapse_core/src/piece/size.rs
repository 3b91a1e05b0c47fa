//! Size arithmetic between raw payloads and padded pieces.

use super::fr32::{PADDED_QUAD_SIZE, QUAD_SIZE};
use super::{MAX_HEIGHT, Node, PieceCid};

/// Payloads shorter than this are zero-extended to it before padding, so the
/// smallest piece is one full quad (128 padded bytes, height 2).
pub const MIN_PAYLOAD_SIZE: u64 = 65;

/// Largest padded piece the calculator will build.
pub const MAX_PADDED_SIZE: u64 = (Node::SIZE as u64) << MAX_HEIGHT;

/// Largest payload the calculator accepts.
pub const MAX_PAYLOAD_SIZE: u64 = max_raw_size(MAX_PADDED_SIZE);

/// Payload capacity of a padded size: 127 payload bytes per 128 padded bytes.
pub const fn max_raw_size(padded_size: u64) -> u64 {
    padded_size - padded_size / PADDED_QUAD_SIZE as u64
}

/// Size of the padded tree built over a payload of `len` bytes.
///
/// This is the smallest power of two `P >= 128` with `max_raw_size(P) >= len`.
/// Returns `None` if `len` exceeds [`MAX_PAYLOAD_SIZE`].
pub fn padded_size_for(len: u64) -> Option<u64> {
    if len > MAX_PAYLOAD_SIZE {
        return None;
    }
    let quads = len.max(MIN_PAYLOAD_SIZE).div_ceil(QUAD_SIZE as u64);
    Some((quads * PADDED_QUAD_SIZE as u64).next_power_of_two())
}

/// Size a payload of `len` bytes is zero-extended to before FR32 padding.
pub fn zero_padded_size(len: u64) -> Option<u64> {
    padded_size_for(len).map(max_raw_size)
}

/// Tree height for a padded size (which must be a power of two of at least 32).
pub fn height_for_padded_size(padded_size: u64) -> u8 {
    (padded_size.trailing_zeros() - Node::SIZE.trailing_zeros()) as u8
}

/// Raw payload size recorded in a piece CID.
///
/// Only the encoded height and padding are used; the original bytes are not
/// needed.
pub fn raw_size(piece: &PieceCid) -> u64 {
    max_raw_size(piece.padded_size()) - piece.padding()
}
