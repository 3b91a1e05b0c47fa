//! Piece commitments (CommP) and their CID encodings.
//!
//! A payload is zero-extended, FR32 padded (127 bytes in, 128 bytes out) and
//! hashed into a binary Merkle tree with SHA-256 truncated to 254 bits. The
//! root, tree height and padding amount together form a [`PieceCid`].

mod cid;
mod commp;
pub mod fr32;
mod node;
mod size;
pub mod tree;
pub(crate) mod varint;

pub use cid::{LegacyPieceCid, PieceCid, PieceCidError, PieceLink};
pub use commp::{CommPError, CommPHasher, calculate, calculate_from_reader};
pub use node::Node;
pub use size::{
    MAX_PADDED_SIZE, MAX_PAYLOAD_SIZE, MIN_PAYLOAD_SIZE, max_raw_size, padded_size_for, raw_size,
    zero_padded_size,
};

/// Tallest tree the calculator builds (`2^56` leaves of 32 bytes).
pub const MAX_HEIGHT: u8 = 56;

/// Every piece covers at least one padded quad (four leaves).
pub const MIN_HEIGHT: u8 = 2;
