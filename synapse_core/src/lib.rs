//! Core Synapse types: piece commitments and the retrieval seam.
//!
//! ## Piece commitments
//!
//! [`piece`] computes the Filecoin piece commitment (CommP) of a byte stream
//! incrementally and encodes it as a [`PieceCid`] (FRC-0069 PieceCID v2).
//! The legacy CommP v1 CID ([`LegacyPieceCid`]) can still be parsed and
//! produced on request.
//!
//! These encodings are wire formats: they are what storage providers, the
//! edge cache and the chain agree on, so changes to them are protocol
//! changes.
//!
//! ## Retrieval
//!
//! [`PieceFinder`] is the single-method trait every retrieval strategy
//! implements. The strategies themselves live in `synapse_retrieval`; the
//! verifying download path lives in `synapse_download`.

pub mod address;
pub mod error;
pub mod finder;
pub mod piece;

// Test utilities (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

pub use address::{Address, AddressError, ClientAddress};
pub use error::ErrorKind;
pub use finder::{
    ByteStream, CandidateFailure, FinderError, PieceFinder, RetrievalOptions, cancellable,
};
pub use piece::{
    CommPError, CommPHasher, LegacyPieceCid, PieceCid, PieceCidError, PieceLink, calculate,
    raw_size,
};
