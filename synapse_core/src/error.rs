//! Error classification shared across the workspace.

use crate::piece::{CommPError, PieceCidError};

/// Coarse category of a failure, stable across crates.
///
/// Callers that only need to decide between "fix the input", "try again
/// later" and "the data is bad" match on this instead of concrete variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed identifier, empty payload or other caller mistake.
    Input,
    /// Network or HTTP failure talking to a provider or the edge cache.
    Transport,
    /// No candidate location could be found for the piece.
    Discovery,
    /// Bytes were received but do not hash to the requested piece.
    CommitmentMismatch,
    /// The caller cancelled the operation.
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Input => "input",
            ErrorKind::Transport => "transport",
            ErrorKind::Discovery => "discovery",
            ErrorKind::CommitmentMismatch => "commitment mismatch",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

impl PieceCidError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Input
    }
}

impl CommPError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Input
    }
}
