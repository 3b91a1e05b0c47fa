use synapse_core::{CommPError, ErrorKind, FinderError, PieceCid, PieceCidError};

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("invalid input: {0}")]
    Input(String),
    #[error("retrieval failed: {0}")]
    Retrieval(FinderError),
    #[error("piece stream failed: {0}")]
    Transport(#[source] std::io::Error),
    #[error(
        "piece commitment mismatch: expected {expected}, got {found}",
        found = describe(.actual)
    )]
    CommitmentMismatch {
        expected: PieceCid,
        /// `None` when the received bytes have no commitment at all (no
        /// bytes, or more than the piece can hold).
        actual: Option<PieceCid>,
    },
    #[error("download cancelled")]
    Cancelled,
}

fn describe(actual: &Option<PieceCid>) -> String {
    match actual {
        Some(piece) => piece.to_string(),
        None => "bytes of the wrong size".to_string(),
    }
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::Input(_) => ErrorKind::Input,
            DownloadError::Retrieval(err) => err.kind(),
            DownloadError::Transport(_) => ErrorKind::Transport,
            DownloadError::CommitmentMismatch { .. } => ErrorKind::CommitmentMismatch,
            DownloadError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<FinderError> for DownloadError {
    fn from(err: FinderError) -> Self {
        match err {
            FinderError::Cancelled => DownloadError::Cancelled,
            err => DownloadError::Retrieval(err),
        }
    }
}

impl From<PieceCidError> for DownloadError {
    fn from(err: PieceCidError) -> Self {
        DownloadError::Input(err.to_string())
    }
}

impl From<CommPError> for DownloadError {
    fn from(err: CommPError) -> Self {
        DownloadError::Input(err.to_string())
    }
}
