//! The piece retrieval seam.
//!
//! Every retrieval strategy (on-chain discovery, an off-chain index, the edge
//! cache, a fixed URL) implements [`PieceFinder`]. Strategies compose by
//! holding an `Arc<dyn PieceFinder>` to fall back to, so any layer can be
//! swapped for a test double.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::ErrorKind;
use crate::address::{Address, ClientAddress};
use crate::piece::PieceCid;

/// Chunks of a piece as they arrive from the winning location.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Per-call retrieval options, passed down through every finder layer.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    /// Try the edge cache before storage providers.
    pub with_cdn: bool,
    /// Only retrieve from this provider.
    pub provider: Option<Address>,
    /// Cancels discovery, racing and streaming.
    pub cancel: CancellationToken,
    /// Expected payload size, if known. Advisory only: finders forward it
    /// unchanged and never reject a response because of it. Size checks
    /// belong to whoever verifies the bytes.
    pub size_hint: Option<u64>,
}

impl RetrievalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cdn(mut self, enabled: bool) -> Self {
        self.with_cdn = enabled;
        self
    }

    pub fn with_provider(mut self, provider: Address) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    /// The same options with the edge cache disabled, for delegating after
    /// an edge attempt failed.
    pub fn without_cdn(&self) -> Self {
        Self {
            with_cdn: false,
            ..self.clone()
        }
    }
}

/// Why a single candidate location did not produce the piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    /// Human-readable name of the source (provider id, "cdn", ...).
    pub provider: String,
    pub url: String,
    pub reason: String,
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.provider, self.url, self.reason)
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum FinderError {
    #[error("retrieval cancelled")]
    Cancelled,
    #[error("no candidate locations: {reason}")]
    Discovery {
        reason: String,
        failures: Vec<CandidateFailure>,
    },
    #[error(
        "all {count} candidate locations failed{detail}",
        count = .failures.len(),
        detail = summarize(.failures)
    )]
    AllCandidatesFailed { failures: Vec<CandidateFailure> },
    #[error("invalid retrieval request: {0}")]
    Input(String),
}

fn summarize(failures: &[CandidateFailure]) -> String {
    match failures.first() {
        Some(first) if failures.len() == 1 => format!(": {first}"),
        Some(first) => format!(": {first} (and {} more)", failures.len() - 1),
        None => String::new(),
    }
}

impl FinderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FinderError::Cancelled => ErrorKind::Cancelled,
            FinderError::Discovery { .. } => ErrorKind::Discovery,
            FinderError::AllCandidatesFailed { .. } => ErrorKind::Transport,
            FinderError::Input(_) => ErrorKind::Input,
        }
    }

    pub fn discovery(reason: impl Into<String>) -> Self {
        FinderError::Discovery {
            reason: reason.into(),
            failures: Vec::new(),
        }
    }

    /// Per-candidate failures collected along the way, if any.
    pub fn failures(&self) -> &[CandidateFailure] {
        match self {
            FinderError::Discovery { failures, .. }
            | FinderError::AllCandidatesFailed { failures } => failures,
            FinderError::Cancelled | FinderError::Input(_) => &[],
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FinderError::Cancelled)
    }
}

/// Turns a commitment and a requesting client into a stream of the piece's
/// bytes.
///
/// Implementations do not verify the bytes; that is left to the caller.
#[async_trait]
pub trait PieceFinder: fmt::Debug + Send + Sync + 'static {
    async fn find(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
        options: RetrievalOptions,
    ) -> Result<ByteStream, FinderError>;
}

#[async_trait]
impl<T: PieceFinder + ?Sized> PieceFinder for Arc<T> {
    async fn find(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
        options: RetrievalOptions,
    ) -> Result<ByteStream, FinderError> {
        (**self).find(piece, client, options).await
    }
}

/// Runs `fut` unless `cancel` fires first.
///
/// A token that is already cancelled fails without polling `fut` at all.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, FinderError>
where
    F: Future<Output = Result<T, FinderError>>,
{
    if cancel.is_cancelled() {
        return Err(FinderError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FinderError::Cancelled),
        res = fut => res,
    }
}
