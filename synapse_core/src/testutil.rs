//! Test doubles for [`PieceFinder`] implementations and their callers.
//!
//! # Usage
//!
//! In your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! synapse_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! ```ignore
//! use synapse_core::testutil::StaticFinder;
//!
//! let finder = StaticFinder::new(b"Hello, Filecoin Synapse!".to_vec()).with_chunk_size(5);
//! let stream = finder.find(&piece, &client, RetrievalOptions::new()).await?;
//! assert_eq!(finder.calls().len(), 1);
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::io;
use std::sync::{Arc, Mutex};

use crate::address::ClientAddress;
use crate::finder::{ByteStream, FinderError, PieceFinder, RetrievalOptions, cancellable};
use crate::piece::PieceCid;

/// Splits `data` into a stream of `chunk_size`-byte chunks.
pub fn chunked_stream(data: impl Into<Bytes>, chunk_size: usize) -> ByteStream {
    let data: Bytes = data.into();
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<io::Result<Bytes>> = (0..data.len())
        .step_by(chunk_size)
        .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
        .collect();
    futures::stream::iter(chunks).boxed()
}

/// A stream that yields `data` and then fails with `error`.
pub fn failing_stream(data: impl Into<Bytes>, error: io::ErrorKind) -> ByteStream {
    let chunks = vec![Ok(data.into()), Err(io::Error::new(error, "stream interrupted"))];
    futures::stream::iter(chunks).boxed()
}

/// One recorded `find` call.
#[derive(Debug, Clone)]
pub struct FindCall {
    pub piece: PieceCid,
    pub client: ClientAddress,
    pub with_cdn: bool,
    pub size_hint: Option<u64>,
}

#[derive(Debug, Default)]
struct CallLog(Mutex<Vec<FindCall>>);

impl CallLog {
    fn record(&self, piece: &PieceCid, client: &ClientAddress, options: &RetrievalOptions) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(FindCall {
                piece: *piece,
                client: *client,
                with_cdn: options.with_cdn,
                size_hint: options.size_hint,
            });
        }
    }

    fn snapshot(&self) -> Vec<FindCall> {
        self.0.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

/// Serves the same bytes for every request, in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct StaticFinder {
    data: Bytes,
    chunk_size: usize,
    calls: Arc<CallLog>,
}

impl StaticFinder {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            chunk_size: 64 * 1024,
            calls: Arc::default(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Every `find` call seen so far, in order.
    pub fn calls(&self) -> Vec<FindCall> {
        self.calls.snapshot()
    }
}

#[async_trait]
impl PieceFinder for StaticFinder {
    async fn find(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
        options: RetrievalOptions,
    ) -> Result<ByteStream, FinderError> {
        self.calls.record(piece, client, &options);
        if options.cancel.is_cancelled() {
            return Err(FinderError::Cancelled);
        }
        Ok(chunked_stream(self.data.clone(), self.chunk_size))
    }
}

/// Fails every request with a clone of the configured error.
#[derive(Debug, Clone)]
pub struct FailingFinder {
    error: FinderError,
    calls: Arc<CallLog>,
}

impl FailingFinder {
    pub fn new(error: FinderError) -> Self {
        Self {
            error,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<FindCall> {
        self.calls.snapshot()
    }
}

#[async_trait]
impl PieceFinder for FailingFinder {
    async fn find(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
        options: RetrievalOptions,
    ) -> Result<ByteStream, FinderError> {
        self.calls.record(piece, client, &options);
        Err(self.error.clone())
    }
}

/// Never produces a stream; only returns once the request is cancelled.
#[derive(Debug, Clone, Default)]
pub struct PendingFinder {
    calls: Arc<CallLog>,
}

impl PendingFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<FindCall> {
        self.calls.snapshot()
    }
}

#[async_trait]
impl PieceFinder for PendingFinder {
    async fn find(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
        options: RetrievalOptions,
    ) -> Result<ByteStream, FinderError> {
        self.calls.record(piece, client, &options);
        cancellable(&options.cancel, futures::future::pending()).await
    }
}
