//! Commitment checking for piece bytes, buffered or streamed.

use bytes::Bytes;
use futures::{FutureExt, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use synapse_core::{ByteStream, CommPError, CommPHasher, PieceCid, calculate};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, trace};

use crate::error::DownloadError;

/// Checks already-held `bytes` against `piece`.
pub fn validate(piece: &PieceCid, bytes: &[u8]) -> Result<(), DownloadError> {
    if bytes.len() as u64 != piece.raw_size() {
        return Err(DownloadError::CommitmentMismatch {
            expected: *piece,
            actual: calculate(bytes).ok(),
        });
    }
    let actual = calculate(bytes)?;
    if actual != *piece {
        return Err(DownloadError::CommitmentMismatch {
            expected: *piece,
            actual: Some(actual),
        });
    }
    Ok(())
}

/// Passes a piece stream through unchanged while computing its commitment.
///
/// Chunks are yielded as they arrive, so nothing yielded is trustworthy
/// until the stream ends with `None`. A stream that turns out to be the
/// wrong piece ends with a final [`DownloadError::CommitmentMismatch`]
/// instead; one that runs past the piece's size fails as soon as the excess
/// shows up. Cancelling the token fails the stream with
/// [`DownloadError::Cancelled`] at the next poll.
pub struct VerifiedStream {
    stream: ByteStream,
    hasher: CommPHasher,
    expected: PieceCid,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    done: bool,
}

impl VerifiedStream {
    pub fn new(
        stream: ByteStream,
        expected: PieceCid,
        cancel: CancellationToken,
    ) -> Result<Self, DownloadError> {
        Ok(Self {
            stream,
            hasher: CommPHasher::with_size_hint(expected.raw_size())?,
            expected,
            cancelled: Box::pin(cancel.cancelled_owned()),
            done: false,
        })
    }

    pub fn expected(&self) -> &PieceCid {
        &self.expected
    }

    pub fn bytes_verified(&self) -> u64 {
        self.hasher.bytes_written()
    }

    fn finish(&mut self) -> Option<DownloadError> {
        match self.hasher.finalize() {
            Ok(actual) if actual == self.expected => {
                trace!(piece = %self.expected, "piece stream verified");
                None
            }
            Ok(actual) => Some(DownloadError::CommitmentMismatch {
                expected: self.expected,
                actual: Some(actual),
            }),
            Err(CommPError::EmptyInput | CommPError::SizeMismatch { .. }) => {
                Some(DownloadError::CommitmentMismatch {
                    expected: self.expected,
                    actual: None,
                })
            }
            Err(err) => Some(err.into()),
        }
    }
}

impl Stream for VerifiedStream {
    type Item = Result<Bytes, DownloadError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }
        if this.cancelled.poll_unpin(cx).is_ready() {
            this.done = true;
            return Poll::Ready(Some(Err(DownloadError::Cancelled)));
        }

        match this.stream.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Err(err) = this.hasher.update(&chunk) {
                    this.done = true;
                    debug!(
                        piece = %this.expected,
                        received = this.hasher.bytes_written() + chunk.len() as u64,
                        "piece stream ran past its size: {err}"
                    );
                    return Poll::Ready(Some(Err(DownloadError::CommitmentMismatch {
                        expected: this.expected,
                        actual: None,
                    })));
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.done = true;
                Poll::Ready(Some(Err(DownloadError::Transport(err))))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(this.finish().map(Err))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for VerifiedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedStream")
            .field("expected", &self.expected)
            .field("bytes_verified", &self.hasher.bytes_written())
            .field("done", &self.done)
            .finish()
    }
}
