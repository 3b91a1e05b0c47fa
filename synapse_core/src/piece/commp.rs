//! Streaming CommP calculator.
//!
//! Bytes are consumed one 127-byte quad at a time: each full quad is FR32
//! padded into four leaves and pushed onto a [`PendingStack`]. State is one
//! partial quad plus one pending node per tree level, independent of how
//! much has been written.

use std::io::{self, Read, Write};

use super::fr32::{PADDED_QUAD_SIZE, QUAD_SIZE, pad_quad};
use super::size::{MAX_PAYLOAD_SIZE, height_for_padded_size, max_raw_size, padded_size_for};
use super::tree::PendingStack;
use super::{Node, PieceCid};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommPError {
    #[error("cannot compute a piece commitment over empty input")]
    EmptyInput,
    #[error(
        "input of {0} bytes exceeds the maximum piece payload of {max} bytes",
        max = MAX_PAYLOAD_SIZE
    )]
    TooLarge(u64),
    #[error("expected {expected} bytes of input, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
}

/// Incremental piece commitment hasher.
///
/// Feed it any chunking of the payload; the resulting [`PieceCid`] only
/// depends on the concatenated bytes.
///
/// ```
/// use synapse_core::piece::{CommPHasher, calculate};
///
/// let data = b"Hello, Filecoin Synapse!";
/// let mut hasher = CommPHasher::new();
/// for chunk in data.chunks(5) {
///     hasher.update(chunk).unwrap();
/// }
/// assert_eq!(hasher.finalize().unwrap(), calculate(data).unwrap());
/// ```
#[derive(Clone)]
pub struct CommPHasher {
    quad: [u8; QUAD_SIZE],
    quad_len: usize,
    bytes_written: u64,
    expected_size: Option<u64>,
    stack: PendingStack,
}

impl std::fmt::Debug for CommPHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommPHasher")
            .field("bytes_written", &self.bytes_written)
            .field("expected_size", &self.expected_size)
            .field("leaves", &self.stack.leaves())
            .finish()
    }
}

impl Default for CommPHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl CommPHasher {
    /// Hasher for a payload of unknown length.
    pub fn new() -> Self {
        Self {
            quad: [0u8; QUAD_SIZE],
            quad_len: 0,
            bytes_written: 0,
            expected_size: None,
            stack: PendingStack::new(),
        }
    }

    /// Hasher for a payload whose length is known up front. Writing more
    /// than `size` bytes fails immediately, and finalizing after fewer fails.
    pub fn with_size_hint(size: u64) -> Result<Self, CommPError> {
        if size == 0 {
            return Err(CommPError::EmptyInput);
        }
        if size > MAX_PAYLOAD_SIZE {
            return Err(CommPError::TooLarge(size));
        }
        Ok(Self {
            expected_size: Some(size),
            ..Self::new()
        })
    }

    /// Number of payload bytes consumed so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Consumes the next chunk of payload.
    pub fn update(&mut self, mut data: &[u8]) -> Result<(), CommPError> {
        let total = self.bytes_written.saturating_add(data.len() as u64);
        if let Some(expected) = self.expected_size {
            if total > expected {
                return Err(CommPError::SizeMismatch {
                    expected,
                    actual: total,
                });
            }
        }
        if total > MAX_PAYLOAD_SIZE {
            return Err(CommPError::TooLarge(total));
        }

        while !data.is_empty() {
            let take = (QUAD_SIZE - self.quad_len).min(data.len());
            self.quad[self.quad_len..self.quad_len + take].copy_from_slice(&data[..take]);
            self.quad_len += take;
            data = &data[take..];

            if self.quad_len == QUAD_SIZE {
                push_quad(&mut self.stack, &self.quad);
                self.quad_len = 0;
            }
        }
        self.bytes_written = total;
        Ok(())
    }

    /// Completes the tree and returns the piece CID.
    ///
    /// Takes `&self` so a caller can keep hashing after peeking at an
    /// intermediate commitment.
    pub fn finalize(&self) -> Result<PieceCid, CommPError> {
        if self.bytes_written == 0 {
            return Err(CommPError::EmptyInput);
        }
        if let Some(expected) = self.expected_size {
            if expected != self.bytes_written {
                return Err(CommPError::SizeMismatch {
                    expected,
                    actual: self.bytes_written,
                });
            }
        }

        let padded_size =
            padded_size_for(self.bytes_written).ok_or(CommPError::TooLarge(self.bytes_written))?;
        let height = height_for_padded_size(padded_size);
        let padding = max_raw_size(padded_size) - self.bytes_written;

        let mut stack = self.stack;
        if self.quad_len > 0 {
            let mut quad = [0u8; QUAD_SIZE];
            quad[..self.quad_len].copy_from_slice(&self.quad[..self.quad_len]);
            push_quad(&mut stack, &quad);
        }

        // Whole zero quads between the payload and the padded size pad to zero
        // leaves, which the fold supplies as zero commitments.
        let root = stack
            .root(height)
            .ok_or(CommPError::TooLarge(self.bytes_written))?;

        tracing::trace!(
            bytes = self.bytes_written,
            height,
            padding,
            root = %root.fmt_short(),
            "computed piece commitment"
        );
        PieceCid::new(root, height, padding).map_err(|_| CommPError::TooLarge(self.bytes_written))
    }
}

fn push_quad(stack: &mut PendingStack, quad: &[u8; QUAD_SIZE]) {
    let mut padded = [0u8; PADDED_QUAD_SIZE];
    pad_quad(quad, &mut padded);
    for leaf in padded.chunks_exact(Node::SIZE) {
        let mut bytes = [0u8; Node::SIZE];
        bytes.copy_from_slice(leaf);
        // The payload limit checked in `update` keeps the leaf count in range.
        let pushed = stack.push(Node::from_bytes(bytes));
        debug_assert!(pushed);
    }
}

impl Write for CommPHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Computes the piece CID of an in-memory payload.
pub fn calculate(data: impl AsRef<[u8]>) -> Result<PieceCid, CommPError> {
    let data = data.as_ref();
    let mut hasher = CommPHasher::with_size_hint(data.len() as u64)?;
    hasher.update(data)?;
    hasher.finalize()
}

/// Computes the piece CID of everything `read` yields, reporting the running
/// byte count to `progress` after every read.
pub fn calculate_from_reader(
    read: impl Read,
    progress: impl Fn(u64) -> io::Result<()>,
) -> io::Result<PieceCid> {
    struct ProgressWriter<F> {
        inner: CommPHasher,
        progress: F,
    }

    impl<F: Fn(u64) -> io::Result<()>> Write for ProgressWriter<F> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = self.inner.write(buf)?;
            (self.progress)(self.inner.bytes_written())?;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let mut reader = read;
    let mut writer = ProgressWriter {
        inner: CommPHasher::new(),
        progress,
    };
    io::copy(&mut reader, &mut writer)?;
    writer
        .inner
        .finalize()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
}
