//! Verified piece downloads.
//!
//! [`PieceDownloader`] asks a [`PieceFinder`](synapse_core::PieceFinder) for
//! a piece and runs every byte through the CommP calculator on the way out.
//! Bytes that do not hash to the requested [`PieceCid`](synapse_core::PieceCid)
//! are rejected with [`DownloadError::CommitmentMismatch`], however the finder
//! found them.
//!
//! ```ignore
//! let engine = RetrievalEngine::builder(config)
//!     .directory(directory)
//!     .data_sets(data_sets)
//!     .build()?;
//! let downloader = PieceDownloader::new(Arc::new(engine));
//! let bytes = downloader.download(&piece, &client, RetrievalOptions::new()).await?;
//! ```

mod downloader;
mod error;
mod verify;

pub use downloader::{PieceDownloader, download_from_url};
pub use error::DownloadError;
pub use verify::{VerifiedStream, validate};
