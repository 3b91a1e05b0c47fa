use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use std::sync::Arc;
use synapse_core::{Address, ClientAddress, PieceCid, PieceFinder, RetrievalOptions};
use synapse_retrieval::{HttpConfig, ProviderClient, UrlFinder};
use tracing::{debug, info};
use url::Url;

use crate::error::DownloadError;
use crate::verify::VerifiedStream;

/// Upper bound on the buffer reserved up front from a piece's advertised size.
const MAX_PREALLOCATION: u64 = 64 << 20;

/// Client sent to finders that do not look at it.
const ANONYMOUS_CLIENT: ClientAddress = Address::from_bytes([0; 20]);

/// Retrieves pieces through a [`PieceFinder`] and checks every byte against
/// the requested commitment.
///
/// A mismatch is reported as [`DownloadError::CommitmentMismatch`] and never
/// retried: the finder already picked the best location it had.
#[derive(Debug, Clone)]
pub struct PieceDownloader {
    finder: Arc<dyn PieceFinder>,
}

impl PieceDownloader {
    pub fn new(finder: Arc<dyn PieceFinder>) -> Self {
        Self { finder }
    }

    /// Downloads from one known provider, skipping discovery.
    pub fn for_url(service_url: Url, client: ProviderClient) -> Self {
        Self::new(Arc::new(UrlFinder::new(service_url, client)))
    }

    pub fn finder(&self) -> &Arc<dyn PieceFinder> {
        &self.finder
    }

    /// Opens a verifying stream over the piece.
    pub async fn download_stream(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
        options: RetrievalOptions,
    ) -> Result<VerifiedStream, DownloadError> {
        let options = match options.size_hint {
            Some(_) => options,
            None => options.with_size_hint(piece.raw_size()),
        };
        let cancel = options.cancel.clone();
        let stream = self.finder.find(piece, client, options).await?;
        VerifiedStream::new(stream, *piece, cancel)
    }

    /// Downloads the whole piece into memory and verifies it.
    pub async fn download(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
        options: RetrievalOptions,
    ) -> Result<Bytes, DownloadError> {
        let mut stream = self.download_stream(piece, client, options).await?;
        let mut buf = BytesMut::with_capacity(piece.raw_size().min(MAX_PREALLOCATION) as usize);
        while let Some(chunk) = stream.try_next().await? {
            buf.extend_from_slice(&chunk);
        }
        info!(%piece, bytes = buf.len(), "piece downloaded and verified");
        Ok(buf.freeze())
    }

    /// Parses `piece` and downloads it.
    ///
    /// A malformed identifier fails with [`DownloadError::Input`] before the
    /// finder is asked anything.
    pub async fn parse_and_download(
        &self,
        piece: &str,
        client: &ClientAddress,
        options: RetrievalOptions,
    ) -> Result<Bytes, DownloadError> {
        let piece = PieceCid::parse(piece.trim()).map_err(|err| {
            debug!("rejecting piece identifier {piece:?}: {err}");
            DownloadError::from(err)
        })?;
        self.download(&piece, client, options).await
    }
}

/// Downloads `piece` straight from a provider's service url and verifies it.
pub async fn download_from_url(
    service_url: Url,
    piece: &PieceCid,
    options: RetrievalOptions,
) -> Result<Bytes, DownloadError> {
    let client = ProviderClient::new(&HttpConfig::default())
        .map_err(|err| DownloadError::Transport(std::io::Error::other(err)))?;
    PieceDownloader::for_url(service_url, client)
        .download(piece, &ANONYMOUS_CLIENT, options)
        .await
}
