//! HTTP client for storage provider piece retrieval.
//!
//! Providers answer two requests:
//!
//! - `GET {service}/pdp/piece?name=sha2-256-trunc254-padded&hash={root}&size={raw}`
//!   answers 200 with `{"pieceCid": "..."}` if the piece is held, 404 if not.
//! - `GET {service}/piece/{piece_cid}` streams the piece's raw bytes.

use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use synapse_core::{ByteStream, PieceCid, PieceLink};
use tracing::debug;
use url::Url;

use crate::config::HttpConfig;

/// Multihash name providers index piece roots under.
const PROBE_HASH_NAME: &str = "sha2-256-trunc254-padded";

/// Why a single request to a candidate did not yield a usable stream.
#[derive(thiserror::Error, Debug)]
pub enum AttemptError {
    #[error("piece not found")]
    NotFound,
    #[error("payment required")]
    PaymentRequired,
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("empty response body")]
    EmptyBody,
    #[error("provider reported a different piece: {0}")]
    ProbeMismatch(String),
    #[error("invalid probe response: {0}")]
    InvalidResponse(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProbeResponse {
    piece_cid: String,
}

#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
}

impl ProviderClient {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self::from_client(builder.build()?))
    }

    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn probe_url(service_url: &Url, piece: &PieceCid) -> Result<Url, url::ParseError> {
        let mut url = service_path(service_url, "pdp/piece")?;
        url.query_pairs_mut()
            .append_pair("name", PROBE_HASH_NAME)
            .append_pair("hash", &piece.root().to_hex())
            .append_pair("size", &piece.raw_size().to_string());
        Ok(url)
    }

    pub fn piece_url(service_url: &Url, piece: &PieceCid) -> Result<Url, url::ParseError> {
        service_path(service_url, &format!("piece/{piece}"))
    }

    /// Asks the provider whether it holds `piece`.
    pub async fn probe(&self, service_url: &Url, piece: &PieceCid) -> Result<(), AttemptError> {
        let url = Self::probe_url(service_url, piece)?;
        let res = self.http.get(url).send().await?;
        check_status(res.status())?;

        let body: ProbeResponse = res
            .json()
            .await
            .map_err(|err| AttemptError::InvalidResponse(err.to_string()))?;
        let reported = PieceLink::parse(&body.piece_cid)
            .map_err(|err| AttemptError::InvalidResponse(err.to_string()))?;
        if !reported.matches(piece) {
            return Err(AttemptError::ProbeMismatch(body.piece_cid));
        }
        Ok(())
    }

    /// Probes the provider, then opens the piece download.
    pub async fn fetch(
        &self,
        service_url: &Url,
        piece: &PieceCid,
    ) -> Result<ByteStream, AttemptError> {
        self.probe(service_url, piece).await?;
        self.get_stream(Self::piece_url(service_url, piece)?).await
    }

    /// GETs `url` and returns its body as a stream.
    ///
    /// The first non-empty chunk is read before returning, so a success
    /// status with an empty body counts as a failure.
    pub async fn get_stream(&self, url: Url) -> Result<ByteStream, AttemptError> {
        let res = self.http.get(url.clone()).send().await?;
        check_status(res.status())?;

        let mut body = res.bytes_stream();
        let first = loop {
            match body.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => break chunk,
                Some(Err(err)) => return Err(err.into()),
                None => return Err(AttemptError::EmptyBody),
            }
        };
        debug!(%url, first_chunk = first.len(), "response body started");

        let rest = body.map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(futures::stream::once(async move { Ok(first) })
            .chain(rest)
            .boxed())
    }
}

fn check_status(status: StatusCode) -> Result<(), AttemptError> {
    match status {
        status if status.is_success() => Ok(()),
        StatusCode::NOT_FOUND => Err(AttemptError::NotFound),
        StatusCode::PAYMENT_REQUIRED => Err(AttemptError::PaymentRequired),
        status => Err(AttemptError::Status(status)),
    }
}

/// `service_url` with `path` appended, whether or not it ends in a slash.
fn service_path(service_url: &Url, path: &str) -> Result<Url, url::ParseError> {
    let base = service_url.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/{path}"))
}
