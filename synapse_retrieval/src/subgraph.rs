//! Discovery through an off-chain piece index.
//!
//! The index answers "which data sets hold this piece for this client"
//! directly, so it narrows the race to the providers that actually hold the
//! piece. Anything that goes wrong here (index errors, no candidates, every
//! candidate failing) falls through to the next finder, usually
//! [`ChainFinder`](crate::ChainFinder).

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use synapse_core::{
    ByteStream, ClientAddress, FinderError, PieceCid, PieceFinder, RetrievalOptions, cancellable,
};
use tracing::debug;
use url::Url;

use crate::collaborators::{
    DataSetInfo, PieceIndex, ProviderDirectory, ProviderId, resolve_candidates,
};
use crate::provider::ProviderClient;
use crate::race::{Candidate, DiscoveryMethod, race};

#[derive(Debug, Clone)]
pub struct SubgraphFinder {
    index: Arc<dyn PieceIndex>,
    directory: Arc<dyn ProviderDirectory>,
    client: ProviderClient,
    next: Option<Arc<dyn PieceFinder>>,
}

impl SubgraphFinder {
    pub fn new(
        index: Arc<dyn PieceIndex>,
        directory: Arc<dyn ProviderDirectory>,
        client: ProviderClient,
    ) -> Self {
        Self {
            index,
            directory,
            client,
            next: None,
        }
    }

    pub fn with_fallback(mut self, next: Arc<dyn PieceFinder>) -> Self {
        self.next = Some(next);
        self
    }

    async fn discover(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
        options: &RetrievalOptions,
    ) -> Result<Vec<Candidate>, FinderError> {
        let lookup = async {
            let preferred = match options.provider {
                Some(address) => Some(
                    self.directory
                        .provider_id_for_address(&address)
                        .await?
                        .ok_or_else(|| anyhow!("provider {address} is not registered"))?,
                ),
                None => None,
            };
            let data_sets = self
                .index
                .data_sets_for_piece(piece, client)
                .await
                .context("piece index lookup failed")?;
            resolve_candidates(
                self.directory.as_ref(),
                &data_sets,
                preferred,
                DiscoveryMethod::Subgraph,
            )
            .await
        };
        let candidates = lookup
            .await
            .map_err(|err: anyhow::Error| FinderError::discovery(format!("{err:#}")))?;
        if candidates.is_empty() {
            return Err(FinderError::discovery(format!(
                "piece index has no serving data set for {piece}"
            )));
        }
        Ok(candidates)
    }

    async fn find_indexed(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
        options: &RetrievalOptions,
    ) -> Result<ByteStream, FinderError> {
        let candidates = cancellable(&options.cancel, self.discover(piece, client, options)).await?;
        debug!(
            %piece,
            candidates = candidates.len(),
            "racing providers from piece index"
        );
        let provider = self.client.clone();
        let piece_owned = *piece;
        race(candidates, &options.cancel, move |candidate| {
            let provider = provider.clone();
            let service_url = candidate.url.clone();
            async move { provider.fetch(&service_url, &piece_owned).await }
        })
        .await
    }
}

#[async_trait]
impl PieceFinder for SubgraphFinder {
    async fn find(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
        options: RetrievalOptions,
    ) -> Result<ByteStream, FinderError> {
        match self.find_indexed(piece, client, &options).await {
            Ok(stream) => Ok(stream),
            Err(FinderError::Cancelled) => Err(FinderError::Cancelled),
            Err(err) => match &self.next {
                Some(next) => {
                    debug!(%piece, "piece index retrieval failed ({err}), falling back");
                    next.find(piece, client, options).await
                }
                None => Err(err),
            },
        }
    }
}

const DATA_SETS_FOR_PIECE_QUERY: &str = r#"
query DataSetsForPiece($pieceCid: String!, $payer: String!) {
  pieces(where: { cid: $pieceCid, removed: false, dataSet_: { payer: $payer } }) {
    dataSet {
      setId
      isActive
      totalPieces
      serviceProvider { providerId }
    }
  }
}
"#;

/// [`PieceIndex`] backed by a GraphQL indexer endpoint.
#[derive(Debug, Clone)]
pub struct GraphQlPieceIndex {
    endpoint: Url,
    http: reqwest::Client,
}

impl GraphQlPieceIndex {
    pub fn new(endpoint: Url, http: reqwest::Client) -> Self {
        Self { endpoint, http }
    }
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<PiecesData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct PiecesData {
    pieces: Vec<PieceEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PieceEntry {
    data_set: DataSetEntry,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataSetEntry {
    #[serde(deserialize_with = "big_int")]
    set_id: u64,
    is_active: bool,
    #[serde(deserialize_with = "big_int")]
    total_pieces: u64,
    service_provider: ServiceProviderEntry,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceProviderEntry {
    #[serde(deserialize_with = "big_int")]
    provider_id: u64,
}

/// Indexers encode `BigInt` fields as decimal strings; accept plain numbers too.
fn big_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BigInt {
        Number(u64),
        Text(String),
    }

    match BigInt::deserialize(deserializer)? {
        BigInt::Number(n) => Ok(n),
        BigInt::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[async_trait]
impl PieceIndex for GraphQlPieceIndex {
    async fn data_sets_for_piece(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
    ) -> anyhow::Result<Vec<DataSetInfo>> {
        let body = serde_json::json!({
            "query": DATA_SETS_FOR_PIECE_QUERY,
            "variables": {
                "pieceCid": piece.to_string(),
                "payer": client.to_string(),
            },
        });
        let res = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let response: GraphQlResponse = res.json().await?;

        if let Some(error) = response.errors.first() {
            return Err(anyhow!("piece index query failed: {}", error.message));
        }
        let data = response
            .data
            .ok_or_else(|| anyhow!("piece index returned no data"))?;

        Ok(data
            .pieces
            .into_iter()
            .map(|entry| DataSetInfo {
                data_set_id: entry.data_set.set_id,
                provider_id: ProviderId(entry.data_set.service_provider.provider_id),
                is_live: entry.data_set.is_active,
                piece_count: entry.data_set.total_pieces,
            })
            .collect())
    }
}
