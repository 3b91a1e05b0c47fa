use async_trait::async_trait;
use std::sync::Arc;
use synapse_core::{ByteStream, ClientAddress, FinderError, PieceCid, PieceFinder, RetrievalOptions};
use tracing::debug;

use crate::cdn::CdnFinder;
use crate::chain::ChainFinder;
use crate::collaborators::{DataSetSource, PieceIndex, ProviderDirectory};
use crate::config::RetrievalConfig;
use crate::provider::ProviderClient;
use crate::subgraph::{GraphQlPieceIndex, SubgraphFinder};

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// The assembled finder stack: `CdnFinder(SubgraphFinder?(ChainFinder))`.
///
/// ```ignore
/// let engine = RetrievalEngine::builder(config)
///     .directory(directory)
///     .data_sets(data_sets)
///     .build()?;
/// let stream = engine.find(&piece, &client, RetrievalOptions::new().with_cdn(true)).await?;
/// ```
#[derive(Debug, Clone)]
pub struct RetrievalEngine {
    finder: Arc<dyn PieceFinder>,
}

impl RetrievalEngine {
    pub fn builder(config: RetrievalConfig) -> RetrievalEngineBuilder {
        RetrievalEngineBuilder {
            config,
            directory: None,
            data_sets: None,
            piece_index: None,
            base: None,
            http: None,
        }
    }

    /// The outermost finder, for callers that want to wrap it further.
    pub fn finder(&self) -> Arc<dyn PieceFinder> {
        self.finder.clone()
    }
}

#[async_trait]
impl PieceFinder for RetrievalEngine {
    async fn find(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
        options: RetrievalOptions,
    ) -> Result<ByteStream, FinderError> {
        self.finder.find(piece, client, options).await
    }
}

pub struct RetrievalEngineBuilder {
    config: RetrievalConfig,
    directory: Option<Arc<dyn ProviderDirectory>>,
    data_sets: Option<Arc<dyn DataSetSource>>,
    piece_index: Option<Arc<dyn PieceIndex>>,
    base: Option<Arc<dyn PieceFinder>>,
    http: Option<reqwest::Client>,
}

impl RetrievalEngineBuilder {
    pub fn directory(mut self, directory: Arc<dyn ProviderDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn data_sets(mut self, data_sets: Arc<dyn DataSetSource>) -> Self {
        self.data_sets = Some(data_sets);
        self
    }

    /// Piece index to consult before chain discovery. Takes precedence over
    /// the `[subgraph]` config section.
    pub fn piece_index(mut self, index: Arc<dyn PieceIndex>) -> Self {
        self.piece_index = Some(index);
        self
    }

    /// Replaces the chain finder at the bottom of the stack.
    pub fn base_finder(mut self, finder: Arc<dyn PieceFinder>) -> Self {
        self.base = Some(finder);
        self
    }

    /// Uses `http` instead of a client built from the `[http]` config.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<RetrievalEngine, BuildError> {
        let client = match self.http {
            Some(http) => ProviderClient::from_client(http),
            None => ProviderClient::new(&self.config.http)?,
        };

        let mut finder: Arc<dyn PieceFinder> = match self.base {
            Some(base) => base,
            None => {
                let directory = self
                    .directory
                    .clone()
                    .ok_or(BuildError::MissingCollaborator("provider directory"))?;
                let data_sets = self
                    .data_sets
                    .ok_or(BuildError::MissingCollaborator("data set source"))?;
                Arc::new(ChainFinder::new(directory, data_sets, client.clone()))
            }
        };

        let index: Option<Arc<dyn PieceIndex>> = match (self.piece_index, &self.config.subgraph) {
            (Some(index), _) => Some(index),
            (None, Some(subgraph)) => Some(Arc::new(GraphQlPieceIndex::new(
                subgraph.endpoint.clone(),
                client.http().clone(),
            ))),
            (None, None) => None,
        };
        if let Some(index) = index {
            let directory = self
                .directory
                .ok_or(BuildError::MissingCollaborator("provider directory"))?;
            finder = Arc::new(
                SubgraphFinder::new(index, directory, client.clone()).with_fallback(finder),
            );
        }

        if self.config.cdn.enabled {
            finder = Arc::new(CdnFinder::new(
                self.config.network,
                self.config.cdn.clone(),
                client,
                finder,
            ));
        }

        debug!(network = ?self.config.network, "retrieval engine ready");
        Ok(RetrievalEngine { finder })
    }
}
