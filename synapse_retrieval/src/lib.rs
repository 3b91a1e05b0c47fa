//! Piece finders for Synapse.
//!
//! A finder turns a [`PieceCid`](synapse_core::PieceCid) and the requesting
//! client into a byte stream. The finders here compose into the default
//! stack built by [`RetrievalEngine`]:
//!
//! - [`CdnFinder`] tries the edge cache first when the caller asks for it.
//! - [`SubgraphFinder`] (optional) asks an off-chain piece index which
//!   providers hold the piece.
//! - [`ChainFinder`] races every approved provider holding a data set for
//!   the client.
//!
//! Streams are not verified here; see `synapse_download`.

pub mod collaborators;
pub mod config;
pub mod provider;
pub mod race;

mod cdn;
mod chain;
mod engine;
mod fixed_url;
mod subgraph;

pub use cdn::CdnFinder;
pub use chain::ChainFinder;
pub use collaborators::{
    DataSetInfo, DataSetSource, PieceIndex, ProviderDirectory, ProviderId, ProviderInfo,
    StaticDataSets, StaticDirectory, StaticPieceIndex,
};
pub use config::{CdnConfig, ConfigError, HttpConfig, Network, RetrievalConfig, SubgraphConfig};
pub use engine::{BuildError, RetrievalEngine, RetrievalEngineBuilder};
pub use fixed_url::UrlFinder;
pub use provider::{AttemptError, ProviderClient};
pub use race::{Candidate, DiscoveryMethod};
pub use subgraph::{GraphQlPieceIndex, SubgraphFinder};
