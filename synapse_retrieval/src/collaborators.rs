//! Inputs the finders need from the outside world.
//!
//! The provider registry, the client's data sets and the optional piece
//! index are owned by other components (contract bindings, an indexer).
//! Finders only see them through these traits. The `Static*` types are
//! in-memory implementations for tests and for embedders that already hold
//! the data.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use synapse_core::{Address, ClientAddress, PieceCid};
use url::Url;

use crate::race::{Candidate, DiscoveryMethod};

/// Registry id of a storage provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderId(pub u64);

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider #{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub address: Address,
    /// Base url of the provider's piece retrieval service.
    pub service_url: Url,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSetInfo {
    pub data_set_id: u64,
    pub provider_id: ProviderId,
    pub is_live: bool,
    pub piece_count: u64,
}

impl DataSetInfo {
    /// Whether the data set can currently serve pieces.
    pub fn is_serving(&self) -> bool {
        self.is_live && self.piece_count > 0
    }
}

#[async_trait]
pub trait ProviderDirectory: fmt::Debug + Send + Sync + 'static {
    async fn provider_id_for_address(&self, address: &Address)
    -> anyhow::Result<Option<ProviderId>>;

    async fn approved_provider_ids(&self) -> anyhow::Result<BTreeSet<ProviderId>>;

    async fn provider_info(&self, id: ProviderId) -> anyhow::Result<Option<ProviderInfo>>;
}

#[async_trait]
pub trait DataSetSource: fmt::Debug + Send + Sync + 'static {
    async fn client_data_sets(&self, client: &ClientAddress) -> anyhow::Result<Vec<DataSetInfo>>;
}

/// Off-chain index from pieces to the data sets holding them.
#[async_trait]
pub trait PieceIndex: fmt::Debug + Send + Sync + 'static {
    async fn data_sets_for_piece(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
    ) -> anyhow::Result<Vec<DataSetInfo>>;
}

/// Turns data sets into candidate locations.
///
/// Keeps serving data sets of approved, active providers, optionally
/// narrowed to `preferred`. Each provider appears at most once, in id order.
pub(crate) async fn resolve_candidates(
    directory: &dyn ProviderDirectory,
    data_sets: &[DataSetInfo],
    preferred: Option<ProviderId>,
    method: DiscoveryMethod,
) -> anyhow::Result<Vec<Candidate>> {
    let holding: BTreeSet<ProviderId> = data_sets
        .iter()
        .filter(|data_set| data_set.is_serving())
        .map(|data_set| data_set.provider_id)
        .filter(|id| preferred.is_none_or(|preferred| *id == preferred))
        .collect();
    if holding.is_empty() {
        return Ok(Vec::new());
    }

    let approved = directory.approved_provider_ids().await?;
    let lookups = holding
        .intersection(&approved)
        .map(|id| directory.provider_info(*id));
    let infos = futures::future::try_join_all(lookups).await?;

    Ok(infos
        .into_iter()
        .flatten()
        .filter(|info| info.active)
        .map(|info| Candidate::provider(info.id, info.service_url, method))
        .collect())
}

/// In-memory provider registry.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    providers: BTreeMap<ProviderId, ProviderInfo>,
    approved: BTreeSet<ProviderId>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, info: ProviderInfo, approved: bool) -> Self {
        if approved {
            self.approved.insert(info.id);
        }
        self.providers.insert(info.id, info);
        self
    }
}

#[async_trait]
impl ProviderDirectory for StaticDirectory {
    async fn provider_id_for_address(
        &self,
        address: &Address,
    ) -> anyhow::Result<Option<ProviderId>> {
        Ok(self
            .providers
            .values()
            .find(|info| info.address == *address)
            .map(|info| info.id))
    }

    async fn approved_provider_ids(&self) -> anyhow::Result<BTreeSet<ProviderId>> {
        Ok(self.approved.clone())
    }

    async fn provider_info(&self, id: ProviderId) -> anyhow::Result<Option<ProviderInfo>> {
        Ok(self.providers.get(&id).cloned())
    }
}

/// In-memory data sets per client.
#[derive(Debug, Clone, Default)]
pub struct StaticDataSets {
    by_client: HashMap<ClientAddress, Vec<DataSetInfo>>,
}

impl StaticDataSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_set(mut self, client: ClientAddress, data_set: DataSetInfo) -> Self {
        self.by_client.entry(client).or_default().push(data_set);
        self
    }
}

#[async_trait]
impl DataSetSource for StaticDataSets {
    async fn client_data_sets(&self, client: &ClientAddress) -> anyhow::Result<Vec<DataSetInfo>> {
        Ok(self.by_client.get(client).cloned().unwrap_or_default())
    }
}

/// In-memory piece index.
#[derive(Debug, Clone, Default)]
pub struct StaticPieceIndex {
    entries: HashMap<(PieceCid, ClientAddress), Vec<DataSetInfo>>,
}

impl StaticPieceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_piece(
        mut self,
        piece: PieceCid,
        client: ClientAddress,
        data_set: DataSetInfo,
    ) -> Self {
        self.entries
            .entry((piece, client))
            .or_default()
            .push(data_set);
        self
    }
}

#[async_trait]
impl PieceIndex for StaticPieceIndex {
    async fn data_sets_for_piece(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
    ) -> anyhow::Result<Vec<DataSetInfo>> {
        Ok(self
            .entries
            .get(&(*piece, *client))
            .cloned()
            .unwrap_or_default())
    }
}
