use async_trait::async_trait;
use std::sync::Arc;
use synapse_core::{
    ByteStream, ClientAddress, FinderError, PieceCid, PieceFinder, RetrievalOptions, cancellable,
};
use tracing::{debug, info};

use crate::collaborators::{DataSetSource, ProviderDirectory, ProviderId, resolve_candidates};
use crate::provider::ProviderClient;
use crate::race::{Candidate, DiscoveryMethod, race};

/// Finds pieces through the client's on-chain data sets.
///
/// Candidates are the approved, active providers holding a live, non-empty
/// data set for the client. Each candidate is probed and then fetched, all
/// candidates at once; the first to deliver wins.
#[derive(Debug, Clone)]
pub struct ChainFinder {
    directory: Arc<dyn ProviderDirectory>,
    data_sets: Arc<dyn DataSetSource>,
    client: ProviderClient,
    next: Option<Arc<dyn PieceFinder>>,
}

impl ChainFinder {
    pub fn new(
        directory: Arc<dyn ProviderDirectory>,
        data_sets: Arc<dyn DataSetSource>,
        client: ProviderClient,
    ) -> Self {
        Self {
            directory,
            data_sets,
            client,
            next: None,
        }
    }

    /// Finder to delegate to when discovery turns up no candidates.
    pub fn with_fallback(mut self, next: Arc<dyn PieceFinder>) -> Self {
        self.next = Some(next);
        self
    }

    /// Resolves the preferred provider, if any, to an approved registry id.
    async fn preferred_provider(
        &self,
        options: &RetrievalOptions,
    ) -> Result<Option<ProviderId>, FinderError> {
        let Some(address) = options.provider else {
            return Ok(None);
        };
        let id = self
            .directory
            .provider_id_for_address(&address)
            .await
            .map_err(|err| FinderError::discovery(format!("provider lookup failed: {err:#}")))?
            .ok_or_else(|| {
                FinderError::discovery(format!("provider {address} is not registered"))
            })?;
        let approved = self
            .directory
            .approved_provider_ids()
            .await
            .map_err(|err| FinderError::discovery(format!("provider lookup failed: {err:#}")))?;
        if !approved.contains(&id) {
            return Err(FinderError::discovery(format!(
                "provider {address} ({id}) is not approved"
            )));
        }
        Ok(Some(id))
    }

    async fn discover(
        &self,
        client: &ClientAddress,
        options: &RetrievalOptions,
    ) -> Result<Vec<Candidate>, FinderError> {
        let preferred = self.preferred_provider(options).await?;
        let data_sets = self
            .data_sets
            .client_data_sets(client)
            .await
            .map_err(|err| FinderError::discovery(format!("data set lookup failed: {err:#}")))?;
        let candidates = resolve_candidates(
            self.directory.as_ref(),
            &data_sets,
            preferred,
            DiscoveryMethod::Chain,
        )
        .await
        .map_err(|err| FinderError::discovery(format!("provider lookup failed: {err:#}")))?;

        if candidates.is_empty() {
            return Err(FinderError::discovery(format!(
                "no approved provider serves data sets for {client}"
            )));
        }
        Ok(candidates)
    }
}

#[async_trait]
impl PieceFinder for ChainFinder {
    async fn find(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
        options: RetrievalOptions,
    ) -> Result<ByteStream, FinderError> {
        let candidates = match cancellable(&options.cancel, self.discover(client, &options)).await
        {
            Ok(candidates) => candidates,
            Err(FinderError::Discovery { reason, failures }) => match &self.next {
                Some(next) => {
                    debug!(%piece, "chain discovery found nothing ({reason}), falling back");
                    return next.find(piece, client, options).await;
                }
                None => return Err(FinderError::Discovery { reason, failures }),
            },
            Err(err) => return Err(err),
        };

        info!(
            %piece,
            candidates = candidates.len(),
            "racing providers from on-chain data sets"
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
