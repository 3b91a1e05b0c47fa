use async_trait::async_trait;
use synapse_core::{ByteStream, ClientAddress, FinderError, PieceCid, PieceFinder, RetrievalOptions};
use url::Url;

use crate::provider::ProviderClient;
use crate::race::{Candidate, DiscoveryMethod, race};

/// Fetches every piece from one known provider url, without discovery or a
/// probe.
#[derive(Debug, Clone)]
pub struct UrlFinder {
    service_url: Url,
    client: ProviderClient,
}

impl UrlFinder {
    pub fn new(service_url: Url, client: ProviderClient) -> Self {
        Self {
            service_url,
            client,
        }
    }
}

#[async_trait]
impl PieceFinder for UrlFinder {
    async fn find(
        &self,
        piece: &PieceCid,
        _client: &ClientAddress,
        options: RetrievalOptions,
    ) -> Result<ByteStream, FinderError> {
        let url = ProviderClient::piece_url(&self.service_url, piece)
            .map_err(|err| FinderError::Input(format!("invalid provider url: {err}")))?;
        let provider = self.client.clone();
        race(
            vec![Candidate::direct(url, DiscoveryMethod::Url)],
            &options.cancel,
            move |candidate| {
                let provider = provider.clone();
                let url = candidate.url.clone();
                async move { provider.get_stream(url).await }
            },
        )
        .await
    }
}
