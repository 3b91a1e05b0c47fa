use async_trait::async_trait;
use std::sync::Arc;
use synapse_core::{
    ByteStream, ClientAddress, FinderError, PieceCid, PieceFinder, RetrievalOptions, cancellable,
};
use tracing::debug;

use crate::config::{CdnConfig, Network};
use crate::provider::ProviderClient;

/// Tries the edge cache before falling back to the wrapped finder.
///
/// Only requests with `with_cdn` set touch the cache. A cache miss of any
/// kind (payment required, any error status, a transport failure, an empty
/// body) is not an error: the request moves on to `next` with `with_cdn`
/// cleared. Requests without `with_cdn` go straight to `next`.
#[derive(Debug, Clone)]
pub struct CdnFinder {
    network: Network,
    config: CdnConfig,
    client: ProviderClient,
    next: Arc<dyn PieceFinder>,
}

impl CdnFinder {
    pub fn new(
        network: Network,
        config: CdnConfig,
        client: ProviderClient,
        next: Arc<dyn PieceFinder>,
    ) -> Self {
        Self {
            network,
            config,
            client,
            next,
        }
    }
}

#[async_trait]
impl PieceFinder for CdnFinder {
    async fn find(
        &self,
        piece: &PieceCid,
        client: &ClientAddress,
        options: RetrievalOptions,
    ) -> Result<ByteStream, FinderError> {
        if !options.with_cdn {
            return self.next.find(piece, client, options).await;
        }

        match self.config.url_for(self.network, client, piece) {
            Ok(url) => {
                let attempt = async { Ok(self.client.get_stream(url.clone()).await) };
                match cancellable(&options.cancel, attempt).await? {
                    Ok(stream) => {
                        debug!(%piece, %url, "serving piece from CDN");
                        return Ok(stream);
                    }
                    Err(err) => debug!(%piece, %url, "CDN miss ({err}), falling back"),
                }
            }
            Err(err) => debug!(%piece, "invalid CDN url ({err}), falling back"),
        }

        self.next.find(piece, client, options.without_cdn()).await
    }
}
