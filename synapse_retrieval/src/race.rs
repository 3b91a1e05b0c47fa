//! Racing candidate locations.
//!
//! Every candidate runs as its own task on a [`JoinSet`]. The first one to
//! produce a stream wins and the rest are aborted. A candidate that fails
//! fast never pre-empts one that is slow but working: failures are only
//! collected, and the race ends in failure once every candidate has failed.

use std::fmt;
use std::future::Future;

use synapse_core::{ByteStream, CandidateFailure, FinderError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::collaborators::ProviderId;
use crate::provider::AttemptError;

/// How a candidate location was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryMethod {
    Chain,
    Subgraph,
    Cdn,
    Url,
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiscoveryMethod::Chain => "chain",
            DiscoveryMethod::Subgraph => "subgraph",
            DiscoveryMethod::Cdn => "cdn",
            DiscoveryMethod::Url => "url",
        };
        f.write_str(name)
    }
}

/// A place a piece might be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Registry id, for provider-hosted candidates.
    pub provider: Option<ProviderId>,
    /// Provider service url, or the direct url for CDN and fixed-url
    /// candidates.
    pub url: Url,
    pub method: DiscoveryMethod,
}

impl Candidate {
    pub fn provider(id: ProviderId, service_url: Url, method: DiscoveryMethod) -> Self {
        Self {
            provider: Some(id),
            url: service_url,
            method,
        }
    }

    pub fn direct(url: Url, method: DiscoveryMethod) -> Self {
        Self {
            provider: None,
            url,
            method,
        }
    }

    /// Name used in logs and failure reports.
    pub fn name(&self) -> String {
        match self.provider {
            Some(id) => id.to_string(),
            None => self.method.to_string(),
        }
    }

    pub fn failure(&self, reason: impl fmt::Display) -> CandidateFailure {
        CandidateFailure {
            provider: self.name(),
            url: self.url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Runs `attempt` for every candidate concurrently and returns the first
/// stream produced.
///
/// Returns [`FinderError::Cancelled`] as soon as `cancel` fires, and
/// [`FinderError::AllCandidatesFailed`] with one entry per candidate once
/// all of them have failed. Pending attempts are aborted in both cases and
/// after a win.
pub async fn race<F, Fut>(
    candidates: Vec<Candidate>,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<ByteStream, FinderError>
where
    F: FnMut(&Candidate) -> Fut,
    Fut: Future<Output = Result<ByteStream, AttemptError>> + Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(FinderError::Cancelled);
    }

    let mut tasks = JoinSet::new();
    for candidate in candidates {
        let fut = attempt(&candidate);
        tasks.spawn(async move { (candidate, fut.await) });
    }

    let mut failures = Vec::new();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.abort_all();
                debug!(pending = tasks.len(), "retrieval race cancelled");
                return Err(FinderError::Cancelled);
            }
            next = tasks.join_next() => match next {
                None => return Err(FinderError::AllCandidatesFailed { failures }),
                Some(Ok((candidate, Ok(stream)))) => {
                    tasks.abort_all();
                    debug!(
                        candidate = %candidate.name(),
                        url = %candidate.url,
                        method = %candidate.method,
                        "candidate won retrieval race"
                    );
                    return Ok(stream);
                }
                Some(Ok((candidate, Err(err)))) => {
                    debug!(
                        candidate = %candidate.name(),
                        url = %candidate.url,
                        "candidate failed: {err}"
                    );
                    failures.push(candidate.failure(err));
                }
                Some(Err(join_err)) => {
                    debug!("candidate task failed: {join_err}");
                    failures.push(CandidateFailure {
                        provider: "unknown".into(),
                        url: String::new(),
                        reason: join_err.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::TryStreamExt;
    use std::time::Duration;
    use synapse_core::testutil::chunked_stream;

    fn candidate(id: u64) -> Candidate {
        Candidate::provider(
            ProviderId(id),
            Url::parse(&format!("https://sp{id}.example/")).unwrap(),
            DiscoveryMethod::Chain,
        )
    }

    async fn collect(stream: ByteStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_success_beats_fast_failures() {
        let candidates = vec![candidate(1), candidate(2), candidate(3)];
        let stream = race(candidates, &CancellationToken::new(), |c| {
            let id = c.provider.map(|p| p.0);
            async move {
                match id {
                    Some(2) => {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(chunked_stream(b"slow but fine".to_vec(), 4))
                    }
                    _ => Err(AttemptError::EmptyBody),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(collect(stream).await, b"slow but fine");
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_wins() {
        let candidates = vec![candidate(1), candidate(2)];
        let stream = race(candidates, &CancellationToken::new(), |c| {
            let id = c.provider.map(|p| p.0).unwrap_or_default();
            async move {
                tokio::time::sleep(Duration::from_secs(id)).await;
                Ok(chunked_stream(format!("from {id}").into_bytes(), 64))
            }
        })
        .await
        .unwrap();
        assert_eq!(collect(stream).await, b"from 1");
    }

    #[tokio::test]
    async fn test_all_failures_are_reported() {
        let candidates = vec![candidate(1), candidate(2)];
        let err = race(candidates, &CancellationToken::new(), |_| async {
            Err::<ByteStream, _>(AttemptError::EmptyBody)
        })
        .await
        .err()
        .expect("race should fail");
        assert!(matches!(err, FinderError::AllCandidatesFailed { .. }));
        let mut names: Vec<_> = err.failures().iter().map(|f| f.provider.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["provider #1", "provider #2"]);
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let err = race(Vec::new(), &CancellationToken::new(), |_| async {
            Ok::<_, AttemptError>(chunked_stream(Bytes::new(), 1))
        })
        .await
        .err()
        .expect("race should fail");
        assert!(
            matches!(err, FinderError::AllCandidatesFailed { failures } if failures.is_empty())
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut attempts = 0;
        let err = race(vec![candidate(1)], &cancel, |_| {
            attempts += 1;
            async { Err::<ByteStream, _>(AttemptError::EmptyBody) }
        })
        .await
        .err()
        .expect("race should fail");
        assert!(err.is_cancelled());
        assert_eq!(attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_mid_race() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let err = race(vec![candidate(1), candidate(2)], &cancel, |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err::<ByteStream, _>(AttemptError::EmptyBody)
        })
        .await
        .err()
        .expect("race should fail");
        assert!(err.is_cancelled());
    }
}
