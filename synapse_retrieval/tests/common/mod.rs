#![allow(dead_code)]

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use synapse_core::{Address, ClientAddress, PieceCid, calculate};
use synapse_retrieval::{
    DataSetInfo, ProviderClient, ProviderId, ProviderInfo, StaticDataSets, StaticDirectory,
};
use tokio::task::JoinHandle;
use url::Url;

pub const HELLO: &[u8] = b"Hello, Filecoin Synapse!";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn hello_piece() -> PieceCid {
    calculate(HELLO).unwrap()
}

pub fn client() -> ClientAddress {
    "0x1234567890abcdef1234567890abcdef12345678".parse().unwrap()
}

pub fn provider_client() -> ProviderClient {
    ProviderClient::new(&Default::default()).unwrap()
}

/// How a mock provider misbehaves.
#[derive(Clone, Default)]
pub struct Behavior {
    pub probe_status: Option<StatusCode>,
    pub fetch_status: Option<StatusCode>,
    pub fetch_delay: Duration,
    /// Served instead of the stored bytes.
    pub body_override: Option<Bytes>,
    /// Reported by the probe instead of the stored piece.
    pub probe_piece_override: Option<String>,
}

#[derive(Default)]
pub struct Hits {
    pub probes: AtomicUsize,
    pub fetches: AtomicUsize,
}

#[derive(Clone)]
struct ProviderState {
    pieces: Arc<HashMap<String, (PieceCid, Bytes)>>,
    behavior: Behavior,
    hits: Arc<Hits>,
}

/// An in-process HTTP server on an ephemeral loopback port.
pub struct TestServer {
    pub url: Url,
    pub hits: Arc<Hits>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub fn probes(&self) -> usize {
        self.hits.probes.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.hits.fetches.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(router: Router, hits: Arc<Hits>) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    TestServer {
        url: Url::parse(&format!("http://{addr}/")).unwrap(),
        hits,
        handle,
    }
}

/// A url nothing listens on.
pub async fn closed_url() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}/")).unwrap()
}

/// A storage provider holding `data` under its piece CID.
pub async fn spawn_provider(data: &[u8], behavior: Behavior) -> TestServer {
    let piece = calculate(data).unwrap();
    let mut pieces = HashMap::new();
    pieces.insert(piece.to_string(), (piece, Bytes::copy_from_slice(data)));

    let hits = Arc::new(Hits::default());
    let state = ProviderState {
        pieces: Arc::new(pieces),
        behavior,
        hits: hits.clone(),
    };
    let router = Router::new()
        .route("/pdp/piece", get(probe))
        .route("/piece/:cid", get(fetch))
        .with_state(state);
    serve(router, hits).await
}

async fn probe(
    State(state): State<ProviderState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.hits.probes.fetch_add(1, Ordering::SeqCst);
    if let Some(status) = state.behavior.probe_status {
        return status.into_response();
    }
    if params.get("name").map(String::as_str) != Some("sha2-256-trunc254-padded") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let hash = params.get("hash").cloned().unwrap_or_default();
    match state
        .pieces
        .values()
        .find(|(piece, _)| piece.root().to_hex() == hash)
    {
        Some((piece, _)) => {
            let reported = state
                .behavior
                .probe_piece_override
                .clone()
                .unwrap_or_else(|| piece.to_string());
            Json(serde_json::json!({ "pieceCid": reported })).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn fetch(State(state): State<ProviderState>, Path(cid): Path<String>) -> Response {
    state.hits.fetches.fetch_add(1, Ordering::SeqCst);
    if !state.behavior.fetch_delay.is_zero() {
        tokio::time::sleep(state.behavior.fetch_delay).await;
    }
    if let Some(status) = state.behavior.fetch_status {
        return status.into_response();
    }
    match state.pieces.get(&cid) {
        Some((_, data)) => state
            .behavior
            .body_override
            .clone()
            .unwrap_or_else(|| data.clone())
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Clone)]
struct CdnState {
    status: StatusCode,
    data: Bytes,
    hits: Arc<Hits>,
}

/// An edge cache answering every `/cdn/{client}/{piece}` request with
/// `status` (and `data` on success).
pub async fn spawn_cdn(status: StatusCode, data: &[u8]) -> TestServer {
    let hits = Arc::new(Hits::default());
    let state = CdnState {
        status,
        data: Bytes::copy_from_slice(data),
        hits: hits.clone(),
    };
    let router = Router::new()
        .route("/cdn/:client/:piece", get(cdn))
        .with_state(state);
    serve(router, hits).await
}

async fn cdn(State(state): State<CdnState>) -> Response {
    state.hits.fetches.fetch_add(1, Ordering::SeqCst);
    if state.status.is_success() {
        (state.status, state.data.clone()).into_response()
    } else {
        state.status.into_response()
    }
}

/// `{url}cdn/{client}/{piece}` template for a mock edge cache.
pub fn cdn_template(server: &TestServer) -> String {
    format!("{}cdn/{{client}}/{{piece}}", server.url)
}

pub fn provider_info(id: u64, url: &Url) -> ProviderInfo {
    ProviderInfo {
        id: ProviderId(id),
        address: Address::from_bytes([id as u8; 20]),
        service_url: url.clone(),
        active: true,
    }
}

pub fn live_data_set(id: u64, provider: u64) -> DataSetInfo {
    DataSetInfo {
        data_set_id: id,
        provider_id: ProviderId(provider),
        is_live: true,
        piece_count: 1,
    }
}

/// Directory and data sets for `servers`, each approved and holding one live
/// data set for [`client`]. Provider ids start at 1.
pub fn collaborators(servers: &[&TestServer]) -> (StaticDirectory, StaticDataSets) {
    let mut directory = StaticDirectory::new();
    let mut data_sets = StaticDataSets::new();
    for (i, server) in servers.iter().enumerate() {
        let id = i as u64 + 1;
        directory = directory.with_provider(provider_info(id, &server.url), true);
        data_sets = data_sets.with_data_set(client(), live_data_set(100 + id, id));
    }
    (directory, data_sets)
}
