//! Downloads through real finders against in-process HTTP providers.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use synapse_core::{Address, ClientAddress, ErrorKind, PieceCid, RetrievalOptions, calculate};
use synapse_download::{DownloadError, PieceDownloader, download_from_url, validate};
use synapse_retrieval::{
    DataSetInfo, ProviderClient, ProviderId, ProviderInfo, RetrievalConfig, RetrievalEngine,
    StaticDataSets, StaticDirectory,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

const HELLO: &[u8] = b"Hello, Filecoin Synapse!";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn client() -> ClientAddress {
    "0x1234567890abcdef1234567890abcdef12345678".parse().unwrap()
}

#[derive(Clone)]
struct ProviderState {
    piece: PieceCid,
    body: Bytes,
}

/// A provider that advertises `piece` and serves `body` for it, whether or
/// not the two agree.
struct Provider {
    url: Url,
    handle: JoinHandle<()>,
}

impl Drop for Provider {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn spawn_provider(piece: PieceCid, body: impl Into<Bytes>) -> Provider {
    let state = ProviderState {
        piece,
        body: body.into(),
    };
    let router = Router::new()
        .route("/pdp/piece", get(probe))
        .route("/piece/:cid", get(fetch))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Provider {
        url: Url::parse(&format!("http://{addr}/")).unwrap(),
        handle,
    }
}

async fn probe(State(state): State<ProviderState>) -> Response {
    Json(serde_json::json!({ "pieceCid": state.piece.to_string() })).into_response()
}

async fn fetch(State(state): State<ProviderState>, Path(cid): Path<String>) -> Response {
    if cid == state.piece.to_string() {
        state.body.clone().into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

fn engine_for(provider: &Provider) -> RetrievalEngine {
    let directory = StaticDirectory::new().with_provider(
        ProviderInfo {
            id: ProviderId(1),
            address: Address::from_bytes([1; 20]),
            service_url: provider.url.clone(),
            active: true,
        },
        true,
    );
    let data_sets = StaticDataSets::new().with_data_set(
        client(),
        DataSetInfo {
            data_set_id: 101,
            provider_id: ProviderId(1),
            is_live: true,
            piece_count: 1,
        },
    );
    RetrievalEngine::builder(RetrievalConfig::default())
        .directory(Arc::new(directory))
        .data_sets(Arc::new(data_sets))
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn downloads_and_verifies_through_engine() {
    init_tracing();
    let piece = calculate(HELLO).unwrap();
    let provider = spawn_provider(piece, HELLO).await;
    let downloader = PieceDownloader::new(Arc::new(engine_for(&provider)));

    let bytes = downloader
        .download(&piece, &client(), RetrievalOptions::new())
        .await
        .unwrap();
    assert_eq!(&bytes[..], HELLO);
    validate(&piece, &bytes).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_provider_serving_other_bytes() {
    init_tracing();
    let piece = calculate(HELLO).unwrap();
    let provider = spawn_provider(piece, &b"Hello, Filecoin Synapse?"[..]).await;
    let downloader = PieceDownloader::new(Arc::new(engine_for(&provider)));

    match downloader
        .download(&piece, &client(), RetrievalOptions::new())
        .await
    {
        Err(DownloadError::CommitmentMismatch { expected, actual }) => {
            assert_eq!(expected, piece);
            assert_eq!(actual, calculate(b"Hello, Filecoin Synapse?").ok());
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_oversized_body() {
    init_tracing();
    let piece = calculate(HELLO).unwrap();
    let mut body = HELLO.to_vec();
    body.extend(std::iter::repeat_n(0u8, 4096));
    let provider = spawn_provider(piece, body).await;

    let err = download_from_url(provider.url.clone(), &piece, RetrievalOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CommitmentMismatch);
}

#[tokio::test(flavor = "multi_thread")]
async fn downloads_from_known_url() {
    init_tracing();
    let data: Vec<u8> = (0..1024u32).map(|i| i as u8).collect();
    let piece = calculate(&data).unwrap();
    let provider = spawn_provider(piece, data.clone()).await;

    let bytes = download_from_url(provider.url.clone(), &piece, RetrievalOptions::new())
        .await
        .unwrap();
    assert_eq!(&bytes[..], &data[..]);
}

#[tokio::test(flavor = "multi_thread")]
async fn verified_stream_from_known_url() {
    init_tracing();
    let data = vec![0xffu8; 1000];
    let piece = calculate(&data).unwrap();
    let provider = spawn_provider(piece, data.clone()).await;
    let downloader = PieceDownloader::for_url(
        provider.url.clone(),
        ProviderClient::new(&Default::default()).unwrap(),
    );

    let mut stream = downloader
        .download_stream(&piece, &client(), RetrievalOptions::new())
        .await
        .unwrap();
    let mut received = Vec::new();
    while let Some(chunk) = stream.next().await {
        received.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(received, data);
    assert_eq!(stream.bytes_verified(), 1000);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_before_start() {
    let piece = calculate(HELLO).unwrap();
    let provider = spawn_provider(piece, HELLO).await;
    let downloader = PieceDownloader::new(Arc::new(engine_for(&provider)));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = downloader
        .download(
            &piece,
            &client(),
            RetrievalOptions::new().with_cancel(cancel),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Cancelled));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_identifier_never_reaches_network() {
    let piece = calculate(HELLO).unwrap();
    let provider = spawn_provider(piece, HELLO).await;
    let downloader = PieceDownloader::new(Arc::new(engine_for(&provider)));

    let err = downloader
        .parse_and_download("baga6ea4seaq-truncated", &client(), RetrievalOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);

    let bytes = downloader
        .parse_and_download(&piece.to_string(), &client(), RetrievalOptions::new())
        .await
        .unwrap();
    assert_eq!(&bytes[..], HELLO);
}
