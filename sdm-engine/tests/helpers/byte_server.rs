//! Local HTTP source for transfer tests
//!
//! Serves a deterministic payload with byte-range support on `/file` and as
//! a chunked stream without a Content-Length on `/stream`, so tests cover
//! both the segmented and the single-stream download paths without touching
//! the network.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct ServerState {
    payload: Vec<u8>,
    hits: AtomicUsize,
}

pub struct ByteServer {
    pub addr: SocketAddr,
    pub payload: Vec<u8>,
    state: Arc<ServerState>,
}

impl ByteServer {
    pub async fn start(payload: Vec<u8>) -> Self {
        let state = Arc::new(ServerState {
            payload: payload.clone(),
            hits: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/file", get(serve_ranged))
            .route("/stream", get(serve_stream))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        ByteServer {
            addr,
            payload,
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Number of GET /file requests served
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::Relaxed)
    }
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

async fn serve_ranged(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Response {
    state.hits.fetch_add(1, Ordering::Relaxed);

    let total = state.payload.len();
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range);

    match range {
        Some((start, end)) if start <= end && end < total => {
            let body = state.payload[start..=end].to_vec();
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::ACCEPT_RANGES, "bytes")
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, total),
                )
                .body(Body::from(body))
                .unwrap()
        }
        _ => Response::builder()
            .status(StatusCode::OK)
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CONTENT_LENGTH, total.to_string())
            .body(Body::from(state.payload.clone()))
            .unwrap(),
    }
}

/// Chunked body without a Content-Length header
async fn serve_stream(State(state): State<Arc<ServerState>>) -> Response {
    let chunks: Vec<Result<Vec<u8>, Infallible>> = state
        .payload
        .chunks(8192)
        .map(|c| Ok(c.to_vec()))
        .collect();

    Response::builder()
        .status(StatusCode::OK)
        .body(Body::from_stream(futures::stream::iter(chunks)))
        .unwrap()
}
