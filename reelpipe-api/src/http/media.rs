//! Streaming media relay endpoints.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;

use reelpipe_proxy::relay_stream;

use super::error::{AppError, AppResult};
use super::{target_from_query, AppState, ProxyQuery};

/// Hop-by-hop and transfer-shape headers from the upstream response. They
/// describe the original transfer, not the re-chunked relay, so they are
/// never forwarded.
const DROPPED_HEADERS: [&str; 4] = [
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
];

fn client_range(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// GET /ts
///
/// Relays one segment or encryption key. The upstream status passes through
/// so players see expiry errors directly, but the content type is forced:
/// segment hosts routinely mislabel transport stream bodies.
pub async fn proxy_segment(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let target = target_from_query(&query)?;
    let range = client_range(&headers);

    let upstream = state.upstream.fetch_media(&target, range.as_deref()).await?;
    let status = upstream.status();

    let body = Body::from_stream(relay_stream(upstream, state.relay.segment_chunk_bytes));
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "video/mp2t")
        .body(body)
        .map_err(|e| AppError::internal_server_error(format!("failed to build response: {e}")))
}

/// GET /video
///
/// Relays a whole media file. Upstream headers are forwarded apart from the
/// dropped set, and the status passes through so ranged requests keep their
/// 206 and seeking works in the player.
pub async fn proxy_file(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let target = target_from_query(&query)?;
    let range = client_range(&headers);

    let upstream = state.upstream.fetch_media(&target, range.as_deref()).await?;
    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();

    let mut builder = Response::builder().status(status);
    for (name, value) in &upstream_headers {
        if DROPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        builder = builder.header(name, value);
    }
    // Re-chunking preserves the byte count, so the upstream length is still
    // accurate and lets the player compute seek offsets.
    if let Some(length) = upstream_headers.get(header::CONTENT_LENGTH) {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    let body = Body::from_stream(relay_stream(upstream, state.relay.file_chunk_bytes));
    builder
        .body(body)
        .map_err(|e| AppError::internal_server_error(format!("failed to build response: {e}")))
}
