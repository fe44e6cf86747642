//! Manifest fetch-and-rewrite endpoint.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use tracing::debug;

use reelpipe_proxy::rewrite_manifest;

use super::error::{AppError, AppResult};
use super::{target_from_query, AppState, ProxyQuery};

/// Served for every manifest response, rewritten or passthrough, so players
/// treat the body as HLS either way.
pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// GET /stream
///
/// Fetches the upstream manifest and rewrites every child URI to route back
/// through this relay. Bodies that do not parse as a playlist are served
/// untouched; a misdetected manifest should still reach the player.
pub async fn proxy_manifest(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> AppResult<Response> {
    let target = target_from_query(&query)?;

    let upstream = state.upstream.fetch_manifest(&target).await?;
    let status = upstream.status();
    if !status.is_success() {
        return Err(AppError::bad_gateway(format!(
            "upstream returned {status} for manifest {}",
            target.url
        )));
    }

    let raw = upstream
        .bytes()
        .await
        .map_err(|e| AppError::bad_gateway(format!("failed to read upstream manifest: {e}")))?;
    let text = String::from_utf8_lossy(&raw);

    let outcome = rewrite_manifest(&text, &target, &state.base);
    if !outcome.is_rewritten() {
        debug!(url = %target.url, "manifest served as passthrough");
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, HLS_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(outcome.into_text()))
        .map_err(|e| AppError::internal_server_error(format!("failed to build response: {e}")))
}
