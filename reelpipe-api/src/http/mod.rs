//! HTTP surface of the relay: manifest rewriting, media relay and the
//! embedded player, all hanging off one ephemeral listener.

pub mod error;
pub mod manifest;
pub mod media;
pub mod player;

use std::sync::Arc;

use axum::http::Uri;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use reelpipe_core::config::RelayConfig;
use reelpipe_core::PlaybackSession;
use reelpipe_proxy::{
    parse_header_set, ProxyBase, ProxyTarget, UpstreamClient, FILE_PATH, MANIFEST_PATH,
    PLAYER_PATH, SEGMENT_PATH,
};

use error::{AppError, AppResult};

/// Shared state for all relay routes.
#[derive(Clone)]
pub struct AppState {
    pub upstream: UpstreamClient,
    pub base: ProxyBase,
    pub relay: RelayConfig,
    pub session: Arc<PlaybackSession>,
}

/// Query contract shared by the manifest and media endpoints.
#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
    pub headers: Option<String>,
}

/// Resolve the target of a relay request from its query string.
pub(crate) fn target_from_query(query: &ProxyQuery) -> AppResult<ProxyTarget> {
    let url = query
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::bad_request("missing required query parameter: url"))?;
    let headers = parse_header_set(query.headers.as_deref());
    ProxyTarget::parse(url, headers)
        .map_err(|e| AppError::bad_request(format!("invalid url parameter: {e}")))
}

/// Assemble the relay router with CORS and request tracing applied.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(MANIFEST_PATH, get(manifest::proxy_manifest))
        .route(SEGMENT_PATH, get(media::proxy_segment))
        .route(FILE_PATH, get(media::proxy_file))
        .route(PLAYER_PATH, get(player::player_page))
        .route("/player/subtitle", get(player::player_subtitle))
        .route("/player/heartbeat", get(player::player_heartbeat))
        .route("/player/end", get(player::player_end))
        .fallback(not_found)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Unknown paths are logged so stray player requests are visible.
async fn not_found(uri: Uri) -> AppError {
    warn!(path = %uri.path(), "request for unknown path");
    AppError::not_found(format!("no such endpoint: {}", uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_from_query_requires_url() {
        let query = ProxyQuery {
            url: None,
            headers: None,
        };
        let err = target_from_query(&query).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
        assert!(err.message.contains("url"));

        let query = ProxyQuery {
            url: Some(String::new()),
            headers: None,
        };
        assert!(target_from_query(&query).is_err());
    }

    #[test]
    fn target_from_query_parses_headers_json() {
        let query = ProxyQuery {
            url: Some("https://cdn.example.com/live.m3u8".into()),
            headers: Some(r#"{"Referer":"https://site.example/"}"#.into()),
        };
        let target = target_from_query(&query).unwrap();
        assert_eq!(
            target.headers.get("Referer").map(String::as_str),
            Some("https://site.example/")
        );
    }

    #[test]
    fn target_from_query_rejects_invalid_url() {
        let query = ProxyQuery {
            url: Some("not a url".into()),
            headers: None,
        };
        let err = target_from_query(&query).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }
}
