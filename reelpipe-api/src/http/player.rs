//! Embedded player page and playback session signals.
//!
//! The page is fully static; it reads the stream URL and subtitle path from
//! its own query string in the browser, so the handler stays parameterless.

use std::path::Path;
use std::sync::LazyLock;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, Response};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use super::error::{AppError, AppResult};
use super::AppState;

const PLAYER_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>reelpipe</title>
<link rel="stylesheet" href="https://cdn.plyr.io/3.7.8/plyr.css">
<style>
  html, body { margin: 0; height: 100%; background: #000; }
  .plyr { height: 100%; }
  #overlay { position: absolute; top: 16px; right: 16px; z-index: 1000; opacity: 0; transition: opacity 0.3s; }
  body:hover #overlay { opacity: 1; }
  #mark-watched { background: rgba(220, 38, 38, 0.8); color: #fff; border: none; padding: 9px 14px; border-radius: 4px; font-size: 15px; font-weight: bold; cursor: pointer; }
  #mark-watched:hover { background: rgba(220, 38, 38, 1); }
</style>
</head>
<body>
<div id="overlay">
  <button id="mark-watched">Mark as watched &amp; close</button>
</div>
<video id="player" playsinline controls crossorigin></video>
<script src="https://cdn.jsdelivr.net/npm/hls.js@1"></script>
<script src="https://cdn.plyr.io/3.7.8/plyr.js"></script>
<script>
  const params = new URLSearchParams(window.location.search);
  const src = params.get('url');
  const subPath = params.get('sub_path');
  const video = document.getElementById('player');

  if (subPath) {
    const track = document.createElement('track');
    track.kind = 'captions';
    track.label = 'Subtitles';
    track.srclang = 'en';
    track.src = '/player/subtitle?path=' + encodeURIComponent(subPath);
    track.default = true;
    video.appendChild(track);
  }

  function startPlayer() {
    const player = new Plyr(video, { captions: { active: true, update: true } });
    player.play();
  }

  if (src) {
    if (src.includes('.m3u8') || src.includes('/stream?')) {
      if (Hls.isSupported()) {
        const hls = new Hls();
        hls.loadSource(src);
        hls.attachMedia(video);
        hls.on(Hls.Events.MANIFEST_PARSED, startPlayer);
      } else if (video.canPlayType('application/vnd.apple.mpegurl')) {
        video.src = src;
        startPlayer();
      }
    } else {
      video.src = src;
      startPlayer();
    }
  }

  const heartbeat = setInterval(() => {
    if (video.currentSrc || video.src) {
      fetch('/player/heartbeat').catch(() => {});
    }
  }, 2000);

  function endPlayback() {
    clearInterval(heartbeat);
    fetch('/player/end').catch(() => {}).finally(() => window.close());
  }

  video.addEventListener('ended', endPlayback);
  document.getElementById('mark-watched').addEventListener('click', endPlayback);
</script>
</body>
</html>
"##;

/// GET /player
pub async fn player_page() -> Html<&'static str> {
    Html(PLAYER_HTML)
}

#[derive(Debug, Deserialize)]
pub struct SubtitleQuery {
    pub path: Option<String>,
}

/// SubRip cue timestamps carry a comma before the millisecond field where
/// WebVTT wants a dot.
static SRT_TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2}:\d{2}:\d{2}),(\d{3})")
        .expect("subtitle timestamp regex is a compile-time constant and always valid")
});

fn srt_to_vtt(srt: &str) -> String {
    format!("WEBVTT\n\n{}", SRT_TIMESTAMP_RE.replace_all(srt, "${1}.${2}"))
}

fn is_srt(path: &str) -> bool {
    Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("srt"))
}

/// GET /player/subtitle
///
/// Serves a local subtitle file to the player, converting SubRip to WebVTT
/// on the fly. Files already in WebVTT (or anything else) pass through.
pub async fn player_subtitle(Query(query): Query<SubtitleQuery>) -> AppResult<Response> {
    let Some(path) = query.path.filter(|p| !p.is_empty()) else {
        return Err(AppError::not_found("subtitle not found"));
    };
    if !Path::new(&path).exists() {
        debug!(%path, "subtitle file does not exist");
        return Err(AppError::not_found("subtitle not found"));
    }

    let raw = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::internal_server_error(format!("failed to read subtitle: {e}")))?;
    // Subtitle files in the wild are often Latin-1 rather than UTF-8.
    let text = String::from_utf8_lossy(&raw);

    let body = if is_srt(&path) {
        srt_to_vtt(&text)
    } else {
        text.into_owned()
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/vtt")
        .body(Body::from(body))
        .map_err(|e| AppError::internal_server_error(format!("failed to build response: {e}")))
}

/// GET /player/heartbeat
///
/// Called by the page every couple of seconds while media is loaded.
pub async fn player_heartbeat(State(state): State<AppState>) -> &'static str {
    state.session.mark_heartbeat();
    "ok"
}

/// GET /player/end
///
/// One-way playback-finished signal from the page.
pub async fn player_end(State(state): State<AppState>) -> &'static str {
    info!("player reported playback finished");
    state.session.mark_finished();
    "ok"
}
