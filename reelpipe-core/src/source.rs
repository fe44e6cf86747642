//! Result records handed over by the per-site scrapers.
//!
//! The relay does not parse or validate these beyond using `url` and `kind`
//! to pick the framing endpoint.

use serde::{Deserialize, Serialize};

/// How a resolved stream should be framed by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    /// Adaptive-streaming manifest, framed through the manifest endpoint.
    #[serde(rename = "manifest")]
    Manifest,
    /// Direct media file, framed through the whole-file endpoint.
    #[serde(rename = "single_file")]
    SingleFile,
    /// Site-hosted embed page the browser opens directly, unproxied.
    #[serde(rename = "player-embed")]
    PlayerEmbed,
}

impl MediaKind {
    /// Best-effort classification from the URL alone, for callers that did
    /// not receive an explicit kind.
    #[must_use]
    pub fn guess_for_url(url: &str) -> Self {
        // Query strings routinely follow the playlist name.
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.ends_with(".m3u8") || path.ends_with(".m3u") {
            Self::Manifest
        } else {
            Self::SingleFile
        }
    }
}

/// One playable result from a scraper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedStream {
    /// Scraper label, e.g. the site name.
    pub source: String,
    /// Quality label as reported by the site ("1080p", "HD", ...).
    pub quality: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_serde_spelling() {
        assert_eq!(
            serde_json::to_string(&MediaKind::Manifest).unwrap(),
            "\"manifest\""
        );
        assert_eq!(
            serde_json::to_string(&MediaKind::SingleFile).unwrap(),
            "\"single_file\""
        );
        assert_eq!(
            serde_json::to_string(&MediaKind::PlayerEmbed).unwrap(),
            "\"player-embed\""
        );

        let kind: MediaKind = serde_json::from_str("\"player-embed\"").unwrap();
        assert_eq!(kind, MediaKind::PlayerEmbed);
    }

    #[test]
    fn test_resolved_stream_round_trip() {
        let raw = r#"{"source":"example","quality":"1080p","url":"https://cdn.example.com/ep1.m3u8","type":"manifest"}"#;
        let stream: ResolvedStream = serde_json::from_str(raw).unwrap();
        assert_eq!(stream.kind, MediaKind::Manifest);
        assert_eq!(serde_json::to_string(&stream).unwrap(), raw);
    }

    #[test]
    fn test_guess_for_url() {
        assert_eq!(
            MediaKind::guess_for_url("https://cdn.example.com/master.m3u8"),
            MediaKind::Manifest
        );
        assert_eq!(
            MediaKind::guess_for_url("https://cdn.example.com/master.m3u8?token=abc"),
            MediaKind::Manifest
        );
        assert_eq!(
            MediaKind::guess_for_url("https://cdn.example.com/movie.mp4"),
            MediaKind::SingleFile
        );
    }
}
