//! Manifest rewriting: route every child reference back through the relay.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::playlist::{EntryKind, Playlist};
use crate::route::{ProxyBase, ProxyTarget, SEGMENT_PATH};

/// Outcome of a rewrite attempt.
///
/// `Passthrough` carries the original text untouched: a manifest that fails
/// structural parsing is often still directly playable, so it is served
/// rather than rejected. The two cases stay distinguishable for callers and
/// tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    Rewritten(String),
    Passthrough(String),
}

impl RewriteOutcome {
    #[must_use]
    pub fn is_rewritten(&self) -> bool {
        matches!(self, Self::Rewritten(_))
    }

    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Rewritten(text) | Self::Passthrough(text) => text,
        }
    }
}

/// Pre-compiled initialization-segment tag matcher
static MAP_URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"#EXT-X-MAP:URI="([^"]+)""#)
        .expect("init segment regex is a compile-time constant and always valid")
});

/// Rewrite one fetched manifest so every child fetch routes back through
/// the relay, carrying the upstream header set along.
///
/// Renditions point at the manifest endpoint (sub-playlists are proxied
/// recursively); keys, init segments and media segments point at the binary
/// endpoint. Entry order is preserved exactly.
#[must_use]
pub fn rewrite_manifest(text: &str, target: &ProxyTarget, base: &ProxyBase) -> RewriteOutcome {
    let Ok(mut playlist) = Playlist::parse(text) else {
        debug!(url = %target.url, "manifest did not parse, passing through");
        return RewriteOutcome::Passthrough(text.to_string());
    };

    playlist.rewrite_uris(|entry, uri| proxy_uri_for(entry, uri, target, base));
    let rendered = playlist.render();
    let patched = patch_missed_map_uris(&rendered, target, base);
    RewriteOutcome::Rewritten(patched)
}

/// Map one entry URI to its self-referential form. URIs already pointing at
/// this relay are left alone so a repeated pass cannot double-wrap them.
fn proxy_uri_for(entry: EntryKind, uri: &str, target: &ProxyTarget, base: &ProxyBase) -> String {
    if base.owns_uri(uri) {
        return uri.to_string();
    }
    let Some(absolute) = resolve_against(&target.url, uri) else {
        return uri.to_string();
    };
    let child = ProxyTarget::new(absolute, target.headers.clone());
    match entry {
        EntryKind::Rendition => base.manifest_url(&child),
        EntryKind::Key | EntryKind::InitSegment | EntryKind::Segment => base.segment_url(&child),
    }
}

fn resolve_against(manifest_url: &Url, raw: &str) -> Option<Url> {
    manifest_url.join(raw).ok()
}

/// Defense-in-depth pass over the serialized text: rewrite any
/// initialization-segment URI the structural pass left untouched. The guard
/// skips URIs that already carry this relay's port and binary endpoint.
fn patch_missed_map_uris(rendered: &str, target: &ProxyTarget, base: &ProxyBase) -> String {
    let own_port = base.port().to_string();
    let own_path = format!("{SEGMENT_PATH}?url=");

    MAP_URI_RE
        .replace_all(rendered, |caps: &regex::Captures<'_>| {
            let original = &caps[1];
            if original.contains(&own_port) && original.contains(&own_path) {
                return caps[0].to_string();
            }
            let Some(absolute) = resolve_against(&target.url, original) else {
                return caps[0].to_string();
            };
            debug!(uri = original, "init segment URI missed by structural rewrite, patching");
            let child = ProxyTarget::new(absolute, target.headers.clone());
            format!("#EXT-X-MAP:URI=\"{}\"", base.segment_url(&child))
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::HeaderSet;

    fn referer_headers() -> HeaderSet {
        let mut headers = HeaderSet::new();
        headers.insert("Referer".to_string(), "https://host/".to_string());
        headers
    }

    fn target(url: &str) -> ProxyTarget {
        ProxyTarget::parse(url, referer_headers()).expect("valid test url")
    }

    fn base() -> ProxyBase {
        ProxyBase::new("127.0.0.1", 41321)
    }

    /// Decode `url` and `headers` back out of one proxied URI.
    fn decode_proxy_uri(proxied: &str) -> (String, HeaderSet) {
        let parsed = Url::parse(proxied).expect("proxied uri parses");
        let mut url_param = None;
        let mut headers_param = None;
        for (k, v) in parsed.query_pairs() {
            match k.as_ref() {
                "url" => url_param = Some(v.into_owned()),
                "headers" => headers_param = Some(v.into_owned()),
                _ => {}
            }
        }
        let headers: HeaderSet =
            serde_json::from_str(&headers_param.expect("headers param")).expect("headers json");
        (url_param.expect("url param"), headers)
    }

    #[test]
    fn test_master_rewrites_all_renditions_to_manifest_endpoint() {
        let text = "#EXTM3U\n\
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"English\",URI=\"audio/en.m3u8\"\n\
#EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"subs\",NAME=\"English\",URI=\"subs/en.m3u8\"\n\
#EXT-X-STREAM-INF:BANDWIDTH=1280000,AUDIO=\"aud\"\n\
low/video.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=2560000,AUDIO=\"aud\"\n\
high/video.m3u8\n";

        let outcome = rewrite_manifest(text, &target("https://cdn.example.com/hls/master.m3u8"), &base());
        assert!(outcome.is_rewritten());
        let rewritten = outcome.into_text();

        // Two variants plus two alternate tracks, nothing else.
        assert_eq!(rewritten.matches("/stream?url=").count(), 4);
        assert_eq!(rewritten.matches("/ts?url=").count(), 0);

        let expected = [
            "https://cdn.example.com/hls/audio/en.m3u8",
            "https://cdn.example.com/hls/subs/en.m3u8",
            "https://cdn.example.com/hls/low/video.m3u8",
            "https://cdn.example.com/hls/high/video.m3u8",
        ];
        let playlist = Playlist::parse(&rewritten).expect("rewritten parses");
        let entries: Vec<String> = playlist.entries().map(|(_, uri)| uri.to_string()).collect();
        assert_eq!(entries.len(), 4);
        for (proxied, expected_url) in entries.iter().zip(expected) {
            let (url, headers) = decode_proxy_uri(proxied);
            assert_eq!(url, expected_url);
            assert_eq!(headers, referer_headers());
        }
    }

    #[test]
    fn test_media_rewrites_key_map_and_segments_in_order() {
        let text = "#EXTM3U\n\
#EXT-X-TARGETDURATION:4\n\
#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0xabcd\n\
#EXT-X-MAP:URI=\"init.mp4\"\n\
#EXTINF:4.000,\n\
seg1.m4s\n\
#EXTINF:4.000,\n\
seg2.m4s\n\
#EXTINF:3.500,\n\
seg3.m4s\n\
#EXT-X-ENDLIST\n";

        let outcome = rewrite_manifest(text, &target("https://cdn.example.com/hls/media.m3u8"), &base());
        let rewritten = outcome.into_text();

        // Key + init + three segments all hit the binary endpoint.
        assert_eq!(rewritten.matches("/ts?url=").count(), 5);
        assert_eq!(rewritten.matches("/stream?url=").count(), 0);

        // Metadata bytes survive around the substituted URIs.
        assert!(rewritten.contains("#EXT-X-KEY:METHOD=AES-128,URI=\"http://127.0.0.1:41321/ts?url="));
        assert!(rewritten.contains(",IV=0xabcd\n"));
        assert!(rewritten.contains("#EXTINF:3.500,\n"));

        let playlist = Playlist::parse(&rewritten).expect("rewritten parses");
        let segment_urls: Vec<String> = playlist
            .entries()
            .filter(|(kind, _)| *kind == EntryKind::Segment)
            .map(|(_, uri)| decode_proxy_uri(uri).0)
            .collect();
        assert_eq!(
            segment_urls,
            [
                "https://cdn.example.com/hls/seg1.m4s",
                "https://cdn.example.com/hls/seg2.m4s",
                "https://cdn.example.com/hls/seg3.m4s",
            ]
        );
    }

    #[test]
    fn test_bom_prefixed_manifest_keeps_header_first() {
        let text = "\u{feff}#EXTM3U\n#EXT-X-VERSION:3\n#EXTINF:4.0,\nseg1.ts\n";
        let outcome =
            rewrite_manifest(text, &target("https://cdn.example.com/hls/media.m3u8"), &base());
        assert!(outcome.is_rewritten());
        let rewritten = outcome.into_text();

        // Only the segment is proxied; the header tag must not be.
        assert!(rewritten.starts_with("#EXTM3U\n"));
        assert_eq!(rewritten.matches("/ts?url=").count(), 1);

        let playlist = Playlist::parse(&rewritten).expect("rewritten parses");
        let (_, proxied) = playlist.entries().next().expect("one segment");
        let (url, _) = decode_proxy_uri(proxied);
        assert_eq!(url, "https://cdn.example.com/hls/seg1.ts");
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let text = "#EXTM3U\n\
#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
#EXT-X-MAP:URI=\"init.mp4\"\n\
#EXTINF:4.000,\n\
seg1.m4s\n";

        let manifest_target = target("https://cdn.example.com/hls/media.m3u8");
        let first = rewrite_manifest(text, &manifest_target, &base()).into_text();
        let second = rewrite_manifest(&first, &manifest_target, &base()).into_text();
        assert_eq!(first, second);
    }

    #[test]
    fn test_relative_variant_scenario() {
        let text = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nvariant1.m3u8\n";
        let outcome = rewrite_manifest(text, &target("https://host/path/master.m3u8"), &base());
        let rewritten = outcome.into_text();

        let playlist = Playlist::parse(&rewritten).expect("rewritten parses");
        let (_, proxied) = playlist.entries().next().expect("one rendition");
        let (url, headers) = decode_proxy_uri(proxied);
        assert_eq!(url, "https://host/path/variant1.m3u8");
        assert_eq!(headers["Referer"], "https://host/");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_absolute_uris_are_not_rebased() {
        let text = "#EXTM3U\n#EXTINF:4.0,\nhttps://other-cdn.example.net/seg1.ts\n";
        let rewritten =
            rewrite_manifest(text, &target("https://cdn.example.com/media.m3u8"), &base())
                .into_text();

        let playlist = Playlist::parse(&rewritten).expect("rewritten parses");
        let (_, proxied) = playlist.entries().next().expect("one segment");
        let (url, _) = decode_proxy_uri(proxied);
        assert_eq!(url, "https://other-cdn.example.net/seg1.ts");
    }

    #[test]
    fn test_unparseable_text_passes_through() {
        let text = "<html><body>origin error</body></html>";
        let outcome = rewrite_manifest(text, &target("https://host/master.m3u8"), &base());
        assert_eq!(outcome, RewriteOutcome::Passthrough(text.to_string()));
    }

    #[test]
    fn test_empty_playlist_rewrites_to_itself() {
        let text = "#EXTM3U\n#EXT-X-VERSION:3\n";
        let outcome = rewrite_manifest(text, &target("https://host/media.m3u8"), &base());
        assert_eq!(outcome, RewriteOutcome::Rewritten(text.to_string()));
    }

    #[test]
    fn test_textual_pass_patches_missed_map_uri() {
        // Simulates a serializer that dropped the structural rewrite of the
        // init segment tag.
        let rendered = "#EXTM3U\n#EXT-X-MAP:URI=\"init.mp4\"\nseg1.m4s\n";
        let patched = patch_missed_map_uris(
            rendered,
            &target("https://cdn.example.com/hls/media.m3u8"),
            &base(),
        );

        assert!(patched.contains("#EXT-X-MAP:URI=\"http://127.0.0.1:41321/ts?url="));
        let map_uri = patched
            .split("URI=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .expect("map uri");
        let (url, headers) = decode_proxy_uri(map_uri);
        assert_eq!(url, "https://cdn.example.com/hls/init.mp4");
        assert_eq!(headers["Referer"], "https://host/");
    }

    #[test]
    fn test_textual_pass_skips_already_proxied_uri() {
        let already = "#EXTM3U\n#EXT-X-MAP:URI=\"http://127.0.0.1:41321/ts?url=abc&headers=%7B%7D\"\n";
        let patched = patch_missed_map_uris(
            already,
            &target("https://cdn.example.com/hls/media.m3u8"),
            &base(),
        );
        assert_eq!(patched, already);
    }
}
