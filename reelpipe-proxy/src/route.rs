//! Self-referential URL scheme.
//!
//! Every child reference the rewriter emits carries its upstream URL and the
//! header set the host requires, percent-encoded into the query string. The
//! relay is therefore stateless across requests; nothing is keyed by a
//! session ID.

use std::net::SocketAddr;

use indexmap::IndexMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use reelpipe_core::MediaKind;

/// Manifest fetch+rewrite endpoint.
pub const MANIFEST_PATH: &str = "/stream";
/// Binary segment/key relay endpoint.
pub const SEGMENT_PATH: &str = "/ts";
/// Whole-file media relay endpoint.
pub const FILE_PATH: &str = "/video";
/// Embedded player page.
pub const PLAYER_PATH: &str = "/player";

/// Ordered header map. Insertion order survives JSON round-trips, so the
/// headers reach the upstream host exactly as the scraper supplied them.
pub type HeaderSet = IndexMap<String, String>;

/// Everything except unreserved characters gets escaped in query values.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, QUERY_VALUE).to_string()
}

/// An upstream resource plus the headers its host requires.
///
/// Immutable once constructed; owned by the proxy URL it is encoded into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    /// Always absolute; relative manifest URIs are resolved before a target
    /// is built.
    pub url: Url,
    pub headers: HeaderSet,
}

impl ProxyTarget {
    #[must_use]
    pub fn new(url: Url, headers: HeaderSet) -> Self {
        Self { url, headers }
    }

    /// Parse an absolute URL string into a target.
    pub fn parse(url: &str, headers: HeaderSet) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(url)?, headers))
    }

    /// The header set as compact JSON, insertion order intact.
    #[must_use]
    pub fn headers_json(&self) -> String {
        serde_json::to_string(&self.headers).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Decode the `headers` query parameter. Absent or undecodable input yields
/// an empty set; a bad header blob should degrade the fetch, not fail it.
#[must_use]
pub fn parse_header_set(raw: Option<&str>) -> HeaderSet {
    let Some(text) = raw else {
        return HeaderSet::new();
    };
    if text.is_empty() {
        return HeaderSet::new();
    }
    match serde_json::from_str(text) {
        Ok(set) => set,
        Err(e) => {
            tracing::debug!("ignoring undecodable headers parameter: {e}");
            HeaderSet::new()
        }
    }
}

/// Address the relay is reachable at, used to mint self-referential URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyBase {
    host: String,
    port: u16,
}

impl ProxyBase {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    #[must_use]
    pub fn from_addr(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `http://host:port`, no trailing slash.
    #[must_use]
    pub fn root(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    fn endpoint_url(&self, path: &str, target: &ProxyTarget) -> String {
        format!(
            "{}{}?url={}&headers={}",
            self.root(),
            path,
            encode_component(target.url.as_str()),
            encode_component(&target.headers_json())
        )
    }

    /// Proxy URL that fetches and rewrites a manifest.
    #[must_use]
    pub fn manifest_url(&self, target: &ProxyTarget) -> String {
        self.endpoint_url(MANIFEST_PATH, target)
    }

    /// Proxy URL that relays a segment or encryption key.
    #[must_use]
    pub fn segment_url(&self, target: &ProxyTarget) -> String {
        self.endpoint_url(SEGMENT_PATH, target)
    }

    /// Proxy URL that relays a whole media file with Range support.
    #[must_use]
    pub fn file_url(&self, target: &ProxyTarget) -> String {
        self.endpoint_url(FILE_PATH, target)
    }

    /// The URL handed to the playback consumer for a resolved stream.
    /// Embed pages go to the browser unproxied.
    #[must_use]
    pub fn playback_url(&self, kind: MediaKind, target: &ProxyTarget) -> String {
        match kind {
            MediaKind::Manifest => self.manifest_url(target),
            MediaKind::SingleFile => self.file_url(target),
            MediaKind::PlayerEmbed => target.url.to_string(),
        }
    }

    /// URL of the embedded player page wired to a resolved stream and an
    /// optional local subtitle file. An embed page is its own player and is
    /// returned unwrapped.
    #[must_use]
    pub fn player_url(
        &self,
        kind: MediaKind,
        target: &ProxyTarget,
        subtitle: Option<&str>,
    ) -> String {
        if kind == MediaKind::PlayerEmbed {
            return target.url.to_string();
        }
        let inner = self.playback_url(kind, target);
        let mut url = format!(
            "{}{}?url={}",
            self.root(),
            PLAYER_PATH,
            encode_component(&inner)
        );
        if let Some(sub) = subtitle {
            url.push_str("&sub_path=");
            url.push_str(&encode_component(sub));
        }
        url
    }

    /// True when `uri` already points at this relay; such a URI must never
    /// be wrapped a second time.
    #[must_use]
    pub fn owns_uri(&self, uri: &str) -> bool {
        uri.starts_with(&self.root())
    }
}
