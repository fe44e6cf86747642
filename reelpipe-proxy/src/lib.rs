//! Relay machinery for the local streaming proxy.
//!
//! Upstream fetching with retry and linear backoff, the self-referential
//! proxy URL scheme, typed manifest rewriting, and bounded-chunk body
//! relay. The HTTP surface in `reelpipe-api` is a thin layer over these
//! pieces.

pub mod backoff;
pub mod playlist;
pub mod relay;
pub mod rewrite;
pub mod route;
pub mod upstream;

pub use playlist::{EntryKind, Playlist, PlaylistKind};
pub use relay::{relay_stream, ChunkedRelay};
pub use rewrite::{rewrite_manifest, RewriteOutcome};
pub use route::{
    parse_header_set, HeaderSet, ProxyBase, ProxyTarget, FILE_PATH, MANIFEST_PATH, PLAYER_PATH,
    SEGMENT_PATH,
};
pub use upstream::{FetchError, UpstreamClient};
