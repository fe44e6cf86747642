//! Typed, order-preserving model of an extended-M3U playlist.
//!
//! The parser keeps every byte it does not understand: only entry URIs are
//! addressable, everything else (attribute lists, durations, comments) rides
//! along verbatim. Entry order is playback order and survives a
//! parse/rewrite/render cycle exactly.

/// Whether a playlist lists renditions (master) or media segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    Master,
    Media,
}

/// Classification of one rewritable reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Variant stream or alternate track referenced from a master playlist.
    Rendition,
    /// Encryption key resource.
    Key,
    /// Initialization segment required before the first media segment.
    InitSegment,
    /// One media segment.
    Segment,
}

#[derive(Debug, Clone)]
enum Line {
    /// Tag line carrying a `URI="..."` attribute. `prefix` ends just after
    /// the opening quote, `suffix` starts at the closing quote.
    TagUri {
        kind: EntryKind,
        prefix: String,
        uri: String,
        suffix: String,
    },
    /// Bare URI line: a rendition in a master playlist, a segment in a
    /// media playlist.
    BareUri { kind: EntryKind, uri: String },
    /// Anything else, emitted untouched.
    Verbatim(String),
}

/// The text is not an extended-M3U playlist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not an extended M3U playlist")]
pub struct NotAPlaylist;

#[derive(Debug, Clone)]
pub struct Playlist {
    kind: PlaylistKind,
    lines: Vec<Line>,
}

impl Playlist {
    /// Parse playlist text. Fails only when the `#EXTM3U` header is absent;
    /// unknown tags never fail, they pass through verbatim.
    pub fn parse(text: &str) -> Result<Self, NotAPlaylist> {
        // `str::trim` does not strip a UTF-8 BOM, and a BOM-carrying header
        // line would classify as a bare URI. Drop it up front.
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut significant = text.lines().map(str::trim).filter(|line| !line.is_empty());
        match significant.next() {
            Some(first) if first.starts_with("#EXTM3U") => {}
            _ => return Err(NotAPlaylist),
        }

        let kind = if text
            .lines()
            .any(|line| line.trim_start().starts_with("#EXT-X-STREAM-INF"))
        {
            PlaylistKind::Master
        } else {
            PlaylistKind::Media
        };

        let lines = text.lines().map(|raw| classify_line(raw, kind)).collect();
        Ok(Self { kind, lines })
    }

    #[must_use]
    pub fn kind(&self) -> PlaylistKind {
        self.kind
    }

    /// Entry URIs in playback order.
    pub fn entries(&self) -> impl Iterator<Item = (EntryKind, &str)> {
        self.lines.iter().filter_map(|line| match line {
            Line::TagUri { kind, uri, .. } | Line::BareUri { kind, uri } => {
                Some((*kind, uri.as_str()))
            }
            Line::Verbatim(_) => None,
        })
    }

    /// Replace every entry URI through `map`. Order and all non-URI bytes
    /// are untouched.
    pub fn rewrite_uris<F>(&mut self, mut map: F)
    where
        F: FnMut(EntryKind, &str) -> String,
    {
        for line in &mut self.lines {
            match line {
                Line::TagUri { kind, uri, .. } | Line::BareUri { kind, uri } => {
                    *uri = map(*kind, uri);
                }
                Line::Verbatim(_) => {}
            }
        }
    }

    /// Serialize back to playlist text. Line endings are normalized to
    /// `\n`; everything else reproduces the input.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::TagUri {
                    prefix,
                    uri,
                    suffix,
                    ..
                } => {
                    out.push_str(prefix);
                    out.push_str(uri);
                    out.push_str(suffix);
                }
                Line::BareUri { uri, .. } => out.push_str(uri),
                Line::Verbatim(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }
}

fn classify_line(raw: &str, playlist: PlaylistKind) -> Line {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Line::Verbatim(raw.to_string());
    }

    if trimmed.starts_with('#') {
        let tag_kind = match playlist {
            PlaylistKind::Master if trimmed.starts_with("#EXT-X-MEDIA:") => {
                Some(EntryKind::Rendition)
            }
            PlaylistKind::Media if trimmed.starts_with("#EXT-X-KEY:") => Some(EntryKind::Key),
            PlaylistKind::Media if trimmed.starts_with("#EXT-X-MAP:") => {
                Some(EntryKind::InitSegment)
            }
            _ => None,
        };
        if let Some(kind) = tag_kind {
            // A key tag with METHOD=NONE legitimately has no URI.
            if let Some(line) = split_uri_attribute(raw, kind) {
                return line;
            }
        }
        return Line::Verbatim(raw.to_string());
    }

    let kind = match playlist {
        PlaylistKind::Master => EntryKind::Rendition,
        PlaylistKind::Media => EntryKind::Segment,
    };
    Line::BareUri {
        kind,
        uri: trimmed.to_string(),
    }
}

fn split_uri_attribute(raw: &str, kind: EntryKind) -> Option<Line> {
    let pattern = "URI=\"";
    let start = raw.find(pattern)? + pattern.len();
    let end = raw[start..].find('"')? + start;
    Some(Line::TagUri {
        kind,
        prefix: raw[..start].to_string(),
        uri: raw[start..end].to_string(),
        suffix: raw[end..].to_string(),
    })
}
