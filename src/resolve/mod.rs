//! Link resolution pipeline.
//!
//! Given an episode reference, a [`LinkResolver`] enumerates the site's mirror
//! servers, resolves every non-embed server concurrently and merges whatever
//! streams and subtitles come back into a [`ResolutionResult`]. Per-server
//! failures never escape: a broken mirror simply contributes nothing.
//!
//! ```text
//! EpisodeRef ─► servers::list ─► link::resolve × N (concurrent) ─► aggregate ─► ResolutionResult
//! ```

pub mod aggregate;
pub mod link;
pub mod servers;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use aggregate::LinkResolver;
pub use link::{absolute_url, classify, normalize_url};

/// Opaque caller-owned identifier of an episode (page URL or site id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EpisodeRef(String);

impl EpisodeRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EpisodeRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EpisodeRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EpisodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a server yields a direct media link or only a third-party embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    Stream,
    Embed,
}

/// One mirror server as enumerated from the site's player endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerDescriptor {
    /// Site-issued server id.
    pub server_id: String,
    /// Human-readable label (e.g. `"HDX"`, `"FB"`).
    pub label: String,
    pub play_mode: PlayMode,
    /// Raw play-mode value as the site sent it; some sites echo it back.
    pub play_value: String,
    /// Opaque hash or link fragment identifying the stream.
    pub access_token: String,
}

impl ServerDescriptor {
    pub fn is_embed(&self) -> bool {
        self.play_mode == PlayMode::Embed
    }
}

/// Vertical resolution of a stream, when the site tells us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Quality {
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "2160p")]
    P2160,
}

impl Quality {
    /// Parse a quality out of a free-form label such as `"1080p"`, `"HD 720"`
    /// or `"4K"`.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("4k") || lower.contains("2160") {
            return Self::P2160;
        }
        let digits: String = lower
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(char::is_ascii_digit)
            .collect();
        match digits.parse::<u32>() {
            Ok(1440) => Self::P1440,
            Ok(1080) => Self::P1080,
            Ok(720) => Self::P720,
            Ok(480) => Self::P480,
            Ok(360) => Self::P360,
            _ if lower.contains("fhd") => Self::P1080,
            _ if lower.contains("hd") => Self::P720,
            _ => Self::Unknown,
        }
    }

    /// Height in pixels, `None` for [`Quality::Unknown`].
    pub fn height(self) -> Option<u32> {
        match self {
            Self::Unknown => None,
            Self::P360 => Some(360),
            Self::P480 => Some(480),
            Self::P720 => Some(720),
            Self::P1080 => Some(1080),
            Self::P1440 => Some(1440),
            Self::P2160 => Some(2160),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.height() {
            Some(h) => f.pad(&format!("{h}p")),
            None => f.pad("unknown"),
        }
    }
}

/// A playable stream. The URL is always absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDescriptor {
    pub url: String,
    /// Label of the server the stream came from.
    pub source_label: String,
    pub quality: Quality,
    /// `true` for HLS manifests, `false` for progressive MP4.
    pub is_segmented: bool,
    /// Referer the player has to send, if the site checks it.
    pub referer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtitleDescriptor {
    pub language_tag: String,
    pub url: String,
}

/// What a single server contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLinks {
    pub stream: StreamDescriptor,
    pub subtitles: Vec<SubtitleDescriptor>,
}

/// Why a single server produced nothing. Never surfaces past the aggregator.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("server {0} only offers an embed player")]
    Embed(String),

    #[error("request failed: {0:#}")]
    Fetch(anyhow::Error),

    #[error("no stream field found in response")]
    MissingField,

    #[error("not an HLS or MP4 link: {0}")]
    Unclassified(String),
}

/// Streams and subtitles merged across all servers of one episode.
///
/// Entries appear in the order servers finished resolving, not in
/// server-list order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionResult {
    pub streams: Vec<StreamDescriptor>,
    pub subtitles: Vec<SubtitleDescriptor>,
    /// Servers the enumerator returned, embed ones included.
    pub servers_listed: usize,
    /// Embed servers skipped without a request.
    pub servers_skipped: usize,
    /// Servers whose resolution failed.
    pub servers_failed: usize,
}

impl ResolutionResult {
    /// `true` when no stream was found ("no link found" for the user).
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub(crate) fn push(&mut self, links: ServerLinks) {
        self.streams.push(links.stream);
        for subtitle in links.subtitles {
            if !self.subtitles.iter().any(|s| s.url == subtitle.url) {
                self.subtitles.push(subtitle);
            }
        }
    }
}
