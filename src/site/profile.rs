//! Per-site configuration records.
//!
//! A [`SiteProfile`] carries everything the pipeline needs to know about one
//! portal: where to ask for servers, how to read them, where to ask for links
//! and which fields hold the stream and subtitle values. Profiles are plain
//! data deserialized from TOML and never mutated after loading.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::extract::FieldLocator;
use crate::resolve::Quality;

/// Immutable configuration for one site.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteProfile {
    /// Registry key, lowercase (e.g. `"phim1080"`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Scheme and host without trailing slash.
    pub base_url: String,
    /// Language tag attached to every subtitle of this site.
    #[serde(default = "default_subtitle_language")]
    pub subtitle_language: String,
    /// Request returning the server list. Not needed for fixed servers whose
    /// token is the episode reference itself.
    #[serde(default)]
    pub server_list: Option<RequestTemplate>,
    /// How to read servers out of the server-list response.
    pub servers: ServerListFormat,
    /// Request returning the link payload for one server.
    pub stream_request: RequestTemplate,
    /// Servers with the same access token get the same payload, so it is
    /// fetched once per token.
    #[serde(default)]
    pub shared_payload: bool,
    /// Candidate stream fields, tried in order.
    #[serde(default)]
    pub streams: Vec<StreamField>,
    #[serde(default)]
    pub subtitles: Vec<SubtitleField>,
}

fn default_subtitle_language() -> String {
    "Vietnamese".to_string()
}

impl SiteProfile {
    /// Referer attached to resolved streams.
    pub fn referer(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }

    /// Stream fields that apply to `server_id`, in declaration order.
    pub fn stream_fields_for<'a>(
        &'a self,
        server_id: &'a str,
    ) -> impl Iterator<Item = &'a StreamField> + 'a {
        self.streams
            .iter()
            .filter(move |f| f.servers.is_empty() || f.servers.iter().any(|s| s == server_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// An HTTP request with `{placeholder}` templates.
///
/// Available placeholders: `{base}` and `{episode}` for the server-list
/// request; `{base}`, `{server_id}`, `{token}` and `{play}` for the stream
/// request.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestTemplate {
    #[serde(default)]
    pub method: Method,
    pub url: String,
    /// Form fields, sent urlencoded. Only meaningful for POST.
    #[serde(default)]
    pub form: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_embed_values() -> Vec<String> {
    vec!["embed".to_string()]
}

/// Shape of the server-list response.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerListFormat {
    /// HTML buttons, optionally wrapped in a JSON envelope such as
    /// `{"html": "<a class=btn3dsv ...>", "success": 1}`.
    Html {
        /// JSON pointer to the HTML fragment; the body is HTML when absent.
        #[serde(default)]
        envelope: Option<String>,
        /// CSS selector matching one element per server.
        selector: String,
        id_attr: String,
        token_attr: String,
        #[serde(default)]
        mode_attr: Option<String>,
        #[serde(default = "default_embed_values")]
        embed_values: Vec<String>,
    },
    /// JSON array of server objects.
    Json {
        /// JSON pointer to the array.
        items: String,
        id: String,
        label: String,
        token: String,
        #[serde(default)]
        mode: Option<String>,
        #[serde(default = "default_embed_values")]
        embed_values: Vec<String>,
    },
    /// A fixed set of logical servers sharing one access token.
    Fixed {
        /// Token read from the episode page; the episode reference is used
        /// as the token when absent.
        #[serde(default)]
        token: Option<TokenTemplate>,
        /// Regex whose first capture group pulls the token out of the episode
        /// reference (e.g. the id at the end of a page URL). Only used without
        /// `token`; a reference that does not match is used as is.
        #[serde(default)]
        episode_pattern: Option<String>,
        servers: Vec<FixedServer>,
    },
}

impl ServerListFormat {
    /// `true` if enumeration needs the server-list page at all.
    pub fn needs_page(&self) -> bool {
        !matches!(self, Self::Fixed { token: None, .. })
    }
}

/// Token built from the attributes of the first element matching `selector`,
/// e.g. `{data-id}/episodes/{data-episode-id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenTemplate {
    pub selector: String,
    pub template: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixedServer {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub embed: bool,
}

/// Where one candidate stream value lives in the link payload.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamField {
    /// Server ids this field applies to; all servers when empty.
    #[serde(default)]
    pub servers: Vec<String>,
    pub source: StreamSource,
    /// XOR key the site obfuscates this field with.
    #[serde(default)]
    pub xor_key: Option<u8>,
    /// Strip JavaScript backslash escapes before use.
    #[serde(default)]
    pub unescape: bool,
    /// Template applied when the value is a bare id rather than a URL;
    /// `{value}` is the extracted value.
    #[serde(default)]
    pub wrap: Option<String>,
    /// Quality reported when the payload does not say.
    #[serde(default)]
    pub quality: Quality,
    /// Overrides the server label as the stream's source label.
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSource {
    /// A single value.
    Field(FieldLocator),
    /// JSON array of `{file, label}` objects; the first usable entry wins.
    FileList {
        pointer: String,
        #[serde(default = "default_file_key")]
        file: String,
        #[serde(default = "default_label_key")]
        label: String,
    },
}

fn default_file_key() -> String {
    "file".to_string()
}

fn default_label_key() -> String {
    "label".to_string()
}

/// Where subtitle values live in the link payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SubtitleField {
    pub at: FieldLocator,
    /// Turns an extracted id into a URL, e.g. `{base}/subtitle/{value}.vtt`.
    #[serde(default)]
    pub template: Option<String>,
    /// Treat the located span as free text and collect every URL in it.
    #[serde(default)]
    pub scan_urls: bool,
}
