//! Server enumeration: turning a server-list document into descriptors.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use super::{EpisodeRef, PlayMode, ServerDescriptor};
use crate::extract::scalar_at;
use crate::fetch::Fetcher;
use crate::site::template::fill;
use crate::site::{FixedServer, ServerListFormat, SiteProfile};

/// List the servers of `episode`.
///
/// A failed fetch or unparseable document yields an empty list. Embed
/// servers are kept, flagged with [`PlayMode::Embed`].
pub async fn list_servers<F: Fetcher + ?Sized>(
    profile: &SiteProfile,
    fetcher: &F,
    episode: &EpisodeRef,
) -> Vec<ServerDescriptor> {
    if !profile.servers.needs_page() {
        return parse_servers(&profile.servers, "", episode);
    }

    match fetcher.fetch_server_list_page(episode).await {
        Ok(document) => {
            let servers = parse_servers(&profile.servers, &document, episode);
            debug!(site = %profile.id, %episode, count = servers.len(), "servers listed");
            servers
        }
        Err(e) => {
            warn!(site = %profile.id, %episode, "server list fetch failed: {e:#}");
            Vec::new()
        }
    }
}

/// Parse `document` according to `format`. Never fails; bad input gives an
/// empty list.
pub fn parse_servers(
    format: &ServerListFormat,
    document: &str,
    episode: &EpisodeRef,
) -> Vec<ServerDescriptor> {
    match format {
        ServerListFormat::Html {
            envelope,
            selector,
            id_attr,
            token_attr,
            mode_attr,
            embed_values,
        } => {
            let fragment = match envelope {
                Some(pointer) => match unwrap_envelope(document, pointer) {
                    Some(html) => html,
                    None => {
                        warn!("server list envelope {pointer} missing or not JSON");
                        return Vec::new();
                    }
                },
                None => document.to_string(),
            };
            let Some(selector) = parse_selector(selector) else {
                return Vec::new();
            };
            let html = Html::parse_fragment(&fragment);
            html.select(&selector)
                .filter_map(|el| {
                    let server_id = el.value().attr(id_attr)?.trim().to_string();
                    let play_value = mode_attr
                        .as_deref()
                        .and_then(|attr| el.value().attr(attr))
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    Some(ServerDescriptor {
                        server_id,
                        label: element_text(el),
                        play_mode: play_mode(&play_value, embed_values),
                        access_token: el.value().attr(token_attr).unwrap_or_default().to_string(),
                        play_value,
                    })
                })
                .collect()
        }
        ServerListFormat::Json {
            items,
            id,
            label,
            token,
            mode,
            embed_values,
        } => {
            let Ok(root) = serde_json::from_str::<Value>(document) else {
                warn!("server list is not JSON");
                return Vec::new();
            };
            let Some(entries) = root.pointer(items).and_then(Value::as_array) else {
                warn!("server list has no array at {items}");
                return Vec::new();
            };
            entries
                .iter()
                .filter_map(|entry| {
                    let server_id = field(entry, id)?;
                    let play_value = mode
                        .as_deref()
                        .and_then(|m| field(entry, m))
                        .unwrap_or_default();
                    Some(ServerDescriptor {
                        label: field(entry, label).unwrap_or_else(|| server_id.clone()),
                        server_id,
                        play_mode: play_mode(&play_value, embed_values),
                        access_token: field(entry, token).unwrap_or_default(),
                        play_value,
                    })
                })
                .collect()
        }
        ServerListFormat::Fixed {
            token,
            episode_pattern,
            servers,
        } => {
            let access_token = match token {
                None => token_from_episode(episode, episode_pattern.as_deref()),
                Some(t) => match token_from_page(document, &t.selector, &t.template) {
                    Some(token) => token,
                    None => {
                        warn!(selector = %t.selector, "episode page has no server token");
                        return Vec::new();
                    }
                },
            };
            fixed_servers(servers, &access_token)
        }
    }
}

fn fixed_servers(servers: &[FixedServer], access_token: &str) -> Vec<ServerDescriptor> {
    servers
        .iter()
        .map(|s| {
            let play_mode = if s.embed {
                PlayMode::Embed
            } else {
                PlayMode::Stream
            };
            ServerDescriptor {
                server_id: s.id.clone(),
                label: s.label.clone(),
                play_mode,
                play_value: if s.embed { "embed" } else { "stream" }.to_string(),
                access_token: access_token.to_string(),
            }
        })
        .collect()
}

/// Apply `pattern` to the episode reference, falling back to the whole
/// reference when there is no pattern or no match.
fn token_from_episode(episode: &EpisodeRef, pattern: Option<&str>) -> String {
    let raw = episode.as_str();
    let Some(pattern) = pattern else {
        return raw.to_string();
    };
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!("invalid episode pattern {pattern:?}: {e}");
            return raw.to_string();
        }
    };
    re.captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| raw.to_string(), |m| m.as_str().to_string())
}

fn play_mode(value: &str, embed_values: &[String]) -> PlayMode {
    if embed_values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        PlayMode::Embed
    } else {
        PlayMode::Stream
    }
}

fn unwrap_envelope(document: &str, pointer: &str) -> Option<String> {
    let root: Value = serde_json::from_str(document).ok()?;
    root.pointer(pointer)?.as_str().map(str::to_string)
}

/// Render `template` from the attributes of the first `selector` match.
fn token_from_page(document: &str, selector: &str, template: &str) -> Option<String> {
    let selector = parse_selector(selector)?;
    let html = Html::parse_document(document);
    let element = html.select(&selector).next()?;
    let token = fill(template, |attr| {
        element
            .value()
            .attr(attr)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
    .ok()?;
    Some(token)
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("invalid CSS selector {selector:?}: {e:?}");
            None
        }
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn field(entry: &Value, name: &str) -> Option<String> {
    scalar_at(entry, &format!("/{name}")).filter(|v| !v.is_empty())
}
