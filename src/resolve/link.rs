//! Per-server link resolution: payload → raw field → decode → classify.

use std::cmp::Reverse;

use serde_json::Value;
use url::Url;
use tracing::{debug, instrument};

use super::{
    Quality, ResolveError, ServerDescriptor, ServerLinks, StreamDescriptor, SubtitleDescriptor,
};
use crate::decode::xor_decode;
use crate::extract::{extract_urls, scalar_at, unescape_js};
use crate::fetch::Fetcher;
use crate::site::template::fill_vars;
use crate::site::{SiteProfile, StreamField, StreamSource, SubtitleField};

/// Resolve one server to at most one stream plus its subtitles.
///
/// Embed servers are rejected before any request is made.
#[instrument(skip_all, fields(site = %profile.id, server = %server.server_id))]
pub async fn resolve_server<F: Fetcher + ?Sized>(
    profile: &SiteProfile,
    fetcher: &F,
    server: &ServerDescriptor,
) -> Result<ServerLinks, ResolveError> {
    if server.is_embed() {
        return Err(ResolveError::Embed(server.server_id.clone()));
    }

    let payload = fetcher
        .fetch_stream_payload(server)
        .await
        .map_err(ResolveError::Fetch)?;
    debug!(bytes = payload.len(), "link payload received");

    links_from_payload(profile, server, &payload)
}

/// Pull a stream (and subtitles) for `server` out of an already fetched payload.
///
/// Within a field, the highest-quality usable candidate wins; earlier
/// candidates win ties. Relative links are resolved against the site's base
/// URL.
pub fn links_from_payload(
    profile: &SiteProfile,
    server: &ServerDescriptor,
    payload: &str,
) -> Result<ServerLinks, ResolveError> {
    let mut last_rejected = None;

    for field in profile.stream_fields_for(&server.server_id) {
        let mut accepted = Vec::new();
        for (raw, label_quality) in candidates(field, payload) {
            let value = prepare(field, &raw);
            let Some(is_segmented) = classify(&value) else {
                debug!(value = %value, "candidate is neither HLS nor MP4");
                last_rejected = Some(value);
                continue;
            };
            let Some(url) = absolute_url(&profile.base_url, &value) else {
                debug!(value = %value, "candidate cannot be made absolute");
                last_rejected = Some(value);
                continue;
            };
            accepted.push((url, is_segmented, label_quality.unwrap_or(field.quality)));
        }

        let best = accepted
            .into_iter()
            .min_by_key(|(_, _, quality)| Reverse(*quality));
        if let Some((url, is_segmented, quality)) = best {
            let stream = StreamDescriptor {
                url,
                source_label: field.label.clone().unwrap_or_else(|| server.label.clone()),
                quality,
                is_segmented,
                referer: Some(profile.referer()),
            };
            return Ok(ServerLinks {
                stream,
                subtitles: subtitles(profile, payload),
            });
        }
    }

    Err(match last_rejected {
        Some(value) => ResolveError::Unclassified(value),
        None => ResolveError::MissingField,
    })
}

/// Raw values a stream field yields, with a quality when the payload labels it.
fn candidates(field: &StreamField, payload: &str) -> Vec<(String, Option<Quality>)> {
    match &field.source {
        StreamSource::Field(locator) => locator
            .locate(payload)
            .map(|raw| vec![(raw, None)])
            .unwrap_or_default(),
        StreamSource::FileList {
            pointer,
            file,
            label,
        } => {
            let Ok(root) = serde_json::from_str::<Value>(payload) else {
                return Vec::new();
            };
            let Some(entries) = root.pointer(pointer).and_then(Value::as_array) else {
                return Vec::new();
            };
            entries
                .iter()
                .filter_map(|entry| {
                    let url = scalar_at(entry, &format!("/{file}"))?;
                    let quality = scalar_at(entry, &format!("/{label}"))
                        .map(|l| Quality::from_name(&l))
                        .filter(|q| *q != Quality::Unknown);
                    Some((url, quality))
                })
                .collect()
        }
    }
}

/// Decode, unescape and wrap a raw value as the field asks.
fn prepare(field: &StreamField, raw: &str) -> String {
    let mut value = match field.xor_key {
        Some(key) => xor_decode(raw, key),
        None => raw.to_string(),
    };
    if field.unescape {
        value = unescape_js(&value);
    }
    let value = value.trim().to_string();
    match &field.wrap {
        Some(template) if !is_url(&value) => {
            let wrapped = fill_vars(template, &[("value", value.as_str())]);
            wrapped.unwrap_or(value)
        }
        _ => value,
    }
}

fn is_url(value: &str) -> bool {
    value.starts_with("//") || value.contains("://")
}

/// `Some(true)` for HLS, `Some(false)` for progressive MP4, `None` otherwise.
pub fn classify(url: &str) -> Option<bool> {
    if url.contains(".m3u8") {
        Some(true)
    } else if url.contains(".mp4") {
        Some(false)
    } else {
        None
    }
}

/// Make protocol-relative URLs absolute over HTTPS. Idempotent.
pub fn normalize_url(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}

/// Absolute form of `url`, resolving paths against `base`.
///
/// `None` when `base` is not a URL or the join fails.
pub fn absolute_url(base: &str, url: &str) -> Option<String> {
    let url = normalize_url(url);
    if url.contains("://") {
        return Some(url);
    }
    let joined = Url::parse(base).ok()?.join(&url).ok()?;
    Some(joined.into())
}

fn subtitles(profile: &SiteProfile, payload: &str) -> Vec<SubtitleDescriptor> {
    let base = profile.base_url.trim_end_matches('/');
    let mut out: Vec<SubtitleDescriptor> = Vec::new();
    for field in &profile.subtitles {
        for url in subtitle_urls(field, payload, base) {
            if !out.iter().any(|s| s.url == url) {
                out.push(SubtitleDescriptor {
                    language_tag: profile.subtitle_language.clone(),
                    url,
                });
            }
        }
    }
    out
}

fn subtitle_urls(field: &SubtitleField, payload: &str, base: &str) -> Vec<String> {
    let Some(value) = field.at.locate(payload) else {
        return Vec::new();
    };
    if field.scan_urls {
        return extract_urls(&value);
    }
    let url = match &field.template {
        Some(template) => match fill_vars(template, &[("base", base), ("value", value.trim())]) {
            Ok(url) => url,
            Err(_) => return Vec::new(),
        },
        None => value.trim().to_string(),
    };
    absolute_url(base, &url).into_iter().collect()
}
