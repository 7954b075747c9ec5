//! HTTP client tuned for portal AJAX endpoints.
//!
//! Features:
//! - HTTP/2 where offered, HTTP/1.1 otherwise
//! - Connection pooling with keep-alive (the per-server fan-out reuses connections)
//! - Brotli, Gzip, Deflate compression
//! - Cookie store (some portals hand out a session cookie on the episode page)
//! - Connect and request timeouts, so a dead mirror cannot stall a resolution
//! - Mobile browser User-Agent; several portals serve bots an empty player

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, instrument};

/// Android Chrome User-Agent; the portals' players expect a phone.
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; SM-G981B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/80.0.3987.162 Mobile Safari/537.36 Edg/114.0.0.0";

/// Client settings, the `[client]` table of `sites.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: MOBILE_USER_AGENT.to_string(),
        }
    }
}

/// Shared HTTP client for all site requests.
#[derive(Debug, Clone)]
pub struct SiteClient {
    client: Client,
}

impl SiteClient {
    /// Create a client with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(&ClientConfig::default())
    }

    pub fn with_config(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            // ═══════════════════════════════════════════════════════════════
            // CONNECTIONS
            // ═══════════════════════════════════════════════════════════════
            .http2_adaptive_window(true)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .use_rustls_tls()
            // ═══════════════════════════════════════════════════════════════
            // COMPRESSION
            // ═══════════════════════════════════════════════════════════════
            .brotli(true)
            .gzip(true)
            .deflate(true)
            // ═══════════════════════════════════════════════════════════════
            // IDENTITY & SESSION
            // ═══════════════════════════════════════════════════════════════
            .user_agent(config.user_agent.as_str())
            .cookie_store(true)
            // ═══════════════════════════════════════════════════════════════
            // TIMEOUTS
            // ═══════════════════════════════════════════════════════════════
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client })
    }

    /// GET `url` and return the body.
    pub async fn get_text(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<String> {
        self.send(self.client.get(url), url, headers).await
    }

    /// POST `form` urlencoded to `url` and return the body.
    pub async fn post_form_text(
        &self,
        url: &str,
        form: &BTreeMap<String, String>,
        headers: &BTreeMap<String, String>,
    ) -> Result<String> {
        self.send(self.client.post(url).form(form), url, headers).await
    }

    #[instrument(skip(self, request, headers), fields(url = %url))]
    async fn send(
        &self,
        request: RequestBuilder,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<String> {
        let response = request
            .headers(to_header_map(headers)?)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        debug!(status = %status, version = ?response.version(), "Response received");
        if !status.is_success() {
            bail!("{url} returned {status}");
        }

        response
            .text()
            .await
            .with_context(|| format!("failed to read body from {url}"))
    }
}

fn to_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid header name {name:?}"))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("invalid value for header {name}"))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_mobile_agent() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.user_agent.contains("Android"));
    }

    #[test]
    fn header_map_accepts_site_headers() {
        let headers = BTreeMap::from([
            ("X-Requested-With".to_string(), "XMLHttpRequest".to_string()),
            ("Referer".to_string(), "https://xem1080.com/".to_string()),
        ]);
        let map = to_header_map(&headers).unwrap();
        assert_eq!(map.get("x-requested-with").unwrap(), "XMLHttpRequest");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn header_map_rejects_bad_names() {
        let headers = BTreeMap::from([("Bad Header".to_string(), "x".to_string())]);
        assert!(to_header_map(&headers).is_err());
    }

    #[test]
    fn builds_client() {
        assert!(SiteClient::new().is_ok());
    }
}
