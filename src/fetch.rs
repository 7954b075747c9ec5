//! The two network capabilities the pipeline consumes.
//!
//! [`Fetcher`] is the seam between the resolution core and whoever owns the
//! network. [`HttpFetcher`] is the default implementation: it renders a site
//! profile's request templates and sends them through a [`SiteClient`]. Hosts
//! with their own HTTP stack (or tests) implement the trait directly.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use crate::http_client::SiteClient;
use crate::resolve::{EpisodeRef, ServerDescriptor};
use crate::site::template::fill_vars;
use crate::site::{Method, RequestTemplate, SiteProfile};

/// Network access injected into a [`LinkResolver`](crate::resolve::LinkResolver).
///
/// Implementations own timeouts; the pipeline relies on every call
/// eventually returning.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the document listing the episode's servers (or the episode page
    /// for sites with a fixed server set).
    async fn fetch_server_list_page(&self, episode: &EpisodeRef) -> Result<String>;

    /// Fetch the link payload for one server, keyed by its id and token.
    async fn fetch_stream_payload(&self, server: &ServerDescriptor) -> Result<String>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch_server_list_page(&self, episode: &EpisodeRef) -> Result<String> {
        (**self).fetch_server_list_page(episode).await
    }

    async fn fetch_stream_payload(&self, server: &ServerDescriptor) -> Result<String> {
        (**self).fetch_stream_payload(server).await
    }
}

/// [`Fetcher`] that speaks HTTP according to a [`SiteProfile`].
pub struct HttpFetcher {
    client: SiteClient,
    profile: Arc<SiteProfile>,
}

impl HttpFetcher {
    pub fn new(client: SiteClient, profile: Arc<SiteProfile>) -> Self {
        Self { client, profile }
    }

    async fn execute(&self, template: &RequestTemplate, vars: &[(&str, &str)]) -> Result<String> {
        let request = render_request(template, vars)?;
        match template.method {
            Method::Get => self.client.get_text(&request.url, &request.headers).await,
            Method::Post => {
                self.client
                    .post_form_text(&request.url, &request.form, &request.headers)
                    .await
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_server_list_page(&self, episode: &EpisodeRef) -> Result<String> {
        let template = self
            .profile
            .server_list
            .as_ref()
            .ok_or_else(|| anyhow!("site {} has no server list request", self.profile.id))?;
        let base = self.profile.base_url.trim_end_matches('/');
        self.execute(template, &[("base", base), ("episode", episode.as_str())])
            .await
    }

    async fn fetch_stream_payload(&self, server: &ServerDescriptor) -> Result<String> {
        let base = self.profile.base_url.trim_end_matches('/');
        self.execute(
            &self.profile.stream_request,
            &[
                ("base", base),
                ("server_id", server.server_id.as_str()),
                ("token", server.access_token.as_str()),
                ("play", server.play_value.as_str()),
            ],
        )
        .await
    }
}

/// A request template with every placeholder filled in.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RenderedRequest {
    pub url: String,
    pub form: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

pub(crate) fn render_request(
    template: &RequestTemplate,
    vars: &[(&str, &str)],
) -> Result<RenderedRequest> {
    let fill = |s: &str| {
        fill_vars(s, vars).map_err(|name| anyhow!("unknown placeholder {{{name}}} in {s:?}"))
    };
    let fill_map = |map: &BTreeMap<String, String>| {
        map.iter()
            .map(|(k, v)| -> Result<(String, String)> { Ok((k.clone(), fill(v.as_str())?)) })
            .collect::<Result<BTreeMap<_, _>>>()
    };

    let url = fill(template.url.as_str())?;
    url::Url::parse(&url).with_context(|| format!("request URL {url:?} is not absolute"))?;

    Ok(RenderedRequest {
        url,
        form: fill_map(&template.form)?,
        headers: fill_map(&template.headers)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteRegistry;

    #[test]
    fn renders_animevietsub_stream_request() {
        let registry = SiteRegistry::builtin().unwrap();
        let site = registry.get("animevietsub").unwrap();
        let request = render_request(
            &site.stream_request,
            &[
                ("base", "https://animevietsub.moe"),
                ("server_id", "7"),
                ("token", "abcXYZ"),
                ("play", "api"),
            ],
        )
        .unwrap();
        assert_eq!(request.url, "https://animevietsub.moe/ajax/player?v=2019a");
        assert_eq!(request.form["link"], "abcXYZ");
        assert_eq!(request.form["id"], "7");
        assert_eq!(request.form["play"], "api");
    }

    #[test]
    fn renders_phim1080_headers() {
        let registry = SiteRegistry::builtin().unwrap();
        let site = registry.get("phim1080").unwrap();
        let request = render_request(
            &site.stream_request,
            &[
                ("base", "https://xem1080.com"),
                ("server_id", "hls"),
                ("token", "1/episodes/2"),
                ("play", "stream"),
            ],
        )
        .unwrap();
        assert_eq!(request.url, "https://xem1080.com/api/v2/films/1/episodes/2");
        assert_eq!(request.headers["Referer"], "https://xem1080.com/");
        assert_eq!(request.headers["X-Requested-With"], "XMLHttpRequest");
        assert!(request.form.is_empty());
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let template = RequestTemplate {
            method: Method::Get,
            url: "{base}/{episode}".into(),
            form: BTreeMap::new(),
            headers: BTreeMap::new(),
        };
        let err = render_request(&template, &[("base", "https://a.example")]).unwrap_err();
        assert!(err.to_string().contains("{episode}"));
    }

    #[test]
    fn rejects_relative_url() {
        let template = RequestTemplate {
            method: Method::Get,
            url: "{episode}".into(),
            form: BTreeMap::new(),
            headers: BTreeMap::new(),
        };
        assert!(render_request(&template, &[("episode", "tap-1")]).is_err());
    }

    #[tokio::test]
    async fn missing_server_list_request_is_an_error() {
        let registry = SiteRegistry::builtin().unwrap();
        let site = registry.get("phimmoichill").unwrap();
        let fetcher = HttpFetcher::new(SiteClient::new().unwrap(), site);
        let result = fetcher
            .fetch_server_list_page(&EpisodeRef::from("pm123"))
            .await;
        assert!(result.is_err());
    }
}
