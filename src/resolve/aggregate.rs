//! Concurrent fan-out over servers and merging of their results.

use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, instrument, warn};

use super::link::{links_from_payload, resolve_server};
use super::servers::list_servers;
use super::{EpisodeRef, ResolutionResult, ResolveError, ServerDescriptor, ServerLinks};
use crate::fetch::Fetcher;
use crate::site::SiteProfile;

/// Resolves episodes of one site into playable links.
///
/// Holds the site's immutable profile and the injected [`Fetcher`]; all other
/// state lives inside a single resolution call.
///
/// # Example
///
/// ```rust,no_run
/// use vnlink::{HttpFetcher, LinkResolver, SiteClient, SiteRegistry};
///
/// # async fn example() -> anyhow::Result<()> {
/// let site = SiteRegistry::builtin()?.get("phim1080").expect("built-in site");
/// let fetcher = HttpFetcher::new(SiteClient::new()?, site.clone());
/// let resolver = LinkResolver::new(site, fetcher);
///
/// let result = resolver.resolve_all(&"https://xem1080.com/phim/tap-1".into()).await;
/// for stream in &result.streams {
///     println!("{} {} {}", stream.source_label, stream.quality, stream.url);
/// }
/// # Ok(())
/// # }
/// ```
pub struct LinkResolver<F> {
    profile: Arc<SiteProfile>,
    fetcher: F,
}

impl<F: Fetcher> LinkResolver<F> {
    pub fn new(profile: Arc<SiteProfile>, fetcher: F) -> Self {
        Self { profile, fetcher }
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    /// Enumerate the episode's servers. Empty on any failure.
    pub async fn list_servers(&self, episode: &EpisodeRef) -> Vec<ServerDescriptor> {
        list_servers(&self.profile, &self.fetcher, episode).await
    }

    /// Resolve a single server.
    pub async fn resolve(&self, server: &ServerDescriptor) -> Result<ServerLinks, ResolveError> {
        resolve_server(&self.profile, &self.fetcher, server).await
    }

    /// Enumerate servers and resolve all of them.
    ///
    /// Never fails: an empty result means no link was found.
    #[instrument(skip(self), fields(site = %self.profile.id))]
    pub async fn resolve_all(&self, episode: &EpisodeRef) -> ResolutionResult {
        let servers = self.list_servers(episode).await;
        self.resolve_servers(servers).await
    }

    /// Like [`resolve_all`](Self::resolve_all), but stops early when `cancel`
    /// completes. In-flight requests are dropped; servers that already
    /// resolved are kept.
    pub async fn resolve_all_until<C>(&self, episode: &EpisodeRef, cancel: C) -> ResolutionResult
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let servers = tokio::select! {
            servers = self.list_servers(episode) => servers,
            () = &mut cancel => {
                debug!(%episode, "cancelled during server enumeration");
                return ResolutionResult::default();
            }
        };
        self.collect(servers, cancel).await
    }

    /// Resolve every non-embed server in `servers` concurrently.
    ///
    /// Results are merged in completion order. Failed servers are logged and
    /// counted, never propagated.
    pub async fn resolve_servers(&self, servers: Vec<ServerDescriptor>) -> ResolutionResult {
        self.collect(servers, std::future::pending::<()>()).await
    }

    async fn collect<C>(&self, servers: Vec<ServerDescriptor>, cancel: C) -> ResolutionResult
    where
        C: Future<Output = ()>,
    {
        let mut result = ResolutionResult {
            servers_listed: servers.len(),
            ..ResolutionResult::default()
        };

        let (embed, playable): (Vec<_>, Vec<_>) =
            servers.into_iter().partition(ServerDescriptor::is_embed);
        result.servers_skipped = embed.len();
        for server in &embed {
            debug!(server = %server.server_id, label = %server.label, "skipping embed server");
        }

        let mut pending: FuturesUnordered<_> = group_servers(&playable, self.profile.shared_payload)
            .into_iter()
            .map(|group| self.resolve_group(group))
            .collect();

        tokio::pin!(cancel);
        loop {
            let next = tokio::select! {
                next = pending.next() => next,
                () = &mut cancel => {
                    debug!(unresolved = pending.len(), "resolution cancelled");
                    break;
                }
            };
            let Some(outcomes) = next else {
                break;
            };
            for (server, outcome) in outcomes {
                match outcome {
                    Ok(links) => {
                        debug!(server = %server.server_id, url = %links.stream.url, "server resolved");
                        result.push(links);
                    }
                    Err(e) => {
                        warn!(site = %self.profile.id, server = %server.server_id, "server failed: {e}");
                        result.servers_failed += 1;
                    }
                }
            }
        }

        info!(
            site = %self.profile.id,
            streams = result.streams.len(),
            subtitles = result.subtitles.len(),
            failed = result.servers_failed,
            skipped = result.servers_skipped,
            "resolution finished"
        );
        result
    }

    /// Resolve servers that share one payload with a single request.
    async fn resolve_group<'s>(
        &self,
        group: Vec<&'s ServerDescriptor>,
    ) -> Vec<(&'s ServerDescriptor, Result<ServerLinks, ResolveError>)> {
        let Some(&first) = group.first() else {
            return Vec::new();
        };
        if group.len() == 1 {
            return vec![(first, self.resolve(first).await)];
        }

        match self.fetcher.fetch_stream_payload(first).await {
            Ok(payload) => {
                debug!(token = %first.access_token, servers = group.len(), "shared payload received");
                group
                    .into_iter()
                    .map(|server| (server, links_from_payload(&self.profile, server, &payload)))
                    .collect()
            }
            Err(e) => group
                .into_iter()
                .map(|server| (server, Err(ResolveError::Fetch(anyhow!("{e:#}")))))
                .collect(),
        }
    }
}

/// One group per server, or per access token when the payload is shared.
fn group_servers(servers: &[ServerDescriptor], shared: bool) -> Vec<Vec<&ServerDescriptor>> {
    if !shared {
        return servers.iter().map(|server| vec![server]).collect();
    }
    let mut groups: Vec<Vec<&ServerDescriptor>> = Vec::new();
    for server in servers {
        let existing = groups.iter_mut().find(|group| {
            group
                .first()
                .is_some_and(|g| g.access_token == server.access_token)
        });
        match existing {
            Some(group) => group.push(server),
            None => groups.push(vec![server]),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use super::*;
    use crate::decode::xor_decode;
    use crate::resolve::PlayMode;
    use crate::site::SiteRegistry;

    /// In-memory fetcher: canned server list plus payloads keyed by server id.
    #[derive(Default)]
    struct FakeFetcher {
        server_list: Option<String>,
        payloads: HashMap<String, Result<String, String>>,
        delays: HashMap<String, Duration>,
        stream_calls: Mutex<Vec<String>>,
        list_calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn with_list(mut self, list: &str) -> Self {
            self.server_list = Some(list.to_string());
            self
        }

        fn with_payload(mut self, id: &str, payload: &str) -> Self {
            self.payloads.insert(id.into(), Ok(payload.into()));
            self
        }

        fn with_error(mut self, id: &str) -> Self {
            self.payloads.insert(id.into(), Err("connection reset".into()));
            self
        }

        fn with_delay(mut self, id: &str, delay: Duration) -> Self {
            self.delays.insert(id.into(), delay);
            self
        }

        fn stream_calls(&self) -> Vec<String> {
            self.stream_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch_server_list_page(&self, _episode: &EpisodeRef) -> Result<String> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.server_list
                .clone()
                .ok_or_else(|| anyhow!("server list unavailable"))
        }

        async fn fetch_stream_payload(&self, server: &ServerDescriptor) -> Result<String> {
            self.stream_calls
                .lock()
                .unwrap()
                .push(server.server_id.clone());
            if let Some(delay) = self.delays.get(&server.server_id) {
                tokio::time::sleep(*delay).await;
            }
            match self.payloads.get(&server.server_id) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(e)) => Err(anyhow!("{e}")),
                None => Err(anyhow!("timed out")),
            }
        }
    }

    /// Site whose servers come from a JSON list and whose payload carries a
    /// XOR-69 `url` field.
    fn json_site() -> Arc<SiteProfile> {
        let profile: SiteProfile = toml::from_str(
            r#"
id = "demo"
name = "Demo"
base_url = "https://demo.example"

[server_list]
url = "{base}/ajax/servers?ep={episode}"

[servers]
kind = "json"
items = "/servers"
id = "id"
label = "label"
token = "token"
mode = "mode"

[stream_request]
url = "{base}/ajax/link?id={server_id}&hash={token}"

[[streams]]
source = { field = { kind = "json", pointer = "/url" } }
xor_key = 69

[[subtitles]]
at = { kind = "json", pointer = "/sub" }
"#,
        )
        .unwrap();
        Arc::new(profile)
    }

    fn encoded_payload(url: &str) -> String {
        serde_json::json!({ "url": xor_decode(url, 69) }).to_string()
    }

    fn servers(n: usize) -> Vec<ServerDescriptor> {
        (1..=n)
            .map(|i| ServerDescriptor {
                server_id: i.to_string(),
                label: format!("S{i}"),
                play_mode: PlayMode::Stream,
                play_value: "stream".into(),
                access_token: format!("t{i}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn end_to_end_decodes_stream_and_skips_embed() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with_list(
                    r#"{"servers":[{"id":"1","token":"abcXYZ","mode":"stream","label":"VIP"},
                                  {"id":"2","token":"qrs","mode":"embed","label":"EMB"}]}"#,
                )
                .with_payload("1", &encoded_payload("https://cdn.example.com/hls/x.m3u8")),
        );
        let resolver = LinkResolver::new(json_site(), fetcher.clone());

        let result = resolver.resolve_all(&EpisodeRef::from("ep-9")).await;

        assert_eq!(result.streams.len(), 1);
        let stream = &result.streams[0];
        assert_eq!(stream.url, "https://cdn.example.com/hls/x.m3u8");
        assert!(stream.is_segmented);
        assert_eq!(stream.source_label, "VIP");
        assert_eq!(result.servers_listed, 2);
        assert_eq!(result.servers_skipped, 1);
        assert_eq!(result.servers_failed, 0);
        assert_eq!(fetcher.stream_calls(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn embed_server_never_fetches_payload() {
        let fetcher = Arc::new(FakeFetcher::default());
        let resolver = LinkResolver::new(json_site(), fetcher.clone());
        let mut embed = servers(1);
        embed[0].play_mode = PlayMode::Embed;

        let err = resolver.resolve(&embed[0]).await.unwrap_err();
        assert!(matches!(err, ResolveError::Embed(_)));

        let result = resolver.resolve_servers(embed).await;
        assert!(result.is_empty());
        assert_eq!(result.servers_skipped, 1);
        assert!(fetcher.stream_calls().is_empty());
    }

    #[tokio::test]
    async fn failing_server_does_not_affect_others() {
        let fetcher = FakeFetcher::default()
            .with_payload("1", &encoded_payload("https://a.example/one.m3u8"))
            .with_error("2")
            .with_payload("3", &encoded_payload("https://c.example/three.mp4"));
        let resolver = LinkResolver::new(json_site(), fetcher);

        let result = resolver.resolve_servers(servers(3)).await;

        assert_eq!(result.streams.len(), 2);
        let mut urls: Vec<&str> = result.streams.iter().map(|s| s.url.as_str()).collect();
        urls.sort_unstable();
        assert_eq!(
            urls,
            ["https://a.example/one.m3u8", "https://c.example/three.mp4"]
        );
        assert_eq!(result.servers_failed, 1);
    }

    #[tokio::test]
    async fn unclassified_and_missing_fields_count_as_failures() {
        let fetcher = FakeFetcher::default()
            .with_payload("1", &encoded_payload("https://cdn.x/a/b/readme.txt"))
            .with_payload("2", r#"{"other":1}"#)
            .with_payload("3", "<html>not json</html>");
        let resolver = LinkResolver::new(json_site(), fetcher);

        let result = resolver.resolve_servers(servers(3)).await;

        assert!(result.is_empty());
        assert_eq!(result.servers_failed, 3);
    }

    #[tokio::test]
    async fn unparseable_server_list_gives_empty_result() {
        let fetcher = Arc::new(FakeFetcher::default().with_list("<html>502 Bad Gateway</html>"));
        let resolver = LinkResolver::new(json_site(), fetcher.clone());

        let result = resolver.resolve_all(&EpisodeRef::from("ep")).await;

        assert_eq!(result, ResolutionResult::default());
        assert!(fetcher.stream_calls().is_empty());
    }

    #[tokio::test]
    async fn failed_server_list_fetch_gives_empty_result() {
        let resolver = LinkResolver::new(json_site(), FakeFetcher::default());
        let result = resolver.resolve_all(&EpisodeRef::from("ep")).await;
        assert!(result.is_empty());
        assert_eq!(result.servers_listed, 0);
    }

    #[tokio::test]
    async fn results_arrive_in_completion_order() {
        let fetcher = FakeFetcher::default()
            .with_payload("1", &encoded_payload("https://slow.example/1.m3u8"))
            .with_delay("1", Duration::from_millis(200))
            .with_payload("2", &encoded_payload("https://fast.example/2.m3u8"));
        let resolver = LinkResolver::new(json_site(), fetcher);

        let result = resolver.resolve_servers(servers(2)).await;

        let urls: Vec<&str> = result.streams.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            ["https://fast.example/2.m3u8", "https://slow.example/1.m3u8"]
        );
    }

    #[tokio::test]
    async fn cancellation_keeps_finished_servers() {
        let fetcher = FakeFetcher::default()
            .with_list(
                r#"{"servers":[{"id":"1","token":"a","mode":"stream"},
                              {"id":"2","token":"b","mode":"stream"}]}"#,
            )
            .with_payload("1", &encoded_payload("https://fast.example/1.m3u8"))
            .with_payload("2", &encoded_payload("https://slow.example/2.m3u8"))
            .with_delay("2", Duration::from_secs(30));
        let resolver = LinkResolver::new(json_site(), fetcher);

        let result = resolver
            .resolve_all_until(
                &EpisodeRef::from("ep"),
                tokio::time::sleep(Duration::from_millis(100)),
            )
            .await;

        assert_eq!(result.streams.len(), 1);
        assert_eq!(result.streams[0].url, "https://fast.example/1.m3u8");
        assert_eq!(result.servers_failed, 0);
    }

    #[tokio::test]
    async fn subtitles_are_collected_with_site_language() {
        let payload = serde_json::json!({
            "url": xor_decode("https://a.example/x.m3u8", 69),
            "sub": "//subs.example/x.vtt",
        })
        .to_string();
        let fetcher = FakeFetcher::default()
            .with_payload("1", &payload)
            .with_payload("2", &payload);
        let resolver = LinkResolver::new(json_site(), fetcher);

        let result = resolver.resolve_servers(servers(2)).await;

        assert_eq!(result.streams.len(), 2);
        assert_eq!(result.subtitles.len(), 1);
        assert_eq!(result.subtitles[0].url, "https://subs.example/x.vtt");
        assert_eq!(result.subtitles[0].language_tag, "Vietnamese");
    }

    #[tokio::test]
    async fn fixed_site_without_token_skips_list_request() {
        let registry = SiteRegistry::builtin().unwrap();
        let site = registry.get("phimmoichill").unwrap();
        let fetcher = Arc::new(
            FakeFetcher::default().with_payload("chill", r#"iniPlayers("https://pmc.example/m.m3u8")"#),
        );
        let resolver = LinkResolver::new(site, fetcher.clone());

        let result = resolver.resolve_all(&EpisodeRef::from("pm77")).await;

        assert_eq!(fetcher.list_calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.streams.len(), 1);
        assert_eq!(result.streams[0].url, "https://pmc.example/m.m3u8");
    }

    fn phim1080_page() -> &'static str {
        r#"<html><body><div class="container" data-id="21975" data-episode-id="303806"></div></body></html>"#
    }

    #[tokio::test]
    async fn shared_payload_is_fetched_once_per_token() {
        let hls = xor_decode("https://cdn.example.com/hls/x.m3u8", 69);
        let opt = xor_decode("//opt.example.com/o/index.m3u8", 69);
        let payload = format!(
            r#"{{"sources":{{"hls":"{hls}"}},"fb":[{{"src":"https://video.example.com/v.mp4","label":"HD"}}],"m":{{"x":1,"opt":"{opt}"}},"subtitle":{{"vi":"8812"}}}}"#
        );
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with_list(phim1080_page())
                .with_payload("hls", &payload),
        );
        let site = SiteRegistry::builtin().unwrap().get("phim1080").unwrap();
        let resolver = LinkResolver::new(site, fetcher.clone());

        let result = resolver
            .resolve_all(&EpisodeRef::from("https://xem1080.com/phim/tap-1"))
            .await;

        assert_eq!(fetcher.stream_calls(), vec!["hls".to_string()]);
        assert_eq!(result.streams.len(), 3);
        assert_eq!(result.subtitles.len(), 1);
        assert_eq!(result.servers_failed, 0);
    }

    #[tokio::test]
    async fn shared_payload_failure_fails_every_server_in_group() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with_list(phim1080_page())
                .with_error("hls"),
        );
        let site = SiteRegistry::builtin().unwrap().get("phim1080").unwrap();
        let resolver = LinkResolver::new(site, fetcher.clone());

        let result = resolver.resolve_all(&EpisodeRef::from("ep")).await;

        assert!(result.is_empty());
        assert_eq!(result.servers_failed, 3);
        assert_eq!(fetcher.stream_calls().len(), 1);
    }

    #[test]
    fn servers_group_by_token_only_when_shared() {
        let mut list = servers(3);
        list[1].access_token = "t1".into();
        let shared = group_servers(&list, true);
        let ids: Vec<Vec<&str>> = shared
            .iter()
            .map(|g| g.iter().map(|s| s.server_id.as_str()).collect())
            .collect();
        assert_eq!(ids, vec![vec!["1", "2"], vec!["3"]]);
        assert_eq!(group_servers(&list, false).len(), 3);
    }
}
