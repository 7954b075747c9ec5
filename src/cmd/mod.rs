pub mod decode;
pub mod resolve;
pub mod servers;
pub mod sites;

use std::sync::Arc;

use anyhow::{bail, Result};

use vnlink::{Config, HttpFetcher, LinkResolver, SiteClient, SiteProfile};

/// Look a site up by id, falling back to matching a URL's host.
pub fn find_site(config: &Config, site: &str) -> Result<Arc<SiteProfile>> {
    if let Some(profile) = config.registry.get(site).or_else(|| config.registry.for_url(site)) {
        return Ok(profile);
    }
    let known: Vec<&str> = config.registry.iter().map(|p| p.id.as_str()).collect();
    bail!("Unknown site: {site}. Known sites: {}", known.join(", "));
}

pub fn build_resolver(config: &Config, site: &str) -> Result<LinkResolver<HttpFetcher>> {
    let profile = find_site(config, site)?;
    let client = SiteClient::with_config(&config.client)?;
    Ok(LinkResolver::new(
        profile.clone(),
        HttpFetcher::new(client, profile),
    ))
}
