//! Site profiles and the registry that selects them.
//!
//! # Architecture
//!
//! - [`SiteProfile`]: immutable per-site configuration (endpoints, selectors,
//!   anchors, XOR keys)
//! - [`SiteRegistry`]: maps a site id to its profile
//! - [`load_config`]: built-in profiles overlaid with the user's `sites.toml`
//!
//! Adding a site means adding a profile, not a type.
//!
//! # Example
//!
//! ```rust,no_run
//! use vnlink::site::SiteRegistry;
//!
//! # fn example() -> anyhow::Result<()> {
//! let registry = SiteRegistry::builtin()?;
//! let phim1080 = registry.get("phim1080").expect("built-in site");
//! println!("{} at {}", phim1080.name, phim1080.base_url);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod profile;
pub mod template;

use std::sync::Arc;

use anyhow::{Context, Result};

pub use config::{config_path, load_config, Config};
pub use profile::{
    FixedServer, Method, RequestTemplate, ServerListFormat, SiteProfile, StreamField, StreamSource,
    SubtitleField, TokenTemplate,
};

const BUILTIN_SITES: &str = include_str!("builtin.toml");

/// Site profiles keyed by id.
///
/// Profiles keep registration order; inserting an existing id replaces the
/// profile in place.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    profiles: Vec<Arc<SiteProfile>>,
}

impl SiteRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the profiles shipped with the crate.
    pub fn builtin() -> Result<Self> {
        let file: config::SitesFile =
            toml::from_str(BUILTIN_SITES).context("built-in site profiles are invalid")?;
        let mut registry = Self::new();
        for profile in file.sites {
            registry.insert(profile);
        }
        Ok(registry)
    }

    /// Add a profile, replacing any with the same id.
    pub fn insert(&mut self, profile: SiteProfile) {
        let profile = Arc::new(profile);
        match self.profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(slot) => *slot = profile,
            None => self.profiles.push(profile),
        }
    }

    /// Look up a profile by id (case-insensitive).
    pub fn get(&self, id: &str) -> Option<Arc<SiteProfile>> {
        self.profiles
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(id))
            .cloned()
    }

    /// Find the profile whose base URL host matches `url`.
    pub fn for_url(&self, url: &str) -> Option<Arc<SiteProfile>> {
        let host = url::Url::parse(url).ok()?.host_str()?.to_lowercase();
        self.profiles
            .iter()
            .find(|p| {
                url::Url::parse(&p.base_url)
                    .ok()
                    .and_then(|base| base.host_str().map(str::to_lowercase))
                    .is_some_and(|base_host| {
                        host == base_host || host.ends_with(&format!(".{base_host}"))
                    })
            })
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteProfile> {
        self.profiles.iter().map(AsRef::as_ref)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
