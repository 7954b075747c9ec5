//! Configuration loaded from `~/.config/vnlink/sites.toml`.
//!
//! ```toml
//! [client]
//! timeout_secs = 20
//!
//! [[sites]]
//! id = "phim1080"
//! name = "Phim1080"
//! base_url = "https://xem1081.com"   # domain moved
//! # ... rest of the profile
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{SiteProfile, SiteRegistry};
use crate::http_client::ClientConfig;

/// Everything the user file can set.
#[derive(Debug, Clone)]
pub struct Config {
    pub client: ClientConfig,
    pub registry: SiteRegistry,
}

/// On-disk layout shared by the built-in and user files.
#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct SitesFile {
    #[serde(default)]
    pub(crate) client: Option<ClientConfig>,
    #[serde(default)]
    pub(crate) sites: Vec<SiteProfile>,
}

/// Load built-in profiles and overlay the user file.
///
/// `path` overrides the default location. A missing default file is not an
/// error; a missing explicit file is.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut registry = SiteRegistry::builtin()?;
    let mut client = ClientConfig::default();

    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (config_path(), false),
    };

    if !required && !path.exists() {
        return Ok(Config { client, registry });
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: SitesFile =
        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))?;

    if let Some(user_client) = file.client {
        client = user_client;
    }
    for profile in file.sites {
        tracing::debug!(site = %profile.id, "loaded user site profile");
        registry.insert(profile);
    }

    Ok(Config { client, registry })
}

/// Return the path to the user sites file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vnlink")
        .join("sites.toml")
}
