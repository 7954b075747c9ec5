//! `vnlink` - stream link resolver for Vietnamese video portals
//!
//! # Features
//!
//! - **Server enumeration**: HTML fragments, JSON lists or fixed server sets
//! - **Payload decoding**: XOR-obfuscated fields, JS-escaped strings, file lists
//! - **Concurrent resolution**: every server in flight at once, failures isolated
//! - **Data-driven sites**: built-in profiles plus a user `sites.toml`
//!
//! # Example
//!
//! ```rust,no_run
//! use vnlink::{load_config, EpisodeRef, HttpFetcher, LinkResolver, SiteClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config(None)?;
//!     let site = config.registry.get("animevietsub").expect("built-in site");
//!     let fetcher = HttpFetcher::new(SiteClient::with_config(&config.client)?, site.clone());
//!
//!     let result = LinkResolver::new(site, fetcher)
//!         .resolve_all(&EpisodeRef::from("110592"))
//!         .await;
//!     println!("Found {} streams", result.streams.len());
//!     Ok(())
//! }
//! ```

pub mod decode;
pub mod extract;
pub mod fetch;
pub mod http_client;
pub mod resolve;
pub mod site;

pub use decode::xor_decode;
pub use extract::FieldLocator;
pub use fetch::{Fetcher, HttpFetcher};
pub use http_client::{ClientConfig, SiteClient};
pub use resolve::{
    EpisodeRef, LinkResolver, PlayMode, Quality, ResolutionResult, ResolveError, ServerDescriptor,
    ServerLinks, StreamDescriptor, SubtitleDescriptor,
};
pub use site::{load_config, Config, SiteProfile, SiteRegistry};

/// Version of vnlink
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
