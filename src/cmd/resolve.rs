use std::time::Duration;

use anyhow::Result;

use vnlink::{Config, EpisodeRef, ResolutionResult};

use super::build_resolver;
use crate::OutputFormat;

pub async fn cmd_resolve(
    config: &Config,
    site: &str,
    episode: &str,
    format: OutputFormat,
    timeout: Option<u64>,
) -> Result<()> {
    let resolver = build_resolver(config, site)?;
    let episode = EpisodeRef::from(episode);

    let result = match timeout {
        Some(secs) => {
            resolver
                .resolve_all_until(&episode, tokio::time::sleep(Duration::from_secs(secs)))
                .await
        }
        None => resolver.resolve_all(&episode).await,
    };

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "site": resolver.profile().id,
                "episode": episode,
                "streams": result.streams,
                "subtitles": result.subtitles,
                "servers": {
                    "listed": result.servers_listed,
                    "skipped": result.servers_skipped,
                    "failed": result.servers_failed,
                },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => print_text(&result),
    }
    Ok(())
}

fn print_text(result: &ResolutionResult) {
    if result.is_empty() {
        println!(
            "No link found ({} servers, {} embed, {} failed)",
            result.servers_listed, result.servers_skipped, result.servers_failed
        );
        return;
    }

    for stream in &result.streams {
        let kind = if stream.is_segmented { "hls" } else { "mp4" };
        println!(
            "{:<16} {:<7} {kind:<4} {}",
            stream.source_label, stream.quality, stream.url
        );
    }
    for subtitle in &result.subtitles {
        println!("sub [{}] {}", subtitle.language_tag, subtitle.url);
    }
}
