use anyhow::Result;

use vnlink::{Config, EpisodeRef, PlayMode};

use super::build_resolver;

pub async fn cmd_servers(config: &Config, site: &str, episode: &str) -> Result<()> {
    let resolver = build_resolver(config, site)?;
    let servers = resolver.list_servers(&EpisodeRef::from(episode)).await;

    if servers.is_empty() {
        println!("No servers found for {episode} on {}", resolver.profile().id);
        return Ok(());
    }

    for server in &servers {
        let mode = match server.play_mode {
            PlayMode::Stream => "stream",
            PlayMode::Embed => "embed",
        };
        println!(
            "{:<6} {:<6} {:<20} {}",
            server.server_id, mode, server.label, server.access_token
        );
    }
    println!("\n({} servers)", servers.len());
    Ok(())
}
