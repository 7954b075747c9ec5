//! `vnlink` CLI - list servers and resolve stream links from the command line

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "vnlink")]
#[command(about = "Resolve playable stream links from Vietnamese video portals")]
#[command(version)]
struct Cli {
    /// Log request and decode details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Sites file to load instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered sites
    Sites,

    /// List the servers of an episode
    Servers {
        /// Site id (e.g. animevietsub) or a URL on the site
        site: String,

        /// Episode reference: numeric id or episode page URL, depending on the site
        episode: String,
    },

    /// Resolve every server of an episode into stream links
    Resolve {
        /// Site id (e.g. animevietsub) or a URL on the site
        site: String,

        /// Episode reference: numeric id or episode page URL, depending on the site
        episode: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Give up after this many seconds, keeping links found so far
        #[arg(short, long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// XOR-decode an obfuscated payload field
    Decode {
        /// Encoded text
        payload: String,

        /// XOR key
        #[arg(short, long, default_value = "69")]
        key: u8,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Text,
    /// One JSON document
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable
    let default_level = if cli.verbose { "vnlink=debug" } else { "warn" };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let config = vnlink::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Sites => {
            cmd::sites::cmd_sites(&config);
        }
        Commands::Servers { site, episode } => {
            cmd::servers::cmd_servers(&config, &site, &episode).await?;
        }
        Commands::Resolve {
            site,
            episode,
            format,
            timeout,
        } => {
            cmd::resolve::cmd_resolve(&config, &site, &episode, format, timeout).await?;
        }
        Commands::Decode { payload, key } => {
            cmd::decode::cmd_decode(&payload, key);
        }
    }

    Ok(())
}
