//! Driftsite CLI
//!
//! Command-line deployer for decentralized static sites: replicates a
//! directory onto content-addressed blob servers and announces every file
//! over a relay mesh.

mod commands;
mod config;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

#[derive(Parser)]
#[command(name = "driftsite")]
#[command(version, about = "Decentralized static-site deployer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show full error groups and extra detail
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a keypair and driftsite.json in a site directory
    Init {
        /// Site directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Use an existing secret key (nsec or hex) instead of generating
        #[arg(long)]
        key: Option<String>,

        /// Relay URL (repeatable)
        #[arg(long = "relay")]
        relays: Vec<String>,

        /// Blob server URL (repeatable)
        #[arg(long = "server")]
        servers: Vec<String>,

        /// Gateway host suffix for the printed site URL
        #[arg(long)]
        gateway_host: Option<String>,
    },

    /// Publish the site: upload changed files and announce them
    Publish {
        /// Site directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Re-upload and re-announce everything
        #[arg(long)]
        force: bool,

        /// Delete remote files that no longer exist locally
        #[arg(long)]
        purge: bool,

        /// Maximum blobs uploaded in parallel
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Also publish the relay list (kind 10002)
        #[arg(long)]
        publish_relay_list: bool,

        /// Also publish the server list (kind 10063)
        #[arg(long)]
        publish_server_list: bool,

        /// Also publish the profile from driftsite.json (kind 0)
        #[arg(long)]
        publish_profile: bool,
    },

    /// List the files currently announced on the relays
    Ls {
        /// Site directory
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Init {
            dir,
            key,
            relays,
            servers,
            gateway_host,
        } => {
            commands::init::run(&dir, key, relays, servers, gateway_host)?;
        }
        Commands::Publish {
            dir,
            force,
            purge,
            concurrency,
            publish_relay_list,
            publish_server_list,
            publish_profile,
        } => {
            commands::publish::run(
                &dir,
                force,
                purge,
                concurrency,
                publish_relay_list,
                publish_server_list,
                publish_profile,
                cli.verbose,
            )
            .await?;
        }
        Commands::Ls { dir } => {
            commands::ls::run(&dir, cli.verbose).await?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "driftsite", &mut io::stdout());
        }
    }
    Ok(())
}
