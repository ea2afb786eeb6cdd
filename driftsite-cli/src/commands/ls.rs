//! `driftsite ls`: list the currently announced remote file set.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use driftsite_core::relay::fetch_remote_files;
use driftsite_core::{Collector, WebSocketConnector};

use crate::config::SiteConfig;

pub async fn run(dir: &Path, verbose: bool) -> Result<()> {
    let config = SiteConfig::load(dir)?;
    let connector = Arc::new(WebSocketConnector::new());
    let collector = Arc::new(Collector::new());
    let cancel = super::cancel_on_ctrl_c();

    let signer = super::resolve_signer(
        &config,
        Arc::clone(&connector),
        Arc::clone(&collector),
        cancel.clone(),
    )
    .await?;
    let pubkey = hex::encode(signer.public_key().await?.serialize());

    let remote = fetch_remote_files(&connector, &config.relays, &pubkey, &collector, &cancel).await;

    if remote.inconclusive {
        println!("Warning: no relay answered; remote state is unknown.");
    } else if remote.entries.is_empty() {
        println!("No files announced.");
    }
    for entry in &remote.entries {
        println!("{}  {:>10}  {}", entry.hash, entry.size, entry.path);
    }

    if verbose {
        for line in collector.grouped_lines(true) {
            eprintln!("{line}");
        }
    }
    Ok(())
}
