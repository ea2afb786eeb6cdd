//! `driftsite init`: non-interactive site setup.

use std::path::Path;

use anyhow::{bail, Result};

use driftsite_core::Keys;

use crate::config::SiteConfig;

pub fn run(
    dir: &Path,
    key: Option<String>,
    relays: Vec<String>,
    servers: Vec<String>,
    gateway_host: Option<String>,
) -> Result<()> {
    if SiteConfig::path(dir).exists() {
        bail!(
            "{} already exists in {}",
            crate::config::CONFIG_FILE,
            dir.display()
        );
    }
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }

    let keys = match key {
        Some(key) => Keys::parse(&key)?,
        None => Keys::generate(),
    };

    let config = SiteConfig {
        relays,
        servers,
        gateway_host: gateway_host.unwrap_or_else(|| "driftsite.page".to_string()),
        private_key: Some(keys.nsec()),
        signer_credential: None,
        profile: None,
    };
    config.save(dir)?;

    println!("Initialized {}", SiteConfig::path(dir).display());
    println!("Publisher: {}", keys.npub());
    println!(
        "Gateway:   https://{}.{}/",
        keys.npub(),
        config.gateway_host
    );
    if config.relays.is_empty() {
        println!("Note: add at least one relay to driftsite.json before publishing.");
    }
    if config.servers.is_empty() {
        println!("Note: add at least one blob server to driftsite.json before publishing.");
    }
    Ok(())
}
