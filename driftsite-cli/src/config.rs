//! Site Configuration
//!
//! Every site directory carries a `driftsite.json` naming the relays and
//! blob servers to publish to, the gateway host, optional profile fields,
//! and the auth source (a local secret key or a remote-signer credential).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use driftsite_core::Profile;

/// Name of the config file in the site root.
pub const CONFIG_FILE: &str = "driftsite.json";

/// Environment variable overriding the local secret key.
pub const KEY_ENV: &str = "DRIFTSITE_KEY";

/// Environment variable overriding the remote-signer credential.
pub const SIGNER_ENV: &str = "DRIFTSITE_SIGNER";

fn default_gateway_host() -> String {
    "driftsite.page".to_string()
}

/// Per-site configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Relays announcements are broadcast to.
    pub relays: Vec<String>,
    /// Blob servers the site is replicated onto.
    pub servers: Vec<String>,
    /// Host suffix for the printed gateway URL.
    #[serde(default = "default_gateway_host")]
    pub gateway_host: String,
    /// Local secret key (`nsec` or hex). Prefer `DRIFTSITE_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Remote-signer credential (`ncred` blob).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_credential: Option<String>,
    /// Optional profile published with `--publish-profile`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

impl SiteConfig {
    pub fn path(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE)
    }

    /// Loads the config; a missing file is a hard error with a hint.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        if !path.exists() {
            bail!(
                "no configuration found at {}; run `driftsite init` first",
                path.display()
            );
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: SiteConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = Self::path(root);
        let text = serde_json::to_string_pretty(self).context("serializing configuration")?;
        std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// The local key, environment first.
    pub fn resolved_key(&self) -> Option<String> {
        std::env::var(KEY_ENV).ok().or_else(|| self.private_key.clone())
    }

    /// The signer credential, environment first.
    pub fn resolved_signer_credential(&self) -> Option<String> {
        std::env::var(SIGNER_ENV)
            .ok()
            .or_else(|| self.signer_credential.clone())
    }
}
