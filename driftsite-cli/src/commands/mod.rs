//! CLI subcommands.

pub mod init;
pub mod ls;
pub mod publish;

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;

use driftsite_core::{
    Collector, LocalSigner, RemoteSigner, Signer, SignerCredentials, TransportConnector,
    DEFAULT_RPC_TIMEOUT,
};

use crate::config::SiteConfig;

/// Builds the signer from the configured auth source: a local key when
/// present, otherwise a remote-signer credential. Neither present is a
/// hard error before any work starts.
pub async fn resolve_signer<C: TransportConnector + 'static>(
    config: &SiteConfig,
    connector: Arc<C>,
    collector: Arc<Collector>,
    cancel: CancellationToken,
) -> Result<Arc<dyn Signer>> {
    if let Some(key) = config.resolved_key() {
        let signer = LocalSigner::from_secret(&key)?;
        return Ok(Arc::new(signer));
    }

    if let Some(blob) = config.resolved_signer_credential() {
        let credentials = SignerCredentials::decode(&blob)?;
        let signer = RemoteSigner::connect(
            connector,
            &credentials,
            DEFAULT_RPC_TIMEOUT,
            collector,
            cancel,
        )
        .await?;
        return Ok(Arc::new(signer));
    }

    bail!(
        "no signing key available: set `private_key` or `signer_credential` \
         in driftsite.json, or export {} / {}",
        crate::config::KEY_ENV,
        crate::config::SIGNER_ENV
    );
}

/// Cancellation token wired to Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            trigger.cancel();
        }
    });
    cancel
}
