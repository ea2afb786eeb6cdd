//! `driftsite publish`: run the full publishing pipeline.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use driftsite_core::{Collector, PublishOptions, Publisher, WebSocketConnector};

use crate::config::SiteConfig;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    dir: &Path,
    force: bool,
    purge: bool,
    concurrency: usize,
    publish_relay_list: bool,
    publish_server_list: bool,
    publish_profile: bool,
    verbose: bool,
) -> Result<()> {
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

    let mut options = PublishOptions::new(dir);
    options.relays = config.relays.clone();
    options.servers = config.servers.clone();
    options.gateway_host = config.gateway_host.clone();
    options.force = force;
    options.purge = purge;
    options.concurrency = concurrency;
    options.publish_relay_list = publish_relay_list;
    options.publish_server_list = publish_server_list;
    if publish_profile {
        options.profile = config.profile.clone();
    }

    let publisher = Publisher::with_collector(signer, connector, Arc::clone(&collector));
    let report = publisher.publish(&options, &cancel).await?;
    print!("{}", report.render(&collector, verbose));
    Ok(())
}
