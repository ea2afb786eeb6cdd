// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Publish Orchestrator
//!
//! Runs the full pipeline: scan the local tree, discover remote state,
//! diff, fan out blob uploads, announce each stored file, optionally purge
//! remote leftovers and publish metadata events, then summarize.
//!
//! Ordering guarantees: a file's announcement is published only after its
//! blob is stored on at least one server, and deletion events precede the
//! server DELETEs for their blobs. Nothing else is ordered.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blossom::{BlossomClient, BlossomError, DEFAULT_CONCURRENCY};
use crate::diff::compute_diff;
use crate::event::build::{self, Profile};
use crate::keys::encode_npub;
use crate::relay::{
    any_accepted, fetch_remote_files, publish_to_relays, RelayOutcome, TransportConnector,
};
use crate::report::{Category, Collector};
use crate::scan::{ignore::IgnoreRules, scan_site, ScanError};
use crate::signer::{Signer, SignerError};

/// What a publish run should do.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Site root on disk.
    pub root: PathBuf,
    pub relays: Vec<String>,
    pub servers: Vec<String>,
    /// Host suffix of the gateway URL printed at the end.
    pub gateway_host: String,
    /// Re-upload and re-announce everything, and override ambiguity.
    pub force: bool,
    /// Delete remote files that no longer exist locally.
    pub purge: bool,
    /// Bound on in-flight blob uploads.
    pub concurrency: usize,
    pub publish_relay_list: bool,
    pub publish_server_list: bool,
    pub profile: Option<Profile>,
}

impl PublishOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PublishOptions {
            root: root.into(),
            relays: Vec::new(),
            servers: Vec::new(),
            gateway_host: "driftsite.page".to_string(),
            force: false,
            purge: false,
            concurrency: DEFAULT_CONCURRENCY,
            publish_relay_list: false,
            publish_server_list: false,
            profile: None,
        }
    }
}

/// Fatal orchestrator errors. Per-file and per-relay problems are
/// collected instead.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("No relays configured")]
    NoRelays,

    #[error("No blob servers configured")]
    NoServers,

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Blossom(BlossomError),

    #[error(
        "Remote state is unknown but {server} already stores {path}; \
         pass --force to re-upload everything"
    )]
    Ambiguous { server: String, path: String },

    #[error("Every upload failed; nothing was announced")]
    AllUploadsFailed,

    #[error("Cancelled")]
    Cancelled,
}

impl From<BlossomError> for PublishError {
    fn from(e: BlossomError) -> Self {
        match e {
            BlossomError::Cancelled => PublishError::Cancelled,
            BlossomError::Signer(e) => PublishError::Signer(e),
            other => PublishError::Blossom(other),
        }
    }
}

/// Acceptance counts for one relay.
#[derive(Debug, Default, Clone)]
pub struct RelayStats {
    pub accepted: usize,
    pub attempted: usize,
}

/// Upload counts for one server.
#[derive(Debug, Default, Clone)]
pub struct ServerStats {
    pub succeeded: usize,
    pub attempted: usize,
}

/// What a run did, for the summary and the exit code.
#[derive(Debug, Default)]
pub struct PublishReport {
    pub scanned: usize,
    pub ignored: usize,
    pub unchanged: usize,
    /// Paths stored on at least one server this run.
    pub uploaded: Vec<String>,
    /// Paths that could not be stored anywhere.
    pub failed: Vec<String>,
    /// Paths purged from relays and servers.
    pub deleted: Vec<String>,
    /// Ids of the announcement events that were accepted somewhere.
    pub announced: Vec<String>,
    pub relay_stats: BTreeMap<String, RelayStats>,
    pub server_stats: BTreeMap<String, ServerStats>,
    pub gateway_url: String,
    /// True when there was nothing to do.
    pub noop: bool,
}

impl PublishReport {
    /// Renders the human-readable summary, grouped errors included.
    pub fn render(&self, collector: &Collector, verbose: bool) -> String {
        let mut out = String::new();
        if self.noop {
            out.push_str("Nothing to publish: site is up to date.\n");
        } else {
            out.push_str(&format!(
                "Files: {} scanned, {} ignored, {} unchanged, {} uploaded, {} failed\n",
                self.scanned,
                self.ignored,
                self.unchanged,
                self.uploaded.len(),
                self.failed.len(),
            ));
            if !self.deleted.is_empty() {
                out.push_str(&format!("Purged: {} remote files\n", self.deleted.len()));
            }
            if !self.server_stats.is_empty() {
                out.push_str("Servers:\n");
                for (server, stats) in &self.server_stats {
                    out.push_str(&format!(
                        "  {server}  {}/{} blobs stored\n",
                        stats.succeeded, stats.attempted
                    ));
                }
            }
            if !self.relay_stats.is_empty() {
                out.push_str("Relays:\n");
                for (relay, stats) in &self.relay_stats {
                    out.push_str(&format!(
                        "  {relay}  {}/{} events accepted\n",
                        stats.accepted, stats.attempted
                    ));
                }
            }
        }

        let errors = collector.grouped_lines(verbose);
        if !errors.is_empty() {
            out.push_str("Problems:\n");
            for line in errors {
                out.push_str(&format!("  {line}\n"));
            }
        }

        out.push_str(&format!("Gateway: {}\n", self.gateway_url));
        out
    }
}

/// The publishing engine. Generic over the relay transport so tests can
/// run it against scripted connections.
pub struct Publisher<C: TransportConnector + 'static> {
    signer: Arc<dyn Signer>,
    connector: Arc<C>,
    collector: Arc<Collector>,
}

impl<C: TransportConnector + 'static> Publisher<C> {
    pub fn new(signer: Arc<dyn Signer>, connector: Arc<C>) -> Self {
        Self::with_collector(signer, connector, Arc::new(Collector::new()))
    }

    /// Builds a publisher sharing an existing collector, so messages from
    /// earlier phases (signer connect, config resolution) land in the same
    /// summary.
    pub fn with_collector(
        signer: Arc<dyn Signer>,
        connector: Arc<C>,
        collector: Arc<Collector>,
    ) -> Self {
        Publisher {
            signer,
            connector,
            collector,
        }
    }

    /// The run's message collector, for summaries.
    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    /// Runs the full publish pipeline.
    pub async fn publish(
        &self,
        options: &PublishOptions,
        cancel: &CancellationToken,
    ) -> Result<PublishReport, PublishError> {
        if options.relays.is_empty() {
            return Err(PublishError::NoRelays);
        }
        if options.servers.is_empty() {
            return Err(PublishError::NoServers);
        }

        let pubkey = self.signer.public_key().await?;
        let pubkey_hex = hex::encode(pubkey.serialize());
        let gateway_url = format!("https://{}.{}/", encode_npub(&pubkey), options.gateway_host);

        // 1. Local enumeration.
        let rules = IgnoreRules::load(&options.root)?;
        let scan = scan_site(&options.root, &rules)?;
        for issue in &scan.issues {
            self.collector
                .record(Category::Scan, &issue.path, issue.message.clone());
        }
        info!(files = scan.files.len(), "local tree scanned");

        if cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }

        // 2. Remote discovery.
        let remote = fetch_remote_files(
            &self.connector,
            &options.relays,
            &pubkey_hex,
            &self.collector,
            cancel,
        )
        .await;
        if cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }

        let blossom = Arc::new(BlossomClient::new(&options.servers)?);

        // An empty remote answer from a dead relay set is not the same as
        // an empty site: probe before re-uploading the world.
        if remote.inconclusive && remote.entries.is_empty() && !scan.files.is_empty() {
            let probe = &scan.files[0];
            for server in blossom.servers() {
                if let Ok(true) = blossom.has_blob(server, &probe.hash).await {
                    if !options.force {
                        return Err(PublishError::Ambiguous {
                            server: server.clone(),
                            path: probe.path.clone(),
                        });
                    }
                    warn!(%server, "remote state unknown; --force re-uploads everything");
                    break;
                }
            }
        }

        // 3. Diff.
        let mut diff = compute_diff(scan.files, remote.entries);
        if options.force {
            let mut unchanged = std::mem::take(&mut diff.unchanged);
            diff.to_upload.append(&mut unchanged);
            diff.to_upload.sort_by(|a, b| a.path.cmp(&b.path));
        }
        debug!(
            to_upload = diff.to_upload.len(),
            unchanged = diff.unchanged.len(),
            to_delete = diff.to_delete.len(),
            "diff computed"
        );

        let mut report = PublishReport {
            scanned: diff.to_upload.len() + diff.unchanged.len(),
            ignored: scan.ignored.len(),
            unchanged: diff.unchanged.len(),
            gateway_url,
            ..PublishReport::default()
        };

        // 4. Nothing to do.
        if diff.is_noop() && !options.force {
            report.noop = true;
            return Ok(report);
        }

        // 5-6. Upload fan-out, then one announcement per stored file.
        let had_uploads = !diff.to_upload.is_empty();
        let to_delete = std::mem::take(&mut diff.to_delete);
        let outcomes = Arc::clone(&blossom)
            .upload_files(
                &self.signer,
                diff.to_upload,
                options.root.clone(),
                options.concurrency,
                &self.collector,
                cancel,
            )
            .await?;

        for outcome in outcomes {
            for result in &outcome.results {
                let stats = report
                    .server_stats
                    .entry(result.server.clone())
                    .or_default();
                stats.attempted += 1;
                if result.success {
                    stats.succeeded += 1;
                }
            }

            match outcome.announcement {
                Some(announcement) => {
                    if cancel.is_cancelled() {
                        return Err(PublishError::Cancelled);
                    }
                    let accepted = self
                        .broadcast(&announcement, options, &mut report.relay_stats, cancel)
                        .await;
                    if accepted {
                        report.announced.push(announcement.id.clone());
                    }
                    report.uploaded.push(outcome.entry.path.clone());
                }
                None => report.failed.push(outcome.entry.path.clone()),
            }
        }

        if had_uploads && report.uploaded.is_empty() {
            return Err(PublishError::AllUploadsFailed);
        }

        // 7. Purge: deletion events first, then the server DELETEs.
        if options.purge {
            for entry in &to_delete {
                if cancel.is_cancelled() {
                    return Err(PublishError::Cancelled);
                }
                let Some(source) = &entry.source_event else {
                    continue;
                };
                let deletion = self.signer.sign(build::deletion(source)).await?;
                self.broadcast(&deletion, options, &mut report.relay_stats, cancel)
                    .await;

                let auth = self
                    .signer
                    .sign(build::delete_authorization(&entry.hash))
                    .await?;
                let deletes = join_all(
                    blossom
                        .servers()
                        .iter()
                        .map(|server| blossom.delete_blob(server, &entry.hash, &auth)),
                )
                .await;
                for result in deletes {
                    if let Some(error) = result.error {
                        self.collector.record(Category::Purge, &entry.path, error);
                    }
                }
                report.deleted.push(entry.path.clone());
            }
        }

        // 8. Metadata events.
        if options.publish_relay_list {
            let event = self.signer.sign(build::relay_list(&options.relays)).await?;
            self.broadcast(&event, options, &mut report.relay_stats, cancel)
                .await;
        }
        if options.publish_server_list {
            let event = self
                .signer
                .sign(build::server_list(&options.servers))
                .await?;
            self.broadcast(&event, options, &mut report.relay_stats, cancel)
                .await;
        }
        if let Some(profile) = &options.profile {
            let event = self.signer.sign(build::profile(profile)).await?;
            self.broadcast(&event, options, &mut report.relay_stats, cancel)
                .await;
        }

        if cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }
        Ok(report)
    }

    /// Fans one event out to all relays, folding outcomes into the stats.
    async fn broadcast(
        &self,
        event: &crate::event::Event,
        options: &PublishOptions,
        relay_stats: &mut BTreeMap<String, RelayStats>,
        cancel: &CancellationToken,
    ) -> bool {
        let outcomes = publish_to_relays(
            &self.connector,
            &options.relays,
            event,
            &self.collector,
            cancel,
        )
        .await;
        for (relay, outcome) in &outcomes {
            let stats = relay_stats.entry(relay.clone()).or_default();
            stats.attempted += 1;
            if matches!(outcome, RelayOutcome::Accepted) {
                stats.accepted += 1;
            }
        }
        any_accepted(&outcomes)
    }
}

/// Convenience alias used by the CLI: a publisher over real websockets.
pub type WebSocketPublisher = Publisher<crate::relay::WebSocketConnector>;
