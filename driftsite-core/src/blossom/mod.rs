// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Blob Server Client
//!
//! Content-addressed HTTP stores: `HEAD /<hash>` answers presence,
//! `PUT /upload` stores, `DELETE /<hash>` removes. Every mutating request
//! carries an ephemeral signed authorization event in an
//! `Authorization: Nostr <base64(json)>` header.
//!
//! Uploads fan out: each blob is attempted on every server, a blob counts
//! as stored when at least one server succeeded, and a semaphore bounds
//! the number of in-flight blobs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use bytes::Bytes;
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::{build, Event};
use crate::report::{Category, Collector};
use crate::scan::FileEntry;
use crate::signer::{Signer, SignerError};

/// Default bound on in-flight blobs.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Budget for one HTTP request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Blob-server client errors. Per-server upload failures are data
/// ([`ServerResult`]), not errors; these are the fatal cases.
#[derive(Error, Debug)]
pub enum BlossomError {
    #[error("Invalid server URL {url}: {message}")]
    InvalidServerUrl { url: String, message: String },

    #[error("HTTP client construction failed: {0}")]
    Client(reqwest::Error),

    #[error("No content loaded for {0}")]
    MissingContent(String),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("Cancelled")]
    Cancelled,
}

/// Outcome of one request against one server.
#[derive(Debug, Clone)]
pub struct ServerResult {
    pub server: String,
    pub success: bool,
    /// HTTP status when the server answered.
    pub status: Option<u16>,
    /// Error kind or body summary when the request failed.
    pub error: Option<String>,
}

/// Outcome of uploading one blob to the server set.
#[derive(Debug)]
pub struct UploadOutcome {
    /// The entry, with content released.
    pub entry: FileEntry,
    /// True when at least one server stored the blob.
    pub stored: bool,
    pub results: Vec<ServerResult>,
    /// Signed announcement, present iff the blob was stored. Built at
    /// most once per (path, hash); publication is the orchestrator's job.
    pub announcement: Option<Event>,
}

/// Client over a fixed set of blob servers.
pub struct BlossomClient {
    http: reqwest::Client,
    servers: Vec<String>,
}

impl BlossomClient {
    /// Normalizes the server URLs (scheme check, trailing slash) and
    /// builds the shared HTTP client.
    pub fn new(servers: &[String]) -> Result<Self, BlossomError> {
        let servers = servers
            .iter()
            .map(|url| normalize_server_url(url))
            .collect::<Result<Vec<_>, _>>()?;
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(format!("{}/{}", build::CLIENT_NAME, env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(BlossomError::Client)?;
        Ok(BlossomClient { http, servers })
    }

    /// The normalized server URLs.
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// `HEAD /<hash>`: true on any 2xx.
    pub async fn has_blob(&self, server: &str, hash: &str) -> Result<bool, reqwest::Error> {
        let response = self.http.head(format!("{server}{hash}")).send().await?;
        Ok(response.status().is_success())
    }

    /// Uploads every entry, at most `concurrency` blobs in flight.
    ///
    /// Per-file problems (content read failures, all-server upload
    /// failures) are collected and reported per outcome; only signer
    /// failures and cancellation abort the pass. Outcomes are ordered by
    /// path.
    pub async fn upload_files(
        self: Arc<Self>,
        signer: &Arc<dyn Signer>,
        entries: Vec<FileEntry>,
        root: PathBuf,
        concurrency: usize,
        collector: &Arc<Collector>,
        cancel: &CancellationToken,
    ) -> Result<Vec<UploadOutcome>, BlossomError> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for mut entry in entries {
            let client = Arc::clone(&self);
            let signer = Arc::clone(signer);
            let collector = Arc::clone(collector);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let root = root.clone();

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return Err(BlossomError::Cancelled),
                    permit = semaphore.acquire_owned() => {
                        permit.expect("semaphore never closed")
                    }
                };

                if let Err(e) = entry.load_content(&root).await {
                    collector.record(Category::Upload, &entry.path, e.to_string());
                    return Ok(UploadOutcome {
                        entry,
                        stored: false,
                        results: Vec::new(),
                        announcement: None,
                    });
                }

                let outcome = tokio::select! {
                    _ = cancel.cancelled() => Err(BlossomError::Cancelled),
                    outcome = client.upload_entry(signer.as_ref(), entry) => outcome,
                };
                let mut outcome = outcome?;

                if !outcome.stored {
                    for result in &outcome.results {
                        if let Some(error) = &result.error {
                            collector.record(Category::Upload, &outcome.entry.path, error.clone());
                        }
                    }
                }
                outcome.entry.release_content();
                Ok(outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => {
                    // Fatal: stop the remaining uploads too.
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "upload task failed"),
            }
        }

        outcomes.sort_by(|a, b| a.entry.path.cmp(&b.entry.path));
        Ok(outcomes)
    }

    /// Uploads one blob to all servers: probe, authorize once, store where
    /// absent, then build the signed announcement if anything stuck.
    pub async fn upload_entry(
        &self,
        signer: &dyn Signer,
        mut entry: FileEntry,
    ) -> Result<UploadOutcome, BlossomError> {
        let bytes = Bytes::from(
            entry
                .content
                .take()
                .ok_or_else(|| BlossomError::MissingContent(entry.path.clone()))?,
        );

        let probes = join_all(
            self.servers
                .iter()
                .map(|server| self.has_blob(server, &entry.hash)),
        )
        .await;

        let mut results = Vec::with_capacity(self.servers.len());
        let mut pending: Vec<&String> = Vec::new();
        for (server, probe) in self.servers.iter().zip(probes) {
            match probe {
                Ok(true) => {
                    debug!(%server, path = %entry.path, "blob already present");
                    results.push(ServerResult {
                        server: server.clone(),
                        success: true,
                        status: None,
                        error: None,
                    });
                }
                // Absent, or the probe itself failed; the upload decides.
                Ok(false) | Err(_) => pending.push(server),
            }
        }

        if !pending.is_empty() {
            let auth = signer
                .sign(build::upload_authorization(&entry.hash, &entry.path))
                .await?;
            let header = auth_header(&auth);
            let uploads = join_all(pending.iter().map(|server| {
                self.put_blob(server, &entry.media_type, bytes.clone(), header.clone())
            }))
            .await;
            results.extend(uploads);
        }

        results.sort_by(|a, b| a.server.cmp(&b.server));
        let stored = results.iter().any(|r| r.success);

        let announcement = if stored {
            Some(signer.sign(build::file_announcement(&entry)).await?)
        } else {
            None
        };

        Ok(UploadOutcome {
            entry,
            stored,
            results,
            announcement,
        })
    }

    /// `PUT /upload` with the authorization header and raw body.
    async fn put_blob(
        &self,
        server: &str,
        media_type: &str,
        bytes: Bytes,
        auth_header: String,
    ) -> ServerResult {
        let request = self
            .http
            .put(format!("{server}upload"))
            .header(reqwest::header::AUTHORIZATION, auth_header)
            .header(reqwest::header::CONTENT_TYPE, media_type)
            .body(bytes);

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    ServerResult {
                        server: server.to_string(),
                        success: true,
                        status: Some(status.as_u16()),
                        error: None,
                    }
                } else {
                    let body = body_summary(response).await;
                    ServerResult {
                        server: server.to_string(),
                        success: false,
                        status: Some(status.as_u16()),
                        error: Some(format!("upload rejected: HTTP {}: {body}", status.as_u16())),
                    }
                }
            }
            Err(e) => ServerResult {
                server: server.to_string(),
                success: false,
                status: None,
                error: Some(format!("upload transport: {e}")),
            },
        }
    }

    /// `DELETE /<hash>` with a delete authorization.
    pub async fn delete_blob(
        &self,
        server: &str,
        hash: &str,
        auth: &Event,
    ) -> ServerResult {
        let request = self
            .http
            .delete(format!("{server}{hash}"))
            .header(reqwest::header::AUTHORIZATION, auth_header(auth));

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                ServerResult {
                    server: server.to_string(),
                    success: status.is_success(),
                    status: Some(status.as_u16()),
                    error: (!status.is_success())
                        .then(|| format!("delete rejected: HTTP {}", status.as_u16())),
                }
            }
            Err(e) => ServerResult {
                server: server.to_string(),
                success: false,
                status: None,
                error: Some(format!("delete transport: {e}")),
            },
        }
    }
}

/// `Authorization: Nostr <base64(json(event))>` header value.
pub fn auth_header(auth: &Event) -> String {
    let json = serde_json::to_string(auth).expect("event serialization cannot fail");
    format!(
        "Nostr {}",
        base64::engine::general_purpose::STANDARD.encode(json)
    )
}

/// Ensures an absolute http(s) URL with a trailing slash.
pub fn normalize_server_url(url: &str) -> Result<String, BlossomError> {
    let parsed = url::Url::parse(url.trim()).map_err(|e| BlossomError::InvalidServerUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(BlossomError::InvalidServerUrl {
            url: url.to_string(),
            message: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    let mut normalized = parsed.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

async fn body_summary(response: reqwest::Response) -> String {
    const LIMIT: usize = 120;
    match response.text().await {
        Ok(body) => {
            let trimmed = body.trim();
            if trimmed.len() > LIMIT {
                let mut cut = LIMIT;
                while !trimmed.is_char_boundary(cut) {
                    cut -= 1;
                }
                format!("{}…", &trimmed[..cut])
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => String::new(),
    }
}
