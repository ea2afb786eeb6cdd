// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Remote State Discovery
//!
//! Queries every configured relay for the publisher's file announcements,
//! verifies what comes back, and deduplicates per path with
//! parameterized-replaceable semantics: the newest `created_at` wins, ties
//! fall to the lexicographically smaller id.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::messages::{ClientMessage, Filter, RelayMessage};
use super::transport::{RelayTransport, TransportConnector};
use super::{RelayError, CONNECT_TIMEOUT, FETCH_IDLE_TIMEOUT};
use crate::event::{kinds, Event};
use crate::report::{Category, Collector};
use crate::scan::FileEntry;

/// Result of querying the relay set.
#[derive(Debug, Default)]
pub struct RemoteSet {
    /// Deduplicated remote entries, ordered lexicographically by path.
    pub entries: Vec<FileEntry>,
    /// True when every relay failed, meaning the remote state is unknown
    /// rather than empty.
    pub inconclusive: bool,
}

/// Fetches the publisher's current file announcements from all relays.
///
/// A relay that fails or times out contributes nothing and is recorded in
/// the collector; only when every relay fails is the result flagged
/// inconclusive.
pub async fn fetch_remote_files<C: TransportConnector + 'static>(
    connector: &Arc<C>,
    relays: &[String],
    author_pubkey_hex: &str,
    collector: &Arc<Collector>,
    cancel: &CancellationToken,
) -> RemoteSet {
    let mut tasks = JoinSet::new();
    for url in relays {
        let connector = Arc::clone(connector);
        let collector = Arc::clone(collector);
        let cancel = cancel.clone();
        let author = author_pubkey_hex.to_string();
        let url = url.clone();
        tasks.spawn(async move {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => Err(RelayError::Cancelled),
                fetched = fetch_from_relay(connector.as_ref(), &url, &author, &collector) => fetched,
            };
            (url, fetched)
        });
    }

    let mut events = Vec::new();
    let mut reachable = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((url, Ok(mut relay_events))) => {
                debug!(%url, count = relay_events.len(), "relay answered");
                reachable += 1;
                events.append(&mut relay_events);
            }
            Ok((url, Err(e))) => {
                collector.record(Category::Relay, &url, format!("fetch failed: {e}"));
            }
            Err(e) => warn!(error = %e, "fetch task failed"),
        }
    }

    let inconclusive = reachable == 0;
    let deduped = dedup_announcements(events);
    RemoteSet {
        entries: entries_from_events(deduped),
        inconclusive,
    }
}

/// One relay's REQ cycle: subscribe, drain until EOSE or inactivity,
/// close. Events failing verification or authored by someone else are
/// dropped.
async fn fetch_from_relay<C: TransportConnector>(
    connector: &C,
    url: &str,
    author_pubkey_hex: &str,
    collector: &Collector,
) -> Result<Vec<Event>, RelayError> {
    let mut transport = timeout(CONNECT_TIMEOUT, connector.connect(url))
        .await
        .map_err(|_| RelayError::Timeout)??;

    let subscription_id = random_subscription_id();
    let filter = Filter::new()
        .kinds([kinds::FILE_ANNOUNCEMENT])
        .author(author_pubkey_hex);
    transport
        .send(ClientMessage::Req {
            subscription_id: subscription_id.clone(),
            filter,
        })
        .await?;

    let mut events = Vec::new();
    loop {
        // The inactivity window restarts on every frame.
        let frame = match timeout(FETCH_IDLE_TIMEOUT, transport.recv()).await {
            Err(_) => break,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                transport.close().await;
                return Err(e);
            }
            Ok(Ok(Some(frame))) => frame,
        };

        match frame {
            RelayMessage::Event {
                subscription_id: sub,
                event,
            } if sub == subscription_id => {
                if event.kind != kinds::FILE_ANNOUNCEMENT || event.pubkey != author_pubkey_hex {
                    debug!(url, id = %event.id, "dropping foreign event");
                    continue;
                }
                if let Err(e) = event.verify() {
                    warn!(url, id = %event.id, error = %e, "dropping unverifiable event");
                    continue;
                }
                events.push(event);
            }
            RelayMessage::Eose {
                subscription_id: sub,
            } if sub == subscription_id => break,
            RelayMessage::Closed {
                subscription_id: sub,
                ..
            } if sub == subscription_id => break,
            RelayMessage::Notice { message } => {
                collector.record(Category::Notice, url, message);
            }
            _ => {}
        }
    }

    let _ = transport
        .send(ClientMessage::Close {
            subscription_id: subscription_id.clone(),
        })
        .await;
    transport.close().await;
    Ok(events)
}

/// Keeps the winning announcement per (publisher, `d` tag): newest
/// `created_at`, ties broken toward the lexicographically smaller id.
pub fn dedup_announcements(events: Vec<Event>) -> Vec<Event> {
    let mut winners: HashMap<(String, String), Event> = HashMap::new();
    for event in events {
        let Some(path) = event.tag_value("d").map(str::to_string) else {
            continue;
        };
        match winners.entry((event.pubkey.clone(), path)) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(event);
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                let current = slot.get();
                let wins = event.created_at > current.created_at
                    || (event.created_at == current.created_at && event.id < current.id);
                if wins {
                    slot.insert(event);
                }
            }
        }
    }
    let mut result: Vec<Event> = winners.into_values().collect();
    result.sort_by(|a, b| a.tag_value("d").cmp(&b.tag_value("d")));
    result
}

/// Converts announcements into remote [`FileEntry`]s, skipping malformed
/// ones (missing or unusable `d`/`x` tags).
pub fn entries_from_events(events: Vec<Event>) -> Vec<FileEntry> {
    let mut entries: Vec<FileEntry> = events
        .into_iter()
        .filter_map(|event| {
            let path = event.tag_value("d")?.to_string();
            if !path.starts_with('/') {
                return None;
            }
            let hash = event.tag_value("x")?.to_string();
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            let size = event
                .tag_value("size")
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);
            let media_type = event
                .tag_value("m")
                .unwrap_or("application/octet-stream")
                .to_string();
            Some(FileEntry {
                path,
                size,
                hash: hash.to_lowercase(),
                media_type,
                content: None,
                source_event: Some(event),
            })
        })
        .collect();
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

fn random_subscription_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    hex::encode(bytes)
}
