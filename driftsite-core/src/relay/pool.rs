// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Relay Fan-Out
//!
//! Publishes one event to every configured relay in parallel, one
//! connection per relay, and reports per-relay outcomes. Success means at
//! least one relay accepted. No retries.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::client::{publish_event, RelayOutcome};
use super::transport::TransportConnector;
use crate::event::Event;
use crate::report::{Category, Collector};

/// Publishes `event` to every relay in `relays`, returning one
/// `(relay URL, outcome)` pair per relay. Outcomes other than `Accepted`
/// are also recorded in the collector keyed by relay URL.
pub async fn publish_to_relays<C: TransportConnector + 'static>(
    connector: &Arc<C>,
    relays: &[String],
    event: &Event,
    collector: &Arc<Collector>,
    cancel: &CancellationToken,
) -> Vec<(String, RelayOutcome)> {
    let mut tasks = JoinSet::new();
    for url in relays {
        let connector = Arc::clone(connector);
        let collector = Arc::clone(collector);
        let cancel = cancel.clone();
        let event = event.clone();
        let url = url.clone();
        tasks.spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => RelayOutcome::TransportError {
                    detail: "cancelled".to_string(),
                },
                outcome = publish_event(connector.as_ref(), &url, &event, &collector) => outcome,
            };
            (url, outcome)
        });
    }

    let mut outcomes = Vec::with_capacity(relays.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((url, outcome)) => {
                if !outcome.is_accepted() {
                    collector.record(Category::Relay, &url, outcome.describe());
                }
                outcomes.push((url, outcome));
            }
            Err(e) => warn!(error = %e, "relay publish task failed"),
        }
    }

    outcomes.sort_by(|a, b| a.0.cmp(&b.0));
    outcomes
}

/// True iff at least one relay accepted.
pub fn any_accepted(outcomes: &[(String, RelayOutcome)]) -> bool {
    outcomes.iter().any(|(_, outcome)| outcome.is_accepted())
}
