// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Single-Relay Publish
//!
//! One connection, one `EVENT` frame, one acknowledgement, close. The
//! outcome is classified for the per-relay statistics; rejection messages
//! mentioning rate limiting get their own class.

use tokio::time::{timeout, timeout_at, Instant};
use tracing::debug;

use super::messages::{ClientMessage, RelayMessage};
use super::transport::{RelayTransport, TransportConnector};
use super::{ACK_TIMEOUT, CONNECT_TIMEOUT};
use crate::event::Event;
use crate::report::{Category, Collector};

/// Outcome of publishing one event to one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Accepted,
    Rejected { reason: String },
    RateLimited { reason: String },
    TimedOut,
    TransportError { detail: String },
}

impl RelayOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RelayOutcome::Accepted)
    }

    /// Short description for the collector and summary.
    pub fn describe(&self) -> String {
        match self {
            RelayOutcome::Accepted => "accepted".to_string(),
            RelayOutcome::Rejected { reason } => format!("rejected: {reason}"),
            RelayOutcome::RateLimited { reason } => format!("rate-limited: {reason}"),
            RelayOutcome::TimedOut => "timed out awaiting acknowledgement".to_string(),
            RelayOutcome::TransportError { detail } => format!("transport error: {detail}"),
        }
    }
}

/// Classifies a relay's `OK …false` message.
pub fn classify_rejection(message: &str) -> RelayOutcome {
    let lowered = message.to_lowercase();
    if lowered.contains("rate-limit") || lowered.contains("noting too much") {
        RelayOutcome::RateLimited {
            reason: message.to_string(),
        }
    } else {
        RelayOutcome::Rejected {
            reason: message.to_string(),
        }
    }
}

/// Publishes `event` to the relay at `url` over a fresh connection.
///
/// Acknowledgements for other event ids are ignored, the first one for
/// ours wins, and notices are routed to the collector. Failures never
/// propagate as errors; everything becomes an outcome.
pub async fn publish_event<C: TransportConnector>(
    connector: &C,
    url: &str,
    event: &Event,
    collector: &Collector,
) -> RelayOutcome {
    let mut transport = match timeout(CONNECT_TIMEOUT, connector.connect(url)).await {
        Ok(Ok(transport)) => transport,
        Ok(Err(e)) => {
            return RelayOutcome::TransportError {
                detail: e.to_string(),
            }
        }
        Err(_) => {
            return RelayOutcome::TransportError {
                detail: "connect timed out".to_string(),
            }
        }
    };

    if let Err(e) = transport.send(ClientMessage::Event(event.clone())).await {
        transport.close().await;
        return RelayOutcome::TransportError {
            detail: e.to_string(),
        };
    }

    let outcome = await_acknowledgement(&mut transport, &event.id, url, collector).await;
    transport.close().await;
    debug!(url, outcome = %outcome.describe(), event = %event.id, "publish finished");
    outcome
}

async fn await_acknowledgement<T: RelayTransport>(
    transport: &mut T,
    event_id: &str,
    url: &str,
    collector: &Collector,
) -> RelayOutcome {
    let deadline = Instant::now() + ACK_TIMEOUT;
    loop {
        let frame = match timeout_at(deadline, transport.recv()).await {
            Err(_) => return RelayOutcome::TimedOut,
            Ok(Ok(None)) => {
                return RelayOutcome::TransportError {
                    detail: "connection closed before acknowledgement".to_string(),
                }
            }
            Ok(Err(e)) => {
                return RelayOutcome::TransportError {
                    detail: e.to_string(),
                }
            }
            Ok(Ok(Some(frame))) => frame,
        };

        match frame {
            RelayMessage::Ok {
                event_id: acked_id,
                accepted,
                message,
            } if acked_id == event_id => {
                return if accepted {
                    RelayOutcome::Accepted
                } else {
                    classify_rejection(&message)
                };
            }
            RelayMessage::Notice { message } => {
                collector.record(Category::Notice, url, message);
            }
            // Frames for other events or subscriptions are not ours.
            _ => {}
        }
    }
}
