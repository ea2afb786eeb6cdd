// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Relay Layer
//!
//! Talks to relays over a full-duplex framed channel carrying JSON array
//! messages. The layer consists of:
//! - **Wire frames**: `EVENT`, `OK`, `REQ`, `EOSE`, `CLOSE`, `NOTICE`
//! - **Transport trait**: websocket in production, scripted mock in tests
//! - **Publish**: one short-lived connection per (event, relay)
//! - **Fan-out**: parallel publish with at-least-one-success semantics
//! - **Fetch**: remote state discovery with replaceable-event dedup
//!
//! Connections are never shared across tasks; every publish or fetch owns
//! its own.

pub mod client;
pub mod fetch;
pub mod messages;
pub mod pool;
pub mod transport;
pub mod websocket;

use std::time::Duration;

use thiserror::Error;

/// TCP + handshake budget for a relay connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a publish waits for its acknowledgement after the send.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Inactivity window that ends a fetch when a relay never sends EOSE.
pub const FETCH_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay transport errors.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Timed out")]
    Timeout,

    #[error("Cancelled")]
    Cancelled,
}

pub use client::{classify_rejection, publish_event, RelayOutcome};
pub use fetch::{dedup_announcements, entries_from_events, fetch_remote_files, RemoteSet};
pub use messages::{ClientMessage, Filter, RelayMessage};
pub use pool::{any_accepted, publish_to_relays};
pub use transport::{MockConnector, MockTransport, RelayTransport, SentFrame, SentLog, TransportConnector};
pub use websocket::{WebSocketConnector, WebSocketTransport};
