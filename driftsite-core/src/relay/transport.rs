// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Relay Transport Abstraction
//!
//! One trait for a connected full-duplex frame channel and one for the
//! dialer that produces them, so the publish and fetch paths can run over
//! a mock in tests and a websocket in production.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::messages::{ClientMessage, RelayMessage};
use super::RelayError;
use crate::event::Event;

/// A connected frame channel to one relay.
#[async_trait]
pub trait RelayTransport: Send {
    /// Sends one frame.
    async fn send(&mut self, frame: ClientMessage) -> Result<(), RelayError>;

    /// Receives the next well-formed frame. `Ok(None)` means the peer
    /// closed cleanly. Never returns on an idle healthy connection;
    /// callers bound the wait with a timeout.
    async fn recv(&mut self) -> Result<Option<RelayMessage>, RelayError>;

    /// Closes the connection. Errors are ignored.
    async fn close(&mut self);
}

/// Dials relays by URL. Connectors are shared across tasks; each call
/// produces an independent connection.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    type Transport: RelayTransport + 'static;

    async fn connect(&self, url: &str) -> Result<Self::Transport, RelayError>;
}

/// A frame sent through a [`MockTransport`], with the relay URL it was
/// addressed to.
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub url: String,
    pub frame: ClientMessage,
}

/// Shared log of frames sent through mock transports.
pub type SentLog = Arc<Mutex<Vec<SentFrame>>>;

/// Scripted in-memory transport for tests.
///
/// Incoming frames are served from a queue. Optional behaviors answer
/// writes automatically: `auto_ok`/`auto_reject` acknowledge published
/// events, `serve_events` answers a `REQ` with canned events followed by
/// `EOSE`. When the queue is empty the next `recv` parks forever, so
/// caller-side timeouts fire.
#[derive(Default)]
pub struct MockTransport {
    url: String,
    incoming: VecDeque<RelayMessage>,
    ok_reply: Option<(bool, String)>,
    served_events: Option<Vec<Event>>,
    sent: Option<SentLog>,
    closed: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport::default()
    }

    /// Labels frames in the shared log with a relay URL.
    pub fn for_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Acknowledges every published event with `OK …true`.
    pub fn auto_ok(mut self) -> Self {
        self.ok_reply = Some((true, String::new()));
        self
    }

    /// Rejects every published event with `OK …false` and the given
    /// message.
    pub fn auto_reject(mut self, message: impl Into<String>) -> Self {
        self.ok_reply = Some((false, message.into()));
        self
    }

    /// Answers the first `REQ` with these events followed by `EOSE`.
    pub fn serve_events(mut self, events: Vec<Event>) -> Self {
        self.served_events = Some(events);
        self
    }

    /// Queues a raw incoming frame.
    pub fn queue(mut self, frame: RelayMessage) -> Self {
        self.incoming.push_back(frame);
        self
    }

    /// Records outgoing frames into a shared log.
    pub fn with_log(mut self, log: SentLog) -> Self {
        self.sent = Some(log);
        self
    }
}

#[async_trait]
impl RelayTransport for MockTransport {
    async fn send(&mut self, frame: ClientMessage) -> Result<(), RelayError> {
        if self.closed {
            return Err(RelayError::ConnectionClosed);
        }
        if let Some(log) = &self.sent {
            log.lock().expect("sent log poisoned").push(SentFrame {
                url: self.url.clone(),
                frame: frame.clone(),
            });
        }

        match &frame {
            ClientMessage::Event(event) => {
                if let Some((accepted, message)) = &self.ok_reply {
                    self.incoming.push_back(RelayMessage::Ok {
                        event_id: event.id.clone(),
                        accepted: *accepted,
                        message: message.clone(),
                    });
                }
            }
            ClientMessage::Req {
                subscription_id, ..
            } => {
                if let Some(events) = self.served_events.take() {
                    for event in events {
                        self.incoming.push_back(RelayMessage::Event {
                            subscription_id: subscription_id.clone(),
                            event,
                        });
                    }
                    self.incoming.push_back(RelayMessage::Eose {
                        subscription_id: subscription_id.clone(),
                    });
                }
            }
            ClientMessage::Close { .. } => {}
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<RelayMessage>, RelayError> {
        if let Some(frame) = self.incoming.pop_front() {
            return Ok(Some(frame));
        }
        if self.closed {
            return Ok(None);
        }
        // Idle connection: park until the caller's timeout fires.
        std::future::pending().await
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

type MockBuilder = dyn Fn(&str) -> Result<MockTransport, RelayError> + Send + Sync;

/// Connector producing scripted [`MockTransport`]s per URL.
pub struct MockConnector {
    builder: Box<MockBuilder>,
}

impl MockConnector {
    /// Builds connections with the given closure; return `Err` to simulate
    /// unreachable relays.
    pub fn new<F>(builder: F) -> Self
    where
        F: Fn(&str) -> Result<MockTransport, RelayError> + Send + Sync + 'static,
    {
        MockConnector {
            builder: Box::new(builder),
        }
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, url: &str) -> Result<MockTransport, RelayError> {
        (self.builder)(url)
    }
}
