// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Relay Wire Frames
//!
//! Every frame is a JSON array whose first element is a capitalized verb.
//! Client to relay: `EVENT`, `REQ`, `CLOSE`. Relay to client: `OK`,
//! `EVENT`, `EOSE`, `NOTICE`, `CLOSED`, `AUTH`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::RelayError;
use crate::event::Event;

/// Subscription filter sent inside a `REQ` frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    /// `p` tag filter, serialized as `#p`.
    #[serde(rename = "#p", skip_serializing_if = "Option::is_none")]
    pub p_tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl Filter {
    pub fn new() -> Self {
        Filter::default()
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u32>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn author(mut self, pubkey_hex: impl Into<String>) -> Self {
        self.authors.get_or_insert_with(Vec::new).push(pubkey_hex.into());
        self
    }

    pub fn p_tag(mut self, pubkey_hex: impl Into<String>) -> Self {
        self.p_tags.get_or_insert_with(Vec::new).push(pubkey_hex.into());
        self
    }

    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }
}

/// Frames sent by us.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Event(Event),
    Req {
        subscription_id: String,
        filter: Filter,
    },
    Close {
        subscription_id: String,
    },
}

impl ClientMessage {
    /// Serializes the frame to its wire text.
    pub fn encode(&self) -> String {
        match self {
            ClientMessage::Event(event) => json!(["EVENT", event]).to_string(),
            ClientMessage::Req {
                subscription_id,
                filter,
            } => json!(["REQ", subscription_id, filter]).to_string(),
            ClientMessage::Close { subscription_id } => {
                json!(["CLOSE", subscription_id]).to_string()
            }
        }
    }
}

/// Frames received from a relay.
#[derive(Debug, Clone)]
pub enum RelayMessage {
    /// Acknowledgement of a published event.
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    /// An event matching one of our subscriptions.
    Event {
        subscription_id: String,
        event: Event,
    },
    /// End of stored events for a subscription.
    Eose { subscription_id: String },
    /// Human-readable relay notice.
    Notice { message: String },
    /// The relay closed a subscription on its side.
    Closed {
        subscription_id: String,
        message: String,
    },
    /// Authentication challenge; recorded but not answered.
    Auth { challenge: String },
}

impl RelayMessage {
    /// Parses a wire frame. Unknown verbs and malformed frames are errors;
    /// callers skip them and keep reading.
    pub fn parse(text: &str) -> Result<RelayMessage, RelayError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RelayError::InvalidFrame(e.to_string()))?;
        let array = value
            .as_array()
            .ok_or_else(|| RelayError::InvalidFrame("frame is not an array".into()))?;
        let verb = array
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::InvalidFrame("missing verb".into()))?;

        match verb {
            "OK" => {
                let event_id = string_at(array, 1)?;
                let accepted = array
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| RelayError::InvalidFrame("OK without status".into()))?;
                let message = array
                    .get(3)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(RelayMessage::Ok {
                    event_id,
                    accepted,
                    message,
                })
            }
            "EVENT" => {
                let subscription_id = string_at(array, 1)?;
                let event: Event = serde_json::from_value(
                    array
                        .get(2)
                        .cloned()
                        .ok_or_else(|| RelayError::InvalidFrame("EVENT without body".into()))?,
                )
                .map_err(|e| RelayError::InvalidFrame(e.to_string()))?;
                Ok(RelayMessage::Event {
                    subscription_id,
                    event,
                })
            }
            "EOSE" => Ok(RelayMessage::Eose {
                subscription_id: string_at(array, 1)?,
            }),
            "NOTICE" => Ok(RelayMessage::Notice {
                message: string_at(array, 1)?,
            }),
            "CLOSED" => Ok(RelayMessage::Closed {
                subscription_id: string_at(array, 1)?,
                message: array
                    .get(2)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            "AUTH" => Ok(RelayMessage::Auth {
                challenge: string_at(array, 1)?,
            }),
            other => Err(RelayError::InvalidFrame(format!("unknown verb {other}"))),
        }
    }
}

fn string_at(array: &[Value], index: usize) -> Result<String, RelayError> {
    array
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RelayError::InvalidFrame(format!("missing string at index {index}")))
}
