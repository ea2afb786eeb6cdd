// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Signed Event Model
//!
//! Events are the unit of relay traffic: immutable, publisher-signed,
//! timestamped, tagged messages. The event id is the SHA-256 of the
//! canonical serialization `[0, pubkey, created_at, kind, tags, content]`
//! and the signature is a BIP-340 Schnorr signature over that id.

pub mod build;
pub mod kinds;

use ring::digest::{Context, SHA256};
use secp256k1::schnorr::Signature;
use secp256k1::{Message, XOnlyPublicKey, SECP256K1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event-related errors.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Malformed public key: {0}")]
    MalformedPublicKey(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Event id does not match its contents")]
    IdMismatch,

    #[error("Signature does not verify under the publisher key")]
    BadSignature,
}

/// A single event tag: an ordered list of strings whose first element is
/// the tag name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Builds a tag from a name and values.
    pub fn new<S: Into<String>>(name: &str, values: impl IntoIterator<Item = S>) -> Self {
        let mut parts = vec![name.to_string()];
        parts.extend(values.into_iter().map(Into::into));
        Tag(parts)
    }

    /// The tag name (first element), if any.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// The tag value (second element), if any.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// An unsigned event template: everything a signer needs to produce a
/// complete [`Event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTemplate {
    pub kind: u32,
    pub created_at: u64,
    pub tags: Vec<Tag>,
    pub content: String,
}

impl EventTemplate {
    /// Creates a template stamped with the current time.
    pub fn new(kind: u32, tags: Vec<Tag>, content: impl Into<String>) -> Self {
        EventTemplate {
            kind,
            created_at: unix_time(),
            tags,
            content: content.into(),
        }
    }
}

/// A complete, signed event as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Lowercase hex of the 32-byte canonical id.
    pub id: String,
    /// Lowercase hex of the publisher's 32-byte x-only public key.
    pub pubkey: String,
    /// Seconds since the Unix epoch, publisher-asserted.
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Tag>,
    pub content: String,
    /// Lowercase hex of the 64-byte Schnorr signature over the id.
    pub sig: String,
}

impl Event {
    /// First value of the first tag with the given name.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name() == Some(name))
            .and_then(Tag::value)
    }

    /// Recomputes the canonical id from the event fields.
    pub fn compute_id(&self) -> String {
        event_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// Checks that the id matches the fields and the signature verifies
    /// under the publisher key.
    pub fn verify(&self) -> Result<(), EventError> {
        if self.compute_id() != self.id {
            return Err(EventError::IdMismatch);
        }

        let pubkey_bytes = hex::decode(&self.pubkey)
            .map_err(|e| EventError::MalformedPublicKey(e.to_string()))?;
        let pubkey = XOnlyPublicKey::from_slice(&pubkey_bytes)
            .map_err(|e| EventError::MalformedPublicKey(e.to_string()))?;

        let sig_bytes =
            hex::decode(&self.sig).map_err(|e| EventError::MalformedSignature(e.to_string()))?;
        let sig = Signature::from_slice(&sig_bytes)
            .map_err(|e| EventError::MalformedSignature(e.to_string()))?;

        let id_bytes = hex::decode(&self.id).map_err(|_| EventError::IdMismatch)?;
        let digest: [u8; 32] = id_bytes.try_into().map_err(|_| EventError::IdMismatch)?;
        let message = Message::from_digest(digest);

        SECP256K1
            .verify_schnorr(&sig, &message, &pubkey)
            .map_err(|_| EventError::BadSignature)
    }
}

/// Computes the canonical event id: lowercase hex of the SHA-256 digest of
/// `[0, pubkey, created_at, kind, tags, content]` serialized as compact
/// JSON with standard string escaping.
///
/// The serialization covers arrays only, so there is no object-key
/// ordering to pin down; `serde_json` emits it byte-identically on every
/// platform.
pub fn event_id(
    pubkey: &str,
    created_at: u64,
    kind: u32,
    tags: &[Tag],
    content: &str,
) -> String {
    let canonical = serde_json::to_vec(&(0u8, pubkey, created_at, kind, tags, content))
        .expect("canonical event serialization cannot fail");

    let mut context = Context::new(&SHA256);
    context.update(&canonical);
    hex::encode(context.finish().as_ref())
}

/// Current time in seconds since the Unix epoch.
pub fn unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
