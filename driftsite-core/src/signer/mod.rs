// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Signing Abstraction
//!
//! A signer turns an [`EventTemplate`] into a complete signed [`Event`].
//! Two variants exist: [`LocalSigner`] computes everything in process from
//! a secret key; [`remote::RemoteSigner`] forwards templates to another
//! keypair reached over the relay mesh. Callers see one uniform operation
//! that eventually returns a signed event; same-caller requests are never
//! reordered.

pub mod envelope;
pub mod remote;

use async_trait::async_trait;
use secp256k1::XOnlyPublicKey;
use thiserror::Error;

use crate::event::{event_id, Event, EventTemplate};
use crate::keys::{KeyError, Keys};

/// Signer failures. Remote-variant errors abort the run; there is no
/// fallback signer.
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Malformed signer key: {0}")]
    MalformedKey(#[from] KeyError),

    #[error("Invalid signer credential: {0}")]
    InvalidCredential(String),

    #[error("Remote signer unreachable: {0}")]
    Unreachable(String),

    #[error("Remote signer rejected the request: {0}")]
    Rejected(String),

    #[error("Remote signer timed out")]
    Timeout,

    #[error("Signer transport error: {0}")]
    Transport(String),
}

/// Uniform signing operation over local and remote key material.
#[async_trait]
pub trait Signer: Send + Sync {
    /// The publisher identity. Implementations may cache after the first
    /// call.
    async fn public_key(&self) -> Result<XOnlyPublicKey, SignerError>;

    /// Fills the publisher identity, computes the canonical id, signs,
    /// and returns the complete event. May suspend (remote variant).
    async fn sign(&self, template: EventTemplate) -> Result<Event, SignerError>;
}

/// In-process signer over a local secret key. Pure computation, no I/O.
pub struct LocalSigner {
    keys: Keys,
}

impl LocalSigner {
    pub fn new(keys: Keys) -> Self {
        LocalSigner { keys }
    }

    /// Parses a secret key (hex or `nsec`). The only failure mode of the
    /// local variant is a malformed key at construction.
    pub fn from_secret(input: &str) -> Result<Self, SignerError> {
        Ok(LocalSigner {
            keys: Keys::parse(input)?,
        })
    }

    /// Signs a template synchronously; the async trait method delegates
    /// here.
    pub fn sign_template(&self, template: EventTemplate) -> Event {
        let pubkey = self.keys.public_key_hex();
        let id = event_id(
            &pubkey,
            template.created_at,
            template.kind,
            &template.tags,
            &template.content,
        );
        let digest: [u8; 32] = hex::decode(&id)
            .expect("event id is valid hex")
            .try_into()
            .expect("event id is 32 bytes");
        let sig = self.keys.sign_digest(digest);

        Event {
            id,
            pubkey,
            created_at: template.created_at,
            kind: template.kind,
            tags: template.tags,
            content: template.content,
            sig: sig.to_string(),
        }
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn public_key(&self) -> Result<XOnlyPublicKey, SignerError> {
        Ok(self.keys.public_key())
    }

    async fn sign(&self, template: EventTemplate) -> Result<Event, SignerError> {
        Ok(self.sign_template(template))
    }
}
