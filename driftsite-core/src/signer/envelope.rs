// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Signer Envelope Encryption
//!
//! Request/response payloads for the remote signer are sealed with a
//! conversation key derived once per session: ECDH over secp256k1, HKDF
//! extraction, then ChaCha20-Poly1305 with a fresh random nonce per
//! message. The wire form is base64 of `nonce || ciphertext || tag`.

use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, CHACHA20_POLY1305, NONCE_LEN};
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};
use secp256k1::ecdh::SharedSecret;
use secp256k1::{Parity, PublicKey, XOnlyPublicKey};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::keys::Keys;

const HKDF_SALT: &[u8] = b"driftsite-signer-envelope-v1";

/// Envelope failures.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Envelope payload is malformed")]
    Malformed,

    #[error("Envelope decryption failed")]
    Decrypt,

    #[error("Envelope encryption failed")]
    Encrypt,
}

/// Symmetric key shared by the two ends of a signer session.
pub struct ConversationKey(Zeroizing<[u8; 32]>);

impl ConversationKey {
    /// Derives the key from our secret and the peer's x-only public key.
    /// ECDH is symmetric, so both sides derive the same key.
    pub fn derive(local: &Keys, peer: &XOnlyPublicKey) -> Self {
        let peer_full = PublicKey::from_x_only_public_key(*peer, Parity::Even);
        let shared = SharedSecret::new(&peer_full, &local.secret_key());

        let mut okm = Zeroizing::new([0u8; 32]);
        hkdf::Salt::new(hkdf::HKDF_SHA256, HKDF_SALT)
            .extract(shared.as_ref())
            .expand(&[], hkdf::HKDF_SHA256)
            .expect("HKDF expand of fixed-size key cannot fail")
            .fill(okm.as_mut())
            .expect("HKDF fill of fixed-size key cannot fail");
        ConversationKey(okm)
    }

    /// Seals a plaintext into the base64 wire form.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, EnvelopeError> {
        let key = LessSafeKey::new(
            UnboundKey::new(&CHACHA20_POLY1305, self.0.as_ref())
                .map_err(|_| EnvelopeError::Encrypt)?,
        );

        let mut nonce_bytes = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|_| EnvelopeError::Encrypt)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut buffer = plaintext.to_vec();
        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| EnvelopeError::Encrypt)?;

        let mut wire = Vec::with_capacity(NONCE_LEN + buffer.len());
        wire.extend_from_slice(&nonce_bytes);
        wire.extend_from_slice(&buffer);
        Ok(base64::engine::general_purpose::STANDARD.encode(wire))
    }

    /// Opens a base64 wire payload.
    pub fn open(&self, payload: &str) -> Result<Vec<u8>, EnvelopeError> {
        let wire = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|_| EnvelopeError::Malformed)?;
        if wire.len() < NONCE_LEN + CHACHA20_POLY1305.tag_len() {
            return Err(EnvelopeError::Malformed);
        }

        let key = LessSafeKey::new(
            UnboundKey::new(&CHACHA20_POLY1305, self.0.as_ref())
                .map_err(|_| EnvelopeError::Decrypt)?,
        );
        let nonce_bytes: [u8; NONCE_LEN] = wire[..NONCE_LEN]
            .try_into()
            .map_err(|_| EnvelopeError::Malformed)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut buffer = wire[NONCE_LEN..].to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| EnvelopeError::Decrypt)?;
        Ok(plaintext.to_vec())
    }
}
