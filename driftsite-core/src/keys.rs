// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Publisher Keys
//!
//! A secp256k1 keypair held in a zeroizing container, plus the bech32
//! codecs used for human-facing key material (`npub` public keys, `nsec`
//! secret keys) and gateway hostnames.

use bech32::{Bech32, Hrp};
use secp256k1::schnorr::Signature;
use secp256k1::{Keypair, Message, SecretKey, XOnlyPublicKey, SECP256K1};
use thiserror::Error;
use zeroize::Zeroizing;

/// Bech32 prefix for public keys.
const NPUB_HRP: &str = "npub";
/// Bech32 prefix for secret keys.
const NSEC_HRP: &str = "nsec";

/// Key parsing and encoding errors.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid bech32 string: {0}")]
    InvalidBech32(String),

    #[error("Unexpected bech32 prefix: expected {expected}, got {actual}")]
    WrongPrefix { expected: String, actual: String },
}

/// A publisher keypair. The secret scalar is zeroized on drop and never
/// leaves this container except through [`Keys::nsec`].
#[derive(Clone)]
pub struct Keys {
    secret: Zeroizing<[u8; 32]>,
    public_key: XOnlyPublicKey,
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl Keys {
    /// Generates a fresh random keypair.
    pub fn generate() -> Self {
        let (secret_key, _) = SECP256K1.generate_keypair(&mut rand::thread_rng());
        Self::from_secret_bytes(secret_key.secret_bytes())
            .expect("freshly generated key is valid")
    }

    /// Builds a keypair from a raw 32-byte secret scalar.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Result<Self, KeyError> {
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|e| KeyError::InvalidSecretKey(e.to_string()))?;
        let keypair = Keypair::from_secret_key(SECP256K1, &secret_key);
        let (public_key, _parity) = keypair.x_only_public_key();

        Ok(Keys {
            secret: Zeroizing::new(bytes),
            public_key,
        })
    }

    /// Parses a secret key from lowercase hex or an `nsec` bech32 string.
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        let input = input.trim();
        if input.starts_with(NSEC_HRP) {
            let bytes = decode_prefixed(NSEC_HRP, input)?;
            let arr: [u8; 32] = bytes
                .try_into()
                .map_err(|_| KeyError::InvalidSecretKey("wrong length".into()))?;
            return Self::from_secret_bytes(arr);
        }

        let bytes = hex::decode(input).map_err(|e| KeyError::InvalidSecretKey(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey("wrong length".into()))?;
        Self::from_secret_bytes(arr)
    }

    /// The x-only public key.
    pub fn public_key(&self) -> XOnlyPublicKey {
        self.public_key
    }

    /// Lowercase hex of the 32-byte public key.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Bech32 `npub` encoding of the public key.
    pub fn npub(&self) -> String {
        encode_npub(&self.public_key)
    }

    /// Bech32 `nsec` encoding of the secret key.
    pub fn nsec(&self) -> String {
        encode_prefixed(NSEC_HRP, self.secret.as_ref())
    }

    /// Signs a 32-byte digest with BIP-340 Schnorr.
    pub fn sign_digest(&self, digest: [u8; 32]) -> Signature {
        let keypair = self.keypair();
        SECP256K1.sign_schnorr(&Message::from_digest(digest), &keypair)
    }

    /// The secret key, for ECDH with a peer key.
    pub(crate) fn secret_key(&self) -> SecretKey {
        SecretKey::from_slice(self.secret.as_ref()).expect("held scalar is valid")
    }

    fn keypair(&self) -> Keypair {
        Keypair::from_secret_key(SECP256K1, &self.secret_key())
    }
}

/// Encodes a public key as `npub…`.
pub fn encode_npub(public_key: &XOnlyPublicKey) -> String {
    encode_prefixed(NPUB_HRP, &public_key.serialize())
}

/// Decodes an `npub…` string into a public key.
pub fn decode_npub(input: &str) -> Result<XOnlyPublicKey, KeyError> {
    let bytes = decode_prefixed(NPUB_HRP, input)?;
    XOnlyPublicKey::from_slice(&bytes).map_err(|e| KeyError::InvalidPublicKey(e.to_string()))
}

/// Parses a public key from lowercase hex or `npub` bech32.
pub fn parse_public_key(input: &str) -> Result<XOnlyPublicKey, KeyError> {
    let input = input.trim();
    if input.starts_with(NPUB_HRP) {
        return decode_npub(input);
    }
    let bytes = hex::decode(input).map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?;
    XOnlyPublicKey::from_slice(&bytes).map_err(|e| KeyError::InvalidPublicKey(e.to_string()))
}

pub(crate) fn encode_prefixed(hrp: &str, data: &[u8]) -> String {
    let hrp = Hrp::parse(hrp).expect("static prefix is valid");
    bech32::encode::<Bech32>(hrp, data).expect("bech32 encoding of short payload cannot fail")
}

pub(crate) fn decode_prefixed(expected_hrp: &str, input: &str) -> Result<Vec<u8>, KeyError> {
    let (hrp, data) = bech32::decode(input).map_err(|e| KeyError::InvalidBech32(e.to_string()))?;
    if hrp.as_str() != expected_hrp {
        return Err(KeyError::WrongPrefix {
            expected: expected_hrp.to_string(),
            actual: hrp.as_str().to_string(),
        });
    }
    Ok(data)
}
