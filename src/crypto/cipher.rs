// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! AES-256-GCM encryption of individual string fields.

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::RngCore;
use thiserror::Error;

use super::keys::{KeyMaterial, KeyProvider};

/// Byte length of an AES-GCM nonce (96 bits).
pub const NONCE_LEN: usize = 12;

/// Version tag written by [`encrypt_field`].
pub const CURRENT_VERSION: &str = "v1";

const SEPARATOR: char = ':';

/// Errors produced by the cipher layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Versioned shape with a known tag, but segments do not decode.
    #[error("encrypted field is malformed")]
    Malformed,

    #[error("unsupported encrypted field version: {0}")]
    UnsupportedVersion(String),

    /// Integrity check failed (tampered ciphertext or wrong key).
    #[error("authentication failed")]
    Authentication,

    #[error("decrypted field is not valid UTF-8")]
    InvalidUtf8,

    #[error("encryption failed")]
    Encryption,

    #[error("key material unavailable: {0}")]
    KeyUnavailable(String),
}

impl CryptoError {
    /// Stable label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CryptoError::Malformed => "malformed",
            CryptoError::UnsupportedVersion(_) => "unsupported_version",
            CryptoError::Authentication => "authentication",
            CryptoError::InvalidUtf8 => "invalid_utf8",
            CryptoError::Encryption => "encryption",
            CryptoError::KeyUnavailable(_) => "key_unavailable",
        }
    }
}

/// A parsed encrypted field value.
///
/// The string representation is `v1:<base64url(nonce)>:<base64url(ciphertext+tag)>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl EncryptedField {
    /// Build from raw parts.
    pub fn from_parts(nonce: [u8; NONCE_LEN], ciphertext: Vec<u8>) -> Self {
        Self { nonce, ciphertext }
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// Ciphertext with the trailing 16-byte authentication tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Encode to the storage representation.
    pub fn encode(&self) -> String {
        format!(
            "{CURRENT_VERSION}{SEPARATOR}{}{SEPARATOR}{}",
            Base64UrlUnpadded::encode_string(&self.nonce),
            Base64UrlUnpadded::encode_string(&self.ciphertext),
        )
    }

    /// Parse a stored value.
    ///
    /// Returns `Ok(None)` when the value is not in the versioned shape at all
    /// (legacy plaintext). A value that claims a version but cannot be parsed
    /// is an error, so ciphertext is never mistaken for plaintext.
    pub fn parse(value: &str) -> Result<Option<Self>, CryptoError> {
        let parts: Vec<&str> = value.split(SEPARATOR).collect();
        if parts.len() != 3 || !is_version_tag(parts[0]) {
            return Ok(None);
        }
        if parts[0] != CURRENT_VERSION {
            return Err(CryptoError::UnsupportedVersion(parts[0].to_string()));
        }

        let nonce_bytes =
            Base64UrlUnpadded::decode_vec(parts[1]).map_err(|_| CryptoError::Malformed)?;
        let nonce: [u8; NONCE_LEN] = nonce_bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::Malformed)?;

        let ciphertext =
            Base64UrlUnpadded::decode_vec(parts[2]).map_err(|_| CryptoError::Malformed)?;
        if ciphertext.is_empty() {
            return Err(CryptoError::Malformed);
        }

        Ok(Some(Self { nonce, ciphertext }))
    }

    /// Authenticate and decrypt with `key`.
    pub fn open(&self, key: &KeyMaterial) -> Result<String, CryptoError> {
        let cipher = build_cipher(key)?;
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&self.nonce),
                Payload {
                    msg: &self.ciphertext,
                    aad: CURRENT_VERSION.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Authentication)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }
}

impl std::fmt::Display for EncryptedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

fn is_version_tag(tag: &str) -> bool {
    tag.len() > 1
        && tag.starts_with('v')
        && tag[1..].bytes().all(|b| b.is_ascii_digit())
}

fn build_cipher(key: &KeyMaterial) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::KeyUnavailable("invalid key length".to_string()))
}

/// Encrypt a plaintext field under `key` with a fresh random nonce.
pub fn encrypt_field(plaintext: &str, key: &KeyMaterial) -> Result<EncryptedField, CryptoError> {
    let cipher = build_cipher(key)?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext.as_bytes(),
                aad: CURRENT_VERSION.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    Ok(EncryptedField { nonce, ciphertext })
}

/// Decrypt a stored value.
///
/// Legacy plaintext (anything not in the versioned shape) is returned
/// unchanged.
pub fn decrypt_value(value: &str, key: &KeyMaterial) -> Result<String, CryptoError> {
    match EncryptedField::parse(value)? {
        Some(field) => field.open(key),
        None => Ok(value.to_string()),
    }
}

/// Whether `value` carries the versioned encrypted shape.
pub fn is_encrypted(value: &str) -> bool {
    !matches!(EncryptedField::parse(value), Ok(None))
}

/// Field cipher bound to a key provider.
pub struct FieldCipher<K> {
    keys: Arc<K>,
}

impl<K> Clone for FieldCipher<K> {
    fn clone(&self) -> Self {
        Self {
            keys: Arc::clone(&self.keys),
        }
    }
}

impl<K: KeyProvider> FieldCipher<K> {
    pub fn new(keys: Arc<K>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Encrypt `plaintext` for `user_id`.
    pub fn encrypt(&self, user_id: &str, plaintext: &str) -> Result<EncryptedField, CryptoError> {
        let key = self.keys.key_for(user_id)?;
        encrypt_field(plaintext, &key)
    }

    /// Decrypt a stored value for `user_id`.
    pub fn decrypt(&self, user_id: &str, value: &str) -> Result<String, CryptoError> {
        // Legacy values need no key.
        let Some(field) = EncryptedField::parse(value)? else {
            return Ok(value.to_string());
        };
        let key = self.keys.key_for(user_id)?;
        field.open(&key)
    }
}
