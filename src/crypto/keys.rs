// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-user key material.
//!
//! Keys are derived once per session and held only in memory. They are
//! never transmitted and never persisted.

use std::collections::HashMap;
use std::sync::Mutex;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::cipher::CryptoError;

/// Byte length of an AES-256 key.
pub const KEY_LEN: usize = 32;

/// Minimum length of the application secret the keys are derived from.
pub const MIN_SECRET_LEN: usize = 32;

/// Domain separation label for field keys.
const DERIVATION_LABEL: &[u8] = b"voy-vault/field-key/v1";

type HmacSha256 = Hmac<Sha256>;

/// 256-bit symmetric key for one user. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; KEY_LEN]);

impl KeyMaterial {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

/// Source of per-user key material.
///
/// Injected into [`FieldCipher`](super::FieldCipher) so tests can supply
/// deterministic keys.
pub trait KeyProvider: Send + Sync {
    /// Key material for `user_id`.
    fn key_for(&self, user_id: &str) -> Result<KeyMaterial, CryptoError>;

    /// Drop any cached key for `user_id`.
    fn forget(&self, _user_id: &str) {}

    /// Drop every cached key (session end).
    fn forget_all(&self) {}
}

/// Derives keys as `HMAC-SHA256(secret, label || 0x00 || user_id)`.
///
/// Derived keys are cached for the lifetime of the provider, which is one
/// session.
pub struct HmacKeyProvider {
    secret: Zeroizing<Vec<u8>>,
    cache: Mutex<HashMap<String, KeyMaterial>>,
}

impl HmacKeyProvider {
    /// Create a provider from the application secret.
    ///
    /// # Errors
    /// Returns `CryptoError::KeyUnavailable` if the secret is shorter than
    /// [`MIN_SECRET_LEN`] bytes.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, CryptoError> {
        let secret = Zeroizing::new(secret.into());
        if secret.len() < MIN_SECRET_LEN {
            return Err(CryptoError::KeyUnavailable(format!(
                "application secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        Ok(Self {
            secret,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn derive(&self, user_id: &str) -> Result<KeyMaterial, CryptoError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .map_err(|e| CryptoError::KeyUnavailable(e.to_string()))?;
        mac.update(DERIVATION_LABEL);
        mac.update(&[0]);
        mac.update(user_id.as_bytes());

        let mut out = [0u8; KEY_LEN];
        out.copy_from_slice(&mac.finalize().into_bytes());
        let key = KeyMaterial::from_bytes(out);
        out.zeroize();
        Ok(key)
    }

    /// Number of keys currently cached.
    pub fn cached_keys(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl KeyProvider for HmacKeyProvider {
    fn key_for(&self, user_id: &str) -> Result<KeyMaterial, CryptoError> {
        if user_id.is_empty() {
            return Err(CryptoError::KeyUnavailable("empty user id".to_string()));
        }

        if let Ok(cache) = self.cache.lock() {
            if let Some(key) = cache.get(user_id) {
                return Ok(key.clone());
            }
        }

        let key = self.derive(user_id)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(user_id.to_string(), key.clone());
        }
        Ok(key)
    }

    fn forget(&self, user_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(user_id);
        }
    }

    fn forget_all(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

/// Fixed keys, for tests and fixtures.
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    default: KeyMaterial,
    per_user: HashMap<String, KeyMaterial>,
}

impl StaticKeyProvider {
    /// Every user gets `default` unless overridden with [`with_user`](Self::with_user).
    pub fn new(default: KeyMaterial) -> Self {
        Self {
            default,
            per_user: HashMap::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>, key: KeyMaterial) -> Self {
        self.per_user.insert(user_id.into(), key);
        self
    }
}

impl KeyProvider for StaticKeyProvider {
    fn key_for(&self, user_id: &str) -> Result<KeyMaterial, CryptoError> {
        Ok(self
            .per_user
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}
