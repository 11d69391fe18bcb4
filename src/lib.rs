// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Voy Vault - Personal Data Vault
//!
//! Encrypts a user's sensitive identity fields before they leave the
//! device, decrypts them transparently on load, and issues short-lived
//! signed links for private documents and avatars.
//!
//! ## Modules
//!
//! - `crypto` - AES-256-GCM field cipher and per-user key derivation
//! - `vault` - Profile load/save and the secure blob gateway
//! - `cache` - Session-scoped decrypted profile cache
//! - `storage` - Remote table and blob store adapters
//! - `session` - Authenticated user handle
//! - `config` - Environment configuration
//! - `telemetry` - Tracing subscriber setup
//!
//! ## Wiring
//!
//! ```no_run
//! use std::sync::Arc;
//! use voy_vault::{
//!     CacheSync, FieldCipher, HttpStore, ProfileVault, SecureBlobGateway,
//!     TableProfileRepository, VaultConfig,
//! };
//!
//! # fn main() -> Result<(), voy_vault::VaultError> {
//! let config = VaultConfig::from_env()?;
//! voy_vault::telemetry::init(config.log_format);
//!
//! let store = HttpStore::new(reqwest::Client::new(), config.store_url.clone(), config.api_key.clone());
//! let vault = ProfileVault::new(
//!     TableProfileRepository::new(store.clone()),
//!     SecureBlobGateway::from_config(store, &config),
//!     FieldCipher::new(Arc::new(config.key_provider()?)),
//! );
//! let cache = CacheSync::new(vault, config.cache_capacity);
//! # let _ = cache;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod vault;

pub use cache::{CacheOutcome, CacheSync, FieldState};
pub use config::{LogFormat, VaultConfig};
pub use crypto::{
    CryptoError, EncryptedField, FieldCipher, HmacKeyProvider, KeyMaterial, KeyProvider,
    StaticKeyProvider,
};
pub use error::{AccessKind, VaultError, VaultResult};
pub use session::AuthenticatedUser;
pub use storage::{
    HttpStore, InMemoryBlobStore, InMemoryTable, ProfileField, TableProfileRepository,
};
pub use vault::{
    AvatarLink, DocumentLink, ProfileRecord, ProfileUpdate, ProfileVault, SecureBlobGateway,
    SignedAccessGrant,
};
