// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Profile load/save with transparent field encryption.
//!
//! ## Write path
//!
//! ```text
//! ProfileUpdate -> validate -> encrypt sensitive fields -> ProfilePatch -> upsert
//! ```
//!
//! ## Read path
//!
//! ```text
//! fetch (or create) -> decrypt sensitive fields -> open avatar -> ProfileRecord
//! ```
//!
//! A field that fails to decrypt comes back empty and is listed in
//! [`ProfileRecord::degraded_fields`]; the rest of the profile still loads.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::crypto::{is_encrypted, FieldCipher, KeyProvider};
use crate::error::{VaultError, VaultResult};
use crate::session::AuthenticatedUser;
use crate::storage::{
    BlobRepository, ProfileField, ProfilePatch, ProfileRepository, StoredProfile,
};

use super::gateway::{DocumentLink, SecureBlobGateway};
use super::profile::{AvatarLink, ProfileRecord, ProfileUpdate};

/// Orchestrates encryption and avatar resolution around the profile store.
pub struct ProfileVault<P, B, K> {
    profiles: P,
    gateway: SecureBlobGateway<B>,
    cipher: FieldCipher<K>,
}

impl<P, B, K> ProfileVault<P, B, K>
where
    P: ProfileRepository,
    B: BlobRepository,
    K: KeyProvider,
{
    pub fn new(profiles: P, gateway: SecureBlobGateway<B>, cipher: FieldCipher<K>) -> Self {
        Self {
            profiles,
            gateway,
            cipher,
        }
    }

    pub fn profiles(&self) -> &P {
        &self.profiles
    }

    pub fn gateway(&self) -> &SecureBlobGateway<B> {
        &self.gateway
    }

    pub fn cipher(&self) -> &FieldCipher<K> {
        &self.cipher
    }

    /// Load and decrypt the user's profile, creating an empty row on first use.
    ///
    /// # Errors
    /// - `Validation` without an active user
    /// - `Network` when the store is unreachable
    ///
    /// Decryption and avatar failures never fail the load.
    pub async fn load(&self, user: &AuthenticatedUser) -> VaultResult<ProfileRecord> {
        let user_id = user.ensure_active()?;

        let stored = match self.profiles.fetch(user_id).await? {
            Some(stored) => stored,
            None => {
                let mut patch = ProfilePatch::new(user_id);
                patch.updated_at = Some(Utc::now());
                self.profiles.upsert(&patch).await?;
                info!(user_id, "Created empty profile");
                StoredProfile::empty(user_id)
            }
        };

        let mut record = self.open_record(user_id, stored);
        record.avatar = self.open_avatar(user_id, record.avatar_ref.as_deref()).await;

        debug!(
            user_id,
            degraded = record.degraded_fields.len(),
            "Profile loaded"
        );
        Ok(record)
    }

    fn open_record(&self, user_id: &str, stored: StoredProfile) -> ProfileRecord {
        let mut record = ProfileRecord::empty(user_id);

        for field in ProfileField::ALL {
            let Some(value) = stored.column(field) else {
                continue;
            };
            if !field.is_sensitive() {
                record.set_text(field, Some(value.to_string()));
                continue;
            }

            let plaintext = match self.cipher.decrypt(user_id, value) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    warn!(
                        user_id,
                        field = %field,
                        error = e.kind(),
                        "Failed to decrypt profile field"
                    );
                    record.degraded_fields.push(field);
                    String::new()
                }
            };
            record.set_text(field, Some(plaintext));
        }

        record.quick_access = stored.quick_access.unwrap_or_default();
        record
    }

    async fn open_avatar(&self, user_id: &str, reference: Option<&str>) -> AvatarLink {
        match self.gateway.open(reference).await {
            Ok(DocumentLink::NoFile) => AvatarLink::NoFile,
            Ok(DocumentLink::Signed(grant)) => AvatarLink::Ready(grant),
            Err(e) => {
                warn!(user_id, error = %e, "Avatar unavailable");
                match e {
                    VaultError::Access { kind, .. } => AvatarLink::Failed(Some(kind)),
                    _ => AvatarLink::Failed(None),
                }
            }
        }
    }

    /// Validate, encrypt and upsert a partial update.
    ///
    /// Plaintext for the four sensitive fields never leaves this call.
    pub async fn save(&self, user: &AuthenticatedUser, update: &ProfileUpdate) -> VaultResult<()> {
        let user_id = user.ensure_active()?;
        update.validate()?;

        let patch = self.seal(user_id, update)?;
        self.profiles.upsert(&patch).await.map_err(|e| {
            warn!(user_id, error = %e, "Profile save failed");
            VaultError::from(e)
        })?;

        info!(user_id, fields = ?update.fields(), "Profile saved");
        Ok(())
    }

    fn seal(&self, user_id: &str, update: &ProfileUpdate) -> VaultResult<ProfilePatch> {
        let mut patch = ProfilePatch::new(user_id);

        for field in update.fields() {
            let Some(value) = update.text(field) else {
                continue;
            };
            let stored = if value.is_empty() {
                None
            } else if field.is_sensitive() {
                Some(self.cipher.encrypt(user_id, value)?.encode())
            } else {
                Some(value.to_string())
            };
            patch.set(field, stored);
        }

        patch.quick_access = update.quick_access.clone();
        patch.updated_at = Some(Utc::now());
        Ok(patch)
    }

    /// Re-encrypt sensitive columns that still hold legacy plaintext.
    ///
    /// Returns the migrated fields; empty when nothing needed migrating.
    pub async fn migrate_legacy(&self, user: &AuthenticatedUser) -> VaultResult<Vec<ProfileField>> {
        let user_id = user.ensure_active()?;
        let Some(stored) = self.profiles.fetch(user_id).await? else {
            return Ok(Vec::new());
        };

        let mut patch = ProfilePatch::new(user_id);
        let mut migrated = Vec::new();
        for field in ProfileField::SENSITIVE {
            let Some(value) = stored.column(field) else {
                continue;
            };
            if value.is_empty() || is_encrypted(value) {
                continue;
            }
            patch.set(field, Some(self.cipher.encrypt(user_id, value)?.encode()));
            migrated.push(field);
        }

        if migrated.is_empty() {
            return Ok(migrated);
        }

        patch.updated_at = Some(Utc::now());
        self.profiles.upsert(&patch).await?;
        info!(user_id, fields = ?migrated, "Migrated legacy plaintext fields");
        Ok(migrated)
    }
}
