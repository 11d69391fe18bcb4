// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secure blob gateway: stored references to short-lived signed URLs.
//!
//! A grant is issued for every open and never reused. Once a grant has
//! expired the caller must open the document again; there is no renewal
//! and no automatic retry.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::VaultConfig;
use crate::error::{AccessKind, VaultError, VaultResult};
use crate::session::AuthenticatedUser;
use crate::storage::paths::{avatar_extension, avatar_object_path, resolve_path};
use crate::storage::{
    BlobRepository, DEFAULT_SIGNED_URL_TTL_SECS, MAX_SIGNED_URL_TTL_SECS, PUBLIC_BUCKET,
    SECURE_BUCKET,
};

/// Largest accepted avatar upload.
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

/// Temporary read access to one private object. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAccessGrant {
    pub url: String,
    pub bucket: String,
    pub path: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SignedAccessGrant {
    /// Whether the grant still authorizes access at `at`.
    pub fn is_usable_at(&self, at: DateTime<Utc>) -> bool {
        at < self.expires_at
    }

    /// The URL, if the grant is still usable at `at`.
    ///
    /// # Errors
    /// `AccessKind::Expired`; treat like a failed fetch and open again.
    pub fn ensure_usable_at(&self, at: DateTime<Utc>) -> VaultResult<&str> {
        if self.is_usable_at(at) {
            Ok(&self.url)
        } else {
            Err(VaultError::access(AccessKind::Expired, self.path.clone()))
        }
    }

    pub fn ensure_usable(&self) -> VaultResult<&str> {
        self.ensure_usable_at(Utc::now())
    }
}

/// Result of opening a stored reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentLink {
    /// Nothing attached. A normal state, not an error.
    NoFile,
    Signed(SignedAccessGrant),
}

/// Resolves stored references and issues signed URLs.
#[derive(Debug, Clone)]
pub struct SecureBlobGateway<B> {
    blobs: B,
    public_bucket: String,
    secure_bucket: String,
    ttl_secs: u64,
}

impl<B: BlobRepository> SecureBlobGateway<B> {
    /// Gateway with the default buckets and TTL.
    pub fn new(blobs: B) -> Self {
        Self {
            blobs,
            public_bucket: PUBLIC_BUCKET.to_string(),
            secure_bucket: SECURE_BUCKET.to_string(),
            ttl_secs: DEFAULT_SIGNED_URL_TTL_SECS,
        }
    }

    pub fn from_config(blobs: B, config: &VaultConfig) -> Self {
        Self {
            blobs,
            public_bucket: config.public_bucket.clone(),
            secure_bucket: config.secure_bucket.clone(),
            ttl_secs: config.signed_url_ttl_secs,
        }
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn secure_bucket(&self) -> &str {
        &self.secure_bucket
    }

    pub fn public_bucket(&self) -> &str {
        &self.public_bucket
    }

    /// Path of `reference` inside `bucket`.
    pub fn resolve_path(&self, reference: &str, bucket: &str) -> VaultResult<String> {
        resolve_path(reference, bucket)
    }

    /// Issue a fresh signed URL for `path` in the secure bucket.
    ///
    /// `ttl_secs` defaults to the configured TTL (3600 s unless overridden).
    ///
    /// # Errors
    /// - `Access { kind: Denied }` when the backend refuses
    /// - `Access { kind: NotFound }` when the object is missing
    /// - `Network` on transport failure
    /// - `Validation` for an empty path or out-of-range TTL
    pub async fn issue_signed_url(
        &self,
        path: &str,
        ttl_secs: Option<u64>,
    ) -> VaultResult<SignedAccessGrant> {
        let ttl = ttl_secs.unwrap_or(self.ttl_secs);
        if path.is_empty() {
            return Err(VaultError::validation("empty object path"));
        }
        if !(1..=MAX_SIGNED_URL_TTL_SECS).contains(&ttl) {
            return Err(VaultError::validation(format!(
                "signed URL TTL must be between 1 and {MAX_SIGNED_URL_TTL_SECS} seconds"
            )));
        }

        let issued_at = Utc::now();
        let signed = self
            .blobs
            .create_signed_url(&self.secure_bucket, path, ttl)
            .await
            .map_err(|e| {
                warn!(bucket = %self.secure_bucket, path, error = %e, "Signed URL request failed");
                VaultError::from(e)
            })?;

        debug!(bucket = %self.secure_bucket, path, ttl, "Issued signed URL");
        Ok(SignedAccessGrant {
            url: signed.url,
            bucket: self.secure_bucket.clone(),
            path: path.to_string(),
            issued_at,
            expires_at: signed.expires_at,
        })
    }

    /// Open a stored secure-bucket reference.
    ///
    /// A missing or blank reference is [`DocumentLink::NoFile`]. Every call
    /// issues a new grant; this is also the manual retry entry point.
    pub async fn open(&self, reference: Option<&str>) -> VaultResult<DocumentLink> {
        let Some(reference) = reference.filter(|r| !r.trim().is_empty()) else {
            return Ok(DocumentLink::NoFile);
        };
        let path = resolve_path(reference, &self.secure_bucket)?;
        let grant = self.issue_signed_url(&path, None).await?;
        Ok(DocumentLink::Signed(grant))
    }

    /// Stable URL for a public-bucket reference.
    pub fn public_url(&self, reference: &str) -> VaultResult<String> {
        let path = resolve_path(reference, &self.public_bucket)?;
        Ok(self.blobs.public_url(&self.public_bucket, &path))
    }

    /// Store a new avatar image in the secure bucket.
    ///
    /// Returns `<bucket>/<path>` to save as the profile's avatar reference;
    /// the bucket segment keeps the user folder when the reference is
    /// resolved again.
    pub async fn upload_avatar(
        &self,
        user: &AuthenticatedUser,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> VaultResult<String> {
        let user_id = user.ensure_active()?;
        let extension = avatar_extension(content_type).ok_or_else(|| {
            VaultError::validation(format!("unsupported avatar type {content_type}"))
        })?;
        if bytes.is_empty() || bytes.len() > MAX_AVATAR_BYTES {
            return Err(VaultError::validation(format!(
                "avatar must be between 1 byte and {MAX_AVATAR_BYTES} bytes"
            )));
        }

        let path = avatar_object_path(user_id, extension);
        self.blobs
            .upload(&self.secure_bucket, &path, bytes, content_type)
            .await?;

        info!(user_id, bucket = %self.secure_bucket, path = %path, "Avatar uploaded");
        Ok(format!("{}/{path}", self.secure_bucket))
    }
}
