// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blob repository: bucket-scoped object storage.

use std::future::Future;

use chrono::{DateTime, Utc};

use super::super::RemoteResult;

/// Signed URL as issued by the storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Repository for object storage operations.
pub trait BlobRepository: Send + Sync {
    /// Request a time-boxed read authorization for `path` in `bucket`.
    ///
    /// # Errors
    /// `RemoteError::NotFound` when the object does not exist,
    /// `RemoteError::Denied` when the backend refuses, kept distinct.
    fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = RemoteResult<SignedUrl>> + Send;

    /// Stable URL for an object in a public bucket.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Store `bytes` at `path`, replacing any existing object.
    fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = RemoteResult<()>> + Send;
}
