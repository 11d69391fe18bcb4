// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Remote Storage Module
//!
//! The remote store is an opaque key-value table store plus an opaque blob
//! store with bucket-scoped access control.
//!
//! ## Layers
//!
//! ```text
//! repository/   typed: ProfileRepository, BlobRepository
//! remote.rs     untyped boundary: RemoteTable (JSON rows)
//! http.rs       REST adapter (reqwest)
//! memory.rs     in-process adapter (tests, offline development)
//! paths.rs      buckets and reference resolution
//! ```
//!
//! ## Important Notes
//!
//! - Nothing in this module sees plaintext for ciphertext columns
//! - Signed URLs are returned to the caller and never stored here

pub mod http;
pub mod memory;
pub mod paths;
pub mod remote;
pub mod repository;

use chrono::{DateTime, Utc};

pub use http::HttpStore;
pub use memory::{InMemoryBlobStore, InMemoryTable};
pub use paths::{
    resolve_path, DEFAULT_SIGNED_URL_TTL_SECS, MAX_SIGNED_URL_TTL_SECS, PUBLIC_BUCKET,
    SECURE_BUCKET,
};
pub use remote::{RemoteError, RemoteResult, RemoteTable, Row};
pub use repository::{
    BlobRepository, ProfileField, ProfilePatch, ProfileRepository, SignedUrl, StoredProfile,
    TableProfileRepository, PROFILES_TABLE, PROFILE_KEY,
};

/// Instant `ttl_secs` after `now`, saturating at the largest representable time.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    i64::try_from(ttl_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
