// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process store adapters.
//!
//! Used by tests and offline development. Both adapters are cheap to clone
//! and clones share state, so a test can keep a handle to inspect raw rows
//! while the vault owns another.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::repository::{BlobRepository, SignedUrl};
use super::{expiry_after, RemoteError, RemoteResult, RemoteTable, Row};

const DEFAULT_BASE_URL: &str = "https://store.invalid";

#[derive(Default)]
struct TableState {
    tables: HashMap<String, HashMap<String, Row>>,
    offline: bool,
    failing_writes: usize,
    latency: Option<Duration>,
    writes: usize,
}

/// In-memory [`RemoteTable`].
#[derive(Clone, Default)]
pub struct InMemoryTable {
    inner: Arc<Mutex<TableState>>,
}

impl InMemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TableState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every call fail with a transport error until turned off.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Fail the next `count` writes with a transport error.
    pub fn fail_next_writes(&self, count: usize) {
        self.state().failing_writes = count;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    /// Raw stored row, exactly as written.
    pub fn raw_row(&self, table: &str, key_value: &str) -> Option<Row> {
        self.state()
            .tables
            .get(table)
            .and_then(|rows| rows.get(key_value))
            .cloned()
    }

    /// Seed a row without going through `upsert` (e.g. legacy data).
    pub fn insert_raw(&self, table: &str, key: &str, row: Row) {
        let Some(key_value) = row.get(key).and_then(Value::as_str).map(str::to_string) else {
            return;
        };
        self.state()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(key_value, row);
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state().tables.get(table).map_or(0, HashMap::len)
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    async fn delay(&self) {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl RemoteTable for InMemoryTable {
    async fn select_one(&self, table: &str, _key: &str, value: &str) -> RemoteResult<Option<Row>> {
        self.delay().await;
        let state = self.state();
        if state.offline {
            return Err(RemoteError::Transport("store unreachable".to_string()));
        }
        Ok(state
            .tables
            .get(table)
            .and_then(|rows| rows.get(value))
            .cloned())
    }

    async fn upsert(&self, table: &str, key: &str, row: Row) -> RemoteResult<()> {
        self.delay().await;
        let mut state = self.state();
        if state.offline {
            return Err(RemoteError::Transport("store unreachable".to_string()));
        }
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(RemoteError::Transport("connection reset".to_string()));
        }

        let key_value = row
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Decode(format!("row is missing key column {key}")))?;

        let rows = state.tables.entry(table.to_string()).or_default();
        match rows.get_mut(&key_value) {
            Some(existing) => existing.extend(row),
            None => {
                rows.insert(key_value, row);
            }
        }
        state.writes += 1;
        Ok(())
    }
}

struct StoredBlob {
    bytes: Vec<u8>,
    content_type: String,
}

struct IssuedGrant {
    bucket: String,
    path: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct BlobState {
    objects: HashMap<(String, String), StoredBlob>,
    grants: HashMap<String, IssuedGrant>,
    denied_buckets: HashSet<String>,
    offline: bool,
    signed_requests: usize,
}

/// In-memory [`BlobRepository`] with bucket-scoped access control.
#[derive(Clone)]
pub struct InMemoryBlobStore {
    inner: Arc<Mutex<BlobState>>,
    base_url: String,
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl InMemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BlobState::default())),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn state(&self) -> MutexGuard<'_, BlobState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object.
    pub fn put(&self, bucket: &str, path: &str, bytes: impl Into<Vec<u8>>, content_type: &str) {
        self.state().objects.insert(
            (bucket.to_string(), path.to_string()),
            StoredBlob {
                bytes: bytes.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn contains(&self, bucket: &str, path: &str) -> bool {
        self.state()
            .objects
            .contains_key(&(bucket.to_string(), path.to_string()))
    }

    pub fn content_type(&self, bucket: &str, path: &str) -> Option<String> {
        self.state()
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .map(|blob| blob.content_type.clone())
    }

    /// Refuse signed URLs for every object in `bucket`.
    pub fn deny_bucket(&self, bucket: &str) {
        self.state().denied_buckets.insert(bucket.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Number of signed URL requests received.
    pub fn signed_requests(&self) -> usize {
        self.state().signed_requests
    }

    /// Grants issued and not yet pruned. Expired ones are dropped on the
    /// next issuance.
    pub fn live_grants(&self) -> usize {
        self.state().grants.len()
    }

    /// Dereference a signed URL at instant `at`, as the backend would.
    ///
    /// # Errors
    /// `RemoteError::Denied` for unknown or expired grants,
    /// `RemoteError::NotFound` if the object was removed meanwhile.
    pub fn fetch_signed(&self, url: &str, at: DateTime<Utc>) -> RemoteResult<Vec<u8>> {
        let token = url
            .split_once("token=")
            .map(|(_, token)| token.split('&').next().unwrap_or_default())
            .ok_or_else(|| RemoteError::Denied("missing token".to_string()))?;

        let state = self.state();
        let grant = state
            .grants
            .get(token)
            .ok_or_else(|| RemoteError::Denied("unknown token".to_string()))?;
        if at >= grant.expires_at {
            return Err(RemoteError::Denied(format!("{} (expired)", grant.path)));
        }
        state
            .objects
            .get(&(grant.bucket.clone(), grant.path.clone()))
            .map(|blob| blob.bytes.clone())
            .ok_or_else(|| RemoteError::NotFound(grant.path.clone()))
    }
}

impl BlobRepository for InMemoryBlobStore {
    async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl_secs: u64,
    ) -> RemoteResult<SignedUrl> {
        let mut state = self.state();
        state.signed_requests += 1;
        if state.offline {
            return Err(RemoteError::Transport("storage unreachable".to_string()));
        }
        if state.denied_buckets.contains(bucket) {
            return Err(RemoteError::Denied(path.to_string()));
        }
        if !state
            .objects
            .contains_key(&(bucket.to_string(), path.to_string()))
        {
            return Err(RemoteError::NotFound(path.to_string()));
        }

        let now = Utc::now();
        state.grants.retain(|_, grant| grant.expires_at > now);
        let expires_at = expiry_after(now, ttl_secs);
        let token = Uuid::new_v4().simple().to_string();
        state.grants.insert(
            token.clone(),
            IssuedGrant {
                bucket: bucket.to_string(),
                path: path.to_string(),
                expires_at,
            },
        );

        Ok(SignedUrl {
            url: format!(
                "{}/storage/v1/object/sign/{bucket}/{path}?token={token}",
                self.base_url
            ),
            expires_at,
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> RemoteResult<()> {
        if self.state().offline {
            return Err(RemoteError::Transport("storage unreachable".to_string()));
        }
        self.put(bucket, path, bytes, content_type);
        Ok(())
    }
}
