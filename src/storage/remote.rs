// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Untyped boundary to the remote table store.
//!
//! Rows cross this boundary as JSON objects. Everything above it goes
//! through a typed repository (see [`super::repository`]).

use std::future::Future;

use serde_json::{Map, Value};
use thiserror::Error;

/// A single table row as the store returns it.
pub type Row = Map<String, Value>;

/// Error type for remote store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Connection failed, timed out, or the store is unreachable
    #[error("transport error: {0}")]
    Transport(String),
    /// Non-success status that has no more specific meaning
    #[error("store returned status {code}: {message}")]
    Status { code: u16, message: String },
    /// Object does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// Store refused to authorize the request
    #[error("access denied: {0}")]
    Denied(String),
    /// Response did not have the expected shape
    #[error("decode error: {0}")]
    Decode(String),
}

/// Result type for remote store operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Key-value table store.
pub trait RemoteTable: Send + Sync {
    /// Fetch the row whose `key` column equals `value`.
    fn select_one(
        &self,
        table: &str,
        key: &str,
        value: &str,
    ) -> impl Future<Output = RemoteResult<Option<Row>>> + Send;

    /// Insert `row`, or merge it into the existing row with the same `key`.
    ///
    /// Columns absent from `row` are left untouched; explicit nulls clear.
    fn upsert(
        &self,
        table: &str,
        key: &str,
        row: Row,
    ) -> impl Future<Output = RemoteResult<()>> + Send;
}
