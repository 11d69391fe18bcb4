// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated user representation.
//!
//! Authentication itself happens elsewhere; the session layer hands the
//! vault an [`AuthenticatedUser`] and the vault only checks that it is
//! usable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Authenticated user as supplied by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Canonical user ID (stable across sessions)
    pub user_id: String,

    /// Session ID (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Token expiration (Unix timestamp, 0 when unknown)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
            expires_at: 0,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: i64) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Check the user can act now and return the user id.
    pub fn ensure_active(&self) -> VaultResult<&str> {
        self.ensure_active_at(Utc::now())
    }

    /// Check the user can act at `now` and return the user id.
    ///
    /// # Errors
    /// `VaultError::Validation` if the id is blank or the session expired.
    pub fn ensure_active_at(&self, now: DateTime<Utc>) -> VaultResult<&str> {
        if self.user_id.trim().is_empty() {
            return Err(VaultError::validation("no authenticated user"));
        }
        if self.expires_at > 0 && now.timestamp() >= self.expires_at {
            return Err(VaultError::validation("session has expired"));
        }
        Ok(&self.user_id)
    }
}
