// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy surfaced by the vault.
//!
//! | Variant | Raised when | UI affordance |
//! |---------|-------------|---------------|
//! | `Validation` | Malformed input or no authenticated user | Fix input |
//! | `Crypto` | A single field fails to decrypt | Never reaches the UI from `load` |
//! | `Access` | Signed URL denied, object missing, grant expired | Retry |
//! | `Network` | Transport or store failure | Retry |
//! | `Config` | Startup configuration is invalid | None |

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::storage::RemoteError;

/// Why a private blob could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// The storage backend refused to authorize the path.
    Denied,
    /// A reference was stored but the object is gone.
    NotFound,
    /// The grant was issued but its window has closed.
    Expired,
}

impl std::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessKind::Denied => write!(f, "denied"),
            AccessKind::NotFound => write!(f, "not found"),
            AccessKind::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("access {kind} for {path}")]
    Access { kind: AccessKind, path: String },

    #[error("network failure: {0}")]
    Network(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn access(kind: AccessKind, path: impl Into<String>) -> Self {
        Self::Access {
            kind,
            path: path.into(),
        }
    }

    /// Whether the UI should offer a retry action for this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::Network(_) | VaultError::Access { .. })
    }

    /// Short message safe to show to the user.
    ///
    /// Never includes paths, values or backend details.
    pub fn user_message(&self) -> &'static str {
        match self {
            VaultError::Validation(_) => "Some of the information entered is not valid.",
            VaultError::Crypto(_) => "This field could not be read.",
            VaultError::Access {
                kind: AccessKind::NotFound,
                ..
            } => "The file could not be found.",
            VaultError::Access {
                kind: AccessKind::Expired,
                ..
            } => "The link has expired. Open the file again.",
            VaultError::Access { .. } => "You do not have access to this file right now.",
            VaultError::Network(_) => "Connection problem. Please try again.",
            VaultError::Config(_) => "The application is not configured correctly.",
        }
    }
}

impl From<RemoteError> for VaultError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Denied(path) => VaultError::access(AccessKind::Denied, path),
            RemoteError::NotFound(path) => VaultError::access(AccessKind::NotFound, path),
            RemoteError::Transport(msg) => VaultError::Network(msg),
            RemoteError::Status { code, message } => {
                VaultError::Network(format!("store returned {code}: {message}"))
            }
            RemoteError::Decode(msg) => VaultError::Network(format!("unexpected response: {msg}")),
        }
    }
}
