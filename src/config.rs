// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! by the vault. Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `VOY_STORE_URL` | Base URL of the remote store | Required |
//! | `VOY_STORE_API_KEY` | Public API key sent with every request | Required |
//! | `VOY_VAULT_SECRET` | Application secret for key derivation (>= 32 bytes) | Required |
//! | `VOY_PUBLIC_BUCKET` | Bucket with stable public URLs | `voy_documents` |
//! | `VOY_SECURE_BUCKET` | Restricted bucket (signed URLs only) | `voy_secure_docs` |
//! | `VOY_SIGNED_URL_TTL_SECS` | Signed URL lifetime | `3600` |
//! | `VOY_CACHE_CAPACITY` | Profiles kept in the session cache | `8` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::str::FromStr;

use url::Url;
use zeroize::Zeroizing;

use crate::crypto::keys::MIN_SECRET_LEN;
use crate::crypto::HmacKeyProvider;
use crate::error::{VaultError, VaultResult};
use crate::storage::{
    DEFAULT_SIGNED_URL_TTL_SECS, MAX_SIGNED_URL_TTL_SECS, PUBLIC_BUCKET, SECURE_BUCKET,
};

pub const STORE_URL_ENV: &str = "VOY_STORE_URL";
pub const STORE_API_KEY_ENV: &str = "VOY_STORE_API_KEY";

/// Environment variable name for the key-derivation secret.
///
/// Held in memory only; never logged and never sent to the store.
pub const VAULT_SECRET_ENV: &str = "VOY_VAULT_SECRET";

pub const PUBLIC_BUCKET_ENV: &str = "VOY_PUBLIC_BUCKET";
pub const SECURE_BUCKET_ENV: &str = "VOY_SECURE_BUCKET";
pub const SIGNED_URL_TTL_ENV: &str = "VOY_SIGNED_URL_TTL_SECS";
pub const CACHE_CAPACITY_ENV: &str = "VOY_CACHE_CAPACITY";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_CACHE_CAPACITY: usize = 8;

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "" => Ok(LogFormat::Pretty),
            other => Err(VaultError::Config(format!(
                "{LOG_FORMAT_ENV} must be json or pretty, got {other}"
            ))),
        }
    }
}

/// Vault configuration.
#[derive(Clone)]
pub struct VaultConfig {
    pub store_url: Url,
    pub api_key: String,
    pub vault_secret: Zeroizing<String>,
    pub public_bucket: String,
    pub secure_bucket: String,
    pub signed_url_ttl_secs: u64,
    pub cache_capacity: usize,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("store_url", &self.store_url.as_str())
            .field("api_key", &"<redacted>")
            .field("vault_secret", &"<redacted>")
            .field("public_bucket", &self.public_bucket)
            .field("secure_bucket", &self.secure_bucket)
            .field("signed_url_ttl_secs", &self.signed_url_ttl_secs)
            .field("cache_capacity", &self.cache_capacity)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl VaultConfig {
    /// Load from process environment variables.
    pub fn from_env() -> VaultResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names.
    ///
    /// # Errors
    /// `VaultError::Config` naming the first missing or invalid variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> VaultResult<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| {
            get(name).ok_or_else(|| VaultError::Config(format!("{name} is not set")))
        };

        let raw_url = required(STORE_URL_ENV)?;
        let store_url = Url::parse(raw_url.trim())
            .map_err(|e| VaultError::Config(format!("{STORE_URL_ENV}: {e}")))?;
        if !matches!(store_url.scheme(), "https" | "http") {
            return Err(VaultError::Config(format!(
                "{STORE_URL_ENV} must be an http(s) URL"
            )));
        }

        let api_key = required(STORE_API_KEY_ENV)?;

        let vault_secret = Zeroizing::new(required(VAULT_SECRET_ENV)?);
        if vault_secret.len() < MIN_SECRET_LEN {
            return Err(VaultError::Config(format!(
                "{VAULT_SECRET_ENV} must be at least {MIN_SECRET_LEN} bytes"
            )));
        }

        let signed_url_ttl_secs = match get(SIGNED_URL_TTL_ENV) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ttl| (1..=MAX_SIGNED_URL_TTL_SECS).contains(ttl))
                .ok_or_else(|| {
                    VaultError::Config(format!(
                        "{SIGNED_URL_TTL_ENV} must be between 1 and {MAX_SIGNED_URL_TTL_SECS}"
                    ))
                })?,
            None => DEFAULT_SIGNED_URL_TTL_SECS,
        };

        let cache_capacity = match get(CACHE_CAPACITY_ENV) {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| {
                    VaultError::Config(format!("{CACHE_CAPACITY_ENV} must be a positive integer"))
                })?,
            None => DEFAULT_CACHE_CAPACITY,
        };

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            store_url,
            api_key,
            vault_secret,
            public_bucket: get(PUBLIC_BUCKET_ENV).unwrap_or_else(|| PUBLIC_BUCKET.to_string()),
            secure_bucket: get(SECURE_BUCKET_ENV).unwrap_or_else(|| SECURE_BUCKET.to_string()),
            signed_url_ttl_secs,
            cache_capacity,
            log_format,
        })
    }

    /// Key provider derived from the configured secret.
    pub fn key_provider(&self) -> VaultResult<HmacKeyProvider> {
        HmacKeyProvider::new(self.vault_secret.as_bytes().to_vec())
            .map_err(|e| VaultError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            (STORE_URL_ENV, "https://project.example.co"),
            (STORE_API_KEY_ENV, "anon-key"),
            (VAULT_SECRET_ENV, "0123456789abcdef0123456789abcdef"),
        ]
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_missing() {
        let config = VaultConfig::from_lookup(env(&required())).unwrap();
        assert_eq!(config.public_bucket, "voy_documents");
        assert_eq!(config.secure_bucket, "voy_secure_docs");
        assert_eq!(config.signed_url_ttl_secs, 3600);
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn missing_required_var_is_named() {
        let err = VaultConfig::from_lookup(env(&required()[..2])).unwrap_err();
        assert!(matches!(err, VaultError::Config(ref m) if m.contains(VAULT_SECRET_ENV)));
    }

    #[test]
    fn short_secret_is_rejected() {
        let mut vars = required();
        vars[2] = (VAULT_SECRET_ENV, "short");
        assert!(matches!(
            VaultConfig::from_lookup(env(&vars)),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn ttl_must_be_in_range() {
        let mut vars = required();
        vars.push((SIGNED_URL_TTL_ENV, "0"));
        assert!(VaultConfig::from_lookup(env(&vars)).is_err());

        let mut vars = required();
        vars.push((SIGNED_URL_TTL_ENV, "900"));
        assert_eq!(
            VaultConfig::from_lookup(env(&vars)).unwrap().signed_url_ttl_secs,
            900
        );
    }

    #[test]
    fn log_format_parses() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn non_http_store_url_is_rejected() {
        let mut vars = required();
        vars[0] = (STORE_URL_ENV, "ftp://example.com");
        assert!(VaultConfig::from_lookup(env(&vars)).is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = VaultConfig::from_lookup(env(&required())).unwrap();
        let shown = format!("{config:?}");
        assert!(!shown.contains("anon-key"));
        assert!(!shown.contains("0123456789abcdef"));
    }

    #[test]
    fn key_provider_builds_from_secret() {
        let config = VaultConfig::from_lookup(env(&required())).unwrap();
        assert!(config.key_provider().is_ok());
    }
}
