// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bucket constants and storage path utilities.

use percent_encoding::percent_decode_str;
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};

/// Bucket for ordinary uploads. Objects get stable public URLs.
pub const PUBLIC_BUCKET: &str = "voy_documents";

/// Restricted bucket for avatars and secure documents. Signed URLs only.
pub const SECURE_BUCKET: &str = "voy_secure_docs";

/// Default lifetime of a signed URL.
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 3600;

/// Upper bound accepted by the storage backend (7 days).
pub const MAX_SIGNED_URL_TTL_SECS: u64 = 604_800;

/// Resolve a stored file reference to a path relative to `bucket`.
///
/// Two reference forms coexist in stored records:
///
/// - full object URL: `https://host/storage/v1/object/public/<bucket>/u1/a%20b.pdf`
///   resolves to everything after the bucket segment, percent-decoded
///   (`u1/a b.pdf`)
/// - bare key: resolves to its last path segment
///
/// Query strings and fragments are ignored.
///
/// # Errors
/// `VaultError::Validation` if the reference is blank or resolves to an
/// empty path.
pub fn resolve_path(reference: &str, bucket: &str) -> VaultResult<String> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(VaultError::validation("empty file reference"));
    }

    let without_query = trimmed.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = without_query.split('/').collect();

    let path = match segments.iter().position(|s| *s == bucket) {
        Some(index) => {
            let rest = segments[index + 1..].join("/");
            percent_decode_str(&rest)
                .decode_utf8()
                .map_err(|_| VaultError::validation("file reference is not valid UTF-8"))?
                .into_owned()
        }
        None => segments.last().copied().unwrap_or_default().to_string(),
    };

    if path.is_empty() {
        return Err(VaultError::validation(format!(
            "file reference does not name an object in {bucket}"
        )));
    }
    Ok(path)
}

/// File extension for an accepted avatar content type.
pub fn avatar_extension(content_type: &str) -> Option<&'static str> {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// Object key for a new avatar upload: `<user_id>/avatar-<uuid>.<ext>`.
pub fn avatar_object_path(user_id: &str, extension: &str) -> String {
    format!("{user_id}/avatar-{}.{extension}", Uuid::new_v4())
}
