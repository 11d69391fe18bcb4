// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pure reducers applied after a successful save.

use std::collections::BTreeSet;

use crate::storage::ProfileField;
use crate::vault::{AvatarLink, ProfileRecord, ProfileUpdate};

/// Apply a saved update to a cached record.
///
/// Mirrors what the store now holds: empty strings clear, untouched fields
/// keep their value. A replaced avatar reference loses its link state until
/// it is opened again.
pub fn merge(record: &ProfileRecord, update: &ProfileUpdate) -> ProfileRecord {
    let mut next = record.clone();

    for field in update.fields() {
        if field == ProfileField::QuickAccess {
            next.quick_access = update.quick_access.clone().unwrap_or_default();
            continue;
        }
        let value = update
            .text(field)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        next.set_text(field, value);
        // Rewritten from plaintext, so readable again.
        next.degraded_fields.retain(|f| *f != field);
    }

    if next.avatar_ref != record.avatar_ref {
        next.avatar = match next.avatar_ref {
            Some(_) => AvatarLink::Unresolved,
            None => AvatarLink::NoFile,
        };
    }
    next
}

/// Fields whose visible value differs between two records.
pub fn changed_fields(before: &ProfileRecord, after: &ProfileRecord) -> BTreeSet<ProfileField> {
    ProfileField::ALL
        .into_iter()
        .filter(|field| before.field_value(*field) != after.field_value(*field))
        .collect()
}
