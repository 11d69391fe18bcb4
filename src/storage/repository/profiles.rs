// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Profile repository for the remote `profiles` table.
//!
//! ## Columns
//!
//! ```text
//! id                       # user id, primary key
//! display_name             # plaintext
//! avatar_ref               # plaintext, object URL or bare key
//! language, theme          # plaintext
//! quick_access             # JSON array of block ids
//! fiscal_number            # ciphertext
//! social_security_number   # ciphertext
//! health_number            # ciphertext
//! passport_number          # ciphertext
//! updated_at
//! ```
//!
//! This layer never sees plaintext for the four ciphertext columns; the
//! vault seals them before building a [`ProfilePatch`].

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::super::{RemoteError, RemoteResult, RemoteTable};

pub const PROFILES_TABLE: &str = "profiles";
pub const PROFILE_KEY: &str = "id";

/// A column of the profile record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    DisplayName,
    AvatarRef,
    Language,
    Theme,
    QuickAccess,
    FiscalNumber,
    SocialSecurityNumber,
    HealthNumber,
    PassportNumber,
}

impl ProfileField {
    pub const ALL: [ProfileField; 9] = [
        ProfileField::DisplayName,
        ProfileField::AvatarRef,
        ProfileField::Language,
        ProfileField::Theme,
        ProfileField::QuickAccess,
        ProfileField::FiscalNumber,
        ProfileField::SocialSecurityNumber,
        ProfileField::HealthNumber,
        ProfileField::PassportNumber,
    ];

    /// Fields stored as ciphertext.
    pub const SENSITIVE: [ProfileField; 4] = [
        ProfileField::FiscalNumber,
        ProfileField::SocialSecurityNumber,
        ProfileField::HealthNumber,
        ProfileField::PassportNumber,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            ProfileField::DisplayName => "display_name",
            ProfileField::AvatarRef => "avatar_ref",
            ProfileField::Language => "language",
            ProfileField::Theme => "theme",
            ProfileField::QuickAccess => "quick_access",
            ProfileField::FiscalNumber => "fiscal_number",
            ProfileField::SocialSecurityNumber => "social_security_number",
            ProfileField::HealthNumber => "health_number",
            ProfileField::PassportNumber => "passport_number",
        }
    }

    pub fn is_sensitive(&self) -> bool {
        Self::SENSITIVE.contains(self)
    }
}

impl std::fmt::Display for ProfileField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// Profile row exactly as stored (ciphertext columns still sealed).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub quick_access: Option<Vec<String>>,
    #[serde(default)]
    pub fiscal_number: Option<String>,
    #[serde(default)]
    pub social_security_number: Option<String>,
    #[serde(default)]
    pub health_number: Option<String>,
    #[serde(default)]
    pub passport_number: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredProfile {
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            id: user_id.into(),
            ..Self::default()
        }
    }

    /// Raw text value of a text column. `QuickAccess` is not a text column.
    pub fn column(&self, field: ProfileField) -> Option<&str> {
        let slot = match field {
            ProfileField::DisplayName => &self.display_name,
            ProfileField::AvatarRef => &self.avatar_ref,
            ProfileField::Language => &self.language,
            ProfileField::Theme => &self.theme,
            ProfileField::QuickAccess => return None,
            ProfileField::FiscalNumber => &self.fiscal_number,
            ProfileField::SocialSecurityNumber => &self.social_security_number,
            ProfileField::HealthNumber => &self.health_number,
            ProfileField::PassportNumber => &self.passport_number,
        };
        slot.as_deref()
    }
}

/// Partial upsert for one profile row.
///
/// `None` leaves a column untouched; `Some(None)` writes null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfilePatch {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quick_access: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiscal_number: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_security_number: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_number: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport_number: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfilePatch {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            id: user_id.into(),
            ..Self::default()
        }
    }

    /// Set a text column. Ignored for `QuickAccess`.
    pub fn set(&mut self, field: ProfileField, value: Option<String>) {
        let slot = match field {
            ProfileField::DisplayName => &mut self.display_name,
            ProfileField::AvatarRef => &mut self.avatar_ref,
            ProfileField::Language => &mut self.language,
            ProfileField::Theme => &mut self.theme,
            ProfileField::QuickAccess => return,
            ProfileField::FiscalNumber => &mut self.fiscal_number,
            ProfileField::SocialSecurityNumber => &mut self.social_security_number,
            ProfileField::HealthNumber => &mut self.health_number,
            ProfileField::PassportNumber => &mut self.passport_number,
        };
        *slot = Some(value);
    }
}

/// Typed access to profile rows.
pub trait ProfileRepository: Send + Sync {
    fn fetch(
        &self,
        user_id: &str,
    ) -> impl Future<Output = RemoteResult<Option<StoredProfile>>> + Send;

    /// Insert-or-merge keyed by user id.
    fn upsert(&self, patch: &ProfilePatch) -> impl Future<Output = RemoteResult<()>> + Send;
}

/// [`ProfileRepository`] over any [`RemoteTable`].
#[derive(Debug, Clone)]
pub struct TableProfileRepository<T> {
    table: T,
}

impl<T> TableProfileRepository<T> {
    pub fn new(table: T) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &T {
        &self.table
    }
}

impl<T: RemoteTable> ProfileRepository for TableProfileRepository<T> {
    async fn fetch(&self, user_id: &str) -> RemoteResult<Option<StoredProfile>> {
        let row = self
            .table
            .select_one(PROFILES_TABLE, PROFILE_KEY, user_id)
            .await?;

        row.map(|row| {
            serde_json::from_value(Value::Object(row))
                .map_err(|e| RemoteError::Decode(format!("profile row: {e}")))
        })
        .transpose()
    }

    async fn upsert(&self, patch: &ProfilePatch) -> RemoteResult<()> {
        let row = match serde_json::to_value(patch) {
            Ok(Value::Object(row)) => row,
            Ok(_) => return Err(RemoteError::Decode("profile patch is not an object".to_string())),
            Err(e) => return Err(RemoteError::Decode(e.to_string())),
        };
        self.table.upsert(PROFILES_TABLE, PROFILE_KEY, row).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryTable;
    use serde_json::json;

    #[test]
    fn sensitive_fields_are_the_four_id_numbers() {
        let sensitive: Vec<_> = ProfileField::ALL
            .iter()
            .filter(|f| f.is_sensitive())
            .map(|f| f.column())
            .collect();
        assert_eq!(
            sensitive,
            [
                "fiscal_number",
                "social_security_number",
                "health_number",
                "passport_number"
            ]
        );
    }

    #[test]
    fn patch_serializes_only_present_columns() {
        let mut patch = ProfilePatch::new("user-1");
        patch.set(ProfileField::DisplayName, Some("Ana".to_string()));
        patch.set(ProfileField::PassportNumber, None);
        patch.set(ProfileField::QuickAccess, Some("ignored".to_string()));

        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            value,
            json!({"id": "user-1", "display_name": "Ana", "passport_number": null})
        );
    }

    #[tokio::test]
    async fn upsert_then_fetch_merges_rows() {
        let table = InMemoryTable::new();
        let repo = TableProfileRepository::new(table.clone());

        let mut first = ProfilePatch::new("user-1");
        first.set(ProfileField::DisplayName, Some("Ana".to_string()));
        first.set(ProfileField::Language, Some("es".to_string()));
        repo.upsert(&first).await.unwrap();

        let mut second = ProfilePatch::new("user-1");
        second.set(ProfileField::Language, Some("pt-BR".to_string()));
        second.quick_access = Some(vec!["documents".to_string()]);
        repo.upsert(&second).await.unwrap();

        let stored = repo.fetch("user-1").await.unwrap().unwrap();
        assert_eq!(stored.display_name.as_deref(), Some("Ana"));
        assert_eq!(stored.language.as_deref(), Some("pt-BR"));
        assert_eq!(stored.quick_access, Some(vec!["documents".to_string()]));
        assert_eq!(table.row_count(PROFILES_TABLE), 1);
    }

    #[tokio::test]
    async fn fetch_missing_row_is_none() {
        let repo = TableProfileRepository::new(InMemoryTable::new());
        assert_eq!(repo.fetch("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unexpected_column_types_are_decode_errors() {
        let table = InMemoryTable::new();
        let mut row = serde_json::Map::new();
        row.insert("id".to_string(), json!("user-1"));
        row.insert("display_name".to_string(), json!(42));
        table.insert_raw(PROFILES_TABLE, PROFILE_KEY, row);

        let repo = TableProfileRepository::new(table);
        assert!(matches!(
            repo.fetch("user-1").await,
            Err(RemoteError::Decode(_))
        ));
    }

    #[test]
    fn stored_column_reads_text_fields() {
        let stored = StoredProfile {
            fiscal_number: Some("v1:x:y".to_string()),
            quick_access: Some(vec!["a".to_string()]),
            ..StoredProfile::empty("user-1")
        };
        assert_eq!(stored.column(ProfileField::FiscalNumber), Some("v1:x:y"));
        assert_eq!(stored.column(ProfileField::QuickAccess), None);
        assert_eq!(stored.column(ProfileField::Theme), None);
    }
}
