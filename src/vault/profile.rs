// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Decrypted profile record and partial updates.

use serde::{Deserialize, Serialize};

use crate::error::{AccessKind, VaultError, VaultResult};
use crate::storage::ProfileField;

use super::gateway::SignedAccessGrant;

/// Longest accepted sensitive identifier.
pub const MAX_SENSITIVE_LEN: usize = 64;
pub const MAX_DISPLAY_NAME_LEN: usize = 120;
pub const MAX_QUICK_ACCESS_BLOCKS: usize = 12;
pub const THEMES: [&str; 3] = ["light", "dark", "system"];

const LANGUAGE_LEN: std::ops::RangeInclusive<usize> = 2..=35;
const REDACTED: &str = "<redacted>";

/// Avatar state attached to a loaded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvatarLink {
    /// No avatar reference stored.
    NoFile,
    /// Fresh grant issued during this load.
    Ready(SignedAccessGrant),
    /// Grant request failed. `None` when the store was unreachable.
    Failed(Option<AccessKind>),
    /// Cached copy; open again to get a grant.
    Unresolved,
}

/// Decrypted profile for one user.
///
/// Sensitive fields hold plaintext and only live in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub user_id: String,
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
    pub language: Option<String>,
    pub theme: Option<String>,
    pub quick_access: Vec<String>,
    pub fiscal_number: Option<String>,
    pub social_security_number: Option<String>,
    pub health_number: Option<String>,
    pub passport_number: Option<String>,
    pub avatar: AvatarLink,
    /// Sensitive fields that could not be decrypted on this load.
    pub degraded_fields: Vec<ProfileField>,
}

impl ProfileRecord {
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            avatar_ref: None,
            language: None,
            theme: None,
            quick_access: Vec::new(),
            fiscal_number: None,
            social_security_number: None,
            health_number: None,
            passport_number: None,
            avatar: AvatarLink::NoFile,
            degraded_fields: Vec::new(),
        }
    }

    fn slot(&self, field: ProfileField) -> Option<&Option<String>> {
        Some(match field {
            ProfileField::DisplayName => &self.display_name,
            ProfileField::AvatarRef => &self.avatar_ref,
            ProfileField::Language => &self.language,
            ProfileField::Theme => &self.theme,
            ProfileField::QuickAccess => return None,
            ProfileField::FiscalNumber => &self.fiscal_number,
            ProfileField::SocialSecurityNumber => &self.social_security_number,
            ProfileField::HealthNumber => &self.health_number,
            ProfileField::PassportNumber => &self.passport_number,
        })
    }

    /// Value of a text field. `None` for `QuickAccess`.
    pub fn text(&self, field: ProfileField) -> Option<&str> {
        self.slot(field).and_then(Option::as_deref)
    }

    /// Set a text field. Ignored for `QuickAccess`.
    pub fn set_text(&mut self, field: ProfileField, value: Option<String>) {
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
        *slot = value;
    }

    /// Display value of any field. Quick-access blocks render as a JSON array.
    pub fn field_value(&self, field: ProfileField) -> Option<String> {
        match field {
            ProfileField::QuickAccess if self.quick_access.is_empty() => None,
            ProfileField::QuickAccess => serde_json::to_string(&self.quick_access).ok(),
            other => self.text(other).map(str::to_string),
        }
    }

    pub fn is_degraded(&self, field: ProfileField) -> bool {
        self.degraded_fields.contains(&field)
    }

    /// Copy safe to keep in a cache: signed grants are dropped.
    pub fn without_grants(&self) -> Self {
        let mut record = self.clone();
        if matches!(record.avatar, AvatarLink::Ready(_)) {
            record.avatar = AvatarLink::Unresolved;
        }
        record
    }
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| REDACTED)
}

impl std::fmt::Debug for ProfileRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileRecord")
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("avatar_ref", &self.avatar_ref)
            .field("language", &self.language)
            .field("theme", &self.theme)
            .field("quick_access", &self.quick_access)
            .field("fiscal_number", &redact(&self.fiscal_number))
            .field("social_security_number", &redact(&self.social_security_number))
            .field("health_number", &redact(&self.health_number))
            .field("passport_number", &redact(&self.passport_number))
            .field("avatar", &self.avatar)
            .field("degraded_fields", &self.degraded_fields)
            .finish()
    }
}

/// Partial profile update.
///
/// `None` leaves a field untouched. An empty string clears it.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_access: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiscal_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_security_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passport_number: Option<String>,
}

impl ProfileUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a text field. Ignored for `QuickAccess`.
    pub fn with(mut self, field: ProfileField, value: impl Into<String>) -> Self {
        let slot = match field {
            ProfileField::DisplayName => &mut self.display_name,
            ProfileField::AvatarRef => &mut self.avatar_ref,
            ProfileField::Language => &mut self.language,
            ProfileField::Theme => &mut self.theme,
            ProfileField::QuickAccess => return self,
            ProfileField::FiscalNumber => &mut self.fiscal_number,
            ProfileField::SocialSecurityNumber => &mut self.social_security_number,
            ProfileField::HealthNumber => &mut self.health_number,
            ProfileField::PassportNumber => &mut self.passport_number,
        };
        *slot = Some(value.into());
        self
    }

    pub fn with_quick_access<I, S>(mut self, blocks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.quick_access = Some(blocks.into_iter().map(Into::into).collect());
        self
    }

    /// Text value carried for `field`, if any.
    pub fn text(&self, field: ProfileField) -> Option<&str> {
        match field {
            ProfileField::DisplayName => self.display_name.as_deref(),
            ProfileField::AvatarRef => self.avatar_ref.as_deref(),
            ProfileField::Language => self.language.as_deref(),
            ProfileField::Theme => self.theme.as_deref(),
            ProfileField::QuickAccess => None,
            ProfileField::FiscalNumber => self.fiscal_number.as_deref(),
            ProfileField::SocialSecurityNumber => self.social_security_number.as_deref(),
            ProfileField::HealthNumber => self.health_number.as_deref(),
            ProfileField::PassportNumber => self.passport_number.as_deref(),
        }
    }

    /// Fields this update touches, in column order.
    pub fn fields(&self) -> Vec<ProfileField> {
        ProfileField::ALL
            .into_iter()
            .filter(|field| match field {
                ProfileField::QuickAccess => self.quick_access.is_some(),
                other => self.text(*other).is_some(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Check every present field. Runs before anything reaches storage.
    ///
    /// # Errors
    /// `VaultError::Validation` naming the first offending field.
    pub fn validate(&self) -> VaultResult<()> {
        if self.is_empty() {
            return Err(VaultError::validation("update carries no fields"));
        }

        for field in ProfileField::SENSITIVE {
            let Some(value) = self.text(field) else {
                continue;
            };
            if value.chars().count() > MAX_SENSITIVE_LEN {
                return Err(VaultError::validation(format!(
                    "{field} is longer than {MAX_SENSITIVE_LEN} characters"
                )));
            }
            if value.chars().any(char::is_control) {
                return Err(VaultError::validation(format!(
                    "{field} contains control characters"
                )));
            }
        }

        if let Some(name) = &self.display_name {
            if name.chars().count() > MAX_DISPLAY_NAME_LEN {
                return Err(VaultError::validation(format!(
                    "display_name is longer than {MAX_DISPLAY_NAME_LEN} characters"
                )));
            }
        }

        if let Some(language) = self.language.as_deref().filter(|l| !l.is_empty()) {
            let shaped = LANGUAGE_LEN.contains(&language.len())
                && language
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-');
            if !shaped {
                return Err(VaultError::validation(format!(
                    "language {language:?} is not a language tag"
                )));
            }
        }

        if let Some(theme) = self.theme.as_deref().filter(|t| !t.is_empty()) {
            if !THEMES.contains(&theme) {
                return Err(VaultError::validation(format!(
                    "theme must be one of {}",
                    THEMES.join(", ")
                )));
            }
        }

        if let Some(reference) = &self.avatar_ref {
            if !reference.is_empty() && reference.trim().is_empty() {
                return Err(VaultError::validation("avatar_ref is blank"));
            }
        }

        if let Some(blocks) = &self.quick_access {
            if blocks.len() > MAX_QUICK_ACCESS_BLOCKS {
                return Err(VaultError::validation(format!(
                    "at most {MAX_QUICK_ACCESS_BLOCKS} quick-access blocks"
                )));
            }
            if blocks.iter().any(|b| b.trim().is_empty()) {
                return Err(VaultError::validation("quick-access block id is blank"));
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for ProfileUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileUpdate")
            .field("display_name", &self.display_name)
            .field("avatar_ref", &self.avatar_ref)
            .field("language", &self.language)
            .field("theme", &self.theme)
            .field("quick_access", &self.quick_access)
            .field("fiscal_number", &redact(&self.fiscal_number))
            .field("social_security_number", &redact(&self.social_security_number))
            .field("health_number", &redact(&self.health_number))
            .field("passport_number", &redact(&self.passport_number))
            .finish()
    }
}
