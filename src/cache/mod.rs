// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Cache
//!
//! [`CacheSync`] wraps a [`ProfileVault`] and gives the UI a consistent,
//! session-scoped view of decrypted profiles.
//!
//! ## Per-user state
//!
//! ```text
//! Unloaded -> Loading -> Loaded <-> Saving -> Loaded'
//!                |                     |
//!                +-> Unloaded / prior  +-> prior Loaded (on failure)
//! ```
//!
//! ## Important Notes
//!
//! - The cache serves one user at a time: the first load binds the session
//!   when nobody signed in, and other users are rejected until sign-out
//! - Entries are only ever written with vault results
//! - Cached records never carry signed grants
//! - Sign-out clears everything synchronously; loads still in flight come
//!   back as [`CacheOutcome::Discarded`]
//! - The lock is never held across an `.await`

pub mod merge;

use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::crypto::KeyProvider;
use crate::error::{VaultError, VaultResult};
use crate::session::AuthenticatedUser;
use crate::storage::{BlobRepository, ProfileField, ProfileRepository};
use crate::vault::{DocumentLink, ProfileRecord, ProfileUpdate, ProfileVault};

pub use merge::{changed_fields, merge};

/// Result of a cache read.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Just loaded from the vault; may carry a fresh avatar grant.
    Fresh(ProfileRecord),
    /// Served from the cache, without grants.
    Cached(ProfileRecord),
    /// The load was cancelled or the session changed while it was pending.
    Discarded,
}

impl CacheOutcome {
    pub fn record(&self) -> Option<&ProfileRecord> {
        match self {
            CacheOutcome::Fresh(record) | CacheOutcome::Cached(record) => Some(record),
            CacheOutcome::Discarded => None,
        }
    }

    pub fn into_record(self) -> Option<ProfileRecord> {
        match self {
            CacheOutcome::Fresh(record) | CacheOutcome::Cached(record) => Some(record),
            CacheOutcome::Discarded => None,
        }
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, CacheOutcome::Discarded)
    }
}

/// What the UI should show for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldState {
    Unloaded,
    Loading,
    Loaded(Option<String>),
    /// Save in flight; carries the last confirmed value.
    Saving(Option<String>),
}

enum Phase {
    Loading { previous: Option<ProfileRecord> },
    Loaded(ProfileRecord),
    Saving { current: ProfileRecord },
}

struct DerivedQuery {
    deps: BTreeSet<ProfileField>,
    value: Option<Value>,
}

struct CacheState {
    entries: LruCache<String, Phase>,
    derived: HashMap<String, DerivedQuery>,
    generation: u64,
    session: Option<String>,
}

impl CacheState {
    /// Undo a load that produced nothing.
    fn abandon_load(&mut self, user_id: &str) {
        // A concurrent load may already have settled the entry.
        if !matches!(self.entries.peek(user_id), Some(Phase::Loading { .. })) {
            return;
        }
        if let Some(Phase::Loading {
            previous: Some(previous),
        }) = self.entries.pop(user_id)
        {
            self.entries
                .put(user_id.to_string(), Phase::Loaded(previous));
        }
    }

    fn invalidate(&mut self, changed: &BTreeSet<ProfileField>) -> Vec<String> {
        let mut invalidated = Vec::new();
        for (key, query) in &mut self.derived {
            if query.value.is_some() && !query.deps.is_disjoint(changed) {
                query.value = None;
                invalidated.push(key.clone());
            }
        }
        invalidated.sort();
        invalidated
    }

    /// Reject `user_id` while another user's session is active.
    fn check_session(&self, user_id: &str) -> VaultResult<()> {
        match self.session.as_deref() {
            Some(session) if session != user_id => Err(VaultError::validation(
                "another user's session is active",
            )),
            _ => Ok(()),
        }
    }

    fn owns(&self, user_id: &str) -> bool {
        self.session.as_deref() == Some(user_id)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.derived.clear();
        self.generation += 1;
        self.session = None;
    }
}

/// Session-scoped cache in front of a [`ProfileVault`].
pub struct CacheSync<P, B, K> {
    vault: ProfileVault<P, B, K>,
    state: Mutex<CacheState>,
}

impl<P, B, K> CacheSync<P, B, K>
where
    P: ProfileRepository,
    B: BlobRepository,
    K: KeyProvider,
{
    /// Create a cache holding at most `capacity` profiles.
    pub fn new(vault: ProfileVault<P, B, K>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            vault,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                derived: HashMap::new(),
                generation: 0,
                session: None,
            }),
        }
    }

    pub fn vault(&self) -> &ProfileVault<P, B, K> {
        &self.vault
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a session.
    ///
    /// Any other user's state is dropped first, including profiles loaded
    /// before anyone signed in, and pending loads come back discarded.
    pub fn sign_in(&self, user: &AuthenticatedUser) -> VaultResult<()> {
        let user_id = user.ensure_active()?;
        {
            let mut state = self.state();
            if state.owns(user_id) {
                return Ok(());
            }
            state.clear();
            state.session = Some(user_id.to_string());
        }
        self.vault.cipher().keys().forget_all();
        info!(user_id, "Session started");
        Ok(())
    }

    /// End the session: drop every entry, derived value and cached key.
    pub fn sign_out(&self) {
        let previous = {
            let mut state = self.state();
            let previous = state.session.take();
            state.clear();
            previous
        };
        self.vault.cipher().keys().forget_all();
        info!(user_id = previous.as_deref().unwrap_or_default(), "Session ended");
    }

    pub fn session_user(&self) -> Option<String> {
        self.state().session.clone()
    }

    /// Refresh `user`'s profile from the vault.
    ///
    /// Binds the session to `user` when nobody is signed in. The result is
    /// discarded, and the cache left as it was, when `cancel` fires or the
    /// session changes before the vault answers.
    ///
    /// # Errors
    /// - `Validation` without an active user, while another user's session
    ///   is active, or while a save is pending
    /// - `Network` from the vault; a prior `Loaded` entry is kept
    pub async fn load(
        &self,
        user: &AuthenticatedUser,
        cancel: &CancellationToken,
    ) -> VaultResult<CacheOutcome> {
        let user_id = user.ensure_active()?.to_string();

        let generation = {
            let mut state = self.state();
            state.check_session(&user_id)?;
            if state.session.is_none() {
                debug!(user_id = %user_id, "Binding session on first load");
                state.session = Some(user_id.clone());
            }
            let previous = match state.entries.pop(&user_id) {
                Some(Phase::Saving { current }) => {
                    state
                        .entries
                        .put(user_id.clone(), Phase::Saving { current });
                    return Err(VaultError::validation("a save is pending for this profile"));
                }
                Some(Phase::Loading { previous }) => previous,
                Some(Phase::Loaded(record)) => Some(record),
                None => None,
            };
            state
                .entries
                .put(user_id.clone(), Phase::Loading { previous });
            state.generation
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.vault.load(user) => Some(result),
        };

        let mut state = self.state();
        if state.generation != generation {
            debug!(user_id = %user_id, "Discarding load from an ended session");
            return Ok(CacheOutcome::Discarded);
        }

        match result {
            None => {
                state.abandon_load(&user_id);
                debug!(user_id = %user_id, "Load cancelled");
                Ok(CacheOutcome::Discarded)
            }
            Some(Err(e)) => {
                state.abandon_load(&user_id);
                Err(e)
            }
            Some(Ok(record)) => {
                state
                    .entries
                    .put(user_id, Phase::Loaded(record.without_grants()));
                Ok(CacheOutcome::Fresh(record))
            }
        }
    }

    /// Cached profile if loaded, otherwise a fresh load.
    pub async fn profile(
        &self,
        user: &AuthenticatedUser,
        cancel: &CancellationToken,
    ) -> VaultResult<CacheOutcome> {
        let user_id = user.ensure_active()?;
        let cached = {
            let mut state = self.state();
            state.check_session(user_id)?;
            match state.entries.get(user_id) {
                Some(Phase::Loaded(record)) => Some(record.clone()),
                _ => None,
            }
        };
        match cached {
            Some(record) => Ok(CacheOutcome::Cached(record)),
            None => self.load(user, cancel).await,
        }
    }

    /// Save through the vault and merge the update into the cached record.
    ///
    /// Requires a loaded profile. Only derived queries depending on a field
    /// whose value actually changed are invalidated.
    ///
    /// # Errors
    /// - `Validation` for an invalid update, an unloaded profile, another
    ///   user's active session, or while a load or another save is pending
    /// - `Network` from the vault; the previous `Loaded` entry is restored
    pub async fn save(
        &self,
        user: &AuthenticatedUser,
        update: &ProfileUpdate,
    ) -> VaultResult<ProfileRecord> {
        let user_id = user.ensure_active()?.to_string();
        update.validate()?;

        let (before, generation) = {
            let mut state = self.state();
            state.check_session(&user_id)?;
            let before = match state.entries.pop(&user_id) {
                Some(Phase::Loaded(record)) => record,
                Some(busy) => {
                    state.entries.put(user_id.clone(), busy);
                    return Err(VaultError::validation(
                        "a load or save is pending for this profile",
                    ));
                }
                None => return Err(VaultError::validation("profile is not loaded")),
            };
            state.entries.put(
                user_id.clone(),
                Phase::Saving {
                    current: before.clone(),
                },
            );
            (before, state.generation)
        };

        let result = self.vault.save(user, update).await;

        let mut state = self.state();
        let current_session = state.generation == generation;
        match result {
            Ok(()) => {
                let after = merge(&before, update);
                if current_session {
                    let changed = changed_fields(&before, &after);
                    let invalidated = state.invalidate(&changed);
                    state
                        .entries
                        .put(user_id.clone(), Phase::Loaded(after.clone()));
                    debug!(
                        user_id = %user_id,
                        changed = ?changed,
                        invalidated = ?invalidated,
                        "Merged saved profile"
                    );
                }
                Ok(after)
            }
            Err(e) => {
                if current_session {
                    state.entries.put(user_id, Phase::Loaded(before));
                }
                Err(e)
            }
        }
    }

    /// Current state of one field for `user_id`. Always `Unloaded` for
    /// anyone but the session user.
    pub fn field_state(&self, user_id: &str, field: ProfileField) -> FieldState {
        let state = self.state();
        if !state.owns(user_id) {
            return FieldState::Unloaded;
        }
        match state.entries.peek(user_id) {
            None => FieldState::Unloaded,
            Some(Phase::Loading { .. }) => FieldState::Loading,
            Some(Phase::Loaded(record)) => FieldState::Loaded(record.field_value(field)),
            Some(Phase::Saving { current }) => FieldState::Saving(current.field_value(field)),
        }
    }

    /// Last confirmed record for the session user, without touching recency.
    pub fn cached(&self, user_id: &str) -> Option<ProfileRecord> {
        let state = self.state();
        if !state.owns(user_id) {
            return None;
        }
        match state.entries.peek(user_id)? {
            Phase::Loaded(record) | Phase::Saving { current: record } => Some(record.clone()),
            Phase::Loading { previous } => previous.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Declare a derived query and the profile fields it reads.
    pub fn register_derived(
        &self,
        key: impl Into<String>,
        deps: impl IntoIterator<Item = ProfileField>,
    ) {
        self.state().derived.insert(
            key.into(),
            DerivedQuery {
                deps: deps.into_iter().collect(),
                value: None,
            },
        );
    }

    /// Store a computed value. Returns `false` for unregistered keys.
    pub fn put_derived(&self, key: &str, value: Value) -> bool {
        match self.state().derived.get_mut(key) {
            Some(query) => {
                query.value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Current value of a derived query, `None` when unset or invalidated.
    pub fn derived(&self, key: &str) -> Option<Value> {
        self.state()
            .derived
            .get(key)
            .and_then(|query| query.value.clone())
    }

    /// Issue a fresh grant for the cached avatar reference.
    ///
    /// Returns `Ok(None)` when `cancel` fires first. Nothing is cached
    /// either way.
    ///
    /// # Errors
    /// `Validation` when the profile is not loaded for the session user;
    /// otherwise as [`SecureBlobGateway::open`](crate::vault::SecureBlobGateway::open).
    pub async fn avatar(
        &self,
        user: &AuthenticatedUser,
        cancel: &CancellationToken,
    ) -> VaultResult<Option<DocumentLink>> {
        let user_id = user.ensure_active()?;
        let reference = self
            .cached(user_id)
            .ok_or_else(|| VaultError::validation("profile is not loaded"))?
            .avatar_ref;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(user_id, "Avatar request cancelled");
                Ok(None)
            }
            link = self.vault.gateway().open(reference.as_deref()) => link.map(Some),
        }
    }
}
