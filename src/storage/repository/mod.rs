// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the remote store.
//!
//! Each repository exposes operations for one entity type. The untyped
//! JSON boundary stays inside the adapters.

pub mod blobs;
pub mod profiles;

pub use blobs::{BlobRepository, SignedUrl};
pub use profiles::{
    ProfileField, ProfilePatch, ProfileRepository, StoredProfile, TableProfileRepository,
    PROFILES_TABLE, PROFILE_KEY,
};
