// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Personal Data Vault
//!
//! [`ProfileVault`] decides which profile fields are sensitive, seals them
//! with [`FieldCipher`](crate::crypto::FieldCipher) on the write path and
//! opens them on the read path. [`SecureBlobGateway`] turns stored file
//! references into short-lived signed URLs.

pub mod gateway;
pub mod profile;
pub mod profile_vault;

pub use gateway::{DocumentLink, SecureBlobGateway, SignedAccessGrant, MAX_AVATAR_BYTES};
pub use profile::{AvatarLink, ProfileRecord, ProfileUpdate};
pub use profile_vault::ProfileVault;
