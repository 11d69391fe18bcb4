// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Field Encryption
//!
//! Sensitive profile fields are encrypted on the device before they are
//! sent to the remote store.
//!
//! ## Security Model
//!
//! - AES-256-GCM with a fresh random 96-bit nonce per value
//! - The version tag is bound as associated data
//! - Keys are derived per user with HMAC-SHA256 over an application secret
//! - Key material lives in memory for the session only and is zeroized on drop
//!
//! ## Wire Format
//!
//! ```text
//! v1:<base64url nonce>:<base64url ciphertext+tag>
//! ```
//!
//! Values that do not carry this shape are legacy plaintext and are
//! returned unchanged by [`decrypt_value`].

pub mod cipher;
pub mod keys;

pub use cipher::{
    decrypt_value, encrypt_field, is_encrypted, CryptoError, EncryptedField, FieldCipher,
    CURRENT_VERSION, NONCE_LEN,
};
pub use keys::{HmacKeyProvider, KeyMaterial, KeyProvider, StaticKeyProvider, KEY_LEN};
