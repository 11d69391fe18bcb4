// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end flows over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use voy_vault::storage::{PROFILES_TABLE, PROFILE_KEY, SECURE_BUCKET};
use voy_vault::{
    AccessKind, AuthenticatedUser, AvatarLink, CacheOutcome, CacheSync, DocumentLink,
    FieldCipher, FieldState, HmacKeyProvider, InMemoryBlobStore, InMemoryTable, ProfileField,
    ProfileUpdate, ProfileVault, SecureBlobGateway, TableProfileRepository, VaultError,
};

const SECRET: &[u8] = b"integration-secret-0123456789abcdef";

type Repo = TableProfileRepository<InMemoryTable>;
type Vault = ProfileVault<Repo, InMemoryBlobStore, HmacKeyProvider>;
type Cache = CacheSync<Repo, InMemoryBlobStore, HmacKeyProvider>;

struct Store {
    table: InMemoryTable,
    blobs: InMemoryBlobStore,
}

impl Store {
    fn new() -> Self {
        Self {
            table: InMemoryTable::new(),
            blobs: InMemoryBlobStore::new("https://project.example.co"),
        }
    }

    /// A fresh session over the same remote data, as after an app restart.
    fn session(&self) -> Vault {
        ProfileVault::new(
            TableProfileRepository::new(self.table.clone()),
            SecureBlobGateway::new(self.blobs.clone()),
            FieldCipher::new(Arc::new(HmacKeyProvider::new(SECRET.to_vec()).unwrap())),
        )
    }

    fn raw(&self, user_id: &str, column: &str) -> Value {
        self.table
            .raw_row(PROFILES_TABLE, user_id)
            .and_then(|row| row.get(column).cloned())
            .unwrap_or(Value::Null)
    }
}

#[tokio::test]
async fn sensitive_fields_survive_a_new_session_and_stay_sealed_at_rest() {
    let store = Store::new();
    let user = AuthenticatedUser::new("u123").with_session("s1");

    let update = ProfileUpdate::new()
        .with(ProfileField::FiscalNumber, "12345678Z")
        .with(ProfileField::SocialSecurityNumber, "281234567890")
        .with(ProfileField::HealthNumber, "ANDA123456")
        .with(ProfileField::PassportNumber, "PAA123456")
        .with(ProfileField::DisplayName, "Lucía");
    store.session().save(&user, &update).await.unwrap();

    for field in ProfileField::SENSITIVE {
        let raw = store.raw("u123", field.column());
        let raw = raw.as_str().unwrap();
        assert!(raw.starts_with("v1:"), "{field} not sealed");
        assert_ne!(Some(raw), update.text(field));
    }
    assert_eq!(store.raw("u123", "display_name"), json!("Lucía"));

    let record = store.session().load(&user).await.unwrap();
    for field in ProfileField::SENSITIVE {
        assert_eq!(record.text(field), update.text(field));
    }
    assert!(record.degraded_fields.is_empty());
}

#[tokio::test]
async fn same_value_saved_twice_is_sealed_differently() {
    let store = Store::new();
    let vault = store.session();
    let user = AuthenticatedUser::new("u123");
    let update = ProfileUpdate::new().with(ProfileField::PassportNumber, "PAA123456");

    vault.save(&user, &update).await.unwrap();
    let first = store.raw("u123", "passport_number");
    vault.save(&user, &update).await.unwrap();
    let second = store.raw("u123", "passport_number");

    assert_ne!(first, second);
    assert_eq!(store.table.row_count(PROFILES_TABLE), 1);
}

#[tokio::test]
async fn one_corrupt_column_does_not_block_the_profile() {
    let store = Store::new();
    let user = AuthenticatedUser::new("u123");
    store
        .session()
        .save(
            &user,
            &ProfileUpdate::new()
                .with(ProfileField::FiscalNumber, "12345678Z")
                .with(ProfileField::PassportNumber, "PAA123456")
                .with(ProfileField::Language, "es"),
        )
        .await
        .unwrap();

    let mut row = store.table.raw_row(PROFILES_TABLE, "u123").unwrap();
    row.insert("fiscal_number".to_string(), json!("v1:!!!:???"));
    row.insert("health_number".to_string(), json!("v9:AAAA:BBBB"));
    store.table.insert_raw(PROFILES_TABLE, PROFILE_KEY, row);

    let record = store.session().load(&user).await.unwrap();
    assert_eq!(record.fiscal_number.as_deref(), Some(""));
    assert_eq!(record.health_number.as_deref(), Some(""));
    assert_eq!(record.passport_number.as_deref(), Some("PAA123456"));
    assert_eq!(record.language.as_deref(), Some("es"));
    assert_eq!(
        record.degraded_fields,
        [ProfileField::FiscalNumber, ProfileField::HealthNumber]
    );
}

#[tokio::test]
async fn another_users_key_cannot_open_a_copied_column() {
    let store = Store::new();
    let vault = store.session();
    let owner = AuthenticatedUser::new("u1");
    let other = AuthenticatedUser::new("u2");
    vault
        .save(
            &owner,
            &ProfileUpdate::new().with(ProfileField::FiscalNumber, "12345678Z"),
        )
        .await
        .unwrap();
    vault
        .save(&other, &ProfileUpdate::new().with(ProfileField::Theme, "dark"))
        .await
        .unwrap();

    let sealed = store.raw("u1", "fiscal_number");
    let mut row = store.table.raw_row(PROFILES_TABLE, "u2").unwrap();
    row.insert("fiscal_number".to_string(), sealed);
    store.table.insert_raw(PROFILES_TABLE, PROFILE_KEY, row);

    let record = vault.load(&other).await.unwrap();
    assert_eq!(record.fiscal_number.as_deref(), Some(""));
    assert!(record.is_degraded(ProfileField::FiscalNumber));
}

#[tokio::test]
async fn legacy_rows_read_as_plaintext_until_migrated() {
    let store = Store::new();
    let user = AuthenticatedUser::new("u123");
    let mut row = serde_json::Map::new();
    row.insert("id".to_string(), json!("u123"));
    row.insert("social_security_number".to_string(), json!("123456789"));
    row.insert("passport_number".to_string(), json!(""));
    store.table.insert_raw(PROFILES_TABLE, PROFILE_KEY, row);

    let vault = store.session();
    let record = vault.load(&user).await.unwrap();
    assert_eq!(record.social_security_number.as_deref(), Some("123456789"));

    assert_eq!(
        vault.migrate_legacy(&user).await.unwrap(),
        [ProfileField::SocialSecurityNumber]
    );
    assert_ne!(store.raw("u123", "social_security_number"), json!("123456789"));
    assert_eq!(store.raw("u123", "passport_number"), json!(""));

    let reloaded = store.session().load(&user).await.unwrap();
    assert_eq!(reloaded.social_security_number.as_deref(), Some("123456789"));
}

#[tokio::test]
async fn signed_grant_expires_after_its_window() {
    let store = Store::new();
    store
        .blobs
        .put(SECURE_BUCKET, "u123/doc.pdf", b"%PDF".to_vec(), "application/pdf");
    let gateway = SecureBlobGateway::new(store.blobs.clone());

    let grant = gateway.issue_signed_url("u123/doc.pdf", None).await.unwrap();
    let early = grant.issued_at + ChronoDuration::seconds(3500);
    let late = grant.issued_at + ChronoDuration::seconds(3700);

    assert!(grant.is_usable_at(early));
    assert_eq!(store.blobs.fetch_signed(&grant.url, early).unwrap(), b"%PDF");

    assert!(!grant.is_usable_at(late));
    assert!(store.blobs.fetch_signed(&grant.url, late).is_err());
    let err = grant.ensure_usable_at(late).unwrap_err();
    assert!(matches!(
        err,
        VaultError::Access {
            kind: AccessKind::Expired,
            ..
        }
    ));
    assert!(err.is_retryable());

    let DocumentLink::Signed(renewed) = gateway.open(Some("u123/doc.pdf")).await.unwrap() else {
        panic!("expected a signed link");
    };
    assert_ne!(renewed.url, grant.url);
}

#[tokio::test]
async fn uploaded_avatar_is_served_through_a_signed_grant() {
    let store = Store::new();
    let vault = store.session();
    let user = AuthenticatedUser::new("u123");

    let reference = vault
        .gateway()
        .upload_avatar(&user, vec![0xFF, 0xD8, 0xFF], "image/jpeg")
        .await
        .unwrap();
    vault
        .save(
            &user,
            &ProfileUpdate::new().with(ProfileField::AvatarRef, reference.clone()),
        )
        .await
        .unwrap();
    assert_eq!(store.raw("u123", "avatar_ref"), json!(reference));

    let record = vault.load(&user).await.unwrap();
    let AvatarLink::Ready(grant) = &record.avatar else {
        panic!("expected a ready avatar, got {:?}", record.avatar);
    };
    assert!(grant.path.starts_with("u123/avatar-"));
    assert_eq!(
        store
            .blobs
            .fetch_signed(&grant.url, grant.issued_at)
            .unwrap(),
        [0xFF, 0xD8, 0xFF]
    );
}

#[tokio::test]
async fn denied_avatar_bucket_degrades_to_failed_link() {
    let store = Store::new();
    let user = AuthenticatedUser::new("u123");
    store
        .blobs
        .put(SECURE_BUCKET, "u123/a.png", b"png".to_vec(), "image/png");
    store.blobs.deny_bucket(SECURE_BUCKET);

    let vault = store.session();
    vault
        .save(
            &user,
            &ProfileUpdate::new()
                .with(ProfileField::AvatarRef, "voy_secure_docs/u123/a.png")
                .with(ProfileField::DisplayName, "Lucía"),
        )
        .await
        .unwrap();

    let record = vault.load(&user).await.unwrap();
    assert_eq!(record.avatar, AvatarLink::Failed(Some(AccessKind::Denied)));
    assert_eq!(record.display_name.as_deref(), Some("Lucía"));
}

fn cache(store: &Store) -> Cache {
    CacheSync::new(store.session(), 8)
}

#[tokio::test]
async fn cache_never_retains_avatar_grants() {
    let store = Store::new();
    store
        .blobs
        .put(SECURE_BUCKET, "u123/a.png", b"png".to_vec(), "image/png");
    let cache = cache(&store);
    let user = AuthenticatedUser::new("u123");
    cache.sign_in(&user).unwrap();
    let token = CancellationToken::new();

    let _ = cache.load(&user, &token).await.unwrap();
    cache
        .save(
            &user,
            &ProfileUpdate::new().with(ProfileField::AvatarRef, "voy_secure_docs/u123/a.png"),
        )
        .await
        .unwrap();

    let CacheOutcome::Fresh(fresh) = cache.load(&user, &token).await.unwrap() else {
        panic!("expected a fresh load");
    };
    assert!(matches!(fresh.avatar, AvatarLink::Ready(_)));
    assert_eq!(cache.cached("u123").unwrap().avatar, AvatarLink::Unresolved);

    let CacheOutcome::Cached(cached) = cache.profile(&user, &token).await.unwrap() else {
        panic!("expected the cached copy");
    };
    assert_eq!(cached.avatar, AvatarLink::Unresolved);

    let Some(DocumentLink::Signed(grant)) = cache.avatar(&user, &token).await.unwrap() else {
        panic!("expected a signed avatar");
    };
    assert_eq!(grant.path, "u123/a.png");
}

#[tokio::test]
async fn sign_out_leaves_nothing_decrypted_behind() {
    let store = Store::new();
    let cache = cache(&store);
    let user = AuthenticatedUser::new("u123");
    cache.sign_in(&user).unwrap();
    let _ = cache.load(&user, &CancellationToken::new()).await.unwrap();
    cache
        .save(
            &user,
            &ProfileUpdate::new().with(ProfileField::HealthNumber, "ANDA123456"),
        )
        .await
        .unwrap();

    cache.sign_out();

    assert!(cache.cached("u123").is_none());
    assert_eq!(
        cache.field_state("u123", ProfileField::HealthNumber),
        FieldState::Unloaded
    );
    assert_eq!(cache.vault().cipher().keys().cached_keys(), 0);
}

async fn load_with_passport(cache: &Cache, user: &AuthenticatedUser, passport: &str) {
    let _ = cache.load(user, &CancellationToken::new()).await.unwrap();
    cache
        .save(
            user,
            &ProfileUpdate::new().with(ProfileField::PassportNumber, passport),
        )
        .await
        .unwrap();
}

fn assert_nothing_left_of(cache: &Cache, user_id: &str) {
    assert!(cache.cached(user_id).is_none());
    for field in ProfileField::ALL {
        assert_eq!(cache.field_state(user_id, field), FieldState::Unloaded);
    }
}

#[tokio::test]
async fn next_user_after_sign_out_sees_only_their_own_profile() {
    let store = Store::new();
    let cache = cache(&store);
    let alice = AuthenticatedUser::new("alice");
    let bob = AuthenticatedUser::new("bob");
    cache.sign_in(&alice).unwrap();
    load_with_passport(&cache, &alice, "X1234567").await;

    cache.sign_out();
    cache.sign_in(&bob).unwrap();
    let record = cache
        .load(&bob, &CancellationToken::new())
        .await
        .unwrap()
        .into_record()
        .unwrap();

    assert_eq!(record.user_id, "bob");
    assert_eq!(record.passport_number, None);
    assert_eq!(cache.len(), 1);
    assert_nothing_left_of(&cache, "alice");
}

#[tokio::test]
async fn switching_session_hides_the_previous_users_plaintext() {
    let store = Store::new();
    let cache = cache(&store);
    let alice = AuthenticatedUser::new("alice");
    let bob = AuthenticatedUser::new("bob");
    cache.sign_in(&alice).unwrap();
    load_with_passport(&cache, &alice, "X1234567").await;

    assert!(matches!(
        cache.load(&bob, &CancellationToken::new()).await,
        Err(VaultError::Validation(_))
    ));
    assert_nothing_left_of(&cache, "bob");

    cache.sign_in(&bob).unwrap();
    let _ = cache.load(&bob, &CancellationToken::new()).await.unwrap();
    assert_nothing_left_of(&cache, "alice");
    assert_eq!(cache.session_user().as_deref(), Some("bob"));
}

#[tokio::test]
async fn profile_loaded_before_sign_in_does_not_leak_to_the_next_user() {
    let store = Store::new();
    let cache = cache(&store);
    let alice = AuthenticatedUser::new("alice");
    let bob = AuthenticatedUser::new("bob");
    let _ = cache.load(&alice, &CancellationToken::new()).await.unwrap();
    cache
        .save(
            &alice,
            &ProfileUpdate::new().with(ProfileField::FiscalNumber, "123456789"),
        )
        .await
        .unwrap();

    cache.sign_in(&bob).unwrap();

    assert!(cache.is_empty());
    assert_nothing_left_of(&cache, "alice");
    let record = cache
        .profile(&bob, &CancellationToken::new())
        .await
        .unwrap()
        .into_record()
        .unwrap();
    assert_eq!(record.fiscal_number, None);
}

#[tokio::test(start_paused = true)]
async fn load_pending_across_sign_out_is_discarded() {
    let store = Store::new();
    let cache = cache(&store);
    let user = AuthenticatedUser::new("u123");
    cache.sign_in(&user).unwrap();
    store.table.set_latency(Some(Duration::from_millis(200)));

    let token = CancellationToken::new();
    let (outcome, _) = tokio::join!(cache.load(&user, &token), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.sign_out();
    });

    assert_eq!(outcome.unwrap(), CacheOutcome::Discarded);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn offline_save_keeps_last_confirmed_values() {
    let store = Store::new();
    let cache = cache(&store);
    let user = AuthenticatedUser::new("u123");
    let _ = cache.load(&user, &CancellationToken::new()).await.unwrap();
    cache
        .save(
            &user,
            &ProfileUpdate::new().with(ProfileField::PassportNumber, "PAA123456"),
        )
        .await
        .unwrap();

    store.table.set_offline(true);
    let err = cache
        .save(
            &user,
            &ProfileUpdate::new().with(ProfileField::PassportNumber, "PBB999999"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, VaultError::Network(_)));
    assert!(err.is_retryable());
    assert_eq!(
        cache.field_state("u123", ProfileField::PassportNumber),
        FieldState::Loaded(Some("PAA123456".to_string()))
    );
}
