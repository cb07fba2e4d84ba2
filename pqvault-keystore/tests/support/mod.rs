//! Shared fixtures and the store contract suite run against every backend.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use pqvault_crypto::{
    KemAlgorithm, KemProvider, KeyId, KeyMetadata, KeyStatus, MlKemProvider, QuantumKeyPair,
};
use pqvault_keystore::{SecureKeyStore, StoreError};

pub fn sample_key() -> QuantumKeyPair {
    let alg = KemAlgorithm::MlKem512;
    let kp = MlKemProvider::new().keygen(alg).unwrap();
    let now = Utc::now();
    QuantumKeyPair::new(
        KeyMetadata {
            id: KeyId::new(),
            algorithm: alg,
            public_key: kp.public_key,
            created_at: now,
            expires_at: now + Duration::days(90),
            status: KeyStatus::Active,
            retired_at: None,
        },
        kp.private_key,
    )
}

pub async fn store_then_retrieve_roundtrips(store: &dyn SecureKeyStore) {
    let key = sample_key();
    store.store(&key).await.unwrap();

    let back = store.retrieve(&key.id()).await.unwrap();
    assert_eq!(back.metadata(), key.metadata());
    assert_eq!(back.private_key().as_bytes(), key.private_key().as_bytes());
}

pub async fn duplicate_store_rejected(store: &dyn SecureKeyStore) {
    let key = sample_key();
    store.store(&key).await.unwrap();
    let err = store.store(&key).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(id) if id == key.id()));
}

pub async fn retrieve_unknown_is_key_not_found(store: &dyn SecureKeyStore) {
    let id = KeyId::new();
    let err = store.retrieve(&id).await.unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(missing) if missing == id));
}

pub async fn mark_status_follows_lifecycle(store: &dyn SecureKeyStore) {
    let key = sample_key();
    store.store(&key).await.unwrap();
    let t = Utc::now();

    let meta = store.mark_status(&key.id(), KeyStatus::Rotating, t).await.unwrap();
    assert_eq!(meta.status, KeyStatus::Rotating);
    assert_eq!(meta.retired_at, Some(t));

    let meta = store.mark_status(&key.id(), KeyStatus::Expired, t).await.unwrap();
    assert_eq!(meta.status, KeyStatus::Expired);

    // Expired keys still resolve for decryption of older envelopes.
    let back = store.retrieve(&key.id()).await.unwrap();
    assert_eq!(back.status(), KeyStatus::Expired);
    assert_eq!(back.private_key().as_bytes(), key.private_key().as_bytes());

    let err = store.mark_status(&key.id(), KeyStatus::Active, t).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
}

pub async fn revoked_key_does_not_resolve(store: &dyn SecureKeyStore) {
    let key = sample_key();
    store.store(&key).await.unwrap();
    store.mark_status(&key.id(), KeyStatus::Revoked, Utc::now()).await.unwrap();

    let err = store.retrieve(&key.id()).await.unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(_)));
}

pub async fn secure_delete_removes_key(store: &dyn SecureKeyStore) {
    let key = sample_key();
    store.store(&key).await.unwrap();
    store.secure_delete(&key.id()).await.unwrap();

    assert!(matches!(
        store.retrieve(&key.id()).await,
        Err(StoreError::KeyNotFound(_))
    ));
    assert!(matches!(
        store.secure_delete(&key.id()).await,
        Err(StoreError::KeyNotFound(_))
    ));
    let listed = store.list_metadata().await.unwrap();
    assert!(listed.iter().all(|m| m.id != key.id()));
}

pub async fn list_metadata_is_ordered_by_creation(store: &dyn SecureKeyStore) {
    let first = sample_key();
    let mut second = sample_key();
    second.metadata_mut().created_at = first.metadata().created_at + Duration::seconds(1);

    store.store(&second).await.unwrap();
    store.store(&first).await.unwrap();

    let listed = store.list_metadata().await.unwrap();
    let ids: Vec<KeyId> = listed.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![first.id(), second.id()]);
}

pub async fn list_metadata_breaks_creation_ties_by_id(store: &dyn SecureKeyStore) {
    let mut keys: Vec<QuantumKeyPair> = (0..4).map(|_| sample_key()).collect();
    let created_at = keys[0].metadata().created_at;
    for key in &mut keys {
        key.metadata_mut().created_at = created_at;
    }
    for key in keys.iter().rev() {
        store.store(key).await.unwrap();
    }

    let listed: Vec<KeyId> = store.list_metadata().await.unwrap().iter().map(|m| m.id).collect();
    let mut expected: Vec<KeyId> = keys.iter().map(|k| k.id()).collect();
    expected.sort();
    assert_eq!(listed, expected);
}

pub async fn mark_status_after_delete_is_key_not_found(store: &dyn SecureKeyStore) {
    let key = sample_key();
    store.store(&key).await.unwrap();
    store.secure_delete(&key.id()).await.unwrap();

    let err = store
        .mark_status(&key.id(), KeyStatus::Rotating, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(id) if id == key.id()));
}
