mod support;

use pqvault_crypto::{KdfParams, KeyStatus};
use pqvault_keystore::{FileKeyStore, SecureKeyStore, StoreError};
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> FileKeyStore {
    FileKeyStore::open(dir.path(), "store-passphrase", KdfParams::insecure_fast())
        .await
        .unwrap()
}

#[tokio::test]
async fn store_then_retrieve_roundtrips() {
    let dir = TempDir::new().unwrap();
    support::store_then_retrieve_roundtrips(&open_store(&dir).await).await;
}

#[tokio::test]
async fn duplicate_store_rejected() {
    let dir = TempDir::new().unwrap();
    support::duplicate_store_rejected(&open_store(&dir).await).await;
}

#[tokio::test]
async fn retrieve_unknown_is_key_not_found() {
    let dir = TempDir::new().unwrap();
    support::retrieve_unknown_is_key_not_found(&open_store(&dir).await).await;
}

#[tokio::test]
async fn mark_status_follows_lifecycle() {
    let dir = TempDir::new().unwrap();
    support::mark_status_follows_lifecycle(&open_store(&dir).await).await;
}

#[tokio::test]
async fn revoked_key_does_not_resolve() {
    let dir = TempDir::new().unwrap();
    support::revoked_key_does_not_resolve(&open_store(&dir).await).await;
}

#[tokio::test]
async fn secure_delete_removes_key() {
    let dir = TempDir::new().unwrap();
    support::secure_delete_removes_key(&open_store(&dir).await).await;
}

#[tokio::test]
async fn list_metadata_is_ordered_by_creation() {
    let dir = TempDir::new().unwrap();
    support::list_metadata_is_ordered_by_creation(&open_store(&dir).await).await;
}

#[tokio::test]
async fn list_metadata_breaks_creation_ties_by_id() {
    let dir = TempDir::new().unwrap();
    support::list_metadata_breaks_creation_ties_by_id(&open_store(&dir).await).await;
}

#[tokio::test]
async fn mark_status_after_delete_is_key_not_found() {
    let dir = TempDir::new().unwrap();
    support::mark_status_after_delete_is_key_not_found(&open_store(&dir).await).await;
}

#[tokio::test]
async fn keys_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let key = support::sample_key();
    {
        let store = open_store(&dir).await;
        store.store(&key).await.unwrap();
        store
            .mark_status(&key.id(), KeyStatus::Rotating, chrono::Utc::now())
            .await
            .unwrap();
    }

    let reopened = open_store(&dir).await;
    let back = reopened.retrieve(&key.id()).await.unwrap();
    assert_eq!(back.status(), KeyStatus::Rotating);
    assert_eq!(back.private_key().as_bytes(), key.private_key().as_bytes());
}

#[tokio::test]
async fn wrong_passphrase_is_rejected() {
    let dir = TempDir::new().unwrap();
    drop(open_store(&dir).await);

    let result = FileKeyStore::open(dir.path(), "not-the-passphrase", KdfParams::insecure_fast()).await;
    assert!(matches!(result, Err(StoreError::InvalidPassphrase)));
}

#[tokio::test]
async fn private_key_is_not_written_in_plaintext() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let key = support::sample_key();
    store.store(&key).await.unwrap();

    let path = dir.path().join("keys").join(format!("{}.json", key.id()));
    let on_disk = std::fs::read(path).unwrap();
    let needle = &key.private_key().as_bytes()[..32];
    assert!(!on_disk.windows(needle.len()).any(|w| w == needle));
}

#[tokio::test]
async fn edited_status_on_disk_fails_integrity_check() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let key = support::sample_key();
    store.store(&key).await.unwrap();
    store
        .mark_status(&key.id(), KeyStatus::Revoked, chrono::Utc::now())
        .await
        .unwrap();

    // Attempt to resurrect a revoked key by editing its record.
    let path = dir.path().join("keys").join(format!("{}.json", key.id()));
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replace("\"Revoked\"", "\"Active\"")).unwrap();

    let err = store.retrieve(&key.id()).await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupted(id) if id == key.id()));
}

#[tokio::test]
async fn secure_delete_removes_file() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let key = support::sample_key();
    store.store(&key).await.unwrap();
    store.secure_delete(&key.id()).await.unwrap();

    let path = dir.path().join("keys").join(format!("{}.json", key.id()));
    assert!(!path.exists());
}

#[tokio::test]
async fn stray_files_are_ignored_by_listing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.store(&support::sample_key()).await.unwrap();
    std::fs::write(dir.path().join("keys").join("notes.txt"), b"hello").unwrap();
    std::fs::write(dir.path().join("keys").join("not-a-uuid.json"), b"{}").unwrap();

    assert_eq!(store.list_metadata().await.unwrap().len(), 1);
}
