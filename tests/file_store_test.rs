use std::sync::Arc;

use chrono::Duration;
use tempfile::TempDir;

use passkey_gate::models::{Challenge, ChallengeKey, Credential, UserIdentity};
use passkey_gate::settings::{ApplicationSettings, StorageBackend, StorageSettings};
use passkey_gate::store::{ChallengeStore, CredentialStore, FileStore, StoreError, Stores};
use passkey_gate::testing::{MockVerifier, TestFixtures};

fn identity(username: &str, credential_id: &str) -> UserIdentity {
    UserIdentity::new(
        format!("uid-{username}"),
        username.to_string(),
        username.to_string(),
        Credential::new(credential_id.to_string(), vec![1, 2, 3], 0, vec!["usb".to_string()]),
    )
}

/// Identities and credentials survive reopening the store
#[actix_web::test]
async fn test_users_persist_across_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = FileStore::open(dir.path()).await.unwrap();
        store.save_user(identity("a@x.com", "cred-1")).await.unwrap();
        store
            .add_credential("a@x.com", Credential::new("cred-2".to_string(), vec![4], 0, vec![]))
            .await
            .unwrap();
        store.update_credential_counter("cred-1", 7).await.unwrap();
    }

    let store = FileStore::open(dir.path()).await.unwrap();
    let user = store.get_user_by_credential_id("cred-2").await.unwrap().unwrap();
    assert_eq!(user.username, "a@x.com");
    assert_eq!(user.user_id, "uid-a@x.com");
    assert_eq!(user.credentials.len(), 2);
    assert_eq!(user.credential("cred-1").unwrap().counter, 7);
    assert_eq!(user.credential("cred-1").unwrap().public_key, vec![1, 2, 3]);
    assert_eq!(user.credential("cred-1").unwrap().transports, vec!["usb".to_string()]);
}

/// Pending challenges survive a restart and are still single-use
#[actix_web::test]
async fn test_challenges_persist_across_reopen() {
    let dir = TempDir::new().unwrap();
    let key = ChallengeKey::Username("u1".to_string());
    {
        let store = FileStore::open(dir.path()).await.unwrap();
        store
            .save_challenge(Challenge::issue(
                "abc".to_string(),
                "uid".to_string(),
                &key,
                Duration::minutes(5),
            ))
            .await
            .unwrap();
    }

    let store = FileStore::open(dir.path()).await.unwrap();
    let taken = store.get_and_delete_challenge(&key).await.unwrap().unwrap();
    assert_eq!(taken.challenge, "abc");

    // The deletion is durable too
    let store = FileStore::open(dir.path()).await.unwrap();
    assert!(store.get_and_delete_challenge(&key).await.unwrap().is_none());
}

/// Expired challenges are swept from disk
#[actix_web::test]
async fn test_cleanup_is_persisted() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();
    store
        .save_challenge(Challenge::issue(
            "old".to_string(),
            String::new(),
            &ChallengeKey::Discoverable,
            Duration::seconds(-1),
        ))
        .await
        .unwrap();
    store
        .save_challenge(Challenge::issue(
            "fresh".to_string(),
            "uid".to_string(),
            &ChallengeKey::Username("u1".to_string()),
            Duration::minutes(5),
        ))
        .await
        .unwrap();

    assert_eq!(store.cleanup_expired_challenges().await.unwrap(), 1);

    let reopened = FileStore::open(dir.path()).await.unwrap();
    assert!(reopened
        .get_and_delete_challenge(&ChallengeKey::Discoverable)
        .await
        .unwrap()
        .is_none());
    assert!(reopened
        .get_and_delete_challenge(&ChallengeKey::Username("u1".to_string()))
        .await
        .unwrap()
        .is_some());
}

/// A rejected mutation leaves both memory and disk untouched
#[actix_web::test]
async fn test_rejected_mutations_are_not_persisted() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();
    store.save_user(identity("a@x.com", "cred-1")).await.unwrap();
    store.update_credential_counter("cred-1", 9).await.unwrap();

    let err = store.save_user(identity("b@x.com", "cred-1")).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateCredential(_)));

    let err = store.update_credential_counter("cred-1", 3).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::CounterRegression { stored: 9, attempted: 3, .. }
    ));

    let err = store
        .add_credential("nobody", Credential::new("cred-x".to_string(), vec![], 0, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UserNotFound(_)));

    let reopened = FileStore::open(dir.path()).await.unwrap();
    assert!(reopened.get_user_by_username("b@x.com").await.unwrap().is_none());
    let owner = reopened.get_user_by_credential_id("cred-1").await.unwrap().unwrap();
    assert_eq!(owner.username, "a@x.com");
    assert_eq!(owner.credential("cred-1").unwrap().counter, 9);
}

/// A corrupt data file is an error, not an empty store
#[actix_web::test]
async fn test_corrupt_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("users.json"), "{not json").unwrap();
    let err = FileStore::open(dir.path()).await.err().unwrap();
    assert!(matches!(err, StoreError::Serialization(_)));
}

/// Production accepts the file backend
#[actix_web::test]
async fn test_production_opens_file_backend() {
    let dir = TempDir::new().unwrap();
    let storage = StorageSettings {
        backend: StorageBackend::File,
        data_dir: dir.path().to_string_lossy().to_string(),
    };
    let application = ApplicationSettings {
        environment: "production".to_string(),
        ..ApplicationSettings::default()
    };

    let stores = Stores::open(&storage, &application).await.unwrap();
    assert!(stores.ensure_persistent().is_ok());
}

/// Full ceremonies through the orchestrator survive a restart
#[actix_web::test]
async fn test_service_over_file_store_survives_restart() {
    let dir = TempDir::new().unwrap();

    let registered = {
        let stores = Stores::shared(Arc::new(FileStore::open(dir.path()).await.unwrap()));
        let service = TestFixtures::service_with_stores(stores, Arc::new(MockVerifier::new()));
        let registered = TestFixtures::register(&service, "a@x.com", "cred-1").await;
        service
            .generate_authentication_options(None)
            .await
            .unwrap();
        registered
    };

    // The discoverable challenge issued before the restart is still usable
    let stores = Stores::shared(Arc::new(FileStore::open(dir.path()).await.unwrap()));
    let service = TestFixtures::service_with_stores(stores, Arc::new(MockVerifier::new()));
    let result = service
        .verify_authentication(None, &MockVerifier::authentication_response("cred-1", 4))
        .await
        .unwrap();
    assert_eq!(result.user_id, registered.user_id);
    assert_eq!(result.username, "a@x.com");
}
