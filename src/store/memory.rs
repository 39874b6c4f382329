//! In-memory store for development and tests
//!
//! State lives only as long as the process. Production deployments refuse
//! this backend (see [`super::Stores::open`]).

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use super::tables::{ChallengeTable, UserTable};
use super::{ChallengeStore, CredentialStore, Persistence, StoreError};
use crate::models::{Challenge, ChallengeKey, Credential, UserIdentity};

/// Non-persistent credential and challenge store
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<UserTable>,
    challenges: Mutex<ChallengeTable>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryStore {
    fn is_persistent(&self) -> bool {
        false
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn save_user(&self, identity: UserIdentity) -> Result<(), StoreError> {
        self.users.write().await.save_user(identity)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserIdentity>, StoreError> {
        Ok(self.users.read().await.get_by_username(username))
    }

    async fn get_user_by_credential_id(
        &self,
        credential_id: &str,
    ) -> Result<Option<UserIdentity>, StoreError> {
        Ok(self.users.read().await.get_by_credential_id(credential_id))
    }

    async fn add_credential(&self, username: &str, credential: Credential) -> Result<(), StoreError> {
        self.users.write().await.add_credential(username, credential)
    }

    async fn update_credential_counter(
        &self,
        credential_id: &str,
        new_counter: u32,
    ) -> Result<(), StoreError> {
        self.users
            .write()
            .await
            .update_counter(credential_id, new_counter)
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn save_challenge(&self, challenge: Challenge) -> Result<(), StoreError> {
        if let Some(replaced) = self.challenges.lock().await.save(challenge) {
            log::debug!(
                "Replaced unconsumed challenge for key {:?}",
                replaced.username
            );
        }
        Ok(())
    }

    async fn get_and_delete_challenge(&self, key: &ChallengeKey) -> Result<Option<Challenge>, StoreError> {
        Ok(self.challenges.lock().await.take(key))
    }

    async fn cleanup_expired_challenges(&self) -> Result<usize, StoreError> {
        Ok(self.challenges.lock().await.sweep(Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn challenge_for(key: &ChallengeKey, value: &str) -> Challenge {
        Challenge::issue(value.to_string(), String::new(), key, Duration::minutes(5))
    }

    #[tokio::test]
    async fn test_get_and_delete_consumes_once() {
        let store = MemoryStore::new();
        let key = ChallengeKey::Username("u1".to_string());
        store.save_challenge(challenge_for(&key, "c1")).await.unwrap();

        let first = store.get_and_delete_challenge(&key).await.unwrap();
        assert_eq!(first.map(|c| c.challenge), Some("c1".to_string()));
        assert!(store.get_and_delete_challenge(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_new_issuance_replaces_previous_challenge() {
        let store = MemoryStore::new();
        let key = ChallengeKey::Discoverable;
        store.save_challenge(challenge_for(&key, "first")).await.unwrap();
        store.save_challenge(challenge_for(&key, "second")).await.unwrap();

        let taken = store.get_and_delete_challenge(&key).await.unwrap().unwrap();
        assert_eq!(taken.challenge, "second");
        assert!(store.get_and_delete_challenge(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_do_not_collide() {
        let store = MemoryStore::new();
        let named = ChallengeKey::Username("b@x.com".to_string());
        store.save_challenge(challenge_for(&ChallengeKey::Discoverable, "anon")).await.unwrap();

        assert!(store.get_and_delete_challenge(&named).await.unwrap().is_none());
        assert!(store
            .get_and_delete_challenge(&ChallengeKey::Discoverable)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consumers_get_exactly_one_success() {
        let store = Arc::new(MemoryStore::new());
        let key = ChallengeKey::Username("race".to_string());
        store.save_challenge(challenge_for(&key, "once")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store.get_and_delete_challenge(&key).await.unwrap()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_challenges() {
        let store = MemoryStore::new();
        let key = ChallengeKey::Username("u1".to_string());
        let mut expired = challenge_for(&key, "stale");
        expired.expires_at = Utc::now() - Duration::seconds(1);
        store.save_challenge(expired).await.unwrap();

        assert_eq!(store.cleanup_expired_challenges().await.unwrap(), 1);
        assert!(store.get_and_delete_challenge(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_but_unswept_challenge_is_still_returned() {
        let store = MemoryStore::new();
        let key = ChallengeKey::Username("u1".to_string());
        let mut expired = challenge_for(&key, "late");
        expired.expires_at = Utc::now() - Duration::seconds(1);
        store.save_challenge(expired).await.unwrap();

        assert!(store.get_and_delete_challenge(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_credential_requires_existing_user() {
        let store = MemoryStore::new();
        let credential = Credential::new("cred-9".to_string(), vec![7], 0, vec![]);
        let err = store.add_credential("ghost", credential).await.unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_counter_unknown_credential() {
        let store = MemoryStore::new();
        let err = store
            .update_credential_counter("missing", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CredentialNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_counter_bumps_updated_at() {
        let store = MemoryStore::new();
        let identity = UserIdentity::new(
            "uid".to_string(),
            "a@x.com".to_string(),
            "A".to_string(),
            Credential::new("cred-1".to_string(), vec![1], 0, vec![]),
        );
        let before = identity.updated_at;
        store.save_user(identity).await.unwrap();

        store.update_credential_counter("cred-1", 5).await.unwrap();
        let stored = store.get_user_by_credential_id("cred-1").await.unwrap().unwrap();
        assert_eq!(stored.credential("cred-1").unwrap().counter, 5);
        assert!(stored.updated_at >= before);
    }
}
