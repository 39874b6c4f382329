//! Storage contracts for users, credentials and pending challenges
//!
//! The orchestrator only sees the [`CredentialStore`] and [`ChallengeStore`]
//! traits. Every method is a self-contained atomic step at the store
//! boundary; no caller holds a lock across two store calls.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Challenge, ChallengeKey, Credential, UserIdentity};
use crate::settings::{ApplicationSettings, StorageBackend, StorageSettings};

mod file;
mod memory;
mod tables;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors raised by store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("credential not found: {0}")]
    CredentialNotFound(String),

    #[error("credential already registered: {0}")]
    DuplicateCredential(String),

    #[error("counter regression for credential {credential_id}: stored {stored}, attempted {attempted}")]
    CounterRegression {
        credential_id: String,
        stored: u32,
        attempted: u32,
    },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    NonPersistentBackend(String),
}

/// Whether a backend survives a process restart
pub trait Persistence {
    fn is_persistent(&self) -> bool;
}

/// Durable mapping from identity to credentials and from credential ID back to identity
#[async_trait]
pub trait CredentialStore: Persistence + Send + Sync {
    /// Insert or fully replace an identity, re-indexing every credential it owns
    ///
    /// # Errors
    ///
    /// Returns `DuplicateCredential` if a credential ID is owned by another identity,
    /// or a backend error.
    async fn save_user(&self, identity: UserIdentity) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns a backend error; an unknown username is `Ok(None)`.
    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserIdentity>, StoreError>;

    /// Resolve the owning identity through the cross-user credential index
    ///
    /// # Errors
    ///
    /// Returns a backend error; an unknown credential ID is `Ok(None)`.
    async fn get_user_by_credential_id(
        &self,
        credential_id: &str,
    ) -> Result<Option<UserIdentity>, StoreError>;

    /// Append a credential to an existing identity and index it
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` for an unknown username, `DuplicateCredential`
    /// if the credential ID is already registered, or a backend error.
    async fn add_credential(&self, username: &str, credential: Credential) -> Result<(), StoreError>;

    /// Overwrite a credential's signature counter and bump the owner's `updated_at`
    ///
    /// Applied as a compare-and-set against the stored value.
    ///
    /// # Errors
    ///
    /// Returns `CredentialNotFound` if no identity owns the credential,
    /// `CounterRegression` if `new_counter` does not advance a non-zero stored
    /// counter, or a backend error.
    async fn update_credential_counter(
        &self,
        credential_id: &str,
        new_counter: u32,
    ) -> Result<(), StoreError>;
}

/// Single-use, expiring mapping from lookup key to pending challenge
#[async_trait]
pub trait ChallengeStore: Persistence + Send + Sync {
    /// Store a challenge under its lookup key, replacing any unconsumed one
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    async fn save_challenge(&self, challenge: Challenge) -> Result<(), StoreError>;

    /// Atomically remove and return the challenge stored under `key`
    ///
    /// Expiry is not consulted here; expired challenges disappear only when swept.
    ///
    /// # Errors
    ///
    /// Returns a backend error; an absent or consumed challenge is `Ok(None)`.
    async fn get_and_delete_challenge(&self, key: &ChallengeKey) -> Result<Option<Challenge>, StoreError>;

    /// Remove every challenge whose expiry has passed, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    async fn cleanup_expired_challenges(&self) -> Result<usize, StoreError>;
}

/// The pair of store handles injected into the orchestrator
#[derive(Clone)]
pub struct Stores {
    pub credentials: Arc<dyn CredentialStore>,
    pub challenges: Arc<dyn ChallengeStore>,
}

impl Stores {
    /// Use one backend for both credentials and challenges
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: CredentialStore + ChallengeStore + 'static,
    {
        Self {
            credentials: store.clone(),
            challenges: store,
        }
    }

    /// Open the configured backend
    ///
    /// A production deployment refuses a non-persistent backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened or is not
    /// persistent in production.
    pub async fn open(
        storage: &StorageSettings,
        application: &ApplicationSettings,
    ) -> Result<Self, StoreError> {
        let stores = match storage.backend {
            StorageBackend::Memory => Self::shared(Arc::new(MemoryStore::new())),
            StorageBackend::File => Self::shared(Arc::new(FileStore::open(&storage.data_dir).await?)),
        };

        if application.is_production() {
            stores.ensure_persistent()?;
        }
        Ok(stores)
    }

    /// Fail unless both stores survive a restart
    ///
    /// # Errors
    ///
    /// Returns `NonPersistentBackend` naming the offending store.
    pub fn ensure_persistent(&self) -> Result<(), StoreError> {
        if !self.credentials.is_persistent() {
            return Err(StoreError::NonPersistentBackend(
                "credential store is not persistent; refusing to run in production".to_string(),
            ));
        }
        if !self.challenges.is_persistent() {
            return Err(StoreError::NonPersistentBackend(
                "challenge store is not persistent; refusing to run in production".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn test_memory_backend_refused_in_production() {
        let storage = StorageSettings {
            backend: StorageBackend::Memory,
            ..StorageSettings::default()
        };
        let application = ApplicationSettings {
            environment: "production".to_string(),
            ..ApplicationSettings::default()
        };

        let result = Stores::open(&storage, &application).await;
        assert!(matches!(result, Err(StoreError::NonPersistentBackend(_))));
    }

    #[actix_web::test]
    async fn test_memory_backend_allowed_in_development() {
        let storage = StorageSettings {
            backend: StorageBackend::Memory,
            ..StorageSettings::default()
        };
        let stores = Stores::open(&storage, &ApplicationSettings::default())
            .await
            .expect("memory store should open outside production");
        assert!(!stores.credentials.is_persistent());
    }
}
