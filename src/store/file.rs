//! JSON file-backed persistent store
//!
//! Users and challenges live in `users.json` and `challenges.json` under the
//! data directory. Each mutation is applied to a copy of the table, written
//! to a temp file and renamed into place, and only then made visible, all
//! while the table lock is held.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use super::tables::{ChallengeTable, UserTable};
use super::{ChallengeStore, CredentialStore, Persistence, StoreError};
use crate::models::{Challenge, ChallengeKey, Credential, UserIdentity};

const USERS_FILE: &str = "users.json";
const CHALLENGES_FILE: &str = "challenges.json";

/// Persistent credential and challenge store
pub struct FileStore {
    dir: PathBuf,
    users: Mutex<UserTable>,
    challenges: Mutex<ChallengeTable>,
}

impl FileStore {
    /// Open (or create) a store rooted at `dir`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// data file cannot be read or parsed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let users: Vec<UserIdentity> = read_json(&dir.join(USERS_FILE)).await?;
        let challenges: Vec<Challenge> = read_json(&dir.join(CHALLENGES_FILE)).await?;
        log::info!(
            "Opened file store at {} ({} users, {} pending challenges)",
            dir.display(),
            users.len(),
            challenges.len()
        );

        Ok(Self {
            users: Mutex::new(UserTable::from_users(users)?),
            challenges: Mutex::new(ChallengeTable::from_challenges(challenges)),
            dir,
        })
    }

    async fn persist_users(&self, table: &UserTable) -> Result<(), StoreError> {
        write_json(&self.dir.join(USERS_FILE), &table.snapshot()).await
    }

    async fn persist_challenges(&self, table: &ChallengeTable) -> Result<(), StoreError> {
        write_json(&self.dir.join(CHALLENGES_FILE), &table.snapshot()).await
    }

    /// Apply `mutate` to a copy of the user table, persist it, then publish it
    async fn mutate_users<F>(&self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut UserTable) -> Result<(), StoreError> + Send,
    {
        let mut guard = self.users.lock().await;
        let mut next = guard.clone();
        mutate(&mut next)?;
        self.persist_users(&next).await?;
        *guard = next;
        Ok(())
    }
}

impl Persistence for FileStore {
    fn is_persistent(&self) -> bool {
        true
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn save_user(&self, identity: UserIdentity) -> Result<(), StoreError> {
        self.mutate_users(|table| table.save_user(identity)).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserIdentity>, StoreError> {
        Ok(self.users.lock().await.get_by_username(username))
    }

    async fn get_user_by_credential_id(
        &self,
        credential_id: &str,
    ) -> Result<Option<UserIdentity>, StoreError> {
        Ok(self.users.lock().await.get_by_credential_id(credential_id))
    }

    async fn add_credential(&self, username: &str, credential: Credential) -> Result<(), StoreError> {
        self.mutate_users(|table| table.add_credential(username, credential))
            .await
    }

    async fn update_credential_counter(
        &self,
        credential_id: &str,
        new_counter: u32,
    ) -> Result<(), StoreError> {
        self.mutate_users(|table| table.update_counter(credential_id, new_counter))
            .await
    }
}

#[async_trait]
impl ChallengeStore for FileStore {
    async fn save_challenge(&self, challenge: Challenge) -> Result<(), StoreError> {
        let mut guard = self.challenges.lock().await;
        let mut next = guard.clone();
        next.save(challenge);
        self.persist_challenges(&next).await?;
        *guard = next;
        Ok(())
    }

    async fn get_and_delete_challenge(&self, key: &ChallengeKey) -> Result<Option<Challenge>, StoreError> {
        let mut guard = self.challenges.lock().await;
        let mut next = guard.clone();
        let Some(taken) = next.take(key) else {
            return Ok(None);
        };
        self.persist_challenges(&next).await?;
        *guard = next;
        Ok(Some(taken))
    }

    async fn cleanup_expired_challenges(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut guard = self.challenges.lock().await;
        if !guard.has_expired(now) {
            return Ok(0);
        }
        let mut next = guard.clone();
        let removed = next.sweep(now);
        self.persist_challenges(&next).await?;
        *guard = next;
        Ok(removed)
    }
}

async fn read_json<T>(path: &Path) -> Result<Vec<T>, StoreError>
where
    T: DeserializeOwned,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T>(path: &Path, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
