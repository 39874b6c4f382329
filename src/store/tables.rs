//! Backend-independent table logic shared by the memory and file stores

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::StoreError;
use crate::models::{Challenge, ChallengeKey, Credential, UserIdentity};

/// Identities keyed by username plus the cross-user credential index
#[derive(Clone, Debug, Default)]
pub(crate) struct UserTable {
    users: HashMap<String, UserIdentity>,
    // credential ID -> owning username
    by_credential: HashMap<String, String>,
}

impl UserTable {
    pub(crate) fn from_users(users: Vec<UserIdentity>) -> Result<Self, StoreError> {
        let mut table = Self::default();
        for identity in users {
            table.save_user(identity)?;
        }
        Ok(table)
    }

    /// Identities in creation order
    pub(crate) fn snapshot(&self) -> Vec<&UserIdentity> {
        let mut users: Vec<&UserIdentity> = self.users.values().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.username.cmp(&b.username)));
        users
    }

    pub(crate) fn save_user(&mut self, identity: UserIdentity) -> Result<(), StoreError> {
        for credential in &identity.credentials {
            if let Some(owner) = self.by_credential.get(&credential.id) {
                if owner != &identity.username {
                    return Err(StoreError::DuplicateCredential(credential.id.clone()));
                }
            }
        }

        if let Some(previous) = self.users.get(&identity.username) {
            for credential in &previous.credentials {
                self.by_credential.remove(&credential.id);
            }
        }
        for credential in &identity.credentials {
            self.by_credential
                .insert(credential.id.clone(), identity.username.clone());
        }
        self.users.insert(identity.username.clone(), identity);
        Ok(())
    }

    pub(crate) fn get_by_username(&self, username: &str) -> Option<UserIdentity> {
        self.users.get(username).cloned()
    }

    pub(crate) fn get_by_credential_id(&self, credential_id: &str) -> Option<UserIdentity> {
        self.by_credential
            .get(credential_id)
            .and_then(|owner| self.users.get(owner))
            .cloned()
    }

    pub(crate) fn add_credential(
        &mut self,
        username: &str,
        credential: Credential,
    ) -> Result<(), StoreError> {
        if self.by_credential.contains_key(&credential.id) {
            return Err(StoreError::DuplicateCredential(credential.id));
        }
        let identity = self
            .users
            .get_mut(username)
            .ok_or_else(|| StoreError::UserNotFound(username.to_string()))?;

        self.by_credential
            .insert(credential.id.clone(), username.to_string());
        identity.credentials.push(credential);
        identity.updated_at = Utc::now();
        Ok(())
    }

    pub(crate) fn update_counter(
        &mut self,
        credential_id: &str,
        new_counter: u32,
    ) -> Result<(), StoreError> {
        let not_found = || StoreError::CredentialNotFound(credential_id.to_string());

        let owner = self.by_credential.get(credential_id).ok_or_else(not_found)?;
        let identity = self.users.get_mut(owner).ok_or_else(not_found)?;
        let credential = identity.credential_mut(credential_id).ok_or_else(not_found)?;

        // Counters that never started stay at zero; any other value must move forward
        let stale = new_counter < credential.counter
            || (new_counter == credential.counter && new_counter != 0);
        if stale {
            return Err(StoreError::CounterRegression {
                credential_id: credential_id.to_string(),
                stored: credential.counter,
                attempted: new_counter,
            });
        }
        credential.counter = new_counter;
        identity.updated_at = Utc::now();
        Ok(())
    }
}

/// Pending challenges keyed by username or the discoverable sentinel
#[derive(Clone, Debug, Default)]
pub(crate) struct ChallengeTable {
    entries: HashMap<String, Challenge>,
}

impl ChallengeTable {
    pub(crate) fn from_challenges(challenges: Vec<Challenge>) -> Self {
        let entries = challenges
            .into_iter()
            .map(|c| (c.username.clone(), c))
            .collect();
        Self { entries }
    }

    pub(crate) fn snapshot(&self) -> Vec<&Challenge> {
        let mut challenges: Vec<&Challenge> = self.entries.values().collect();
        challenges.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        challenges
    }

    /// Returns the unconsumed challenge this one replaced, if any
    pub(crate) fn save(&mut self, challenge: Challenge) -> Option<Challenge> {
        self.entries.insert(challenge.username.clone(), challenge)
    }

    pub(crate) fn take(&mut self, key: &ChallengeKey) -> Option<Challenge> {
        self.entries.remove(key.as_str())
    }

    pub(crate) fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, c| !c.is_expired_at(now));
        before - self.entries.len()
    }

    pub(crate) fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.entries.values().any(|c| c.is_expired_at(now))
    }
}
