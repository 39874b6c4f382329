//! Identity resolution
//!
//! Decides which `userId` a registration uses and which identity owns the
//! credential presented during authentication.

use crate::models::{ChallengeKey, Credential, UserIdentity};
use crate::store::CredentialStore;
use crate::webauthn::generate_user_handle;

use super::errors::PasskeyError;

pub struct IdentityResolver<'a> {
    credentials: &'a dyn CredentialStore,
}

/// `userId` chosen for a registration ceremony
#[derive(Debug)]
pub struct RegistrationIdentity {
    pub user_id: String,
    /// The identity already registered under the username, if any
    pub existing: Option<UserIdentity>,
}

impl<'a> IdentityResolver<'a> {
    #[must_use]
    pub fn new(credentials: &'a dyn CredentialStore) -> Self {
        Self { credentials }
    }

    /// Pick the `userId` for registration options
    ///
    /// Order: the existing identity's ID, then the caller-supplied ID, then a
    /// freshly minted random handle. A `userId` never changes once assigned,
    /// so a supplied ID that disagrees with an existing identity is ignored.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` if the lookup fails
    pub async fn registration_identity(
        &self,
        username: &str,
        supplied_user_id: Option<&str>,
    ) -> Result<RegistrationIdentity, PasskeyError> {
        let existing = self.credentials.get_user_by_username(username).await?;

        let supplied = supplied_user_id.filter(|id| !id.is_empty());
        let user_id = match (&existing, supplied) {
            (Some(identity), supplied) => {
                if let Some(id) = supplied.filter(|id| *id != identity.user_id) {
                    log::warn!(
                        "Ignoring supplied userId {id:?} for {username:?}; keeping {:?}",
                        identity.user_id
                    );
                }
                identity.user_id.clone()
            }
            (None, Some(id)) => id.to_string(),
            (None, None) => generate_user_handle(),
        };

        Ok(RegistrationIdentity { user_id, existing })
    }

    /// Resolve the identity owning `credential_id` and the credential itself
    ///
    /// For a ceremony keyed by username, the owner must be that username.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if no identity owns the credential and
    /// `CredentialNotFound` if the owner's credential list disagrees with the
    /// index or the owner is not the ceremony's username.
    pub async fn credential_owner(
        &self,
        key: &ChallengeKey,
        credential_id: &str,
    ) -> Result<(UserIdentity, Credential), PasskeyError> {
        let identity = self
            .credentials
            .get_user_by_credential_id(credential_id)
            .await?
            .ok_or_else(|| {
                PasskeyError::UserNotFound(format!("no identity owns credential {credential_id}"))
            })?;

        let credential = identity
            .credential(credential_id)
            .cloned()
            .ok_or_else(|| PasskeyError::CredentialNotFound(credential_id.to_string()))?;

        if let ChallengeKey::Username(name) = key {
            if name != &identity.username {
                return Err(PasskeyError::CredentialNotFound(format!(
                    "{credential_id} is not registered to {name}"
                )));
            }
        }

        Ok((identity, credential))
    }
}
