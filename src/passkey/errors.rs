//! Ceremony error taxonomy

use thiserror::Error;

use crate::store::StoreError;
use crate::webauthn::WebAuthnError;

/// Errors a ceremony operation can fail with
///
/// Every failure is terminal for that ceremony attempt; a retry must start
/// again from option generation.
#[derive(Debug, Error)]
pub enum PasskeyError {
    /// Nothing stored under the ceremony's key: never issued, already
    /// consumed, swept after expiry or replaced by a later issuance
    #[error("challenge not found or expired")]
    ChallengeNotFoundOrExpired,

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("credential not found: {0}")]
    CredentialNotFound(String),

    #[error("storage failure: {0}")]
    StorageFailure(#[source] StoreError),
}

impl PasskeyError {
    /// Stable machine-readable code
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChallengeNotFoundOrExpired => "challenge_not_found_or_expired",
            Self::VerificationFailed(_) => "verification_failed",
            Self::UserNotFound(_) => "user_not_found",
            Self::CredentialNotFound(_) => "credential_not_found",
            Self::StorageFailure(_) => "storage_failure",
        }
    }
}

impl From<StoreError> for PasskeyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(username) => Self::UserNotFound(username),
            StoreError::CredentialNotFound(id) => Self::CredentialNotFound(id),
            StoreError::CounterRegression { .. } | StoreError::DuplicateCredential(_) => {
                Self::VerificationFailed(err.to_string())
            }
            other => Self::StorageFailure(other),
        }
    }
}

impl From<WebAuthnError> for PasskeyError {
    fn from(err: WebAuthnError) -> Self {
        Self::VerificationFailed(err.to_string())
    }
}
