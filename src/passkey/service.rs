//! Ceremony orchestrator
//!
//! Drives the four passkey operations over injected stores and verifier.
//! Holds no state of its own between calls; every mutation happens after the
//! preceding validation step has succeeded.

use std::sync::Arc;

use chrono::Duration;
use serde_json::Value;

use super::errors::PasskeyError;
use super::identity::IdentityResolver;
use super::response::CeremonyResponse;
use crate::models::{
    AuthenticationVerification, Challenge, ChallengeKey, Credential, RegistrationVerification,
    UserIdentity,
};
use crate::settings::PasskeyGateSettings;
use crate::store::Stores;
use crate::utils::logging::LoggingHelper;
use crate::webauthn::{
    AuthenticationRequest, CeremonyVerifier, Expectations, RegistrationRequest, UserEntity,
};

const REGISTRATION: &str = "registration";
const AUTHENTICATION: &str = "authentication";

/// Relying party identity and challenge window
#[derive(Debug, Clone)]
pub struct PasskeyConfig {
    pub rp_id: String,
    /// Origin expected on incoming ceremony responses
    pub rp_origin: String,
    pub challenge_ttl: Duration,
}

impl PasskeyConfig {
    #[must_use]
    pub fn from_settings(settings: &PasskeyGateSettings) -> Self {
        Self {
            rp_id: settings.relying_party.rp_id.clone(),
            rp_origin: settings.relying_party.rp_origin.clone(),
            challenge_ttl: settings.challenge_ttl(),
        }
    }
}

/// The passkey service
#[derive(Clone)]
pub struct PasskeyService {
    stores: Stores,
    verifier: Arc<dyn CeremonyVerifier>,
    config: PasskeyConfig,
}

impl PasskeyService {
    #[must_use]
    pub fn new(stores: Stores, verifier: Arc<dyn CeremonyVerifier>, config: PasskeyConfig) -> Self {
        Self {
            stores,
            verifier,
            config,
        }
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Build registration options and record the challenge under `username`
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` if a store call fails, or `VerificationFailed`
    /// if the verifier cannot build options.
    pub async fn generate_registration_options(
        &self,
        username: &str,
        display_name: &str,
        user_id: Option<&str>,
    ) -> Result<Value, PasskeyError> {
        let key = ChallengeKey::from_username(Some(username));
        let resolver = IdentityResolver::new(self.stores.credentials.as_ref());
        let identity = resolver.registration_identity(username, user_id).await?;

        // Keep an authenticator from registering twice for the same identity
        let exclude_credentials = identity
            .existing
            .as_ref()
            .map(|existing| existing.credentials.iter().map(|c| c.id.clone()).collect())
            .unwrap_or_default();

        let issued = self.verifier.registration_options(RegistrationRequest {
            user: UserEntity {
                id: identity.user_id.clone(),
                name: username.to_string(),
                display_name: display_name.to_string(),
            },
            exclude_credentials,
        })?;

        let challenge = Challenge::issue(
            issued.challenge.clone(),
            identity.user_id,
            &key,
            self.config.challenge_ttl,
        )
        .with_display_name(display_name)
        .with_state(issued.state);
        self.stores.challenges.save_challenge(challenge).await?;
        LoggingHelper::log_challenge_issued(REGISTRATION, key.as_str(), &issued.challenge);

        Ok(issued.options)
    }

    /// Consume the registration challenge, verify the response and store the credential
    ///
    /// A new identity takes the `userId` recorded on the consumed challenge.
    ///
    /// # Errors
    ///
    /// - `ChallengeNotFoundOrExpired` if no challenge is pending for `username`
    /// - `VerificationFailed` if the verifier rejects the response or omits the
    ///   credential, or the credential ID is already registered
    /// - `StorageFailure` if a store call fails
    pub async fn verify_registration(
        &self,
        username: &str,
        response: &CeremonyResponse,
    ) -> Result<RegistrationVerification, PasskeyError> {
        let key = ChallengeKey::from_username(Some(username));
        let challenge = self.take_challenge(REGISTRATION, &key).await?;

        let outcome = self
            .verifier
            .verify_registration(response.as_value(), &self.expectations(&challenge))
            .await
            .map_err(|e| self.rejected(REGISTRATION, &key, e.into()))?;
        if !outcome.verified {
            return Err(self.rejected(
                REGISTRATION,
                &key,
                PasskeyError::VerificationFailed("registration response not verified".to_string()),
            ));
        }
        let Some(info) = outcome.registration_info else {
            return Err(self.rejected(
                REGISTRATION,
                &key,
                PasskeyError::VerificationFailed(
                    "verifier returned no registration info".to_string(),
                ),
            ));
        };

        let credential = Credential::new(
            info.credential_id,
            info.public_key,
            info.counter,
            response.transports(),
        );
        let credential_id = credential.id.clone();

        let existing = self.stores.credentials.get_user_by_username(username).await?;
        let user_id = if let Some(identity) = existing {
            self.stores
                .credentials
                .add_credential(username, credential)
                .await
                .map_err(|e| self.rejected(REGISTRATION, &key, e.into()))?;
            LoggingHelper::log_registration_verified(username, &credential_id, false);
            identity.user_id
        } else {
            let display_name = if challenge.display_name.is_empty() {
                username
            } else {
                challenge.display_name.as_str()
            };
            let identity = UserIdentity::new(
                challenge.user_id.clone(),
                username.to_string(),
                display_name.to_string(),
                credential,
            );
            self.stores
                .credentials
                .save_user(identity)
                .await
                .map_err(|e| self.rejected(REGISTRATION, &key, e.into()))?;
            LoggingHelper::log_registration_verified(username, &credential_id, true);
            challenge.user_id
        };

        Ok(RegistrationVerification {
            verified: true,
            user_id,
            credential_id,
        })
    }

    /// Build authentication options and record the challenge
    ///
    /// With a username the options carry an allow-list (empty for an unknown
    /// username); without one the allow-list is omitted and the challenge is
    /// keyed by the discoverable sentinel.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` if a store call fails, or `VerificationFailed`
    /// if the verifier cannot build options.
    pub async fn generate_authentication_options(
        &self,
        username: Option<&str>,
    ) -> Result<Value, PasskeyError> {
        let key = ChallengeKey::from_username(username);

        let allow_credentials = match &key {
            ChallengeKey::Username(name) => Some(
                self.stores
                    .credentials
                    .get_user_by_username(name)
                    .await?
                    .map(|identity| identity.credentials)
                    .unwrap_or_default(),
            ),
            ChallengeKey::Discoverable => None,
        };

        let issued = self
            .verifier
            .authentication_options(AuthenticationRequest { allow_credentials })?;

        // userId is unknown until the credential is presented
        let challenge = Challenge::issue(
            issued.challenge.clone(),
            String::new(),
            &key,
            self.config.challenge_ttl,
        )
        .with_state(issued.state);
        self.stores.challenges.save_challenge(challenge).await?;
        LoggingHelper::log_challenge_issued(AUTHENTICATION, key.as_str(), &issued.challenge);

        Ok(issued.options)
    }

    /// Consume the authentication challenge, resolve the owner and verify the assertion
    ///
    /// The challenge is looked up under the same key it was issued under,
    /// even when the owning username is only learned from the credential.
    ///
    /// # Errors
    ///
    /// - `ChallengeNotFoundOrExpired` if no challenge is pending for the key
    /// - `UserNotFound` if no identity owns the presented credential
    /// - `CredentialNotFound` if the credential is not reachable via `username`
    /// - `VerificationFailed` if the verifier rejects the response or the
    ///   counter would regress
    /// - `StorageFailure` if a store call fails
    pub async fn verify_authentication(
        &self,
        username: Option<&str>,
        response: &CeremonyResponse,
    ) -> Result<AuthenticationVerification, PasskeyError> {
        let key = ChallengeKey::from_username(username);
        let challenge = self.take_challenge(AUTHENTICATION, &key).await?;

        let Some(credential_id) = response.credential_id() else {
            return Err(self.rejected(
                AUTHENTICATION,
                &key,
                PasskeyError::VerificationFailed("response carries no credential ID".to_string()),
            ));
        };

        let resolver = IdentityResolver::new(self.stores.credentials.as_ref());
        let (identity, credential) = resolver
            .credential_owner(&key, credential_id)
            .await
            .map_err(|e| self.rejected(AUTHENTICATION, &key, e))?;

        let outcome = self
            .verifier
            .verify_authentication(
                response.as_value(),
                &self.expectations(&challenge),
                &identity,
                &credential,
            )
            .await
            .map_err(|e| self.rejected(AUTHENTICATION, &key, e.into()))?;
        if !outcome.verified {
            return Err(self.rejected(
                AUTHENTICATION,
                &key,
                PasskeyError::VerificationFailed(
                    "authentication response not verified".to_string(),
                ),
            ));
        }

        self.stores
            .credentials
            .update_credential_counter(&credential.id, outcome.new_counter)
            .await
            .map_err(|e| self.rejected(AUTHENTICATION, &key, e.into()))?;
        LoggingHelper::log_authentication_verified(
            &identity.username,
            &credential.id,
            outcome.new_counter,
        );

        Ok(AuthenticationVerification {
            verified: true,
            user_id: identity.user_id,
            username: identity.username,
        })
    }

    /// Remove expired challenges, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` if the sweep fails
    pub async fn cleanup_expired_challenges(&self) -> Result<usize, PasskeyError> {
        let removed = self.stores.challenges.cleanup_expired_challenges().await?;
        LoggingHelper::log_sweep(removed);
        Ok(removed)
    }

    async fn take_challenge(
        &self,
        ceremony: &str,
        key: &ChallengeKey,
    ) -> Result<Challenge, PasskeyError> {
        match self.stores.challenges.get_and_delete_challenge(key).await {
            Ok(Some(challenge)) => Ok(challenge),
            Ok(None) => Err(self.rejected(ceremony, key, PasskeyError::ChallengeNotFoundOrExpired)),
            Err(e) => {
                log::error!("Challenge lookup for {ceremony} failed: {e}");
                Err(e.into())
            }
        }
    }

    fn expectations(&self, challenge: &Challenge) -> Expectations {
        Expectations {
            challenge: challenge.challenge.clone(),
            origin: self.config.rp_origin.clone(),
            rp_id: self.config.rp_id.clone(),
            state: challenge.state.clone(),
        }
    }

    #[allow(clippy::unused_self)]
    fn rejected(&self, ceremony: &str, key: &ChallengeKey, err: PasskeyError) -> PasskeyError {
        match &err {
            PasskeyError::StorageFailure(source) => {
                log::error!("{ceremony} storage failure for key {:?}: {source}", key.as_str());
            }
            other => LoggingHelper::log_ceremony_rejected(ceremony, key.as_str(), &other.to_string()),
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockVerifier, TestFixtures};
    use serde_json::json;

    fn service_with(verifier: MockVerifier) -> PasskeyService {
        TestFixtures::service(Arc::new(verifier))
    }

    #[actix_web::test]
    async fn test_registration_options_exclude_existing_credentials() {
        let service = service_with(MockVerifier::new());
        service
            .generate_registration_options("a@x.com", "A", None)
            .await
            .unwrap();
        service
            .verify_registration("a@x.com", &MockVerifier::registration_response("cred-1", 0))
            .await
            .unwrap();

        let options = service
            .generate_registration_options("a@x.com", "A", None)
            .await
            .unwrap();
        let excluded: Vec<&str> = options["excludeCredentials"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|d| d["id"].as_str())
            .collect();
        assert_eq!(excluded, vec!["cred-1"]);
    }

    #[actix_web::test]
    async fn test_verifier_receives_stored_challenge_and_origin() {
        let verifier = Arc::new(MockVerifier::new());
        let service = TestFixtures::service(verifier.clone());

        let options = service
            .generate_registration_options("u1", "U One", None)
            .await
            .unwrap();
        service
            .verify_registration("u1", &MockVerifier::registration_response("cred-1", 0))
            .await
            .unwrap();

        let seen = verifier.last_expectations().unwrap();
        assert_eq!(seen.challenge, options["challenge"].as_str().unwrap());
        assert_eq!(seen.state, Some(json!({ "mock": "registration" })));
        assert_eq!(seen.origin, TestFixtures::ORIGIN);
        assert_eq!(seen.rp_id, TestFixtures::RP_ID);
    }

    #[actix_web::test]
    async fn test_new_identity_keeps_display_name() {
        let service = service_with(MockVerifier::new());
        service
            .generate_registration_options("u1", "U One", None)
            .await
            .unwrap();
        service
            .verify_registration("u1", &MockVerifier::registration_response("cred-1", 0))
            .await
            .unwrap();

        let identity = service
            .stores()
            .credentials
            .get_user_by_username("u1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.display_name, "U One");
    }

    #[actix_web::test]
    async fn test_rejected_registration_consumes_challenge() {
        let service = service_with(MockVerifier::new());
        service
            .generate_registration_options("u1", "U One", None)
            .await
            .unwrap();

        let rejected = CeremonyResponse::new(json!({"id": "cred-1", "mock": {"verified": false}}));
        let err = service.verify_registration("u1", &rejected).await.unwrap_err();
        assert!(matches!(err, PasskeyError::VerificationFailed(_)));

        let err = service
            .verify_registration("u1", &MockVerifier::registration_response("cred-1", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, PasskeyError::ChallengeNotFoundOrExpired));
    }

    #[actix_web::test]
    async fn test_missing_registration_info_is_verification_failure() {
        let service = service_with(MockVerifier::new());
        service
            .generate_registration_options("u1", "U One", None)
            .await
            .unwrap();

        let response = CeremonyResponse::new(json!({"id": "cred-1", "mock": {"omitInfo": true}}));
        let err = service.verify_registration("u1", &response).await.unwrap_err();
        assert!(matches!(err, PasskeyError::VerificationFailed(_)));
    }

    #[actix_web::test]
    async fn test_duplicate_credential_across_users_is_rejected() {
        let service = service_with(MockVerifier::new());
        TestFixtures::register(&service, "a@x.com", "cred-1").await;

        service
            .generate_registration_options("b@x.com", "B", None)
            .await
            .unwrap();
        let err = service
            .verify_registration("b@x.com", &MockVerifier::registration_response("cred-1", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, PasskeyError::VerificationFailed(_)));
        assert!(service
            .stores()
            .credentials
            .get_user_by_username("b@x.com")
            .await
            .unwrap()
            .is_none());
    }

    #[actix_web::test]
    async fn test_authentication_options_for_unknown_username_has_empty_allow_list() {
        let service = service_with(MockVerifier::new());
        let options = service
            .generate_authentication_options(Some("nobody@x.com"))
            .await
            .unwrap();
        assert_eq!(options["allowCredentials"], json!([]));
    }

    #[actix_web::test]
    async fn test_authentication_with_unregistered_credential() {
        let service = service_with(MockVerifier::new());
        service.generate_authentication_options(None).await.unwrap();

        let err = service
            .verify_authentication(None, &MockVerifier::authentication_response("ghost", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, PasskeyError::UserNotFound(_)));
    }

    #[actix_web::test]
    async fn test_authentication_with_mismatched_username() {
        let service = service_with(MockVerifier::new());
        TestFixtures::register(&service, "a@x.com", "cred-a").await;
        TestFixtures::register(&service, "b@x.com", "cred-b").await;

        service
            .generate_authentication_options(Some("a@x.com"))
            .await
            .unwrap();
        let err = service
            .verify_authentication(Some("a@x.com"), &MockVerifier::authentication_response("cred-b", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, PasskeyError::CredentialNotFound(_)));
    }

    #[actix_web::test]
    async fn test_response_without_credential_id() {
        let service = service_with(MockVerifier::new());
        service.generate_authentication_options(None).await.unwrap();

        let err = service
            .verify_authentication(None, &CeremonyResponse::new(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, PasskeyError::VerificationFailed(_)));
    }

    #[actix_web::test]
    async fn test_cleanup_reports_removed_count() {
        let service = service_with(MockVerifier::new());
        let mut stale = Challenge::issue(
            "old".to_string(),
            String::new(),
            &ChallengeKey::Discoverable,
            Duration::minutes(5),
        );
        stale.expires_at = chrono::Utc::now() - Duration::seconds(1);
        service.stores().challenges.save_challenge(stale).await.unwrap();

        assert_eq!(service.cleanup_expired_challenges().await.unwrap(), 1);
        assert_eq!(service.cleanup_expired_challenges().await.unwrap(), 0);
    }
}
