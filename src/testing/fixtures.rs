//! Test fixtures providing pre-built services and settings

use std::sync::Arc;

use crate::models::RegistrationVerification;
use crate::passkey::{PasskeyConfig, PasskeyService};
use crate::settings::PasskeyGateSettings;
use crate::store::{MemoryStore, Stores};
use crate::webauthn::{CeremonyVerifier, WebAuthnVerifier};

use super::mock::MockVerifier;

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    pub const RP_ID: &'static str = "localhost";
    pub const RP_NAME: &'static str = "Passkey Gate";
    pub const ORIGIN: &'static str = "http://localhost:8080";

    /// Default settings; the relying party matches the constants above
    #[must_use]
    pub fn settings() -> PasskeyGateSettings {
        let mut settings = PasskeyGateSettings::default();
        settings.relying_party.rp_id = Self::RP_ID.to_string();
        settings.relying_party.rp_name = Self::RP_NAME.to_string();
        settings.relying_party.rp_origin = Self::ORIGIN.to_string();
        settings
    }

    #[must_use]
    pub fn config() -> PasskeyConfig {
        PasskeyConfig::from_settings(&Self::settings())
    }

    /// Service over a fresh in-memory store
    #[must_use]
    pub fn service(verifier: Arc<dyn CeremonyVerifier>) -> PasskeyService {
        Self::service_with_stores(Stores::shared(Arc::new(MemoryStore::new())), verifier)
    }

    #[must_use]
    pub fn service_with_stores(stores: Stores, verifier: Arc<dyn CeremonyVerifier>) -> PasskeyService {
        PasskeyService::new(stores, verifier, Self::config())
    }

    /// Service using the built-in verifier
    ///
    /// # Panics
    ///
    /// Panics if the fixture relying party is rejected by `webauthn-rs`
    #[must_use]
    pub fn real_service() -> PasskeyService {
        let verifier = WebAuthnVerifier::new(&Self::settings().webauthn_settings()).unwrap();
        Self::service(Arc::new(verifier))
    }

    /// Run a full registration through a mock-verified service
    ///
    /// # Panics
    ///
    /// Panics if either registration step fails
    pub async fn register(
        service: &PasskeyService,
        username: &str,
        credential_id: &str,
    ) -> RegistrationVerification {
        service
            .generate_registration_options(username, username, None)
            .await
            .unwrap();
        service
            .verify_registration(
                username,
                &MockVerifier::registration_response(credential_id, 0),
            )
            .await
            .unwrap()
    }
}
