//! The verifier boundary used by the ceremony orchestrator

use async_trait::async_trait;
use serde_json::Value;

use super::errors::WebAuthnError;
use super::types::{
    AuthenticationOutcome, AuthenticationRequest, Expectations, IssuedOptions,
    RegistrationOutcome, RegistrationRequest,
};
use crate::models::{Credential, UserIdentity};

/// Builds ceremony options and checks ceremony responses
///
/// The orchestrator treats implementations as opaque: responses are passed
/// through untouched and only the outcome is interpreted. Implementations
/// may report a rejection either as `Err` or as an outcome with
/// `verified == false`.
#[async_trait]
pub trait CeremonyVerifier: Send + Sync {
    /// Build registration options, including a fresh challenge
    ///
    /// # Errors
    ///
    /// Returns an error if the options cannot be built
    fn registration_options(
        &self,
        request: RegistrationRequest,
    ) -> Result<IssuedOptions, WebAuthnError>;

    /// Build authentication options, including a fresh challenge
    ///
    /// # Errors
    ///
    /// Returns an error if the options cannot be built
    fn authentication_options(
        &self,
        request: AuthenticationRequest,
    ) -> Result<IssuedOptions, WebAuthnError>;

    /// Check a registration response and extract the new credential
    ///
    /// # Errors
    ///
    /// Returns an error if the response is malformed or fails a check
    async fn verify_registration(
        &self,
        response: &Value,
        expected: &Expectations,
    ) -> Result<RegistrationOutcome, WebAuthnError>;

    /// Check an authentication response against the owner's stored credential
    ///
    /// # Errors
    ///
    /// Returns an error if the response is malformed or fails a check,
    /// including a user handle that is not `owner`'s
    async fn verify_authentication(
        &self,
        response: &Value,
        expected: &Expectations,
        owner: &UserIdentity,
        credential: &Credential,
    ) -> Result<AuthenticationOutcome, WebAuthnError>;
}
