//! Mock verifier for orchestrator and HTTP tests
//!
//! Responses built by [`MockVerifier::registration_response`] and
//! [`MockVerifier::authentication_response`] carry a `mock` object telling the
//! verifier what to report:
//!
//! ```json
//! { "id": "cred-1", "mock": { "verified": true, "counter": 5, "omitInfo": false } }
//! ```

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{Credential, UserIdentity};
use crate::passkey::CeremonyResponse;
use crate::utils::encoding::encode_base64url;
use crate::webauthn::{
    AuthenticationOutcome, AuthenticationRequest, CeremonyVerifier, Expectations, IssuedOptions,
    RegistrationInfo, RegistrationOutcome, RegistrationRequest, WebAuthnError, PUBLIC_KEY_TYPE,
};

use super::fixtures::TestFixtures;

/// Verifier that trusts the `mock` instructions embedded in the response
pub struct MockVerifier {
    seen: Mutex<Vec<Expectations>>,
    enforce_counter: bool,
}

impl Default for MockVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVerifier {
    /// Rejects counter regressions like a real verifier
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            enforce_counter: true,
        }
    }

    /// Reports any counter it is told to, leaving regression checks to the store
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            enforce_counter: false,
        }
    }

    /// Expectations passed to the most recent verify call
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned
    #[must_use]
    pub fn last_expectations(&self) -> Option<Expectations> {
        self.seen.lock().unwrap().last().cloned()
    }

    /// A registration response the mock accepts
    #[must_use]
    pub fn registration_response(credential_id: &str, counter: u32) -> CeremonyResponse {
        CeremonyResponse::new(json!({
            "id": credential_id,
            "rawId": credential_id,
            "type": PUBLIC_KEY_TYPE,
            "response": { "transports": ["internal"] },
            "mock": { "verified": true, "counter": counter }
        }))
    }

    /// An authentication response the mock accepts, reporting `counter`
    #[must_use]
    pub fn authentication_response(credential_id: &str, counter: u32) -> CeremonyResponse {
        CeremonyResponse::new(json!({
            "id": credential_id,
            "rawId": credential_id,
            "type": PUBLIC_KEY_TYPE,
            "response": {},
            "mock": { "verified": true, "counter": counter }
        }))
    }

    fn record(&self, expected: &Expectations) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(expected.clone());
        }
    }

    fn issue(options: Value, ceremony: &str) -> IssuedOptions {
        let challenge = options["challenge"].as_str().unwrap_or_default().to_string();
        IssuedOptions {
            options,
            challenge,
            state: Some(json!({ "mock": ceremony })),
        }
    }
}

fn fresh_challenge() -> String {
    encode_base64url(Uuid::new_v4().as_bytes())
}

fn descriptor(id: &str, transports: &[String]) -> Value {
    json!({ "type": PUBLIC_KEY_TYPE, "id": id, "transports": transports })
}

fn instruction<'a>(response: &'a Value, name: &str) -> Option<&'a Value> {
    response.get("mock").and_then(|m| m.get(name))
}

fn reported_counter(response: &Value) -> Option<u32> {
    instruction(response, "counter")
        .and_then(Value::as_u64)
        .and_then(|c| u32::try_from(c).ok())
}

#[async_trait]
impl CeremonyVerifier for MockVerifier {
    fn registration_options(
        &self,
        request: RegistrationRequest,
    ) -> Result<IssuedOptions, WebAuthnError> {
        let exclude: Vec<Value> = request
            .exclude_credentials
            .iter()
            .map(|id| descriptor(id, &[]))
            .collect();
        Ok(Self::issue(
            json!({
                "challenge": fresh_challenge(),
                "rp": { "id": TestFixtures::RP_ID, "name": TestFixtures::RP_NAME },
                "user": request.user,
                "pubKeyCredParams": [{ "type": PUBLIC_KEY_TYPE, "alg": -7 }],
                "timeout": 60000,
                "attestation": "none",
                "authenticatorSelection": {
                    "residentKey": "required",
                    "requireResidentKey": true,
                    "userVerification": "required"
                },
                "excludeCredentials": exclude
            }),
            "registration",
        ))
    }

    fn authentication_options(
        &self,
        request: AuthenticationRequest,
    ) -> Result<IssuedOptions, WebAuthnError> {
        let mut options = json!({
            "challenge": fresh_challenge(),
            "timeout": 60000,
            "rpId": TestFixtures::RP_ID,
            "userVerification": "required"
        });
        if let Some(credentials) = request.allow_credentials {
            let allow: Vec<Value> = credentials
                .iter()
                .map(|c| descriptor(&c.id, &c.transports))
                .collect();
            options["allowCredentials"] = json!(allow);
        }
        Ok(Self::issue(options, "authentication"))
    }

    async fn verify_registration(
        &self,
        response: &Value,
        expected: &Expectations,
    ) -> Result<RegistrationOutcome, WebAuthnError> {
        self.record(expected);

        let verified = instruction(response, "verified")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let omit_info = instruction(response, "omitInfo")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let Some(credential_id) = response.get("id").and_then(Value::as_str) else {
            return Err(WebAuthnError::EncodingError("missing id".to_string()));
        };

        let registration_info = (verified && !omit_info).then(|| RegistrationInfo {
            credential_id: credential_id.to_string(),
            public_key: format!("pk-{credential_id}").into_bytes(),
            counter: reported_counter(response).unwrap_or(0),
        });

        Ok(RegistrationOutcome {
            verified,
            registration_info,
        })
    }

    async fn verify_authentication(
        &self,
        response: &Value,
        expected: &Expectations,
        _owner: &UserIdentity,
        credential: &Credential,
    ) -> Result<AuthenticationOutcome, WebAuthnError> {
        self.record(expected);

        let verified = instruction(response, "verified")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let new_counter =
            reported_counter(response).unwrap_or_else(|| credential.counter.saturating_add(1));

        // Same rule as a real verifier: the counter must advance unless both are zero
        let advanced = new_counter > credential.counter || (new_counter == 0 && credential.counter == 0);
        if verified && self.enforce_counter && !advanced {
            return Err(WebAuthnError::VerificationFailed(format!(
                "signature counter {new_counter} did not advance past {}",
                credential.counter
            )));
        }

        Ok(AuthenticationOutcome {
            verified,
            new_counter,
        })
    }
}
