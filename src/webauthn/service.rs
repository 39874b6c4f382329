//! Built-in `WebAuthn` verifier
//!
//! Wraps a `webauthn_rs::Webauthn` instance. The library's ceremony state is
//! returned with the options and handed back through [`Expectations`], so
//! nothing is held in memory between the two halves of a ceremony.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use webauthn_rs::prelude::{
    Credential as CredentialInternals, CredentialID, DiscoverableAuthentication, DiscoverableKey,
    Passkey, PasskeyAuthentication, PasskeyRegistration, PublicKeyCredential,
    RegisterPublicKeyCredential, Url, Webauthn, WebauthnBuilder, WebauthnError,
};

use super::errors::WebAuthnError;
use super::handle::user_handle_uuid;
use super::settings::WebAuthnSettings;
use super::types::{
    AuthenticationOutcome, AuthenticationRequest, Expectations, IssuedOptions, RegistrationInfo,
    RegistrationOutcome, RegistrationRequest,
};
use super::verifier::CeremonyVerifier;
use crate::models::{Credential, UserIdentity};
use crate::utils::encoding::{decode_base64url, encode_base64url};

/// Library state stored with a pending challenge
#[derive(Serialize, Deserialize)]
#[serde(tag = "ceremony", content = "state", rename_all = "snake_case")]
enum CeremonyState {
    Registration(PasskeyRegistration),
    Authentication(PasskeyAuthentication),
    Discoverable(DiscoverableAuthentication),
}

/// Core `WebAuthn` verifier
pub struct WebAuthnVerifier {
    webauthn: Webauthn,
    rp_id: String,
    rp_origin: String,
    authenticator_attachment: Option<String>,
}

impl WebAuthnVerifier {
    /// Build the verifier for one relying party
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the origin is not a URL or
    /// `webauthn-rs` refuses the relying party
    pub fn new(settings: &WebAuthnSettings) -> Result<Self, WebAuthnError> {
        let rp_origin = Url::parse(&settings.rp_origin).map_err(|e| {
            WebAuthnError::ConfigurationError(format!("rp_origin {:?}: {e}", settings.rp_origin))
        })?;
        let webauthn = WebauthnBuilder::new(&settings.rp_id, &rp_origin)
            .and_then(|builder| {
                builder
                    .rp_name(&settings.rp_name)
                    .timeout(settings.timeout())
                    .build()
            })
            .map_err(|e| {
                WebAuthnError::ConfigurationError(format!("Failed to create WebAuthn: {e}"))
            })?;

        Ok(Self {
            webauthn,
            rp_id: settings.rp_id.clone(),
            rp_origin: settings.rp_origin.clone(),
            authenticator_attachment: settings.authenticator_attachment.clone(),
        })
    }

    fn check_relying_party(&self, expected: &Expectations) -> Result<(), WebAuthnError> {
        if expected.rp_id != self.rp_id || expected.origin != self.rp_origin {
            return Err(WebAuthnError::ConfigurationError(format!(
                "ceremony expects {} at {}, verifier is built for {} at {}",
                expected.rp_id, expected.origin, self.rp_id, self.rp_origin
            )));
        }
        Ok(())
    }

    /// Passkeys must be discoverable so usernameless sign-in can find them
    fn require_resident_key(&self, options: &mut Value) {
        let Some(root) = options.as_object_mut() else {
            return;
        };
        let selection = root
            .entry("authenticatorSelection")
            .or_insert_with(|| json!({}));
        if !selection.is_object() {
            *selection = json!({});
        }
        if let Some(selection) = selection.as_object_mut() {
            selection.insert("residentKey".to_string(), json!("required"));
            selection.insert("requireResidentKey".to_string(), json!(true));
            if let Some(attachment) = &self.authenticator_attachment {
                selection.insert("authenticatorAttachment".to_string(), json!(attachment));
            }
        }
    }
}

#[async_trait]
impl CeremonyVerifier for WebAuthnVerifier {
    fn registration_options(
        &self,
        request: RegistrationRequest,
    ) -> Result<IssuedOptions, WebAuthnError> {
        let user_unique_id = user_handle_uuid(&request.user.id)?;
        let exclude_credentials = request
            .exclude_credentials
            .iter()
            .map(|id| credential_id(id))
            .collect::<Result<Vec<_>, _>>()?;

        let (ccr, registration) = self
            .webauthn
            .start_passkey_registration(
                user_unique_id,
                &request.user.name,
                &request.user.display_name,
                (!exclude_credentials.is_empty()).then_some(exclude_credentials),
            )
            .map_err(internal)?;

        let mut options = serde_json::to_value(&ccr.public_key)?;
        self.require_resident_key(&mut options);
        issue(options, &CeremonyState::Registration(registration))
    }

    fn authentication_options(
        &self,
        request: AuthenticationRequest,
    ) -> Result<IssuedOptions, WebAuthnError> {
        match request.allow_credentials {
            Some(credentials) if !credentials.is_empty() => {
                let passkeys = credentials
                    .iter()
                    .map(stored_passkey)
                    .collect::<Result<Vec<_>, _>>()?;
                let (rcr, authentication) = self
                    .webauthn
                    .start_passkey_authentication(&passkeys)
                    .map_err(internal)?;
                let options = serde_json::to_value(&rcr.public_key)?;
                issue(options, &CeremonyState::Authentication(authentication))
            }
            allow_credentials => {
                let (rcr, authentication) = self
                    .webauthn
                    .start_discoverable_authentication()
                    .map_err(internal)?;
                let mut options = serde_json::to_value(&rcr.public_key)?;
                if let Some(root) = options.as_object_mut() {
                    // An unknown username still gets an explicit, empty allow-list
                    if allow_credentials.is_some() {
                        root.insert("allowCredentials".to_string(), json!([]));
                    } else {
                        root.remove("allowCredentials");
                    }
                }
                issue(options, &CeremonyState::Discoverable(authentication))
            }
        }
    }

    async fn verify_registration(
        &self,
        response: &Value,
        expected: &Expectations,
    ) -> Result<RegistrationOutcome, WebAuthnError> {
        self.check_relying_party(expected)?;
        let credential: RegisterPublicKeyCredential = serde_json::from_value(response.clone())?;
        reject_cross_origin(response)?;

        let CeremonyState::Registration(state) = ceremony_state(expected)? else {
            return Err(WebAuthnError::InternalError(
                "challenge was not issued for registration".to_string(),
            ));
        };
        let passkey = self
            .webauthn
            .finish_passkey_registration(&credential, &state)
            .map_err(rejected)?;

        let counter = CredentialInternals::from(passkey.clone()).counter;
        Ok(RegistrationOutcome {
            verified: true,
            registration_info: Some(RegistrationInfo {
                credential_id: encode_base64url(passkey.cred_id().as_ref()),
                public_key: serde_json::to_vec(&passkey)?,
                counter,
            }),
        })
    }

    async fn verify_authentication(
        &self,
        response: &Value,
        expected: &Expectations,
        owner: &UserIdentity,
        credential: &Credential,
    ) -> Result<AuthenticationOutcome, WebAuthnError> {
        self.check_relying_party(expected)?;
        let assertion: PublicKeyCredential = serde_json::from_value(response.clone())?;
        reject_cross_origin(response)?;

        let owner_handle = user_handle_uuid(&owner.user_id)?;
        let passkey = stored_passkey(credential)?;

        let result = match ceremony_state(expected)? {
            CeremonyState::Authentication(state) => {
                check_user_handle(&assertion, &owner_handle, false)?;
                self.webauthn.finish_passkey_authentication(&assertion, &state)
            }
            CeremonyState::Discoverable(state) => {
                check_user_handle(&assertion, &owner_handle, true)?;
                self.webauthn.finish_discoverable_authentication(
                    &assertion,
                    state,
                    &[DiscoverableKey::from(&passkey)],
                )
            }
            CeremonyState::Registration(_) => {
                return Err(WebAuthnError::InternalError(
                    "challenge was not issued for authentication".to_string(),
                ))
            }
        }
        .map_err(rejected)?;

        Ok(AuthenticationOutcome {
            verified: true,
            new_counter: result.counter(),
        })
    }
}

fn issue(options: Value, state: &CeremonyState) -> Result<IssuedOptions, WebAuthnError> {
    let challenge = options
        .get("challenge")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| WebAuthnError::InternalError("options carry no challenge".to_string()))?;
    Ok(IssuedOptions {
        options,
        challenge,
        state: Some(serde_json::to_value(state)?),
    })
}

fn ceremony_state(expected: &Expectations) -> Result<CeremonyState, WebAuthnError> {
    let state = expected.state.clone().ok_or_else(|| {
        WebAuthnError::InternalError("no verifier state recorded with the challenge".to_string())
    })?;
    Ok(serde_json::from_value(state)?)
}

fn credential_id(id: &str) -> Result<CredentialID, WebAuthnError> {
    decode_base64url(id)
        .map(CredentialID::from)
        .map_err(|e| WebAuthnError::EncodingError(format!("credential ID {id:?}: {e}")))
}

/// Rebuild the stored passkey with the counter the store last accepted
fn stored_passkey(credential: &Credential) -> Result<Passkey, WebAuthnError> {
    let passkey: Passkey = serde_json::from_slice(&credential.public_key).map_err(|e| {
        WebAuthnError::EncodingError(format!("stored key for {}: {e}", credential.id))
    })?;
    let mut internals = CredentialInternals::from(passkey);
    internals.counter = credential.counter;
    Ok(Passkey::from(internals))
}

/// A present user handle must name the credential's owner
fn check_user_handle(
    assertion: &PublicKeyCredential,
    owner: &Uuid,
    required: bool,
) -> Result<(), WebAuthnError> {
    match assertion.response.user_handle.as_ref() {
        Some(handle) => {
            let presented: &[u8] = handle.as_ref();
            if presented == &owner.as_bytes()[..] {
                Ok(())
            } else {
                log::error!(
                    "User handle mismatch: expected {}, got {}",
                    encode_base64url(owner.as_bytes()),
                    encode_base64url(presented)
                );
                Err(WebAuthnError::VerificationFailed(
                    "user handle does not belong to the credential owner".to_string(),
                ))
            }
        }
        None if required => Err(WebAuthnError::VerificationFailed(
            "discoverable assertion carries no user handle".to_string(),
        )),
        None => Ok(()),
    }
}

fn reject_cross_origin(response: &Value) -> Result<(), WebAuthnError> {
    let cross_origin = response
        .pointer("/response/clientDataJSON")
        .and_then(Value::as_str)
        .and_then(|encoded| decode_base64url(encoded).ok())
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .and_then(|client_data| client_data.get("crossOrigin").and_then(Value::as_bool))
        .unwrap_or(false);
    if cross_origin {
        return Err(WebAuthnError::VerificationFailed(
            "cross-origin ceremonies are not accepted".to_string(),
        ));
    }
    Ok(())
}

#[allow(clippy::needless_pass_by_value)]
fn rejected(err: WebauthnError) -> WebAuthnError {
    WebAuthnError::VerificationFailed(err.to_string())
}

#[allow(clippy::needless_pass_by_value)]
fn internal(err: WebauthnError) -> WebAuthnError {
    WebAuthnError::InternalError(err.to_string())
}
