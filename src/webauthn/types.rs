//! Values crossing the verifier boundary
//!
//! Options leave the verifier as browser-ready JSON together with the opaque
//! state needed to finish the ceremony. Responses come back as opaque JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Credential;

pub const PUBLIC_KEY_TYPE: &str = "public-key";

/// Options for one ceremony, ready to be sent to the browser
#[derive(Clone, Debug, PartialEq)]
pub struct IssuedOptions {
    /// `publicKey` options in `WebAuthn` JSON form
    pub options: Value,
    /// Base64url challenge embedded in `options`
    pub challenge: String,
    /// Verifier state to keep with the pending challenge
    pub state: Option<Value>,
}

/// User entity placed in registration options
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// Base64url user handle
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Clone, Debug)]
pub struct RegistrationRequest {
    pub user: UserEntity,
    /// Credential IDs the authenticator must not register again
    pub exclude_credentials: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct AuthenticationRequest {
    /// `None` for a discoverable ceremony; `Some(vec![])` for an unknown username
    pub allow_credentials: Option<Vec<Credential>>,
}

/// What a response must match, taken from the consumed challenge
#[derive(Clone, Debug, PartialEq)]
pub struct Expectations {
    pub challenge: String,
    pub origin: String,
    pub rp_id: String,
    /// State recorded when the options were issued
    pub state: Option<Value>,
}

/// Credential extracted from a verified registration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub credential_id: String,
    /// Key material the verifier needs to check later assertions
    pub public_key: Vec<u8>,
    pub counter: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationOutcome {
    pub verified: bool,
    pub registration_info: Option<RegistrationInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationOutcome {
    pub verified: bool,
    pub new_counter: u32,
}
