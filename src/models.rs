//! Domain records shared by the stores, the orchestrator and the HTTP layer

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::encoding::base64url_bytes;

/// One registered authenticator public key
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Base64url credential ID, unique across the whole store
    pub id: String,
    /// Key material the verifier needs for later assertions, stored verbatim
    #[serde(with = "base64url_bytes")]
    pub public_key: Vec<u8>,
    pub counter: u32,
    /// Transport hints reported by the browser (advisory only)
    #[serde(default)]
    pub transports: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    #[must_use]
    pub fn new(id: String, public_key: Vec<u8>, counter: u32, transports: Vec<String>) -> Self {
        Self {
            id,
            public_key,
            counter,
            transports,
            created_at: Utc::now(),
        }
    }
}

/// One registrant and the credentials it owns
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// Opaque identifier, assigned once at first registration
    pub user_id: String,
    /// Unique external handle (e.g. email)
    pub username: String,
    pub display_name: String,
    /// Registration order
    #[serde(default)]
    pub credentials: Vec<Credential>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserIdentity {
    /// Create an identity owning a single credential
    #[must_use]
    pub fn new(user_id: String, username: String, display_name: String, credential: Credential) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            username,
            display_name,
            credentials: vec![credential],
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn credential(&self, credential_id: &str) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.id == credential_id)
    }

    pub(crate) fn credential_mut(&mut self, credential_id: &str) -> Option<&mut Credential> {
        self.credentials.iter_mut().find(|c| c.id == credential_id)
    }
}

/// Lookup key a challenge is stored under
///
/// Decided once when options are generated and carried unchanged to
/// verification. A discoverable ceremony stays keyed by the anonymous
/// sentinel even after the owning username becomes known.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChallengeKey {
    Username(String),
    Discoverable,
}

impl ChallengeKey {
    /// Sentinel used for ceremonies issued without a username
    pub const DISCOVERABLE_SENTINEL: &'static str = "";

    /// Build the key from an optional caller-supplied username
    ///
    /// Absent and empty usernames both select the discoverable sentinel.
    #[must_use]
    pub fn from_username(username: Option<&str>) -> Self {
        match username {
            Some(name) if !name.is_empty() => Self::Username(name.to_string()),
            _ => Self::Discoverable,
        }
    }

    /// Storage representation of the key
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Username(name) => name,
            Self::Discoverable => Self::DISCOVERABLE_SENTINEL,
        }
    }
}

/// One pending ceremony
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub challenge: String,
    /// Empty for authentication challenges
    pub user_id: String,
    /// Lookup key; empty for discoverable ceremonies
    pub username: String,
    /// Display name requested at registration; applied if the identity is new
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    /// Opaque verifier state needed to finish the ceremony
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    /// Create a challenge issued now and expiring after `ttl`
    #[must_use]
    pub fn issue(challenge: String, user_id: String, key: &ChallengeKey, ttl: Duration) -> Self {
        let created_at = Utc::now();
        Self {
            challenge,
            user_id,
            username: key.as_str().to_string(),
            display_name: String::new(),
            state: None,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = display_name.to_string();
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: Option<Value>) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn key(&self) -> ChallengeKey {
        ChallengeKey::from_username(Some(&self.username))
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of a successful registration verification
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationVerification {
    pub verified: bool,
    pub user_id: String,
    pub credential_id: String,
}

/// Result of a successful authentication verification
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationVerification {
    pub verified: bool,
    pub user_id: String,
    /// The identity's own username, even for discoverable ceremonies
    pub username: String,
}

/// Health check response
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_key_sentinel() {
        assert_eq!(ChallengeKey::from_username(None), ChallengeKey::Discoverable);
        assert_eq!(ChallengeKey::from_username(Some("")), ChallengeKey::Discoverable);
        assert_eq!(ChallengeKey::Discoverable.as_str(), "");
        assert_eq!(
            ChallengeKey::from_username(Some("a@x.com")).as_str(),
            "a@x.com"
        );
    }

    #[test]
    fn test_challenge_expiry_window() {
        let key = ChallengeKey::Username("u1".to_string());
        let challenge = Challenge::issue("abc".to_string(), "uid".to_string(), &key, Duration::minutes(5));
        assert_eq!(challenge.expires_at - challenge.created_at, Duration::minutes(5));
        assert!(!challenge.is_expired_at(challenge.created_at));
        assert!(challenge.is_expired_at(challenge.expires_at));
        assert_eq!(challenge.key(), key);
    }

    #[test]
    fn test_challenge_state_round_trips_through_json() {
        let challenge = Challenge::issue(
            "abc".to_string(),
            String::new(),
            &ChallengeKey::Discoverable,
            Duration::minutes(5),
        );
        let json = serde_json::to_value(&challenge).unwrap();
        assert!(json.get("state").is_none());

        let challenge = challenge.with_state(Some(serde_json::json!({"ceremony": "discoverable"})));
        let back: Challenge = serde_json::from_value(serde_json::to_value(&challenge).unwrap()).unwrap();
        assert_eq!(back.state, challenge.state);
    }

    #[test]
    fn test_credential_serializes_public_key_as_base64url() {
        let credential = Credential::new("cred-1".to_string(), vec![1, 2, 3], 0, vec![]);
        let json = serde_json::to_value(&credential).unwrap();
        assert_eq!(json["publicKey"], "AQID");
        let back: Credential = serde_json::from_value(json).unwrap();
        assert_eq!(back, credential);
    }
}
