//! Opaque browser ceremony response

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A `PublicKeyCredential` as serialized by the browser
///
/// Only the verifier interprets the payload. The orchestrator reads the
/// credential ID and the advisory transport hints.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(transparent)]
pub struct CeremonyResponse(Value);

impl CeremonyResponse {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The credential ID (`id`), if present
    #[must_use]
    pub fn credential_id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())
    }

    /// Transport hints (`response.transports`); anything malformed is dropped
    #[must_use]
    pub fn transports(&self) -> Vec<String> {
        self.0
            .pointer("/response/transports")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl From<Value> for CeremonyResponse {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
