//! Verifier-level error type
//!
//! Every variant surfaces as a failed verification in the ceremony layer;
//! the distinction is kept for logs and tests.

use std::fmt;

/// Errors raised while building options or checking a ceremony response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebAuthnError {
    /// The relying party settings cannot back a `Webauthn` instance
    ConfigurationError(String),

    /// The library rejected the response (challenge, origin, flags, signature, counter)
    VerificationFailed(String),

    /// The response or stored state could not be decoded
    EncodingError(String),

    /// Options or state could not be produced
    InternalError(String),
}

impl fmt::Display for WebAuthnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebAuthnError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            WebAuthnError::VerificationFailed(msg) => write!(f, "Verification failed: {msg}"),
            WebAuthnError::EncodingError(msg) => write!(f, "Encoding error: {msg}"),
            WebAuthnError::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for WebAuthnError {}

impl From<serde_json::Error> for WebAuthnError {
    fn from(err: serde_json::Error) -> Self {
        WebAuthnError::EncodingError(err.to_string())
    }
}
