//! User handles
//!
//! A `userId` is the unpadded base64url form of a random 16-byte UUID, which
//! is what `webauthn-rs` expects as the user's unique ID.

use uuid::Uuid;

use super::errors::WebAuthnError;
use crate::utils::encoding::{decode_base64url, encode_base64url};

/// Mint a fresh random user handle
#[must_use]
pub fn generate_user_handle() -> String {
    encode_base64url(Uuid::new_v4().as_bytes())
}

/// Parse a user handle back into its UUID
///
/// # Errors
///
/// Returns `EncodingError` if `handle` is not base64url or not 16 bytes long
pub fn user_handle_uuid(handle: &str) -> Result<Uuid, WebAuthnError> {
    let bytes = decode_base64url(handle)
        .map_err(|e| WebAuthnError::EncodingError(format!("user handle {handle:?}: {e}")))?;
    Uuid::from_slice(&bytes)
        .map_err(|e| WebAuthnError::EncodingError(format!("user handle {handle:?}: {e}")))
}
