//! Base64url helpers shared by the verifier, the stores and the client adapter
//!
//! WebAuthn JSON carries binary fields as unpadded base64url. Browsers and
//! client libraries are not consistent about padding, so decoding accepts both.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Encode bytes as unpadded base64url
#[must_use]
pub fn encode_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a base64url string, with or without trailing padding
///
/// # Errors
///
/// Returns an error if the input contains characters outside the base64url alphabet
pub fn decode_base64url(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('='))
}

/// Serde adapter storing `Vec<u8>` fields as base64url strings
pub mod base64url_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a base64url string
    ///
    /// # Errors
    ///
    /// Propagates serializer errors
    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::encode_base64url(bytes))
    }

    /// Deserialize bytes from a base64url string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid base64url
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        super::decode_base64url(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_accepts_padding() {
        let encoded = encode_base64url(b"ab");
        assert_eq!(encoded, "YWI");
        assert_eq!(decode_base64url("YWI").unwrap(), b"ab");
        assert_eq!(decode_base64url("YWI=").unwrap(), b"ab");
    }

    #[test]
    fn test_decode_rejects_standard_alphabet() {
        assert!(decode_base64url("a+b/").is_err());
    }
}
