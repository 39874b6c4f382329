//! Software authenticator producing real signed ceremony responses
//!
//! Holds a P-256 key pair and emits `PublicKeyCredential` JSON the way a
//! browser would, so the built-in verifier can be exercised end to end.

use ciborium::value::{Integer, Value as Cbor};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use serde_json::{json, Value};

use crate::utils::encoding::{decode_base64url, encode_base64url};
use crate::webauthn::PUBLIC_KEY_TYPE;

const FLAG_UP: u8 = 0x01;
const FLAG_UV: u8 = 0x04;
const FLAG_AT: u8 = 0x40;

pub struct SoftAuthenticator {
    key_pair: EcdsaKeyPair,
    credential_id: Vec<u8>,
    rp_id: String,
    origin: String,
    counter: u32,
    user_verified: bool,
    cross_origin: bool,
    /// Reported as `userHandle` in assertions
    user_handle: Option<String>,
}

impl SoftAuthenticator {
    /// Create an authenticator with a fresh key and random credential ID
    ///
    /// # Panics
    ///
    /// Panics if the system random source fails
    #[must_use]
    pub fn new(rp_id: &str, origin: &str) -> Self {
        let mut credential_id = vec![0u8; 16];
        SystemRandom::new().fill(&mut credential_id).unwrap();
        Self::build(rp_id, origin, credential_id)
    }

    /// Create an authenticator with a fresh key but a chosen credential ID
    ///
    /// # Panics
    ///
    /// Panics if `credential_id` is not base64url
    #[must_use]
    pub fn with_credential_id(rp_id: &str, origin: &str, credential_id: &str) -> Self {
        Self::build(rp_id, origin, decode_base64url(credential_id).unwrap())
    }

    fn build(rp_id: &str, origin: &str, credential_id: Vec<u8>) -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng).unwrap();
        Self {
            key_pair,
            credential_id,
            rp_id: rp_id.to_string(),
            origin: origin.to_string(),
            counter: 0,
            user_verified: true,
            cross_origin: false,
            user_handle: None,
        }
    }

    /// Base64url credential ID
    #[must_use]
    pub fn credential_id(&self) -> String {
        encode_base64url(&self.credential_id)
    }

    /// Counter reported by the next response
    pub fn set_counter(&mut self, counter: u32) {
        self.counter = counter;
    }

    pub fn set_user_verified(&mut self, user_verified: bool) {
        self.user_verified = user_verified;
    }

    /// Claim the ceremony ran inside a cross-origin iframe
    pub fn set_cross_origin(&mut self, cross_origin: bool) {
        self.cross_origin = cross_origin;
    }

    /// Override the user handle reported by [`Self::get`]
    pub fn set_user_handle(&mut self, user_handle: Option<String>) {
        self.user_handle = user_handle;
    }

    fn flags(&self) -> u8 {
        if self.user_verified {
            FLAG_UP | FLAG_UV
        } else {
            FLAG_UP
        }
    }

    fn client_data(&self, ceremony: &str, options: &Value) -> Vec<u8> {
        json!({
            "type": ceremony,
            "challenge": options["challenge"],
            "origin": self.origin,
            "crossOrigin": self.cross_origin
        })
        .to_string()
        .into_bytes()
    }

    fn auth_data_header(&self, flags: u8) -> Vec<u8> {
        let mut data = digest(&SHA256, self.rp_id.as_bytes()).as_ref().to_vec();
        data.push(flags);
        data.extend_from_slice(&self.counter.to_be_bytes());
        data
    }

    /// COSE_Key for the ES256 public key
    fn cose_key(&self) -> Vec<u8> {
        let point = self.key_pair.public_key().as_ref();
        let entry = |label: i64, value: Cbor| (Cbor::Integer(Integer::from(label)), value);
        let key = Cbor::Map(vec![
            entry(1, Cbor::Integer(Integer::from(2))),  // kty: EC2
            entry(3, Cbor::Integer(Integer::from(-7))), // alg: ES256
            entry(-1, Cbor::Integer(Integer::from(1))), // crv: P-256
            entry(-2, Cbor::Bytes(point[1..33].to_vec())),
            entry(-3, Cbor::Bytes(point[33..65].to_vec())),
        ]);
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&key, &mut encoded).unwrap();
        encoded
    }

    /// Registration response (`navigator.credentials.create`) for `options`
    ///
    /// Remembers `options.user.id` as the user handle for later assertions.
    ///
    /// # Panics
    ///
    /// Panics if CBOR encoding fails
    #[must_use]
    pub fn create(&mut self, options: &Value) -> Value {
        self.user_handle = options["user"]["id"].as_str().map(str::to_string);

        let mut auth_data = self.auth_data_header(self.flags() | FLAG_AT);
        auth_data.extend_from_slice(&[0u8; 16]); // AAGUID
        let id_len = u16::try_from(self.credential_id.len()).unwrap();
        auth_data.extend_from_slice(&id_len.to_be_bytes());
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&self.cose_key());

        let attestation = Cbor::Map(vec![
            (Cbor::Text("fmt".to_string()), Cbor::Text("none".to_string())),
            (Cbor::Text("attStmt".to_string()), Cbor::Map(vec![])),
            (Cbor::Text("authData".to_string()), Cbor::Bytes(auth_data)),
        ]);
        let mut attestation_object = Vec::new();
        ciborium::ser::into_writer(&attestation, &mut attestation_object).unwrap();

        let id = self.credential_id();
        json!({
            "id": id,
            "rawId": id,
            "type": PUBLIC_KEY_TYPE,
            "response": {
                "clientDataJSON": encode_base64url(&self.client_data("webauthn.create", options)),
                "attestationObject": encode_base64url(&attestation_object),
                "transports": ["internal", "hybrid"]
            },
            "clientExtensionResults": {}
        })
    }

    /// Authentication response (`navigator.credentials.get`) for `options`
    ///
    /// # Panics
    ///
    /// Panics if signing fails
    #[must_use]
    pub fn get(&self, options: &Value) -> Value {
        let client_data = self.client_data("webauthn.get", options);
        let auth_data = self.auth_data_header(self.flags());

        let mut message = auth_data.clone();
        message.extend_from_slice(digest(&SHA256, &client_data).as_ref());
        let signature = self
            .key_pair
            .sign(&SystemRandom::new(), &message)
            .unwrap();

        let id = self.credential_id();
        json!({
            "id": id,
            "rawId": id,
            "type": PUBLIC_KEY_TYPE,
            "response": {
                "clientDataJSON": encode_base64url(&client_data),
                "authenticatorData": encode_base64url(&auth_data),
                "signature": encode_base64url(signature.as_ref()),
                "userHandle": self.user_handle
            },
            "clientExtensionResults": {}
        })
    }
}
