/// Relying party configuration handed to the built-in verifier
#[derive(Debug, Clone)]
pub struct WebAuthnSettings {
    pub rp_id: String,
    pub rp_name: String,
    /// Origin the browser must report in client data
    pub rp_origin: String,
    pub timeout_seconds: u64,
    /// "platform" or "cross-platform"; unset lets the browser choose
    pub authenticator_attachment: Option<String>,
}

impl WebAuthnSettings {
    #[must_use]
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for WebAuthnSettings {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "Passkey Gate".to_string(),
            rp_origin: "http://localhost:8080".to_string(),
            timeout_seconds: 60,
            authenticator_attachment: None,
        }
    }
}
