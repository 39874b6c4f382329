use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

use crate::webauthn::WebAuthnSettings;

/// Errors raised while loading or validating settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings file: {0}")]
    Parse(#[from] basic_toml::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PasskeyGateSettings {
    pub application: ApplicationSettings,
    pub relying_party: RelyingPartySettings,
    pub challenges: ChallengeSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Deployment environment; "production" requires persistent storage
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelyingPartySettings {
    /// Relying Party ID; must equal the authentication domain
    pub rp_id: String,
    /// Display name shown by the authenticator
    pub rp_name: String,
    /// Full scheme+host+port expected on incoming ceremony responses
    pub rp_origin: String,
    pub timeout_seconds: u64,
    /// Optional "platform" or "cross-platform"
    pub authenticator_attachment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeSettings {
    /// Expiry window of an issued challenge
    pub ttl_seconds: i64,
    /// How often the expiry sweep runs
    pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Directory for the file backend
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            environment: "development".to_string(),
        }
    }
}

impl ApplicationSettings {
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl Default for RelyingPartySettings {
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

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 300, // 5 minutes
            cleanup_interval_seconds: 60,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: "data".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PasskeyGateSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read or parsed
    /// - The resulting settings fail validation
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        settings.validate()?;

        Ok(settings)
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `PASSKEY_CONFIG_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed
    fn load_base_settings() -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_toml(&fs::read_to_string(&default_config_path)?)?;
            log::info!("Loaded base settings from {}", default_config_path.display());
        }

        if let Ok(config_dir) = std::env::var("PASSKEY_CONFIG_DIR") {
            let config_path = std::path::Path::new(&config_dir).join("Settings.toml");
            if config_path.exists() {
                settings = Self::from_toml(&fs::read_to_string(&config_path)?)?;
                log::info!("Overriding settings from {}", config_path.display());
            } else {
                log::info!(
                    "PASSKEY_CONFIG_DIR set but no Settings.toml found at: {}",
                    config_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse settings from TOML text; missing sections fall back to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(basic_toml::from_str(content)?)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_relying_party_env_overrides(&mut settings.relying_party);
        Self::apply_challenge_env_overrides(&mut settings.challenges);
        Self::apply_storage_env_overrides(&mut settings.storage);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        if let Ok(environment) = std::env::var("APP_ENV") {
            app_settings.environment = environment;
        }
    }

    /// Apply environment overrides for relying party settings
    pub fn apply_relying_party_env_overrides(rp_settings: &mut RelyingPartySettings) {
        if let Ok(rp_id) = std::env::var("RP_ID") {
            rp_settings.rp_id = rp_id;
        }
        if let Ok(rp_name) = std::env::var("RP_NAME") {
            rp_settings.rp_name = rp_name;
        }
        if let Ok(rp_origin) = std::env::var("RP_ORIGIN") {
            rp_settings.rp_origin = rp_origin;
        }
        if let Ok(attachment) = std::env::var("AUTHENTICATOR_ATTACHMENT") {
            rp_settings.authenticator_attachment = Some(attachment).filter(|a| !a.is_empty());
        }
        if let Ok(value) = std::env::var("RP_TIMEOUT_SECONDS") {
            if let Ok(timeout) = value.parse::<u64>() {
                rp_settings.timeout_seconds = timeout;
            }
        }
    }

    fn apply_challenge_env_overrides(challenge_settings: &mut ChallengeSettings) {
        if let Ok(value) = std::env::var("CHALLENGE_TTL_SECONDS") {
            if let Ok(ttl) = value.parse::<i64>() {
                challenge_settings.ttl_seconds = ttl;
            }
        }
        if let Ok(value) = std::env::var("CHALLENGE_CLEANUP_INTERVAL_SECONDS") {
            if let Ok(interval) = value.parse::<u64>() {
                challenge_settings.cleanup_interval_seconds = interval;
            }
        }
    }

    fn apply_storage_env_overrides(storage_settings: &mut StorageSettings) {
        if let Ok(backend) = std::env::var("STORAGE_BACKEND") {
            match backend.to_ascii_lowercase().as_str() {
                "memory" => storage_settings.backend = StorageBackend::Memory,
                "file" => storage_settings.backend = StorageBackend::File,
                other => log::warn!("Ignoring unknown STORAGE_BACKEND {other:?}"),
            }
        }
        if let Ok(data_dir) = std::env::var("DATA_DIR") {
            storage_settings.data_dir = data_dir;
        }
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    if std::env::var_os(key.trim()).is_none() {
                        std::env::set_var(key.trim(), value.trim());
                    }
                }
            }
        }
    }

    /// Check the relying party configuration and challenge window
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Invalid` describing the first problem found
    pub fn validate(&self) -> Result<(), SettingsError> {
        let rp = &self.relying_party;
        if rp.rp_id.trim().is_empty() {
            return Err(SettingsError::Invalid("rp_id must not be empty".to_string()));
        }

        let origin = url::Url::parse(&rp.rp_origin)
            .map_err(|e| SettingsError::Invalid(format!("rp_origin {:?}: {e}", rp.rp_origin)))?;
        let Some(host) = origin.host_str() else {
            return Err(SettingsError::Invalid(format!(
                "rp_origin {:?} has no host",
                rp.rp_origin
            )));
        };
        if host != rp.rp_id && !host.ends_with(&format!(".{}", rp.rp_id)) {
            return Err(SettingsError::Invalid(format!(
                "rp_id {:?} is not the origin host {host:?} or a parent domain of it",
                rp.rp_id
            )));
        }

        if let Some(attachment) = &rp.authenticator_attachment {
            if !matches!(attachment.as_str(), "platform" | "cross-platform") {
                return Err(SettingsError::Invalid(format!(
                    "authenticator_attachment {attachment:?} must be platform or cross-platform"
                )));
            }
        }

        if self.challenges.ttl_seconds <= 0 {
            return Err(SettingsError::Invalid(
                "challenges.ttl_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Relying party configuration for the built-in verifier
    #[must_use]
    pub fn webauthn_settings(&self) -> WebAuthnSettings {
        let rp = &self.relying_party;
        WebAuthnSettings {
            rp_id: rp.rp_id.clone(),
            rp_name: rp.rp_name.clone(),
            rp_origin: rp.rp_origin.clone(),
            timeout_seconds: rp.timeout_seconds,
            authenticator_attachment: rp.authenticator_attachment.clone(),
        }
    }

    #[must_use]
    pub fn challenge_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.challenges.ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // Helper function to clean all relevant environment variables for tests
    fn clean_env_vars() {
        for var in [
            "RP_ID",
            "RP_NAME",
            "RP_ORIGIN",
            "AUTHENTICATOR_ATTACHMENT",
            "RP_TIMEOUT_SECONDS",
            "CHALLENGE_TTL_SECONDS",
            "STORAGE_BACKEND",
            "DATA_DIR",
            "APP_ENV",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = PasskeyGateSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.challenges.ttl_seconds, 300);
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert!(!settings.application.is_production());
    }

    #[test]
    #[serial]
    fn test_relying_party_env_override() {
        clean_env_vars();

        let mut settings = PasskeyGateSettings::default();
        std::env::set_var("RP_ID", "example.com");
        std::env::set_var("RP_NAME", "Example");
        std::env::set_var("RP_ORIGIN", "https://login.example.com");
        std::env::set_var("AUTHENTICATOR_ATTACHMENT", "platform");

        PasskeyGateSettings::apply_env_overrides(&mut settings);

        assert_eq!(settings.relying_party.rp_id, "example.com");
        assert_eq!(settings.relying_party.rp_name, "Example");
        assert_eq!(settings.relying_party.rp_origin, "https://login.example.com");
        assert!(settings.validate().is_ok());

        let webauthn = settings.webauthn_settings();
        assert_eq!(webauthn.rp_id, "example.com");
        assert_eq!(webauthn.rp_origin, "https://login.example.com");
        assert_eq!(webauthn.authenticator_attachment.as_deref(), Some("platform"));

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_storage_env_override() {
        clean_env_vars();

        let mut settings = PasskeyGateSettings::default();
        std::env::set_var("STORAGE_BACKEND", "FILE");
        std::env::set_var("DATA_DIR", "/var/lib/passkey-gate");
        std::env::set_var("APP_ENV", "production");

        PasskeyGateSettings::apply_env_overrides(&mut settings);

        assert_eq!(settings.storage.backend, StorageBackend::File);
        assert_eq!(settings.storage.data_dir, "/var/lib/passkey-gate");
        assert!(settings.application.is_production());

        clean_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_numeric_override_is_ignored() {
        clean_env_vars();

        let mut settings = PasskeyGateSettings::default();
        std::env::set_var("CHALLENGE_TTL_SECONDS", "five minutes");
        PasskeyGateSettings::apply_env_overrides(&mut settings);
        assert_eq!(settings.challenges.ttl_seconds, 300);

        clean_env_vars();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = PasskeyGateSettings::from_toml(
            r#"
            [relying_party]
            rp_id = "example.com"
            rp_origin = "https://example.com"

            [storage]
            backend = "file"
            "#,
        )
        .unwrap();

        assert_eq!(settings.relying_party.rp_id, "example.com");
        assert_eq!(settings.relying_party.rp_name, "Passkey Gate");
        assert_eq!(settings.storage.backend, StorageBackend::File);
        assert_eq!(settings.storage.data_dir, "data");
        assert_eq!(settings.application.port, 8080);
    }

    #[test]
    fn test_rp_id_must_match_origin_host() {
        let mut settings = PasskeyGateSettings::default();
        settings.relying_party.rp_id = "example.com".to_string();
        settings.relying_party.rp_origin = "https://evil.test".to_string();
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        settings.relying_party.rp_origin = "https://auth.example.com:8443".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_attachment_and_bad_ttl() {
        let mut settings = PasskeyGateSettings::default();
        settings.relying_party.authenticator_attachment = Some("usb".to_string());
        assert!(settings.validate().is_err());

        settings.relying_party.authenticator_attachment = Some("platform".to_string());
        assert!(settings.validate().is_ok());

        let mut settings = PasskeyGateSettings::default();
        settings.challenges.ttl_seconds = 0;
        assert!(settings.validate().is_err());
    }
}
