// Centralized logging helpers for ceremony events
use log::{debug, info, warn};

use crate::settings::LoggingSettings;

pub struct LoggingHelper;

impl LoggingHelper {
    /// Initialize `env_logger` with the configured level as default filter
    ///
    /// `RUST_LOG` still takes precedence when set.
    ///
    /// # Errors
    ///
    /// Returns an error if a global logger was already installed
    pub fn init(settings: &LoggingSettings) -> Result<(), log::SetLoggerError> {
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(settings.level.as_str()),
        )
        .try_init()
    }

    /// Shorten an opaque value (challenge, credential ID) for log output
    #[must_use]
    pub fn redact(value: &str) -> String {
        if value.is_empty() {
            return "<empty>".to_string();
        }
        let prefix: String = value.chars().take(6).collect();
        format!("{prefix}…")
    }

    /// Log that a challenge was issued under a lookup key
    pub fn log_challenge_issued(ceremony: &str, key: &str, challenge: &str) {
        debug!(
            "Issued {} challenge {} under key {:?}",
            ceremony,
            Self::redact(challenge),
            key
        );
    }

    /// Log a successful registration
    pub fn log_registration_verified(username: &str, credential_id: &str, new_identity: bool) {
        info!(
            "Registered credential {} for {} ({})",
            Self::redact(credential_id),
            username,
            if new_identity { "new identity" } else { "existing identity" }
        );
    }

    /// Log a successful authentication
    pub fn log_authentication_verified(username: &str, credential_id: &str, counter: u32) {
        info!(
            "Authenticated {} with credential {} (counter {})",
            username,
            Self::redact(credential_id),
            counter
        );
    }

    /// Log a rejected ceremony step
    pub fn log_ceremony_rejected(ceremony: &str, key: &str, reason: &str) {
        warn!("{ceremony} rejected for key {key:?}: {reason}");
    }

    /// Log the result of an expiry sweep
    pub fn log_sweep(removed: usize) {
        if removed > 0 {
            debug!("Removed {removed} expired challenge(s)");
        }
    }
}
