#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the passkey-gate application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod client;
pub mod handlers;
pub mod models;
pub mod passkey;
pub mod settings;
pub mod store;
pub mod utils;
pub mod webauthn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use client::{ClientError, PasskeyClient};
pub use handlers::configure_services;
pub use passkey::{CeremonyResponse, PasskeyConfig, PasskeyError, PasskeyService};
pub use settings::PasskeyGateSettings;
pub use store::{ChallengeStore, CredentialStore, Stores};
