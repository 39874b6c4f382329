//! Passkey ceremonies
//!
//! [`PasskeyService`] orchestrates registration and authentication over the
//! credential and challenge stores and a [`crate::webauthn::CeremonyVerifier`].

mod errors;
mod identity;
mod response;
mod service;
mod sweeper;

pub use errors::PasskeyError;
pub use identity::{IdentityResolver, RegistrationIdentity};
pub use response::CeremonyResponse;
pub use service::{PasskeyConfig, PasskeyService};
pub use sweeper::spawn_challenge_sweeper;
