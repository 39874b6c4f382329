//! `WebAuthn` verifier boundary
//!
//! [`CeremonyVerifier`] is the only interface the ceremony orchestrator uses.
//! [`WebAuthnVerifier`] is the built-in implementation on top of `webauthn-rs`;
//! its ceremony state is serialised onto the pending challenge.

mod errors;
mod handle;
mod service;
mod settings;
mod types;
mod verifier;

// Re-exports for public use
pub use errors::WebAuthnError;
pub use handle::{generate_user_handle, user_handle_uuid};
pub use service::WebAuthnVerifier;
pub use settings::WebAuthnSettings;
pub use types::*;
pub use verifier::CeremonyVerifier;
