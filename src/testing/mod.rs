//! Testing utilities for passkey-gate
//!
//! - [`fixtures`] - Pre-built services and settings
//! - [`mock`] - A verifier driven by instructions embedded in the response
//! - [`authenticator`] - A software authenticator producing real signatures
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use passkey_gate::testing::{MockVerifier, TestFixtures};
//!
//! async fn add_second_passkey() {
//!     let service = TestFixtures::service(Arc::new(MockVerifier::new()));
//!     let first = TestFixtures::register(&service, "a@x.com", "cred-1").await;
//!     let second = TestFixtures::register(&service, "a@x.com", "cred-2").await;
//!     assert_eq!(first.user_id, second.user_id);
//! }
//! ```

pub mod authenticator;
pub mod fixtures;
pub mod mock;

// Re-export commonly used items for convenience
pub use authenticator::SoftAuthenticator;
pub use fixtures::TestFixtures;
pub use mock::MockVerifier;

