//! # Murmur Testkit
//!
//! Testing utilities for murmur.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known inputs with expected bytes for cross-platform verification
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Helper structs for setting up test scenarios
//!
//! ## Golden Vectors
//!
//! ```rust
//! use murmur_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, got) in verify_all_vectors() {
//!     assert!(matches, "{name}: {got}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use murmur_testkit::generators::message;
//!
//! proptest! {
//!     #[test]
//!     fn message_is_intact(msg in message()) {
//!         prop_assert!(msg.is_intact());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use murmur_testkit::fixtures::TestFixture;
//!
//! let alice = TestFixture::new();
//! let bob = TestFixture::new();
//! let msg = alice.message_to(&bob, b"hello");
//! assert!(msg.is_addressed_to(&bob.pubkey()));
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_party_fixtures, stream_pair, TestFixture};
