//! Cinder Protocol Core
//!
//! Ephemeral, end-to-end encrypted two-party chat over a blind relay.
//!
//! This crate provides:
//! - The JSON envelope codec spoken over the relay link
//! - The session state machine and the session engine that drives it
//! - Ephemeral Curve25519 key exchange and the derived encrypted channel
//! - A sliding-window rate limiter for outbound messages
//!
//! # Security Invariants
//!
//! - Keys are generated fresh per session and never persisted
//! - The relay sees only opaque SIGNAL payloads, never plaintext
//! - Authenticated encryption: tampered ciphertext is rejected, never
//!   decrypted incorrectly
//! - Best-effort zeroization of the private scalar, shared secret, and
//!   channel key on teardown
//! - Direct use of `unsafe` is forbidden (#![forbid(unsafe_code)])

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod channel;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod limiter;
pub mod session;
pub mod state;

pub use channel::EncryptedChannel;
pub use envelope::{Envelope, Signal};
pub use error::ChatError;
pub use keys::KeyExchange;
pub use limiter::RateLimiter;
pub use session::{ChatSession, SessionEvent, SessionOutput};
pub use state::SessionState;
