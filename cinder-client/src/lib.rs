//! Cinder client library.
//!
//! Wraps `cinder-core` with an async relay link and a session driver. The
//! driver runs as a single task, multiplexing relay events and user
//! commands with `select!`, so a peer-lost event is never stuck behind a
//! pending user command. State lives in the session engine; nothing here
//! is shared or locked.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod config;
pub mod error;
mod relay;
pub mod session;
pub mod validate;

pub use config::ClientConfig;
pub use error::ClientError;
pub use session::{start, SessionHandle};

pub use cinder_core::SessionEvent;
