//! Session configuration.

use std::time::Duration;

/// How long to wait for a peer before giving up.
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for one chat session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay URL, e.g. `ws://127.0.0.1:8765`.
    pub relay_url: String,
    /// Room code shared out-of-band with the peer.
    pub room: String,
    /// Abandon the search if no peer shows up within this window.
    pub search_timeout: Duration,
}

impl ClientConfig {
    /// Configuration with the default search window.
    pub fn new(relay_url: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            room: room.into(),
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }

    /// Override the search window.
    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }
}
