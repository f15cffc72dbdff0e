//! Protocol errors.
//!
//! Every variant maps to a stable numeric code so the UI layer can surface
//! errors consistently. Recoverable errors (per-message decrypt failures,
//! malformed relay input, rate-limit rejections) are surfaced as non-fatal
//! error events; fatal errors (keygen failure, network loss at session
//! start) terminate the session through the normal teardown path.

use std::fmt;

/// All protocol-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Connect or transport failure.
    Network(String),

    /// Randomness/keygen failure. Fatal: the session must be aborted.
    CryptoGen,

    /// Authentication tag check failed or ciphertext malformed.
    /// Recoverable per-message.
    CryptoDecrypt,

    /// No peer appeared within the search window.
    SessionTimeout,

    /// Operation attempted in the wrong session state.
    SessionInvalid,

    /// Keys were wiped or never generated.
    KeysNotPresent,

    /// Peer public key has the wrong length or encoding.
    PeerKeyMalformed,

    /// Encrypt/decrypt attempted before the channel was derived.
    ChannelNotReady,

    /// The peer disconnected.
    PeerDisconnect,

    /// Outbound message rejected by the rate limiter.
    RateLimited,

    /// An envelope from the relay could not be parsed. Recoverable.
    MalformedEnvelope,

    /// Unexpected internal failure.
    Internal,
}

impl ChatError {
    /// Stable numeric code for this error (carried on every error event).
    pub fn code(&self) -> u16 {
        match self {
            Self::Network(_) | Self::MalformedEnvelope => 101,
            Self::CryptoGen => 201,
            Self::CryptoDecrypt | Self::PeerKeyMalformed => 202,
            Self::SessionTimeout => 301,
            Self::SessionInvalid | Self::KeysNotPresent | Self::ChannelNotReady => 302,
            Self::PeerDisconnect => 303,
            Self::RateLimited => 401,
            Self::Internal => 500,
        }
    }

    /// Whether the session survives this error.
    ///
    /// Non-fatal errors become UI error events; fatal ones go through
    /// teardown (which always attempts key wipe first).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Network(_) | Self::CryptoGen | Self::SessionTimeout)
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Deliberately terse. No key material, no payload fragments.
        match self {
            Self::Network(msg) => write!(f, "network error: {}", msg),
            Self::CryptoGen => write!(f, "key generation failed"),
            Self::CryptoDecrypt => write!(f, "decryption failed"),
            Self::SessionTimeout => write!(f, "session timed out"),
            Self::SessionInvalid => write!(f, "operation invalid in current state"),
            Self::KeysNotPresent => write!(f, "keys not present"),
            Self::PeerKeyMalformed => write!(f, "peer public key malformed"),
            Self::ChannelNotReady => write!(f, "secure channel not established"),
            Self::PeerDisconnect => write!(f, "peer disconnected"),
            Self::RateLimited => write!(f, "rate limit exceeded"),
            Self::MalformedEnvelope => write!(f, "malformed envelope"),
            Self::Internal => write!(f, "internal error"),
        }
    }
}

impl std::error::Error for ChatError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ChatError::Network("x".into()).code(), 101);
        assert_eq!(ChatError::CryptoGen.code(), 201);
        assert_eq!(ChatError::CryptoDecrypt.code(), 202);
        assert_eq!(ChatError::SessionTimeout.code(), 301);
        assert_eq!(ChatError::SessionInvalid.code(), 302);
        assert_eq!(ChatError::KeysNotPresent.code(), 302);
        assert_eq!(ChatError::PeerDisconnect.code(), 303);
        assert_eq!(ChatError::RateLimited.code(), 401);
        assert_eq!(ChatError::Internal.code(), 500);
    }

    #[test]
    fn fatality_split() {
        assert!(ChatError::CryptoGen.is_fatal());
        assert!(ChatError::Network("down".into()).is_fatal());
        assert!(!ChatError::CryptoDecrypt.is_fatal());
        assert!(!ChatError::RateLimited.is_fatal());
        assert!(!ChatError::MalformedEnvelope.is_fatal());
    }
}
