//! Session state machine.
//!
//! ```text
//! Init -> Searching -> PeerFound -> KeySetup -> Connected
//!                                                  |
//!                                  Disconnected <--+
//!                                       |
//!                                   Destroyed  (reachable from any state
//!                                               via explicit termination)
//! ```
//!
//! Transitions are one-directional except the two exits: `Disconnected`
//! (peer lost, reachable from any state past `Init`) and `Destroyed`.
//! `Destroyed` is terminal: no further transitions, and the engine treats
//! calls made in that state as session-invalid errors or no-ops.

use crate::error::ChatError;

/// Progress of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session object created; nothing started.
    Init,
    /// JOIN sent, waiting for the relay to pair us.
    Searching,
    /// Relay reported a peer; handshake about to begin.
    PeerFound,
    /// Ephemeral keys generated, waiting for the peer's public key.
    KeySetup,
    /// Both keys present, encrypted channel derived. Chat is legal.
    Connected,
    /// Peer lost; teardown pending.
    Disconnected,
    /// Terminal. Keys wiped, channel discarded.
    Destroyed,
}

impl SessionState {
    /// Whether moving to `next` is a legal transition.
    ///
    /// Termination (`Destroyed`) is reachable from every state, and peer
    /// loss (`Disconnected`) from any state past `Init`; everything else
    /// follows the forward-only table.
    pub fn can_transition(self, next: SessionState) -> bool {
        if next == SessionState::Destroyed {
            return self != SessionState::Destroyed;
        }
        if next == SessionState::Disconnected {
            return !matches!(
                self,
                SessionState::Init | SessionState::Disconnected | SessionState::Destroyed
            );
        }
        matches!(
            (self, next),
            (SessionState::Init, SessionState::Searching)
                | (SessionState::Searching, SessionState::PeerFound)
                | (SessionState::PeerFound, SessionState::KeySetup)
                | (SessionState::KeySetup, SessionState::Connected)
        )
    }

    /// Advance to `next`, failing with a session-invalid error on any
    /// illegal transition.
    pub fn advance(&mut self, next: SessionState) -> Result<(), ChatError> {
        if !self.can_transition(next) {
            return Err(ChatError::SessionInvalid);
        }
        *self = next;
        Ok(())
    }

    /// Whether `send_message` is legal in this state.
    pub fn can_send(self) -> bool {
        self == SessionState::Connected
    }

    /// Whether the session has reached its terminal state.
    pub fn is_terminal(self) -> bool {
        self == SessionState::Destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn happy_path_is_legal() {
        let mut s = Init;
        for next in [Searching, PeerFound, KeySetup, Connected, Disconnected, Destroyed] {
            s.advance(next).unwrap();
        }
        assert!(s.is_terminal());
    }

    #[test]
    fn backward_and_skipping_transitions_rejected() {
        let mut s = Searching;
        assert_eq!(s.advance(Init), Err(ChatError::SessionInvalid));
        assert_eq!(s.advance(Connected), Err(ChatError::SessionInvalid));
        assert_eq!(s, Searching);
    }

    #[test]
    fn peer_loss_reachable_mid_handshake() {
        for state in [Searching, PeerFound, KeySetup, Connected] {
            let mut s = state;
            s.advance(Disconnected).unwrap();
        }
        assert_eq!(Init.advance(Disconnected), Err(ChatError::SessionInvalid));
    }

    #[test]
    fn destroy_reachable_from_any_state() {
        for state in [Init, Searching, PeerFound, KeySetup, Connected, Disconnected] {
            let mut s = state;
            s.advance(Destroyed).unwrap();
        }
    }

    #[test]
    fn destroyed_is_terminal() {
        let mut s = Destroyed;
        assert_eq!(s.advance(Searching), Err(ChatError::SessionInvalid));
        assert_eq!(s.advance(Destroyed), Err(ChatError::SessionInvalid));
    }

    #[test]
    fn send_only_when_connected() {
        assert!(Connected.can_send());
        for state in [Init, Searching, PeerFound, KeySetup, Disconnected, Destroyed] {
            assert!(!state.can_send());
        }
    }
}
