//! Wire envelope codec.
//!
//! JSON objects over a persistent bidirectional text connection:
//!
//! ```text
//! {"type":"JOIN","room":"<code>"}
//! {"type":"PEER_FOUND"}
//! {"type":"PEER_LEFT"}
//! {"type":"SIGNAL","kind":"KEY_EXCHANGE","key":"<base64>"}
//! {"type":"SIGNAL","kind":"MSG","payload":"<base64>"}
//! ```
//!
//! Envelopes are immutable once constructed. The relay parses only the
//! outer `type` tag of the first (JOIN) message; SIGNAL payloads are
//! opaque to it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Application close code sent by the relay when a room already has two
/// members. Distinct from the protocol-error close (1002) so clients can
/// tell the two apart.
pub const CLOSE_ROOM_FULL: u16 = 4000;

/// The outer tagged message exchanged over the relay link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// First (and only) client-originated control message: join a room.
    #[serde(rename = "JOIN")]
    Join {
        /// Room code, 8-16 character opaque token.
        room: String,
    },

    /// Relay -> both members, once the room reaches two.
    #[serde(rename = "PEER_FOUND")]
    PeerFound,

    /// Relay -> remaining member(s), on a member's disconnect.
    #[serde(rename = "PEER_LEFT")]
    PeerLeft,

    /// Peer-to-peer payload, forwarded opaquely by the relay.
    #[serde(rename = "SIGNAL")]
    Signal {
        /// The signal body.
        #[serde(flatten)]
        signal: Signal,
    },
}

/// Inner body of a SIGNAL envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Signal {
    /// Ephemeral public key announcement.
    #[serde(rename = "KEY_EXCHANGE")]
    KeyExchange {
        /// Base64 of the 32-byte Curve25519 public key.
        key: String,
    },

    /// Encrypted chat message.
    #[serde(rename = "MSG")]
    Msg {
        /// Base64 of nonce || ciphertext || tag.
        payload: String,
    },
}

impl Envelope {
    /// Build a KEY_EXCHANGE signal from raw public key bytes.
    pub fn key_exchange(key: &[u8]) -> Self {
        Self::Signal {
            signal: Signal::KeyExchange {
                key: BASE64.encode(key),
            },
        }
    }

    /// Build a MSG signal from raw ciphertext bytes.
    pub fn msg(ciphertext: &[u8]) -> Self {
        Self::Signal {
            signal: Signal::Msg {
                payload: BASE64.encode(ciphertext),
            },
        }
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String, ChatError> {
        serde_json::to_string(self).map_err(|_| ChatError::Internal)
    }

    /// Parse an envelope from the JSON wire form.
    pub fn from_json(text: &str) -> Result<Self, ChatError> {
        serde_json::from_str(text).map_err(|_| ChatError::MalformedEnvelope)
    }
}

impl Signal {
    /// Decode the base64 body of this signal.
    pub fn decode_body(&self) -> Result<Vec<u8>, ChatError> {
        let encoded = match self {
            Self::KeyExchange { key } => key,
            Self::Msg { payload } => payload,
        };
        BASE64
            .decode(encoded)
            .map_err(|_| ChatError::MalformedEnvelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_wire_form() {
        let env = Envelope::Join {
            room: "ABCD1234".into(),
        };
        let json = env.to_json().unwrap();
        assert_eq!(json, r#"{"type":"JOIN","room":"ABCD1234"}"#);
        assert_eq!(Envelope::from_json(&json).unwrap(), env);
    }

    #[test]
    fn control_wire_forms() {
        assert_eq!(
            Envelope::PeerFound.to_json().unwrap(),
            r#"{"type":"PEER_FOUND"}"#
        );
        assert_eq!(
            Envelope::PeerLeft.to_json().unwrap(),
            r#"{"type":"PEER_LEFT"}"#
        );
    }

    #[test]
    fn signal_kind_is_flattened() {
        let env = Envelope::key_exchange(&[1u8; 32]);
        let json = env.to_json().unwrap();
        assert!(json.contains(r#""type":"SIGNAL""#));
        assert!(json.contains(r#""kind":"KEY_EXCHANGE""#));

        let parsed = Envelope::from_json(&json).unwrap();
        match parsed {
            Envelope::Signal {
                signal: Signal::KeyExchange { .. },
            } => {}
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn signal_body_roundtrip() {
        let bytes = vec![0xde, 0xad, 0xbe, 0xef];
        let env = Envelope::msg(&bytes);
        match env {
            Envelope::Signal { signal } => {
                assert_eq!(signal.decode_body().unwrap(), bytes);
            }
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn malformed_json_is_an_envelope_error() {
        assert_eq!(
            Envelope::from_json("not json"),
            Err(ChatError::MalformedEnvelope)
        );
        assert_eq!(
            Envelope::from_json(r#"{"type":"BOGUS"}"#),
            Err(ChatError::MalformedEnvelope)
        );
    }

    #[test]
    fn bad_base64_body_rejected() {
        let signal = Signal::Msg {
            payload: "!!not-base64!!".into(),
        };
        assert_eq!(signal.decode_body(), Err(ChatError::MalformedEnvelope));
    }
}
