//! Ephemeral key exchange engine.
//!
//! Generates a fresh Curve25519 keypair per session, holds the peer's
//! public key once it arrives, and derives the encrypted channel from the
//! X25519 agreement. Keys are single-use: nothing here survives the
//! session.
//!
//! # Erasure
//!
//! `wipe()` drops the private scalar, whose backing memory is zeroed on
//! drop by `x25519-dalek`'s zeroize support, and clears both public keys.
//! This is best-effort: copies the allocator or OS may have made cannot be
//! reached. The scalar is kept in exactly one fixed-size, zero-on-drop
//! container and the key agreement does not copy it.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::channel::EncryptedChannel;
use crate::error::ChatError;

/// Encoded public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// HKDF info string binding derived keys to this protocol.
const HKDF_INFO: &[u8] = b"cinder-session-v1";

/// Per-session key material and agreement logic.
///
/// Does not implement `Clone`: the private scalar must have exactly one
/// owner.
pub struct KeyExchange {
    secret: Option<StaticSecret>,
    public: Option<PublicKey>,
    peer: Option<PublicKey>,
}

impl KeyExchange {
    /// Create an empty engine. No keys exist until
    /// [`generate_ephemeral_keys`](Self::generate_ephemeral_keys).
    pub fn new() -> Self {
        Self {
            secret: None,
            public: None,
            peer: None,
        }
    }

    /// Generate a fresh ephemeral keypair from the OS random source.
    ///
    /// Must be called at most once per session; a second call fails with
    /// a session-invalid error. A failing random source is fatal
    /// ([`ChatError::CryptoGen`]) and must abort the session.
    pub fn generate_ephemeral_keys(&mut self) -> Result<(), ChatError> {
        if self.secret.is_some() {
            return Err(ChatError::SessionInvalid);
        }

        let mut seed = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|_| ChatError::CryptoGen)?;
        let secret = StaticSecret::from(seed);
        seed.zeroize();

        self.public = Some(PublicKey::from(&secret));
        self.secret = Some(secret);
        Ok(())
    }

    /// Fixed-length encoding of the local public key.
    ///
    /// Fails with [`ChatError::KeysNotPresent`] before generation or after
    /// [`wipe`](Self::wipe).
    pub fn public_key_bytes(&self) -> Result<[u8; PUBLIC_KEY_LEN], ChatError> {
        self.public
            .map(|p| p.to_bytes())
            .ok_or(ChatError::KeysNotPresent)
    }

    /// Validate and store the peer's public key.
    ///
    /// A second call overwrites, which callers must not rely on.
    pub fn load_peer_public_key(&mut self, raw: &[u8]) -> Result<(), ChatError> {
        let bytes: [u8; PUBLIC_KEY_LEN] =
            raw.try_into().map_err(|_| ChatError::PeerKeyMalformed)?;
        self.peer = Some(PublicKey::from(bytes));
        Ok(())
    }

    /// Whether both the local keypair and the peer public key are present.
    pub fn is_ready(&self) -> bool {
        self.secret.is_some() && self.peer.is_some()
    }

    /// Perform the X25519 agreement and derive the encrypted channel.
    ///
    /// Non-consuming: calling twice yields channels bound to the same
    /// shared secret. Fails unless both keys are present.
    pub fn derive_channel(&self) -> Result<EncryptedChannel, ChatError> {
        let secret = self.secret.as_ref().ok_or(ChatError::KeysNotPresent)?;
        let peer = self.peer.as_ref().ok_or(ChatError::KeysNotPresent)?;

        // SharedSecret zeroizes its memory when dropped at the end of
        // this scope.
        let shared = secret.diffie_hellman(peer);

        let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
        let mut key = [0u8; 32];
        hk.expand(HKDF_INFO, &mut key)
            .map_err(|_| ChatError::Internal)?;

        let channel = EncryptedChannel::new(key);
        key.zeroize();
        Ok(channel)
    }

    /// Drop all key references.
    ///
    /// The private scalar's backing memory is zeroed as it drops. Further
    /// key access fails with [`ChatError::KeysNotPresent`]. Idempotent.
    pub fn wipe(&mut self) {
        self.secret = None;
        self.public = None;
        self.peer = None;
    }
}

impl Default for KeyExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique_per_generation() {
        let mut a = KeyExchange::new();
        let mut b = KeyExchange::new();
        a.generate_ephemeral_keys().unwrap();
        b.generate_ephemeral_keys().unwrap();
        assert_ne!(a.public_key_bytes().unwrap(), b.public_key_bytes().unwrap());
    }

    #[test]
    fn generate_is_once_per_session() {
        let mut kx = KeyExchange::new();
        kx.generate_ephemeral_keys().unwrap();
        assert_eq!(kx.generate_ephemeral_keys(), Err(ChatError::SessionInvalid));
    }

    #[test]
    fn public_key_requires_generation() {
        let kx = KeyExchange::new();
        assert_eq!(kx.public_key_bytes(), Err(ChatError::KeysNotPresent));
    }

    #[test]
    fn peer_key_length_validated() {
        let mut kx = KeyExchange::new();
        assert_eq!(
            kx.load_peer_public_key(&[0u8; 31]),
            Err(ChatError::PeerKeyMalformed)
        );
        assert_eq!(
            kx.load_peer_public_key(&[0u8; 33]),
            Err(ChatError::PeerKeyMalformed)
        );
        kx.load_peer_public_key(&[7u8; 32]).unwrap();
    }

    #[test]
    fn derive_requires_both_keys() {
        let mut kx = KeyExchange::new();
        assert!(kx.derive_channel().is_err());

        kx.generate_ephemeral_keys().unwrap();
        assert_eq!(kx.derive_channel().err(), Some(ChatError::KeysNotPresent));

        kx.load_peer_public_key(&[7u8; 32]).unwrap();
        assert!(kx.derive_channel().is_ok());
    }

    #[test]
    fn both_sides_derive_the_same_channel() {
        let mut a = KeyExchange::new();
        let mut b = KeyExchange::new();
        a.generate_ephemeral_keys().unwrap();
        b.generate_ephemeral_keys().unwrap();
        a.load_peer_public_key(&b.public_key_bytes().unwrap()).unwrap();
        b.load_peer_public_key(&a.public_key_bytes().unwrap()).unwrap();

        let chan_a = a.derive_channel().unwrap();
        let chan_b = b.derive_channel().unwrap();

        let ct = chan_a.encrypt("cross check").unwrap();
        assert_eq!(chan_b.decrypt(&ct).unwrap(), "cross check");
    }

    #[test]
    fn deriving_twice_is_consistent() {
        let mut a = KeyExchange::new();
        let mut b = KeyExchange::new();
        a.generate_ephemeral_keys().unwrap();
        b.generate_ephemeral_keys().unwrap();
        a.load_peer_public_key(&b.public_key_bytes().unwrap()).unwrap();
        b.load_peer_public_key(&a.public_key_bytes().unwrap()).unwrap();

        let first = a.derive_channel().unwrap();
        let second = a.derive_channel().unwrap();
        let other = b.derive_channel().unwrap();

        let ct = first.encrypt("again").unwrap();
        assert_eq!(other.decrypt(&ct).unwrap(), "again");
        let ct2 = second.encrypt("again").unwrap();
        assert_eq!(other.decrypt(&ct2).unwrap(), "again");
    }

    #[test]
    fn wipe_denies_further_access() {
        let mut kx = KeyExchange::new();
        kx.generate_ephemeral_keys().unwrap();
        kx.load_peer_public_key(&[7u8; 32]).unwrap();
        kx.wipe();

        assert_eq!(kx.public_key_bytes(), Err(ChatError::KeysNotPresent));
        assert_eq!(kx.derive_channel().err(), Some(ChatError::KeysNotPresent));
        assert!(!kx.is_ready());
        // Idempotent.
        kx.wipe();
    }
}
