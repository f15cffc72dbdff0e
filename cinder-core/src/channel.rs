//! Authenticated encrypted channel.
//!
//! Wraps the HKDF-derived shared key in ChaCha20-Poly1305. Ciphertext
//! layout is `nonce(12) || ciphertext || tag(16)`, with a fresh random
//! nonce per call. The channel is immutable once derived and is discarded,
//! never reused, when the session is destroyed.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::ChatError;

/// Nonce length for ChaCha20-Poly1305.
pub const NONCE_LEN: usize = 12;

/// Poly1305 authentication tag length.
pub const TAG_LEN: usize = 16;

/// An established two-party encryption context.
///
/// Does not implement `Clone`; the key has exactly one owner and is
/// zeroed when the channel drops.
pub struct EncryptedChannel {
    key: Zeroizing<[u8; 32]>,
}

impl EncryptedChannel {
    /// Bind a channel to a derived 32-byte key.
    pub(crate) fn new(key: [u8; 32]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Encrypt a UTF-8 text payload.
    ///
    /// Returns `nonce || ciphertext || tag`.
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, ChatError> {
        let cipher =
            ChaCha20Poly1305::new_from_slice(&*self.key).map_err(|_| ChatError::Internal)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .map_err(|_| ChatError::CryptoGen)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| ChatError::Internal)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Verify and decrypt a payload produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails with [`ChatError::CryptoDecrypt`] on a bad tag, truncated
    /// input, or non-UTF-8 plaintext. Never returns partial plaintext.
    pub fn decrypt(&self, data: &[u8]) -> Result<String, ChatError> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(ChatError::CryptoDecrypt);
        }

        let cipher =
            ChaCha20Poly1305::new_from_slice(&*self.key).map_err(|_| ChatError::Internal)?;
        let nonce = Nonce::from_slice(&data[..NONCE_LEN]);

        let plaintext = cipher
            .decrypt(nonce, &data[NONCE_LEN..])
            .map_err(|_| ChatError::CryptoDecrypt)?;

        String::from_utf8(plaintext).map_err(|_| ChatError::CryptoDecrypt)
    }
}
