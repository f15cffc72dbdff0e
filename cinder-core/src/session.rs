//! Session engine.
//!
//! The authoritative record of session progress. The engine is pure: it
//! consumes relay envelopes and user commands and produces envelopes to
//! send plus events for the UI, without doing any I/O itself. The async
//! driver in the client crate owns the transport and feeds it.
//!
//! Error discipline: recoverable failures (bad envelope, failed decrypt,
//! rate-limit rejection) become non-fatal [`SessionEvent::Error`] outputs;
//! fatal ones (keygen failure) are returned as `Err` and the driver tears
//! the session down. Teardown always wipes key material, whichever path
//! reaches it.

use crate::channel::EncryptedChannel;
use crate::envelope::{Envelope, Signal};
use crate::error::ChatError;
use crate::keys::KeyExchange;
use crate::limiter::RateLimiter;
use crate::state::SessionState;

/// Events surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// JOIN sent, waiting to be paired.
    Searching,
    /// The relay paired us with a peer.
    UserFound,
    /// Ephemeral keys generated, exchange in flight.
    KeySetup,
    /// Encrypted channel established; chat is live.
    Connected,
    /// Decrypted message from the peer.
    Message(String),
    /// The peer left.
    Disconnected,
    /// Session torn down; keys wiped.
    Destroyed,
    /// Non-fatal error, with its stable code.
    Error {
        /// Stable numeric code (see [`ChatError::code`]).
        code: u16,
        /// Human-readable description.
        message: String,
    },
}

impl SessionEvent {
    /// Build an error event from a protocol error.
    pub fn error(err: &ChatError) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// One output of an engine step: either something to put on the wire or
/// something to show the user.
#[derive(Debug)]
pub enum SessionOutput {
    /// Envelope to send through the relay.
    Send(Envelope),
    /// Event for the UI stream.
    Emit(SessionEvent),
}

/// The client-side session engine.
///
/// Owns the state machine, the key exchange engine, the derived channel,
/// and the rate limiter. Does not implement `Clone`.
pub struct ChatSession {
    state: SessionState,
    keys: KeyExchange,
    channel: Option<EncryptedChannel>,
    limiter: RateLimiter,
}

impl ChatSession {
    /// Create a fresh session in `Init` with the default rate budget.
    pub fn new() -> Self {
        Self::with_limiter(RateLimiter::default())
    }

    /// Create a fresh session with a caller-supplied rate limiter.
    pub fn with_limiter(limiter: RateLimiter) -> Self {
        Self {
            state: SessionState::Init,
            keys: KeyExchange::new(),
            channel: None,
            limiter,
        }
    }

    /// Current state, read by the driver before externally-visible actions.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Start the session: transition to `Searching` and produce the JOIN.
    ///
    /// Room code format validation is the caller's job.
    pub fn begin(&mut self, room: &str) -> Result<Vec<SessionOutput>, ChatError> {
        self.state.advance(SessionState::Searching)?;
        Ok(vec![
            SessionOutput::Send(Envelope::Join { room: room.to_owned() }),
            SessionOutput::Emit(SessionEvent::Searching),
        ])
    }

    /// React to an envelope from the relay.
    ///
    /// `Err` means a fatal failure: the driver must run
    /// [`destroy`](Self::destroy) and stop.
    pub fn on_envelope(&mut self, envelope: Envelope) -> Result<Vec<SessionOutput>, ChatError> {
        if self.state.is_terminal() {
            return Ok(Vec::new());
        }

        match envelope {
            Envelope::PeerFound => self.on_peer_found(),
            Envelope::PeerLeft => Ok(self.on_peer_left()),
            Envelope::Signal { signal } => Ok(self.on_signal(signal)),
            // The relay never sends JOIN; a client that does is misbehaving.
            Envelope::Join { .. } => Ok(vec![SessionOutput::Emit(SessionEvent::error(
                &ChatError::MalformedEnvelope,
            ))]),
        }
    }

    /// Peer paired: advance through `PeerFound` into `KeySetup`, generate
    /// the ephemeral keypair, and announce our public key.
    fn on_peer_found(&mut self) -> Result<Vec<SessionOutput>, ChatError> {
        if self.state.advance(SessionState::PeerFound).is_err() {
            return Ok(vec![SessionOutput::Emit(SessionEvent::error(
                &ChatError::SessionInvalid,
            ))]);
        }
        self.state.advance(SessionState::KeySetup)?;

        // Keygen failure is fatal; the driver aborts the session.
        self.keys.generate_ephemeral_keys()?;
        let public = self.keys.public_key_bytes()?;

        Ok(vec![
            SessionOutput::Emit(SessionEvent::UserFound),
            SessionOutput::Emit(SessionEvent::KeySetup),
            SessionOutput::Send(Envelope::key_exchange(&public)),
        ])
    }

    /// Peer gone: mark `Disconnected` (the driver follows with teardown).
    fn on_peer_left(&mut self) -> Vec<SessionOutput> {
        // A peer bailing mid-handshake disconnects us the same as one
        // bailing mid-chat. From Init the notice is spurious; ignore it.
        let _ = self.state.advance(SessionState::Disconnected);
        vec![SessionOutput::Emit(SessionEvent::Disconnected)]
    }

    fn on_signal(&mut self, signal: Signal) -> Vec<SessionOutput> {
        match signal {
            Signal::KeyExchange { .. } => self.on_peer_key(&signal),
            Signal::Msg { .. } => self.on_ciphertext(&signal),
        }
    }

    /// Store the peer's public key; with both keys present, derive the
    /// channel and go live.
    fn on_peer_key(&mut self, signal: &Signal) -> Vec<SessionOutput> {
        if self.state != SessionState::KeySetup {
            return vec![SessionOutput::Emit(SessionEvent::error(
                &ChatError::SessionInvalid,
            ))];
        }

        let step = signal
            .decode_body()
            .and_then(|raw| self.keys.load_peer_public_key(&raw))
            .and_then(|_| self.keys.derive_channel())
            .and_then(|channel| {
                self.state.advance(SessionState::Connected)?;
                self.channel = Some(channel);
                Ok(())
            });

        match step {
            Ok(()) => vec![SessionOutput::Emit(SessionEvent::Connected)],
            Err(err) => vec![SessionOutput::Emit(SessionEvent::error(&err))],
        }
    }

    /// Decrypt an inbound MSG signal.
    ///
    /// A decrypt attempted before the channel is derived fails cleanly,
    /// it does not crash the session.
    fn on_ciphertext(&mut self, signal: &Signal) -> Vec<SessionOutput> {
        let channel = match self.channel.as_ref() {
            Some(c) => c,
            None => {
                return vec![SessionOutput::Emit(SessionEvent::error(
                    &ChatError::ChannelNotReady,
                ))]
            }
        };

        let step = signal
            .decode_body()
            .and_then(|bytes| channel.decrypt(&bytes));

        match step {
            Ok(text) => vec![SessionOutput::Emit(SessionEvent::Message(text))],
            Err(err) => vec![SessionOutput::Emit(SessionEvent::error(&err))],
        }
    }

    /// Encrypt an outbound message.
    ///
    /// Legal only in `Connected`; in any other state this is a
    /// side-effect-free error (the rate limiter is not consulted and the
    /// channel is untouched).
    pub fn send_text(&mut self, text: &str) -> Result<Envelope, ChatError> {
        if !self.state.can_send() {
            return Err(ChatError::SessionInvalid);
        }
        if !self.limiter.check() {
            return Err(ChatError::RateLimited);
        }

        let channel = self.channel.as_ref().ok_or(ChatError::ChannelNotReady)?;
        let ciphertext = channel.encrypt(text)?;
        Ok(Envelope::msg(&ciphertext))
    }

    /// Tear the session down: wipe keys, discard the channel, reach the
    /// terminal state. Idempotent; later calls produce nothing.
    pub fn destroy(&mut self) -> Vec<SessionOutput> {
        if self.state.is_terminal() {
            return Vec::new();
        }

        self.keys.wipe();
        self.channel = None;
        let _ = self.state.advance(SessionState::Destroyed);
        vec![SessionOutput::Emit(SessionEvent::Destroyed)]
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        // Wipe even if the driver never reached teardown.
        if !self.state.is_terminal() {
            let _ = self.destroy();
        }
    }
}
