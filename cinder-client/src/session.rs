//! Session driver.
//!
//! Owns the relay link and the session engine and runs them as one task.
//! Two event sources feed it: inbound relay traffic and user commands.
//! The UI consumes an unbounded event stream, so the driver never blocks
//! on presentation, and a peer-lost event can always preempt a pending
//! user command.

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use cinder_core::envelope::CLOSE_ROOM_FULL;
use cinder_core::{ChatError, ChatSession, SessionEvent, SessionOutput, SessionState};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::relay::{LinkEvent, RelayLink};
use crate::validate;

/// User commands accepted by the driver.
#[derive(Debug)]
enum Command {
    Send(String),
    Quit,
}

/// Handle for issuing commands to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Queue an outgoing message.
    ///
    /// Delivery is asynchronous; rejections (wrong state, rate limit)
    /// come back as error events on the session's event stream.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ClientError> {
        self.cmd
            .send(Command::Send(text.into()))
            .await
            .map_err(|_| ClientError::SessionClosed)
    }

    /// Terminate the session. Keys are wiped and the transport closed.
    pub async fn quit(&self) -> Result<(), ClientError> {
        self.cmd
            .send(Command::Quit)
            .await
            .map_err(|_| ClientError::SessionClosed)
    }
}

/// Start a session: validate the room code, connect to the relay, send
/// JOIN, and spawn the driver.
///
/// Returns the command handle and the UI event stream. The first event is
/// always `Searching`.
pub async fn start(
    config: ClientConfig,
) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>), ClientError> {
    if !validate::room_code(&config.room) {
        return Err(ClientError::InvalidRoomCode);
    }

    let link = RelayLink::connect(&config.relay_url).await?;
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::channel(32);

    let mut driver = Driver {
        engine: ChatSession::new(),
        link,
        events: event_tx,
    };

    let outputs = driver.engine.begin(&config.room)?;
    driver.apply(outputs).await?;

    tokio::spawn(driver.run(cmd_rx, config.search_timeout));

    Ok((SessionHandle { cmd: cmd_tx }, event_rx))
}

struct Driver {
    engine: ChatSession,
    link: RelayLink,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Driver {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>, search_timeout: std::time::Duration) {
        let search_deadline = tokio::time::Instant::now() + search_timeout;

        loop {
            let searching = self.engine.state() == SessionState::Searching;

            tokio::select! {
                _ = tokio::time::sleep_until(search_deadline), if searching => {
                    self.emit(SessionEvent::error(&ChatError::SessionTimeout));
                    self.teardown().await;
                    return;
                }

                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Send(text)) => {
                        match self.engine.send_text(&text) {
                            Ok(envelope) => {
                                if self.link.send(&envelope).await.is_err() {
                                    self.emit(SessionEvent::error(&ChatError::Network(
                                        "send failed".into(),
                                    )));
                                    self.teardown().await;
                                    return;
                                }
                            }
                            // Wrong state or rate limit: non-fatal.
                            Err(err) => self.emit(SessionEvent::error(&err)),
                        }
                    }
                    Some(Command::Quit) | None => {
                        self.teardown().await;
                        return;
                    }
                },

                event = self.link.next_event() => match event {
                    LinkEvent::Envelope(envelope) => {
                        match self.engine.on_envelope(envelope) {
                            Ok(outputs) => {
                                if self.apply(outputs).await.is_err() {
                                    self.teardown().await;
                                    return;
                                }
                                // PEER_LEFT lands here: surface Disconnected,
                                // then run the same teardown path as quit.
                                if self.engine.state() == SessionState::Disconnected {
                                    self.teardown().await;
                                    return;
                                }
                            }
                            Err(fatal) => {
                                self.emit(SessionEvent::error(&fatal));
                                self.teardown().await;
                                return;
                            }
                        }
                    }
                    LinkEvent::Malformed => {
                        self.emit(SessionEvent::error(&ChatError::MalformedEnvelope));
                    }
                    LinkEvent::Closed(code) => {
                        self.emit(SessionEvent::error(&close_reason(
                            code,
                            self.engine.state(),
                        )));
                        self.teardown().await;
                        return;
                    }
                },
            }
        }
    }

    /// Push engine outputs to the wire and the UI stream.
    async fn apply(&mut self, outputs: Vec<SessionOutput>) -> Result<(), ClientError> {
        for output in outputs {
            match output {
                SessionOutput::Send(envelope) => self.link.send(&envelope).await?,
                SessionOutput::Emit(event) => self.emit(event),
            }
        }
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        // The UI having gone away must not stop teardown.
        let _ = self.events.send(event);
    }

    /// Wipe keys, discard the channel, close the transport. Every exit
    /// path (quit, peer loss, timeout, fatal error) funnels through here.
    async fn teardown(&mut self) {
        for output in self.engine.destroy() {
            if let SessionOutput::Emit(event) = output {
                self.emit(event);
            }
        }
        self.link.close().await;
    }
}

/// Translate a relay close into the error surfaced to the UI.
fn close_reason(code: Option<CloseCode>, state: SessionState) -> ChatError {
    match code {
        Some(CloseCode::Library(c)) if c == CLOSE_ROOM_FULL => {
            ChatError::Network("room full".into())
        }
        Some(CloseCode::Protocol) => ChatError::Network("relay rejected protocol".into()),
        _ if state == SessionState::Connected => ChatError::PeerDisconnect,
        _ => ChatError::Network("relay connection lost".into()),
    }
}
