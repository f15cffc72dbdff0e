//! WebSocket link to the relay.
//!
//! Thin wrapper: one outbound envelope per WebSocket text message, one
//! inbound text message parsed per event. Unparseable input is reported,
//! not fatal; the relay can legally carry bytes we do not understand.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use cinder_core::Envelope;

use crate::error::ClientError;

/// What the link produced on a receive.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    /// A parsed envelope.
    Envelope(Envelope),
    /// Text or binary that did not parse as an envelope.
    Malformed,
    /// The connection ended, with the close code if the relay sent one.
    Closed(Option<CloseCode>),
}

/// Does not implement `Clone`: the socket has one owner.
pub(crate) struct RelayLink {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayLink {
    pub(crate) async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        Ok(Self { ws })
    }

    pub(crate) async fn send(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        let json = envelope.to_json()?;
        self.ws
            .send(WsMessage::Text(json))
            .await
            .map_err(|e| ClientError::WebSocket(e.to_string()))
    }

    /// Next inbound event. Never errors; transport failure is `Closed`.
    pub(crate) async fn next_event(&mut self) -> LinkEvent {
        loop {
            match self.ws.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return match Envelope::from_json(&text) {
                        Ok(env) => LinkEvent::Envelope(env),
                        Err(_) => LinkEvent::Malformed,
                    };
                }
                Some(Ok(WsMessage::Binary(_))) => return LinkEvent::Malformed,
                Some(Ok(WsMessage::Close(frame))) => {
                    return LinkEvent::Closed(frame.map(|f| f.code));
                }
                Some(Ok(_)) => continue, // Ping/Pong
                Some(Err(_)) | None => return LinkEvent::Closed(None),
            }
        }
    }

    /// Best-effort graceful close.
    pub(crate) async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}
