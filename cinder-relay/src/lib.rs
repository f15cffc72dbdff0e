//! Blind relay server.
//!
//! Pairs connections into rooms of at most two and forwards payloads
//! verbatim between the two members. The relay parses exactly one thing:
//! the first (JOIN) envelope of each connection. Everything after that is
//! opaque bytes, never inspected, never logged.
//!
//! # Room discipline
//!
//! The registry is the only shared mutable state in the process. Joins are
//! a check-then-act sequence (check size, add, maybe broadcast PEER_FOUND),
//! so the whole sequence runs under one registry entry lock - two
//! simultaneous joiners of the same room cannot race past the cap.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use cinder_core::Envelope;

pub use cinder_core::envelope::CLOSE_ROOM_FULL;

/// At most two members per room. Invariant, not configuration.
const ROOM_CAP: usize = 2;

/// Outbound queue depth per connection. A member whose queue overflows is
/// treated as gone.
const MAX_QUEUE_DEPTH: usize = 32;

/// Connection cap per source address.
const MAX_CONN_PER_IP: usize = 8;

struct Member {
    id: u64,
    tx: mpsc::Sender<Message>,
}

struct Room {
    members: Vec<Member>,
}

/// Process-wide room registry.
///
/// Lifecycle is tied to the server: rooms are created on first join and
/// discarded when membership returns to zero.
pub struct RoomRegistry {
    rooms: DashMap<String, Room>,
    next_id: AtomicU64,
}

/// Result of a join attempt.
enum JoinOutcome {
    /// Joined; waiting for a peer.
    Waiting,
    /// Joined and the room is now paired; PEER_FOUND has been queued to
    /// both members.
    Paired,
    /// The room already had two members.
    Full,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a member to a room. Check, add, and the PEER_FOUND broadcast
    /// all happen under the entry lock.
    fn join(&self, code: &str, member: Member) -> JoinOutcome {
        match self.rooms.entry(code.to_owned()) {
            Entry::Occupied(mut entry) => {
                let room = entry.get_mut();
                if room.members.len() >= ROOM_CAP {
                    return JoinOutcome::Full;
                }
                room.members.push(member);
                if room.members.len() == ROOM_CAP {
                    let notice = peer_found_notice();
                    for m in &room.members {
                        let _ = m.tx.try_send(notice.clone());
                    }
                    JoinOutcome::Paired
                } else {
                    JoinOutcome::Waiting
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Room {
                    members: vec![member],
                });
                JoinOutcome::Waiting
            }
        }
    }

    /// Forward a payload verbatim to the *other* member of the room.
    /// Never echoes to the sender, never leaves the room.
    fn forward(&self, code: &str, from: u64, msg: Message) {
        if let Some(mut room) = self.rooms.get_mut(code) {
            let mut stale = None;
            for (idx, m) in room.members.iter().enumerate() {
                if m.id == from {
                    continue;
                }
                if m.tx.try_send(msg).is_err() {
                    // Queue overflow or a writer that already died: the
                    // member is gone, drop it so its connection unwinds.
                    stale = Some(idx);
                }
                break;
            }
            if let Some(idx) = stale {
                warn!(room = code, "dropping unresponsive member");
                room.members.remove(idx);
            }
        }
    }

    /// Remove a member; notify whoever remains and discard empty rooms.
    fn leave(&self, code: &str, id: u64) {
        if let Entry::Occupied(mut entry) = self.rooms.entry(code.to_owned()) {
            let room = entry.get_mut();
            room.members.retain(|m| m.id != id);
            if room.members.is_empty() {
                entry.remove();
                debug!(room = code, "room discarded");
            } else {
                let notice = peer_left_notice();
                for m in &room.members {
                    let _ = m.tx.try_send(notice.clone());
                }
            }
        }
    }

    /// Current membership of a room, for observability.
    pub fn room_size(&self, code: &str) -> usize {
        self.rooms.get(code).map(|r| r.members.len()).unwrap_or(0)
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn peer_found_notice() -> Message {
    // Infallible for a payload-free variant.
    Message::Text(
        Envelope::PeerFound
            .to_json()
            .unwrap_or_else(|_| String::new()),
    )
}

fn peer_left_notice() -> Message {
    Message::Text(
        Envelope::PeerLeft
            .to_json()
            .unwrap_or_else(|_| String::new()),
    )
}

/// Accept loop. Runs until the listener fails.
pub async fn run_server(listener: TcpListener) {
    let registry = Arc::new(RoomRegistry::new());
    let ip_conns: Arc<DashMap<IpAddr, usize>> = Arc::new(DashMap::new());

    while let Ok((stream, peer_addr)) = listener.accept().await {
        let ip = peer_addr.ip();
        {
            let mut count = ip_conns.entry(ip).or_insert(0);
            if *count >= MAX_CONN_PER_IP {
                warn!(%ip, "connection cap reached, refusing");
                continue;
            }
            *count += 1;
        }

        let registry = registry.clone();
        let ip_conns = ip_conns.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, registry).await {
                debug!(error = %e, "connection ended");
            }
            ip_conns.entry(ip).and_modify(|c| *c = c.saturating_sub(1));
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    registry: Arc<RoomRegistry>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws = accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    // First message must be a JOIN naming a non-empty room.
    let room_code = loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => match Envelope::from_json(&text) {
                Ok(Envelope::Join { room }) if !room.is_empty() => break room,
                _ => {
                    close_with(&mut ws_tx, CloseCode::Protocol, "protocol error").await;
                    return Ok(());
                }
            },
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(_)) | Some(Err(_)) | None => {
                close_with(&mut ws_tx, CloseCode::Protocol, "protocol error").await;
                return Ok(());
            }
        }
    };

    let id = registry.allocate_id();
    let (tx, mut rx) = mpsc::channel::<Message>(MAX_QUEUE_DEPTH);

    match registry.join(&room_code, Member { id, tx }) {
        JoinOutcome::Full => {
            info!(room = %room_code, "join rejected: room full");
            close_with(&mut ws_tx, CloseCode::Library(CLOSE_ROOM_FULL), "room full").await;
            return Ok(());
        }
        JoinOutcome::Waiting => {
            info!(room = %room_code, members = 1, "member joined");
        }
        JoinOutcome::Paired => {
            info!(room = %room_code, members = 2, "room paired");
        }
    }

    // Writer task owns the sink; it ends when the registry drops our tx.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // Forwarding path: opaque, tolerant of arbitrary bytes.
    while let Some(incoming) = ws_rx.next().await {
        match incoming {
            Ok(msg @ Message::Text(_)) | Ok(msg @ Message::Binary(_)) => {
                registry.forward(&room_code, id, msg);
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    registry.leave(&room_code, id);
    info!(room = %room_code, "member left");
    writer.abort();
    Ok(())
}

async fn close_with(
    ws_tx: &mut (impl SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    code: CloseCode,
    reason: &'static str,
) {
    let _ = ws_tx
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
    let _ = ws_tx.close().await;
}
