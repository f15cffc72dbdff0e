use std::time::Duration;

use cinder_core::Envelope;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use cinder_relay::{run_server, CLOSE_ROOM_FULL};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_relay() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        run_server(listener).await;
    });
    format!("ws://{}", addr)
}

async fn join(url: &str, room: &str) -> Ws {
    let (mut ws, _) = connect_async(url).await.unwrap();
    let join = Envelope::Join { room: room.into() }.to_json().unwrap();
    ws.send(Message::Text(join)).await.unwrap();
    ws
}

async fn next_text(ws: &mut Ws) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return text,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

async fn expect_close_code(ws: &mut Ws, expected: CloseCode) {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for close")
        {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(frame.code, expected);
                return;
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            other => panic!("expected close frame, got {:?}", other),
        }
    }
}

async fn expect_silence(ws: &mut Ws) {
    let res = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(res.is_err(), "expected no message, got {:?}", res);
}

#[tokio::test]
async fn pairing_notifies_both_members() {
    let url = start_relay().await;

    let mut a = join(&url, "ABCD1234").await;
    let mut b = join(&url, "ABCD1234").await;

    let found = Envelope::PeerFound.to_json().unwrap();
    assert_eq!(next_text(&mut a).await, found);
    assert_eq!(next_text(&mut b).await, found);
}

#[tokio::test]
async fn single_member_waits_silently() {
    let url = start_relay().await;
    let mut a = join(&url, "LONESOME1").await;
    expect_silence(&mut a).await;
}

#[tokio::test]
async fn forwards_verbatim_to_other_member_only() {
    let url = start_relay().await;

    let mut a = join(&url, "FWDROOM1").await;
    let mut b = join(&url, "FWDROOM1").await;
    next_text(&mut a).await; // PEER_FOUND
    next_text(&mut b).await;

    // Opaque payload: the relay must not care that this is not an envelope.
    let payload = "arbitrary \u{1F512} bytes, not even JSON";
    a.send(Message::Text(payload.into())).await.unwrap();

    assert_eq!(next_text(&mut b).await, payload);
    // Never echoed back to the sender.
    expect_silence(&mut a).await;
}

#[tokio::test]
async fn rooms_are_isolated() {
    let url = start_relay().await;

    let mut a1 = join(&url, "ROOMAAA1").await;
    let mut b1 = join(&url, "ROOMAAA1").await;
    let mut a2 = join(&url, "ROOMBBB2").await;
    next_text(&mut a1).await;
    next_text(&mut b1).await;

    a1.send(Message::Text("room one traffic".into()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut b1).await, "room one traffic");
    expect_silence(&mut a2).await;
}

#[tokio::test]
async fn third_joiner_rejected_and_room_survives() {
    let url = start_relay().await;

    let mut a = join(&url, "FULLROOM").await;
    let mut b = join(&url, "FULLROOM").await;
    next_text(&mut a).await;
    next_text(&mut b).await;

    let mut c = join(&url, "FULLROOM").await;
    expect_close_code(&mut c, CloseCode::Library(CLOSE_ROOM_FULL)).await;

    // The established pair is unaffected.
    a.send(Message::Text("still here".into())).await.unwrap();
    assert_eq!(next_text(&mut b).await, "still here");
}

#[tokio::test]
async fn first_message_must_be_join() {
    let url = start_relay().await;

    let (mut ws, _) = connect_async(&url).await.unwrap();
    ws.send(Message::Text("definitely not a join".into()))
        .await
        .unwrap();
    expect_close_code(&mut ws, CloseCode::Protocol).await;
}

#[tokio::test]
async fn join_with_empty_room_rejected() {
    let url = start_relay().await;

    let (mut ws, _) = connect_async(&url).await.unwrap();
    ws.send(Message::Text(r#"{"type":"JOIN","room":""}"#.into()))
        .await
        .unwrap();
    expect_close_code(&mut ws, CloseCode::Protocol).await;
}

#[tokio::test]
async fn signal_before_join_rejected() {
    let url = start_relay().await;

    let (mut ws, _) = connect_async(&url).await.unwrap();
    let signal = Envelope::key_exchange(&[0u8; 32]).to_json().unwrap();
    ws.send(Message::Text(signal)).await.unwrap();
    expect_close_code(&mut ws, CloseCode::Protocol).await;
}

#[tokio::test]
async fn departing_member_triggers_peer_left() {
    let url = start_relay().await;

    let mut a = join(&url, "GOODBYE1").await;
    let mut b = join(&url, "GOODBYE1").await;
    next_text(&mut a).await;
    next_text(&mut b).await;

    b.close(None).await.unwrap();

    let left = Envelope::PeerLeft.to_json().unwrap();
    assert_eq!(next_text(&mut a).await, left);
}

#[tokio::test]
async fn room_code_reusable_after_both_leave() {
    let url = start_relay().await;

    let mut a = join(&url, "RECYCLED1").await;
    let mut b = join(&url, "RECYCLED1").await;
    next_text(&mut a).await;
    next_text(&mut b).await;
    a.close(None).await.unwrap();
    b.close(None).await.unwrap();

    // Give the server a beat to unwind both connections.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut a2 = join(&url, "RECYCLED1").await;
    let mut b2 = join(&url, "RECYCLED1").await;
    let found = Envelope::PeerFound.to_json().unwrap();
    assert_eq!(next_text(&mut a2).await, found);
    assert_eq!(next_text(&mut b2).await, found);
}
