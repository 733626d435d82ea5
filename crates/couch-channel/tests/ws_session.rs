//! End-to-end tests against a real WebSocket peer.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use url::Url;

use couch_channel::{
    ChannelConfig, ChannelSupervisor, ChannelUpdate, UpdateKind, WsConnector,
};
use couch_core::{ChannelError, ChannelState, ChatMessage, SessionIdentity};

const TIMEOUT: Duration = Duration::from_secs(5);
const GOOD_TOKEN: &str = "good-token";

/// A peer that checks the token, greets, and echoes every chat frame back as
/// a counterpart message.
struct Peer {
    url: Url,
    paths: Arc<Mutex<Vec<String>>>,
    received: Arc<Mutex<Vec<Value>>>,
}

async fn boot_peer() -> Peer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let paths = Arc::new(Mutex::new(Vec::new()));
    let received = Arc::new(Mutex::new(Vec::new()));

    let (paths_srv, received_srv) = (Arc::clone(&paths), Arc::clone(&received));
    let _server = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let paths = Arc::clone(&paths_srv);
            let received = Arc::clone(&received_srv);
            let _conn = tokio::spawn(async move {
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    paths.lock().push(req.uri().path().to_string());
                    Ok(resp)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                else {
                    return;
                };
                let mut authed = false;
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else {
                        if msg.is_close() {
                            break;
                        }
                        continue;
                    };
                    let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                    received.lock().push(frame.clone());

                    if !authed {
                        if frame["access_token"] == GOOD_TOKEN {
                            authed = true;
                            ws.send(Message::text("Valid token")).await.unwrap();
                            ws.send(Message::text(
                                r#"{"messages":[{"sender":"therapist","text":"Hello! How can I help you today?"}]}"#,
                            ))
                            .await
                            .unwrap();
                        } else {
                            ws.send(Message::text("Invalid token")).await.unwrap();
                            let _ = ws.close(None).await;
                            break;
                        }
                        continue;
                    }

                    let reply = serde_json::json!({
                        "messages": [{
                            "sender": "therapist",
                            "text": format!("you said: {}", frame["message"].as_str().unwrap_or_default()),
                        }]
                    });
                    ws.send(Message::text(reply.to_string())).await.unwrap();
                }
            });
        }
    });

    Peer {
        url: Url::parse(&format!("ws://{addr}")).unwrap(),
        paths,
        received,
    }
}

fn supervisor(peer: &Peer) -> ChannelSupervisor {
    ChannelSupervisor::new(
        Arc::new(WsConnector::default()),
        peer.url.clone(),
        ChannelConfig::default(),
    )
}

fn identity(token: &str) -> SessionIdentity {
    SessionIdentity::new(token, "7", "Ada")
}

async fn wait_for(
    rx: &mut broadcast::Receiver<ChannelUpdate>,
    want: impl Fn(&ChannelUpdate) -> bool,
) -> ChannelUpdate {
    timeout(TIMEOUT, async {
        loop {
            let update = rx.recv().await.unwrap();
            if want(&update) {
                return update;
            }
        }
    })
    .await
    .expect("timed out waiting for update")
}

fn is_state(state: ChannelState) -> impl Fn(&ChannelUpdate) -> bool {
    move |u| u.kind == UpdateKind::State(state)
}

#[tokio::test]
async fn handshake_greeting_and_chat() {
    let peer = boot_peer().await;
    let mut sup = supervisor(&peer);
    let mut updates = sup.subscribe();

    let _ = sup.open("12".into(), &identity(GOOD_TOKEN)).unwrap();
    let _ = wait_for(&mut updates, is_state(ChannelState::Open)).await;
    let greeting = wait_for(&mut updates, |u| matches!(u.kind, UpdateKind::Message(_))).await;
    assert_eq!(
        greeting.kind,
        UpdateKind::Message(ChatMessage::counterpart("Hello! How can I help you today?"))
    );
    assert_eq!(peer.paths.lock().as_slice(), ["/ws/session/12"]);

    sup.send("hello").await.unwrap();
    let _ = wait_for(&mut updates, |u| {
        u.kind == UpdateKind::Message(ChatMessage::counterpart("you said: hello"))
    })
    .await;

    assert_eq!(
        sup.messages(),
        vec![
            ChatMessage::counterpart("Hello! How can I help you today?"),
            ChatMessage::user("hello"),
            ChatMessage::counterpart("you said: hello"),
        ]
    );
    let received = peer.received.lock().clone();
    assert_eq!(received[0], serde_json::json!({"access_token": GOOD_TOKEN}));
    assert_eq!(received[1], serde_json::json!({"message": "hello"}));

    sup.close();
    let _ = wait_for(&mut updates, is_state(ChannelState::Closed)).await;
}

#[tokio::test]
async fn rejected_token_fails_channel() {
    let peer = boot_peer().await;
    let mut sup = supervisor(&peer);
    let mut updates = sup.subscribe();

    let _ = sup.open("12".into(), &identity("stale")).unwrap();
    let _ = wait_for(&mut updates, |u| {
        u.kind == UpdateKind::Error(ChannelError::AuthRejected)
    })
    .await;
    assert_eq!(sup.state(), ChannelState::Failed);
    assert!(sup.messages().is_empty());
    assert!(matches!(
        sup.send("anyone?").await,
        Err(ChannelError::ChannelNotReady { .. })
    ));
}

#[tokio::test]
async fn unreachable_peer_fails_without_auth() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut sup = ChannelSupervisor::new(
        Arc::new(WsConnector::default()),
        Url::parse(&format!("ws://{addr}")).unwrap(),
        ChannelConfig::default(),
    );
    let mut updates = sup.subscribe();
    let _ = sup.open("12".into(), &identity(GOOD_TOKEN)).unwrap();

    let update = wait_for(&mut updates, |u| matches!(u.kind, UpdateKind::Error(_))).await;
    assert!(matches!(
        update.kind,
        UpdateKind::Error(ChannelError::Transport(_))
    ));
    assert_eq!(sup.state(), ChannelState::Failed);
}

#[tokio::test]
async fn switching_sessions_reconnects() {
    let peer = boot_peer().await;
    let mut sup = supervisor(&peer);
    let mut updates = sup.subscribe();

    let first = sup.open("12".into(), &identity(GOOD_TOKEN)).unwrap();
    let _ = wait_for(&mut updates, is_state(ChannelState::Open)).await;

    let second = sup.open("13".into(), &identity(GOOD_TOKEN)).unwrap();
    assert_ne!(first, second);
    let _ = wait_for(&mut updates, |u| {
        u.channel_id == first && u.kind == UpdateKind::State(ChannelState::Closed)
    })
    .await;
    let _ = wait_for(&mut updates, |u| {
        u.channel_id == second && u.kind == UpdateKind::State(ChannelState::Open)
    })
    .await;

    assert_eq!(
        peer.paths.lock().as_slice(),
        ["/ws/session/12", "/ws/session/13"]
    );
    assert_eq!(sup.session_id().map(|s| s.as_str()), Some("13"));
}
