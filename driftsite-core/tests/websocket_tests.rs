//! Tests for the websocket transport against a real in-process relay.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use driftsite_core::event::kinds;
use driftsite_core::relay::{fetch_remote_files, publish_event, RelayOutcome, WebSocketConnector};
use driftsite_core::{Collector, Event, EventTemplate, Keys, LocalSigner, Tag};

fn announcement(signer: &LocalSigner, path: &str) -> Event {
    signer.sign_template(EventTemplate {
        kind: kinds::FILE_ANNOUNCEMENT,
        created_at: 1_700_000_000,
        tags: vec![
            Tag::new("d", [path]),
            Tag::new("x", ["11".repeat(32)]),
        ],
        content: String::new(),
    })
}

/// A relay that acknowledges every EVENT and answers every REQ with the
/// given stored events.
async fn start_relay(stored: Vec<Event>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let stored = stored.clone();
            tokio::spawn(async move {
                let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
                while let Some(Ok(message)) = socket.next().await {
                    let Message::Text(text) = message else {
                        continue;
                    };
                    let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
                    match frame[0].as_str() {
                        Some("EVENT") => {
                            let id = frame[1]["id"].as_str().unwrap();
                            let reply = serde_json::json!(["OK", id, true, ""]).to_string();
                            socket.send(Message::Text(reply)).await.unwrap();
                        }
                        Some("REQ") => {
                            let sub = frame[1].as_str().unwrap();
                            for event in &stored {
                                let reply =
                                    serde_json::json!(["EVENT", sub, event]).to_string();
                                socket.send(Message::Text(reply)).await.unwrap();
                            }
                            let eose = serde_json::json!(["EOSE", sub]).to_string();
                            socket.send(Message::Text(eose)).await.unwrap();
                        }
                        _ => {}
                    }
                }
            });
        }
    });

    format!("ws://{addr}")
}

#[tokio::test]
async fn test_publish_over_a_real_websocket() {
    let url = start_relay(vec![]).await;
    let signer = LocalSigner::new(Keys::generate());
    let event = announcement(&signer, "/index.html");
    let collector = Collector::new();

    let outcome = publish_event(&WebSocketConnector::new(), &url, &event, &collector).await;
    assert_eq!(outcome, RelayOutcome::Accepted);
}

#[tokio::test]
async fn test_fetch_over_a_real_websocket() {
    let keys = Keys::generate();
    let signer = LocalSigner::new(keys.clone());
    let stored = vec![announcement(&signer, "/index.html")];
    let url = start_relay(stored).await;

    let remote = fetch_remote_files(
        &Arc::new(WebSocketConnector::new()),
        &[url],
        &keys.public_key_hex(),
        &Arc::new(Collector::new()),
        &CancellationToken::new(),
    )
    .await;

    assert!(!remote.inconclusive);
    assert_eq!(remote.entries.len(), 1);
    assert_eq!(remote.entries[0].path, "/index.html");
}

#[tokio::test]
async fn test_connection_refused_is_a_transport_error() {
    let signer = LocalSigner::new(Keys::generate());
    let event = announcement(&signer, "/index.html");
    let collector = Collector::new();

    // Port 9 (discard) is not listening.
    let outcome = publish_event(
        &WebSocketConnector::new(),
        "ws://127.0.0.1:9",
        &event,
        &collector,
    )
    .await;
    assert!(matches!(outcome, RelayOutcome::TransportError { .. }));
}
