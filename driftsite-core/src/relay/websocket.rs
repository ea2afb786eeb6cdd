// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! WebSocket Transport
//!
//! Production [`RelayTransport`] over tokio-tungstenite. Supports both
//! `ws://` and `wss://` endpoints; one connection per publish or fetch,
//! never shared across tasks.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::messages::{ClientMessage, RelayMessage};
use super::transport::{RelayTransport, TransportConnector};
use super::RelayError;

/// A connected websocket to one relay.
pub struct WebSocketTransport {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: String,
}

#[async_trait]
impl RelayTransport for WebSocketTransport {
    async fn send(&mut self, frame: ClientMessage) -> Result<(), RelayError> {
        self.socket
            .send(Message::Text(frame.encode()))
            .await
            .map_err(|e| RelayError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<RelayMessage>, RelayError> {
        loop {
            match self.socket.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => match RelayMessage::parse(&text) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(e) => {
                        debug!(url = %self.url, error = %e, "skipping malformed frame");
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) => return Ok(None),
                // Pings are answered by tungstenite on the next write.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(RelayError::ReceiveFailed(e.to_string())),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.socket.close(None).await;
    }
}

/// Dials relays with `connect_async`.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        WebSocketConnector
    }
}

#[async_trait]
impl TransportConnector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, url: &str) -> Result<WebSocketTransport, RelayError> {
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(RelayError::ConnectionFailed(format!(
                "invalid relay URL scheme: {url}"
            )));
        }
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| RelayError::ConnectionFailed(e.to_string()))?;
        debug!(url, "relay connection established");
        Ok(WebSocketTransport {
            socket,
            url: url.to_string(),
        })
    }
}
