//! Bidirectional text channel carrying the offer and the answer

use crate::{Error, Result};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use tokio::sync::mpsc;
use tracing::debug;

/// Text-message transport consumed by a negotiation session
#[async_trait]
pub trait SignalingChannel: Send {
    /// Block until the next text message arrives
    async fn recv_text(&mut self) -> Result<String>;

    /// Send one text message
    async fn send_text(&mut self, text: String) -> Result<()>;
}

#[async_trait]
impl SignalingChannel for WebSocket {
    async fn recv_text(&mut self) -> Result<String> {
        loop {
            match self.recv().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data).map_err(|e| {
                        Error::MalformedOffer(format!("Binary frame is not UTF-8: {}", e))
                    });
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    debug!("Skipping WebSocket control frame");
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(Error::Channel(
                        "WebSocket closed before a message arrived".to_string(),
                    ));
                }
                Some(Err(e)) => return Err(Error::Channel(format!("WebSocket error: {}", e))),
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.send(Message::Text(text))
            .await
            .map_err(|e| Error::Channel(format!("Failed to send WebSocket message: {}", e)))
    }
}

/// In-process channel, for embedding the recorder behind another transport
pub struct MpscChannel {
    rx: mpsc::Receiver<String>,
    tx: mpsc::Sender<String>,
}

impl MpscChannel {
    /// Create two connected endpoints
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (Self { rx: a_rx, tx: a_tx }, Self { rx: b_rx, tx: b_tx })
    }
}

#[async_trait]
impl SignalingChannel for MpscChannel {
    async fn recv_text(&mut self) -> Result<String> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| Error::Channel("Channel closed before a message arrived".to_string()))
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.tx
            .send(text)
            .await
            .map_err(|_| Error::Channel("Peer endpoint dropped".to_string()))
    }
}
