//! Broker transports.
//!
//! A [`Connector`] opens one text-frame duplex to the broker. The channel
//! task talks to it only through a pair of tokio mpsc queues, so tests can
//! substitute an in-memory transport for the WebSocket one.
//! [`FallbackConnector`] tries the WebSocket first and drops to long-polling
//! ([`crate::polling::LongPollConnector`]) when it cannot connect.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::NetError;

pub(crate) const TRANSPORT_QUEUE: usize = 64;

/// An open duplex of text frames. Dropping `outbound` closes the transport;
/// `inbound` yields `None` once the remote side is gone.
pub struct Connection {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Connection, NetError>;

    /// Value of the STOMP `host` header for this broker.
    fn host(&self) -> String;
}

/// STOMP over a plain WebSocket (`ws://` or `wss://`).
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Connection, NetError> {
        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| NetError::Connect(e.to_string()))?;
        debug!(url = %self.url, "WebSocket established");

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(TRANSPORT_QUEUE);
        let (in_tx, in_rx) = mpsc::channel::<String>(TRANSPORT_QUEUE);

        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(frame = ?frame, "Broker closed the WebSocket");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
            reader.abort();
        });

        Ok(Connection {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    fn host(&self) -> String {
        host_of(&self.url)
    }
}

/// Tries `primary` on every connect and `fallback` when it fails.
pub struct FallbackConnector {
    primary: Arc<dyn Connector>,
    fallback: Arc<dyn Connector>,
}

impl FallbackConnector {
    pub fn new(primary: Arc<dyn Connector>, fallback: Arc<dyn Connector>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Connector for FallbackConnector {
    async fn connect(&self) -> Result<Connection, NetError> {
        match self.primary.connect().await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                warn!(error = %e, "Primary transport unavailable, trying fallback");
                self.fallback.connect().await
            }
        }
    }

    fn host(&self) -> String {
        self.primary.host()
    }
}

/// Authority part of a URL, without scheme, credentials or path.
pub(crate) fn host_of(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    authority.to_string()
}
