//! XHR long-polling transport, SockJS style.
//!
//! Each connection opens a session `{base}/{server}/{session}`. One
//! `POST .../xhr` is kept in flight at a time to receive frames; outbound
//! frames go out as a JSON array with `POST .../xhr_send`. The broker
//! answers a poll with one of `o` (open), `h` (heartbeat), `a[...]`
//! (messages) or `c[code,reason]` (close).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::NetError;
use crate::transport::{host_of, Connection, Connector, TRANSPORT_QUEUE};

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq)]
enum PollFrame {
    Open,
    Heartbeat,
    Messages(Vec<String>),
    Close(String),
}

fn parse_poll_body(body: &str) -> Result<Vec<PollFrame>, NetError> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_poll_frame)
        .collect()
}

fn parse_poll_frame(line: &str) -> Result<PollFrame, NetError> {
    let mut chars = line.chars();
    let tag = chars.next();
    match (tag, chars.as_str()) {
        (Some('o'), "") => Ok(PollFrame::Open),
        (Some('h'), "") => Ok(PollFrame::Heartbeat),
        (Some('a'), batch) => serde_json::from_str(batch)
            .map(PollFrame::Messages)
            .map_err(|e| NetError::Poll(format!("bad message batch: {e}"))),
        (Some('c'), reason) => Ok(PollFrame::Close(reason.to_string())),
        _ => Err(NetError::Poll(format!("unknown frame {line:?}"))),
    }
}

/// Map a broker WebSocket URL to the polling endpoint on the same host.
pub fn poll_url_for(ws_url: &str) -> String {
    if let Some(rest) = ws_url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = ws_url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        ws_url.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct LongPollConnector {
    base_url: String,
    client: reqwest::Client,
}

impl LongPollConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn session_url(&self) -> String {
        let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        format!("{}/{:03}/{nanos:08x}{seq:04x}", self.base_url, seq % 1000)
    }
}

async fn poll(client: &reqwest::Client, session: &str) -> Result<Vec<PollFrame>, NetError> {
    let response = client
        .post(format!("{session}/xhr"))
        .send()
        .await
        .map_err(|e| NetError::Poll(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(NetError::Poll(format!("poll answered {status}")));
    }
    let body = response
        .text()
        .await
        .map_err(|e| NetError::Poll(e.to_string()))?;
    parse_poll_body(&body)
}

async fn send_frames(
    client: &reqwest::Client,
    session: &str,
    frames: &[String],
) -> Result<(), NetError> {
    let body = serde_json::to_string(frames).map_err(|e| NetError::Poll(e.to_string()))?;
    let response = client
        .post(format!("{session}/xhr_send"))
        .header(reqwest::header::CONTENT_TYPE, "text/plain")
        .body(body)
        .send()
        .await
        .map_err(|e| NetError::Poll(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(NetError::Poll(format!("send answered {status}")));
    }
    Ok(())
}

#[async_trait]
impl Connector for LongPollConnector {
    async fn connect(&self) -> Result<Connection, NetError> {
        let session = self.session_url();
        let opened = poll(&self.client, &session)
            .await
            .map_err(|e| NetError::Connect(e.to_string()))?;
        if opened.first() != Some(&PollFrame::Open) {
            return Err(NetError::Connect(format!("no open frame from {session}")));
        }
        debug!(session = %session, "Long-poll session opened");

        let (out_tx, mut out_rx) = mpsc::channel::<String>(TRANSPORT_QUEUE);
        let (in_tx, in_rx) = mpsc::channel::<String>(TRANSPORT_QUEUE);

        let client = self.client.clone();
        let poll_session = session.clone();
        let reader = tokio::spawn(async move {
            loop {
                let frames = match poll(&client, &poll_session).await {
                    Ok(frames) => frames,
                    Err(e) => {
                        warn!(error = %e, "Long-poll receive failed");
                        return;
                    }
                };
                for frame in frames {
                    match frame {
                        PollFrame::Messages(batch) => {
                            for text in batch {
                                if in_tx.send(text).await.is_err() {
                                    return;
                                }
                            }
                        }
                        PollFrame::Close(reason) => {
                            debug!(reason = %reason, "Broker closed the long-poll session");
                            return;
                        }
                        PollFrame::Open | PollFrame::Heartbeat => {}
                    }
                }
            }
        });

        let client = self.client.clone();
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = send_frames(&client, &session, &[text]).await {
                    warn!(error = %e, "Long-poll send failed");
                    break;
                }
            }
            reader.abort();
        });

        Ok(Connection {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    fn host(&self) -> String {
        host_of(&self.base_url)
    }
}
