//! Per-room realtime chat channel.
//!
//! The channel runs in its own tokio task. The owning view talks to it
//! through a [`ChannelHandle`] (commands in) and a notification receiver
//! (events out), mirroring a command/notification event loop. Delivery is
//! at-most-once: messages published while the broker is unreachable are
//! dropped, and nothing is replayed after a reconnect.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use walkmate_shared::constants::{RECONNECT_DELAY_MS, STOMP_HANDSHAKE_TIMEOUT_SECS};
use walkmate_shared::stomp::{Command, Frame};
use walkmate_shared::{ChatMessage, ChatRoomId};

use crate::error::NetError;
use crate::messages::{decode_message_frame, publish_frame, subscribe_frame};
use crate::transport::{Connection, Connector};

const COMMAND_QUEUE: usize = 64;
const NOTIFICATION_QUEUE: usize = 256;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the channel task.
#[derive(Debug)]
pub enum ChannelCommand {
    /// Publish a chat event to the room.
    Publish(ChatMessage),
    /// Send DISCONNECT and stop reconnecting.
    Shutdown,
}

/// Notifications sent *from* the channel task to the owning view.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelNotification {
    /// Handshake done and the room topic is subscribed.
    Connected,
    /// The broker became unreachable; a reconnect is scheduled.
    Disconnected { reason: String },
    /// A chat event arrived on the room topic.
    MessageReceived(ChatMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    /// The task has exited; the handle is inert.
    Closed,
}

/// Channel tuning.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Bearer token forwarded in the STOMP CONNECT frame.
    pub access_token: Option<String>,
    /// Fixed delay between losing the broker and the next attempt.
    pub reconnect_delay: Duration,
    /// How long to wait for CONNECTED after opening the transport.
    pub handshake_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            handshake_timeout: Duration::from_secs(STOMP_HANDSHAKE_TIMEOUT_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owned handle to a running channel. Dropping it deactivates the channel.
pub struct ChannelHandle {
    room: ChatRoomId,
    cmd_tx: mpsc::Sender<ChannelCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    pub fn room(&self) -> ChatRoomId {
        self.room
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// A receiver that observes connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Queue a chat event for publishing.
    ///
    /// Never blocks. While the broker is unreachable the event is dropped
    /// and `NetError::NotConnected` is returned; it is not queued for later.
    pub fn publish(&self, message: ChatMessage) -> Result<(), NetError> {
        if message.chat_room_id() != self.room {
            return Err(NetError::WrongRoom {
                expected: self.room,
                got: message.chat_room_id(),
            });
        }

        if self.task.is_none() {
            return Err(NetError::ChannelClosed);
        }

        match self.state() {
            ConnectionState::Connected => {}
            ConnectionState::Closed => return Err(NetError::ChannelClosed),
            state => {
                warn!(
                    room = %self.room,
                    kind = ?message.kind(),
                    state = ?state,
                    "Dropping message published while disconnected"
                );
                return Err(NetError::NotConnected);
            }
        }

        self.cmd_tx
            .try_send(ChannelCommand::Publish(message))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => NetError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => NetError::ChannelClosed,
            })
    }

    /// Stop the channel. Safe to call any number of times.
    pub fn deactivate(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        if self.cmd_tx.try_send(ChannelCommand::Shutdown).is_err() {
            // Queue full or task already gone: cut it off directly.
            task.abort();
        }
        info!(room = %self.room, "Channel deactivated");
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.deactivate();
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Spawn the channel task for `room`.
///
/// Returns the owning handle and the notification receiver. The task
/// connects immediately and keeps reconnecting, with a fixed delay and no
/// attempt limit, until the handle is deactivated or dropped.
pub fn spawn_channel(
    connector: Arc<dyn Connector>,
    room: ChatRoomId,
    config: ChannelConfig,
) -> (ChannelHandle, mpsc::Receiver<ChannelNotification>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<ChannelCommand>(COMMAND_QUEUE);
    let (notif_tx, notif_rx) = mpsc::channel::<ChannelNotification>(NOTIFICATION_QUEUE);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

    let task = tokio::spawn(run_channel(
        connector, room, config, cmd_rx, notif_tx, state_tx,
    ));

    let handle = ChannelHandle {
        room,
        cmd_tx,
        state_rx,
        task: Some(task),
    };
    (handle, notif_rx)
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

async fn run_channel(
    connector: Arc<dyn Connector>,
    room: ChatRoomId,
    config: ChannelConfig,
    mut cmd_rx: mpsc::Receiver<ChannelCommand>,
    notif_tx: mpsc::Sender<ChannelNotification>,
    state_tx: watch::Sender<ConnectionState>,
) {
    // Only the first failure after being up (or at startup) is reported.
    let mut announced_down = false;

    loop {
        state_tx.send_replace(ConnectionState::Connecting);

        let opened = tokio::select! {
            res = open_session(connector.as_ref(), room, &config) => res,
            _ = until_shutdown(&mut cmd_rx, room) => break,
        };

        let end = match opened {
            Ok(mut conn) => {
                announced_down = false;
                state_tx.send_replace(ConnectionState::Connected);
                info!(room = %room, topic = %room.to_topic(), "Channel connected");
                let _ = notif_tx.send(ChannelNotification::Connected).await;

                let end = pump(&mut conn, room, &mut cmd_rx, &notif_tx).await;
                if let SessionEnd::Shutdown = end {
                    let _ = conn.outbound.send(Frame::disconnect().encode()).await;
                }
                end
            }
            Err(e) => SessionEnd::Lost(e.to_string()),
        };

        match end {
            SessionEnd::Shutdown => break,
            SessionEnd::Lost(reason) => {
                state_tx.send_replace(ConnectionState::Disconnected);
                warn!(
                    room = %room,
                    reason = %reason,
                    retry_in_ms = config.reconnect_delay.as_millis() as u64,
                    "Channel lost broker connection"
                );
                if !announced_down {
                    announced_down = true;
                    let _ = notif_tx
                        .send(ChannelNotification::Disconnected { reason })
                        .await;
                }
            }
        }

        if wait_reconnect(&mut cmd_rx, room, config.reconnect_delay).await {
            break;
        }
    }

    state_tx.send_replace(ConnectionState::Closed);
    info!(room = %room, "Channel task terminated");
}

/// Open the transport, perform the STOMP handshake and subscribe.
async fn open_session(
    connector: &dyn Connector,
    room: ChatRoomId,
    config: &ChannelConfig,
) -> Result<Connection, NetError> {
    let mut conn = connector.connect().await?;

    let connect = Frame::connect(&connector.host(), config.access_token.as_deref());
    conn.outbound
        .send(connect.encode())
        .await
        .map_err(|_| NetError::TransportClosed)?;

    tokio::time::timeout(config.handshake_timeout, await_connected(&mut conn))
        .await
        .map_err(|_| NetError::Handshake("timed out waiting for CONNECTED".into()))??;

    conn.outbound
        .send(subscribe_frame(room).encode())
        .await
        .map_err(|_| NetError::TransportClosed)?;

    Ok(conn)
}

async fn await_connected(conn: &mut Connection) -> Result<(), NetError> {
    loop {
        let raw = conn.inbound.recv().await.ok_or(NetError::TransportClosed)?;
        let Some(frame) = Frame::decode(&raw).map_err(|e| NetError::Handshake(e.to_string()))?
        else {
            continue;
        };

        match frame.command {
            Command::Connected => {
                debug!(version = ?frame.get_header("version"), "STOMP session established");
                return Ok(());
            }
            Command::Error => {
                let reason = frame.get_header("message").unwrap_or("unspecified").to_string();
                return Err(NetError::Rejected(reason));
            }
            other => debug!(command = %other, "Ignoring frame before CONNECTED"),
        }
    }
}

/// Drive one connected session until shutdown or transport loss.
async fn pump(
    conn: &mut Connection,
    room: ChatRoomId,
    cmd_rx: &mut mpsc::Receiver<ChannelCommand>,
    notif_tx: &mpsc::Sender<ChannelNotification>,
) -> SessionEnd {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(ChannelCommand::Publish(message)) => {
                    let frame = match publish_frame(&message) {
                        Ok(f) => f,
                        Err(e) => {
                            error!(room = %room, error = %e, "Failed to encode chat message");
                            continue;
                        }
                    };
                    if conn.outbound.send(frame.encode()).await.is_err() {
                        warn!(room = %room, kind = ?message.kind(), "Message lost: transport closed during publish");
                        return SessionEnd::Lost("transport closed during publish".into());
                    }
                    debug!(room = %room, kind = ?message.kind(), "Published chat message");
                }
                Some(ChannelCommand::Shutdown) | None => return SessionEnd::Shutdown,
            },

            raw = conn.inbound.recv() => {
                let Some(raw) = raw else {
                    return SessionEnd::Lost("transport closed".into());
                };
                let frame = match Frame::decode(&raw) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(room = %room, error = %e, "Discarding malformed frame");
                        continue;
                    }
                };

                match frame.command {
                    Command::Message => {
                        if let Some(message) = decode_message_frame(&frame, room) {
                            let _ = notif_tx
                                .send(ChannelNotification::MessageReceived(message))
                                .await;
                        }
                    }
                    Command::Error => {
                        let reason = frame.get_header("message").unwrap_or("unspecified");
                        return SessionEnd::Lost(format!("broker error: {reason}"));
                    }
                    other => debug!(room = %room, command = %other, "Ignoring frame"),
                }
            }
        }
    }
}

/// Sleep out the reconnect delay while still honouring commands.
/// Returns `true` if the channel was shut down meanwhile.
async fn wait_reconnect(
    cmd_rx: &mut mpsc::Receiver<ChannelCommand>,
    room: ChatRoomId,
    delay: Duration,
) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = until_shutdown(cmd_rx, room) => true,
    }
}

/// Resolves on shutdown; publishes seen while waiting are dropped.
async fn until_shutdown(cmd_rx: &mut mpsc::Receiver<ChannelCommand>, room: ChatRoomId) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            ChannelCommand::Publish(message) => {
                warn!(room = %room, kind = ?message.kind(), "Dropping message published while disconnected");
            }
            ChannelCommand::Shutdown => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use walkmate_shared::{MessageType, UserId};

    use crate::transport::FallbackConnector;

    const ROOM: ChatRoomId = ChatRoomId(3);

    /// Broker side of an in-memory connection.
    struct ServerSide {
        to_client: mpsc::Sender<String>,
        from_client: mpsc::Receiver<String>,
    }

    impl ServerSide {
        async fn next_frame(&mut self) -> Frame {
            loop {
                let raw = self.from_client.recv().await.expect("client hung up");
                if let Some(frame) = Frame::decode(&raw).unwrap() {
                    return frame;
                }
            }
        }

        async fn handshake(&mut self) {
            let connect = self.next_frame().await;
            assert_eq!(connect.command, Command::Connect);
            assert_eq!(connect.get_header("accept-version"), Some("1.2"));
            self.to_client
                .send(Frame::new(Command::Connected).header("version", "1.2").encode())
                .await
                .unwrap();

            let subscribe = self.next_frame().await;
            assert_eq!(subscribe.command, Command::Subscribe);
            assert_eq!(subscribe.get_header("destination"), Some("/topic/chat/3"));
        }

        async fn deliver(&self, message: &ChatMessage) {
            let frame = Frame::new(Command::Message)
                .header("destination", message.chat_room_id().to_topic())
                .header("subscription", "sub-0")
                .body(message.to_json().unwrap());
            self.to_client.send(frame.encode()).await.unwrap();
        }
    }

    struct MemoryConnector {
        servers: mpsc::UnboundedSender<ServerSide>,
        refuse_first: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn connect(&self) -> Result<Connection, NetError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) < self.refuse_first {
                return Err(NetError::Connect("refused".into()));
            }
            let (c2s_tx, c2s_rx) = mpsc::channel(16);
            let (s2c_tx, s2c_rx) = mpsc::channel(16);
            self.servers
                .send(ServerSide {
                    to_client: s2c_tx,
                    from_client: c2s_rx,
                })
                .map_err(|_| NetError::Connect("server gone".into()))?;
            Ok(Connection {
                outbound: c2s_tx,
                inbound: s2c_rx,
            })
        }

        fn host(&self) -> String {
            "memory".into()
        }
    }

    fn setup(
        refuse_first: usize,
    ) -> (
        ChannelHandle,
        mpsc::Receiver<ChannelNotification>,
        mpsc::UnboundedReceiver<ServerSide>,
    ) {
        let (servers_tx, servers_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(MemoryConnector {
            servers: servers_tx,
            refuse_first,
            attempts: AtomicUsize::new(0),
        });
        let (handle, notif_rx) = spawn_channel(connector, ROOM, ChannelConfig::default());
        (handle, notif_rx, servers_rx)
    }

    fn text(body: &str) -> ChatMessage {
        ChatMessage::new(ROOM, MessageType::Text, body, UserId(42))
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let (handle, mut notif_rx, mut servers) = setup(0);
        let mut server = servers.recv().await.unwrap();
        server.handshake().await;
        assert_eq!(notif_rx.recv().await, Some(ChannelNotification::Connected));
        assert!(handle.is_connected());

        let msg = text("hello");
        handle.publish(msg.clone()).unwrap();

        let send = server.next_frame().await;
        assert_eq!(send.command, Command::Send);
        assert_eq!(send.get_header("destination"), Some("/app/chat/send"));
        assert_eq!(ChatMessage::from_json(&send.body).unwrap(), msg);
    }

    #[tokio::test]
    async fn test_receive_in_delivery_order() {
        let (_handle, mut notif_rx, mut servers) = setup(0);
        let mut server = servers.recv().await.unwrap();
        server.handshake().await;
        assert_eq!(notif_rx.recv().await, Some(ChannelNotification::Connected));

        let first = text("first");
        let second = ChatMessage::new(ROOM, MessageType::Location, "go", UserId(7));
        server.deliver(&first).await;
        server.deliver(&second).await;

        assert_eq!(
            notif_rx.recv().await,
            Some(ChannelNotification::MessageReceived(first))
        );
        assert_eq!(
            notif_rx.recv().await,
            Some(ChannelNotification::MessageReceived(second))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_without_waiting_for_reconnect() {
        let (servers_tx, mut servers) = mpsc::unbounded_channel();
        let websocket = Arc::new(MemoryConnector {
            servers: servers_tx.clone(),
            refuse_first: usize::MAX,
            attempts: AtomicUsize::new(0),
        });
        let polling = Arc::new(MemoryConnector {
            servers: servers_tx,
            refuse_first: 0,
            attempts: AtomicUsize::new(0),
        });
        let connector = Arc::new(FallbackConnector::new(websocket.clone(), polling));
        let (handle, mut notif_rx) = spawn_channel(connector, ROOM, ChannelConfig::default());

        let started = tokio::time::Instant::now();
        let mut server = servers.recv().await.unwrap();
        server.handshake().await;
        assert_eq!(notif_rx.recv().await, Some(ChannelNotification::Connected));
        assert!(started.elapsed() < Duration::from_millis(RECONNECT_DELAY_MS));
        assert_eq!(websocket.attempts.load(Ordering::SeqCst), 1);

        handle.publish(text("over polling")).unwrap();
        let send = server.next_frame().await;
        assert_eq!(ChatMessage::from_json(&send.body).unwrap().message(), "over polling");
    }

    #[tokio::test]
    async fn test_publish_to_other_room_rejected() {
        let (handle, _notif_rx, _servers) = setup(0);
        let foreign = ChatMessage::new(ChatRoomId(4), MessageType::Text, "x", UserId(1));
        assert!(matches!(
            handle.publish(foreign),
            Err(NetError::WrongRoom { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_resubscribes_after_fixed_delay() {
        let (handle, mut notif_rx, mut servers) = setup(0);
        let mut server = servers.recv().await.unwrap();
        server.handshake().await;
        assert_eq!(notif_rx.recv().await, Some(ChannelNotification::Connected));

        drop(server);
        let lost_at = tokio::time::Instant::now();
        assert!(matches!(
            notif_rx.recv().await,
            Some(ChannelNotification::Disconnected { .. })
        ));

        // Sends while down are dropped, not queued.
        assert!(matches!(handle.publish(text("lost")), Err(NetError::NotConnected)));

        let mut server = servers.recv().await.unwrap();
        assert!(lost_at.elapsed() >= Duration::from_millis(RECONNECT_DELAY_MS));
        server.handshake().await;
        assert_eq!(notif_rx.recv().await, Some(ChannelNotification::Connected));

        // Nothing from the outage is replayed.
        handle.publish(text("after")).unwrap();
        let send = server.next_frame().await;
        assert_eq!(ChatMessage::from_json(&send.body).unwrap().message(), "after");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_retry_without_limit() {
        let (_handle, mut notif_rx, mut servers) = setup(3);
        assert!(matches!(
            notif_rx.recv().await,
            Some(ChannelNotification::Disconnected { .. })
        ));

        let started = tokio::time::Instant::now();
        let mut server = servers.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(2 * RECONNECT_DELAY_MS));
        server.handshake().await;

        // Repeated failures announce the outage once.
        assert_eq!(notif_rx.recv().await, Some(ChannelNotification::Connected));
    }

    #[tokio::test]
    async fn test_broker_error_frame_drops_session() {
        let (_handle, mut notif_rx, mut servers) = setup(0);
        let mut server = servers.recv().await.unwrap();
        server.handshake().await;
        assert_eq!(notif_rx.recv().await, Some(ChannelNotification::Connected));

        server
            .to_client
            .send(Frame::new(Command::Error).header("message", "bad").encode())
            .await
            .unwrap();
        match notif_rx.recv().await {
            Some(ChannelNotification::Disconnected { reason }) => assert!(reason.contains("bad")),
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent() {
        let (mut handle, mut notif_rx, mut servers) = setup(0);
        let mut server = servers.recv().await.unwrap();
        server.handshake().await;
        assert_eq!(notif_rx.recv().await, Some(ChannelNotification::Connected));

        let mut state = handle.watch_state();
        handle.deactivate();
        handle.deactivate();
        assert!(!handle.is_active());

        assert_eq!(server.next_frame().await.command, Command::Disconnect);
        state
            .wait_for(|s| *s == ConnectionState::Closed)
            .await
            .unwrap();
        assert!(matches!(handle.publish(text("late")), Err(NetError::ChannelClosed)));
    }
}
