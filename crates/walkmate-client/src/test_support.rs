//! In-process stand-ins for the backend and the broker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use walkmate_net::{Connection, Connector, NetError};
use walkmate_shared::stomp::{Command, Frame};
use walkmate_shared::{
    BoardId, BoardSummary, ChatMessage, ChatRoomId, ChatRoomParticipants, Coordinate,
    LocationSample, UserId,
};

use crate::api::WalkApi;
use crate::error::ApiError;

fn server_error(path: String) -> ApiError {
    ApiError::Status { status: 500, path }
}

/// Backend with one board, one chat room and an in-memory location log.
pub struct FakeApi {
    participants: ChatRoomParticipants,
    missing_room: AtomicBool,
    fail_push: AtomicBool,
    fail_pull: AtomicBool,
    samples: Mutex<Vec<LocationSample>>,
    scripted_pulls: Mutex<VecDeque<Vec<LocationSample>>>,
    history: Mutex<Vec<ChatMessage>>,
    participant_calls: AtomicUsize,
    push_calls: AtomicUsize,
    pull_calls: AtomicUsize,
}

impl FakeApi {
    pub fn new(owner: UserId, requester: UserId) -> Arc<Self> {
        Arc::new(Self {
            participants: ChatRoomParticipants {
                write_user_id: owner,
                request_user_id: requester,
            },
            missing_room: AtomicBool::new(false),
            fail_push: AtomicBool::new(false),
            fail_pull: AtomicBool::new(false),
            samples: Mutex::new(Vec::new()),
            scripted_pulls: Mutex::new(VecDeque::new()),
            history: Mutex::new(Vec::new()),
            participant_calls: AtomicUsize::new(0),
            push_calls: AtomicUsize::new(0),
            pull_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_missing_room(&self) {
        self.missing_room.store(true, Ordering::SeqCst);
    }

    pub fn set_fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_pull(&self, fail: bool) {
        self.fail_pull.store(fail, Ordering::SeqCst);
    }

    /// Next pull returns `samples` instead of the stored log.
    pub fn script_pull(&self, samples: Vec<LocationSample>) {
        self.scripted_pulls.lock().unwrap().push_back(samples);
    }

    /// Stored newest first, as the server returns it.
    pub fn set_history(&self, newest_first: Vec<ChatMessage>) {
        *self.history.lock().unwrap() = newest_first;
    }

    pub fn pushed(&self) -> Vec<Coordinate> {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .map(LocationSample::coordinate)
            .collect()
    }

    pub fn participant_calls(&self) -> usize {
        self.participant_calls.load(Ordering::SeqCst)
    }

    /// Push attempts, including failed ones.
    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    pub fn pull_calls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    pub fn sync_calls(&self) -> usize {
        self.push_calls() + self.pull_calls()
    }
}

#[async_trait]
impl WalkApi for FakeApi {
    async fn chat_room_participants(
        &self,
        board: BoardId,
        room: ChatRoomId,
    ) -> Result<ChatRoomParticipants, ApiError> {
        self.participant_calls.fetch_add(1, Ordering::SeqCst);
        if self.missing_room.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 404,
                path: crate::api::paths::chat_room(board, room),
            });
        }
        Ok(self.participants)
    }

    async fn board_summary(&self, _board: BoardId) -> Result<BoardSummary, ApiError> {
        Ok(BoardSummary {
            write_user_id: self.participants.write_user_id,
        })
    }

    async fn push_location(
        &self,
        board: BoardId,
        room: ChatRoomId,
        position: Coordinate,
    ) -> Result<(), ApiError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(server_error(crate::api::paths::locations(board, room)));
        }
        self.samples
            .lock()
            .unwrap()
            .push(LocationSample::new(room, position, Utc::now()));
        Ok(())
    }

    async fn fetch_locations(
        &self,
        board: BoardId,
        room: ChatRoomId,
    ) -> Result<Vec<LocationSample>, ApiError> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(server_error(crate::api::paths::locations(board, room)));
        }
        if let Some(scripted) = self.scripted_pulls.lock().unwrap().pop_front() {
            return Ok(scripted);
        }
        Ok(self.samples.lock().unwrap().clone())
    }

    async fn chat_history(
        &self,
        board: BoardId,
        room: ChatRoomId,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        if self.missing_room.load(Ordering::SeqCst) {
            return Err(server_error(crate::api::paths::messages(board, room)));
        }
        Ok(self.history.lock().unwrap().clone())
    }
}

#[derive(Default)]
struct BrokerState {
    subscribers: Vec<(String, mpsc::Sender<String>)>,
    published: Vec<ChatMessage>,
    next_message_id: u64,
}

/// STOMP broker that answers the handshake and fans SENDs out to the
/// subscribers of the message's room topic.
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl FakeBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every SEND the broker accepted, in arrival order.
    pub fn published(&self) -> Vec<ChatMessage> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.subscribers.retain(|(_, tx)| !tx.is_closed());
        state.subscribers.len()
    }

    pub async fn wait_for_subscribers(&self, n: usize) {
        while self.subscriber_count() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Push a message to the room topic as if a peer had sent it.
    pub fn deliver(&self, message: &ChatMessage) {
        let mut state = self.state.lock().unwrap();
        Self::broadcast(&mut state, message);
    }

    fn broadcast(state: &mut BrokerState, message: &ChatMessage) {
        let topic = message.chat_room_id().to_topic();
        let body = message.to_json().unwrap();
        state.next_message_id += 1;
        let frame = Frame::new(Command::Message)
            .header("destination", topic.clone())
            .header("subscription", "sub-0")
            .header("message-id", state.next_message_id.to_string())
            .body(body)
            .encode();
        for (dest, tx) in &state.subscribers {
            if *dest == topic {
                let _ = tx.try_send(frame.clone());
            }
        }
    }

    async fn serve(self, mut from_client: mpsc::Receiver<String>, to_client: mpsc::Sender<String>) {
        while let Some(raw) = from_client.recv().await {
            let Ok(Some(frame)) = Frame::decode(&raw) else {
                continue;
            };
            match frame.command {
                Command::Connect => {
                    let connected = Frame::new(Command::Connected).header("version", "1.2");
                    if to_client.send(connected.encode()).await.is_err() {
                        break;
                    }
                }
                Command::Subscribe => {
                    let dest = frame.get_header("destination").unwrap_or_default().to_string();
                    self.state
                        .lock()
                        .unwrap()
                        .subscribers
                        .push((dest, to_client.clone()));
                }
                Command::Send => {
                    let message = ChatMessage::from_json(&frame.body).unwrap();
                    let mut state = self.state.lock().unwrap();
                    state.published.push(message.clone());
                    Self::broadcast(&mut state, &message);
                }
                Command::Disconnect => break,
                _ => {}
            }
        }
    }
}

#[async_trait]
impl Connector for FakeBroker {
    async fn connect(&self) -> Result<Connection, NetError> {
        let (c2s_tx, c2s_rx) = mpsc::channel(64);
        let (s2c_tx, s2c_rx) = mpsc::channel(64);
        tokio::spawn(self.clone().serve(c2s_rx, s2c_tx));
        Ok(Connection {
            outbound: c2s_tx,
            inbound: s2c_rx,
        })
    }

    fn host(&self) -> String {
        "fake-broker".into()
    }
}
