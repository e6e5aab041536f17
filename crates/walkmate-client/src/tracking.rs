//! Walk tracking view.
//!
//! Ties one [`SessionMachine`] to the room's channel and, for the phase and
//! role at hand, a running [`LocationSync`]. The walker drives the machine
//! with [`TrackingView::toggle`]; the owner's machine follows the walker's
//! LOCATION and REVIEW events, starting from the ones already in the chat
//! history. [`TrackingView::unmount`] (or drop) stops the sync interval and
//! the channel together.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use walkmate_net::{spawn_channel, ChannelHandle, ChannelNotification, ConnectionState, NetError};
use walkmate_shared::constants::{LOCATION_START_NOTICE, REVIEW_PROMPT};
use walkmate_shared::{BoardId, ChatMessage, ChatRoomId, LocationSample, MessageType, Role, UserId};

use crate::error::{ClientError, Result};
use crate::events::{emit_event, Route, UiEvent, UiSender};
use crate::guard::GuardRequest;
use crate::path::{MapSurface, PathRenderer};
use crate::session::{ControlState, Phase, SessionEffect, SessionMachine, Transition};
use crate::state::WalkContext;
use crate::sync::{strategy_for, LocationSync, SyncContext};

struct TrackingState {
    machine: SessionMachine,
    sync: Option<LocationSync>,
    /// Handed to the sync when it starts; sampling starts at most once.
    renderer: Option<PathRenderer>,
}

impl TrackingState {
    fn stop_sampling(&mut self) {
        if let Some(sync) = self.sync.as_mut() {
            sync.stop();
        }
    }
}

/// Everything a started sync needs besides the renderer.
#[derive(Clone)]
struct SyncSeed {
    ctx: WalkContext,
    sync: SyncContext,
    role: Role,
    ui: UiSender,
}

impl SyncSeed {
    fn start(&self, state: &mut TrackingState) {
        if state.sync.is_some() {
            return;
        }
        let Some(renderer) = state.renderer.take() else {
            warn!(room = %self.sync.chat_room_id, "Sampling already ran for this view");
            return;
        };
        let strategy = strategy_for(
            self.role,
            self.ctx.positions.clone(),
            self.ctx.config.geolocation_timeout,
        );
        state.sync = Some(LocationSync::start(
            strategy,
            self.sync.clone(),
            renderer,
            self.ui.clone(),
            self.ctx.config.sync_interval,
        ));
    }
}

pub struct TrackingView {
    board_id: BoardId,
    room: ChatRoomId,
    caller: UserId,
    role: Role,
    state: Arc<Mutex<TrackingState>>,
    seed: SyncSeed,
    channel: ChannelHandle,
    ui: UiSender,
    pump: Option<JoinHandle<()>>,
}

impl TrackingView {
    /// Authorize, resolve the caller's role and open the room's channel.
    ///
    /// The owner starts polling right away; the walker waits for
    /// [`TrackingView::toggle`].
    pub async fn mount(
        ctx: &WalkContext,
        board_id: BoardId,
        room: ChatRoomId,
        surface: Box<dyn MapSurface>,
        ui: UiSender,
    ) -> Result<Self> {
        let grant = match ctx.guard().authorize(GuardRequest::trade(board_id, Some(room))).await {
            Ok(grant) => grant,
            Err(ClientError::Unauthorized { redirect }) => {
                emit_event(&ui, UiEvent::Redirect(redirect));
                return Err(ClientError::Unauthorized { redirect });
            }
            Err(e) => return Err(e),
        };

        let board = ctx.api.board_summary(board_id).await.map_err(|e| {
            warn!(board = %board_id, error = %e, "Failed to load board");
            ClientError::Api(e)
        })?;
        let caller = grant.caller;
        let role = Role::derive(caller, board.write_user_id);
        info!(board = %board_id, room = %room, caller = %caller, role = ?role, "Tracking view mounted");

        let peer = grant.participants.and_then(|p| p.peer_of(caller));

        let mut machine = SessionMachine::new(role);
        emit_event(&ui, UiEvent::PhaseChanged(machine.phase()));
        if role == Role::Owner {
            for transition in catch_up(ctx, board_id, room, peer, &mut machine).await {
                emit_event(&ui, UiEvent::PhaseChanged(transition.to));
            }
        }
        emit_event(&ui, UiEvent::ControlChanged(machine.control()));
        let ended = machine.is_ended();

        let state = Arc::new(Mutex::new(TrackingState {
            machine,
            sync: None,
            renderer: Some(PathRenderer::new(surface)),
        }));
        let seed = SyncSeed {
            ctx: ctx.clone(),
            sync: SyncContext {
                board_id,
                chat_room_id: room,
                api: ctx.api.clone(),
            },
            role,
            ui: ui.clone(),
        };

        if role == Role::Owner && !ended {
            let mut guard = lock(&state)?;
            seed.start(&mut guard);
        }

        let (channel, notifications) =
            spawn_channel(ctx.connector.clone(), room, ctx.config.channel_config());
        let pump = tokio::spawn(follow_peer(notifications, state.clone(), peer, ui.clone()));

        Ok(Self {
            board_id,
            room,
            caller,
            role,
            state,
            seed,
            channel,
            ui,
            pump: Some(pump),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> Result<Phase> {
        Ok(lock(&self.state)?.machine.phase())
    }

    pub fn control(&self) -> Result<ControlState> {
        Ok(lock(&self.state)?.machine.control())
    }

    pub fn is_sampling(&self) -> Result<bool> {
        Ok(lock(&self.state)?
            .sync
            .as_ref()
            .is_some_and(LocationSync::is_running))
    }

    /// The path as of the last sync tick.
    pub fn path(&self) -> Result<Vec<LocationSample>> {
        Ok(lock(&self.state)?
            .sync
            .as_ref()
            .map(LocationSync::path)
            .unwrap_or_default())
    }

    pub async fn wait_connected(&self) -> Result<()> {
        let mut state = self.channel.watch_state();
        state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .map_err(|_| ClientError::TransportUnavailable(NetError::ChannelClosed))?;
        Ok(())
    }

    /// The start/stop control was pressed.
    ///
    /// Returns the new phase, or `None` when the press did nothing (owner,
    /// ended walk, or unmounted view). A failed publish is logged and does
    /// not undo the transition.
    pub fn toggle(&self) -> Result<Option<Phase>> {
        if self.pump.is_none() {
            debug!(room = %self.room, "Toggle on unmounted view ignored");
            return Ok(None);
        }

        let mut state = lock(&self.state)?;
        let Some(transition) = state.machine.toggle() else {
            return Ok(None);
        };
        emit_event(&self.ui, UiEvent::PhaseChanged(transition.to));

        for effect in &transition.effects {
            self.apply(&mut state, *effect);
        }

        emit_event(&self.ui, UiEvent::ControlChanged(state.machine.control()));
        Ok(Some(transition.to))
    }

    fn apply(&self, state: &mut TrackingState, effect: SessionEffect) {
        match effect {
            SessionEffect::PublishLocationStart => {
                self.publish(MessageType::Location, LOCATION_START_NOTICE)
            }
            SessionEffect::StartSampling => self.seed.start(state),
            SessionEffect::StopSampling => state.stop_sampling(),
            SessionEffect::PublishReview => self.publish(MessageType::Review, REVIEW_PROMPT),
            SessionEffect::NavigateToChat => emit_event(
                &self.ui,
                UiEvent::Navigate(Route::ChatRoom {
                    board_id: self.board_id,
                    chat_room_id: self.room,
                }),
            ),
        }
    }

    fn publish(&self, kind: MessageType, body: &str) {
        let message = ChatMessage::new(self.room, kind, body, self.caller);
        if let Err(e) = self.channel.publish(message) {
            warn!(
                room = %self.room,
                kind = ?kind,
                error = %ClientError::TransportUnavailable(e),
                "Session event not delivered"
            );
        }
    }

    /// Stop syncing and close the channel. Safe to call repeatedly.
    pub fn unmount(&mut self) {
        let Some(pump) = self.pump.take() else {
            return;
        };

        match self.state.lock() {
            Ok(mut state) => state.stop_sampling(),
            Err(poisoned) => poisoned.into_inner().stop_sampling(),
        }
        self.channel.deactivate();
        pump.abort();
        info!(room = %self.room, "Tracking view unmounted");
    }
}

impl Drop for TrackingView {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Replay the peer's lifecycle events from the chat history, so an owner
/// who opens the map mid-walk or after it sees the current phase.
async fn catch_up(
    ctx: &WalkContext,
    board_id: BoardId,
    room: ChatRoomId,
    peer: Option<UserId>,
    machine: &mut SessionMachine,
) -> Vec<Transition> {
    let Some(peer) = peer else {
        return Vec::new();
    };
    let history = match ctx.api.chat_history(board_id, room).await {
        Ok(history) => history,
        Err(e) => {
            warn!(room = %room, error = %e, "No history to catch up from");
            return Vec::new();
        }
    };

    // server sends newest first
    let transitions: Vec<Transition> = history
        .iter()
        .rev()
        .filter(|m| m.write_user_id() == peer)
        .flat_map(|m| machine.observe_peer(m.kind()))
        .collect();
    if !transitions.is_empty() {
        debug!(room = %room, phase = ?machine.phase(), "Phase restored from history");
    }
    transitions
}

fn lock(state: &Mutex<TrackingState>) -> Result<MutexGuard<'_, TrackingState>> {
    state
        .lock()
        .map_err(|e| ClientError::LockPoisoned(e.to_string()))
}

/// Mirror the peer's lifecycle events into the local machine.
async fn follow_peer(
    mut notifications: mpsc::Receiver<ChannelNotification>,
    state: Arc<Mutex<TrackingState>>,
    peer: Option<UserId>,
    ui: UiSender,
) {
    while let Some(notification) = notifications.recv().await {
        let message = match notification {
            ChannelNotification::MessageReceived(message) => message,
            ChannelNotification::Connected => {
                emit_event(&ui, UiEvent::ConnectionChanged { connected: true });
                continue;
            }
            ChannelNotification::Disconnected { .. } => {
                emit_event(&ui, UiEvent::ConnectionChanged { connected: false });
                continue;
            }
        };
        if Some(message.write_user_id()) != peer {
            continue;
        }

        let mut state = match lock(&state) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Dropping peer event");
                continue;
            }
        };
        let transitions: Vec<Transition> = state.machine.observe_peer(message.kind());
        for transition in &transitions {
            emit_event(&ui, UiEvent::PhaseChanged(transition.to));
            if transition.effects.contains(&SessionEffect::StopSampling) {
                state.stop_sampling();
            }
        }
        if !transitions.is_empty() {
            emit_event(&ui, UiEvent::ControlChanged(state.machine.control()));
        }
    }
}
