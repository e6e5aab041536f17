//! Walk lifecycle state machine.
//!
//! One machine exists per mounted tracking view. Only the walker drives it;
//! the owner's machine advances solely by mirroring the walker's channel
//! events. Phases only move forward and `Ended` is terminal.

use tracing::{debug, info};

use walkmate_shared::{MessageType, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    NotStarted,
    InProgress,
    Ended,
}

/// Work the owning view must carry out for a transition, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEffect {
    /// Tell the peer tracking is available (LOCATION message).
    PublishLocationStart,
    StartSampling,
    StopSampling,
    /// Ask the peer for a rating (REVIEW message).
    PublishReview,
    NavigateToChat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    pub effects: Vec<SessionEffect>,
}

/// What the start/stop control shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub label: &'static str,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct SessionMachine {
    role: Role,
    phase: Phase,
}

impl SessionMachine {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            phase: Phase::NotStarted,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_ended(&self) -> bool {
        self.phase == Phase::Ended
    }

    /// The walker pressed the start/stop control.
    ///
    /// Returns `None` when the press has no effect: owner role, or the walk
    /// has already ended.
    pub fn toggle(&mut self) -> Option<Transition> {
        if self.role == Role::Owner {
            debug!("Owner control is read-only, ignoring toggle");
            return None;
        }

        match self.phase {
            Phase::NotStarted => Some(self.advance(
                Phase::InProgress,
                vec![
                    SessionEffect::PublishLocationStart,
                    SessionEffect::StartSampling,
                ],
            )),
            Phase::InProgress => Some(self.advance(
                Phase::Ended,
                vec![
                    SessionEffect::StopSampling,
                    SessionEffect::PublishReview,
                    SessionEffect::NavigateToChat,
                ],
            )),
            Phase::Ended => {
                debug!("Walk already ended, ignoring toggle");
                None
            }
        }
    }

    /// Mirror a lifecycle event published by the peer.
    ///
    /// Only the owner follows the peer. Stale or repeated events never move
    /// the phase backwards, and a REVIEW seen before any LOCATION (lost while
    /// disconnected) still passes through `InProgress`, so observers always
    /// see the phases in order.
    pub fn observe_peer(&mut self, kind: MessageType) -> Vec<Transition> {
        if self.role != Role::Owner {
            return Vec::new();
        }

        let target = match kind {
            MessageType::Location => Phase::InProgress,
            MessageType::Review => Phase::Ended,
            MessageType::Text | MessageType::Image => return Vec::new(),
        };

        let mut transitions = Vec::new();
        if self.phase == Phase::NotStarted && target >= Phase::InProgress {
            transitions.push(self.advance(Phase::InProgress, Vec::new()));
        }
        if self.phase == Phase::InProgress && target == Phase::Ended {
            transitions.push(self.advance(Phase::Ended, vec![SessionEffect::StopSampling]));
        }
        transitions
    }

    pub fn control(&self) -> ControlState {
        match (self.role, self.phase) {
            (Role::Walker, Phase::NotStarted) => ControlState {
                label: "Start walk",
                enabled: true,
            },
            (Role::Walker, Phase::InProgress) => ControlState {
                label: "End walk",
                enabled: true,
            },
            (Role::Owner, Phase::NotStarted) => ControlState {
                label: "Waiting for the walker",
                enabled: false,
            },
            (Role::Owner, Phase::InProgress) => ControlState {
                label: "Walk in progress",
                enabled: false,
            },
            (_, Phase::Ended) => ControlState {
                label: "Walk finished",
                enabled: false,
            },
        }
    }

    fn advance(&mut self, to: Phase, effects: Vec<SessionEffect>) -> Transition {
        debug_assert!(to > self.phase, "phase must only move forward");
        let from = self.phase;
        self.phase = to;
        info!(role = ?self.role, from = ?from, to = ?to, "Walk phase changed");
        Transition { from, to, effects }
    }
}
