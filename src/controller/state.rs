use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{error, info};

use crate::channel::RequestKind;

/// Which high-level operation currently owns the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Initializing,
    Applying,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::Initializing => f.write_str("initializing"),
            Phase::Applying => f.write_str("applying"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OperationEvent {
    BeginInitialize,
    BeginApply,
    /// A request was written to the host
    RequestSent { kind: RequestKind },
    /// The host answered; `kind` is the request the reply was attributed to
    ReplyReceived { kind: RequestKind, success: bool },
    /// Initialize downloaded the document but had nothing to send
    Parked,
    /// The operation ended before (or instead of) a host reply
    Abort,
    TimedOut,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("initialization has not finished")]
    InitializationPending,

    #[error("another operation is running ({phase})")]
    Busy { phase: Phase },

    #[error("Invalid transition: {event:?} not allowed while {phase}")]
    Invalid { phase: Phase, event: OperationEvent },
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionRecord {
    pub from: Phase,
    pub to: Phase,
    pub event: OperationEvent,
    pub timestamp: DateTime<Utc>,
}

/// Phase plus the sticky `initialized` flag.
///
/// Leaving `Idle` requires `Idle`, with one exception: a parked initialize
/// (document fetched but no usable id, nothing sent to the host) may be rerun.
/// An initialize that is still downloading is not parked.
#[derive(Debug, Clone)]
pub struct OperationState {
    phase: Phase,
    initialized: bool,
    parked: bool,
    request_outstanding: bool,
    history: Vec<TransitionRecord>,
}

impl Default for OperationState {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            initialized: false,
            parked: false,
            request_outstanding: false,
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_initializing(&self) -> bool {
        self.phase == Phase::Initializing
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_applying(&self) -> bool {
        self.phase == Phase::Applying
    }

    pub fn is_parked(&self) -> bool {
        self.parked
    }

    pub fn is_request_outstanding(&self) -> bool {
        self.request_outstanding
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Which request a reply answers. Without a known origin, an uninitialized
    /// controller can only be waiting on the bootstrap.
    pub fn attribute_reply(&self, origin: Option<RequestKind>) -> RequestKind {
        origin.unwrap_or(if self.initialized {
            RequestKind::Apply
        } else {
            RequestKind::Initialize
        })
    }

    pub fn handle(&mut self, event: OperationEvent) -> Result<Phase, TransitionError> {
        let from = self.phase;

        let to = match (from, &event) {
            (Phase::Idle, OperationEvent::BeginInitialize) => {
                self.initialized = false;
                Phase::Initializing
            }
            (Phase::Initializing, OperationEvent::BeginInitialize) if self.parked => {
                self.parked = false;
                self.initialized = false;
                Phase::Initializing
            }
            (Phase::Idle, OperationEvent::BeginApply) => Phase::Applying,

            (Phase::Initializing, OperationEvent::BeginApply) => {
                return Err(TransitionError::InitializationPending);
            }
            (phase, OperationEvent::BeginInitialize | OperationEvent::BeginApply) => {
                return Err(TransitionError::Busy { phase });
            }

            (Phase::Initializing, OperationEvent::Parked) if !self.request_outstanding => {
                self.parked = true;
                Phase::Initializing
            }

            (Phase::Initializing | Phase::Applying, OperationEvent::RequestSent { .. })
                if !self.parked =>
            {
                self.request_outstanding = true;
                from
            }

            (_, OperationEvent::ReplyReceived { kind, success }) => {
                self.request_outstanding = false;
                self.parked = false;
                if *success && *kind == RequestKind::Initialize {
                    self.initialized = true;
                }
                Phase::Idle
            }

            (Phase::Initializing | Phase::Applying, OperationEvent::Abort | OperationEvent::TimedOut) => {
                self.request_outstanding = false;
                self.parked = false;
                Phase::Idle
            }

            (phase, event) => {
                error!(phase = %phase, event = ?event, "Invalid operation state transition");
                return Err(TransitionError::Invalid {
                    phase,
                    event: event.clone(),
                });
            }
        };

        info!(from = %from, to = %to, event = ?event, initialized = self.initialized, "Operation state transition");
        self.history.push(TransitionRecord {
            from,
            to,
            event,
            timestamp: Utc::now(),
        });
        self.phase = to;
        Ok(to)
    }
}
