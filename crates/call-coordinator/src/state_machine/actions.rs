//! Inputs and outputs of the call state machine

use std::time::Duration;

use crate::adapters::CallEventType;
use crate::events::CoordinatorEvent;
use crate::types::SessionId;

/// Timers the coordinator runs on behalf of a session
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum TimerKind {
    /// Unanswered inbound call window
    RingTimeout,
    /// One elapsed-time tick
    Tick,
    /// Terminal grace delay expired
    Reset,
}

/// Everything that can move the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    // Agent actions
    Accept,
    Reject,
    HangUp,
    ToggleMute,
    /// `number` is already normalized
    StartOutbound {
        number: String,
        case_id: Option<String>,
    },
    DismissDisposition,

    // Adapter and channel events
    Inbound {
        call_id: String,
        from: String,
        case_id: Option<String>,
    },
    Remote {
        call_id: String,
        status: CallEventType,
    },
    DeviceAccepted {
        call_id: String,
    },
    DeviceDisconnected {
        call_id: String,
    },
    DeviceError {
        call_id: Option<String>,
        message: String,
    },

    // Results of actions the coordinator executed
    DialSucceeded {
        session_id: SessionId,
        call_id: String,
    },
    DialFailed {
        session_id: SessionId,
        reason: String,
    },

    Timer {
        session_id: SessionId,
        kind: TimerKind,
    },
}

/// Side effects requested by a transition, executed in order
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // Telephony adapter primitives
    AcceptIncoming { call_id: String },
    RejectIncoming { call_id: String },
    PlaceCall {
        session_id: SessionId,
        number: String,
        case_id: Option<String>,
    },
    HangUpAll,
    SetMute(bool),

    // Timers
    ArmRingTimeout(SessionId),
    CancelRingTimeout,
    StartElapsedTimer(SessionId),
    StopElapsedTimer,
    ScheduleReset {
        session_id: SessionId,
        delay: Duration,
    },
    CancelReset,

    /// Broadcast to UI subscribers
    Publish(CoordinatorEvent),
}
