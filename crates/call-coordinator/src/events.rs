//! Event stream for UI consumers
//!
//! The coordinator broadcasts a [`CoordinatorEvent`] for every observable
//! change. Subscribers that fall behind lose the oldest events; the current
//! state is always available from [`crate::CallCoordinator::watch`].

use tokio::sync::broadcast;
use tracing::warn;

use crate::adapters::VoicemailEvent;
use crate::types::{
    CallSnapshot, CallStatus, ChannelStatus, DeviceStatus, NavigationTarget, SessionId,
};

/// Events emitted by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// Any change to the snapshot (status, timer, mute, device, channel)
    StateChanged {
        previous: CallStatus,
        snapshot: CallSnapshot,
    },

    /// An inbound call needs the agent's accept/reject decision
    IncomingCall {
        session_id: SessionId,
        call_id: String,
        counterpart_number: String,
        case_id: Option<String>,
    },

    /// An inbound call was auto-rejected because the agent is busy
    BusyRejected {
        call_id: String,
        counterpart_number: String,
    },

    /// The UI should open the screen for the accepted call
    NavigationRequested {
        session_id: SessionId,
        target: NavigationTarget,
    },

    /// The disposition form may be shown
    PostCallAvailable {
        session_id: SessionId,
        case_id: Option<String>,
        counterpart_number: String,
        status: CallStatus,
        duration_seconds: u64,
    },

    VoicemailReceived(VoicemailEvent),

    DeviceStatusChanged(DeviceStatus),

    ChannelStatusChanged(ChannelStatus),

    /// Final event before the stream closes
    ShutDown,
}

/// Receiving half of the coordinator's event broadcast
pub struct EventStream {
    rx: broadcast::Receiver<CoordinatorEvent>,
}

impl EventStream {
    pub(crate) fn new(rx: broadcast::Receiver<CoordinatorEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the coordinator is gone
    pub async fn recv(&mut self) -> Option<CoordinatorEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<CoordinatorEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(_) => return None,
            }
        }
    }

    /// Drain everything currently buffered
    pub fn drain(&mut self) -> Vec<CoordinatorEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
