//! Realtime Status Channel interface and its wire events
//!
//! The channel pushes call-status updates for the agent's room. Delivery is
//! neither exactly-once nor ordered; the coordinator applies updates
//! idempotently.
//!
//! Wire shape of a status update:
//!
//! ```json
//! {
//!   "callId": "CA11f0",
//!   "direction": "inbound",
//!   "counterpartNumber": "+1 555 987 6543",
//!   "eventType": "in-progress",
//!   "timestamp": "2024-03-01T17:04:05Z",
//!   "caseId": "CASE-1"
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventHandler, Subscription};
use crate::error::CoordinatorResult;
use crate::types::{CallDirection, ChannelStatus};

/// Call status reported by the carrier
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallEventType {
    Ringing,
    Accepted,
    InProgress,
    Completed,
    NoAnswer,
    Failed,
    Busy,
}

/// A call-status update pushed by the channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    pub call_id: String,
    pub direction: CallDirection,
    pub counterpart_number: String,
    pub event_type: CallEventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
}

impl CallEvent {
    pub fn new(
        call_id: impl Into<String>,
        direction: CallDirection,
        counterpart_number: impl Into<String>,
        event_type: CallEventType,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            direction,
            counterpart_number: counterpart_number.into(),
            event_type,
            timestamp: Utc::now(),
            case_id: None,
        }
    }

    pub fn with_case_id(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }

    pub fn from_json(payload: &str) -> CoordinatorResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn to_json(&self) -> CoordinatorResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A voicemail left for the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoicemailEvent {
    pub call_id: String,
    pub counterpart_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub duration_seconds: u32,
    pub timestamp: DateTime<Utc>,
}

/// Push channel primitives used by the coordinator
#[async_trait]
pub trait StatusChannel: Send + Sync {
    /// Join the agent's room
    async fn connect(&self, room_key: &str) -> CoordinatorResult<()>;

    /// Leave the room and close the transport
    async fn disconnect(&self) -> CoordinatorResult<()>;

    fn on_status_update(&self, handler: EventHandler<CallEvent>) -> Subscription;

    fn on_voicemail_event(&self, handler: EventHandler<VoicemailEvent>) -> Subscription;

    /// Transport up/down notifications, including the channel's own reconnects
    fn on_connection_change(&self, handler: EventHandler<ChannelStatus>) -> Subscription;
}
