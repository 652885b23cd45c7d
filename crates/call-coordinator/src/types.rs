//! Core types for the call coordinator
//!
//! The coordinator tracks at most one [`CallSession`]. Everything a UI needs to
//! render the dialer comes out of a [`CallSnapshot`]: the session (if any),
//! the voice device status and the push channel status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinator-assigned session identifier
///
/// Timers and stale-event guards compare this value rather than the status,
/// so a late callback for an old session can never touch a newer one.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("session-{}", uuid::Uuid::new_v4()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a call relative to the agent
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Call status as seen by the agent
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    /// No session
    Idle,
    /// Inbound call ringing, agent has not responded
    Incoming,
    /// Outbound call placed, or inbound call accepted and awaiting the carrier
    Connecting,
    /// Two-way audio established
    InProgress,
    /// Ended normally after reaching `InProgress`
    Completed,
    /// Inbound call rejected, timed out, or abandoned before answer
    Missed,
    /// Outbound call never answered
    NoAnswer,
    /// Carrier or device failure
    Failed,
    /// Agent hung up or the device was torn down
    Disconnected,
}

impl CallStatus {
    /// Terminal states wait for the reset timer (or disposition dismissal)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed
                | CallStatus::Missed
                | CallStatus::NoAnswer
                | CallStatus::Failed
                | CallStatus::Disconnected
        )
    }

    /// A session in this state blocks new calls
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CallStatus::Incoming | CallStatus::Connecting | CallStatus::InProgress
        )
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CallStatus::Idle => "idle",
            CallStatus::Incoming => "incoming",
            CallStatus::Connecting => "connecting",
            CallStatus::InProgress => "in-progress",
            CallStatus::Completed => "completed",
            CallStatus::Missed => "missed",
            CallStatus::NoAnswer => "no-answer",
            CallStatus::Failed => "failed",
            CallStatus::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}

/// One phone call attempt, from first ring or dial to terminal disposition
///
/// Identity fields (`session_id`, `direction`, `counterpart_number`,
/// `case_id`) are fixed at construction. Only the coordinator mutates the
/// rest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSession {
    session_id: SessionId,
    direction: CallDirection,
    counterpart_number: String,
    case_id: Option<String>,
    created_at: DateTime<Utc>,

    pub(crate) call_id: Option<String>,
    pub(crate) status: CallStatus,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    pub(crate) elapsed_seconds: u64,
    pub(crate) duration_seconds: u64,
    pub(crate) muted: bool,
    pub(crate) connected: bool,
    pub(crate) is_post_call_available: bool,
}

impl CallSession {
    /// Create a session for a ringing inbound call
    pub(crate) fn inbound(
        call_id: String,
        counterpart_number: String,
        case_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            CallDirection::Inbound,
            Some(call_id),
            counterpart_number,
            case_id,
            CallStatus::Incoming,
            now,
        )
    }

    /// Create a session for an outbound call the agent is placing
    pub(crate) fn outbound(
        counterpart_number: String,
        case_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            CallDirection::Outbound,
            None,
            counterpart_number,
            case_id,
            CallStatus::Connecting,
            now,
        )
    }

    fn new(
        direction: CallDirection,
        call_id: Option<String>,
        counterpart_number: String,
        case_id: Option<String>,
        status: CallStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: SessionId::new(),
            direction,
            counterpart_number,
            case_id,
            created_at: now,
            call_id,
            status,
            started_at: None,
            ended_at: None,
            elapsed_seconds: 0,
            duration_seconds: 0,
            muted: false,
            connected: false,
            is_post_call_available: false,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn counterpart_number(&self) -> &str {
        &self.counterpart_number
    }

    pub fn case_id(&self) -> Option<&str> {
        self.case_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Vendor call identifier, once known
    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    /// Set when the call enters `InProgress`, cleared on the terminal transition
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Seconds spent in `InProgress`; 0 outside of it
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    /// Talk time frozen at the terminal transition
    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    /// Whether two-way audio was ever established
    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn is_post_call_available(&self) -> bool {
        self.is_post_call_available
    }

    /// Does a vendor call id refer to this session?
    ///
    /// Outbound sessions without a call id yet accept nothing: the id is
    /// bound from the dial result before any event is processed.
    pub(crate) fn matches_call(&self, call_id: &str) -> bool {
        self.call_id.as_deref() == Some(call_id)
    }
}

/// Registration state of the voice device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    Unregistered,
    Registering,
    Ready,
    Error(String),
}

/// Connection state of the realtime status channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Where the UI should take the agent after accepting a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationTarget {
    /// Open the case screen directly
    Case { case_id: String },
    /// Look the case up by the caller's number
    NumberLookup { counterpart_number: String },
}

/// Read-only view of the coordinator state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSnapshot {
    pub session: Option<CallSession>,
    pub device: DeviceStatus,
    pub channel: ChannelStatus,
}

impl Default for CallSnapshot {
    fn default() -> Self {
        Self {
            session: None,
            device: DeviceStatus::Unregistered,
            channel: ChannelStatus::Disconnected,
        }
    }
}

impl CallSnapshot {
    pub fn status(&self) -> CallStatus {
        self.session
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(CallStatus::Idle)
    }

    pub fn is_idle(&self) -> bool {
        self.session.is_none()
    }

    pub fn counterpart_number(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.counterpart_number())
    }

    pub fn case_id(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.case_id())
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.session.as_ref().map(|s| s.elapsed_seconds).unwrap_or(0)
    }

    pub fn muted(&self) -> bool {
        self.session.as_ref().map(|s| s.muted).unwrap_or(false)
    }

    pub fn is_post_call_available(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.is_post_call_available)
            .unwrap_or(false)
    }

    /// The status string shown next to the dialer
    ///
    /// Device and status channel problems stay visible during a call as a
    /// suffix on the call line.
    pub fn status_line(&self) -> String {
        let Some(session) = &self.session else {
            return match (&self.device, self.channel) {
                (DeviceStatus::Error(reason), _) => format!("Device error: {}", reason),
                (_, ChannelStatus::Disconnected) => {
                    "Disconnected from status channel".to_string()
                }
                (DeviceStatus::Ready, _) => "Ready".to_string(),
                (DeviceStatus::Registering, _) => "Connecting phone...".to_string(),
                _ => "Phone offline".to_string(),
            };
        };

        let mut line = match session.status {
            CallStatus::Idle => "Ready".to_string(),
            CallStatus::Incoming => format!("Incoming call from {}", session.counterpart_number),
            CallStatus::Connecting => match session.direction {
                CallDirection::Outbound => format!("Calling {}...", session.counterpart_number),
                CallDirection::Inbound => "Connecting...".to_string(),
            },
            CallStatus::InProgress => {
                let clock = format_clock(session.elapsed_seconds);
                if session.muted {
                    format!("In call {} (muted)", clock)
                } else {
                    format!("In call {}", clock)
                }
            }
            CallStatus::Completed | CallStatus::Disconnected => {
                format!("Call ended ({})", format_clock(session.duration_seconds))
            }
            CallStatus::Missed => "Missed call".to_string(),
            CallStatus::NoAnswer => "No answer".to_string(),
            CallStatus::Failed => "Call failed".to_string(),
        };

        if let DeviceStatus::Error(reason) = &self.device {
            line.push_str(&format!(" (device error: {})", reason));
        }
        if self.channel == ChannelStatus::Disconnected {
            line.push_str(" (status channel offline)");
        }
        line
    }
}

/// `mm:ss`, or `h:mm:ss` past the hour
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
