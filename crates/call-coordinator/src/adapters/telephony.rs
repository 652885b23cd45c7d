//! Telephony Session Adapter interface
//!
//! Wraps the vendor voice SDK device. Implementations own their reconnection
//! and backoff policy; the coordinator only sees the primitives below and the
//! translated [`TelephonyEvent`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EventHandler, Subscription};
use crate::error::CoordinatorResult;
use crate::types::SessionId;

/// Events delivered by the voice device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelephonyEvent {
    /// A call is ringing on the device
    Incoming {
        call_id: String,
        from: String,
        case_id: Option<String>,
    },
    /// The far end answered (outbound) or the accept went through (inbound)
    Accepted { call_id: String },
    /// The call leg is gone
    Disconnected { call_id: String },
    /// Device or call failure; `call_id` is `None` for device-level errors
    Error {
        call_id: Option<String>,
        message: String,
    },
}

/// Correlation data passed along with an outbound dial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialContext {
    pub session_id: SessionId,
    pub case_id: Option<String>,
}

/// Voice device primitives used by the coordinator
#[async_trait]
pub trait TelephonyAdapter: Send + Sync {
    /// Register the device with a short-lived credential token
    async fn register(&self, credential_token: &str) -> CoordinatorResult<()>;

    /// Answer the ringing call
    async fn accept_incoming(&self, call_id: &str) -> CoordinatorResult<()>;

    /// Decline a ringing call
    async fn reject_incoming(&self, call_id: &str) -> CoordinatorResult<()>;

    /// Dial out; returns the vendor call id of the new leg
    async fn place_call(&self, target: &str, context: &DialContext) -> CoordinatorResult<String>;

    /// Tear down every call leg on the device
    async fn hang_up_all(&self) -> CoordinatorResult<()>;

    /// Mute or unmute the local microphone
    async fn set_mute(&self, muted: bool) -> CoordinatorResult<()>;

    /// Register a handler for device events
    fn subscribe(&self, handler: EventHandler<TelephonyEvent>) -> Subscription;

    /// Release the device; no events are delivered afterwards
    async fn destroy(&self) -> CoordinatorResult<()>;
}
