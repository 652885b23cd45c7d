//! In-memory adapters
//!
//! Stand-ins for the voice SDK and the push channel. They record every
//! primitive the coordinator invokes and let a test (or the CLI simulator)
//! inject events on demand. Failure modes can be switched on per adapter.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

use super::{
    CallEvent, DialContext, EventHandler, HandlerRegistry, StatusChannel, Subscription,
    TelephonyAdapter, TelephonyEvent, VoicemailEvent,
};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::types::ChannelStatus;

/// A primitive invoked on [`MemoryTelephony`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyCommand {
    Register { token: String },
    Accept { call_id: String },
    Reject { call_id: String },
    PlaceCall {
        target: String,
        case_id: Option<String>,
        call_id: String,
    },
    HangUpAll,
    SetMute(bool),
    Destroy,
}

/// Recording voice device
pub struct MemoryTelephony {
    commands: Mutex<Vec<TelephonyCommand>>,
    handlers: HandlerRegistry<TelephonyEvent>,
    next_call: AtomicU64,
    registration_failure: Mutex<Option<String>>,
    dial_failure: Mutex<Option<String>>,
    mute_failure: AtomicBool,
    destroyed: AtomicBool,
}

impl MemoryTelephony {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            handlers: HandlerRegistry::new(),
            next_call: AtomicU64::new(1),
            registration_failure: Mutex::new(None),
            dial_failure: Mutex::new(None),
            mute_failure: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Make `register` fail with this message
    pub fn fail_registration(&self, message: impl Into<String>) {
        *self.registration_failure.lock() = Some(message.into());
    }

    /// Make `place_call` fail with this message
    pub fn fail_dial(&self, message: impl Into<String>) {
        *self.dial_failure.lock() = Some(message.into());
    }

    /// Make `set_mute` fail (or succeed again)
    pub fn fail_mute(&self, fail: bool) {
        self.mute_failure.store(fail, Ordering::SeqCst);
    }

    /// Deliver a device event; returns the number of handlers reached
    pub fn emit(&self, event: TelephonyEvent) -> usize {
        debug!("MemoryTelephony emitting {:?}", event);
        self.handlers.emit(event)
    }

    /// Shorthand for an incoming call
    pub fn ring(&self, call_id: impl Into<String>, from: impl Into<String>) -> usize {
        self.emit(TelephonyEvent::Incoming {
            call_id: call_id.into(),
            from: from.into(),
            case_id: None,
        })
    }

    pub fn commands(&self) -> Vec<TelephonyCommand> {
        self.commands.lock().clone()
    }

    /// Call ids passed to `reject_incoming`, in order
    pub fn rejected_calls(&self) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                TelephonyCommand::Reject { call_id } => Some(call_id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Call ids passed to `accept_incoming`, in order
    pub fn accepted_calls(&self) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                TelephonyCommand::Accept { call_id } => Some(call_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&TelephonyCommand) -> bool) -> usize {
        self.commands.lock().iter().filter(|c| matches(c)).count()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn record(&self, command: TelephonyCommand) {
        self.commands.lock().push(command);
    }

    fn ensure_alive(&self, operation: &str) -> CoordinatorResult<()> {
        if self.is_destroyed() {
            return Err(CoordinatorError::adapter(operation, "device destroyed"));
        }
        Ok(())
    }
}

impl Default for MemoryTelephony {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelephonyAdapter for MemoryTelephony {
    async fn register(&self, credential_token: &str) -> CoordinatorResult<()> {
        self.ensure_alive("register")?;
        self.record(TelephonyCommand::Register {
            token: credential_token.to_string(),
        });
        if let Some(message) = self.registration_failure.lock().clone() {
            return Err(CoordinatorError::adapter("register", message));
        }
        Ok(())
    }

    async fn accept_incoming(&self, call_id: &str) -> CoordinatorResult<()> {
        self.ensure_alive("accept_incoming")?;
        self.record(TelephonyCommand::Accept {
            call_id: call_id.to_string(),
        });
        Ok(())
    }

    async fn reject_incoming(&self, call_id: &str) -> CoordinatorResult<()> {
        self.ensure_alive("reject_incoming")?;
        self.record(TelephonyCommand::Reject {
            call_id: call_id.to_string(),
        });
        Ok(())
    }

    async fn place_call(&self, target: &str, context: &DialContext) -> CoordinatorResult<String> {
        self.ensure_alive("place_call")?;
        if let Some(message) = self.dial_failure.lock().clone() {
            return Err(CoordinatorError::adapter("place_call", message));
        }
        let call_id = format!("CA{:04}", self.next_call.fetch_add(1, Ordering::SeqCst));
        self.record(TelephonyCommand::PlaceCall {
            target: target.to_string(),
            case_id: context.case_id.clone(),
            call_id: call_id.clone(),
        });
        Ok(call_id)
    }

    async fn hang_up_all(&self) -> CoordinatorResult<()> {
        self.ensure_alive("hang_up_all")?;
        self.record(TelephonyCommand::HangUpAll);
        Ok(())
    }

    async fn set_mute(&self, muted: bool) -> CoordinatorResult<()> {
        self.ensure_alive("set_mute")?;
        self.record(TelephonyCommand::SetMute(muted));
        if self.mute_failure.load(Ordering::SeqCst) {
            return Err(CoordinatorError::adapter("set_mute", "no active connection"));
        }
        Ok(())
    }

    fn subscribe(&self, handler: EventHandler<TelephonyEvent>) -> Subscription {
        self.handlers.register(handler)
    }

    async fn destroy(&self) -> CoordinatorResult<()> {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.record(TelephonyCommand::Destroy);
        }
        Ok(())
    }
}

/// Loopback push channel
pub struct MemoryChannel {
    status_handlers: HandlerRegistry<CallEvent>,
    voicemail_handlers: HandlerRegistry<VoicemailEvent>,
    connection_handlers: HandlerRegistry<ChannelStatus>,
    room: Mutex<Option<String>>,
    connect_failure: Mutex<Option<String>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self {
            status_handlers: HandlerRegistry::new(),
            voicemail_handlers: HandlerRegistry::new(),
            connection_handlers: HandlerRegistry::new(),
            room: Mutex::new(None),
            connect_failure: Mutex::new(None),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Make `connect` fail with this message
    pub fn fail_connect(&self, message: impl Into<String>) {
        *self.connect_failure.lock() = Some(message.into());
    }

    /// Push a status update; returns the number of handlers reached
    pub fn push(&self, event: CallEvent) -> usize {
        debug!("MemoryChannel pushing {:?} for {}", event.event_type, event.call_id);
        self.status_handlers.emit(event)
    }

    pub fn push_voicemail(&self, event: VoicemailEvent) -> usize {
        self.voicemail_handlers.emit(event)
    }

    /// Simulate the transport dropping
    pub fn drop_connection(&self) {
        self.connection_handlers.emit(ChannelStatus::Disconnected);
    }

    /// Simulate the channel's own reconnect succeeding
    pub fn restore_connection(&self) {
        self.connection_handlers.emit(ChannelStatus::Connected);
    }

    pub fn room(&self) -> Option<String> {
        self.room.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Total registered handlers across all event kinds
    pub fn handler_count(&self) -> usize {
        self.status_handlers.len() + self.voicemail_handlers.len() + self.connection_handlers.len()
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusChannel for MemoryChannel {
    async fn connect(&self, room_key: &str) -> CoordinatorResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connection_handlers.emit(ChannelStatus::Connecting);
        if let Some(message) = self.connect_failure.lock().clone() {
            self.connection_handlers.emit(ChannelStatus::Disconnected);
            return Err(CoordinatorError::channel(message));
        }
        *self.room.lock() = Some(room_key.to_string());
        self.connection_handlers.emit(ChannelStatus::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> CoordinatorResult<()> {
        if self.room.lock().take().is_some() {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            self.connection_handlers.emit(ChannelStatus::Disconnected);
        }
        Ok(())
    }

    fn on_status_update(&self, handler: EventHandler<CallEvent>) -> Subscription {
        self.status_handlers.register(handler)
    }

    fn on_voicemail_event(&self, handler: EventHandler<VoicemailEvent>) -> Subscription {
        self.voicemail_handlers.register(handler)
    }

    fn on_connection_change(&self, handler: EventHandler<ChannelStatus>) -> Subscription {
        self.connection_handlers.register(handler)
    }
}
