//! Call Session Coordinator
//!
//! [`CallCoordinator`] is a cheap, cloneable handle. The state lives in a
//! single actor task spawned by [`CallCoordinator::start`]: agent commands,
//! adapter events, channel events and timer firings all enter the same FIFO
//! queue and are applied one at a time, so transitions never interleave.
//!
//! ```rust,no_run
//! use casedesk_call_coordinator::adapters::{MemoryChannel, MemoryTelephony};
//! use casedesk_call_coordinator::{CallCoordinator, CoordinatorConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> casedesk_call_coordinator::CoordinatorResult<()> {
//! let config = CoordinatorConfig::new().with_room_key("agent-42");
//! let coordinator = CallCoordinator::start(
//!     config,
//!     Arc::new(MemoryTelephony::new()),
//!     Arc::new(MemoryChannel::new()),
//!     "voice-token",
//! )?;
//!
//! coordinator.start_outbound_call("(555) 123-4567", Some("CASE-1"))?;
//! println!("{}", coordinator.snapshot().await?.status_line());
//! coordinator.logout().await?;
//! # Ok(())
//! # }
//! ```

mod actor;

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::adapters::{
    CallEvent, StatusChannel, Subscription, TelephonyAdapter, TelephonyEvent, VoicemailEvent,
};
use crate::config::CoordinatorConfig;
use crate::disposition::{Disposition, DispositionSink};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::events::EventStream;
use crate::phone::normalize_number;
use crate::state_machine::Trigger;
use crate::types::{CallSnapshot, ChannelStatus, SessionId};

use actor::CoordinatorActor;

/// Everything the actor consumes, in arrival order
#[derive(Debug)]
pub(crate) enum Command {
    Trigger(Trigger),
    Telephony(TelephonyEvent),
    StatusUpdate(CallEvent),
    Voicemail(VoicemailEvent),
    Connection(ChannelStatus),
    /// Dismiss the post-call state if it still belongs to this session
    DispositionSubmitted(SessionId),
    Snapshot(oneshot::Sender<CallSnapshot>),
    Logout(oneshot::Sender<()>),
}

/// Handle to a running coordinator
#[derive(Clone)]
pub struct CallCoordinator {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<CallSnapshot>,
    events: broadcast::Sender<crate::events::CoordinatorEvent>,
}

impl CallCoordinator {
    /// Subscribe to both adapters, spawn the actor and begin device
    /// registration and channel connection
    ///
    /// Registration and connection failures do not fail `start`; they show
    /// up as [`crate::DeviceStatus::Error`] and [`ChannelStatus::Disconnected`].
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: CoordinatorConfig,
        telephony: Arc<dyn TelephonyAdapter>,
        channel: Arc<dyn StatusChannel>,
        credential_token: impl Into<String>,
    ) -> CoordinatorResult<Self> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(CallSnapshot::default());
        let (event_tx, _) = broadcast::channel(config.event_capacity);

        let subscriptions = subscribe_adapters(&command_tx, telephony.as_ref(), channel.as_ref());
        debug!("Registered {} adapter subscriptions", subscriptions.len());

        let actor = CoordinatorActor::new(
            config,
            telephony,
            channel,
            subscriptions,
            command_tx.downgrade(),
            state_tx,
            event_tx.clone(),
        );
        tokio::spawn(actor.run(command_rx, credential_token.into()));
        info!("Call coordinator started");

        Ok(Self {
            commands: command_tx,
            state: state_rx,
            events: event_tx,
        })
    }

    /// Answer the ringing call
    pub fn accept(&self) -> CoordinatorResult<()> {
        self.trigger(Trigger::Accept)
    }

    /// Decline the ringing call
    pub fn reject(&self) -> CoordinatorResult<()> {
        self.trigger(Trigger::Reject)
    }

    /// End the current call; safe to repeat
    pub fn hang_up(&self) -> CoordinatorResult<()> {
        self.trigger(Trigger::HangUp)
    }

    pub fn toggle_mute(&self) -> CoordinatorResult<()> {
        self.trigger(Trigger::ToggleMute)
    }

    /// Dial `number` for an optional case
    ///
    /// Fails only if the number cannot be normalized or the coordinator is
    /// gone. A call that cannot start in the current state is ignored.
    pub fn start_outbound_call(&self, number: &str, case_id: Option<&str>) -> CoordinatorResult<()> {
        let number = normalize_number(number)?;
        self.trigger(Trigger::StartOutbound {
            number,
            case_id: case_id.map(str::to_string),
        })
    }

    /// Close the disposition form without submitting
    pub fn dismiss_disposition(&self) -> CoordinatorResult<()> {
        self.trigger(Trigger::DismissDisposition)
    }

    /// Validate a disposition, hand it to `sink`, then clear the post-call
    /// state it belongs to
    pub async fn submit_disposition(
        &self,
        sink: &dyn DispositionSink,
        disposition: Disposition,
    ) -> CoordinatorResult<()> {
        disposition.validate()?;
        sink.submit(&disposition).await?;
        info!(
            "Disposition {:?} submitted for case {}",
            disposition.outcome, disposition.case_id
        );
        if let Some(session_id) = disposition.session_id {
            self.send(Command::DispositionSubmitted(session_id))?;
        }
        Ok(())
    }

    /// Current state, after every input queued before this call
    pub async fn snapshot(&self) -> CoordinatorResult<CallSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await.map_err(|_| CoordinatorError::ShutDown)
    }

    /// Receiver that always holds the latest published snapshot
    pub fn watch(&self) -> watch::Receiver<CallSnapshot> {
        self.state.clone()
    }

    /// Stream of coordinator events from now on
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Tear down timers, subscriptions, the channel and the device
    ///
    /// Returns once teardown has finished. Calling it again is a no-op.
    pub async fn logout(&self) -> CoordinatorResult<()> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Logout(reply)).is_err() {
            debug!("logout() on a stopped coordinator");
            return Ok(());
        }
        // A dropped reply means another logout finished first
        let _ = rx.await;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn trigger(&self, trigger: Trigger) -> CoordinatorResult<()> {
        self.send(Command::Trigger(trigger))
    }

    fn send(&self, command: Command) -> CoordinatorResult<()> {
        self.commands
            .send(command)
            .map_err(|_| CoordinatorError::ShutDown)
    }
}

/// Adapter handlers only post into the queue; they never touch state
fn subscribe_adapters(
    commands: &mpsc::UnboundedSender<Command>,
    telephony: &dyn TelephonyAdapter,
    channel: &dyn StatusChannel,
) -> Vec<Subscription> {
    let post = |commands: &mpsc::UnboundedSender<Command>| {
        let weak = commands.downgrade();
        move |command: Command| {
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(command);
            }
        }
    };

    let device = post(commands);
    let status = post(commands);
    let voicemail = post(commands);
    let connection = post(commands);

    vec![
        telephony.subscribe(Arc::new(move |event: TelephonyEvent| {
            device(Command::Telephony(event))
        })),
        channel.on_status_update(Arc::new(move |event: CallEvent| {
            status(Command::StatusUpdate(event))
        })),
        channel.on_voicemail_event(Arc::new(move |event: VoicemailEvent| {
            voicemail(Command::Voicemail(event))
        })),
        channel.on_connection_change(Arc::new(move |state: ChannelStatus| {
            connection(Command::Connection(state))
        })),
    ]
}
