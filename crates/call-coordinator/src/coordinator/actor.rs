//! The coordinator actor: owns the state machine and runs its actions

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use super::Command;
use crate::adapters::{
    CallEvent, CallEventType, DialContext, StatusChannel, Subscription, TelephonyAdapter,
    TelephonyEvent,
};
use crate::config::CoordinatorConfig;
use crate::events::CoordinatorEvent;
use crate::state_machine::{Action, CallStateMachine, TimerKind, Timing, Trigger};
use crate::timers::{TimerSet, TimerSink};
use crate::types::{CallDirection, CallSnapshot, ChannelStatus, DeviceStatus, SessionId};

pub(super) struct CoordinatorActor {
    config: CoordinatorConfig,
    machine: CallStateMachine,
    telephony: Arc<dyn TelephonyAdapter>,
    channel: Arc<dyn StatusChannel>,
    subscriptions: Vec<Subscription>,
    timers: TimerSet,
    device: DeviceStatus,
    channel_status: ChannelStatus,
    state_tx: watch::Sender<CallSnapshot>,
    events: broadcast::Sender<CoordinatorEvent>,
    torn_down: bool,
}

impl CoordinatorActor {
    pub(super) fn new(
        config: CoordinatorConfig,
        telephony: Arc<dyn TelephonyAdapter>,
        channel: Arc<dyn StatusChannel>,
        subscriptions: Vec<Subscription>,
        commands: mpsc::WeakUnboundedSender<Command>,
        state_tx: watch::Sender<CallSnapshot>,
        events: broadcast::Sender<CoordinatorEvent>,
    ) -> Self {
        let sink: TimerSink = Arc::new(move |session_id: SessionId, kind: TimerKind| {
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::Trigger(Trigger::Timer { session_id, kind }));
            }
        });

        Self {
            machine: CallStateMachine::new(Timing::from(&config)),
            timers: TimerSet::new(sink),
            config,
            telephony,
            channel,
            subscriptions,
            device: DeviceStatus::Unregistered,
            channel_status: ChannelStatus::Disconnected,
            state_tx,
            events,
            torn_down: false,
        }
    }

    pub(super) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>, credential_token: String) {
        self.bring_up(&credential_token).await;

        while let Some(command) = commands.recv().await {
            if let Command::Logout(reply) = command {
                self.teardown().await;
                commands.close();
                let _ = reply.send(());
                break;
            }
            self.handle_command(command).await;
        }

        // Every handle dropped without logout
        if !self.torn_down {
            self.teardown().await;
        }
        info!("Call coordinator stopped");
    }

    async fn bring_up(&mut self, credential_token: &str) {
        let previous = self.snapshot();
        self.set_device(DeviceStatus::Registering);
        self.publish_state(previous);

        let previous = self.snapshot();
        match self.telephony.register(credential_token).await {
            Ok(()) => {
                info!("Voice device registered");
                self.set_device(DeviceStatus::Ready);
            }
            Err(e) => {
                warn!("Voice device registration failed: {}", e);
                self.set_device(DeviceStatus::Error(e.to_string()));
            }
        }
        self.publish_state(previous);

        // Connection status arrives through on_connection_change
        if let Err(e) = self.channel.connect(&self.config.room_key).await {
            warn!("Status channel connect to '{}' failed: {}", self.config.room_key, e);
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Trigger(trigger) => self.apply(trigger).await,
            Command::Telephony(event) => self.on_telephony_event(event).await,
            Command::StatusUpdate(event) => self.apply(trigger_for_status(event)).await,
            Command::Voicemail(event) => {
                info!("Voicemail from {} ({})", event.counterpart_number, event.call_id);
                self.emit(CoordinatorEvent::VoicemailReceived(event));
            }
            Command::Connection(status) => {
                if status != self.channel_status {
                    let previous = self.snapshot();
                    info!("Status channel {:?}", status);
                    self.channel_status = status;
                    self.emit(CoordinatorEvent::ChannelStatusChanged(status));
                    self.publish_state(previous);
                }
            }
            Command::DispositionSubmitted(session_id) => {
                let current = self.machine.session().map(|s| s.session_id().clone());
                if current.as_ref() == Some(&session_id) {
                    self.apply(Trigger::DismissDisposition).await;
                } else {
                    debug!("Disposition for {} no longer matches the dialer", session_id);
                }
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Logout(_) => {}
        }
    }

    async fn on_telephony_event(&mut self, event: TelephonyEvent) {
        let trigger = match event {
            TelephonyEvent::Incoming {
                call_id,
                from,
                case_id,
            } => Trigger::Inbound {
                call_id,
                from,
                case_id,
            },
            TelephonyEvent::Accepted { call_id } => Trigger::DeviceAccepted { call_id },
            TelephonyEvent::Disconnected { call_id } => Trigger::DeviceDisconnected { call_id },
            TelephonyEvent::Error { call_id, message } => {
                if call_id.is_none() {
                    let previous = self.snapshot();
                    warn!("Voice device error: {}", message);
                    self.set_device(DeviceStatus::Error(message.clone()));
                    self.publish_state(previous);
                    if self.machine.session().is_none() {
                        return;
                    }
                }
                Trigger::DeviceError { call_id, message }
            }
        };
        self.apply(trigger).await;
    }

    /// Run a trigger and every follow-up trigger its actions produce
    async fn apply(&mut self, trigger: Trigger) {
        let previous = self.snapshot();
        let mut pending = VecDeque::from([trigger]);

        while let Some(trigger) = pending.pop_front() {
            let actions = self.machine.handle(trigger, Utc::now());
            for action in actions {
                if let Some(next) = self.execute(action).await {
                    pending.push_back(next);
                }
            }
        }

        self.publish_state(previous);
    }

    async fn execute(&mut self, action: Action) -> Option<Trigger> {
        match action {
            Action::AcceptIncoming { call_id } => {
                if let Err(e) = self.telephony.accept_incoming(&call_id).await {
                    warn!("accept_incoming({}) failed: {}", call_id, e);
                    return Some(Trigger::DeviceError {
                        call_id: Some(call_id),
                        message: e.to_string(),
                    });
                }
            }
            Action::RejectIncoming { call_id } => {
                if let Err(e) = self.telephony.reject_incoming(&call_id).await {
                    warn!("reject_incoming({}) failed: {}", call_id, e);
                }
            }
            Action::PlaceCall {
                session_id,
                number,
                case_id,
            } => {
                let context = DialContext {
                    session_id: session_id.clone(),
                    case_id,
                };
                return Some(match self.telephony.place_call(&number, &context).await {
                    Ok(call_id) => Trigger::DialSucceeded {
                        session_id,
                        call_id,
                    },
                    Err(e) => Trigger::DialFailed {
                        session_id,
                        reason: e.to_string(),
                    },
                });
            }
            Action::HangUpAll => {
                if let Err(e) = self.telephony.hang_up_all().await {
                    warn!("hang_up_all failed: {}", e);
                }
            }
            Action::SetMute(muted) => {
                // The flag stays as toggled; the agent can retry
                if let Err(e) = self.telephony.set_mute(muted).await {
                    warn!("set_mute({}) failed: {}", muted, e);
                }
            }
            Action::ArmRingTimeout(session_id) => {
                self.timers
                    .arm_ring_timeout(session_id, self.config.ring_timeout());
            }
            Action::CancelRingTimeout => self.timers.cancel_ring_timeout(),
            Action::StartElapsedTimer(session_id) => self.timers.start_elapsed(session_id),
            Action::StopElapsedTimer => self.timers.stop_elapsed(),
            Action::ScheduleReset { session_id, delay } => {
                self.timers.schedule_reset(session_id, delay);
            }
            Action::CancelReset => self.timers.cancel_reset(),
            Action::Publish(event) => self.emit(event),
        }
        None
    }

    async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        info!("Tearing down call coordinator");
        let previous = self.snapshot();

        self.timers.cancel_all();
        self.subscriptions.clear();

        if self.machine.status().is_active() {
            if let Err(e) = self.telephony.hang_up_all().await {
                warn!("hang_up_all during teardown failed: {}", e);
            }
        }
        self.machine.clear();

        if let Err(e) = self.channel.disconnect().await {
            warn!("Status channel disconnect failed: {}", e);
        }
        if let Err(e) = self.telephony.destroy().await {
            warn!("Voice device destroy failed: {}", e);
        }

        self.device = DeviceStatus::Unregistered;
        self.channel_status = ChannelStatus::Disconnected;
        self.publish_state(previous);
        self.emit(CoordinatorEvent::ShutDown);
    }

    fn set_device(&mut self, status: DeviceStatus) {
        if status != self.device {
            self.device = status.clone();
            self.emit(CoordinatorEvent::DeviceStatusChanged(status));
        }
    }

    fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            session: self.machine.session().cloned(),
            device: self.device.clone(),
            channel: self.channel_status,
        }
    }

    fn publish_state(&self, previous: CallSnapshot) {
        let current = self.snapshot();
        if current == previous {
            return;
        }
        self.state_tx.send_replace(current.clone());
        self.emit(CoordinatorEvent::StateChanged {
            previous: previous.status(),
            snapshot: current,
        });
    }

    fn emit(&self, event: CoordinatorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Translate a channel status update into a state machine trigger
fn trigger_for_status(event: CallEvent) -> Trigger {
    match (event.event_type, event.direction) {
        (CallEventType::Ringing, CallDirection::Inbound) => Trigger::Inbound {
            call_id: event.call_id,
            from: event.counterpart_number,
            case_id: event.case_id,
        },
        (status, _) => Trigger::Remote {
            call_id: event.call_id,
            status,
        },
    }
}
