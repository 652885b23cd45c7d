use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::actions::{Action, TimerKind, Trigger};
use crate::adapters::CallEventType;
use crate::config::CoordinatorConfig;
use crate::events::CoordinatorEvent;
use crate::phone::normalize_lenient;
use crate::types::{CallDirection, CallSession, CallStatus, NavigationTarget, SessionId};

/// How many finished or rejected call ids are remembered for stale-event checks
const RECENT_CALLS_CAPACITY: usize = 32;

/// Delays the machine schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub ring_timeout: Duration,
    pub reset_grace: Duration,
    pub post_call_reset: Duration,
}

impl From<&CoordinatorConfig> for Timing {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            ring_timeout: config.ring_timeout(),
            reset_grace: config.reset_grace(),
            post_call_reset: config.post_call_reset(),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::from(&CoordinatorConfig::default())
    }
}

/// Owner of the one authoritative call session
pub struct CallStateMachine {
    session: Option<CallSession>,
    timing: Timing,
    /// Call ids that must not start a new session
    recent_calls: VecDeque<String>,
}

impl CallStateMachine {
    pub fn new(timing: Timing) -> Self {
        Self {
            session: None,
            timing,
            recent_calls: VecDeque::with_capacity(RECENT_CALLS_CAPACITY),
        }
    }

    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    pub fn status(&self) -> CallStatus {
        self.session
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(CallStatus::Idle)
    }

    /// Apply one trigger and return the side effects to run
    pub fn handle(&mut self, trigger: Trigger, now: DateTime<Utc>) -> Vec<Action> {
        match trigger {
            Trigger::Inbound {
                call_id,
                from,
                case_id,
            } => self.on_inbound(call_id, from, case_id, now),
            Trigger::Accept => self.on_accept(),
            Trigger::Reject => self.on_reject(now),
            Trigger::HangUp => self.on_hang_up(now),
            Trigger::ToggleMute => self.on_toggle_mute(),
            Trigger::StartOutbound { number, case_id } => {
                self.on_start_outbound(number, case_id, now)
            }
            Trigger::DismissDisposition => self.on_dismiss(),
            Trigger::Remote { call_id, status } => self.on_remote(&call_id, status, now),
            Trigger::DeviceAccepted { call_id } => {
                self.on_remote(&call_id, CallEventType::Accepted, now)
            }
            Trigger::DeviceDisconnected { call_id } => self.on_device_disconnected(&call_id, now),
            Trigger::DeviceError { call_id, message } => {
                self.on_device_error(call_id.as_deref(), &message, now)
            }
            Trigger::DialSucceeded {
                session_id,
                call_id,
            } => self.on_dial_succeeded(&session_id, call_id),
            Trigger::DialFailed { session_id, reason } => {
                self.on_dial_failed(&session_id, &reason, now)
            }
            Trigger::Timer { session_id, kind } => self.on_timer(&session_id, kind, now),
        }
    }

    /// Drop the session without side effects (teardown)
    pub fn clear(&mut self) {
        if let Some(session) = self.session.take() {
            self.remember(session.call_id.clone());
        }
    }

    fn on_inbound(
        &mut self,
        call_id: String,
        from: String,
        case_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Vec<Action> {
        let number = normalize_lenient(&from);

        if let Some(session) = &self.session {
            if session.matches_call(&call_id) {
                debug!("Duplicate inbound event for {} ignored", call_id);
                return vec![];
            }
            if self.recent_calls.contains(&call_id) {
                debug!("Inbound event for already handled call {} ignored", call_id);
                return vec![];
            }
            warn!(
                "Agent busy ({}), auto-rejecting inbound call {} from {}",
                session.status, call_id, number
            );
            self.remember(Some(call_id.clone()));
            return vec![
                Action::RejectIncoming {
                    call_id: call_id.clone(),
                },
                Action::Publish(CoordinatorEvent::BusyRejected {
                    call_id,
                    counterpart_number: number,
                }),
            ];
        }

        if self.recent_calls.contains(&call_id) {
            debug!("Late inbound event for finished call {} ignored", call_id);
            return vec![];
        }

        let session = CallSession::inbound(call_id.clone(), number.clone(), case_id.clone(), now);
        let session_id = session.session_id().clone();
        info!(
            "Incoming call {} from {} (session {})",
            call_id, number, session_id
        );
        self.session = Some(session);

        vec![
            Action::ArmRingTimeout(session_id.clone()),
            Action::Publish(CoordinatorEvent::IncomingCall {
                session_id,
                call_id,
                counterpart_number: number,
                case_id,
            }),
        ]
    }

    fn on_accept(&mut self) -> Vec<Action> {
        let Some(session) = self.session.as_mut() else {
            warn!("accept() ignored: no call");
            return vec![];
        };
        if session.status != CallStatus::Incoming {
            warn!("accept() ignored: call is {}", session.status);
            return vec![];
        }
        let Some(call_id) = session.call_id.clone() else {
            warn!("accept() ignored: incoming session has no call id");
            return vec![];
        };

        session.status = CallStatus::Connecting;
        info!("Accepted call {} (session {})", call_id, session.session_id());

        let navigation = navigation_for(session);
        vec![
            Action::CancelRingTimeout,
            Action::AcceptIncoming { call_id },
            navigation,
        ]
    }

    fn on_reject(&mut self, now: DateTime<Utc>) -> Vec<Action> {
        match self.session.as_ref().map(|s| s.status) {
            Some(CallStatus::Incoming) => {
                let mut actions = vec![Action::CancelRingTimeout];
                actions.extend(self.miss_incoming(now, "rejected by agent"));
                actions
            }
            Some(status) => {
                debug!("reject() ignored: call is {}", status);
                vec![]
            }
            None => {
                debug!("reject() ignored: no call");
                vec![]
            }
        }
    }

    fn on_hang_up(&mut self, now: DateTime<Utc>) -> Vec<Action> {
        match self.session.as_ref().map(|s| s.status) {
            Some(CallStatus::Incoming) => {
                let mut actions = vec![Action::CancelRingTimeout];
                actions.extend(self.miss_incoming(now, "hung up while ringing"));
                actions
            }
            Some(CallStatus::Connecting) => {
                let mut actions = vec![Action::HangUpAll];
                actions.extend(self.finish(CallStatus::Disconnected, now));
                actions
            }
            Some(CallStatus::InProgress) => {
                let mut actions = vec![Action::HangUpAll, Action::StopElapsedTimer];
                actions.extend(self.finish(CallStatus::Disconnected, now));
                actions
            }
            Some(status) => {
                debug!("hang_up() ignored: call is {}", status);
                vec![]
            }
            None => {
                debug!("hang_up() ignored: no call");
                vec![]
            }
        }
    }

    fn on_toggle_mute(&mut self) -> Vec<Action> {
        match self.session.as_mut() {
            Some(session) if session.status == CallStatus::InProgress => {
                session.muted = !session.muted;
                debug!("Mute set to {} for {}", session.muted, session.session_id());
                vec![Action::SetMute(session.muted)]
            }
            Some(session) => {
                warn!("toggle_mute() ignored: call is {}", session.status);
                vec![]
            }
            None => {
                warn!("toggle_mute() ignored: no active call");
                vec![]
            }
        }
    }

    fn on_start_outbound(
        &mut self,
        number: String,
        case_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Vec<Action> {
        let mut actions = Vec::new();

        if let Some(session) = &self.session {
            if session.status.is_active() {
                warn!(
                    "start_outbound_call({}) rejected: call already {}",
                    number, session.status
                );
                return vec![];
            }
            // Dialing out dismisses the previous call's wrap-up
            debug!("Replacing finished session {}", session.session_id());
            actions.push(Action::CancelReset);
            self.clear();
        }

        let session = CallSession::outbound(number.clone(), case_id.clone(), now);
        let session_id = session.session_id().clone();
        info!("Dialing {} (session {})", number, session_id);
        self.session = Some(session);

        actions.push(Action::PlaceCall {
            session_id,
            number,
            case_id,
        });
        actions
    }

    fn on_dismiss(&mut self) -> Vec<Action> {
        match &self.session {
            Some(session) if session.is_post_call_available => {
                info!("Disposition dismissed for {}", session.session_id());
                self.reset_to_idle()
            }
            _ => {
                debug!("dismiss_disposition() ignored: no post-call session");
                vec![]
            }
        }
    }

    fn on_dial_succeeded(&mut self, session_id: &SessionId, call_id: String) -> Vec<Action> {
        match self.session.as_mut() {
            Some(session)
                if session.session_id() == session_id
                    && session.status == CallStatus::Connecting
                    && session.call_id.is_none() =>
            {
                debug!("Session {} bound to call {}", session_id, call_id);
                session.call_id = Some(call_id);
                vec![]
            }
            _ => {
                warn!(
                    "Dial result {} arrived for stale session {}, hanging up",
                    call_id, session_id
                );
                vec![Action::HangUpAll]
            }
        }
    }

    fn on_dial_failed(&mut self, session_id: &SessionId, reason: &str, now: DateTime<Utc>) -> Vec<Action> {
        match &self.session {
            Some(session)
                if session.session_id() == session_id
                    && session.status == CallStatus::Connecting =>
            {
                warn!("Dial failed for {}: {}", session_id, reason);
                self.finish(CallStatus::Failed, now)
            }
            _ => vec![],
        }
    }

    fn on_remote(&mut self, call_id: &str, event: CallEventType, now: DateTime<Utc>) -> Vec<Action> {
        let Some(session) = self.session.as_ref() else {
            debug!("{:?} for {} ignored: no call", event, call_id);
            return vec![];
        };
        if !session.matches_call(call_id) {
            debug!("{:?} for untracked call {} ignored", event, call_id);
            return vec![];
        }

        let status = session.status;
        let direction = session.direction();
        match (status, event) {
            (_, CallEventType::Ringing) => vec![],

            (CallStatus::Incoming, CallEventType::Accepted | CallEventType::InProgress) => {
                // Answered on another surface before the agent responded
                let navigation = navigation_for(session);
                let mut actions = vec![Action::CancelRingTimeout, navigation];
                actions.extend(self.start_talking(now));
                actions
            }
            (CallStatus::Connecting, CallEventType::Accepted | CallEventType::InProgress) => {
                self.start_talking(now)
            }

            (CallStatus::InProgress, CallEventType::Completed) => {
                let mut actions = vec![Action::StopElapsedTimer];
                actions.extend(self.finish(CallStatus::Completed, now));
                actions
            }
            (CallStatus::InProgress, CallEventType::Failed | CallEventType::Busy) => {
                let mut actions = vec![Action::StopElapsedTimer];
                actions.extend(self.finish(CallStatus::Failed, now));
                actions
            }

            (
                CallStatus::Incoming,
                CallEventType::Completed
                | CallEventType::NoAnswer
                | CallEventType::Failed
                | CallEventType::Busy,
            ) => {
                let mut actions = vec![Action::CancelRingTimeout];
                actions.extend(self.miss_incoming_quiet(now));
                actions
            }

            (CallStatus::Connecting, CallEventType::Failed | CallEventType::Busy) => {
                self.finish(CallStatus::Failed, now)
            }
            (CallStatus::Connecting, CallEventType::NoAnswer | CallEventType::Completed) => {
                let next = match direction {
                    CallDirection::Inbound => CallStatus::Missed,
                    CallDirection::Outbound => CallStatus::NoAnswer,
                };
                self.finish(next, now)
            }

            (status, event) => {
                debug!("{:?} in state {} is a no-op", event, status);
                vec![]
            }
        }
    }

    fn on_device_disconnected(&mut self, call_id: &str, now: DateTime<Utc>) -> Vec<Action> {
        // A dropped leg means the same thing as a carrier "completed"
        self.on_remote(call_id, CallEventType::Completed, now)
    }

    fn on_device_error(&mut self, call_id: Option<&str>, message: &str, now: DateTime<Utc>) -> Vec<Action> {
        let Some(session) = self.session.as_ref() else {
            return vec![];
        };
        if let Some(call_id) = call_id {
            if !session.matches_call(call_id) {
                debug!("Device error for untracked call {} ignored", call_id);
                return vec![];
            }
        }

        let status = session.status;
        warn!(
            "Telephony error during {} call {}: {}",
            status,
            session.session_id(),
            message
        );
        match status {
            CallStatus::Incoming => {
                let mut actions = vec![Action::CancelRingTimeout];
                actions.extend(self.miss_incoming_quiet(now));
                actions
            }
            CallStatus::Connecting => self.finish(CallStatus::Failed, now),
            CallStatus::InProgress => {
                let mut actions = vec![Action::StopElapsedTimer];
                actions.extend(self.finish(CallStatus::Failed, now));
                actions
            }
            _ => vec![],
        }
    }

    fn on_timer(&mut self, session_id: &SessionId, kind: TimerKind, now: DateTime<Utc>) -> Vec<Action> {
        let Some(session) = self.session.as_mut() else {
            debug!("{:?} timer for {} fired with no call", kind, session_id);
            return vec![];
        };
        if session.session_id() != session_id {
            debug!("Stale {:?} timer for {} ignored", kind, session_id);
            return vec![];
        }

        match (kind, session.status) {
            (TimerKind::RingTimeout, CallStatus::Incoming) => {
                info!("No answer within ring window, auto-rejecting {}", session_id);
                self.miss_incoming(now, "ring timeout")
            }
            (TimerKind::Tick, CallStatus::InProgress) => {
                session.elapsed_seconds += 1;
                vec![]
            }
            (TimerKind::Reset, status) if status.is_terminal() => {
                debug!("Grace delay over, clearing {}", session_id);
                self.reset_to_idle()
            }
            (kind, status) => {
                debug!("{:?} timer ignored in state {}", kind, status);
                vec![]
            }
        }
    }

    /// Incoming -> Missed, rejecting the call at the device
    fn miss_incoming(&mut self, now: DateTime<Utc>, reason: &str) -> Vec<Action> {
        let call_id = self.session.as_ref().and_then(|s| s.call_id.clone());
        info!("Inbound call missed: {}", reason);
        let mut actions = Vec::new();
        if let Some(call_id) = call_id {
            actions.push(Action::RejectIncoming { call_id });
        }
        actions.extend(self.finish(CallStatus::Missed, now));
        actions
    }

    /// Incoming -> Missed when the far end already gave up
    fn miss_incoming_quiet(&mut self, now: DateTime<Utc>) -> Vec<Action> {
        self.finish(CallStatus::Missed, now)
    }

    fn start_talking(&mut self, now: DateTime<Utc>) -> Vec<Action> {
        let Some(session) = self.session.as_mut() else {
            return vec![];
        };
        session.status = CallStatus::InProgress;
        session.started_at = Some(now);
        session.elapsed_seconds = 0;
        session.connected = true;
        info!(
            "Call with {} in progress (session {})",
            session.counterpart_number(),
            session.session_id()
        );
        vec![Action::StartElapsedTimer(session.session_id().clone())]
    }

    /// Move to a terminal state and schedule the reset
    fn finish(&mut self, status: CallStatus, now: DateTime<Utc>) -> Vec<Action> {
        let Some(session) = self.session.as_mut() else {
            return vec![];
        };

        session.status = status;
        session.ended_at = Some(now);
        session.started_at = None;
        session.duration_seconds = session.elapsed_seconds;
        session.elapsed_seconds = 0;
        session.muted = false;
        session.is_post_call_available = session.connected
            && matches!(status, CallStatus::Completed | CallStatus::Disconnected);

        info!(
            "Call {} ended as {} after {}s",
            session.session_id(),
            status,
            session.duration_seconds
        );

        let mut actions = Vec::new();
        let delay = if session.is_post_call_available {
            actions.push(Action::Publish(CoordinatorEvent::PostCallAvailable {
                session_id: session.session_id().clone(),
                case_id: session.case_id().map(str::to_string),
                counterpart_number: session.counterpart_number().to_string(),
                status,
                duration_seconds: session.duration_seconds,
            }));
            self.timing.post_call_reset
        } else {
            self.timing.reset_grace
        };
        actions.push(Action::ScheduleReset {
            session_id: session.session_id().clone(),
            delay,
        });
        actions
    }

    fn reset_to_idle(&mut self) -> Vec<Action> {
        self.clear();
        vec![
            Action::CancelRingTimeout,
            Action::StopElapsedTimer,
            Action::CancelReset,
        ]
    }

    fn remember(&mut self, call_id: Option<String>) {
        let Some(call_id) = call_id else { return };
        if self.recent_calls.contains(&call_id) {
            return;
        }
        if self.recent_calls.len() == RECENT_CALLS_CAPACITY {
            self.recent_calls.pop_front();
        }
        self.recent_calls.push_back(call_id);
    }
}

fn navigation_for(session: &CallSession) -> Action {
    let target = match session.case_id() {
        Some(case_id) => NavigationTarget::Case {
            case_id: case_id.to_string(),
        },
        None => NavigationTarget::NumberLookup {
            counterpart_number: session.counterpart_number().to_string(),
        },
    };
    Action::Publish(CoordinatorEvent::NavigationRequested {
        session_id: session.session_id().clone(),
        target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn machine() -> CallStateMachine {
        CallStateMachine::new(Timing::default())
    }

    fn ring(m: &mut CallStateMachine, call_id: &str, from: &str) -> Vec<Action> {
        m.handle(
            Trigger::Inbound {
                call_id: call_id.to_string(),
                from: from.to_string(),
                case_id: None,
            },
            Utc::now(),
        )
    }

    fn remote(m: &mut CallStateMachine, call_id: &str, status: CallEventType) -> Vec<Action> {
        m.handle(
            Trigger::Remote {
                call_id: call_id.to_string(),
                status,
            },
            Utc::now(),
        )
    }

    fn dial(m: &mut CallStateMachine, number: &str, case_id: Option<&str>, call_id: &str) -> SessionId {
        let actions = m.handle(
            Trigger::StartOutbound {
                number: number.to_string(),
                case_id: case_id.map(str::to_string),
            },
            Utc::now(),
        );
        let session_id = match actions.last() {
            Some(Action::PlaceCall { session_id, .. }) => session_id.clone(),
            other => panic!("expected PlaceCall, got {:?}", other),
        };
        m.handle(
            Trigger::DialSucceeded {
                session_id: session_id.clone(),
                call_id: call_id.to_string(),
            },
            Utc::now(),
        );
        session_id
    }

    fn session_id(m: &CallStateMachine) -> SessionId {
        m.session().unwrap().session_id().clone()
    }

    #[test]
    fn test_inbound_creates_incoming_session() {
        let mut m = machine();
        let actions = ring(&mut m, "CA1", "+1 (555) 987-6543");

        let session = m.session().unwrap();
        assert_eq!(session.status(), CallStatus::Incoming);
        assert_eq!(session.direction(), CallDirection::Inbound);
        assert_eq!(session.counterpart_number(), "15559876543");
        assert_eq!(session.elapsed_seconds(), 0);
        assert!(!session.is_post_call_available());
        assert_eq!(actions[0], Action::ArmRingTimeout(session.session_id().clone()));
        assert!(matches!(
            actions[1],
            Action::Publish(CoordinatorEvent::IncomingCall { .. })
        ));
    }

    #[test]
    fn test_second_inbound_rejected_while_busy() {
        let mut m = machine();
        ring(&mut m, "CA1", "15559876543");
        m.handle(Trigger::Accept, Utc::now());
        remote(&mut m, "CA1", CallEventType::InProgress);
        let before = m.session().cloned();

        let actions = ring(&mut m, "CA2", "15550001111");
        assert_eq!(
            actions[0],
            Action::RejectIncoming {
                call_id: "CA2".to_string()
            }
        );
        assert_eq!(m.session().cloned(), before);

        // Redelivery of the rejected call does not reject twice
        assert!(ring(&mut m, "CA2", "15550001111").is_empty());
    }

    #[test]
    fn test_duplicate_inbound_is_noop() {
        let mut m = machine();
        ring(&mut m, "CA1", "15559876543");
        let id = session_id(&m);
        assert!(ring(&mut m, "CA1", "15559876543").is_empty());
        assert_eq!(session_id(&m), id);
    }

    #[test]
    fn test_accept_requests_navigation() {
        let mut m = machine();
        m.handle(
            Trigger::Inbound {
                call_id: "CA1".to_string(),
                from: "15559876543".to_string(),
                case_id: Some("CASE-7".to_string()),
            },
            Utc::now(),
        );
        let actions = m.handle(Trigger::Accept, Utc::now());

        assert_eq!(m.status(), CallStatus::Connecting);
        assert_eq!(actions[0], Action::CancelRingTimeout);
        assert_eq!(
            actions[1],
            Action::AcceptIncoming {
                call_id: "CA1".to_string()
            }
        );
        match &actions[2] {
            Action::Publish(CoordinatorEvent::NavigationRequested { target, .. }) => {
                assert_eq!(
                    target,
                    &NavigationTarget::Case {
                        case_id: "CASE-7".to_string()
                    }
                );
            }
            other => panic!("expected navigation, got {:?}", other),
        }

        // accept() again is a no-op
        assert!(m.handle(Trigger::Accept, Utc::now()).is_empty());
    }

    #[test]
    fn test_reject_is_idempotent() {
        let mut m = machine();
        ring(&mut m, "CA1", "15559876543");
        let actions = m.handle(Trigger::Reject, Utc::now());
        assert_eq!(m.status(), CallStatus::Missed);
        assert_eq!(
            actions
                .iter()
                .filter(|a| matches!(a, Action::RejectIncoming { .. }))
                .count(),
            1
        );
        assert!(m.handle(Trigger::Reject, Utc::now()).is_empty());
    }

    #[test]
    fn test_ring_timeout_misses_call() {
        let mut m = machine();
        ring(&mut m, "CA1", "15559876543");
        let id = session_id(&m);

        let actions = m.handle(
            Trigger::Timer {
                session_id: id.clone(),
                kind: TimerKind::RingTimeout,
            },
            Utc::now(),
        );
        assert_eq!(m.status(), CallStatus::Missed);
        assert_eq!(
            actions[0],
            Action::RejectIncoming {
                call_id: "CA1".to_string()
            }
        );
        assert_eq!(
            actions[1],
            Action::ScheduleReset {
                session_id: id,
                delay: Duration::from_secs(5)
            }
        );
        assert!(!m.session().unwrap().is_post_call_available());
    }

    #[test]
    fn test_stale_ring_timeout_ignored() {
        let mut m = machine();
        ring(&mut m, "CA1", "15559876543");
        let old = session_id(&m);
        m.handle(Trigger::Accept, Utc::now());

        let actions = m.handle(
            Trigger::Timer {
                session_id: old,
                kind: TimerKind::RingTimeout,
            },
            Utc::now(),
        );
        assert!(actions.is_empty());
        assert_eq!(m.status(), CallStatus::Connecting);

        let actions = m.handle(
            Trigger::Timer {
                session_id: SessionId::new(),
                kind: TimerKind::Tick,
            },
            Utc::now(),
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_outbound_happy_path() {
        let mut m = machine();
        let id = dial(&mut m, "15551234567", Some("CASE-1"), "CA9");
        assert_eq!(m.status(), CallStatus::Connecting);
        assert_eq!(m.session().unwrap().call_id(), Some("CA9"));

        let actions = remote(&mut m, "CA9", CallEventType::InProgress);
        assert_eq!(actions, vec![Action::StartElapsedTimer(id.clone())]);
        assert!(m.session().unwrap().started_at().is_some());

        for _ in 0..3 {
            m.handle(
                Trigger::Timer {
                    session_id: id.clone(),
                    kind: TimerKind::Tick,
                },
                Utc::now(),
            );
        }
        assert_eq!(m.session().unwrap().elapsed_seconds(), 3);

        let actions = remote(&mut m, "CA9", CallEventType::Completed);
        let session = m.session().unwrap();
        assert_eq!(session.status(), CallStatus::Completed);
        assert!(session.is_post_call_available());
        assert_eq!(session.duration_seconds(), 3);
        assert_eq!(session.elapsed_seconds(), 0);
        assert!(session.started_at().is_none());
        assert_eq!(actions[0], Action::StopElapsedTimer);
        assert!(matches!(
            actions[1],
            Action::Publish(CoordinatorEvent::PostCallAvailable { duration_seconds: 3, .. })
        ));
    }

    #[test]
    fn test_duplicate_in_progress_starts_one_timer() {
        let mut m = machine();
        dial(&mut m, "15551234567", None, "CA9");
        assert_eq!(remote(&mut m, "CA9", CallEventType::InProgress).len(), 1);
        assert!(remote(&mut m, "CA9", CallEventType::InProgress).is_empty());
        assert!(remote(&mut m, "CA9", CallEventType::Accepted).is_empty());
    }

    #[test]
    fn test_completed_twice_publishes_once() {
        let mut m = machine();
        dial(&mut m, "15551234567", None, "CA9");
        remote(&mut m, "CA9", CallEventType::InProgress);
        let first = remote(&mut m, "CA9", CallEventType::Completed);
        let second = remote(&mut m, "CA9", CallEventType::Completed);

        let published = |actions: &[Action]| {
            actions
                .iter()
                .filter(|a| matches!(a, Action::Publish(CoordinatorEvent::PostCallAvailable { .. })))
                .count()
        };
        assert_eq!(published(&first), 1);
        assert_eq!(published(&second), 0);
        assert!(m.session().unwrap().is_post_call_available());
    }

    #[test]
    fn test_outbound_failures() {
        let mut m = machine();
        dial(&mut m, "15551234567", None, "CA1");
        remote(&mut m, "CA1", CallEventType::Busy);
        assert_eq!(m.status(), CallStatus::Failed);

        let mut m = machine();
        dial(&mut m, "15551234567", None, "CA1");
        remote(&mut m, "CA1", CallEventType::NoAnswer);
        assert_eq!(m.status(), CallStatus::NoAnswer);
        assert!(!m.session().unwrap().is_post_call_available());
    }

    #[test]
    fn test_outbound_rejected_while_active() {
        let mut m = machine();
        ring(&mut m, "CA1", "15559876543");
        let actions = m.handle(
            Trigger::StartOutbound {
                number: "15551234567".to_string(),
                case_id: None,
            },
            Utc::now(),
        );
        assert!(actions.is_empty());
        assert_eq!(m.session().unwrap().counterpart_number(), "15559876543");
    }

    #[test]
    fn test_outbound_replaces_finished_session() {
        let mut m = machine();
        ring(&mut m, "CA1", "15559876543");
        m.handle(Trigger::Reject, Utc::now());
        assert_eq!(m.status(), CallStatus::Missed);

        let actions = m.handle(
            Trigger::StartOutbound {
                number: "15551234567".to_string(),
                case_id: None,
            },
            Utc::now(),
        );
        assert_eq!(actions[0], Action::CancelReset);
        assert_eq!(m.status(), CallStatus::Connecting);
        assert_eq!(m.session().unwrap().counterpart_number(), "15551234567");
    }

    #[test]
    fn test_hang_up_after_connect_offers_disposition() {
        let mut m = machine();
        dial(&mut m, "15551234567", Some("CASE-1"), "CA1");
        remote(&mut m, "CA1", CallEventType::InProgress);

        let actions = m.handle(Trigger::HangUp, Utc::now());
        assert_eq!(actions[0], Action::HangUpAll);
        assert_eq!(m.status(), CallStatus::Disconnected);
        assert!(m.session().unwrap().is_post_call_available());

        // Second hang_up and the trailing carrier update are no-ops
        assert!(m.handle(Trigger::HangUp, Utc::now()).is_empty());
        assert!(remote(&mut m, "CA1", CallEventType::Completed).is_empty());
        assert_eq!(m.status(), CallStatus::Disconnected);
    }

    #[test]
    fn test_hang_up_while_dialing() {
        let mut m = machine();
        dial(&mut m, "15551234567", None, "CA1");
        m.handle(Trigger::HangUp, Utc::now());
        assert_eq!(m.status(), CallStatus::Disconnected);
        assert!(!m.session().unwrap().is_post_call_available());
    }

    #[test]
    fn test_mute_only_in_progress() {
        let mut m = machine();
        assert!(m.handle(Trigger::ToggleMute, Utc::now()).is_empty());

        dial(&mut m, "15551234567", None, "CA1");
        assert!(m.handle(Trigger::ToggleMute, Utc::now()).is_empty());

        remote(&mut m, "CA1", CallEventType::InProgress);
        assert_eq!(m.handle(Trigger::ToggleMute, Utc::now()), vec![Action::SetMute(true)]);
        assert!(m.session().unwrap().muted());
        assert_eq!(m.handle(Trigger::ToggleMute, Utc::now()), vec![Action::SetMute(false)]);
    }

    #[test]
    fn test_events_for_other_calls_ignored() {
        let mut m = machine();
        dial(&mut m, "15551234567", None, "CA1");
        assert!(remote(&mut m, "CA-other", CallEventType::InProgress).is_empty());
        assert_eq!(m.status(), CallStatus::Connecting);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut m = machine();
        dial(&mut m, "15551234567", None, "CA1");
        remote(&mut m, "CA1", CallEventType::InProgress);
        m.handle(Trigger::ToggleMute, Utc::now());
        remote(&mut m, "CA1", CallEventType::Completed);
        let id = session_id(&m);

        m.handle(
            Trigger::Timer {
                session_id: id,
                kind: TimerKind::Reset,
            },
            Utc::now(),
        );
        assert!(m.session().is_none());
        assert_eq!(m.status(), CallStatus::Idle);

        // A late ringing for the finished call must not resurrect it
        assert!(ring(&mut m, "CA1", "15551234567").is_empty());
        assert!(m.session().is_none());
    }

    #[test]
    fn test_dismiss_only_for_post_call() {
        let mut m = machine();
        ring(&mut m, "CA1", "15559876543");
        assert!(m.handle(Trigger::DismissDisposition, Utc::now()).is_empty());
        assert_eq!(m.status(), CallStatus::Incoming);

        m.handle(Trigger::Accept, Utc::now());
        remote(&mut m, "CA1", CallEventType::Accepted);
        remote(&mut m, "CA1", CallEventType::Completed);
        let actions = m.handle(Trigger::DismissDisposition, Utc::now());
        assert!(actions.contains(&Action::CancelReset));
        assert!(m.session().is_none());
    }

    #[test]
    fn test_caller_abandons_before_answer() {
        let mut m = machine();
        ring(&mut m, "CA1", "15559876543");
        let actions = m.handle(
            Trigger::DeviceDisconnected {
                call_id: "CA1".to_string(),
            },
            Utc::now(),
        );
        assert_eq!(m.status(), CallStatus::Missed);
        assert_eq!(actions[0], Action::CancelRingTimeout);
        assert!(!actions.iter().any(|a| matches!(a, Action::RejectIncoming { .. })));
    }

    #[test]
    fn test_device_error_fails_active_call() {
        let mut m = machine();
        dial(&mut m, "15551234567", None, "CA1");
        remote(&mut m, "CA1", CallEventType::InProgress);
        m.handle(
            Trigger::DeviceError {
                call_id: None,
                message: "transport lost".to_string(),
            },
            Utc::now(),
        );
        assert_eq!(m.status(), CallStatus::Failed);
        assert!(!m.session().unwrap().is_post_call_available());
    }

    #[test]
    fn test_dial_failure_and_stale_dial_result() {
        let mut m = machine();
        let actions = m.handle(
            Trigger::StartOutbound {
                number: "15551234567".to_string(),
                case_id: None,
            },
            Utc::now(),
        );
        let Some(Action::PlaceCall { session_id, .. }) = actions.last().cloned() else {
            panic!("expected PlaceCall");
        };
        m.handle(
            Trigger::DialFailed {
                session_id: session_id.clone(),
                reason: "invalid token".to_string(),
            },
            Utc::now(),
        );
        assert_eq!(m.status(), CallStatus::Failed);

        let actions = m.handle(
            Trigger::DialSucceeded {
                session_id,
                call_id: "CA1".to_string(),
            },
            Utc::now(),
        );
        assert_eq!(actions, vec![Action::HangUpAll]);
    }
}
