//! Session timers
//!
//! Each timer is a spawned tokio task that reports back through a callback
//! instead of touching state. Every firing carries the [`SessionId`] it was
//! armed for, and the state machine drops firings that no longer match the
//! current session. At most one task exists per [`TimerKind`].

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

use crate::state_machine::TimerKind;
use crate::types::SessionId;

/// Receives timer firings, typically by posting into the coordinator queue
pub type TimerSink = Arc<dyn Fn(SessionId, TimerKind) + Send + Sync>;

/// Each tick adds one second to the call's elapsed counter
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

struct ArmedTimer {
    session_id: SessionId,
    handle: JoinHandle<()>,
}

impl ArmedTimer {
    fn cancel(self) {
        self.handle.abort();
    }
}

/// The ring-timeout, elapsed-ticker and reset timers of one coordinator
pub struct TimerSet {
    sink: TimerSink,
    ring_timeout: Option<ArmedTimer>,
    elapsed: Option<ArmedTimer>,
    reset: Option<ArmedTimer>,
}

impl TimerSet {
    pub fn new(sink: TimerSink) -> Self {
        Self {
            sink,
            ring_timeout: None,
            elapsed: None,
            reset: None,
        }
    }

    pub fn arm_ring_timeout(&mut self, session_id: SessionId, after: Duration) {
        self.cancel_ring_timeout();
        trace!("Arming ring timeout for {} ({:?})", session_id, after);
        let handle = self.spawn_once(session_id.clone(), TimerKind::RingTimeout, after);
        self.ring_timeout = Some(ArmedTimer { session_id, handle });
    }

    pub fn cancel_ring_timeout(&mut self) {
        if let Some(timer) = self.ring_timeout.take() {
            trace!("Cancelling ring timeout for {}", timer.session_id);
            timer.cancel();
        }
    }

    /// Start the 1 Hz ticker; a second start for the same session is a no-op
    pub fn start_elapsed(&mut self, session_id: SessionId) {
        if let Some(timer) = &self.elapsed {
            if timer.session_id == session_id && !timer.handle.is_finished() {
                trace!("Elapsed ticker already running for {}", session_id);
                return;
            }
        }
        self.stop_elapsed();

        let sink = Arc::clone(&self.sink);
        let period = TICK_PERIOD;
        let id = session_id.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sink(id.clone(), TimerKind::Tick);
            }
        });
        self.elapsed = Some(ArmedTimer { session_id, handle });
    }

    pub fn stop_elapsed(&mut self) {
        if let Some(timer) = self.elapsed.take() {
            trace!("Stopping elapsed ticker for {}", timer.session_id);
            timer.cancel();
        }
    }

    pub fn schedule_reset(&mut self, session_id: SessionId, after: Duration) {
        self.cancel_reset();
        trace!("Scheduling reset of {} in {:?}", session_id, after);
        let handle = self.spawn_once(session_id.clone(), TimerKind::Reset, after);
        self.reset = Some(ArmedTimer { session_id, handle });
    }

    pub fn cancel_reset(&mut self) {
        if let Some(timer) = self.reset.take() {
            timer.cancel();
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel_ring_timeout();
        self.stop_elapsed();
        self.cancel_reset();
    }

    /// Number of timers currently armed
    pub fn armed(&self) -> usize {
        [&self.ring_timeout, &self.elapsed, &self.reset]
            .iter()
            .filter(|t| t.as_ref().is_some_and(|t| !t.handle.is_finished()))
            .count()
    }

    fn spawn_once(&self, session_id: SessionId, kind: TimerKind, after: Duration) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            time::sleep(after).await;
            sink(session_id, kind);
        })
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
