//! Shared harness for coordinator integration tests

#![allow(dead_code)]

use casedesk_call_coordinator::adapters::{MemoryChannel, MemoryTelephony};
use casedesk_call_coordinator::{
    CallCoordinator, CallDirection, CallEvent, CallEventType, CallSnapshot, CoordinatorConfig,
    CoordinatorEvent, EventStream,
};
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub coordinator: CallCoordinator,
    pub telephony: Arc<MemoryTelephony>,
    pub channel: Arc<MemoryChannel>,
    pub events: EventStream,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_with(CoordinatorConfig::new().with_room_key("agent-1")).await
    }

    pub async fn start_with(config: CoordinatorConfig) -> Self {
        Self::start_with_adapters(config, MemoryTelephony::new(), MemoryChannel::new()).await
    }

    pub async fn start_with_adapters(
        config: CoordinatorConfig,
        telephony: MemoryTelephony,
        channel: MemoryChannel,
    ) -> Self {
        let telephony = Arc::new(telephony);
        let channel = Arc::new(channel);
        let coordinator =
            CallCoordinator::start(config, telephony.clone(), channel.clone(), "token-1")
                .expect("coordinator should start");
        let events = coordinator.subscribe();

        let harness = Self {
            coordinator,
            telephony,
            channel,
            events,
        };
        // Wait for registration and channel connection
        harness.snapshot().await;
        harness
    }

    pub async fn snapshot(&self) -> CallSnapshot {
        self.coordinator
            .snapshot()
            .await
            .expect("coordinator should be running")
    }

    /// Push a carrier status update through the channel
    pub fn push(&self, call_id: &str, direction: CallDirection, number: &str, event: CallEventType) {
        self.channel
            .push(CallEvent::new(call_id, direction, number, event));
    }

    /// Dial out and return the vendor call id the device assigned
    pub async fn dial(&self, number: &str, case_id: Option<&str>) -> String {
        self.coordinator
            .start_outbound_call(number, case_id)
            .expect("number should be valid");
        self.snapshot()
            .await
            .session
            .and_then(|s| s.call_id().map(str::to_string))
            .expect("outbound call should be bound to a call id")
    }

    /// Ring, accept and connect an inbound call
    pub async fn connected_inbound(&self, call_id: &str, number: &str) {
        self.telephony.ring(call_id, number);
        self.coordinator.accept().expect("accept");
        self.push(call_id, CallDirection::Inbound, number, CallEventType::InProgress);
        self.snapshot().await;
    }

    pub fn drain_events(&mut self) -> Vec<CoordinatorEvent> {
        self.events.drain()
    }
}

pub async fn advance(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
