//! # casedesk call coordinator
//!
//! The agent-side owner of "what call is the agent on right now". It sits
//! between a voice SDK (the [`TelephonyAdapter`]) and a push channel that
//! reports carrier status (the [`StatusChannel`]) and keeps exactly one
//! authoritative [`CallSession`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use casedesk_call_coordinator::adapters::{MemoryChannel, MemoryTelephony};
//! use casedesk_call_coordinator::{CallCoordinator, CoordinatorConfig, CoordinatorEvent};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let telephony = Arc::new(MemoryTelephony::new());
//!     let coordinator = CallCoordinator::start(
//!         CoordinatorConfig::new().with_room_key("agent-42"),
//!         telephony.clone(),
//!         Arc::new(MemoryChannel::new()),
//!         "voice-token",
//!     )?;
//!
//!     let mut events = coordinator.subscribe();
//!     telephony.ring("CA100", "+1 555 987 6543");
//!
//!     while let Some(event) = events.recv().await {
//!         if let CoordinatorEvent::IncomingCall { .. } = event {
//!             coordinator.accept()?;
//!             break;
//!         }
//!     }
//!
//!     coordinator.logout().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`state_machine`]: pure transition function, one trigger in, actions out
//! - [`coordinator`]: the actor that serializes every input and runs actions
//! - [`timers`]: ring timeout, elapsed ticker and reset delay
//! - [`adapters`]: boundary traits, subscriptions and in-memory implementations
//! - [`disposition`]: post-call record capture

pub mod adapters;
pub mod config;
pub mod coordinator;
pub mod disposition;
pub mod error;
pub mod events;
pub mod logging;
pub mod phone;
pub mod state_machine;
pub mod timers;
pub mod types;

pub use adapters::{
    CallEvent, CallEventType, DialContext, StatusChannel, Subscription, TelephonyAdapter,
    TelephonyEvent, VoicemailEvent,
};
pub use config::CoordinatorConfig;
pub use coordinator::CallCoordinator;
pub use disposition::{Disposition, DispositionSink, Outcome};
pub use error::{CoordinatorError, CoordinatorResult};
pub use events::{CoordinatorEvent, EventStream};
pub use logging::{setup_logging, LoggingConfig};
pub use phone::normalize_number;
pub use types::{
    CallDirection, CallSession, CallSnapshot, CallStatus, ChannelStatus, DeviceStatus,
    NavigationTarget, SessionId,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
