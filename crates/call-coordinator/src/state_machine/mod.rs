//! Call session state machine
//!
//! A synchronous transition function: the machine owns the optional
//! [`CallSession`](crate::CallSession), consumes one [`Trigger`] at a time and
//! returns the [`Action`]s the coordinator must execute. It never performs I/O
//! or touches a clock of its own, which keeps every transition unit-testable.
//!
//! ```text
//!            inbound               accept            answered
//!   Idle ───────────────► Incoming ──────► Connecting ───────► InProgress
//!    │                      │  reject / 20s   ▲    │ failed/busy     │ completed / hang_up
//!    │ start_outbound_call  ▼                 │    ▼                 ▼
//!    └───────────────────────────────────────┘  Failed, NoAnswer  Completed, Disconnected
//!                          Missed                  │                 │
//!                            └──────── grace / dismiss ──────────────┴──► Idle
//! ```

pub mod actions;
pub mod machine;

pub use actions::{Action, TimerKind, Trigger};
pub use machine::{CallStateMachine, Timing};
