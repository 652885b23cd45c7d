//! Scripted call scenarios for the `simulate` command
//!
//! A script is a JSON array of steps run in order against the in-memory
//! adapters:
//!
//! ```json
//! [
//!   { "op": "ring", "callId": "CA1", "from": "+1 555 987 6543", "caseId": "CASE-7" },
//!   { "op": "accept" },
//!   { "op": "carrier", "eventType": "in-progress" },
//!   { "op": "wait", "seconds": 3 },
//!   { "op": "hang-up" }
//! ]
//! ```

use anyhow::{bail, Context, Result};
use casedesk_call_coordinator::adapters::{MemoryChannel, MemoryTelephony};
use casedesk_call_coordinator::disposition::MemoryDispositionSink;
use casedesk_call_coordinator::{
    CallCoordinator, CallEvent, CallEventType, CallSnapshot, Disposition, Outcome, TelephonyEvent,
    VoicemailEvent,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One scripted step
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Step {
    /// Inbound call rings on the device
    #[serde(rename_all = "camelCase")]
    Ring {
        call_id: String,
        from: String,
        #[serde(default)]
        case_id: Option<String>,
    },
    Accept,
    Reject,
    HangUp,
    Mute,
    #[serde(rename_all = "camelCase")]
    Dial {
        number: String,
        #[serde(default)]
        case_id: Option<String>,
    },
    /// Carrier status update through the channel; defaults to the current call
    #[serde(rename_all = "camelCase")]
    Carrier {
        event_type: CallEventType,
        #[serde(default)]
        call_id: Option<String>,
    },
    /// The device drops the current leg
    DeviceHangUp,
    #[serde(rename_all = "camelCase")]
    Voicemail {
        call_id: String,
        from: String,
        #[serde(default)]
        duration_seconds: u32,
    },
    ChannelDrop,
    ChannelRestore,
    /// Submit a disposition for the finished call
    #[serde(rename_all = "camelCase")]
    Dispose {
        outcome: Outcome,
        #[serde(default = "default_urgency")]
        urgency: u8,
        #[serde(default)]
        follow_up_days: Option<i64>,
        #[serde(default)]
        notes: String,
    },
    Dismiss,
    Wait {
        seconds: f64,
    },
}

fn default_urgency() -> u8 {
    5
}

pub fn load(path: &Path) -> Result<Vec<Step>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading script {}", path.display()))?;
    parse(&text).with_context(|| format!("parsing script {}", path.display()))
}

pub fn parse(text: &str) -> Result<Vec<Step>> {
    Ok(serde_json::from_str(text)?)
}

/// Coordinator plus the adapters a script drives
pub struct Simulation {
    pub coordinator: CallCoordinator,
    pub telephony: Arc<MemoryTelephony>,
    pub channel: Arc<MemoryChannel>,
    pub sink: MemoryDispositionSink,
}

impl Simulation {
    /// Execute one step and return the resulting snapshot
    pub async fn run_step(&self, step: &Step) -> Result<CallSnapshot> {
        debug!("Running step {:?}", step);
        match step {
            Step::Ring {
                call_id,
                from,
                case_id,
            } => {
                self.telephony.emit(TelephonyEvent::Incoming {
                    call_id: call_id.clone(),
                    from: from.clone(),
                    case_id: case_id.clone(),
                });
            }
            Step::Accept => self.coordinator.accept()?,
            Step::Reject => self.coordinator.reject()?,
            Step::HangUp => self.coordinator.hang_up()?,
            Step::Mute => self.coordinator.toggle_mute()?,
            Step::Dial { number, case_id } => {
                self.coordinator
                    .start_outbound_call(number, case_id.as_deref())?;
            }
            Step::Carrier {
                event_type,
                call_id,
            } => {
                let snapshot = self.coordinator.snapshot().await?;
                let Some(session) = snapshot.session.as_ref() else {
                    bail!("carrier update {:?} with no call", event_type);
                };
                let call_id = match call_id {
                    Some(id) => id.clone(),
                    None => session
                        .call_id()
                        .map(str::to_string)
                        .context("current call has no call id yet")?,
                };
                self.channel.push(CallEvent::new(
                    call_id,
                    session.direction(),
                    session.counterpart_number(),
                    *event_type,
                ));
            }
            Step::DeviceHangUp => {
                let snapshot = self.coordinator.snapshot().await?;
                if let Some(call_id) = snapshot.session.as_ref().and_then(|s| s.call_id()) {
                    self.telephony.emit(TelephonyEvent::Disconnected {
                        call_id: call_id.to_string(),
                    });
                }
            }
            Step::Voicemail {
                call_id,
                from,
                duration_seconds,
            } => {
                self.channel.push_voicemail(VoicemailEvent {
                    call_id: call_id.clone(),
                    counterpart_number: from.clone(),
                    case_id: None,
                    recording_url: None,
                    duration_seconds: *duration_seconds,
                    timestamp: Utc::now(),
                });
            }
            Step::ChannelDrop => self.channel.drop_connection(),
            Step::ChannelRestore => self.channel.restore_connection(),
            Step::Dispose {
                outcome,
                urgency,
                follow_up_days,
                notes,
            } => {
                let snapshot = self.coordinator.snapshot().await?;
                let session = snapshot
                    .session
                    .as_ref()
                    .context("no finished call to dispose")?;
                let mut disposition = Disposition::for_session(session, *outcome)?
                    .with_urgency(*urgency)
                    .with_notes(notes.clone());
                if let Some(days) = follow_up_days {
                    disposition = disposition
                        .with_follow_up(Utc::now().date_naive() + ChronoDuration::days(*days));
                }
                self.coordinator
                    .submit_disposition(&self.sink, disposition)
                    .await?;
            }
            Step::Dismiss => self.coordinator.dismiss_disposition()?,
            Step::Wait { seconds } => {
                let Ok(wait) = Duration::try_from_secs_f64(*seconds) else {
                    bail!("invalid wait of {} seconds", seconds);
                };
                tokio::time::sleep(wait).await;
            }
        }
        Ok(self.coordinator.snapshot().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_steps() {
        let steps = parse(
            r#"[
                {"op": "ring", "callId": "CA1", "from": "+1 555 987 6543"},
                {"op": "accept"},
                {"op": "carrier", "eventType": "in-progress"},
                {"op": "wait", "seconds": 1.5},
                {"op": "hang-up"},
                {"op": "dispose", "outcome": "promise_to_pay", "followUpDays": 3}
            ]"#,
        )
        .unwrap();

        assert_eq!(steps.len(), 6);
        assert_eq!(
            steps[0],
            Step::Ring {
                call_id: "CA1".to_string(),
                from: "+1 555 987 6543".to_string(),
                case_id: None,
            }
        );
        assert_eq!(
            steps[2],
            Step::Carrier {
                event_type: CallEventType::InProgress,
                call_id: None,
            }
        );
        assert_eq!(steps[4], Step::HangUp);
        assert_eq!(
            steps[5],
            Step::Dispose {
                outcome: Outcome::PromiseToPay,
                urgency: 5,
                follow_up_days: Some(3),
                notes: String::new(),
            }
        );
    }

    #[test]
    fn test_unknown_op_rejected() {
        assert!(parse(r#"[{"op": "teleport"}]"#).is_err());
    }

    #[tokio::test]
    async fn test_out_of_range_wait_is_an_error() {
        let telephony = Arc::new(MemoryTelephony::new());
        let channel = Arc::new(MemoryChannel::new());
        let coordinator = CallCoordinator::start(
            casedesk_call_coordinator::CoordinatorConfig::new(),
            telephony.clone(),
            channel.clone(),
            "token",
        )
        .unwrap();
        let sim = Simulation {
            coordinator,
            telephony,
            channel,
            sink: MemoryDispositionSink::new(),
        };
        for seconds in [1e30, -1.0, f64::NAN] {
            let err = sim.run_step(&Step::Wait { seconds }).await.unwrap_err();
            assert!(err.to_string().contains("invalid wait"), "{err}");
        }
        sim.coordinator.logout().await.unwrap();
    }

    #[test]
    fn test_bundled_scripts_parse() {
        for script in ["inbound_call.json", "outbound_call.json", "busy_agent.json"] {
            let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scripts").join(script);
            let steps = load(&path).unwrap();
            assert!(!steps.is_empty(), "{script}");
        }
    }
}
