//! Post-call disposition capture
//!
//! Once a call ends in the completed class the coordinator offers a
//! disposition form. The record is validated here and handed to a
//! [`DispositionSink`], which owns persistence and any retry policy.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::types::{CallSession, CallStatus, SessionId};

pub const MIN_URGENCY: u8 = 1;
pub const MAX_URGENCY: u8 = 10;

/// Result of the conversation, as recorded by the agent
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    PromiseToPay,
    PaymentMade,
    RightPartyContact,
    WrongNumber,
    LeftMessage,
    NoContact,
    Dispute,
    Callback,
    Other,
}

impl Outcome {
    /// Outcomes that only make sense with a follow-up date
    pub fn requires_follow_up(&self) -> bool {
        matches!(self, Outcome::PromiseToPay | Outcome::Callback)
    }
}

/// A disposition record for one finished call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disposition {
    /// Session the record belongs to, when created from one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub case_id: String,
    pub counterpart_number: String,
    pub outcome: Outcome,
    pub status: CallStatus,
    pub call_ended_at: DateTime<Utc>,
    pub call_duration_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_date: Option<NaiveDate>,
    pub urgency_score: u8,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl Disposition {
    /// Prefill a record from a finished session
    pub fn for_session(session: &CallSession, outcome: Outcome) -> CoordinatorResult<Self> {
        if !session.is_post_call_available() {
            return Err(CoordinatorError::invalid_state(format!(
                "session {} has no post-call disposition ({})",
                session.session_id(),
                session.status()
            )));
        }
        let case_id = session.case_id().ok_or_else(|| {
            CoordinatorError::invalid_disposition("call is not linked to a case")
        })?;

        Ok(Self {
            session_id: Some(session.session_id().clone()),
            case_id: case_id.to_string(),
            counterpart_number: session.counterpart_number().to_string(),
            outcome,
            status: session.status(),
            call_ended_at: session.ended_at().unwrap_or_else(Utc::now),
            call_duration_seconds: session.duration_seconds(),
            follow_up_date: None,
            urgency_score: MIN_URGENCY,
            flags: Vec::new(),
            notes: String::new(),
        })
    }

    pub fn with_follow_up(mut self, date: NaiveDate) -> Self {
        self.follow_up_date = Some(date);
        self
    }

    pub fn with_urgency(mut self, score: u8) -> Self {
        self.urgency_score = score;
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn validate(&self) -> CoordinatorResult<()> {
        if self.case_id.trim().is_empty() {
            return Err(CoordinatorError::invalid_disposition("case id is required"));
        }
        if !(MIN_URGENCY..=MAX_URGENCY).contains(&self.urgency_score) {
            return Err(CoordinatorError::invalid_disposition(format!(
                "urgency score {} outside {}..={}",
                self.urgency_score, MIN_URGENCY, MAX_URGENCY
            )));
        }
        if !self.status.is_terminal() {
            return Err(CoordinatorError::invalid_disposition(format!(
                "call status {} is not final",
                self.status
            )));
        }

        match self.follow_up_date {
            Some(date) if date < self.call_ended_at.date_naive() => {
                return Err(CoordinatorError::invalid_disposition(format!(
                    "follow-up date {} precedes the call date {}",
                    date,
                    self.call_ended_at.date_naive()
                )));
            }
            None if self.outcome.requires_follow_up() => {
                return Err(CoordinatorError::invalid_disposition(format!(
                    "{:?} requires a follow-up date",
                    self.outcome
                )));
            }
            _ => {}
        }

        if self.flags.iter().any(|f| f.trim().is_empty()) {
            return Err(CoordinatorError::invalid_disposition("empty flag"));
        }
        Ok(())
    }

    pub fn to_json(&self) -> CoordinatorResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Destination for submitted dispositions
#[async_trait]
pub trait DispositionSink: Send + Sync {
    async fn submit(&self, disposition: &Disposition) -> CoordinatorResult<()>;
}

/// Sink that keeps submitted records in memory
#[derive(Default)]
pub struct MemoryDispositionSink {
    records: Mutex<Vec<Disposition>>,
    failure: Mutex<Option<String>>,
}

impl MemoryDispositionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `submit` fail with this message
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    pub fn records(&self) -> Vec<Disposition> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl DispositionSink for MemoryDispositionSink {
    async fn submit(&self, disposition: &Disposition) -> CoordinatorResult<()> {
        if let Some(message) = self.failure.lock().clone() {
            return Err(CoordinatorError::disposition(message));
        }
        self.records.lock().push(disposition.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> Disposition {
        Disposition {
            session_id: None,
            case_id: "CASE-100".to_string(),
            counterpart_number: "15551234567".to_string(),
            outcome: Outcome::RightPartyContact,
            status: CallStatus::Completed,
            call_ended_at: Utc.with_ymd_and_hms(2026, 3, 10, 15, 30, 0).unwrap(),
            call_duration_seconds: 184,
            follow_up_date: None,
            urgency_score: 4,
            flags: vec![],
            notes: String::new(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_valid_record() {
        assert!(record().validate().is_ok());
        assert!(record()
            .with_follow_up(date(2026, 3, 10))
            .with_urgency(10)
            .with_flag("hardship")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_urgency_bounds() {
        for score in [0, 11, 255] {
            let err = record().with_urgency(score).validate().unwrap_err();
            assert!(matches!(err, CoordinatorError::InvalidDisposition { .. }), "{score}");
        }
    }

    #[test]
    fn test_follow_up_before_call_rejected() {
        let err = record()
            .with_follow_up(date(2026, 3, 9))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("precedes"));
    }

    #[test]
    fn test_promise_needs_follow_up() {
        let mut promise = record();
        promise.outcome = Outcome::PromiseToPay;
        assert!(promise.validate().is_err());
        assert!(promise.with_follow_up(date(2026, 3, 17)).validate().is_ok());
    }

    #[test]
    fn test_blank_case_id_rejected() {
        let mut blank = record();
        blank.case_id = "  ".to_string();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&record().to_json().unwrap()).unwrap();
        assert_eq!(json["caseId"], "CASE-100");
        assert_eq!(json["outcome"], "right_party_contact");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["callDurationSeconds"], 184);
        assert!(json.get("followUpDate").is_none());
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let sink = MemoryDispositionSink::new();
        sink.submit(&record()).await.unwrap();
        assert_eq!(sink.records().len(), 1);

        sink.fail_with("backend unavailable");
        let err = sink.submit(&record()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Disposition { .. }));
        assert_eq!(sink.records().len(), 1);
    }
}
