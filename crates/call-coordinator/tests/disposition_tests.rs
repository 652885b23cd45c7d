//! Post-call disposition capture through the coordinator

mod common;

use casedesk_call_coordinator::disposition::MemoryDispositionSink;
use casedesk_call_coordinator::{
    CallDirection, CallEventType, CallStatus, CoordinatorError, Disposition, Outcome,
};
use chrono::Duration as ChronoDuration;
use common::{advance, Harness};

async fn finished_call(h: &Harness) {
    let call_id = h.dial("15551234567", Some("CASE-42")).await;
    h.push(&call_id, CallDirection::Outbound, "15551234567", CallEventType::InProgress);
    h.snapshot().await;
    advance(90_500).await;
    h.push(&call_id, CallDirection::Outbound, "15551234567", CallEventType::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_submit_clears_post_call_state() {
    let h = Harness::start().await;
    finished_call(&h).await;

    let snapshot = h.snapshot().await;
    let session = snapshot.session.as_ref().unwrap();
    let follow_up = session.ended_at().unwrap().date_naive() + ChronoDuration::days(7);
    let disposition = Disposition::for_session(session, Outcome::PromiseToPay)
        .unwrap()
        .with_follow_up(follow_up)
        .with_urgency(7)
        .with_notes("Will pay on the 15th");
    assert_eq!(disposition.call_duration_seconds, 90);
    assert_eq!(disposition.case_id, "CASE-42");
    assert_eq!(disposition.status, CallStatus::Completed);

    let sink = MemoryDispositionSink::new();
    h.coordinator
        .submit_disposition(&sink, disposition.clone())
        .await
        .unwrap();

    assert_eq!(sink.records(), vec![disposition]);
    assert!(h.snapshot().await.is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_disposition_is_not_sent() {
    let h = Harness::start().await;
    finished_call(&h).await;

    let snapshot = h.snapshot().await;
    let disposition = Disposition::for_session(snapshot.session.as_ref().unwrap(), Outcome::Dispute)
        .unwrap()
        .with_urgency(0);

    let sink = MemoryDispositionSink::new();
    let err = h
        .coordinator
        .submit_disposition(&sink, disposition)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidDisposition { .. }));
    assert!(sink.records().is_empty());
    assert!(h.snapshot().await.is_post_call_available());
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_keeps_form_open() {
    let h = Harness::start().await;
    finished_call(&h).await;

    let snapshot = h.snapshot().await;
    let disposition =
        Disposition::for_session(snapshot.session.as_ref().unwrap(), Outcome::RightPartyContact)
            .unwrap();

    let sink = MemoryDispositionSink::new();
    sink.fail_with("backend unavailable");
    let err = h
        .coordinator
        .submit_disposition(&sink, disposition)
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::Disposition { .. }));
    assert_eq!(h.snapshot().await.status(), CallStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_no_disposition_for_unconnected_call() {
    let h = Harness::start().await;
    h.telephony.ring("CA1", "15559876543");
    h.coordinator.reject().unwrap();

    let snapshot = h.snapshot().await;
    let err = Disposition::for_session(snapshot.session.as_ref().unwrap(), Outcome::NoContact)
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidState { .. }));

    // dismiss only applies to post-call sessions
    h.coordinator.dismiss_disposition().unwrap();
    assert_eq!(h.snapshot().await.status(), CallStatus::Missed);
}

#[tokio::test(start_paused = true)]
async fn test_stale_submission_leaves_new_call_alone() {
    let h = Harness::start().await;
    finished_call(&h).await;
    let snapshot = h.snapshot().await;
    let disposition =
        Disposition::for_session(snapshot.session.as_ref().unwrap(), Outcome::LeftMessage)
            .unwrap();

    // The agent dismisses and takes the next call before the form is saved
    h.coordinator.dismiss_disposition().unwrap();
    h.telephony.ring("CA77", "15550001111");
    h.snapshot().await;

    let sink = MemoryDispositionSink::new();
    h.coordinator
        .submit_disposition(&sink, disposition)
        .await
        .unwrap();
    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.status(), CallStatus::Incoming);
    assert_eq!(snapshot.counterpart_number(), Some("15550001111"));
}
