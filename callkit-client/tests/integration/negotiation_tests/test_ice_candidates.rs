use callkit_client::SdpKind;
use callkit_core::SignalMessage;

use crate::integration::init_tracing;
use crate::utils::{CallHarness, TransportCall, candidate};

fn remote_candidate(call: &CallHarness, text: &str) -> SignalMessage {
    SignalMessage::ice_candidate(call.session_id.clone(), "alice".into(), candidate(text))
}

#[tokio::test]
async fn test_early_candidates_are_applied_in_order_after_the_offer() {
    init_tracing();
    let mut call = CallHarness::new("bob");
    call.start().await;
    call.peer_joined("alice").await;

    for text in ["c1", "c2", "c3"] {
        let message = remote_candidate(&call, text);
        call.deliver(message).await;
    }
    assert!(call.transports.applied_candidates().is_empty());
    assert_eq!(call.coordinator.negotiator().state().pending_candidates.len(), 3);

    call.remote_offer("alice", "alice-offer").await;

    assert_eq!(call.transports.applied_candidates(), vec!["c1", "c2", "c3"]);
    let described = call
        .transports
        .position(&TransportCall::SetRemote(SdpKind::Offer, "alice-offer".into()))
        .expect("offer applied");
    let first = call
        .transports
        .position(&TransportCall::AddCandidate("c1".into()))
        .expect("candidate applied");
    assert!(described < first);
    assert!(call.coordinator.negotiator().state().pending_candidates.is_empty());
}

#[tokio::test]
async fn test_late_candidates_are_applied_immediately() {
    init_tracing();
    let mut call = CallHarness::new("bob");
    call.start().await;
    call.remote_offer("alice", "alice-offer").await;

    let message = remote_candidate(&call, "c9");
    call.deliver(message).await;

    assert_eq!(call.transports.applied_candidates(), vec!["c9"]);
}

#[tokio::test]
async fn test_queued_candidates_wait_for_the_answer_too() {
    init_tracing();
    let mut call = CallHarness::new("alice");
    call.start().await;
    call.join_acked().await;

    let message = remote_candidate(&call, "c1");
    call.deliver(message).await;
    assert!(call.transports.applied_candidates().is_empty());

    call.remote_answer("bob", "bob-answer").await;

    assert_eq!(call.transports.applied_candidates(), vec!["c1"]);
}

#[tokio::test]
async fn test_local_candidates_are_trickled() {
    init_tracing();
    let mut call = CallHarness::new("alice");
    call.start().await;

    call.transports
        .emit(callkit_client::TransportEvent::CandidateGenerated(candidate("local-1")));
    call.settle().await;

    let sent = call
        .signaling
        .last_sent(callkit_core::SignalKind::IceCandidate)
        .expect("candidate trickled");
    assert_eq!(sent.candidate().map(|c| c.candidate.as_str()), Some("local-1"));
    assert_eq!(sent.from_participant_id.as_str(), "alice");
}
