use callkit_client::ChannelStatus;
use callkit_core::{CallError, CallStatus, SessionId, SignalKind, SignalMessage};

use crate::integration::init_tracing;
use crate::utils::CallHarness;

#[tokio::test]
async fn test_relay_drop_keeps_a_connected_call() {
    init_tracing();
    let mut call = CallHarness::new("alice");
    call.connect_to("bob").await;

    call.channel_status(ChannelStatus::Reconnecting { attempt: 1 }).await;

    let snapshot = call.coordinator.snapshot();
    assert_eq!(snapshot.status, CallStatus::Connected);
    assert!(snapshot.signaling_degraded);
    assert_eq!(call.drain_errors(), vec![CallError::SignalingDisconnected]);

    call.channel_status(ChannelStatus::Reconnecting { attempt: 2 }).await;
    assert!(call.drain_errors().is_empty(), "warning surfaced once per outage");

    call.channel_status(ChannelStatus::Connected).await;

    let snapshot = call.coordinator.snapshot();
    assert_eq!(snapshot.status, CallStatus::Connected);
    assert!(!snapshot.signaling_degraded);
}

#[tokio::test]
async fn test_lost_relay_strands_an_unfinished_negotiation() {
    init_tracing();
    let mut call = CallHarness::new("alice");
    call.start().await;

    call.channel_status(ChannelStatus::Closed).await;

    assert_eq!(call.status(), CallStatus::Disconnected);
    assert_eq!(call.drain_errors(), vec![CallError::SignalingDisconnected]);
}

#[tokio::test]
async fn test_lost_relay_does_not_touch_established_media() {
    init_tracing();
    let mut call = CallHarness::new("alice");
    call.connect_to("bob").await;

    call.channel_status(ChannelStatus::Reconnecting { attempt: 1 }).await;
    call.channel_status(ChannelStatus::Closed).await;

    assert_eq!(call.status(), CallStatus::Connected);
    assert_eq!(call.drain_errors(), vec![CallError::SignalingDisconnected]);
    assert_eq!(call.capture.live(), 2);
}

#[tokio::test]
async fn test_leave_unsubscribes_from_the_room() {
    init_tracing();
    let mut call = CallHarness::new("alice");
    call.connect_to("bob").await;
    assert_eq!(call.signaling.handler_count(&call.session_id), SignalKind::INBOUND.len());

    call.leave().await;

    assert_eq!(call.signaling.handler_count(&call.session_id), 0);
    let late = SignalMessage::offer(call.session_id.clone(), "bob".into(), "late".into());
    assert!(!call.signaling.deliver(late));
}

#[tokio::test]
async fn test_other_rooms_are_not_delivered() {
    init_tracing();
    let mut call = CallHarness::new("alice");
    call.start().await;

    let elsewhere = SignalMessage::new(SignalKind::PeerJoined, SessionId::from("other"), "eve".into());

    assert!(!call.signaling.deliver(elsewhere));
    assert!(!call.coordinator.snapshot().remote_participant_present);
}
