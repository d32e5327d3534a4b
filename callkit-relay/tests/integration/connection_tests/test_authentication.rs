use callkit_core::{IceServerConfig, RelayFrame};
use callkit_relay::{RelayConfig, StaticTokens};
use std::sync::Arc;

use crate::integration::{init_tracing, start_relay, start_relay_with, test_config};
use crate::utils::{WsClient, open, recv, send};

#[tokio::test]
async fn test_welcome_carries_identity_and_ice_servers() {
    init_tracing();
    let relay = start_relay_with(RelayConfig {
        ice_servers: vec![IceServerConfig {
            urls: vec!["turn:turn.example.org:3478".to_owned()],
            username: Some("u".to_owned()),
            credential: Some("p".to_owned()),
        }],
        ..test_config()
    })
    .await;

    let client = WsClient::connect(&relay.url(), "alice").await.expect("connect");

    assert_eq!(client.participant_id.as_str(), "alice");
    assert_eq!(client.ice_servers.len(), 1);
    assert_eq!(client.ice_servers[0].urls, vec!["turn:turn.example.org:3478".to_owned()]);
    assert!(relay.service.is_connected(&"alice".into()));
}

#[tokio::test]
async fn test_signal_before_authentication_is_rejected() {
    init_tracing();
    let relay = start_relay().await;
    let mut ws = open(&relay.url()).await.expect("open");

    let join = callkit_core::SignalMessage::new(
        callkit_core::SignalKind::Join,
        "s".into(),
        "sneaky".into(),
    );
    send(&mut ws, &RelayFrame::Signal(join)).await.expect("send");

    match recv(&mut ws).await.expect("reply") {
        RelayFrame::Rejected { reason } => assert!(reason.contains("authenticate")),
        other => panic!("expected rejected, got {other:?}"),
    }
    assert_eq!(relay.service.rooms().room_count(), 0);
}

#[tokio::test]
async fn test_silent_connection_times_out() {
    init_tracing();
    let relay = start_relay().await;
    let mut ws = open(&relay.url()).await.expect("open");

    match recv(&mut ws).await.expect("reply") {
        RelayFrame::Rejected { reason } => assert!(reason.contains("timed out")),
        other => panic!("expected rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_token_is_rejected() {
    init_tracing();
    let tokens = StaticTokens::new().with_token("secret", "interviewer");
    let relay = callkit_relay::spawn(test_config(), Arc::new(tokens))
        .await
        .expect("relay");

    assert!(WsClient::connect(&relay.url(), "guess").await.is_err());

    let client = WsClient::connect(&relay.url(), "secret").await.expect("connect");
    assert_eq!(client.participant_id.as_str(), "interviewer");
}
