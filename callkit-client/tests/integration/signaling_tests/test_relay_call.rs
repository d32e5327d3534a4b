use callkit_client::{
    CallConfig, CallDeps, CallHandle, ChannelHandle, InMemorySessions, SessionStatus,
    SignalingChannel,
};
use callkit_core::{CallError, CallStatus, ParticipantId, SessionId};
use callkit_relay::RelayHandle;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

use super::{signaling_config, start_relay};
use crate::integration::init_tracing;
use crate::utils::{FakeCapture, FakeTransports, SESSION};

const WAIT: Duration = Duration::from_secs(5);

struct Participant {
    call: CallHandle,
    channel: ChannelHandle,
    capture: Arc<FakeCapture>,
    errors: broadcast::Receiver<CallError>,
}

async fn join_call(relay: &RelayHandle, token: &str, sessions: &InMemorySessions) -> Participant {
    let channel = SignalingChannel::connect(signaling_config(relay), token)
        .await
        .expect("relay connection");
    let capture = FakeCapture::new();

    let deps = CallDeps {
        session_id: SessionId::from(SESSION),
        signaling: Arc::new(channel.clone()),
        capture: capture.clone(),
        transports: Arc::new(FakeTransports::auto_connecting()),
        sessions: Arc::new(sessions.clone()),
    };
    let call = CallHandle::spawn(deps, CallConfig::default());
    let errors = call.errors();
    call.start();

    Participant {
        call,
        channel,
        capture,
        errors,
    }
}

async fn until_connected(participant: &Participant) {
    timeout(WAIT, participant.call.wait_for_status(CallStatus::Connected))
        .await
        .expect("call did not connect in time")
        .expect("call loop ended");
}

#[tokio::test]
async fn test_staggered_participants_connect_through_the_relay() {
    init_tracing();
    let relay = start_relay(0).await;
    let sessions = InMemorySessions::new().with_session(SESSION, SessionStatus::InProgress);

    let alice = join_call(&relay, "alice", &sessions).await;
    sleep(Duration::from_millis(50)).await;
    let bob = join_call(&relay, "bob", &sessions).await;

    until_connected(&alice).await;
    until_connected(&bob).await;

    assert!(alice.call.snapshot().remote_participant_present);
    assert!(bob.call.snapshot().remote_participant_present);
    assert_eq!(relay.service.rooms().members(&SESSION.into()).len(), 2);
}

#[tokio::test]
async fn test_leaving_participant_disconnects_the_other() {
    init_tracing();
    let relay = start_relay(0).await;
    let sessions = InMemorySessions::new().with_session(SESSION, SessionStatus::InProgress);
    let alice = join_call(&relay, "alice", &sessions).await;
    let bob = join_call(&relay, "bob", &sessions).await;
    until_connected(&alice).await;
    until_connected(&bob).await;

    bob.call.leave();

    timeout(WAIT, alice.call.wait_for(|s| !s.remote_participant_present))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.call.status(), CallStatus::Disconnected);
    timeout(WAIT, bob.call.wait_for_status(CallStatus::Ended))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bob.capture.live(), 0);
    assert_eq!(relay.service.rooms().members(&SESSION.into()), vec![ParticipantId::from("alice")]);
}

#[tokio::test]
async fn test_relay_drop_is_invisible_to_a_connected_call() {
    init_tracing();
    let relay = start_relay(1_000).await;
    let sessions = InMemorySessions::new().with_session(SESSION, SessionStatus::InProgress);
    let alice = join_call(&relay, "alice", &sessions).await;
    let bob = join_call(&relay, "bob", &sessions).await;
    until_connected(&alice).await;
    until_connected(&bob).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut watch = alice.call.watch();
    let recorder = tokio::spawn({
        let seen = seen.clone();
        async move {
            while watch.changed().await.is_ok() {
                let status = watch.borrow_and_update().status;
                seen.lock().unwrap().push(status);
            }
        }
    });
    let mut errors = alice.call.errors();

    assert!(relay.service.drop_connection(&"alice".into()));

    let warning = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(warning, CallError::SignalingDisconnected);
    timeout(WAIT, alice.call.wait_for(|s| !s.signaling_degraded))
        .await
        .unwrap()
        .unwrap();

    // Past the seat grace: the relay must not have announced alice as gone.
    sleep(Duration::from_millis(1_200)).await;
    recorder.abort();

    assert_eq!(alice.call.status(), CallStatus::Connected);
    assert_eq!(bob.call.status(), CallStatus::Connected);
    assert!(
        seen.lock().unwrap().iter().all(|s| *s == CallStatus::Connected),
        "alice left connected: {:?}",
        seen.lock().unwrap()
    );
    assert_eq!(relay.service.rooms().members(&SESSION.into()).len(), 2);
    alice.channel.close();
    bob.channel.close();
}

#[tokio::test]
async fn test_third_participant_is_refused_and_ends() {
    init_tracing();
    let relay = start_relay(0).await;
    let sessions = InMemorySessions::new().with_session(SESSION, SessionStatus::InProgress);
    let alice = join_call(&relay, "alice", &sessions).await;
    let bob = join_call(&relay, "bob", &sessions).await;
    until_connected(&alice).await;
    until_connected(&bob).await;

    let mut carol = join_call(&relay, "carol", &sessions).await;

    let error = timeout(WAIT, carol.errors.recv()).await.unwrap().unwrap();
    assert!(
        matches!(&error, CallError::RoomRefused(reason) if reason.contains("full")),
        "unexpected error {:?}",
        error
    );
    timeout(WAIT, carol.call.wait_for_status(CallStatus::Ended))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(carol.capture.live(), 0);

    assert_eq!(alice.call.status(), CallStatus::Connected);
    assert_eq!(bob.call.status(), CallStatus::Connected);
    assert_eq!(relay.service.rooms().members(&SESSION.into()).len(), 2);
}
