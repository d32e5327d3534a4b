use callkit_client::{
    CallEvent, ConnectionPhase, OutgoingTrack, PeerTransport, RtcPeerTransport, SdpKind,
    TrackKind, TransportError, TransportEvent, TransportEventSink,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::integration::init_tracing;

fn track(kind: TrackKind, id: &str) -> OutgoingTrack {
    let codec = match kind {
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48_000,
            channels: 2,
            ..Default::default()
        },
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90_000,
            ..Default::default()
        },
    };
    OutgoingTrack {
        id: id.to_owned(),
        kind,
        rtc: Arc::new(TrackLocalStaticSample::new(
            codec,
            id.to_owned(),
            "test-stream".to_owned(),
        )),
    }
}

async fn transport(
    name: &str,
    kinds: &[TrackKind],
) -> (RtcPeerTransport, mpsc::UnboundedReceiver<CallEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let transport = RtcPeerTransport::new(&[], TransportEventSink::new(0, tx))
        .await
        .unwrap();
    for (i, kind) in kinds.iter().enumerate() {
        transport
            .add_track(&track(*kind, &format!("{}-{}", name, i)))
            .await
            .unwrap();
    }
    (transport, rx)
}

#[tokio::test]
async fn test_offer_answer_between_two_transports() {
    init_tracing();
    let (a, _a_events) = transport("a", &[TrackKind::Audio, TrackKind::Video]).await;
    let (b, _b_events) = transport("b", &[TrackKind::Audio]).await;

    let offer = a.create_offer().await.unwrap();
    assert_eq!(offer.kind, SdpKind::Offer);
    assert!(offer.sdp.contains("m=audio"));
    assert!(offer.sdp.contains("m=video"));
    a.set_local_description(offer.clone()).await.unwrap();

    b.set_remote_description(offer).await.unwrap();
    let answer = b.create_answer().await.unwrap();
    assert_eq!(answer.kind, SdpKind::Answer);
    b.set_local_description(answer.clone()).await.unwrap();

    a.set_remote_description(answer).await.unwrap();

    a.close().await.unwrap();
    b.close().await.unwrap();
}

#[tokio::test]
async fn test_abandoned_offer_lets_the_remote_offer_through() {
    init_tracing();
    let (a, _a_events) = transport("a", &[TrackKind::Audio, TrackKind::Video]).await;
    let (b, mut b_events) = transport("b", &[TrackKind::Audio, TrackKind::Video]).await;

    let a_offer = a.create_offer().await.unwrap();
    a.set_local_description(a_offer.clone()).await.unwrap();
    let b_offer = b.create_offer().await.unwrap();
    b.set_local_description(b_offer).await.unwrap();

    b.rollback().await.unwrap();
    b.set_remote_description(a_offer).await.unwrap();
    let answer = b.create_answer().await.unwrap();
    assert!(answer.sdp.contains("m=video"), "rebuilt connection keeps its tracks");
    b.set_local_description(answer.clone()).await.unwrap();
    a.set_remote_description(answer).await.unwrap();

    let mut rebuilt = false;
    while let Ok(event) = b_events.try_recv() {
        if let CallEvent::Transport {
            event: TransportEvent::PhaseChanged(phase),
            ..
        } = event
        {
            assert_ne!(phase, ConnectionPhase::Closed, "replaced connection stays silent");
            rebuilt |= phase == ConnectionPhase::New;
        }
    }
    assert!(rebuilt);

    a.close().await.unwrap();
    b.close().await.unwrap();
}

#[tokio::test]
async fn test_video_replacement_needs_a_video_sender() {
    init_tracing();
    let (audio_only, _events) = transport("audio-only", &[TrackKind::Audio]).await;
    let screen = track(TrackKind::Video, "screen");

    let result = audio_only.replace_video_track(Some(&screen)).await;
    assert!(matches!(result, Err(TransportError::NoVideoSender)));

    let (with_video, _events) = transport("with-video", &[TrackKind::Audio, TrackKind::Video]).await;
    with_video.replace_video_track(Some(&screen)).await.unwrap();

    // The swapped-in track survives a rebuild.
    let offer = with_video.create_offer().await.unwrap();
    with_video.set_local_description(offer).await.unwrap();
    with_video.rollback().await.unwrap();
    with_video.replace_video_track(None).await.unwrap();

    // Nothing to carry over once video was cleared.
    with_video.rollback().await.unwrap();
    let result = with_video.replace_video_track(Some(&screen)).await;
    assert!(matches!(result, Err(TransportError::NoVideoSender)));

    audio_only.close().await.unwrap();
    with_video.close().await.unwrap();
}
