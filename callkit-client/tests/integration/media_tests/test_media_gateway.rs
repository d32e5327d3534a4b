use callkit_client::{MediaConstraints, MediaError, MediaGateway, TrackKind, TrackSource};

use crate::integration::init_tracing;
use crate::utils::FakeCapture;

#[tokio::test]
async fn test_acquiring_again_releases_previous_tracks() {
    init_tracing();
    let capture = FakeCapture::new();
    let mut gateway = MediaGateway::new(capture.clone());

    gateway.acquire(MediaConstraints::default()).await.unwrap();
    gateway.acquire(MediaConstraints::default()).await.unwrap();

    assert_eq!(capture.opened().len(), 4);
    assert_eq!(capture.live(), 2);
    assert!(gateway.audio().is_some());
    assert_eq!(gateway.video_source(), Some(TrackSource::Camera));
}

#[tokio::test]
async fn test_release_is_idempotent() {
    init_tracing();
    let capture = FakeCapture::new();
    let mut gateway = MediaGateway::new(capture.clone());
    gateway.acquire(MediaConstraints::default()).await.unwrap();

    assert_eq!(gateway.release(), 2);
    assert_eq!(gateway.release(), 0);
    drop(gateway);

    assert_eq!(capture.stopped().len(), 2);
    assert_eq!(capture.live(), 0);
}

#[tokio::test]
async fn test_dropping_the_gateway_stops_devices() {
    init_tracing();
    let capture = FakeCapture::new();
    let mut gateway = MediaGateway::new(capture.clone());
    gateway.acquire(MediaConstraints::default()).await.unwrap();

    drop(gateway);

    assert_eq!(capture.live(), 0);
}

#[tokio::test]
async fn test_camera_failure_releases_the_microphone() {
    init_tracing();
    let capture = FakeCapture::new();
    capture.fail(TrackSource::Camera, MediaError::DeviceBusy(TrackSource::Camera));
    let mut gateway = MediaGateway::new(capture.clone());

    let err = gateway.acquire(MediaConstraints::default()).await.unwrap_err();

    assert_eq!(err, MediaError::DeviceBusy(TrackSource::Camera));
    assert!(gateway.is_empty());
    assert_eq!(capture.opened(), vec![TrackSource::Microphone]);
    assert_eq!(capture.live(), 0);
}

#[tokio::test]
async fn test_requesting_nothing_is_unsupported() {
    init_tracing();
    let capture = FakeCapture::new();
    let mut gateway = MediaGateway::new(capture.clone());

    let err = gateway
        .acquire(MediaConstraints {
            audio: false,
            video: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::UnsupportedEnvironment(_)));
    assert!(capture.opened().is_empty());
}

#[tokio::test]
async fn test_display_capture_takes_the_video_slot() {
    init_tracing();
    let capture = FakeCapture::new();
    let mut gateway = MediaGateway::new(capture.clone());
    gateway.acquire(MediaConstraints::default()).await.unwrap();

    let screen = gateway.acquire_display_capture().await.unwrap();
    assert_eq!(screen.source(), TrackSource::Screen);

    assert_eq!(gateway.video_source(), Some(TrackSource::Screen));
    assert_eq!(capture.live_of(TrackSource::Camera), 0);
    assert_eq!(capture.live_of(TrackSource::Screen), 1);
    assert_eq!(capture.live_of(TrackSource::Microphone), 1);
}

#[tokio::test]
async fn test_denied_display_capture_keeps_the_camera() {
    init_tracing();
    let capture = FakeCapture::new();
    capture.fail(TrackSource::Screen, MediaError::PermissionDenied(TrackSource::Screen));
    let mut gateway = MediaGateway::new(capture.clone());
    gateway.acquire(MediaConstraints::default()).await.unwrap();

    assert!(gateway.acquire_display_capture().await.is_err());

    assert_eq!(gateway.video_source(), Some(TrackSource::Camera));
    assert_eq!(capture.live_of(TrackSource::Camera), 1);
}

#[tokio::test]
async fn test_track_preferences_survive_reacquisition() {
    init_tracing();
    let capture = FakeCapture::new();
    let mut gateway = MediaGateway::new(capture.clone());
    gateway.acquire(MediaConstraints::default()).await.unwrap();

    assert!(gateway.set_track_enabled(TrackKind::Audio, false));
    assert_eq!(capture.enabled_of(TrackSource::Microphone), Some(false));

    gateway.acquire(MediaConstraints::default()).await.unwrap();

    assert_eq!(capture.enabled_of(TrackSource::Microphone), Some(false));
    assert_eq!(capture.enabled_of(TrackSource::Camera), Some(true));
}

#[tokio::test]
async fn test_camera_toggle_does_not_touch_a_screen_track() {
    init_tracing();
    let capture = FakeCapture::new();
    let mut gateway = MediaGateway::new(capture.clone());
    gateway.acquire(MediaConstraints::default()).await.unwrap();
    gateway.acquire_display_capture().await.unwrap();

    assert!(!gateway.set_track_enabled(TrackKind::Video, false));
    assert_eq!(capture.enabled_of(TrackSource::Screen), None);
}

#[tokio::test]
async fn test_toggle_without_tracks_reports_nothing_changed() {
    init_tracing();
    let mut gateway = MediaGateway::new(FakeCapture::new());

    assert!(!gateway.set_track_enabled(TrackKind::Audio, false));
}
