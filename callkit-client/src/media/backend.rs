use crate::error::MediaError;
use crate::media::track::TrackSource;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// An open OS-level capture device (microphone, camera or display).
pub trait CaptureDevice: Send + Sync {
    fn label(&self) -> String;

    /// Start writing encoded samples into `sink`.
    fn bind(&self, sink: Arc<TrackLocalStaticSample>);

    /// Keep the device open but stop producing samples (mute / camera off).
    fn set_enabled(&self, enabled: bool);

    /// Release the hardware. Turns the OS capture indicator off.
    fn stop(&self);
}

pub struct CapturedDevice {
    pub device: Box<dyn CaptureDevice>,
    /// Resolves when the platform ends the capture on its own.
    pub ended: Option<oneshot::Receiver<()>>,
}

impl CapturedDevice {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self { device, ended: None }
    }

    pub fn with_ended(mut self, ended: oneshot::Receiver<()>) -> Self {
        self.ended = Some(ended);
        self
    }
}

/// Host capture API. Implementations wrap whatever the platform offers; they must
/// report a missing API or insecure context as [`MediaError::UnsupportedEnvironment`].
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn open(&self, source: TrackSource) -> Result<CapturedDevice, MediaError>;
}

pub type SharedCaptureBackend = Arc<dyn CaptureBackend>;
