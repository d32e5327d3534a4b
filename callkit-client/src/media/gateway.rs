use crate::config::MediaConstraints;
use crate::error::MediaError;
use crate::media::backend::SharedCaptureBackend;
use crate::media::track::{LocalTrack, TrackKind, TrackSource};
use std::future::Future;
use tracing::{debug, info};

/// Tracks captured by one acquisition, not yet installed into the gateway.
#[derive(Debug, Default)]
pub struct AcquiredMedia {
    pub audio: Option<LocalTrack>,
    pub video: Option<LocalTrack>,
}

impl AcquiredMedia {
    pub fn tracks(&self) -> impl Iterator<Item = &LocalTrack> {
        self.audio.iter().chain(self.video.iter())
    }
}

/// The single owner of local capture hardware for a call: at most one audio track and
/// one video-producing track (camera or screen, never both).
#[derive(Debug, Default)]
pub struct LocalMediaState {
    audio: Option<LocalTrack>,
    video: Option<LocalTrack>,
    audio_enabled: bool,
    camera_enabled: bool,
}

pub struct MediaGateway {
    backend: SharedCaptureBackend,
    state: LocalMediaState,
}

impl MediaGateway {
    pub fn new(backend: SharedCaptureBackend) -> Self {
        Self {
            backend,
            state: LocalMediaState {
                audio_enabled: true,
                camera_enabled: true,
                ..Default::default()
            },
        }
    }

    /// Capture microphone and/or camera. The returned future owns everything it opens,
    /// so abandoning it, or dropping its result, releases the devices.
    pub fn acquisition(
        &self,
        constraints: MediaConstraints,
    ) -> impl Future<Output = Result<AcquiredMedia, MediaError>> + Send + 'static {
        let backend = self.backend.clone();

        async move {
            if !constraints.audio && !constraints.video {
                return Err(MediaError::UnsupportedEnvironment(
                    "no audio or video requested".to_owned(),
                ));
            }

            let mut media = AcquiredMedia::default();
            if constraints.audio {
                let captured = backend.open(TrackSource::Microphone).await?;
                media.audio = Some(LocalTrack::new(TrackSource::Microphone, captured));
            }
            if constraints.video {
                // An error here drops the microphone opened above.
                let captured = backend.open(TrackSource::Camera).await?;
                media.video = Some(LocalTrack::new(TrackSource::Camera, captured));
            }
            Ok(media)
        }
    }

    /// Capture a single video source (screen for sharing, camera when restoring after it).
    pub fn video_acquisition(
        &self,
        source: TrackSource,
    ) -> impl Future<Output = Result<LocalTrack, MediaError>> + Send + 'static {
        let backend = self.backend.clone();

        async move {
            let captured = backend.open(source).await?;
            Ok(LocalTrack::new(source, captured))
        }
    }

    /// Acquire and install in one step. Calling it again replaces, and stops, what the
    /// previous call captured.
    pub async fn acquire(&mut self, constraints: MediaConstraints) -> Result<(), MediaError> {
        let media = self.acquisition(constraints).await?;
        self.install(media);
        Ok(())
    }

    /// Capture the display and make it the video source, stopping the camera.
    pub async fn acquire_display_capture(&mut self) -> Result<&mut LocalTrack, MediaError> {
        let screen = self.video_acquisition(TrackSource::Screen).await?;
        if let Some(previous) = self.state.video.take() {
            previous.stop();
        }
        Ok(self.state.video.insert(screen))
    }

    pub fn install(&mut self, media: AcquiredMedia) {
        let released = self.release();
        if released > 0 {
            debug!("Replaced {} previously captured tracks", released);
        }

        let AcquiredMedia { audio, video } = media;
        if let Some(audio) = &audio {
            audio.set_enabled(self.state.audio_enabled);
        }
        if let Some(video) = &video {
            video.set_enabled(self.state.camera_enabled);
        }
        self.state.audio = audio;
        self.state.video = video;
    }

    /// Put `track` in the video slot, stopping whatever produced video before.
    pub fn install_video(&mut self, track: LocalTrack) {
        if track.source() == TrackSource::Camera {
            track.set_enabled(self.state.camera_enabled);
        }
        if let Some(previous) = self.state.video.replace(track) {
            info!("Video source switched from {}", previous.source());
            previous.stop();
        }
    }

    /// Stop the current video track without a replacement.
    pub fn clear_video(&mut self) {
        if let Some(previous) = self.state.video.take() {
            previous.stop();
        }
    }

    /// Mute/unmute or camera off/on. A screen track ignores the camera preference.
    /// Returns false when there is no track to toggle.
    pub fn set_track_enabled(&mut self, kind: TrackKind, enabled: bool) -> bool {
        match kind {
            TrackKind::Audio => {
                self.state.audio_enabled = enabled;
                self.state.audio.as_ref().map(|t| t.set_enabled(enabled)).is_some()
            }
            TrackKind::Video => {
                self.state.camera_enabled = enabled;
                self.state
                    .video
                    .as_ref()
                    .filter(|t| t.source() == TrackSource::Camera)
                    .map(|t| t.set_enabled(enabled))
                    .is_some()
            }
        }
    }

    pub fn audio(&self) -> Option<&LocalTrack> {
        self.state.audio.as_ref()
    }

    pub fn video(&self) -> Option<&LocalTrack> {
        self.state.video.as_ref()
    }

    pub fn video_source(&self) -> Option<TrackSource> {
        self.state.video.as_ref().map(|t| t.source())
    }

    pub fn is_empty(&self) -> bool {
        self.state.audio.is_none() && self.state.video.is_none()
    }

    /// Stop every owned track. Safe to call repeatedly; returns how many were stopped.
    pub fn release(&mut self) -> usize {
        let mut released = 0;
        for track in [self.state.audio.take(), self.state.video.take()]
            .into_iter()
            .flatten()
        {
            track.stop();
            released += 1;
        }
        released
    }
}

impl Drop for MediaGateway {
    fn drop(&mut self) {
        self.release();
    }
}
