use crate::error::TransportError;
use crate::media::{OutgoingTrack, TrackKind};
use crate::transport::peer_transport::{
    ConnectionPhase, PeerTransport, SdpKind, SessionDescription, TransportEvent, TransportEventSink,
    TransportFactory,
};
use async_trait::async_trait;
use callkit_core::{IceCandidateDescriptor, IceServerConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;

/// Builds [`RtcPeerTransport`]s on the `webrtc` crate.
#[derive(Debug, Default, Clone)]
pub struct RtcTransportFactory;

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: TransportEventSink,
    ) -> Result<Box<dyn PeerTransport>, TransportError> {
        let transport = RtcPeerTransport::new(ice_servers, events).await?;
        Ok(Box::new(transport))
    }
}

#[derive(Default)]
struct Senders {
    audio: Option<OutgoingTrack>,
    video: Option<OutgoingTrack>,
    video_sender: Option<Arc<RTCRtpSender>>,
}

/// A [`PeerTransport`] over one `RTCPeerConnection`.
///
/// webrtc does not apply a local rollback from have-local-offer, so abandoning an
/// offer replaces the peer connection with a fresh one carrying the same tracks.
/// Callbacks of a replaced connection are muted by an epoch counter.
pub struct RtcPeerTransport {
    ice_servers: Vec<RTCIceServer>,
    events: TransportEventSink,
    epoch: Arc<AtomicU64>,
    peer_connection: Mutex<Arc<RTCPeerConnection>>,
    senders: Mutex<Senders>,
}

impl RtcPeerTransport {
    pub async fn new(
        ice_servers: &[IceServerConfig],
        events: TransportEventSink,
    ) -> Result<Self, TransportError> {
        let ice_servers: Vec<RTCIceServer> = ice_servers
            .iter()
            .map(|s| RTCIceServer {
                urls: s.urls.clone(),
                username: s.username.clone().unwrap_or_default(),
                credential: s.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();

        let epoch = Arc::new(AtomicU64::new(0));
        let peer_connection = connect(&ice_servers, &events, &epoch, 0).await?;

        Ok(Self {
            ice_servers,
            events,
            epoch,
            peer_connection: Mutex::new(peer_connection),
            senders: Mutex::new(Senders::default()),
        })
    }

    fn peer_connection(&self) -> Result<Arc<RTCPeerConnection>, TransportError> {
        self.peer_connection
            .lock()
            .map(|pc| pc.clone())
            .map_err(|_| TransportError::Closed)
    }

    fn senders(&self) -> Result<std::sync::MutexGuard<'_, Senders>, TransportError> {
        self.senders.lock().map_err(|_| TransportError::Closed)
    }
}

async fn connect(
    ice_servers: &[RTCIceServer],
    events: &TransportEventSink,
    epoch: &Arc<AtomicU64>,
    current: u64,
) -> Result<Arc<RTCPeerConnection>, TransportError> {
    let mut m = MediaEngine::default();
    m.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut m)?;

    let api = APIBuilder::new()
        .with_media_engine(m)
        .with_interceptor_registry(registry)
        .build();

    let rtc_config = RTCConfiguration {
        ice_servers: ice_servers.to_vec(),
        ..Default::default()
    };

    let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

    let state_events = events.clone();
    let state_epoch = epoch.clone();
    peer_connection.on_peer_connection_state_change(Box::new(
        move |s: RTCPeerConnectionState| {
            let events = state_events.clone();
            let live = state_epoch.load(Ordering::Acquire) == current;

            Box::pin(async move {
                if !live {
                    debug!("Replaced peer connection changed state: {:?}", s);
                    return;
                }
                info!("Peer connection state changed: {:?}", s);
                events.emit(TransportEvent::PhaseChanged(phase_of(s)));
            })
        },
    ));

    let ice_events = events.clone();
    let ice_epoch = epoch.clone();
    peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
        let events = ice_events.clone();
        let live = ice_epoch.load(Ordering::Acquire) == current;

        Box::pin(async move {
            let Some(candidate) = c.filter(|_| live) else { return };
            let Ok(init) = candidate.to_json() else {
                return;
            };
            events.emit(TransportEvent::CandidateGenerated(IceCandidateDescriptor {
                candidate: init.candidate,
                sdp_mid: init.sdp_mid,
                sdp_m_line_index: init.sdp_mline_index,
                username_fragment: init.username_fragment,
            }));
        })
    }));

    let track_events = events.clone();
    let track_epoch = epoch.clone();
    peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
        let events = track_events.clone();
        let live = track_epoch.load(Ordering::Acquire) == current;

        Box::pin(async move {
            if !live {
                return;
            }
            let kind = match track.kind() {
                RTPCodecType::Audio => TrackKind::Audio,
                _ => TrackKind::Video,
            };
            debug!("Remote {:?} track {} arrived", kind, track.id());
            events.emit(TransportEvent::RemoteTrack {
                kind,
                id: track.id(),
            });
        })
    }));

    Ok(peer_connection)
}

async fn attach(
    peer_connection: &RTCPeerConnection,
    track: &OutgoingTrack,
) -> Result<Arc<RTCRtpSender>, TransportError> {
    let sender = peer_connection.add_track(track.rtc.clone()).await?;

    // Interceptors only see RTCP that somebody reads.
    let reader = sender.clone();
    let track_id = track.id.clone();
    tokio::spawn(async move {
        let mut rtcp_buf = vec![0u8; 1500];
        while let Ok((_, _)) = reader.read(&mut rtcp_buf).await {}
        debug!("RTCP reader for {} stopped", track_id);
    });

    Ok(sender)
}

fn phase_of(state: RTCPeerConnectionState) -> ConnectionPhase {
    match state {
        RTCPeerConnectionState::Connecting => ConnectionPhase::Connecting,
        RTCPeerConnectionState::Connected => ConnectionPhase::Connected,
        RTCPeerConnectionState::Disconnected => ConnectionPhase::Disconnected,
        RTCPeerConnectionState::Failed => ConnectionPhase::Failed,
        RTCPeerConnectionState::Closed => ConnectionPhase::Closed,
        _ => ConnectionPhase::New,
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    let rtc = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}

#[async_trait]
impl PeerTransport for RtcPeerTransport {
    async fn add_track(&self, track: &OutgoingTrack) -> Result<(), TransportError> {
        let sender = attach(&*self.peer_connection()?, track).await?;

        let mut senders = self.senders()?;
        match track.kind {
            TrackKind::Audio => senders.audio = Some(track.clone()),
            TrackKind::Video => {
                senders.video = Some(track.clone());
                senders.video_sender = Some(sender);
            }
        }
        Ok(())
    }

    async fn replace_video_track(&self, track: Option<&OutgoingTrack>) -> Result<(), TransportError> {
        let sender = self
            .senders()?
            .video_sender
            .clone()
            .ok_or(TransportError::NoVideoSender)?;
        sender.replace_track(track.map(|t| t.rtc.clone())).await?;

        self.senders()?.video = track.cloned();
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let offer = self.peer_connection()?.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let answer = self.peer_connection()?.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), TransportError> {
        self.peer_connection()?
            .set_local_description(to_rtc(desc)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), TransportError> {
        self.peer_connection()?
            .set_remote_description(to_rtc(desc)?)
            .await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), TransportError> {
        let current = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let replaced = self.peer_connection()?;
        if let Err(e) = replaced.close().await {
            warn!("Closing the abandoned peer connection failed: {}", e);
        }

        let fresh = connect(&self.ice_servers, &self.events, &self.epoch, current).await?;

        let (audio, video) = {
            let senders = self.senders()?;
            (senders.audio.clone(), senders.video.clone())
        };
        if let Some(track) = &audio {
            attach(&fresh, track).await?;
        }
        let video_sender = match &video {
            Some(track) => Some(attach(&fresh, track).await?),
            None => None,
        };

        self.senders()?.video_sender = video_sender;
        *self
            .peer_connection
            .lock()
            .map_err(|_| TransportError::Closed)? = fresh;

        info!("Local offer abandoned; peer connection rebuilt (epoch {})", current);
        self.events
            .emit(TransportEvent::PhaseChanged(ConnectionPhase::New));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateDescriptor) -> Result<(), TransportError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection()?.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.peer_connection()?.close().await?;
        Ok(())
    }
}
