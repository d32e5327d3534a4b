use async_trait::async_trait;
use callkit_client::{
    ConnectionPhase, OutgoingTrack, PeerTransport, SdpKind, SessionDescription, TrackKind,
    TransportError, TransportEvent, TransportEventSink, TransportFactory,
};
use callkit_core::{IceCandidateDescriptor, IceServerConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Every call a fake transport received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    AddTrack { kind: TrackKind, id: String },
    ReplaceVideo(Option<String>),
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpKind),
    SetRemote(SdpKind, String),
    Rollback,
    AddCandidate(String),
    Close,
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<TransportCall>>,
    sinks: Mutex<Vec<TransportEventSink>>,
    ice_servers: Mutex<Vec<IceServerConfig>>,
    created: AtomicUsize,
    sdp_counter: AtomicUsize,
    fail_set_remote: AtomicBool,
    auto_connect: AtomicBool,
}

impl Shared {
    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_sdp(&self, prefix: &str) -> String {
        let n = self.sdp_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{n}")
    }
}

/// Factory for scripted transports. Offers are `offer-N`, answers `answer-N`.
#[derive(Clone, Default)]
pub struct FakeTransports {
    shared: Arc<Shared>,
}

impl FakeTransports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `connected` as soon as an offer/answer cycle completes, like a
    /// loopback network would.
    pub fn auto_connecting() -> Self {
        let transports = Self::default();
        transports.shared.auto_connect.store(true, Ordering::SeqCst);
        transports
    }

    pub fn fail_set_remote(&self) {
        self.shared.fail_set_remote.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls().iter().filter(|c| matches(c)).count()
    }

    pub fn position(&self, call: &TransportCall) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::AddCandidate(candidate) => Some(candidate),
                _ => None,
            })
            .collect()
    }

    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        self.shared.ice_servers.lock().unwrap().clone()
    }

    /// Emit `event` from the most recently created transport.
    pub fn emit(&self, event: TransportEvent) {
        let sink = self.shared.sinks.lock().unwrap().last().cloned();
        if let Some(sink) = sink {
            sink.emit(event);
        }
    }

    pub fn emit_phase(&self, phase: ConnectionPhase) {
        self.emit(TransportEvent::PhaseChanged(phase));
    }
}

#[async_trait]
impl TransportFactory for FakeTransports {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: TransportEventSink,
    ) -> Result<Box<dyn PeerTransport>, TransportError> {
        self.shared.created.fetch_add(1, Ordering::SeqCst);
        *self.shared.ice_servers.lock().unwrap() = ice_servers.to_vec();
        self.shared.sinks.lock().unwrap().push(events.clone());

        Ok(Box::new(FakePeerTransport {
            shared: self.shared.clone(),
            events,
            video_sender: AtomicBool::new(false),
        }))
    }
}

struct FakePeerTransport {
    shared: Arc<Shared>,
    events: TransportEventSink,
    video_sender: AtomicBool,
}

impl FakePeerTransport {
    fn cycle_completed(&self) {
        if self.shared.auto_connect.load(Ordering::SeqCst) {
            self.events
                .emit(TransportEvent::PhaseChanged(ConnectionPhase::Connected));
        }
    }
}

#[async_trait]
impl PeerTransport for FakePeerTransport {
    async fn add_track(&self, track: &OutgoingTrack) -> Result<(), TransportError> {
        if track.kind == TrackKind::Video {
            self.video_sender.store(true, Ordering::SeqCst);
        }
        self.shared.record(TransportCall::AddTrack {
            kind: track.kind,
            id: track.id.clone(),
        });
        Ok(())
    }

    async fn replace_video_track(&self, track: Option<&OutgoingTrack>) -> Result<(), TransportError> {
        if !self.video_sender.load(Ordering::SeqCst) {
            return Err(TransportError::NoVideoSender);
        }
        self.shared
            .record(TransportCall::ReplaceVideo(track.map(|t| t.id.clone())));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        self.shared.record(TransportCall::CreateOffer);
        Ok(SessionDescription::offer(self.shared.next_sdp("offer")))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        self.shared.record(TransportCall::CreateAnswer);
        Ok(SessionDescription::answer(self.shared.next_sdp("answer")))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), TransportError> {
        self.shared.record(TransportCall::SetLocal(desc.kind));
        if desc.kind == SdpKind::Answer {
            self.cycle_completed();
        }
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), TransportError> {
        if self.shared.fail_set_remote.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidDescription(desc.sdp));
        }
        self.shared
            .record(TransportCall::SetRemote(desc.kind, desc.sdp.clone()));
        if desc.kind == SdpKind::Answer {
            self.cycle_completed();
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), TransportError> {
        self.shared.record(TransportCall::Rollback);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateDescriptor) -> Result<(), TransportError> {
        self.shared
            .record(TransportCall::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shared.record(TransportCall::Close);
        Ok(())
    }
}

pub fn candidate(text: &str) -> IceCandidateDescriptor {
    IceCandidateDescriptor {
        candidate: text.to_owned(),
        sdp_mid: Some("0".to_owned()),
        sdp_m_line_index: Some(0),
        username_fragment: None,
    }
}
