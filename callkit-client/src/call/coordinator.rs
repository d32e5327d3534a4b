use crate::call::event::{CallCommand, CallEvent, CallSetup};
use crate::config::CallConfig;
use crate::error::{MediaError, TransportError};
use crate::media::{
    AcquiredMedia, LocalTrack, MediaGateway, OutgoingTrack, SharedCaptureBackend, TrackSource,
};
use crate::session::{SessionDirectory, SessionRecord, SessionStatus, SharedSessionDirectory, admit_session};
use crate::signaling::{ChannelStatus, Refusal, SignalingLink};
use crate::transport::{
    AnswerOutcome, ConnectionPhase, NegotiationLock, RemoteOfferOutcome, ReplaceOutcome,
    TransportEvent, TransportEventSink, TransportFactory, TransportNegotiator,
};
use callkit_core::utils::is_turn_url;
use callkit_core::{
    CallError, CallSnapshot, CallStatus, IceServerConfig, ParticipantId, SessionId, SignalKind,
    SignalMessage,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Collaborators a call is wired to.
pub struct CallDeps {
    pub session_id: SessionId,
    pub signaling: Arc<dyn SignalingLink>,
    pub capture: SharedCaptureBackend,
    pub transports: Arc<dyn TransportFactory>,
    pub sessions: SharedSessionDirectory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScreenShare {
    Off,
    Starting,
    Sharing { track_id: String },
    Stopping,
}

/// The call lifecycle state machine.
///
/// Every input arrives as a [`CallEvent`] through [`CallCoordinator::apply`]; nothing else
/// mutates call state. Long operations (capture, session lookup) run in spawned tasks and
/// report back through the inbox.
pub struct CallCoordinator {
    session_id: SessionId,
    local_id: ParticipantId,
    config: CallConfig,

    signaling: Arc<dyn SignalingLink>,
    transports: Arc<dyn TransportFactory>,
    sessions: SharedSessionDirectory,

    media: MediaGateway,
    negotiator: TransportNegotiator,

    inbox: mpsc::UnboundedSender<CallEvent>,
    generation: u64,

    status: CallStatus,
    session: Option<SessionRecord>,
    remote: Option<ParticipantId>,
    /// Set when the remote left the room; cleared by the next completed offer/answer cycle.
    remote_unconfirmed: bool,
    joined: bool,
    screen: ScreenShare,
    signaling_degraded: bool,

    snapshot_tx: watch::Sender<CallSnapshot>,
    errors_tx: broadcast::Sender<CallError>,
}

impl CallCoordinator {
    pub fn new(deps: CallDeps, config: CallConfig) -> (Self, mpsc::UnboundedReceiver<CallEvent>) {
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(CallSnapshot::default());
        let (errors_tx, _) = broadcast::channel(32);

        let local_id = deps.signaling.participant_id().clone();
        let negotiator = TransportNegotiator::new(
            deps.session_id.clone(),
            local_id.clone(),
            deps.signaling.clone(),
        );

        let coordinator = Self {
            session_id: deps.session_id,
            local_id,
            config,
            signaling: deps.signaling,
            transports: deps.transports,
            sessions: deps.sessions,
            media: MediaGateway::new(deps.capture),
            negotiator,
            inbox,
            generation: 0,
            status: CallStatus::Idle,
            session: None,
            remote: None,
            remote_unconfirmed: false,
            joined: false,
            screen: ScreenShare::Off,
            signaling_degraded: false,
            snapshot_tx,
            errors_tx,
        };

        (coordinator, inbox_rx)
    }

    /// Process events until the call ends.
    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<CallEvent>) {
        info!("Call loop for session {} started", self.session_id);

        let mut channel = self.signaling.status();
        let mut channel_open = true;

        loop {
            tokio::select! {
                Some(event) = inbox.recv() => self.apply(event).await,

                changed = channel.changed(), if channel_open => match changed {
                    Ok(()) => {
                        let status = *channel.borrow_and_update();
                        self.apply(CallEvent::Channel(status)).await;
                    }
                    Err(_) => {
                        warn!("Signaling status feed closed");
                        channel_open = false;
                    }
                },

                else => break,
            }

            if self.status.is_ended() {
                break;
            }
        }

        info!("Call loop for session {} finished", self.session_id);
    }

    pub async fn apply(&mut self, event: CallEvent) {
        if self.status.is_ended() {
            debug!("Call already ended; dropping {:?}", event);
            return;
        }

        match event {
            CallEvent::Command(command) => self.handle_command(command).await,

            CallEvent::MediaReady { generation, result } => {
                if self.is_current(generation, "media acquisition") {
                    self.on_media_ready(result).await;
                }
            }

            CallEvent::DisplayReady { generation, result } => {
                if self.is_current(generation, "display capture") {
                    self.on_display_ready(result).await;
                }
            }

            CallEvent::CameraRestored { generation, result } => {
                if self.is_current(generation, "camera restore") {
                    self.on_camera_restored(result).await;
                }
            }

            CallEvent::ScreenCaptureEnded { generation, track_id } => {
                if self.is_current(generation, "capture end") {
                    self.on_screen_capture_ended(track_id).await;
                }
            }

            CallEvent::Signal(message) => self.handle_signal(message).await,

            CallEvent::Refused(refusal) => self.handle_refusal(refusal).await,

            CallEvent::Transport { generation, event } => {
                if self.is_current(generation, "transport event") {
                    self.handle_transport_event(event).await;
                }
            }

            CallEvent::Channel(status) => self.handle_channel_status(status),
        }

        self.publish();
    }

    async fn handle_command(&mut self, command: CallCommand) {
        match command {
            CallCommand::Start => self.start(),
            CallCommand::Leave { complete_session } => self.leave(complete_session).await,
            CallCommand::ToggleScreenShare => self.toggle_screen_share().await,
            CallCommand::SetTrackEnabled { kind, enabled } => {
                if !self.media.set_track_enabled(kind, enabled) {
                    debug!("No {:?} track to toggle; preference kept", kind);
                }
            }
        }
    }

    fn start(&mut self) {
        if self.status != CallStatus::Idle {
            warn!("Start ignored: call is {}", self.status);
            return;
        }
        self.transition(CallStatus::AcquiringMedia);

        let generation = self.generation;
        let inbox = self.inbox.clone();
        let sessions = self.sessions.clone();
        let session_id = self.session_id.clone();
        let acquisition = self.media.acquisition(self.config.media);

        tokio::spawn(async move {
            let result = prepare_call(sessions.as_ref(), &session_id, acquisition).await;
            if inbox.send(CallEvent::MediaReady { generation, result }).is_err() {
                debug!("Call gone before media was ready");
            }
        });
    }

    async fn on_media_ready(&mut self, result: Result<CallSetup, CallError>) {
        let setup = match result {
            Ok(setup) => setup,
            Err(e) => {
                error!("Call could not start: {}", e);
                self.fail(e).await;
                return;
            }
        };

        let CallSetup { record, media } = setup;
        self.session = Some(record);
        let tracks: Vec<OutgoingTrack> = media.tracks().map(LocalTrack::outgoing).collect();
        self.media.install(media);

        let ice_servers = self.ice_servers();
        let sink = TransportEventSink::new(self.generation, self.inbox.clone());
        if let Err(e) = self
            .negotiator
            .open(self.transports.as_ref(), &ice_servers, sink, &tracks)
            .await
        {
            error!("Transport setup failed: {}", e);
            self.fail(e.into()).await;
            return;
        }

        self.subscribe();
        self.transition(CallStatus::Negotiating);

        self.signaling
            .send(SignalMessage::new(
                SignalKind::Join,
                self.session_id.clone(),
                self.local_id.clone(),
            ))
            .await;
        self.joined = true;
    }

    fn ice_servers(&self) -> Vec<IceServerConfig> {
        let pushed = self.signaling.ice_servers();
        let servers = if pushed.is_empty() {
            self.config.ice_servers.clone()
        } else {
            pushed
        };

        if !servers.iter().flat_map(|s| s.urls.iter()).any(|url| is_turn_url(url)) {
            warn!("No TURN server configured; restrictive networks may fail to connect");
        }
        servers
    }

    fn subscribe(&self) {
        for kind in SignalKind::INBOUND {
            let inbox = self.inbox.clone();
            self.signaling.on(
                &self.session_id,
                kind,
                Arc::new(move |message| {
                    let _ = inbox.send(CallEvent::Signal(message));
                }),
            );
        }

        let inbox = self.inbox.clone();
        self.signaling.on_refusal(
            &self.session_id,
            Arc::new(move |refusal: Refusal| {
                let _ = inbox.send(CallEvent::Refused(refusal));
            }),
        );
    }

    async fn handle_signal(&mut self, message: SignalMessage) {
        let from = message.from_participant_id.clone();

        match message.kind {
            SignalKind::Join => {
                if from != self.local_id {
                    debug!("Ignoring join relayed from {}", from);
                    return;
                }
                debug!("Join acknowledged for session {}", self.session_id);
                if !self.negotiator.has_negotiated() {
                    if self.status == CallStatus::Negotiating {
                        self.offer().await;
                    }
                } else {
                    // Rejoined after a relay drop; the room may have lost our offer.
                    self.negotiator.resend_offer().await;
                }
            }

            SignalKind::PeerJoined => {
                info!("Participant {} is in the room", from);
                self.remote = Some(from);
                if self.remote_unconfirmed {
                    self.renegotiate_with_returning_peer().await;
                }
            }

            SignalKind::Offer => {
                let Some(sdp) = message.sdp().map(str::to_owned) else {
                    warn!("Offer from {} without SDP", from);
                    return;
                };
                match self.negotiator.handle_remote_offer(&from, sdp).await {
                    Ok(outcome) => {
                        debug!("Remote offer handled: {:?}", outcome);
                        if matches!(outcome, RemoteOfferOutcome::Answered { .. }) {
                            self.peer_confirmed();
                        }
                        self.settle_renegotiation();
                    }
                    Err(e) => self.negotiation_failed(e),
                }
            }

            SignalKind::Answer => {
                let Some(sdp) = message.sdp().map(str::to_owned) else {
                    warn!("Answer from {} without SDP", from);
                    return;
                };
                match self.negotiator.handle_answer(sdp).await {
                    Ok(AnswerOutcome::Applied { next_offer_sent }) => {
                        debug!("Answer applied, follow-up offer sent: {}", next_offer_sent);
                        self.peer_confirmed();
                        self.settle_renegotiation();
                    }
                    Ok(AnswerOutcome::Ignored) => {}
                    Err(e) => self.negotiation_failed(e),
                }
            }

            SignalKind::IceCandidate => {
                let Some(candidate) = message.candidate().cloned() else {
                    warn!("ICE candidate message from {} without candidate", from);
                    return;
                };
                if let Err(e) = self.negotiator.handle_candidate(candidate).await {
                    warn!("Dropping remote ICE candidate: {}", e);
                }
            }

            SignalKind::PeerLeft => {
                info!("Participant {} left the room", from);
                self.remote = None;
                self.remote_unconfirmed = true;
                if matches!(self.status, CallStatus::Connected | CallStatus::Renegotiating) {
                    self.transition(CallStatus::Disconnected);
                }
            }

            SignalKind::Leave => {}
        }
    }

    async fn handle_refusal(&mut self, refusal: Refusal) {
        let Refusal { kind, reason, .. } = refusal;
        warn!("Relay refused our {} in session {}: {}", kind, self.session_id, reason);

        match kind {
            SignalKind::Join => {
                // Never seated, so there is no room to leave.
                self.joined = false;
                self.fail(CallError::RoomRefused(reason)).await;
            }
            SignalKind::Offer | SignalKind::Answer => {
                self.emit(CallError::RoomRefused(reason));
                if matches!(
                    self.status,
                    CallStatus::Negotiating | CallStatus::Connected | CallStatus::Renegotiating
                ) {
                    self.transition(CallStatus::Disconnected);
                }
            }
            _ => debug!("Refused {} needs no recovery", kind),
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::CandidateGenerated(candidate) => self.negotiator.trickle(candidate).await,

            TransportEvent::PhaseChanged(phase) => {
                self.negotiator.set_phase(phase);
                match phase {
                    ConnectionPhase::Connected => match self.status {
                        CallStatus::Negotiating | CallStatus::Disconnected => {
                            if self.remote_unconfirmed {
                                debug!("Transport connected; waiting to negotiate with the peer");
                            } else if self.session_in_progress() {
                                self.transition(CallStatus::Connected);
                            } else {
                                warn!("Transport connected but session is not in progress");
                            }
                        }
                        CallStatus::Renegotiating => self.settle_renegotiation(),
                        _ => {}
                    },
                    ConnectionPhase::Failed => {
                        if matches!(
                            self.status,
                            CallStatus::Negotiating | CallStatus::Connected | CallStatus::Renegotiating
                        ) {
                            self.emit(CallError::ConnectivityFailed);
                            self.transition(CallStatus::Disconnected);
                        }
                    }
                    ConnectionPhase::Disconnected => {
                        warn!("Transport connectivity interrupted; waiting for recovery");
                    }
                    _ => debug!("Transport phase {:?}", phase),
                }
            }

            TransportEvent::RemoteTrack { kind, id } => {
                info!("Receiving remote {:?} track {}", kind, id);
            }
        }
    }

    fn handle_channel_status(&mut self, status: ChannelStatus) {
        match status {
            ChannelStatus::Reconnecting { attempt } => {
                if !self.signaling_degraded {
                    self.signaling_degraded = true;
                    self.emit(CallError::SignalingDisconnected);
                }
                debug!("Signaling reconnect attempt {}", attempt);
            }
            ChannelStatus::Connected => {
                if self.signaling_degraded {
                    info!("Signaling restored");
                    self.signaling_degraded = false;
                }
            }
            ChannelStatus::Closed => {
                if !self.signaling_degraded {
                    self.emit(CallError::SignalingDisconnected);
                }
                self.signaling_degraded = true;
                // Without signaling an unfinished negotiation can never complete.
                if matches!(self.status, CallStatus::Negotiating | CallStatus::Renegotiating) {
                    self.transition(CallStatus::Disconnected);
                }
            }
        }
    }

    async fn toggle_screen_share(&mut self) {
        match self.screen {
            ScreenShare::Off => {
                if self.status != CallStatus::Connected {
                    warn!("Screen share needs a connected call (call is {})", self.status);
                    return;
                }
                self.screen = ScreenShare::Starting;

                let generation = self.generation;
                let inbox = self.inbox.clone();
                let capture = self.media.video_acquisition(TrackSource::Screen);
                tokio::spawn(async move {
                    let result = capture.await;
                    let _ = inbox.send(CallEvent::DisplayReady { generation, result });
                });
            }
            ScreenShare::Sharing { .. } => self.stop_screen_share().await,
            ScreenShare::Starting | ScreenShare::Stopping => {
                debug!("Screen share toggle ignored while switching sources");
            }
        }
    }

    async fn on_display_ready(&mut self, result: Result<LocalTrack, MediaError>) {
        if self.screen != ScreenShare::Starting {
            debug!("Display capture no longer wanted");
            return;
        }

        let mut screen = match result {
            Ok(track) => track,
            Err(e) => {
                self.screen = ScreenShare::Off;
                self.emit(e.into());
                return;
            }
        };

        if self.status != CallStatus::Connected {
            info!("Call left connected state during display capture; dropping it");
            self.screen = ScreenShare::Off;
            return;
        }

        let ended = screen.take_ended();
        let track_id = screen.id().to_owned();

        match self.negotiator.replace_video(Some(screen.outgoing())).await {
            Ok(outcome) => {
                self.media.install_video(screen);
                self.screen = ScreenShare::Sharing {
                    track_id: track_id.clone(),
                };
                if let Some(ended) = ended {
                    self.watch_capture_end(ended, track_id);
                }
                if outcome == ReplaceOutcome::SenderAdded {
                    self.transition(CallStatus::Renegotiating);
                    self.offer().await;
                }
            }
            Err(e) => {
                self.screen = ScreenShare::Off;
                self.negotiation_failed(e);
            }
        }
    }

    fn watch_capture_end(&self, ended: oneshot::Receiver<()>, track_id: String) {
        let generation = self.generation;
        let inbox = self.inbox.clone();

        tokio::spawn(async move {
            // A sender dropped without firing means we stopped the track ourselves.
            if ended.await.is_ok() {
                let _ = inbox.send(CallEvent::ScreenCaptureEnded {
                    generation,
                    track_id,
                });
            }
        });
    }

    async fn on_screen_capture_ended(&mut self, track_id: String) {
        match &self.screen {
            ScreenShare::Sharing { track_id: current } if *current == track_id => {
                info!("Screen capture stopped by the platform; restoring camera");
                self.stop_screen_share().await;
            }
            _ => debug!("Ignoring end of stale capture {}", track_id),
        }
    }

    /// Go back to the camera, or to no video when the call started without one.
    async fn stop_screen_share(&mut self) {
        if !self.config.media.video {
            self.screen = ScreenShare::Off;
            if let Err(e) = self.negotiator.replace_video(None).await {
                warn!("Could not clear outgoing video: {}", e);
            }
            self.media.clear_video();
            return;
        }

        self.screen = ScreenShare::Stopping;
        let generation = self.generation;
        let inbox = self.inbox.clone();
        let capture = self.media.video_acquisition(TrackSource::Camera);
        tokio::spawn(async move {
            let result = capture.await;
            let _ = inbox.send(CallEvent::CameraRestored { generation, result });
        });
    }

    async fn on_camera_restored(&mut self, result: Result<LocalTrack, MediaError>) {
        if self.screen != ScreenShare::Stopping {
            debug!("Camera restore no longer wanted");
            return;
        }
        self.screen = ScreenShare::Off;

        match result {
            Ok(camera) => match self.negotiator.replace_video(Some(camera.outgoing())).await {
                Ok(outcome) => {
                    self.media.install_video(camera);
                    if outcome == ReplaceOutcome::SenderAdded {
                        self.transition(CallStatus::Renegotiating);
                        self.offer().await;
                    }
                }
                Err(e) => {
                    self.media.clear_video();
                    self.negotiation_failed(e);
                }
            },
            Err(e) => {
                warn!("Camera could not be restored after screen share: {}", e);
                self.emit(e.into());
                if let Err(e) = self.negotiator.replace_video(None).await {
                    warn!("Could not clear outgoing video: {}", e);
                }
                self.media.clear_video();
            }
        }
    }

    async fn offer(&mut self) {
        match self.negotiator.request_offer().await {
            Ok(outcome) => debug!("Offer request: {:?}", outcome),
            Err(e) => self.negotiation_failed(e),
        }
    }

    /// Whoever is in the room now may be a fresh instance that never saw our offer, so
    /// the cached transport phase proves nothing until a new cycle completes with it.
    async fn renegotiate_with_returning_peer(&mut self) {
        if self.negotiator.lock() == NegotiationLock::AwaitingAnswer {
            self.negotiator.resend_offer().await;
        } else if self.negotiator.has_negotiated() {
            self.offer().await;
        }
    }

    fn peer_confirmed(&mut self) {
        if !self.remote_unconfirmed {
            return;
        }
        self.remote_unconfirmed = false;
        debug!("Negotiated with the participant now in the room");

        if self.status == CallStatus::Disconnected
            && self.negotiator.phase() == ConnectionPhase::Connected
            && self.session_in_progress()
        {
            self.transition(CallStatus::Connected);
        }
    }

    fn settle_renegotiation(&mut self) {
        if self.status == CallStatus::Renegotiating
            && self.negotiator.is_settled()
            && self.negotiator.phase() == ConnectionPhase::Connected
        {
            self.transition(CallStatus::Connected);
        }
    }

    fn negotiation_failed(&mut self, e: TransportError) {
        error!("Negotiation failed: {}", e);
        self.emit(e.into());
        if matches!(
            self.status,
            CallStatus::Negotiating | CallStatus::Connected | CallStatus::Renegotiating
        ) {
            self.transition(CallStatus::Disconnected);
        }
    }

    /// Surface `error`, then tear the call down.
    async fn fail(&mut self, error: CallError) {
        self.emit(error);
        self.leave(false).await;
    }

    /// Release media, close the transport, leave the room and unsubscribe, in that order.
    async fn leave(&mut self, complete_session: bool) {
        info!("Leaving call in session {} (was {})", self.session_id, self.status);

        let released = self.media.release();
        debug!("Released {} local tracks", released);

        self.negotiator.close().await;

        if self.joined {
            self.signaling
                .send(SignalMessage::new(
                    SignalKind::Leave,
                    self.session_id.clone(),
                    self.local_id.clone(),
                ))
                .await;
            self.joined = false;
        }
        self.signaling.off_all(&self.session_id);

        self.generation += 1;
        self.screen = ScreenShare::Off;
        self.remote = None;

        if complete_session && self.session.is_some() {
            let sessions = self.sessions.clone();
            let session_id = self.session_id.clone();
            let errors = self.errors_tx.clone();
            tokio::spawn(async move {
                match sessions.mark_completed(&session_id).await {
                    Ok(_) => info!("Session {} marked completed", session_id),
                    Err(e) => {
                        warn!("Could not complete session {}: {}", session_id, e);
                        let _ = errors.send(e.into());
                    }
                }
            });
        }

        self.transition(CallStatus::Ended);
    }

    fn transition(&mut self, next: CallStatus) -> bool {
        if self.status == next {
            return false;
        }
        if !self.status.can_transition_to(next) {
            warn!("Ignoring illegal transition {} -> {}", self.status, next);
            return false;
        }
        info!("Call {}: {} -> {}", self.session_id, self.status, next);
        self.status = next;
        true
    }

    fn is_current(&self, generation: u64, what: &str) -> bool {
        if generation != self.generation {
            debug!("Dropping stale {} from generation {}", what, generation);
            return false;
        }
        true
    }

    fn session_in_progress(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|record| record.status == SessionStatus::InProgress)
    }

    fn emit(&self, error: CallError) {
        if error.is_transient() {
            warn!("Call warning: {}", error);
        }
        // No subscriber is fine; the status transition is what callers rely on.
        let _ = self.errors_tx.send(error);
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            status: self.status,
            is_connected: matches!(self.status, CallStatus::Connected | CallStatus::Renegotiating),
            remote_participant_present: self.remote.is_some(),
            signaling_degraded: self.signaling_degraded,
            screen_sharing: matches!(
                self.screen,
                ScreenShare::Sharing { .. } | ScreenShare::Stopping
            ),
        }
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn remote_participant(&self) -> Option<&ParticipantId> {
        self.remote.as_ref()
    }

    pub fn media(&self) -> &MediaGateway {
        &self.media
    }

    pub fn negotiator(&self) -> &TransportNegotiator {
        &self.negotiator
    }

    /// Sender for the coordinator's own inbox.
    pub fn inbox(&self) -> mpsc::UnboundedSender<CallEvent> {
        self.inbox.clone()
    }

    pub fn watch(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn errors(&self) -> broadcast::Receiver<CallError> {
        self.errors_tx.subscribe()
    }

    pub(crate) fn errors_sender(&self) -> broadcast::Sender<CallError> {
        self.errors_tx.clone()
    }
}

async fn prepare_call<F>(
    sessions: &dyn SessionDirectory,
    session_id: &SessionId,
    acquisition: F,
) -> Result<CallSetup, CallError>
where
    F: Future<Output = Result<AcquiredMedia, MediaError>>,
{
    let record = admit_session(sessions, session_id).await?;
    let media = acquisition.await?;
    Ok(CallSetup { record, media })
}
