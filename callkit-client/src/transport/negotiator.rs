use crate::error::TransportError;
use crate::media::OutgoingTrack;
use crate::signaling::SignalingLink;
use crate::transport::peer_transport::{
    ConnectionPhase, PeerTransport, SdpKind, SessionDescription, TransportEventSink, TransportFactory,
};
use callkit_core::{IceCandidateDescriptor, IceServerConfig, ParticipantId, SessionId, SignalMessage};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// At most one offer/answer cycle is in flight per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationLock {
    Stable,
    /// A local offer was sent and its answer has not arrived.
    AwaitingAnswer,
}

/// Tie-break for colliding offers. The peer with the lexicographically smaller
/// participant id is polite and yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Polite,
    Impolite,
}

impl PeerRole {
    pub fn resolve(local: &ParticipantId, remote: &ParticipantId) -> Self {
        if local < remote {
            PeerRole::Polite
        } else {
            PeerRole::Impolite
        }
    }
}

/// Descriptions and early candidates of the call's transport.
#[derive(Debug, Default)]
pub struct TransportState {
    pub local_description: Option<SessionDescription>,
    pub remote_description: Option<SessionDescription>,
    /// Remote candidates that arrived before any remote description, in arrival order.
    pub pending_candidates: VecDeque<IceCandidateDescriptor>,
    pub phase: ConnectionPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Sent,
    /// Another cycle is in flight; the offer goes out once it completes.
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOfferOutcome {
    Answered { rolled_back: bool },
    /// The offer was one we already answered; the answer was sent again.
    Repeated,
    /// Colliding offer dropped because we are the impolite side.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Applied { next_offer_sent: bool },
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    Applied,
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Swapped on the existing sender; no renegotiation needed.
    Replaced,
    /// A new sender was created; the caller must renegotiate.
    SenderAdded,
}

/// Owns the call's single peer transport and drives offer/answer and trickle ICE
/// over the signaling link.
pub struct TransportNegotiator {
    session_id: SessionId,
    local_id: ParticipantId,
    signaling: Arc<dyn SignalingLink>,
    transport: Option<Box<dyn PeerTransport>>,
    state: TransportState,
    lock: NegotiationLock,
    offer_queued: bool,
    offer_is_renegotiation: bool,
    cycles_completed: u32,
    offers_sent: u32,
    answers_sent: u32,
}

impl TransportNegotiator {
    pub fn new(
        session_id: SessionId,
        local_id: ParticipantId,
        signaling: Arc<dyn SignalingLink>,
    ) -> Self {
        Self {
            session_id,
            local_id,
            signaling,
            transport: None,
            state: TransportState::default(),
            lock: NegotiationLock::Stable,
            offer_queued: false,
            offer_is_renegotiation: false,
            cycles_completed: 0,
            offers_sent: 0,
            answers_sent: 0,
        }
    }

    /// Create the transport and attach the local tracks to it.
    pub async fn open(
        &mut self,
        factory: &dyn TransportFactory,
        ice_servers: &[IceServerConfig],
        events: TransportEventSink,
        tracks: &[OutgoingTrack],
    ) -> Result<(), TransportError> {
        if self.transport.is_some() {
            warn!("Transport for session {} already open", self.session_id);
            return Ok(());
        }

        // Stored before tracks are added so `close` covers a failure below.
        let transport = self.transport.insert(factory.create(ice_servers, events).await?);
        for track in tracks {
            transport.add_track(track).await?;
        }
        info!(
            "Transport opened for session {} with {} tracks",
            self.session_id,
            tracks.len()
        );
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub async fn request_offer(&mut self) -> Result<OfferOutcome, TransportError> {
        if self.lock == NegotiationLock::AwaitingAnswer {
            debug!("Offer requested while awaiting an answer; queued");
            self.offer_queued = true;
            return Ok(OfferOutcome::Queued);
        }
        self.send_offer().await?;
        Ok(OfferOutcome::Sent)
    }

    /// Send the outstanding offer again, for when the relay may have lost it.
    /// Returns false when no offer is outstanding.
    pub async fn resend_offer(&mut self) -> bool {
        if self.lock != NegotiationLock::AwaitingAnswer {
            return false;
        }
        let Some(offer) = self.state.local_description.clone() else {
            return false;
        };
        info!("Re-sending unanswered offer for session {}", self.session_id);
        self.signaling
            .send(SignalMessage::offer(
                self.session_id.clone(),
                self.local_id.clone(),
                offer.sdp,
            ))
            .await;
        true
    }

    async fn send_offer(&mut self) -> Result<(), TransportError> {
        let transport = self.transport.as_deref().ok_or(TransportError::Closed)?;

        let offer = transport.create_offer().await?;
        transport.set_local_description(offer.clone()).await?;

        self.state.local_description = Some(offer.clone());
        self.lock = NegotiationLock::AwaitingAnswer;
        self.offer_is_renegotiation = self.cycles_completed > 0;
        self.offers_sent += 1;

        info!("Sending offer for session {}", self.session_id);
        self.signaling
            .send(SignalMessage::offer(
                self.session_id.clone(),
                self.local_id.clone(),
                offer.sdp,
            ))
            .await;
        Ok(())
    }

    pub async fn handle_remote_offer(
        &mut self,
        from: &ParticipantId,
        sdp: String,
    ) -> Result<RemoteOfferOutcome, TransportError> {
        let transport = self.transport.as_deref().ok_or(TransportError::Closed)?;

        // A replayed offer we already answered: repeat the answer, do not renegotiate.
        let already_answered = self
            .state
            .remote_description
            .as_ref()
            .is_some_and(|d| d.kind == SdpKind::Offer && d.sdp == sdp);
        if self.lock == NegotiationLock::Stable && already_answered {
            if let Some(answer) = self.state.local_description.clone() {
                debug!("Duplicate offer from {}; repeating answer", from);
                self.signaling
                    .send(SignalMessage::answer(
                        self.session_id.clone(),
                        self.local_id.clone(),
                        answer.sdp,
                    ))
                    .await;
                return Ok(RemoteOfferOutcome::Repeated);
            }
        }

        let mut rolled_back = false;
        if self.lock == NegotiationLock::AwaitingAnswer {
            match PeerRole::resolve(&self.local_id, from) {
                PeerRole::Impolite => {
                    info!("Offer collision with {}; keeping our offer", from);
                    return Ok(RemoteOfferOutcome::Ignored);
                }
                PeerRole::Polite => {
                    info!("Offer collision with {}; rolling back our offer", from);
                    transport.rollback().await?;
                    self.state.local_description = None;
                    self.lock = NegotiationLock::Stable;
                    // A voided renegotiation still has to happen once this cycle is done.
                    if self.offer_is_renegotiation {
                        self.offer_queued = true;
                    }
                    rolled_back = true;
                }
            }
        }

        let remote = SessionDescription::offer(sdp);
        transport.set_remote_description(remote.clone()).await?;
        self.state.remote_description = Some(remote);
        flush_candidates(transport, &mut self.state.pending_candidates).await;

        let answer = transport.create_answer().await?;
        transport.set_local_description(answer.clone()).await?;
        self.state.local_description = Some(answer.clone());
        self.cycles_completed += 1;
        self.answers_sent += 1;

        info!("Answering offer from {}", from);
        self.signaling
            .send(SignalMessage::answer(
                self.session_id.clone(),
                self.local_id.clone(),
                answer.sdp,
            ))
            .await;

        self.send_queued_offer().await?;
        Ok(RemoteOfferOutcome::Answered { rolled_back })
    }

    pub async fn handle_answer(&mut self, sdp: String) -> Result<AnswerOutcome, TransportError> {
        if self.lock != NegotiationLock::AwaitingAnswer {
            debug!("Answer without an outstanding offer in session {}; ignored", self.session_id);
            return Ok(AnswerOutcome::Ignored);
        }
        let transport = self.transport.as_deref().ok_or(TransportError::Closed)?;

        let remote = SessionDescription::answer(sdp);
        transport.set_remote_description(remote.clone()).await?;
        self.state.remote_description = Some(remote);
        self.lock = NegotiationLock::Stable;
        self.cycles_completed += 1;
        flush_candidates(transport, &mut self.state.pending_candidates).await;

        let next_offer_sent = self.send_queued_offer().await?;
        Ok(AnswerOutcome::Applied { next_offer_sent })
    }

    async fn send_queued_offer(&mut self) -> Result<bool, TransportError> {
        if !self.offer_queued {
            return Ok(false);
        }
        self.offer_queued = false;
        self.send_offer().await?;
        Ok(true)
    }

    /// Apply a remote candidate, or queue it until a remote description exists.
    pub async fn handle_candidate(
        &mut self,
        candidate: IceCandidateDescriptor,
    ) -> Result<CandidateOutcome, TransportError> {
        let transport = self.transport.as_deref().ok_or(TransportError::Closed)?;

        if self.state.remote_description.is_none() {
            debug!("Queueing early ICE candidate");
            self.state.pending_candidates.push_back(candidate);
            return Ok(CandidateOutcome::Queued);
        }

        if let Err(e) = transport.add_ice_candidate(candidate).await {
            warn!("Remote ICE candidate rejected: {}", e);
        }
        Ok(CandidateOutcome::Applied)
    }

    /// Put `track` on the video sender in place; fall back to a new sender when there is none.
    pub async fn replace_video(
        &mut self,
        track: Option<OutgoingTrack>,
    ) -> Result<ReplaceOutcome, TransportError> {
        let transport = self.transport.as_deref().ok_or(TransportError::Closed)?;

        match transport.replace_video_track(track.as_ref()).await {
            Ok(()) => Ok(ReplaceOutcome::Replaced),
            Err(TransportError::NoVideoSender) => match track {
                Some(track) => {
                    info!("No video sender to reuse; adding {}", track.id);
                    transport.add_track(&track).await?;
                    Ok(ReplaceOutcome::SenderAdded)
                }
                None => Ok(ReplaceOutcome::Replaced),
            },
            Err(e) => Err(e),
        }
    }

    /// Send a locally gathered candidate to the remote peer.
    pub async fn trickle(&self, candidate: IceCandidateDescriptor) {
        if self.transport.is_none() {
            return;
        }
        self.signaling
            .send(SignalMessage::ice_candidate(
                self.session_id.clone(),
                self.local_id.clone(),
                candidate,
            ))
            .await;
    }

    /// Close the transport. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                warn!("Transport close failed: {}", e);
            }
            info!("Transport for session {} closed", self.session_id);
        }
        self.lock = NegotiationLock::Stable;
        self.offer_queued = false;
        self.state.pending_candidates.clear();
        self.state.phase = ConnectionPhase::Closed;
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.state.phase
    }

    pub fn set_phase(&mut self, phase: ConnectionPhase) {
        self.state.phase = phase;
    }

    pub fn lock(&self) -> NegotiationLock {
        self.lock
    }

    /// No cycle in flight and none waiting.
    pub fn is_settled(&self) -> bool {
        self.lock == NegotiationLock::Stable && !self.offer_queued
    }

    pub fn has_negotiated(&self) -> bool {
        self.offers_sent > 0 || self.answers_sent > 0
    }

    pub fn offers_sent(&self) -> u32 {
        self.offers_sent
    }

    pub fn answers_sent(&self) -> u32 {
        self.answers_sent
    }

    pub fn state(&self) -> &TransportState {
        &self.state
    }
}

async fn flush_candidates(
    transport: &dyn PeerTransport,
    pending: &mut VecDeque<IceCandidateDescriptor>,
) {
    if !pending.is_empty() {
        debug!("Flushing {} queued ICE candidates", pending.len());
    }
    while let Some(candidate) = pending.pop_front() {
        if let Err(e) = transport.add_ice_candidate(candidate).await {
            warn!("Queued ICE candidate rejected: {}", e);
        }
    }
}
