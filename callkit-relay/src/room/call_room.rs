use crate::error::RoomError;
use callkit_core::{ParticipantId, SessionId, SignalKind, SignalMessage};
use std::collections::VecDeque;
use tracing::{debug, warn};

pub const ROOM_CAPACITY: usize = 2;

/// A message the relay must forward to one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: ParticipantId,
    pub message: SignalMessage,
}

impl Delivery {
    fn new(to: &ParticipantId, message: SignalMessage) -> Self {
        Self {
            to: to.clone(),
            message,
        }
    }
}

/// A one-to-one call room: two seats, plus the messages a lone member sent before
/// anybody could receive them.
#[derive(Debug)]
pub struct CallRoom {
    session_id: SessionId,
    members: Vec<ParticipantId>,
    backlog: VecDeque<SignalMessage>,
    backlog_limit: usize,
}

impl CallRoom {
    pub fn new(session_id: SessionId, backlog_limit: usize) -> Self {
        Self {
            session_id,
            members: Vec::with_capacity(ROOM_CAPACITY),
            backlog: VecDeque::new(),
            backlog_limit,
        }
    }

    fn other(&self, participant: &ParticipantId) -> Option<&ParticipantId> {
        self.members.iter().find(|m| *m != participant)
    }

    fn membership(&self, kind: SignalKind, participant: &ParticipantId) -> SignalMessage {
        SignalMessage::new(kind, self.session_id.clone(), participant.clone())
    }

    /// Seat `participant`. The joiner learns who is present, then receives the backlog,
    /// then its own `join` back as acknowledgment.
    pub fn join(
        &mut self,
        participant: &ParticipantId,
        join: SignalMessage,
    ) -> Result<Vec<Delivery>, RoomError> {
        let mut out = Vec::new();

        if self.members.contains(participant) {
            debug!("{} rejoined room {}", participant, self.session_id);
            if let Some(other) = self.other(participant) {
                out.push(Delivery::new(participant, self.membership(SignalKind::PeerJoined, other)));
                out.push(Delivery::new(other, self.membership(SignalKind::PeerJoined, participant)));
            }
            out.push(Delivery::new(participant, join));
            return Ok(out);
        }

        if self.members.len() >= ROOM_CAPACITY {
            return Err(RoomError::Full(self.session_id.clone()));
        }

        if let Some(other) = self.members.first() {
            out.push(Delivery::new(participant, self.membership(SignalKind::PeerJoined, other)));
            out.extend(self.backlog.drain(..).map(|m| Delivery::new(participant, m)));
            out.push(Delivery::new(other, self.membership(SignalKind::PeerJoined, participant)));
        }

        self.members.push(participant.clone());
        out.push(Delivery::new(participant, join));
        Ok(out)
    }

    /// Forward a negotiation message to the other seat, or hold it while there is none.
    pub fn relay(
        &mut self,
        from: &ParticipantId,
        message: SignalMessage,
    ) -> Result<Vec<Delivery>, RoomError> {
        if !self.members.contains(from) {
            return Err(RoomError::NotMember {
                session: self.session_id.clone(),
                participant: from.clone(),
            });
        }

        if let Some(other) = self.other(from) {
            return Ok(vec![Delivery::new(other, message)]);
        }

        if self.backlog.len() >= self.backlog_limit {
            warn!(
                "Backlog of room {} is full; dropping {} from {}",
                self.session_id, message.kind, from
            );
        } else {
            self.backlog.push_back(message);
        }
        Ok(Vec::new())
    }

    /// Free the seat of `participant` and tell the other member.
    pub fn leave(&mut self, participant: &ParticipantId) -> Vec<Delivery> {
        let before = self.members.len();
        self.members.retain(|m| m != participant);
        if self.members.len() == before {
            return Vec::new();
        }
        self.backlog.retain(|m| &m.from_participant_id != participant);

        self.members
            .first()
            .map(|other| vec![Delivery::new(other, self.membership(SignalKind::PeerLeft, participant))])
            .unwrap_or_default()
    }

    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.members.contains(participant)
    }

    pub fn members(&self) -> &[ParticipantId] {
        &self.members
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
