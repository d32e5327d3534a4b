use crate::error::RoomError;
use crate::room::call_room::{CallRoom, Delivery};
use callkit_core::{ParticipantId, SessionId, SignalMessage};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// All live call rooms, keyed by session id. A room is created by its first `join`
/// and destroyed, backlog included, when its last member leaves.
#[derive(Clone)]
pub struct RoomManager {
    rooms: Arc<DashMap<SessionId, CallRoom>>,
    backlog_limit: usize,
}

impl RoomManager {
    pub fn new(backlog_limit: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            backlog_limit,
        }
    }

    pub fn join(
        &self,
        participant: &ParticipantId,
        join: SignalMessage,
    ) -> Result<Vec<Delivery>, RoomError> {
        let session_id = join.session_id.clone();
        let mut room = self.rooms.entry(session_id.clone()).or_insert_with(|| {
            info!("Creating room {}", session_id);
            CallRoom::new(session_id.clone(), self.backlog_limit)
        });
        room.join(participant, join)
    }

    pub fn relay(
        &self,
        from: &ParticipantId,
        message: SignalMessage,
    ) -> Result<Vec<Delivery>, RoomError> {
        let session_id = message.session_id.clone();
        let Some(mut room) = self.rooms.get_mut(&session_id) else {
            return Err(RoomError::NotMember {
                session: session_id,
                participant: from.clone(),
            });
        };
        room.relay(from, message)
    }

    pub fn leave(&self, session_id: &SessionId, participant: &ParticipantId) -> Vec<Delivery> {
        // The entry guard must be gone before `remove_if` locks the shard again.
        let deliveries = match self.rooms.get_mut(session_id) {
            Some(mut room) => room.leave(participant),
            None => return Vec::new(),
        };

        if self
            .rooms
            .remove_if(session_id, |_, room| room.is_empty())
            .is_some()
        {
            info!("Room {} destroyed", session_id);
        }
        deliveries
    }

    /// Remove `participant` from every room it sits in.
    pub fn depart_all(&self, participant: &ParticipantId) -> Vec<Delivery> {
        let sessions: Vec<SessionId> = self
            .rooms
            .iter()
            .filter(|room| room.contains(participant))
            .map(|room| room.key().clone())
            .collect();

        sessions
            .iter()
            .flat_map(|session_id| self.leave(session_id, participant))
            .collect()
    }

    pub fn members(&self, session_id: &SessionId) -> Vec<ParticipantId> {
        self.rooms
            .get(session_id)
            .map(|room| room.members().to_vec())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
