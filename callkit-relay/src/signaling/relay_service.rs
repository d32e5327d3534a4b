use crate::auth::Authenticator;
use crate::config::RelayConfig;
use crate::room::{Delivery, RoomManager};
use axum::extract::ws::Message;
use callkit_core::{IceServerConfig, ParticipantId, RelayFrame, SignalKind, SignalMessage};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct Connection {
    id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
}

struct RelayInner {
    connections: DashMap<ParticipantId, Connection>,
    rooms: RoomManager,
    authenticator: Arc<dyn Authenticator>,
    ice_servers: Vec<IceServerConfig>,
    auth_timeout: Duration,
    seat_grace: Duration,
}

/// Authenticated connections plus the rooms they sit in.
#[derive(Clone)]
pub struct RelayService {
    inner: Arc<RelayInner>,
}

impl RelayService {
    pub fn new(config: &RelayConfig, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                connections: DashMap::new(),
                rooms: RoomManager::new(config.backlog_limit),
                authenticator,
                ice_servers: config.ice_servers.clone(),
                auth_timeout: config.auth_timeout(),
                seat_grace: config.seat_grace(),
            }),
        }
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.inner.authenticator.as_ref()
    }

    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.clone()
    }

    pub fn auth_timeout(&self) -> Duration {
        self.inner.auth_timeout
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.inner.rooms
    }

    /// Attach a socket to `participant`, replacing (and thereby closing) an older one.
    pub fn register(&self, participant: ParticipantId, tx: mpsc::UnboundedSender<Message>) -> Uuid {
        let id = Uuid::new_v4();
        if self
            .inner
            .connections
            .insert(participant.clone(), Connection { id, tx })
            .is_some()
        {
            info!("{} reconnected; previous socket replaced", participant);
        }
        id
    }

    pub fn is_connected(&self, participant: &ParticipantId) -> bool {
        self.inner.connections.contains_key(participant)
    }

    /// Called when socket `connection_id` of `participant` is gone. Its seats are freed
    /// after the grace period unless the participant is back by then.
    pub fn disconnect(&self, participant: &ParticipantId, connection_id: Uuid) {
        self.inner
            .connections
            .remove_if(participant, |_, c| c.id == connection_id);
        if self.is_connected(participant) {
            return;
        }

        let grace = self.inner.seat_grace;
        if grace.is_zero() {
            self.release_seats(participant);
            return;
        }

        let service = self.clone();
        let participant = participant.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if !service.is_connected(&participant) {
                service.release_seats(&participant);
            }
        });
    }

    /// Close the socket of `participant` as if the network dropped it.
    pub fn drop_connection(&self, participant: &ParticipantId) -> bool {
        self.inner.connections.remove(participant).is_some()
    }

    fn release_seats(&self, participant: &ParticipantId) {
        let deliveries = self.inner.rooms.depart_all(participant);
        if !deliveries.is_empty() {
            info!("Released seats of {}", participant);
        }
        self.deliver(deliveries);
    }

    /// Route one signal from an authenticated participant.
    pub fn handle_signal(&self, participant: &ParticipantId, mut message: SignalMessage) {
        if &message.from_participant_id != participant {
            warn!(
                "{} sent a message claiming to be {}; rewriting sender",
                participant, message.from_participant_id
            );
            message.from_participant_id = participant.clone();
        }

        let session_id = message.session_id.clone();
        let kind = message.kind;
        let routed = match kind {
            SignalKind::Join => self.inner.rooms.join(participant, message),
            SignalKind::Leave => Ok(self.inner.rooms.leave(&session_id, participant)),
            SignalKind::Offer | SignalKind::Answer | SignalKind::IceCandidate => {
                self.inner.rooms.relay(participant, message)
            }
            SignalKind::PeerJoined | SignalKind::PeerLeft => {
                warn!("{} tried to send relay-only {}", participant, kind);
                return;
            }
        };

        match routed {
            Ok(deliveries) => self.deliver(deliveries),
            Err(e) => {
                warn!("Refused {} from {}: {}", kind, participant, e);
                self.send_frame(
                    participant,
                    &RelayFrame::Error {
                        session_id,
                        kind,
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    fn deliver(&self, deliveries: Vec<Delivery>) {
        for Delivery { to, message } in deliveries {
            self.send_frame(&to, &RelayFrame::Signal(message));
        }
    }

    pub fn send_frame(&self, participant: &ParticipantId, frame: &RelayFrame) {
        let Some(connection) = self.inner.connections.get(participant) else {
            debug!("{} is not connected; frame dropped", participant);
            return;
        };
        match serde_json::to_string(frame) {
            Ok(json) => {
                if let Err(e) = connection.tx.send(Message::Text(json.into())) {
                    error!("Failed to queue frame for {}: {:?}", participant, e);
                }
            }
            Err(e) => error!("Failed to serialize relay frame: {}", e),
        }
    }
}
