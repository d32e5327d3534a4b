use async_trait::async_trait;
use callkit_core::{IceServerConfig, ParticipantId, SessionId, SignalKind, SignalMessage};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub type SignalHandler = Arc<dyn Fn(SignalMessage) + Send + Sync>;

pub type RefusalHandler = Arc<dyn Fn(Refusal) + Send + Sync>;

/// The relay turned down a message this participant sent to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    pub session_id: SessionId,
    pub kind: SignalKind,
    pub reason: String,
}

/// Health of the relay connection behind a [`SignalingLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Connected,
    /// The connection dropped and reconnect attempt `attempt` is pending.
    Reconnecting { attempt: u32 },
    /// Retries are exhausted or the channel was closed.
    Closed,
}

/// What the call coordinator needs from a signaling channel.
///
/// Handlers are scoped to a call room: `(session, kind)` has at most one handler,
/// and a coordinator removes all of its handlers with [`SignalingLink::off_all`] on leave.
#[async_trait]
pub trait SignalingLink: Send + Sync {
    /// The identity the relay assigned to this connection.
    fn participant_id(&self) -> &ParticipantId;

    /// Discovery servers pushed by the relay; empty when it pushes none.
    fn ice_servers(&self) -> Vec<IceServerConfig>;

    /// Best effort. A message sent while the relay is unreachable is dropped and logged.
    async fn send(&self, message: SignalMessage);

    fn on(&self, session: &SessionId, kind: SignalKind, handler: SignalHandler);

    fn off(&self, session: &SessionId, kind: SignalKind);

    /// Listen for the relay refusing this participant's messages to `session`.
    fn on_refusal(&self, session: &SessionId, handler: RefusalHandler);

    fn off_refusal(&self, session: &SessionId);

    fn off_all(&self, session: &SessionId) {
        for kind in SignalKind::INBOUND {
            self.off(session, kind);
        }
        self.off(session, SignalKind::Leave);
        self.off_refusal(session);
    }

    fn status(&self) -> watch::Receiver<ChannelStatus>;
}

/// Dispatch table keyed by call room and message type, plus one refusal handler per room.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: Arc<DashMap<(SessionId, SignalKind), SignalHandler>>,
    refusals: Arc<DashMap<SessionId, RefusalHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: &SessionId, kind: SignalKind, handler: SignalHandler) {
        self.handlers.insert((session.clone(), kind), handler);
    }

    pub fn remove(&self, session: &SessionId, kind: SignalKind) -> bool {
        self.handlers.remove(&(session.clone(), kind)).is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn count_for(&self, session: &SessionId) -> usize {
        self.handlers
            .iter()
            .filter(|entry| &entry.key().0 == session)
            .count()
    }

    pub fn insert_refusal(&self, session: &SessionId, handler: RefusalHandler) {
        self.refusals.insert(session.clone(), handler);
    }

    pub fn remove_refusal(&self, session: &SessionId) -> bool {
        self.refusals.remove(session).is_some()
    }

    pub fn has_refusal_handler(&self, session: &SessionId) -> bool {
        self.refusals.contains_key(session)
    }

    pub fn dispatch_refusal(&self, refusal: Refusal) -> bool {
        let handler = self
            .refusals
            .get(&refusal.session_id)
            .map(|entry| entry.value().clone());

        match handler {
            Some(handler) => {
                handler(refusal);
                true
            }
            None => {
                debug!("Nobody listens for refusals in session {}", refusal.session_id);
                false
            }
        }
    }

    /// Hand `message` to its handler. Returns false when nobody listens for it.
    pub fn dispatch(&self, message: SignalMessage) -> bool {
        // Clone out of the map so a handler may call `insert`/`remove` itself.
        let handler = self
            .handlers
            .get(&(message.session_id.clone(), message.kind))
            .map(|entry| entry.value().clone());

        match handler {
            Some(handler) => {
                handler(message);
                true
            }
            None => {
                debug!(
                    "No handler for {} in session {}",
                    message.kind, message.session_id
                );
                false
            }
        }
    }
}
