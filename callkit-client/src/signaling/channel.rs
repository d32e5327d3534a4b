use crate::config::SignalingConfig;
use crate::error::SignalingError;
use crate::signaling::link::{
    ChannelStatus, HandlerTable, Refusal, RefusalHandler, SignalHandler, SignalingLink,
};
use async_trait::async_trait;
use callkit_core::{
    IceServerConfig, ParticipantId, RelayFrame, SessionId, SignalKind, SignalMessage,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Entry point for opening a relay connection.
pub struct SignalingChannel;

impl SignalingChannel {
    /// Connect and authenticate. The first attempt's failure is returned; once connected,
    /// drops are retried in the background per `config.reconnect` with the same token.
    pub async fn connect(
        config: SignalingConfig,
        token: impl Into<String>,
    ) -> Result<ChannelHandle, SignalingError> {
        let token = token.into();
        let (ws, participant_id, ice_servers) = open_session(&config, &token).await?;
        info!("Signaling channel authenticated as {}", participant_id);

        let (status_tx, _) = watch::channel(ChannelStatus::Connected);
        let inner = Arc::new(ChannelInner {
            participant_id,
            ice_servers,
            handlers: HandlerTable::new(),
            joined: DashMap::new(),
            outbound: Mutex::new(None),
            status_tx,
            shutdown: Notify::new(),
            closing: AtomicBool::new(false),
        });

        tokio::spawn(supervise(inner.clone(), config, token, ws));

        Ok(ChannelHandle { inner })
    }
}

/// A shared handle to one relay connection. Clones talk to the same connection.
#[derive(Clone)]
pub struct ChannelHandle {
    inner: Arc<ChannelInner>,
}

impl ChannelHandle {
    /// Flush pending sends, close the socket and stop reconnecting.
    pub fn close(&self) {
        if !self.inner.closing.swap(true, Ordering::AcqRel) {
            self.inner.shutdown.notify_one();
        }
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.inner.handlers
    }
}

struct ChannelInner {
    participant_id: ParticipantId,
    ice_servers: Vec<IceServerConfig>,
    handlers: HandlerTable,
    /// The last `join` per room, replayed after every reconnect.
    joined: DashMap<SessionId, SignalMessage>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    status_tx: watch::Sender<ChannelStatus>,
    shutdown: Notify,
    closing: AtomicBool,
}

impl ChannelInner {
    fn attach(&self, tx: mpsc::UnboundedSender<Message>) {
        if let Ok(mut slot) = self.outbound.lock() {
            *slot = Some(tx);
        }
    }

    fn detach(&self) {
        if let Ok(mut slot) = self.outbound.lock() {
            *slot = None;
        }
    }

    fn writer(&self) -> Option<mpsc::UnboundedSender<Message>> {
        self.outbound.lock().ok().and_then(|slot| slot.clone())
    }

    fn receive(&self, text: &str) {
        match serde_json::from_str::<RelayFrame>(text) {
            Ok(RelayFrame::Signal(message)) => {
                self.handlers.dispatch(message);
            }
            Ok(RelayFrame::Error {
                session_id,
                kind,
                reason,
            }) => {
                warn!("Relay refused {} in session {}: {}", kind, session_id, reason);
                if kind == SignalKind::Join {
                    // Not seated, so nothing to replay after a reconnect.
                    self.joined.remove(&session_id);
                }
                self.handlers.dispatch_refusal(Refusal {
                    session_id,
                    kind,
                    reason,
                });
            }
            Ok(other) => debug!("Ignoring unexpected relay frame: {:?}", other),
            Err(e) => warn!("Malformed relay frame: {}", e),
        }
    }
}

enum PumpExit {
    Dropped,
    Shutdown,
}

fn encode(frame: &RelayFrame) -> Result<Message, SignalingError> {
    Ok(Message::Text(serde_json::to_string(frame)?.into()))
}

async fn open_session(
    config: &SignalingConfig,
    token: &str,
) -> Result<(WsStream, ParticipantId, Vec<IceServerConfig>), SignalingError> {
    let (mut ws, _) = connect_async(config.url.as_str()).await?;
    ws.send(encode(&RelayFrame::Authenticate {
        token: token.to_owned(),
    })?)
    .await?;

    let (participant_id, ice_servers) = timeout(config.auth_timeout(), await_welcome(&mut ws))
        .await
        .map_err(|_| SignalingError::AuthTimeout)??;

    Ok((ws, participant_id, ice_servers))
}

async fn await_welcome(
    ws: &mut WsStream,
) -> Result<(ParticipantId, Vec<IceServerConfig>), SignalingError> {
    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => match serde_json::from_str::<RelayFrame>(text.as_str())? {
                RelayFrame::Welcome {
                    participant_id,
                    ice_servers,
                } => return Ok((participant_id, ice_servers)),
                RelayFrame::Rejected { reason } => return Err(SignalingError::Rejected(reason)),
                other => debug!("Frame before welcome ignored: {:?}", other),
            },
            Message::Close(_) => return Err(SignalingError::Closed),
            _ => {}
        }
    }
    Err(SignalingError::Closed)
}

async fn supervise(
    inner: Arc<ChannelInner>,
    config: SignalingConfig,
    token: String,
    mut ws: WsStream,
) {
    loop {
        let (tx, rx) = mpsc::unbounded_channel();
        for entry in inner.joined.iter() {
            match encode(&RelayFrame::Signal(entry.value().clone())) {
                Ok(frame) => {
                    debug!("Replaying join for session {}", entry.key());
                    let _ = tx.send(frame);
                }
                Err(e) => warn!("Could not encode join replay: {}", e),
            }
        }
        inner.attach(tx);
        inner.status_tx.send_replace(ChannelStatus::Connected);

        let exit = pump(&inner, ws, rx).await;
        inner.detach();
        if matches!(exit, PumpExit::Shutdown) || inner.closing.load(Ordering::Acquire) {
            break;
        }
        warn!("Relay connection lost");

        let mut attempt = 0;
        ws = loop {
            attempt += 1;
            let Some(delay) = config.reconnect.delay(attempt) else {
                error!("Giving up on the relay after {} attempts", attempt - 1);
                inner.status_tx.send_replace(ChannelStatus::Closed);
                return;
            };
            inner
                .status_tx
                .send_replace(ChannelStatus::Reconnecting { attempt });

            tokio::select! {
                _ = sleep(delay) => {}
                _ = inner.shutdown.notified() => {
                    inner.status_tx.send_replace(ChannelStatus::Closed);
                    return;
                }
            }

            match open_session(&config, &token).await {
                Ok((ws, participant_id, _)) => {
                    if participant_id != inner.participant_id {
                        warn!(
                            "Relay re-identified us as {} (was {})",
                            participant_id, inner.participant_id
                        );
                    }
                    info!("Reconnected to relay on attempt {}", attempt);
                    break ws;
                }
                Err(SignalingError::Rejected(reason)) => {
                    error!("Relay rejected re-authentication: {}", reason);
                    inner.status_tx.send_replace(ChannelStatus::Closed);
                    return;
                }
                Err(e) => warn!("Reconnect attempt {} failed: {}", attempt, e),
            }
        };
    }

    info!("Signaling channel closed");
    inner.status_tx.send_replace(ChannelStatus::Closed);
}

async fn pump(
    inner: &ChannelInner,
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) -> PumpExit {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            Some(msg) = outbound.recv() => {
                if let Err(e) = sink.send(msg).await {
                    warn!("Relay write failed: {}", e);
                    return PumpExit::Dropped;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => inner.receive(text.as_str()),
                Some(Ok(Message::Close(_))) | None => return PumpExit::Dropped,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Relay read failed: {}", e);
                    return PumpExit::Dropped;
                }
            },
            _ = inner.shutdown.notified() => {
                // Deliver what callers already sent (typically `leave`) before closing.
                while let Ok(msg) = outbound.try_recv() {
                    if sink.send(msg).await.is_err() {
                        break;
                    }
                }
                let _ = sink.send(Message::Close(None)).await;
                return PumpExit::Shutdown;
            }
        }
    }
}

#[async_trait]
impl SignalingLink for ChannelHandle {
    fn participant_id(&self) -> &ParticipantId {
        &self.inner.participant_id
    }

    fn ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.clone()
    }

    async fn send(&self, message: SignalMessage) {
        match message.kind {
            SignalKind::Join => {
                self.inner
                    .joined
                    .insert(message.session_id.clone(), message.clone());
            }
            SignalKind::Leave => {
                self.inner.joined.remove(&message.session_id);
            }
            _ => {}
        }

        let kind = message.kind;
        let frame = match encode(&RelayFrame::Signal(message)) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Could not encode {}: {}", kind, e);
                return;
            }
        };

        match self.inner.writer() {
            Some(tx) if tx.send(frame).is_ok() => {}
            _ => warn!("Relay unavailable; dropped outgoing {}", kind),
        }
    }

    fn on(&self, session: &SessionId, kind: SignalKind, handler: SignalHandler) {
        self.inner.handlers.insert(session, kind, handler);
    }

    fn off(&self, session: &SessionId, kind: SignalKind) {
        self.inner.handlers.remove(session, kind);
    }

    fn on_refusal(&self, session: &SessionId, handler: RefusalHandler) {
        self.inner.handlers.insert_refusal(session, handler);
    }

    fn off_refusal(&self, session: &SessionId) {
        self.inner.handlers.remove_refusal(session);
    }

    fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.inner.status_tx.subscribe()
    }
}
