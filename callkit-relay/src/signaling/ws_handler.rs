use crate::signaling::RelayService;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::extract::ws::{Message, WebSocket};
use axum::response::IntoResponse;
use callkit_core::{ParticipantId, RelayFrame};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(service): State<RelayService>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, service))
}

fn text_frame(frame: &RelayFrame) -> Option<Message> {
    serde_json::to_string(frame)
        .ok()
        .map(|json| Message::Text(json.into()))
}

/// Wait for the `authenticate` frame. On failure the socket gets `rejected` and is closed.
async fn authenticate(socket: &mut WebSocket, service: &RelayService) -> Option<ParticipantId> {
    let reason = match timeout(service.auth_timeout(), socket.recv()).await {
        Err(_) => "authentication timed out".to_owned(),
        Ok(Some(Ok(Message::Text(text)))) => {
            match serde_json::from_str::<RelayFrame>(text.as_str()) {
                Ok(RelayFrame::Authenticate { token }) => {
                    match service.authenticator().authenticate(&token).await {
                        Ok(participant) => return Some(participant),
                        Err(e) => e.to_string(),
                    }
                }
                Ok(_) => "first frame must be authenticate".to_owned(),
                Err(e) => format!("malformed frame: {e}"),
            }
        }
        Ok(_) => "connection closed before authentication".to_owned(),
    };

    warn!("Rejecting connection: {}", reason);
    if let Some(rejected) = text_frame(&RelayFrame::Rejected { reason }) {
        let _ = socket.send(rejected).await;
    }
    let _ = socket.send(Message::Close(None)).await;
    None
}

async fn handle_socket(mut socket: WebSocket, service: RelayService) {
    let Some(participant) = authenticate(&mut socket, &service).await else {
        return;
    };

    let welcome = RelayFrame::Welcome {
        participant_id: participant.clone(),
        ice_servers: service.ice_servers(),
    };
    let Some(welcome) = text_frame(&welcome) else {
        return;
    };
    if socket.send(welcome).await.is_err() {
        return;
    }
    info!("New relay connection: {}", participant);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let connection_id = service.register(participant.clone(), tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let mut recv_task = tokio::spawn({
        let service = service.clone();
        let participant = participant.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<RelayFrame>(text.as_str()) {
                        Ok(RelayFrame::Signal(signal)) => service.handle_signal(&participant, signal),
                        Ok(other) => warn!("Unexpected frame from {}: {:?}", participant, other),
                        Err(e) => warn!("Invalid frame from {}: {:?}", participant, e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    service.disconnect(&participant, connection_id);
    info!("Relay connection closed: {}", participant);
}
