pub mod auth;
pub mod config;
pub mod error;
pub mod room;
pub mod signaling;

pub use auth::*;
pub use config::*;
pub use error::*;
pub use room::*;
pub use signaling::*;

use axum::Router;
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub fn router(service: RelayService) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(service)
}

async fn bind(config: &RelayConfig) -> Result<TcpListener, RelayError> {
    TcpListener::bind(&config.bind)
        .await
        .map_err(|source| RelayError::Bind {
            addr: config.bind.clone(),
            source,
        })
}

/// Run the relay until the server fails.
pub async fn serve(
    config: RelayConfig,
    authenticator: Arc<dyn Authenticator>,
) -> Result<(), RelayError> {
    let listener = bind(&config).await?;
    info!("Relay listening on {}", listener.local_addr()?);

    let service = RelayService::new(&config, authenticator);
    axum::serve(listener, router(service)).await?;
    Ok(())
}

/// A relay running in the background of the current runtime.
pub struct RelayHandle {
    pub addr: SocketAddr,
    pub service: RelayService,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// WebSocket URL clients connect to.
    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Bind and serve in a spawned task. Binding to port 0 picks a free port.
pub async fn spawn(
    config: RelayConfig,
    authenticator: Arc<dyn Authenticator>,
) -> Result<RelayHandle, RelayError> {
    let listener = bind(&config).await?;
    let addr = listener.local_addr()?;
    let service = RelayService::new(&config, authenticator);

    let app = router(service.clone());
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Relay server stopped: {}", e);
        }
    });
    info!("Relay listening on {}", addr);

    Ok(RelayHandle {
        addr,
        service,
        task,
    })
}
