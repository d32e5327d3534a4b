use callkit_core::IceServerConfig;
use callkit_core::utils::{DEFAULT_STUN_ADDR, DEFAULT_STUN_ADDR_2};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    /// Pushed to every client in its `welcome` frame.
    pub ice_servers: Vec<IceServerConfig>,
    /// Messages kept for a participant who is alone in its room.
    pub backlog_limit: usize,
    pub auth_timeout_ms: u64,
    /// How long a seat survives a dropped socket before `peer-left` is announced.
    pub seat_grace_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_owned(),
            ice_servers: vec![IceServerConfig {
                urls: vec![DEFAULT_STUN_ADDR.to_owned(), DEFAULT_STUN_ADDR_2.to_owned()],
                username: None,
                credential: None,
            }],
            backlog_limit: 64,
            auth_timeout_ms: 5_000,
            seat_grace_ms: 3_000,
        }
    }
}

impl RelayConfig {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn seat_grace(&self) -> Duration {
        Duration::from_millis(self.seat_grace_ms)
    }
}
