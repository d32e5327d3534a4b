mod test_channel_status;
mod test_relay_call;

use callkit_client::{BackoffPolicy, SignalingConfig};
use callkit_relay::{RelayConfig, RelayHandle, TokenAsIdentity};
use std::sync::Arc;

pub fn relay_config(seat_grace_ms: u64) -> RelayConfig {
    RelayConfig {
        bind: "127.0.0.1:0".to_owned(),
        auth_timeout_ms: 1_000,
        seat_grace_ms,
        ..Default::default()
    }
}

pub async fn start_relay(seat_grace_ms: u64) -> RelayHandle {
    callkit_relay::spawn(relay_config(seat_grace_ms), Arc::new(TokenAsIdentity))
        .await
        .expect("relay failed to start")
}

pub fn signaling_config(relay: &RelayHandle) -> SignalingConfig {
    SignalingConfig {
        url: relay.url(),
        auth_timeout_ms: 1_000,
        reconnect: BackoffPolicy {
            initial_delay_ms: 50,
            max_delay_ms: 200,
            max_attempts: 5,
        },
    }
}
