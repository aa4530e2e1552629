use std::{sync::Arc, time::Duration};

use tracing::info;

use loquat_protocol::{PING_INTERVAL_SECS, PONG_TIMEOUT_SECS, envelope::Outbound};

use crate::{
    broadcast::broadcast_all,
    state::{GatewayState, now_secs},
};

/// Periodic liveness loop. The 1-second tick bounds keep-alive granularity:
/// application-level `ping` envelopes go out every [`PING_INTERVAL_SECS`],
/// and silent clients are pruned on every tick.
pub async fn run(state: Arc<GatewayState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    let mut last_ping = now_secs();
    loop {
        interval.tick().await;
        let now = now_secs();
        if now.saturating_sub(last_ping) >= PING_INTERVAL_SECS {
            broadcast_all(&state, &Outbound::Ping).await;
            last_ping = now;
        }
        prune(&state, now).await;
    }
}

/// Evict every handshaked client whose liveness token is older than the pong
/// timeout. Targets are collected first; eviction happens after the registry
/// lock is released.
pub async fn prune(state: &GatewayState, now: u64) {
    let stale: Vec<u64> = state
        .handshaked_clients()
        .await
        .into_iter()
        .filter(|c| now.saturating_sub(c.last_liveness()) > PONG_TIMEOUT_SECS)
        .map(|c| c.conn_id)
        .collect();
    for conn_id in stale {
        info!(conn_id, "evicting unresponsive client");
        state.close_client(conn_id).await;
    }
}
