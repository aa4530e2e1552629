use std::sync::Arc;

use {bytes::Bytes, tracing::debug};

use loquat_protocol::{envelope::Outbound, frame};

use crate::state::{ConnectedClient, GatewayState};

/// Serialize an envelope into a single shared text frame. The same buffer is
/// handed to every recipient.
fn render(env: &Outbound) -> Bytes {
    let json = serde_json::to_vec(env).unwrap_or_default();
    Bytes::from(frame::text_frame(&json))
}

/// Send `env` to every handshaked client currently in `room`. Failed sends do
/// not stop the fan-out; those clients are disconnected after the loop.
pub async fn broadcast_room(state: &GatewayState, room: u32, env: &Outbound) {
    let frame = render(env);
    let targets = state.clients_in_room(room).await;
    deliver(state, targets, frame).await;
}

/// Send `env` to every handshaked client.
pub async fn broadcast_all(state: &GatewayState, env: &Outbound) {
    let frame = render(env);
    let targets = state.handshaked_clients().await;
    deliver(state, targets, frame).await;
}

/// Send `env` to a single client.
pub fn send_to(client: &ConnectedClient, env: &Outbound) -> bool {
    client.send(render(env))
}

async fn deliver(state: &GatewayState, targets: Vec<Arc<ConnectedClient>>, frame: Bytes) {
    let mut dead = Vec::new();
    for client in targets {
        if !client.send(frame.clone()) {
            dead.push(client.conn_id);
        }
    }
    for conn_id in dead {
        debug!(conn_id, "dropping client with closed write channel");
        state.close_client(conn_id).await;
    }
}
