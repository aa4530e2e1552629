use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use {
    bytes::Bytes,
    tokio::sync::{RwLock, mpsc},
    tokio_util::sync::CancellationToken,
};

/// Unix seconds now.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Connected client ─────────────────────────────────────────────────────────

/// A WebSocket client currently connected to the gateway.
///
/// `user_id` and `room_id` stay 0 until authentication / join. The reader
/// task is the only writer of these fields; the tick task and broadcast paths
/// read them through the atomics.
#[derive(Debug)]
pub struct ConnectedClient {
    pub conn_id: u64,
    pub addr: SocketAddr,
    handshaked: AtomicBool,
    user_id: AtomicU32,
    room_id: AtomicU32,
    /// Unix seconds of the last inbound traffic (liveness token).
    last_liveness: AtomicU64,
    /// Channel into this client's writer task; frames are pre-encoded, so the
    /// writer serializes all socket writes in issue order.
    sender: mpsc::UnboundedSender<Bytes>,
    /// Cancelling tears down the reader task.
    pub cancel: CancellationToken,
}

impl ConnectedClient {
    pub fn new(
        conn_id: u64,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<Bytes>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            conn_id,
            addr,
            handshaked: AtomicBool::new(false),
            user_id: AtomicU32::new(0),
            room_id: AtomicU32::new(0),
            last_liveness: AtomicU64::new(now_secs()),
            sender,
            cancel,
        }
    }

    pub fn handshaked(&self) -> bool {
        self.handshaked.load(Ordering::Relaxed)
    }

    pub fn set_handshaked(&self) {
        self.handshaked.store(true, Ordering::Relaxed);
    }

    pub fn user_id(&self) -> u32 {
        self.user_id.load(Ordering::Relaxed)
    }

    pub fn set_user_id(&self, user_id: u32) {
        self.user_id.store(user_id, Ordering::Relaxed);
    }

    pub fn room_id(&self) -> u32 {
        self.room_id.load(Ordering::Relaxed)
    }

    pub fn set_room_id(&self, room_id: u32) {
        self.room_id.store(room_id, Ordering::Relaxed);
    }

    pub fn last_liveness(&self) -> u64 {
        self.last_liveness.load(Ordering::Relaxed)
    }

    /// Touch the liveness token.
    pub fn touch(&self) {
        self.last_liveness.store(now_secs(), Ordering::Relaxed);
    }

    /// Queue a pre-encoded frame for this client's writer task. Returns false
    /// when the writer is gone (connection already tearing down).
    pub fn send(&self, frame: Bytes) -> bool {
        self.sender.send(frame).is_ok()
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state. The client map is the only shared mutable
/// structure; its lock is never held across a store call or a socket write.
pub struct GatewayState {
    /// All connected clients keyed by conn_id.
    clients: RwLock<HashMap<u64, Arc<ConnectedClient>>>,
    conn_seq: AtomicU64,
}

impl GatewayState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            conn_seq: AtomicU64::new(0),
        })
    }

    pub fn next_conn_id(&self) -> u64 {
        self.conn_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register a new connection.
    pub async fn register(&self, client: Arc<ConnectedClient>) {
        self.clients.write().await.insert(client.conn_id, client);
    }

    /// Remove a client by conn_id. Idempotent; returns the removed client if
    /// it was still present.
    pub async fn remove(&self, conn_id: u64) -> Option<Arc<ConnectedClient>> {
        self.clients.write().await.remove(&conn_id)
    }

    /// Terminate a client: deregister, then cancel its reader. The writer
    /// drains and shuts the socket down once the last sender handle drops.
    pub async fn close_client(&self, conn_id: u64) -> Option<Arc<ConnectedClient>> {
        let client = self.remove(conn_id).await?;
        client.cancel.cancel();
        Some(client)
    }

    pub async fn contains(&self, conn_id: u64) -> bool {
        self.clients.read().await.contains_key(&conn_id)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Snapshot of every handshaked client.
    pub async fn handshaked_clients(&self) -> Vec<Arc<ConnectedClient>> {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.handshaked())
            .cloned()
            .collect()
    }

    /// Snapshot of every handshaked client currently in `room`.
    pub async fn clients_in_room(&self, room: u32) -> Vec<Arc<ConnectedClient>> {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.handshaked() && c.room_id() == room)
            .cloned()
            .collect()
    }

    /// Snapshot for unread fan-out, taken under one lock acquisition: the
    /// user ids online in `room`, and every authenticated client elsewhere.
    pub async fn unread_snapshot(&self, room: u32) -> (HashSet<u32>, Vec<Arc<ConnectedClient>>) {
        let clients = self.clients.read().await;
        let mut online_here = HashSet::new();
        let mut elsewhere = Vec::new();
        for client in clients.values() {
            if !client.handshaked() || client.user_id() == 0 {
                continue;
            }
            if client.room_id() == room {
                online_here.insert(client.user_id());
            } else {
                elsewhere.push(Arc::clone(client));
            }
        }
        (online_here, elsewhere)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(state: &GatewayState) -> (Arc<ConnectedClient>, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(ConnectedClient::new(
            state.next_conn_id(),
            "127.0.0.1:9".parse().unwrap(),
            tx,
            CancellationToken::new(),
        ));
        (client, rx)
    }

    #[tokio::test]
    async fn register_remove_roundtrip() {
        let state = GatewayState::new();
        let (client, _rx) = test_client(&state);
        let conn_id = client.conn_id;

        state.register(client).await;
        assert!(state.contains(conn_id).await);
        assert_eq!(state.client_count().await, 1);

        assert!(state.remove(conn_id).await.is_some());
        assert!(!state.contains(conn_id).await);
        // Removal is idempotent.
        assert!(state.remove(conn_id).await.is_none());
    }

    #[tokio::test]
    async fn close_client_cancels_reader() {
        let state = GatewayState::new();
        let (client, _rx) = test_client(&state);
        let cancel = client.cancel.clone();
        let conn_id = client.conn_id;
        state.register(client).await;

        state.close_client(conn_id).await;
        assert!(cancel.is_cancelled());
        assert!(!state.contains(conn_id).await);
    }

    #[tokio::test]
    async fn room_snapshot_filters_on_handshake_and_room() {
        let state = GatewayState::new();

        let (lobby, _rx1) = test_client(&state);
        lobby.set_handshaked();
        let (in_room, _rx2) = test_client(&state);
        in_room.set_handshaked();
        in_room.set_user_id(7);
        in_room.set_room_id(4);
        let (pre_handshake, _rx3) = test_client(&state);
        pre_handshake.set_room_id(4);

        let in_room_id = in_room.conn_id;
        state.register(lobby).await;
        state.register(in_room).await;
        state.register(pre_handshake).await;

        let room = state.clients_in_room(4).await;
        assert_eq!(room.len(), 1);
        assert_eq!(room[0].conn_id, in_room_id);
        assert_eq!(state.handshaked_clients().await.len(), 2);
    }

    #[tokio::test]
    async fn unread_snapshot_splits_online_and_elsewhere() {
        let state = GatewayState::new();

        let (here, _rx1) = test_client(&state);
        here.set_handshaked();
        here.set_user_id(1);
        here.set_room_id(4);
        let (away, _rx2) = test_client(&state);
        away.set_handshaked();
        away.set_user_id(2);
        away.set_room_id(9);
        let (anon, _rx3) = test_client(&state);
        anon.set_handshaked();

        state.register(here).await;
        state.register(away).await;
        state.register(anon).await;

        let (online_here, elsewhere) = state.unread_snapshot(4).await;
        assert_eq!(online_here, HashSet::from([1]));
        assert_eq!(elsewhere.len(), 1);
        assert_eq!(elsewhere[0].user_id(), 2);
    }
}
