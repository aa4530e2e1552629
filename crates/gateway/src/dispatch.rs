use std::{collections::HashSet, sync::Arc};

use tracing::{debug, warn};

use {
    loquat_protocol::envelope::{Inbound, Outbound},
    loquat_store::{ChatStore, SessionStore},
};

use crate::{
    broadcast::{broadcast_all, broadcast_room, send_to},
    state::{ConnectedClient, GatewayState, now_secs},
};

/// Store handles shared by every connection.
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub chat: Arc<dyn ChatStore>,
}

/// Dispatch one inbound text frame.
///
/// Returns false when the payload was not JSON at all; the caller echoes the
/// text back in that case. Malformed envelopes (unknown `type`, missing
/// fields) are dropped here and still count as handled.
pub async fn handle_text(
    state: &GatewayState,
    stores: &Stores,
    client: &Arc<ConnectedClient>,
    payload: &[u8],
) -> bool {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) else {
        return false;
    };
    // Any valid JSON counts as liveness, envelope or not.
    client.touch();

    let envelope = match serde_json::from_value::<Inbound>(value) {
        Ok(env) => env,
        Err(e) => {
            debug!(conn_id = client.conn_id, error = %e, "dropping malformed envelope");
            return true;
        },
    };

    match envelope {
        Inbound::Pong => {},
        Inbound::Auth { sid } => handle_auth(stores, client, &sid).await,
        Inbound::Join { sid, room } => handle_join(state, stores, client, &sid, room).await,
        Inbound::Leave => handle_leave(state, client).await,
        Inbound::Message { content } => handle_message(state, stores, client, content).await,
        Inbound::UpdateChatRoom => broadcast_all(state, &Outbound::UpdatedChatRoom).await,
    }
    true
}

// ── auth ─────────────────────────────────────────────────────────────────────

async fn handle_auth(stores: &Stores, client: &Arc<ConnectedClient>, sid: &str) {
    match validate_session(stores, sid).await {
        Some(user_id) => {
            client.set_user_id(user_id);
            send_to(client, &Outbound::AuthOk);
        },
        // Invalid or expired sessions get no reply.
        None => debug!(conn_id = client.conn_id, "auth with invalid session"),
    }
}

/// Resolve a session id to a user id. Expired sessions are invalid; store
/// failures are treated as a miss.
async fn validate_session(stores: &Stores, sid: &str) -> Option<u32> {
    match stores.sessions.session_find(sid).await {
        Ok(Some(session)) if session.expires_at > now_secs() => Some(session.user_id),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "session lookup failed");
            None
        },
    }
}

// ── join ─────────────────────────────────────────────────────────────────────

async fn handle_join(
    state: &GatewayState,
    stores: &Stores,
    client: &Arc<ConnectedClient>,
    sid: &str,
    room: u32,
) {
    // Join re-validates the session, so it works with or without a prior auth.
    let Some(user_id) = validate_session(stores, sid).await else {
        debug!(conn_id = client.conn_id, room, "join with invalid session");
        return;
    };

    if let Err(e) = stores.chat.room_join(room, user_id).await {
        warn!(error = %e, room, user_id, "room_join failed");
    }

    // Snapshot before clearing; remaining counts are recomputed per message
    // below.
    let pending = match stores.chat.unread_list_for_user(room, user_id).await {
        Ok(list) => list,
        Err(e) => {
            warn!(error = %e, room, user_id, "unread_list_for_user failed");
            Vec::new()
        },
    };
    if let Err(e) = stores.chat.unread_clear(room, user_id).await {
        warn!(error = %e, room, user_id, "unread_clear failed");
    }
    send_to(client, &Outbound::Unread { room, count: 0 });

    client.set_user_id(user_id);
    client.set_room_id(room);

    let users = match stores.chat.room_members(room).await {
        Ok(members) => members,
        Err(e) => {
            warn!(error = %e, room, "room_members failed");
            Vec::new()
        },
    };
    broadcast_room(state, room, &Outbound::Joined { room, users }).await;

    for entry in pending {
        let unread_cnt = match stores.chat.unread_count_for_message(entry.message_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, message_id = entry.message_id, "unread_count_for_message failed");
                continue;
            },
        };
        broadcast_room(state, room, &Outbound::UpdatedMessage {
            id: entry.message_id,
            unread_cnt,
        })
        .await;
    }
}

// ── leave ────────────────────────────────────────────────────────────────────

/// Leave is an ephemeral presence signal; persistent membership stays.
async fn handle_leave(state: &GatewayState, client: &Arc<ConnectedClient>) {
    let prev = client.room_id();
    client.set_room_id(0);
    if prev != 0 {
        broadcast_room(state, prev, &Outbound::Left {
            room: prev,
            user: client.user_id(),
        })
        .await;
    }
}

// ── message ──────────────────────────────────────────────────────────────────

async fn handle_message(
    state: &GatewayState,
    stores: &Stores,
    client: &Arc<ConnectedClient>,
    content: String,
) {
    let user_id = client.user_id();
    let room = client.room_id();
    if user_id == 0 || room == 0 {
        debug!(conn_id = client.conn_id, "dropping message from client outside a room");
        return;
    }

    // message_save failure aborts the whole frame: no unread rows, no
    // broadcast.
    let mid = match stores.chat.message_save(room, user_id, &content).await {
        Ok(mid) => mid,
        Err(e) => {
            warn!(error = %e, room, user_id, "message_save failed, dropping frame");
            return;
        },
    };

    let members = match stores.chat.room_members(room).await {
        Ok(members) => members,
        Err(e) => {
            warn!(error = %e, room, "room_members failed");
            Vec::new()
        },
    };

    // One lock acquisition decides who counts as online in this room.
    let (online_here, elsewhere) = state.unread_snapshot(room).await;

    for &member in &members {
        if member == user_id || online_here.contains(&member) {
            continue;
        }
        if let Err(e) = stores.chat.unread_add(mid, member).await {
            warn!(error = %e, message_id = mid, user_id = member, "unread_add failed");
        }
    }

    // Members connected somewhere other than this room get their new total.
    let member_set: HashSet<u32> = members.iter().copied().collect();
    for peer in &elsewhere {
        let uid = peer.user_id();
        if uid == user_id || !member_set.contains(&uid) {
            continue;
        }
        match stores.chat.unread_count_for_user(room, uid).await {
            Ok(count) => {
                send_to(peer, &Outbound::Unread { room, count });
            },
            Err(e) => warn!(error = %e, room, user_id = uid, "unread_count_for_user failed"),
        }
    }

    let nick = match stores.sessions.user_nick(user_id).await {
        Ok(Some(nick)) => nick,
        Ok(None) => String::new(),
        Err(e) => {
            warn!(error = %e, user_id, "user_nick failed");
            String::new()
        },
    };
    let unread_cnt = match stores.chat.unread_count_for_message(mid).await {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, message_id = mid, "unread_count_for_message failed");
            0
        },
    };
    broadcast_room(state, room, &Outbound::Message {
        room,
        id: mid,
        sender: user_id,
        nick,
        content,
        ts: now_secs(),
        unread_cnt,
    })
    .await;
}
