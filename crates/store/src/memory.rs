use std::{
    collections::{BTreeSet, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;

use crate::{ChatStore, RoomSummary, Session, SessionStore, StoreResult, UnreadEntry};

/// In-memory store with the same observable semantics as the MySQL store.
/// Backs gateway tests and `--memory-store` development runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    nicks: HashMap<u32, String>,
    rooms: HashMap<u32, RoomMeta>,
    /// room → members
    members: HashMap<u32, BTreeSet<u32>>,
    /// message id → row
    messages: HashMap<u64, MessageRow>,
    /// (message id, user id)
    unread: BTreeSet<(u64, u32)>,
    last_mid: u64,
}

struct RoomMeta {
    title: String,
    room_type: String,
    creator_id: u32,
    created_at: u64,
}

struct MessageRow {
    room: u32,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Seeding helpers ──────────────────────────────────────────────────────

    pub fn insert_session(&self, sid: &str, user_id: u32, expires_at: u64) {
        self.lock().sessions.insert(sid.to_string(), Session {
            user_id,
            expires_at,
        });
    }

    pub fn insert_user(&self, user_id: u32, nick: &str) {
        self.lock().nicks.insert(user_id, nick.to_string());
    }

    pub fn insert_room(&self, room: u32, title: &str, creator_id: u32) {
        self.lock().rooms.insert(room, RoomMeta {
            title: title.to_string(),
            room_type: "PUBLIC".to_string(),
            creator_id,
            created_at: now_secs(),
        });
    }

    /// Seed a message under a fixed id (tests reference ids directly).
    pub fn insert_message(&self, mid: u64, room: u32) {
        let mut inner = self.lock();
        inner.messages.insert(mid, MessageRow { room });
        inner.last_mid = inner.last_mid.max(mid);
    }

    pub fn has_unread(&self, mid: u64, uid: u32) -> bool {
        self.lock().unread.contains(&(mid, uid))
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn session_find(&self, sid: &str) -> StoreResult<Option<Session>> {
        Ok(self.lock().sessions.get(sid).cloned())
    }

    async fn user_nick(&self, user_id: u32) -> StoreResult<Option<String>> {
        Ok(self.lock().nicks.get(&user_id).cloned())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn room_members(&self, room: u32) -> StoreResult<Vec<u32>> {
        Ok(self
            .lock()
            .members
            .get(&room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn room_join(&self, room: u32, user: u32) -> StoreResult<()> {
        self.lock().members.entry(room).or_default().insert(user);
        Ok(())
    }

    async fn room_leave(&self, room: u32, user: u32) -> StoreResult<()> {
        if let Some(members) = self.lock().members.get_mut(&room) {
            members.remove(&user);
        }
        Ok(())
    }

    async fn message_save(&self, room: u32, _sender: u32, _content: &str) -> StoreResult<u64> {
        let mut inner = self.lock();
        inner.last_mid += 1;
        let mid = inner.last_mid;
        inner.messages.insert(mid, MessageRow { room });
        Ok(mid)
    }

    async fn unread_add(&self, mid: u64, uid: u32) -> StoreResult<()> {
        self.lock().unread.insert((mid, uid));
        Ok(())
    }

    async fn unread_clear(&self, room: u32, uid: u32) -> StoreResult<()> {
        let mut inner = self.lock();
        let in_room: Vec<u64> = inner
            .messages
            .iter()
            .filter(|(_, row)| row.room == room)
            .map(|(&mid, _)| mid)
            .collect();
        for mid in in_room {
            inner.unread.remove(&(mid, uid));
        }
        Ok(())
    }

    async fn unread_count_for_user(&self, room: u32, uid: u32) -> StoreResult<u32> {
        let inner = self.lock();
        let count = inner
            .unread
            .iter()
            .filter(|(mid, u)| {
                *u == uid && inner.messages.get(mid).is_some_and(|row| row.room == room)
            })
            .count();
        Ok(count as u32)
    }

    async fn unread_count_for_message(&self, mid: u64) -> StoreResult<u32> {
        let count = self
            .lock()
            .unread
            .range((mid, u32::MIN)..=(mid, u32::MAX))
            .count();
        Ok(count as u32)
    }

    async fn unread_list_for_user(&self, room: u32, uid: u32) -> StoreResult<Vec<UnreadEntry>> {
        let inner = self.lock();
        Ok(inner
            .unread
            .iter()
            .filter(|(mid, u)| {
                *u == uid && inner.messages.get(mid).is_some_and(|row| row.room == room)
            })
            .map(|&(mid, _)| UnreadEntry {
                message_id: mid,
                count: 1,
            })
            .collect())
    }

    async fn find_public_rooms(&self) -> StoreResult<Vec<RoomSummary>> {
        let inner = self.lock();
        let mut rooms: Vec<RoomSummary> = inner
            .rooms
            .iter()
            .filter(|(_, meta)| meta.room_type == "PUBLIC")
            .map(|(&room_id, meta)| RoomSummary {
                room_id,
                title: meta.title.clone(),
                room_type: meta.room_type.clone(),
                creator_id: meta.creator_id,
                created_at: meta.created_at,
                member_cnt: inner.members.get(&room_id).map_or(0, |m| m.len()) as u32,
            })
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }
}
