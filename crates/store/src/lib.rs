//! Persistent store interface for sessions, rooms, messages and unread rows.
//!
//! The gateway core only sees the [`SessionStore`] and [`ChatStore`] traits.
//! `mysql` is the production implementation; `memory` backs tests and
//! development runs.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;

// ── Types ────────────────────────────────────────────────────────────────────

/// A login session row. Sessions are issued by the HTTP side before the
/// WebSocket connection exists.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: u32,
    /// Unix seconds; a session whose expiry is in the past is invalid.
    pub expires_at: u64,
}

/// Per-message unread tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadEntry {
    pub message_id: u64,
    pub count: u32,
}

/// A chat room as listed to clients.
#[derive(Debug, Clone)]
pub struct RoomSummary {
    pub room_id: u32,
    pub title: String,
    pub room_type: String,
    pub creator_id: u32,
    pub created_at: u64,
    pub member_cnt: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ── Traits ───────────────────────────────────────────────────────────────────

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session by id. `None` when absent.
    async fn session_find(&self, sid: &str) -> StoreResult<Option<Session>>;

    /// Nickname for a user id. `None` when the user is unknown.
    async fn user_nick(&self, user_id: u32) -> StoreResult<Option<String>>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Persistent members of a room.
    async fn room_members(&self, room: u32) -> StoreResult<Vec<u32>>;

    /// Insert persistent membership. Idempotent.
    async fn room_join(&self, room: u32, user: u32) -> StoreResult<()>;

    /// Remove persistent membership. The gateway never calls this; `leave`
    /// is an ephemeral presence signal.
    async fn room_leave(&self, room: u32, user: u32) -> StoreResult<()>;

    /// Persist a message, returning its id.
    async fn message_save(&self, room: u32, sender: u32, content: &str) -> StoreResult<u64>;

    /// Mark `mid` unread for `uid`. Idempotent.
    async fn unread_add(&self, mid: u64, uid: u32) -> StoreResult<()>;

    /// Drop every unread row for `uid` across messages in `room`.
    async fn unread_clear(&self, room: u32, uid: u32) -> StoreResult<()>;

    /// Unread rows for `uid` over messages in `room`.
    async fn unread_count_for_user(&self, room: u32, uid: u32) -> StoreResult<u32>;

    /// Unread rows for a single message, over all users.
    async fn unread_count_for_message(&self, mid: u64) -> StoreResult<u32>;

    /// Per-message unread tallies for `uid` in `room`.
    async fn unread_list_for_user(&self, room: u32, uid: u32) -> StoreResult<Vec<UnreadEntry>>;

    /// Public rooms, newest first.
    async fn find_public_rooms(&self) -> StoreResult<Vec<RoomSummary>>;
}
