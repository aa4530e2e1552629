use {
    async_trait::async_trait,
    sqlx::mysql::{MySqlPool, MySqlPoolOptions},
};

use crate::{ChatStore, RoomSummary, Session, SessionStore, StoreResult, UnreadEntry};

/// MySQL-backed store. Tables: `sessions`, `users`, `chat_room`,
/// `chat_room_member`, `chat_message`, `chat_message_unread`.
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Connect with a small pool; the gateway is a single process and
    /// dispatch cost dominates at target concurrency.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionStore for MySqlStore {
    async fn session_find(&self, sid: &str) -> StoreResult<Option<Session>> {
        let row: Option<(u32, i64)> = sqlx::query_as(
            "SELECT userid, UNIX_TIMESTAMP(expires_at) FROM sessions WHERE id = ? LIMIT 1",
        )
        .bind(sid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(user_id, exp)| Session {
            user_id,
            expires_at: exp.max(0) as u64,
        }))
    }

    async fn user_nick(&self, user_id: u32) -> StoreResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT nickname FROM users WHERE id = ? LIMIT 1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(nick,)| nick))
    }
}

#[async_trait]
impl ChatStore for MySqlStore {
    async fn room_members(&self, room: u32) -> StoreResult<Vec<u32>> {
        let rows: Vec<(u32,)> =
            sqlx::query_as("SELECT user_id FROM chat_room_member WHERE room_id = ?")
                .bind(room)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(uid,)| uid).collect())
    }

    async fn room_join(&self, room: u32, user: u32) -> StoreResult<()> {
        sqlx::query("INSERT IGNORE INTO chat_room_member (room_id, user_id) VALUES (?, ?)")
            .bind(room)
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn room_leave(&self, room: u32, user: u32) -> StoreResult<()> {
        sqlx::query("DELETE FROM chat_room_member WHERE room_id = ? AND user_id = ?")
            .bind(room)
            .bind(user)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn message_save(&self, room: u32, sender: u32, content: &str) -> StoreResult<u64> {
        let result =
            sqlx::query("INSERT INTO chat_message (room_id, sender_id, content) VALUES (?, ?, ?)")
                .bind(room)
                .bind(sender)
                .bind(content)
                .execute(&self.pool)
                .await?;
        Ok(result.last_insert_id())
    }

    async fn unread_add(&self, mid: u64, uid: u32) -> StoreResult<()> {
        sqlx::query("INSERT IGNORE INTO chat_message_unread (message_id, user_id) VALUES (?, ?)")
            .bind(mid)
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn unread_clear(&self, room: u32, uid: u32) -> StoreResult<()> {
        sqlx::query(
            "DELETE u FROM chat_message_unread u \
             JOIN chat_message m ON m.id = u.message_id \
             WHERE m.room_id = ? AND u.user_id = ?",
        )
        .bind(room)
        .bind(uid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unread_count_for_user(&self, room: u32, uid: u32) -> StoreResult<u32> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM chat_message_unread u \
             JOIN chat_message m ON m.id = u.message_id \
             WHERE m.room_id = ? AND u.user_id = ?",
        )
        .bind(room)
        .bind(uid)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    async fn unread_count_for_message(&self, mid: u64) -> StoreResult<u32> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM chat_message_unread WHERE message_id = ?")
                .bind(mid)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }

    async fn unread_list_for_user(&self, room: u32, uid: u32) -> StoreResult<Vec<UnreadEntry>> {
        let rows: Vec<(u64, i64)> = sqlx::query_as(
            "SELECT u.message_id, COUNT(*) FROM chat_message_unread u \
             JOIN chat_message m ON m.id = u.message_id \
             WHERE m.room_id = ? AND u.user_id = ? \
             GROUP BY u.message_id",
        )
        .bind(room)
        .bind(uid)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(message_id, count)| UnreadEntry {
                message_id,
                count: count as u32,
            })
            .collect())
    }

    async fn find_public_rooms(&self) -> StoreResult<Vec<RoomSummary>> {
        let rows: Vec<(u32, String, String, u32, i64, i64)> = sqlx::query_as(
            "SELECT r.id, r.title, r.room_type, r.creator_id, \
                    UNIX_TIMESTAMP(r.created_at), \
                    (SELECT COUNT(*) FROM chat_room_member m WHERE m.room_id = r.id) \
             FROM chat_room r \
             WHERE r.room_type = 'PUBLIC' \
             ORDER BY r.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(
                |(room_id, title, room_type, creator_id, created_at, member_cnt)| RoomSummary {
                    room_id,
                    title,
                    room_type,
                    creator_id,
                    created_at: created_at.max(0) as u64,
                    member_cnt: member_cnt as u32,
                },
            )
            .collect())
    }
}
