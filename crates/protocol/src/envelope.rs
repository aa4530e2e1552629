use serde::{Deserialize, Serialize};

// ── Inbound ──────────────────────────────────────────────────────────────────

/// Envelopes a client may send. Unknown `type` values and envelopes missing a
/// required field fail deserialization; the dispatcher drops such frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Inbound {
    #[serde(rename = "auth")]
    Auth { sid: String },
    #[serde(rename = "join")]
    Join { sid: String, room: u32 },
    #[serde(rename = "leave")]
    Leave,
    #[serde(rename = "message")]
    Message { content: String },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "update-chat-room")]
    UpdateChatRoom,
}

// ── Outbound ─────────────────────────────────────────────────────────────────

/// Envelopes the gateway emits. Serialized once per broadcast; the resulting
/// frame buffer is shared across recipients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Outbound {
    #[serde(rename = "auth_ok")]
    AuthOk,
    #[serde(rename = "joined")]
    Joined { room: u32, users: Vec<u32> },
    #[serde(rename = "left")]
    Left { room: u32, user: u32 },
    #[serde(rename = "message")]
    Message {
        room: u32,
        id: u64,
        sender: u32,
        nick: String,
        content: String,
        ts: u64,
        unread_cnt: u32,
    },
    #[serde(rename = "unread")]
    Unread { room: u32, count: u32 },
    #[serde(rename = "updated-message")]
    UpdatedMessage { id: u64, unread_cnt: u32 },
    #[serde(rename = "updated-chat-room")]
    UpdatedChatRoom,
    #[serde(rename = "ping")]
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_wire_shapes() {
        assert_eq!(
            serde_json::to_string(&Outbound::AuthOk).unwrap(),
            r#"{"type":"auth_ok"}"#
        );
        assert_eq!(
            serde_json::to_string(&Outbound::Unread { room: 1, count: 3 }).unwrap(),
            r#"{"type":"unread","room":1,"count":3}"#
        );
        assert_eq!(
            serde_json::to_string(&Outbound::UpdatedMessage {
                id: 10,
                unread_cnt: 2
            })
            .unwrap(),
            r#"{"type":"updated-message","id":10,"unread_cnt":2}"#
        );
        assert_eq!(
            serde_json::to_string(&Outbound::UpdatedChatRoom).unwrap(),
            r#"{"type":"updated-chat-room"}"#
        );
        assert_eq!(
            serde_json::to_string(&Outbound::Ping).unwrap(),
            r#"{"type":"ping"}"#
        );
    }

    #[test]
    fn inbound_parses_known_types() {
        let auth: Inbound = serde_json::from_str(r#"{"type":"auth","sid":"S1"}"#).unwrap();
        assert!(matches!(auth, Inbound::Auth { sid } if sid == "S1"));

        let join: Inbound = serde_json::from_str(r#"{"type":"join","sid":"S1","room":7}"#).unwrap();
        assert!(matches!(join, Inbound::Join { room: 7, .. }));

        assert!(matches!(
            serde_json::from_str(r#"{"type":"pong"}"#).unwrap(),
            Inbound::Pong
        ));
    }

    #[test]
    fn inbound_rejects_missing_fields_and_unknown_types() {
        // join without a room.
        assert!(serde_json::from_str::<Inbound>(r#"{"type":"join","sid":"S1"}"#).is_err());
        // message without content.
        assert!(serde_json::from_str::<Inbound>(r#"{"type":"message"}"#).is_err());
        // unknown type tag.
        assert!(serde_json::from_str::<Inbound>(r#"{"type":"dance"}"#).is_err());
        // no type at all.
        assert!(serde_json::from_str::<Inbound>(r#"{"content":"hi"}"#).is_err());
    }
}
