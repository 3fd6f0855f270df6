use std::sync::Arc;

use realtime_hub_shared::{ChatMessage, ServerMessage};
use tokio::sync::RwLock;

use crate::room::{broadcast_all, CHAT_HISTORY_CAP, CHAT_HISTORY_REPLY_LIMIT};
use crate::room::{unicast_to, Room};
use crate::util::{now_ms, opaque_token};

const CHAT_ID_LEN: usize = 12;
const MAX_TEXT_LEN: usize = 4000;

/// Appends a chat message to the room's rolling history (capped at
/// `CHAT_HISTORY_CAP`, oldest dropped first) and fans it out to the whole
/// room including the sender, who reconciles it against its optimistic
/// local echo via `clientId` (§4.7).
pub async fn send(room: &Arc<RwLock<Room>>, actor: &str, text: String, name: Option<String>, client_id: Option<String>) {
    let text: String = text.trim().chars().take(MAX_TEXT_LEN).collect();
    if text.is_empty() {
        return;
    }
    let message = ChatMessage {
        id: opaque_token(CHAT_ID_LEN),
        user_id: actor.to_string(),
        name,
        text,
        ts: now_ms() as f64,
        client_id,
    };
    {
        let mut guard = room.write().await;
        guard.chat.push_back(message.clone());
        while guard.chat.len() > CHAT_HISTORY_CAP {
            guard.chat.pop_front();
        }
    }
    broadcast_all(room, &ServerMessage::Chat(message)).await;
}

pub async fn history(room: &Arc<RwLock<Room>>, actor: &str) {
    let messages = { room.read().await.chat_tail(CHAT_HISTORY_REPLY_LIMIT) };
    unicast_to(room, actor, &ServerMessage::ChatHistory { messages }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::{Peer, PEER_QUEUE_CAPACITY};
    use realtime_hub_shared::Role;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn send_trims_history_past_the_cap() {
        let room = Arc::new(RwLock::new(Room::new("r1".to_string(), Vec::new())));
        let (tx, _rx) = mpsc::channel(PEER_QUEUE_CAPACITY);
        room.write().await.peers.insert("u1".to_string(), Peer::new(Role::Web, tx));
        for i in 0..(CHAT_HISTORY_CAP + 10) {
            send(&room, "u1", format!("msg {i}"), None, None).await;
        }
        assert_eq!(room.read().await.chat.len(), CHAT_HISTORY_CAP);
        assert_eq!(room.read().await.chat.front().unwrap().text, "msg 10");
    }

    #[tokio::test]
    async fn blank_text_is_dropped() {
        let room = Arc::new(RwLock::new(Room::new("r1".to_string(), Vec::new())));
        send(&room, "u1", "   ".to_string(), None, None).await;
        assert!(room.read().await.chat.is_empty());
    }

    #[tokio::test]
    async fn sender_receives_its_own_message_for_echo_reconciliation() {
        let room = Arc::new(RwLock::new(Room::new("r1".to_string(), Vec::new())));
        let (tx, mut rx) = mpsc::channel(PEER_QUEUE_CAPACITY);
        room.write().await.peers.insert("u1".to_string(), Peer::new(Role::Web, tx));
        send(&room, "u1", "hi".to_string(), None, Some("local-1".to_string())).await;
        let envelope = rx.try_recv().expect("sender should receive its own chat.message");
        assert_eq!(envelope["payload"]["clientId"], "local-1");
    }
}
