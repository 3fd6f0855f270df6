use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use realtime_hub_shared::{ChatMessage, Role, ServerMessage, Stroke};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

pub const CHAT_HISTORY_CAP: usize = 200;
pub const CHAT_HISTORY_REPLY_LIMIT: usize = 100;

/// Outbound queue depth for a single connection. The protocol is loss-tolerant
/// for broadcast traffic (§ design notes), so a full queue means the
/// recipient is too slow and gets dropped from the room rather than stalling
/// everyone else.
pub const PEER_QUEUE_CAPACITY: usize = 64;

pub struct Peer {
    pub role: Role,
    pub tx: mpsc::Sender<Value>,
    /// Set once, by a successful `pair.claim`, to the web userId this
    /// mobile connection attached itself to. Never read back by the server
    /// today -- kept because the data model names it and a future feature
    /// (e.g. routing a reconnect) would need it.
    pub paired_to_user_id: Option<String>,
}

impl Peer {
    pub fn new(role: Role, tx: mpsc::Sender<Value>) -> Self {
        Self { role, tx, paired_to_user_id: None }
    }
}

#[derive(Default)]
pub struct UserHistory {
    pub undo: Vec<String>,
    pub redo: Vec<Stroke>,
}

/// Authoritative state for one room, behind a single `RwLock` per room (never
/// two rooms' locks held at once). A logical operation -- e.g. a whiteboard
/// stroke-start, which touches `strokes` and `histories` and then fans the
/// result out to every peer -- takes the write guard once for its mutation,
/// its broadcast, and any own-history unicast, using the `_locked` helpers
/// below so the commit and the notification never have another operation's
/// commit interleaved between them. Callers that only need one fan-out (chat,
/// signaling, cursor relay) go through the `Arc`-based wrappers, which take
/// the lock once internally.
pub struct Room {
    pub room_id: String,
    pub strokes: HashMap<String, Stroke>,
    pub histories: HashMap<String, UserHistory>,
    pub chat: VecDeque<ChatMessage>,
    pub peers: HashMap<String, Peer>,
    pub dirty: bool,
    debounce_tx: Option<mpsc::UnboundedSender<()>>,
}

impl Room {
    pub fn new(room_id: String, strokes: Vec<Stroke>) -> Self {
        Self {
            room_id,
            strokes: strokes.into_iter().map(|s| (s.stroke_id.clone(), s)).collect(),
            histories: HashMap::new(),
            chat: VecDeque::new(),
            peers: HashMap::new(),
            dirty: false,
            debounce_tx: None,
        }
    }

    pub fn set_debounce_sender(&mut self, tx: mpsc::UnboundedSender<()>) {
        self.debounce_tx = Some(tx);
    }

    /// Marks the room's whiteboard state as changed and arms/resets the
    /// debounce timer. A send failure means the debounce task already shut
    /// down (room is being torn down) and is safely ignored.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        if let Some(tx) = &self.debounce_tx {
            let _ = tx.send(());
        }
    }

    pub fn history_of(&self, user_id: &str) -> (bool, bool, usize, usize) {
        match self.histories.get(user_id) {
            Some(history) => (
                !history.undo.is_empty(),
                !history.redo.is_empty(),
                history.undo.len(),
                history.redo.len(),
            ),
            None => (false, false, 0, 0),
        }
    }

    pub fn peer_ids_excluding(&self, user_id: &str) -> Vec<String> {
        self.peers.keys().filter(|id| id.as_str() != user_id).cloned().collect()
    }

    pub fn chat_tail(&self, limit: usize) -> Vec<ChatMessage> {
        let skip = self.chat.len().saturating_sub(limit);
        self.chat.iter().skip(skip).cloned().collect()
    }
}

/// Send `message` to every peer in `room` for which `keep` returns true.
/// Operates on an already-locked room -- call this (not `broadcast_filtered`)
/// from inside a critical section that already holds the write guard, since
/// `tokio::sync::RwLock` is not reentrant and re-locking it here would
/// deadlock. Peers whose outbound queue is full or closed are dropped from
/// the room -- a stalled recipient must never block delivery to the rest.
pub fn broadcast_filtered_locked(room: &mut Room, message: &ServerMessage, mut keep: impl FnMut(&str) -> bool) {
    let envelope = message.to_envelope(Some(&room.room_id));
    let mut stale = Vec::new();
    for (user_id, peer) in room.peers.iter() {
        if !keep(user_id) {
            continue;
        }
        if peer.tx.try_send(envelope.clone()).is_err() {
            stale.push(user_id.clone());
        }
    }
    for user_id in stale {
        room.peers.remove(&user_id);
    }
}

pub fn broadcast_all_locked(room: &mut Room, message: &ServerMessage) {
    broadcast_filtered_locked(room, message, |_| true);
}

pub fn broadcast_except_locked(room: &mut Room, message: &ServerMessage, exclude: &str) {
    broadcast_filtered_locked(room, message, |user_id| user_id != exclude);
}

/// Unicast to one specific room member looked up by userId, against an
/// already-locked room -- see `broadcast_filtered_locked` for why this
/// exists alongside `unicast_to`.
pub fn unicast_to_locked(room: &Room, user_id: &str, message: &ServerMessage) {
    let envelope = message.to_envelope(Some(&room.room_id));
    if let Some(peer) = room.peers.get(user_id) {
        let _ = peer.tx.try_send(envelope);
    }
}

/// Send `message` to every peer in the room for which `keep` returns true.
/// Takes the room's write lock once; for a caller that already holds the
/// guard (a multi-step whiteboard operation), use `broadcast_filtered_locked`
/// instead so the lock isn't released and re-acquired mid-operation.
pub async fn broadcast_filtered(room: &Arc<RwLock<Room>>, message: &ServerMessage, keep: impl FnMut(&str) -> bool) {
    let mut guard = room.write().await;
    broadcast_filtered_locked(&mut guard, message, keep);
}

pub async fn broadcast_all(room: &Arc<RwLock<Room>>, message: &ServerMessage) {
    let mut guard = room.write().await;
    broadcast_all_locked(&mut guard, message);
}

pub async fn broadcast_except(room: &Arc<RwLock<Room>>, message: &ServerMessage, exclude: &str) {
    let mut guard = room.write().await;
    broadcast_except_locked(&mut guard, message, exclude);
}

/// Unicast to one specific room member looked up by userId. Used whenever
/// the recipient isn't the connection currently holding the tx directly --
/// e.g. `pair.success` reaching the web client from the mobile client's
/// handler, or signaling relay replies.
pub async fn unicast_to(room: &Arc<RwLock<Room>>, user_id: &str, message: &ServerMessage) {
    let guard = room.read().await;
    unicast_to_locked(&guard, user_id, message);
}

/// Unicast directly over a connection's own channel, bypassing the room
/// lookup. Used for messages addressed to the acting connection itself
/// (`hello`, `room.joined`, `wb.snapshot`, `wb.history`, pairing replies,
/// chat history) including before the connection has joined any room.
pub fn send_direct(tx: &mpsc::Sender<Value>, message: &ServerMessage, room_id: Option<&str>) {
    let envelope = message.to_envelope(room_id);
    let _ = tx.try_send(envelope);
}
