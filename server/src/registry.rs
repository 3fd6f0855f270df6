use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::persistence::{spawn_debounced_saver, Storage};
use crate::room::Room;

/// Holds every currently-active room. Rooms are created on first reference
/// (loading any persisted strokes) and torn down once their last peer
/// disconnects, per the "rooms are ephemeral, the whiteboard is durable"
/// split in the design notes.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<RwLock<Room>>>>,
    storage: Arc<dyn Storage>,
}

impl RoomRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Arc<Self> {
        Arc::new(Self { rooms: RwLock::new(HashMap::new()), storage })
    }

    pub async fn get_or_create(&self, room_id: &str) -> Arc<RwLock<Room>> {
        if let Some(room) = self.rooms.read().await.get(room_id) {
            return room.clone();
        }
        let mut guard = self.rooms.write().await;
        if let Some(room) = guard.get(room_id) {
            return room.clone();
        }

        let strokes = self.storage.load_room(room_id).await;
        let room = Arc::new(RwLock::new(Room::new(room_id.to_string(), strokes)));

        let debounce_tx = spawn_debounced_saver(self.storage.clone(), room_id.to_string(), {
            let room = room.clone();
            move || {
                let room = room.clone();
                async move { room.read().await.strokes.values().cloned().collect() }
            }
        });
        room.write().await.set_debounce_sender(debounce_tx);

        guard.insert(room_id.to_string(), room.clone());
        room
    }

    /// Removes `room_id` from the registry if it is still empty and still
    /// the same room instance the caller observed -- re-checked under the
    /// registry's write lock so a connection that joined between the
    /// caller's emptiness check and this call is never evicted out from
    /// under it.
    pub async fn drop_if_empty(&self, room_id: &str, room: &Arc<RwLock<Room>>) {
        if !room.read().await.peers.is_empty() {
            return;
        }
        let mut guard = self.rooms.write().await;
        let still_same = guard.get(room_id).map(|current| Arc::ptr_eq(current, room)).unwrap_or(false);
        if !still_same {
            return;
        }
        if !room.read().await.peers.is_empty() {
            return;
        }
        guard.remove(room_id);
    }
}
