use std::sync::Arc;

use realtime_hub_shared::{RtcKind, ServerMessage};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::room::{broadcast_except, unicast_to, Room};

/// Forwards an offer/answer/ICE blob verbatim to its addressed peer,
/// stamping the relay's `userId` to the actual sender so the recipient can
/// never be spoofed about who it's signaling with. The body itself is never
/// inspected -- SDP/ICE payloads are opaque to this hub.
pub async fn relay(room: &Arc<RwLock<Room>>, actor: &str, kind: RtcKind, to_user_id: String, body: Value) {
    let target_present = { room.read().await.peers.contains_key(&to_user_id) };
    if !target_present {
        return;
    }
    unicast_to(
        room,
        &to_user_id,
        &ServerMessage::RtcRelay { kind, from_user_id: actor.to_string(), to_user_id, body },
    )
    .await;
}

/// Announces a newly joined peer to the rest of the room and hands the
/// joiner the current peer roster, so either side can initiate an offer.
pub async fn announce_join(room: &Arc<RwLock<Room>>, actor: &str) {
    let peers = { room.read().await.peer_ids_excluding(actor) };
    broadcast_except(room, &ServerMessage::RtcPeerJoined { user_id: actor.to_string() }, actor).await;
    unicast_to(room, actor, &ServerMessage::RtcPeers { peers }).await;
}

pub async fn announce_leave(room: &Arc<RwLock<Room>>, user_id: &str) {
    broadcast_except(room, &ServerMessage::RtcPeerLeft { user_id: user_id.to_string() }, user_id).await;
}
