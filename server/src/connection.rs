use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use realtime_hub_shared::{ClientMessage, InboundEnvelope, RtcKind, Role, ServerMessage};
use tokio::sync::{mpsc, RwLock};

use crate::pairing::ClaimOutcome;
use crate::room::{send_direct, unicast_to, Peer, Room, PEER_QUEUE_CAPACITY};
use crate::state::AppState;
use crate::util::opaque_token;
use crate::{chat, signaling, whiteboard};

const USER_ID_LEN: usize = 10;

/// One WebSocket connection's lifetime: mint an identity, forward outbound
/// frames from its queue to the socket, and dispatch inbound frames against
/// whichever room it has joined (if any). A connection may join at most one
/// room at a time, per the wire format's single `room.join` per session.
pub async fn handle_socket(socket: WebSocket, state: AppState, role: Role) {
    let user_id = opaque_token(USER_ID_LEN);
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<serde_json::Value>(PEER_QUEUE_CAPACITY);

    let forward_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(_) => continue,
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    send_direct(&tx, &ServerMessage::Hello { user_id: user_id.clone(), role }, None);

    let mut joined: Option<(String, Arc<RwLock<Room>>)> = None;

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Some(client_message) = decode_inbound(&text) else {
            continue;
        };

        match client_message {
            ClientMessage::RoomJoin { room_id } => {
                if let Some((_, previous)) = joined.take() {
                    leave_room(&previous, &user_id).await;
                    state.registry.drop_if_empty(&previous.read().await.room_id.clone(), &previous).await;
                }
                let room = state.registry.get_or_create(&room_id).await;
                room.write().await.peers.insert(user_id.clone(), Peer::new(role, tx.clone()));
                send_direct(&tx, &ServerMessage::RoomJoined, Some(&room_id));
                signaling::announce_join(&room, &user_id).await;
                let strokes = whiteboard::snapshot(&room).await;
                send_direct(&tx, &ServerMessage::WbSnapshot { strokes }, Some(&room_id));
                let (can_undo, can_redo, undo_count, redo_count) = { room.read().await.history_of(&user_id) };
                send_direct(&tx, &ServerMessage::WbHistory { can_undo, can_redo, undo_count, redo_count }, Some(&room_id));
                chat::history(&room, &user_id).await;
                joined = Some((room_id, room));
            }
            _ if joined.is_none() => {
                // Every other message type requires a joined room; a
                // connection that hasn't joined yet gets silently ignored
                // rather than erroring, matching the rest of the protocol's
                // no-oracle-over-the-wire stance.
                continue;
            }
            ClientMessage::WbSnapshotRequest => {
                let (_, room) = joined.as_ref().unwrap();
                let strokes = whiteboard::snapshot(room).await;
                let room_id = room.read().await.room_id.clone();
                send_direct(&tx, &ServerMessage::WbSnapshot { strokes }, Some(&room_id));
            }
            ClientMessage::WbStrokeStart { stroke_id, style, points } => {
                let (_, room) = joined.as_ref().unwrap();
                whiteboard::stroke_start(room, &user_id, stroke_id, style, points).await;
            }
            ClientMessage::WbStrokeMove { stroke_id, style, points } => {
                let (_, room) = joined.as_ref().unwrap();
                whiteboard::stroke_move(room, &user_id, stroke_id, style, points).await;
            }
            ClientMessage::WbStrokeEnd { stroke_id } => {
                let (_, room) = joined.as_ref().unwrap();
                whiteboard::stroke_end(room, &user_id, stroke_id).await;
            }
            ClientMessage::WbClear => {
                let (_, room) = joined.as_ref().unwrap();
                whiteboard::clear(room, &user_id).await;
            }
            ClientMessage::WbUndo => {
                let (_, room) = joined.as_ref().unwrap();
                whiteboard::undo(room, &user_id).await;
            }
            ClientMessage::WbRedo => {
                let (_, room) = joined.as_ref().unwrap();
                whiteboard::redo(room, &user_id).await;
            }
            ClientMessage::PairCreate => {
                // Web-role only (§4.5); a mobile client sending this is an
                // out-of-context operation and is silently dropped (§7.2).
                if role != Role::Web {
                    continue;
                }
                let (room_id, _) = joined.as_ref().unwrap();
                let (pair_token, expires_at) = state.pairing.create(room_id, &user_id).await;
                send_direct(&tx, &ServerMessage::PairCreated { pair_token, expires_at }, Some(room_id));
            }
            ClientMessage::PairClaim { pair_token } => {
                // Mobile-role only (§4.5); a web client sending this is
                // silently dropped (§7.2).
                if role != Role::Mobile {
                    continue;
                }
                let (room_id, room) = joined.as_ref().unwrap();
                match state.pairing.claim(&pair_token, room_id).await {
                    ClaimOutcome::Invalid => {
                        send_direct(&tx, &ServerMessage::PairError { message: "Invalid or expired token" }, Some(room_id));
                    }
                    ClaimOutcome::WrongRoom => {
                        send_direct(&tx, &ServerMessage::PairError { message: "Token is for a different room" }, Some(room_id));
                    }
                    ClaimOutcome::Success { web_user_id } => {
                        if let Some(peer) = room.write().await.peers.get_mut(&user_id) {
                            peer.paired_to_user_id = Some(web_user_id.clone());
                        }
                        let success = ServerMessage::PairSuccess { mobile_user_id: user_id.clone(), web_user_id: web_user_id.clone() };
                        send_direct(&tx, &success, Some(room_id));
                        unicast_to(room, &web_user_id, &success).await;
                    }
                }
            }
            ClientMessage::RtcSignal { kind, to_user_id, body } => {
                let (_, room) = joined.as_ref().unwrap();
                relay_signal(room, &user_id, kind, to_user_id, body).await;
            }
            ClientMessage::CursorMove { x, y, is_drawing } => {
                let (_, room) = joined.as_ref().unwrap();
                crate::room::broadcast_except(
                    room,
                    &ServerMessage::CursorMove { user_id: user_id.clone(), x, y, is_drawing },
                    &user_id,
                )
                .await;
            }
            ClientMessage::ChatSend { text, name, client_id } => {
                let (_, room) = joined.as_ref().unwrap();
                chat::send(room, &user_id, text, name, client_id).await;
            }
            ClientMessage::ChatHistoryRequest => {
                let (_, room) = joined.as_ref().unwrap();
                chat::history(room, &user_id).await;
            }
        }
    }

    forward_task.abort();
    if let Some((room_id, room)) = joined {
        leave_room(&room, &user_id).await;
        state.registry.drop_if_empty(&room_id, &room).await;
    }
}

async fn leave_room(room: &Arc<RwLock<Room>>, user_id: &str) {
    room.write().await.peers.remove(user_id);
    signaling::announce_leave(room, user_id).await;
}

async fn relay_signal(room: &Arc<RwLock<Room>>, actor: &str, kind: RtcKind, to_user_id: String, body: serde_json::Value) {
    signaling::relay(room, actor, kind, to_user_id, body).await;
}

/// Parses a raw inbound frame into a typed `ClientMessage`, or `None` if it
/// should be dropped silently: unparseable JSON, a `v` other than
/// `PROTOCOL_VERSION` (§4.1), or a `type`/payload the decode table doesn't
/// recognize. No reply is ever sent for a drop -- misbehaving clients get
/// no oracle (§7 item 1).
fn decode_inbound(text: &str) -> Option<ClientMessage> {
    let envelope: InboundEnvelope = serde_json::from_str(text).ok()?;
    if envelope.v != realtime_hub_shared::PROTOCOL_VERSION {
        return None;
    }
    realtime_hub_shared::decode_client_message(&envelope.kind, envelope.payload)
}

pub fn parse_query(raw: Option<&str>) -> HashMap<String, String> {
    let Some(raw) = raw else { return HashMap::new() };
    raw.split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
