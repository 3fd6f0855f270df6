use std::sync::Arc;

use realtime_hub_shared::{Point, ServerMessage, Stroke, StrokeStyle};
use tokio::sync::RwLock;

use crate::room::{broadcast_all_locked, unicast_to_locked, Room, UserHistory};

/// Starting a stroke whose id is already known is treated as a move (a
/// client that missed the ack for its own `wb.stroke.start` may resend it
/// mid-gesture) -- ownership is never checked on write, per the permissive
/// cross-user editing model.
///
/// The whole operation -- the is-it-new check, the mutation, the broadcast,
/// and the actor's own `wb.history` -- runs under one write guard. Taking a
/// read lock for the check and a separate write lock for the mutation would
/// let a second `stroke_start` for the same strokeId race in between and
/// also observe "new", inserting twice and corrupting that actor's undo
/// stack (§5 single-writer contract).
pub async fn stroke_start(
    room: &Arc<RwLock<Room>>,
    actor: &str,
    stroke_id: String,
    style: StrokeStyle,
    points: Vec<Point>,
) {
    let mut guard = room.write().await;
    match guard.strokes.get_mut(&stroke_id) {
        Some(stroke) => {
            stroke.style = style.clone();
            stroke.points.extend(points.clone());
        }
        None => {
            let stroke = Stroke { stroke_id: stroke_id.clone(), user_id: actor.to_string(), style: style.clone(), points: points.clone() };
            guard.strokes.insert(stroke_id.clone(), stroke);
            let history = guard.histories.entry(actor.to_string()).or_insert_with(UserHistory::default);
            history.undo.push(stroke_id.clone());
            history.redo.clear();
        }
    }
    guard.mark_dirty();
    broadcast_all_locked(&mut guard, &ServerMessage::WbStrokeStart { user_id: actor.to_string(), stroke_id, style, points });
    send_history_locked(&guard, actor);
}

/// §4.3: "No history change." A move against a strokeId the server never
/// saw a start for leaves no stroke behind to move -- it must not push an
/// undo entry with no backing stroke, which would inflate `undoCount` in the
/// next `wb.history` for a stroke that was never stored.
pub async fn stroke_move(
    room: &Arc<RwLock<Room>>,
    actor: &str,
    stroke_id: String,
    style: StrokeStyle,
    points: Vec<Point>,
) {
    let mut guard = room.write().await;
    // Appends onto the existing stroke's point list -- strokes are
    // append-only (§3) -- and replaces its style (last-writer-wins within a
    // stroke, §4.3). A miss is a no-op: nothing in the room changed.
    if let Some(stroke) = guard.strokes.get_mut(&stroke_id) {
        stroke.style = style.clone();
        stroke.points.extend(points.clone());
        guard.mark_dirty();
    }
    broadcast_all_locked(&mut guard, &ServerMessage::WbStrokeMove { user_id: actor.to_string(), stroke_id, style, points });
}

pub async fn stroke_end(room: &Arc<RwLock<Room>>, actor: &str, stroke_id: String) {
    let mut guard = room.write().await;
    guard.mark_dirty();
    broadcast_all_locked(&mut guard, &ServerMessage::WbStrokeEnd { user_id: actor.to_string(), stroke_id });
}

pub async fn clear(room: &Arc<RwLock<Room>>, actor: &str) {
    let mut guard = room.write().await;
    guard.strokes.clear();
    guard.histories.clear();
    guard.mark_dirty();
    broadcast_all_locked(&mut guard, &ServerMessage::WbClear { user_id: actor.to_string() });
    send_history_locked(&guard, actor);
}

/// Walks `actor`'s undo stack, discarding strokeIds that no longer resolve
/// (already removed by a clear or a prior undo) until it finds one still
/// present, or the stack runs dry -- a no-op in the latter case.
pub async fn undo(room: &Arc<RwLock<Room>>, actor: &str) {
    let mut guard = room.write().await;
    let mut removed = None;
    loop {
        let Some(history) = guard.histories.get_mut(actor) else { break };
        let Some(stroke_id) = history.undo.pop() else { break };
        if let Some(stroke) = guard.strokes.remove(&stroke_id) {
            guard.histories.get_mut(actor).unwrap().redo.push(stroke.clone());
            removed = Some(stroke);
            break;
        }
    }
    if let Some(stroke) = removed {
        guard.mark_dirty();
        broadcast_all_locked(&mut guard, &ServerMessage::WbStrokeRemove { stroke_id: stroke.stroke_id });
    }
    send_history_locked(&guard, actor);
}

pub async fn redo(room: &Arc<RwLock<Room>>, actor: &str) {
    let mut guard = room.write().await;
    let stroke = guard.histories.get_mut(actor).and_then(|history| history.redo.pop());
    if let Some(stroke) = stroke {
        guard.strokes.insert(stroke.stroke_id.clone(), stroke.clone());
        guard.histories.get_mut(actor).unwrap().undo.push(stroke.stroke_id.clone());
        guard.mark_dirty();
        broadcast_all_locked(&mut guard, &ServerMessage::WbStrokeRestore { stroke });
    }
    send_history_locked(&guard, actor);
}

pub async fn snapshot(room: &Arc<RwLock<Room>>) -> Vec<Stroke> {
    room.read().await.strokes.values().cloned().collect()
}

fn send_history_locked(room: &Room, actor: &str) {
    let (can_undo, can_redo, undo_count, redo_count) = room.history_of(actor);
    unicast_to_locked(room, actor, &ServerMessage::WbHistory { can_undo, can_redo, undo_count, redo_count });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::{Peer, PEER_QUEUE_CAPACITY};
    use realtime_hub_shared::{Role, Tool};
    use tokio::sync::mpsc;

    fn style() -> StrokeStyle {
        StrokeStyle { tool: Tool::Pen, color: "#000".to_string(), width: 0.003, opacity: 1.0 }
    }

    fn points() -> Vec<Point> {
        vec![Point { x: 0.1, y: 0.2, t: 1.0 }]
    }

    async fn room_with_peer(user_id: &str) -> (Arc<RwLock<Room>>, mpsc::Receiver<serde_json::Value>) {
        let room = Arc::new(RwLock::new(Room::new("r1".to_string(), Vec::new())));
        let (tx, rx) = mpsc::channel(PEER_QUEUE_CAPACITY);
        room.write().await.peers.insert(user_id.to_string(), Peer::new(Role::Web, tx));
        (room, rx)
    }

    #[tokio::test]
    async fn stroke_start_then_undo_removes_it() {
        let (room, _rx) = room_with_peer("u1").await;
        stroke_start(&room, "u1", "s1".to_string(), style(), points()).await;
        assert_eq!(room.read().await.strokes.len(), 1);
        undo(&room, "u1").await;
        assert!(room.read().await.strokes.is_empty());
        let (_, _, _, redo_count) = room.read().await.history_of("u1");
        assert_eq!(redo_count, 1);
    }

    #[tokio::test]
    async fn redo_restores_the_undone_stroke() {
        let (room, _rx) = room_with_peer("u1").await;
        stroke_start(&room, "u1", "s1".to_string(), style(), points()).await;
        undo(&room, "u1").await;
        redo(&room, "u1").await;
        assert_eq!(room.read().await.strokes.len(), 1);
        let (can_undo, can_redo, _, _) = room.read().await.history_of("u1");
        assert!(can_undo);
        assert!(!can_redo);
    }

    #[tokio::test]
    async fn undo_with_empty_stack_is_a_no_op() {
        let (room, _rx) = room_with_peer("u1").await;
        undo(&room, "u1").await;
        assert!(room.read().await.strokes.is_empty());
    }

    #[tokio::test]
    async fn undo_skips_strokes_already_removed_by_clear() {
        let (room, _rx) = room_with_peer("u1").await;
        stroke_start(&room, "u1", "s1".to_string(), style(), points()).await;
        clear(&room, "u1").await;
        // The undo stack was wiped by clear, so this is a no-op, not a panic
        // or a resurrection of the cleared stroke.
        undo(&room, "u1").await;
        assert!(room.read().await.strokes.is_empty());
    }

    #[tokio::test]
    async fn sender_receives_its_own_stroke_start_broadcast() {
        let (room, mut rx) = room_with_peer("u1").await;
        stroke_start(&room, "u1", "s1".to_string(), style(), points()).await;
        let envelope = rx.try_recv().expect("sender should receive its own wb.stroke.start");
        assert_eq!(envelope["type"], "wb.stroke.start");
        assert_eq!(envelope["payload"]["strokeId"], "s1");
    }

    #[tokio::test]
    async fn cross_user_move_does_not_change_stroke_author() {
        let (room, _rx1) = room_with_peer("u1").await;
        room.write().await.peers.insert("u2".to_string(), Peer::new(Role::Web, mpsc::channel(PEER_QUEUE_CAPACITY).0));
        stroke_start(&room, "u1", "s1".to_string(), style(), points()).await;
        stroke_move(&room, "u2", "s1".to_string(), style(), vec![Point { x: 0.5, y: 0.5, t: 2.0 }]).await;
        let guard = room.read().await;
        assert_eq!(guard.strokes["s1"].user_id, "u1");
        // Points are appended, not replaced -- the original start point
        // survives alongside the move's new point.
        assert_eq!(guard.strokes["s1"].points.len(), 2);
        assert_eq!(guard.strokes["s1"].points[0].x, 0.1);
        assert_eq!(guard.strokes["s1"].points[1].x, 0.5);
    }

    #[tokio::test]
    async fn stroke_move_appends_rather_than_replaces_points() {
        let (room, _rx) = room_with_peer("u1").await;
        stroke_start(&room, "u1", "s1".to_string(), style(), points()).await;
        stroke_move(&room, "u1", "s1".to_string(), style(), vec![Point { x: 0.3, y: 0.3, t: 2.0 }]).await;
        stroke_move(&room, "u1", "s1".to_string(), style(), vec![Point { x: 0.4, y: 0.4, t: 3.0 }]).await;
        let guard = room.read().await;
        assert_eq!(guard.strokes["s1"].points.len(), 3);
    }

    #[tokio::test]
    async fn move_against_an_unknown_stroke_id_does_not_create_a_phantom_undo_entry() {
        let (room, _rx) = room_with_peer("u1").await;
        stroke_move(&room, "u1", "never-started".to_string(), style(), points()).await;
        assert!(!room.read().await.strokes.contains_key("never-started"));
        let (can_undo, _, undo_count, _) = room.read().await.history_of("u1");
        assert!(!can_undo);
        assert_eq!(undo_count, 0);
    }

    #[tokio::test]
    async fn concurrent_starts_of_a_never_seen_stroke_only_insert_once() {
        let (room, _rx) = room_with_peer("u1").await;
        // Two `stroke_start`s racing on the same brand-new strokeId must not
        // both observe "new" and both push an undo entry -- each takes the
        // write guard for its whole operation, so they serialize instead of
        // interleaving at the is-it-new check.
        tokio::join!(
            stroke_start(&room, "u1", "s1".to_string(), style(), points()),
            stroke_start(&room, "u1", "s1".to_string(), style(), points()),
        );
        assert_eq!(room.read().await.strokes.len(), 1);
        let (_, _, undo_count, _) = room.read().await.history_of("u1");
        assert_eq!(undo_count, 1);
    }

    #[tokio::test]
    async fn clear_wipes_strokes_and_histories() {
        let (room, _rx) = room_with_peer("u1").await;
        stroke_start(&room, "u1", "s1".to_string(), style(), points()).await;
        clear(&room, "u1").await;
        let guard = room.read().await;
        assert!(guard.strokes.is_empty());
        assert!(guard.histories.get("u1").map(|h| h.undo.is_empty()).unwrap_or(true));
    }
}
