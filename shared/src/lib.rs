use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const PROTOCOL_VERSION: i64 = 1;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Web,
    Mobile,
}

impl Role {
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("mobile") => Role::Mobile,
            _ => Role::Web,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub t: f64,
}

impl Point {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.t.is_finite()
    }

    pub fn clamp(self) -> Self {
        Self {
            x: self.x.max(0.0).min(1.0),
            y: self.y.max(0.0).min(1.0),
            t: self.t,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Pen,
    Highlighter,
    Eraser,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StrokeStyle {
    pub tool: Tool,
    pub color: String,
    pub width: f32,
    pub opacity: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    pub stroke_id: String,
    pub user_id: String,
    pub style: StrokeStyle,
    pub points: Vec<Point>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub text: String,
    pub ts: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RtcKind {
    Offer,
    Answer,
    Ice,
}

impl RtcKind {
    pub fn as_type(self) -> &'static str {
        match self {
            RtcKind::Offer => "rtc.offer",
            RtcKind::Answer => "rtc.answer",
            RtcKind::Ice => "rtc.ice",
        }
    }

    fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "rtc.offer" => Some(RtcKind::Offer),
            "rtc.answer" => Some(RtcKind::Answer),
            "rtc.ice" => Some(RtcKind::Ice),
            _ => None,
        }
    }
}

/// The uniform wire wrapper every inbound frame arrives in. `payload` is left
/// undecoded here; `decode_client_message` interprets it once `kind` is
/// known, per a typed decoding table instead of a chain of string
/// comparisons.
#[derive(Deserialize, Debug, Clone)]
pub struct InboundEnvelope {
    pub v: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, rename = "requestId")]
    pub request_id: Option<String>,
    #[serde(default, rename = "roomId")]
    pub room_id: Option<String>,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub enum ClientMessage {
    RoomJoin { room_id: String },
    WbSnapshotRequest,
    WbStrokeStart { stroke_id: String, style: StrokeStyle, points: Vec<Point> },
    WbStrokeMove { stroke_id: String, style: StrokeStyle, points: Vec<Point> },
    WbStrokeEnd { stroke_id: String },
    WbClear,
    WbUndo,
    WbRedo,
    PairCreate,
    PairClaim { pair_token: String },
    RtcSignal { kind: RtcKind, to_user_id: String, body: Value },
    CursorMove { x: f32, y: f32, is_drawing: Option<bool> },
    ChatSend { text: String, name: Option<String>, client_id: Option<String> },
    ChatHistoryRequest,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomJoinPayload {
    room_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StrokeStartPayload {
    stroke_id: String,
    style: StrokeStyle,
    #[serde(default)]
    points: Vec<Point>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StrokeEndPayload {
    stroke_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairClaimPayload {
    pair_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RtcSignalPayload {
    to_user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorMovePayload {
    x: f32,
    y: f32,
    #[serde(default)]
    is_drawing: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatSendPayload {
    text: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
}

/// Decode a raw `payload` value once its envelope `type` string is known.
/// Unknown types, and malformed payloads for known types, both decode to
/// `None` -- the envelope-level caller treats both as "drop silently".
pub fn decode_client_message(kind: &str, payload: Value) -> Option<ClientMessage> {
    if let Some(rtc_kind) = RtcKind::from_type(kind) {
        let parsed: RtcSignalPayload = serde_json::from_value(payload.clone()).ok()?;
        return Some(ClientMessage::RtcSignal {
            kind: rtc_kind,
            to_user_id: parsed.to_user_id,
            body: payload,
        });
    }

    match kind {
        "room.join" => {
            let parsed: RoomJoinPayload = serde_json::from_value(payload).ok()?;
            Some(ClientMessage::RoomJoin { room_id: parsed.room_id })
        }
        "wb.snapshot.request" => Some(ClientMessage::WbSnapshotRequest),
        "wb.stroke.start" => {
            let parsed: StrokeStartPayload = serde_json::from_value(payload).ok()?;
            Some(ClientMessage::WbStrokeStart {
                stroke_id: parsed.stroke_id,
                style: parsed.style,
                points: parsed.points,
            })
        }
        "wb.stroke.move" => {
            let parsed: StrokeStartPayload = serde_json::from_value(payload).ok()?;
            Some(ClientMessage::WbStrokeMove {
                stroke_id: parsed.stroke_id,
                style: parsed.style,
                points: parsed.points,
            })
        }
        "wb.stroke.end" => {
            let parsed: StrokeEndPayload = serde_json::from_value(payload).ok()?;
            Some(ClientMessage::WbStrokeEnd { stroke_id: parsed.stroke_id })
        }
        "wb.clear" => Some(ClientMessage::WbClear),
        "wb.undo" => Some(ClientMessage::WbUndo),
        "wb.redo" => Some(ClientMessage::WbRedo),
        "pair.create" => Some(ClientMessage::PairCreate),
        "pair.claim" => {
            let parsed: PairClaimPayload = serde_json::from_value(payload).ok()?;
            Some(ClientMessage::PairClaim { pair_token: parsed.pair_token })
        }
        "cursor.move" => {
            let parsed: CursorMovePayload = serde_json::from_value(payload).ok()?;
            Some(ClientMessage::CursorMove {
                x: parsed.x,
                y: parsed.y,
                is_drawing: parsed.is_drawing,
            })
        }
        "chat.message" => {
            let parsed: ChatSendPayload = serde_json::from_value(payload).ok()?;
            Some(ClientMessage::ChatSend {
                text: parsed.text,
                name: parsed.name,
                client_id: parsed.client_id,
            })
        }
        "chat.history.request" => Some(ClientMessage::ChatHistoryRequest),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub enum ServerMessage {
    Hello { user_id: String, role: Role },
    RoomJoined,
    WbSnapshot { strokes: Vec<Stroke> },
    WbStrokeStart { user_id: String, stroke_id: String, style: StrokeStyle, points: Vec<Point> },
    WbStrokeMove { user_id: String, stroke_id: String, style: StrokeStyle, points: Vec<Point> },
    WbStrokeEnd { user_id: String, stroke_id: String },
    WbClear { user_id: String },
    WbStrokeRemove { stroke_id: String },
    WbStrokeRestore { stroke: Stroke },
    WbHistory { can_undo: bool, can_redo: bool, undo_count: usize, redo_count: usize },
    PairCreated { pair_token: String, expires_at: i64 },
    PairSuccess { mobile_user_id: String, web_user_id: String },
    PairError { message: &'static str },
    RtcPeers { peers: Vec<String> },
    RtcPeerJoined { user_id: String },
    RtcPeerLeft { user_id: String },
    RtcRelay { kind: RtcKind, from_user_id: String, to_user_id: String, body: Value },
    CursorMove { user_id: String, x: f32, y: f32, is_drawing: Option<bool> },
    Chat(ChatMessage),
    ChatHistory { messages: Vec<ChatMessage> },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        use ServerMessage::*;
        match self {
            Hello { .. } => "hello",
            RoomJoined => "room.joined",
            WbSnapshot { .. } => "wb.snapshot",
            WbStrokeStart { .. } => "wb.stroke.start",
            WbStrokeMove { .. } => "wb.stroke.move",
            WbStrokeEnd { .. } => "wb.stroke.end",
            WbClear { .. } => "wb.clear",
            WbStrokeRemove { .. } => "wb.stroke.remove",
            WbStrokeRestore { .. } => "wb.stroke.restore",
            WbHistory { .. } => "wb.history",
            PairCreated { .. } => "pair.created",
            PairSuccess { .. } => "pair.success",
            PairError { .. } => "pair.error",
            RtcPeers { .. } => "rtc.peers",
            RtcPeerJoined { .. } => "rtc.peer.joined",
            RtcPeerLeft { .. } => "rtc.peer.left",
            RtcRelay { kind, .. } => kind.as_type(),
            CursorMove { .. } => "cursor.move",
            Chat(_) => "chat.message",
            ChatHistory { .. } => "chat.history",
        }
    }

    /// `userId` the envelope should carry -- the actor of this message, not
    /// the recipient. Absent for messages that aren't about a specific actor.
    pub fn actor_user_id(&self) -> Option<&str> {
        use ServerMessage::*;
        match self {
            Hello { user_id, .. } => Some(user_id),
            WbStrokeStart { user_id, .. } => Some(user_id),
            WbStrokeMove { user_id, .. } => Some(user_id),
            WbStrokeEnd { user_id, .. } => Some(user_id),
            WbClear { user_id } => Some(user_id),
            RtcRelay { from_user_id, .. } => Some(from_user_id),
            RtcPeerJoined { user_id } | RtcPeerLeft { user_id } => Some(user_id),
            CursorMove { user_id, .. } => Some(user_id),
            Chat(msg) => Some(&msg.user_id),
            _ => None,
        }
    }

    fn payload(&self) -> Value {
        use ServerMessage::*;
        match self {
            Hello { user_id, role } => json!({ "userId": user_id, "role": role }),
            RoomJoined => json!({ "ok": true }),
            WbSnapshot { strokes } => json!({ "strokes": strokes }),
            WbStrokeStart { stroke_id, style, points, .. } => {
                json!({ "strokeId": stroke_id, "style": style, "points": points })
            }
            WbStrokeMove { stroke_id, style, points, .. } => {
                json!({ "strokeId": stroke_id, "style": style, "points": points })
            }
            WbStrokeEnd { stroke_id, .. } => {
                json!({ "strokeId": stroke_id, "points": Vec::<Point>::new() })
            }
            WbClear { .. } => json!({}),
            WbStrokeRemove { stroke_id } => json!({ "strokeId": stroke_id }),
            WbStrokeRestore { stroke } => json!({ "stroke": stroke }),
            WbHistory { can_undo, can_redo, undo_count, redo_count } => json!({
                "canUndo": can_undo,
                "canRedo": can_redo,
                "undoCount": undo_count,
                "redoCount": redo_count,
            }),
            PairCreated { pair_token, expires_at } => {
                json!({ "pairToken": pair_token, "expiresAt": expires_at })
            }
            PairSuccess { mobile_user_id, web_user_id } => {
                json!({ "mobileUserId": mobile_user_id, "webUserId": web_user_id })
            }
            PairError { message } => json!({ "message": message }),
            RtcPeers { peers } => json!({ "peers": peers }),
            RtcPeerJoined { user_id } => json!({ "userId": user_id }),
            RtcPeerLeft { user_id } => json!({ "userId": user_id }),
            RtcRelay { to_user_id, body, .. } => {
                let mut map = match body.clone() {
                    Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                map.insert("toUserId".to_string(), json!(to_user_id));
                Value::Object(map)
            }
            CursorMove { x, y, is_drawing, .. } => {
                json!({ "x": x, "y": y, "isDrawing": is_drawing })
            }
            Chat(message) => serde_json::to_value(message).unwrap_or(Value::Null),
            ChatHistory { messages } => json!({ "messages": messages }),
        }
    }

    /// Render the full outbound envelope, stamping `v`, `type`, and the
    /// addressing fields the caller supplies -- the room the event happened
    /// in, and the actor's own userId, never the recipient's.
    pub fn to_envelope(&self, room_id: Option<&str>) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("v".to_string(), json!(PROTOCOL_VERSION));
        obj.insert("type".to_string(), json!(self.kind()));
        if let Some(room_id) = room_id {
            obj.insert("roomId".to_string(), json!(room_id));
        }
        if let Some(user_id) = self.actor_user_id() {
            obj.insert("userId".to_string(), json!(user_id));
        }
        obj.insert("payload".to_string(), self.payload());
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_stroke_start() {
        let payload = json!({
            "strokeId": "s1",
            "style": { "tool": "pen", "color": "#000", "width": 0.004, "opacity": 1.0 },
            "points": [{ "x": 0.1, "y": 0.1, "t": 1.0 }],
        });
        let message = decode_client_message("wb.stroke.start", payload).unwrap();
        match message {
            ClientMessage::WbStrokeStart { stroke_id, points, .. } => {
                assert_eq!(stroke_id, "s1");
                assert_eq!(points.len(), 1);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_type_decodes_to_none() {
        assert!(decode_client_message("not.a.type", json!({})).is_none());
    }

    #[test]
    fn malformed_known_type_decodes_to_none() {
        assert!(decode_client_message("room.join", json!({ "nope": 1 })).is_none());
    }

    #[test]
    fn envelope_carries_room_and_actor() {
        let message = ServerMessage::RtcPeerJoined { user_id: "u2".to_string() };
        let envelope = message.to_envelope(Some("r1"));
        assert_eq!(envelope["type"], "rtc.peer.joined");
        assert_eq!(envelope["roomId"], "r1");
        assert_eq!(envelope["userId"], "u2");
        assert_eq!(envelope["payload"]["userId"], "u2");
    }

    #[test]
    fn rtc_relay_merges_body_and_to_user_id() {
        let message = ServerMessage::RtcRelay {
            kind: RtcKind::Offer,
            from_user_id: "a".to_string(),
            to_user_id: "b".to_string(),
            body: json!({ "toUserId": "b", "sdp": "OPAQUE" }),
        };
        let envelope = message.to_envelope(Some("r1"));
        assert_eq!(envelope["type"], "rtc.offer");
        assert_eq!(envelope["userId"], "a");
        assert_eq!(envelope["payload"]["toUserId"], "b");
        assert_eq!(envelope["payload"]["sdp"], "OPAQUE");
    }
}
