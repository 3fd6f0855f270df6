use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{DefaultBodyLimit, FromRequestParts, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use realtime_hub_shared::Role;
use tower_http::cors::CorsLayer;

use crate::connection::{self, parse_query};
use crate::logsink::{self, LogSinkEntry};
use crate::state::AppState;

/// Body size cap for the `/log` sink (§4.9, §6): larger bodies never reach
/// the handler -- `DefaultBodyLimit` rejects them with 413 while the
/// request is still being buffered.
const LOG_BODY_LIMIT: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/log",
            post(log_handler)
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(LOG_BODY_LIMIT)),
        )
        .route("/healthz", get(|| async { "ok" }))
        .fallback(catch_all)
        .with_state(state)
}

/// The one listener handles three request kinds (§4.9): a WebSocket
/// upgrade at any path, the `/log` sink (routed explicitly above), and
/// everything else, which gets a plain 200 `ok`.
async fn catch_all(State(state): State<AppState>, req: Request) -> Response {
    let (mut parts, _body) = req.into_parts();

    if is_websocket_upgrade_request(&parts.headers) {
        let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
            Ok(ws) => ws,
            Err(rejection) => return rejection.into_response(),
        };
        let query = parse_query(parts.uri.query());
        let role = Role::from_query(query.get("role").map(|s| s.as_str()));
        return ws.on_upgrade(move |socket| connection::handle_socket(socket, state, role));
    }

    "ok".into_response()
}

/// A proper WS upgrade carries `Connection: Upgrade` and `Upgrade:
/// websocket`; some clients omit the former, so `Sec-WebSocket-Key`'s
/// presence alone is also accepted.
fn is_websocket_upgrade_request(headers: &HeaderMap) -> bool {
    let has_upgrade_header = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("websocket")))
        .unwrap_or(false);
    has_upgrade_header || headers.contains_key(header::SEC_WEBSOCKET_KEY)
}

/// `POST /log`: the one boundary that answers a caller with an HTTP error
/// rather than staying silent (§7) -- this is a plain debug-tool endpoint,
/// not a protocol client subject to the no-oracle rule.
async fn log_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let entry: LogSinkEntry = match serde_json::from_slice(&body) {
        Ok(entry) => entry,
        Err(_) => return (StatusCode::BAD_REQUEST, "malformed log body").into_response(),
    };
    if state.config.debug_logs {
        logsink::append(&state.config.log_dir, &entry).await;
    }
    (StatusCode::OK, "ok").into_response()
}
