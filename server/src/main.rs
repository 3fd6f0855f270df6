mod chat;
mod config;
mod connection;
mod http;
mod logsink;
mod pairing;
mod persistence;
mod registry;
mod room;
mod signaling;
mod state;
mod util;
mod whiteboard;

use std::net::SocketAddr;
use std::sync::Arc;

use config::Config;
use pairing::PairingRegistry;
use persistence::{data_dir_display, FileStorage, Storage};
use registry::RoomRegistry;
use state::AppState;

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    println!(
        "[realtime-hub] starting on port {} (data_dir={})",
        config.port,
        data_dir_display(&config.data_dir)
    );

    let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(config.data_dir.clone()));
    let registry = RoomRegistry::new(storage);
    let pairing = PairingRegistry::new();
    pairing::spawn_reaper(pairing.clone());

    let state = AppState { registry, pairing, config: Arc::new(config) };
    let port = state.config.port;
    let app = http::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|error| panic!("[realtime-hub] failed to bind {addr}: {error}"));
    println!("[realtime-hub] listening on {addr}");

    axum::serve(listener, app).await.unwrap_or_else(|error| {
        eprintln!("[realtime-hub] server error: {error}");
    });
}
