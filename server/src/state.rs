use std::sync::Arc;

use crate::config::Config;
use crate::pairing::PairingRegistry;
use crate::registry::RoomRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub pairing: Arc<PairingRegistry>,
    pub config: Arc<Config>,
}
