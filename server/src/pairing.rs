use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::util::{now_ms, opaque_token};

/// How long a pairing token stays claimable before it's swept by the reaper.
pub const PAIR_TTL: Duration = Duration::from_secs(120);
const PAIR_TOKEN_LEN: usize = 16;
const REAPER_INTERVAL: Duration = Duration::from_secs(10);

struct PendingPair {
    room_id: String,
    web_user_id: String,
    expires_at: i64,
}

#[derive(Default)]
pub struct PairingRegistry {
    pending: RwLock<HashMap<String, PendingPair>>,
}

pub enum ClaimOutcome {
    /// Absent, or present but past its deadline -- the wire protocol
    /// doesn't distinguish the two (§4.5: "Invalid or expired token").
    Invalid,
    WrongRoom,
    Success { web_user_id: String },
}

impl PairingRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mints a fresh token for `web_user_id` in `room_id`. A web client may
    /// hold several outstanding tokens at once -- each create is independent,
    /// and an earlier token stays claimable until its own expiry rather than
    /// being invalidated by a later create (§3, §4.5).
    pub async fn create(&self, room_id: &str, web_user_id: &str) -> (String, i64) {
        let token = opaque_token(PAIR_TOKEN_LEN);
        let expires_at = now_ms() + PAIR_TTL.as_millis() as i64;
        let mut guard = self.pending.write().await;
        guard.insert(token.clone(), PendingPair { room_id: room_id.to_string(), web_user_id: web_user_id.to_string(), expires_at });
        (token, expires_at)
    }

    /// Claims a token on behalf of a mobile connection already joined to
    /// `caller_room_id`. The token is consumed only on success -- a claim
    /// against the wrong room leaves the token alive so the mobile client
    /// can retry from the room it actually meant to join (§4.5).
    pub async fn claim(&self, token: &str, caller_room_id: &str) -> ClaimOutcome {
        let mut guard = self.pending.write().await;
        let Some(pending) = guard.get(token) else {
            return ClaimOutcome::Invalid;
        };
        if pending.expires_at < now_ms() {
            guard.remove(token);
            return ClaimOutcome::Invalid;
        }
        if pending.room_id != caller_room_id {
            return ClaimOutcome::WrongRoom;
        }
        let pending = guard.remove(token).expect("checked present above");
        ClaimOutcome::Success { web_user_id: pending.web_user_id }
    }

    async fn reap_expired(&self) {
        let now = now_ms();
        let mut guard = self.pending.write().await;
        guard.retain(|_, pending| pending.expires_at >= now);
    }
}

/// Background sweep for tokens nobody ever claimed. `claim` already enforces
/// expiry independently, so this task only exists to bound memory -- it is
/// never load-bearing for correctness.
pub fn spawn_reaper(registry: Arc<PairingRegistry>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REAPER_INTERVAL);
        loop {
            interval.tick().await;
            registry.reap_expired().await;
        }
    });
}
