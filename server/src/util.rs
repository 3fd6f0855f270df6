use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, clamped to fit `i64`/`f64` losslessly
/// for the timescales this process will ever run at.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A short opaque token suitable for userIds and stroke-adjacent identifiers.
/// Not a UUID string on purpose -- the wire format spells these out in every
/// envelope, so a compact, URL-safe token keeps frames small.
pub fn opaque_token(len: usize) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(len);
    let mut remaining = len;
    while remaining > 0 {
        let chunk = uuid::Uuid::new_v4().simple().to_string();
        let take = chunk.len().min(remaining);
        let _ = write!(out, "{}", &chunk[..take]);
        remaining -= take;
    }
    out
}
