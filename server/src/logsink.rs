use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::util::now_ms;

/// Body shape the `/log` endpoint accepts (§4.9, §6). `data` is an opaque
/// blob the caller controls -- never interpreted, only relayed into the
/// appended line.
#[derive(Deserialize)]
pub struct LogSinkEntry {
    pub app: String,
    pub level: String,
    pub msg: String,
    #[serde(default)]
    pub data: Value,
}

/// Strips everything but `[A-Za-z0-9_-]` from the caller-supplied `app`
/// name before it becomes part of a file path -- the log sink is reachable
/// from any HTTP client, so `app` is treated as untrusted input rather than
/// a trusted path component.
fn sanitize_app_name(app: &str) -> String {
    let cleaned: String = app
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "app".to_string()
    } else {
        cleaned
    }
}

/// Appends one JSON line to `<log_dir>/<app>.log`, creating the directory
/// and file as needed. Best-effort: a write failure is logged to stderr and
/// otherwise swallowed, matching the rest of the system's "nothing in
/// normal operation is fatal" error stance (§7).
pub async fn append(log_dir: &Path, entry: &LogSinkEntry) {
    if let Err(error) = tokio::fs::create_dir_all(log_dir).await {
        eprintln!("[logsink] failed to create log dir {}: {error}", log_dir.display());
        return;
    }
    let path = log_dir.join(format!("{}.log", sanitize_app_name(&entry.app)));
    let line = serde_json::json!({
        "ts": now_ms(),
        "level": entry.level,
        "msg": entry.msg,
        "data": entry.data,
    });
    let Ok(line) = serde_json::to_string(&line) else {
        eprintln!("[logsink] failed to encode entry for app {}", entry.app);
        return;
    };
    let file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await;
    match file {
        Ok(mut file) => {
            if let Err(error) = file.write_all(format!("{line}\n").as_bytes()).await {
                eprintln!("[logsink] failed to write {}: {error}", path.display());
            }
        }
        Err(error) => eprintln!("[logsink] failed to open {}: {error}", path.display()),
    }
}
