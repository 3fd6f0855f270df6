use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use realtime_hub_shared::Stroke;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::util::now_ms;

/// Debounce window for whiteboard persistence (§4.4): a further mutating
/// event within this window resets the save timer rather than queuing a
/// second write.
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(250);

#[async_trait]
pub trait Storage: Send + Sync {
    async fn load_room(&self, room_id: &str) -> Vec<Stroke>;
    async fn save_room(&self, room_id: &str, strokes: &[Stroke]);
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomFile {
    room_id: String,
    saved_at: i64,
    strokes: Vec<Stroke>,
}

pub struct FileStorage {
    data_dir: PathBuf,
}

impl FileStorage {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn path_for(&self, room_id: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", sanitize_room_id(room_id)))
    }
}

/// `roomId` is client-chosen (§3) and reaches this layer straight from a
/// `room.join` payload, so it's untrusted input becoming a path component --
/// same caution as `logsink::sanitize_app_name` for the `/log` endpoint's
/// `app` field. A `../` in a roomId must not let a client read or clobber
/// files outside the data directory.
fn sanitize_room_id(room_id: &str) -> String {
    let cleaned: String = room_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(128)
        .collect();
    if cleaned.is_empty() {
        "room".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn load_room(&self, room_id: &str) -> Vec<Stroke> {
        let path = self.path_for(room_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => match serde_json::from_str::<RoomFile>(&text) {
                Ok(file) => file.strokes,
                Err(error) => {
                    eprintln!("[persistence] corrupt room file {}: {error}; starting empty", path.display());
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }

    async fn save_room(&self, room_id: &str, strokes: &[Stroke]) {
        let file = RoomFile {
            room_id: room_id.to_string(),
            saved_at: now_ms(),
            strokes: strokes.to_vec(),
        };
        let text = match serde_json::to_string_pretty(&file) {
            Ok(text) => text,
            Err(error) => {
                eprintln!("[persistence] failed to encode room {room_id}: {error}");
                return;
            }
        };
        if let Err(error) = tokio::fs::create_dir_all(&self.data_dir).await {
            eprintln!("[persistence] failed to create data dir {}: {error}", self.data_dir.display());
            return;
        }
        if let Err(error) = tokio::fs::write(self.path_for(room_id), text).await {
            eprintln!("[persistence] failed to save room {room_id}: {error}");
        }
    }
}

/// Spawns the per-room debounce task and returns the channel a mutating
/// event sends a ping into. The task quiesces for `SAVE_DEBOUNCE` after the
/// last ping before writing, and exits once the channel is dropped (i.e.
/// once the room itself is gone -- no explicit shutdown signal is needed).
///
/// `snapshot` is async because reading the live stroke set means taking the
/// room's own read lock; it is called only after the debounce window has
/// quiesced, never on every individual ping.
pub fn spawn_debounced_saver<F, Fut>(
    storage: Arc<dyn Storage>,
    room_id: String,
    snapshot: F,
) -> mpsc::UnboundedSender<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Vec<Stroke>> + Send,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            loop {
                match tokio::time::timeout(SAVE_DEBOUNCE, rx.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }
            storage.save_room(&room_id, &snapshot().await).await;
        }
    });
    tx
}

pub fn data_dir_display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use realtime_hub_shared::{Point, StrokeStyle, Tool};
    use tempfile_like::TempDir;

    fn sample_stroke(id: &str) -> Stroke {
        Stroke {
            stroke_id: id.to_string(),
            user_id: "u1".to_string(),
            style: StrokeStyle { tool: Tool::Pen, color: "#000".to_string(), width: 0.004, opacity: 1.0 },
            points: vec![Point { x: 0.1, y: 0.1, t: 1.0 }],
        }
    }

    /// Minimal stand-in for a temp-dir crate: the pack's teacher has no
    /// filesystem test helper dependency, so this keeps the test
    /// self-contained using only `std`/`tokio`.
    mod tempfile_like {
        use std::path::PathBuf;

        pub struct TempDir(PathBuf);

        impl TempDir {
            pub fn new() -> Self {
                let path = std::env::temp_dir().join(format!(
                    "realtime-hub-test-{}-{}",
                    std::process::id(),
                    crate::util::opaque_token(8)
                ));
                Self(path)
            }

            pub fn path(&self) -> &std::path::Path {
                &self.0
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[tokio::test]
    async fn round_trips_through_json() {
        let dir = TempDir::new();
        let storage = FileStorage::new(dir.path().to_path_buf());
        let strokes = vec![sample_stroke("s1")];
        storage.save_room("r1", &strokes).await;
        let loaded = storage.load_room("r1").await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].stroke_id, "s1");
    }

    #[tokio::test]
    async fn on_disk_shape_uses_camel_case_keys() {
        let dir = TempDir::new();
        let storage = FileStorage::new(dir.path().to_path_buf());
        storage.save_room("r1", &[sample_stroke("s1")]).await;
        let text = tokio::fs::read_to_string(dir.path().join("r1.json")).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["roomId"], "r1");
        assert!(value.get("savedAt").is_some());
        assert!(value.get("room_id").is_none());
        assert!(value.get("saved_at").is_none());
    }

    #[test]
    fn sanitizes_path_traversal_attempts_in_room_id() {
        assert_eq!(sanitize_room_id("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_room_id(""), "room");
        assert_eq!(sanitize_room_id("team-standup_1"), "team-standup_1");
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = TempDir::new();
        let storage = FileStorage::new(dir.path().to_path_buf());
        assert!(storage.load_room("nope").await.is_empty());
    }

    #[tokio::test]
    async fn debounce_coalesces_bursts_into_one_write() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingStorage(Arc<AtomicUsize>);

        #[async_trait]
        impl Storage for CountingStorage {
            async fn load_room(&self, _room_id: &str) -> Vec<Stroke> {
                Vec::new()
            }
            async fn save_room(&self, _room_id: &str, _strokes: &[Stroke]) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(AtomicUsize::new(0));
        let storage: Arc<dyn Storage> = Arc::new(CountingStorage(count.clone()));
        let tx = spawn_debounced_saver(storage, "r1".to_string(), || async { Vec::new() });

        for _ in 0..5 {
            tx.send(()).unwrap();
        }
        tokio::time::sleep(SAVE_DEBOUNCE + Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
