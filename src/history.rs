use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::locator::PlaybackLocator;
use crate::session::Checkpoint;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Last watched position for one episode of one title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub title_id: String,
    pub episode_label: String,
    pub server_label: String,
    #[serde(default)]
    pub poster_ref: Option<String>,
    pub display_name: String,
    pub position_seconds: f64,
    pub updated_at_epoch_ms: i64,
}

impl HistoryEntry {
    pub fn from_checkpoint(checkpoint: &Checkpoint, updated_at_epoch_ms: i64) -> Self {
        let target = &checkpoint.target;
        Self {
            title_id: target.title_id.clone(),
            episode_label: target.episode_label.clone(),
            server_label: target.server_label.clone(),
            poster_ref: target.poster_ref.clone(),
            display_name: target.display_name.clone(),
            position_seconds: checkpoint.current_time,
            updated_at_epoch_ms,
        }
    }

    pub fn is_for(&self, title_id: &str, episode_label: &str) -> bool {
        self.title_id == title_id && self.episode_label == episode_label
    }

    /// Address that reopens this exact episode.
    pub fn locator(&self) -> PlaybackLocator {
        PlaybackLocator::for_episode(&self.title_id, &self.server_label, &self.episode_label)
    }
}

pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to access history file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Storage substrate holding the serialized history payload.
pub trait HistoryBackend: Send {
    fn load(&self) -> Result<Option<String>, HistoryError>;
    fn store(&mut self, payload: &str) -> Result<(), HistoryError>;
    fn erase(&mut self) -> Result<(), HistoryError>;
}

pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> Option<PathBuf> {
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".local/share/phimx/history.json"))
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl HistoryBackend for FileBackend {
    fn load(&self) -> Result<Option<String>, HistoryError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn store(&mut self, payload: &str) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        // Write next to the target and rename so readers never see a torn file.
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, payload).map_err(|e| self.io_error(e))?;
        std::fs::rename(&staging, &self.path).map_err(|e| self.io_error(e))
    }

    fn erase(&mut self) -> Result<(), HistoryError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Process-local substrate, used when no home directory is available.
#[derive(Default)]
pub struct MemoryBackend {
    payload: Option<String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: Some(payload.into()),
        }
    }
}

impl HistoryBackend for MemoryBackend {
    fn load(&self) -> Result<Option<String>, HistoryError> {
        Ok(self.payload.clone())
    }

    fn store(&mut self, payload: &str) -> Result<(), HistoryError> {
        self.payload = Some(payload.to_string());
        Ok(())
    }

    fn erase(&mut self) -> Result<(), HistoryError> {
        self.payload = None;
        Ok(())
    }
}

/// Bounded, deduplicated watch history, most recent first.
///
/// Every call reads from and writes through to the backend; nothing is cached,
/// so two stores over the same file always agree.
pub struct HistoryStore {
    backend: Box<dyn HistoryBackend>,
    limit: usize,
}

impl HistoryStore {
    pub fn new(backend: Box<dyn HistoryBackend>, limit: usize) -> Self {
        Self {
            backend,
            limit: limit.max(1),
        }
    }

    /// File-backed store at the default location, or an in-memory one when
    /// the home directory cannot be determined.
    pub fn open_default(limit: usize) -> Self {
        match FileBackend::default_path() {
            Some(path) => Self::new(Box::new(FileBackend::new(path)), limit),
            None => {
                warn!("HOME is not set; watch history will not persist");
                Self::new(Box::new(MemoryBackend::new()), limit)
            }
        }
    }

    pub fn get_all(&self) -> Vec<HistoryEntry> {
        let payload = match self.backend.load() {
            Ok(Some(payload)) => payload,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read watch history, treating it as empty");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<HistoryEntry>>(&payload) {
            Ok(mut entries) => {
                entries.truncate(self.limit);
                entries
            }
            Err(e) => {
                warn!(error = %e, "watch history is corrupt, treating it as empty");
                Vec::new()
            }
        }
    }

    pub fn find(&self, title_id: &str, episode_label: &str) -> Option<HistoryEntry> {
        self.get_all()
            .into_iter()
            .find(|e| e.is_for(title_id, episode_label))
    }

    pub fn latest_for_title(&self, title_id: &str) -> Option<HistoryEntry> {
        self.get_all().into_iter().find(|e| e.title_id == title_id)
    }

    pub fn upsert(&mut self, entry: HistoryEntry) -> Result<(), HistoryError> {
        let mut entries = self.get_all();
        entries.retain(|e| !e.is_for(&entry.title_id, &entry.episode_label));
        debug!(
            title = %entry.title_id,
            episode = %entry.episode_label,
            position = entry.position_seconds,
            "recording watch position"
        );
        entries.insert(0, entry);
        entries.truncate(self.limit);
        self.write(&entries)
    }

    pub fn remove(&mut self, title_id: &str, episode_label: &str) -> Result<(), HistoryError> {
        let mut entries = self.get_all();
        let before = entries.len();
        entries.retain(|e| !e.is_for(title_id, episode_label));
        if entries.len() == before {
            return Ok(());
        }
        self.write(&entries)
    }

    pub fn clear(&mut self) -> Result<(), HistoryError> {
        self.backend.erase()
    }

    fn write(&mut self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        let payload = serde_json::to_string(entries)?;
        self.backend.store(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title_id: &str, episode: &str, position: f64, at: i64) -> HistoryEntry {
        HistoryEntry {
            title_id: title_id.to_string(),
            episode_label: episode.to_string(),
            server_label: String::from("Vietsub #1"),
            poster_ref: Some(String::from("upload/vod/poster.jpg")),
            display_name: format!("Title {}", title_id),
            position_seconds: position,
            updated_at_epoch_ms: at,
        }
    }

    fn memory_store() -> HistoryStore {
        HistoryStore::new(Box::new(MemoryBackend::new()), DEFAULT_HISTORY_LIMIT)
    }

    #[test]
    fn empty_backend_reads_as_empty() {
        assert!(memory_store().get_all().is_empty());
    }

    #[test]
    fn corrupt_payload_reads_as_empty() {
        let store = HistoryStore::new(
            Box::new(MemoryBackend::with_payload("{not json")),
            DEFAULT_HISTORY_LIMIT,
        );
        assert!(store.get_all().is_empty());
    }

    #[test]
    fn corrupt_payload_is_replaced_by_next_upsert() {
        let mut store = HistoryStore::new(
            Box::new(MemoryBackend::with_payload("[{\"titleId\": 4}]")),
            DEFAULT_HISTORY_LIMIT,
        );
        store.upsert(entry("t1", "E1", 10.0, 1)).unwrap();
        assert_eq!(store.get_all().len(), 1);
    }

    #[test]
    fn upsert_replaces_same_episode() {
        let mut store = memory_store();
        store.upsert(entry("t1", "E1", 30.0, 1)).unwrap();
        store.upsert(entry("t1", "E1", 90.0, 2)).unwrap();

        let all = store.get_all();
        let matching: Vec<_> = all.iter().filter(|e| e.is_for("t1", "E1")).collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].position_seconds, 90.0);
    }

    #[test]
    fn upsert_moves_entry_to_front() {
        let mut store = memory_store();
        store.upsert(entry("t1", "E1", 30.0, 1)).unwrap();
        store.upsert(entry("t2", "E1", 10.0, 2)).unwrap();
        store.upsert(entry("t1", "E1", 45.0, 3)).unwrap();

        let ids: Vec<_> = store
            .get_all()
            .iter()
            .map(|e| e.title_id.clone())
            .collect();
        assert_eq!(ids, vec!["t1", "t2"]);
    }

    #[test]
    fn different_episodes_of_one_title_coexist() {
        let mut store = memory_store();
        store.upsert(entry("t1", "E1", 30.0, 1)).unwrap();
        store.upsert(entry("t1", "E2", 5.0, 2)).unwrap();
        assert_eq!(store.get_all().len(), 2);
        assert_eq!(
            store.latest_for_title("t1").map(|e| e.episode_label),
            Some(String::from("E2"))
        );
    }

    #[test]
    fn bound_holds_and_order_is_most_recent_first() {
        let mut store = memory_store();
        for i in 0..120 {
            store
                .upsert(entry(&format!("t{}", i % 70), "E1", i as f64, i))
                .unwrap();
            let all = store.get_all();
            assert!(all.len() <= DEFAULT_HISTORY_LIMIT);
            assert!(all
                .windows(2)
                .all(|w| w[0].updated_at_epoch_ms > w[1].updated_at_epoch_ms));
        }
    }

    #[test]
    fn insertion_past_bound_evicts_oldest() {
        let mut store = memory_store();
        for i in 0..51 {
            store.upsert(entry(&format!("t{}", i), "E1", 1.0, i)).unwrap();
        }
        let all = store.get_all();
        assert_eq!(all.len(), 50);
        assert!(store.find("t0", "E1").is_none());
        assert!(store.find("t1", "E1").is_some());
        assert_eq!(all[0].title_id, "t50");
    }

    #[test]
    fn remove_only_touches_matching_entry() {
        let mut store = memory_store();
        store.upsert(entry("t1", "E1", 1.0, 1)).unwrap();
        store.upsert(entry("t1", "E2", 2.0, 2)).unwrap();
        store.remove("t1", "E1").unwrap();
        store.remove("t9", "E1").unwrap();

        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].episode_label, "E2");
    }

    #[test]
    fn clear_empties_store() {
        let mut store = memory_store();
        store.upsert(entry("t1", "E1", 1.0, 1)).unwrap();
        store.clear().unwrap();
        assert!(store.get_all().is_empty());
    }

    #[test]
    fn file_backend_round_trips_between_stores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");

        let mut writer = HistoryStore::new(
            Box::new(FileBackend::new(path.clone())),
            DEFAULT_HISTORY_LIMIT,
        );
        writer.upsert(entry("t1", "Tập 01", 42.0, 7)).unwrap();

        let reader = HistoryStore::new(Box::new(FileBackend::new(path.clone())), 50);
        let found = reader.find("t1", "Tập 01").unwrap();
        assert_eq!(found.position_seconds, 42.0);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"episodeLabel\""));
        assert!(raw.contains("\"updatedAtEpochMs\":7"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn file_backend_clear_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HistoryStore::new(
            Box::new(FileBackend::new(dir.path().join("history.json"))),
            DEFAULT_HISTORY_LIMIT,
        );
        store.clear().unwrap();
        assert!(store.get_all().is_empty());
    }

    #[test]
    fn locator_points_at_the_episode() {
        let e = entry("t1", "Tập 01", 1.0, 1);
        assert_eq!(e.locator().path(), "/title/t1?vietsub-1&tap-01");
    }
}
