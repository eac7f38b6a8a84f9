use std::{
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, info, warn};

use super::entities::LogStore;

pub const LOG_FILE_NAME: &str = "productivity_logs.json";

/// A file with this many lines or fewer can't hold a populated store. It's most likely a freshly
/// created or reset file, so it's treated as empty.
const MIN_POPULATED_LINES: usize = 10;

/// Interface for abstracting storage of the [LogStore].
pub trait LogStorage {
    /// Reads the persisted store. Absent or near-empty files produce an empty store, while a file
    /// that can't be parsed is an error.
    fn load(&self) -> impl Future<Output = Result<LogStore>> + Send;

    /// Replaces the persisted store with `store`.
    fn save(&self, store: &LogStore) -> impl Future<Output = Result<()>> + Send;
}

/// The main realization of [LogStorage]. Keeps the store as a single pretty-printed json document.
pub struct JsonLogStorage {
    path: PathBuf,
}

impl JsonLogStorage {
    pub fn new(dir: &Path) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(dir)?;

        Ok(Self {
            path: dir.join(LOG_FILE_NAME),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_locked(file: &mut File) -> Result<String, std::io::Error> {
        let mut content = String::new();
        file.read_to_string(&mut content).await?;
        Ok(content)
    }

    async fn write_locked(file: &mut File, buffer: &[u8]) -> Result<(), std::io::Error> {
        file.set_len(0).await?;
        file.rewind().await?;
        file.write_all(buffer).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

impl LogStorage for JsonLogStorage {
    async fn load(&self) -> Result<LogStore> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No log file at {:?}, starting with empty logs", self.path);
                return Ok(LogStore::default());
            }
            Err(e) => Err(e).with_context(|| format!("Failed to open {:?}", self.path))?,
        };

        file.lock_shared()?;
        let content = Self::read_locked(&mut file).await;
        file.unlock_async().await?;
        let content = content.with_context(|| format!("Failed to read {:?}", self.path))?;

        let lines = content.lines().count();
        if lines <= MIN_POPULATED_LINES {
            warn!(
                "Log file {:?} has only {lines} lines. Initializing empty logs",
                self.path
            );
            return Ok(LogStore::default());
        }

        let store = serde_json::from_str::<LogStore>(&content)
            .with_context(|| format!("Log file {:?} is corrupted", self.path))?;
        debug!("Loaded logs for {} days", store.day_logs.len());
        Ok(store)
    }

    async fn save(&self, store: &LogStore) -> Result<()> {
        let buffer = serde_json::to_vec_pretty(store)?;

        let mut file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {:?}", self.path))?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = Self::write_locked(&mut file, &buffer).await;
        file.unlock_async().await?;
        result.with_context(|| format!("Failed to write {:?}", self.path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use crate::agent::storage::entities::{ActivityRecord, ContextStats, LogStore, UNSET_EMP_ID};

    use super::{JsonLogStorage, LogStorage};

    fn populated_store() -> LogStore {
        let mut record = ActivityRecord {
            idle_time: 152.5,
            ..Default::default()
        };
        record.browser_activity.insert(
            "github.com".into(),
            ContextStats {
                keys: vec!["a".into(), "b".into()],
                total_key_strokes: 1,
                ..ContextStats::browser(3, 3)
            },
        );
        record.application_activity.insert(
            "Terminal".into(),
            ContextStats {
                time_spent: 4,
                keys: vec!["l".into(), "s".into(), "Return".into()],
                total_key_strokes: 2,
                ..ContextStats::application()
            },
        );

        let mut store = LogStore::empty(12);
        store
            .day_logs
            .insert(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), record);
        store
            .summary
            .insert("note".into(), serde_json::Value::String("kept".into()));
        store
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_store() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonLogStorage::new(dir.path())?;

        assert_eq!(storage.load().await?, LogStore::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonLogStorage::new(dir.path())?;
        let store = populated_store();

        storage.save(&store).await?;
        assert!(fs::read_to_string(storage.path())?.lines().count() > 10);

        assert_eq!(storage.load().await?, store);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_replaces_longer_content() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonLogStorage::new(dir.path())?;

        storage.save(&populated_store()).await?;
        storage.save(&LogStore::empty(3)).await?;

        let content = fs::read_to_string(storage.path())?;
        let parsed: LogStore = serde_json::from_str(&content)?;
        assert_eq!(parsed, LogStore::empty(3));
        Ok(())
    }

    #[tokio::test]
    async fn test_short_file_is_treated_as_empty() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonLogStorage::new(dir.path())?;
        fs::write(storage.path(), "{\"emp_id\": 7, \"day_logs\": {}, \"summary\": {}}")?;

        let store = storage.load().await?;

        assert_eq!(store.emp_id, UNSET_EMP_ID);
        assert!(store.day_logs.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_file_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonLogStorage::new(dir.path())?;
        let garbage = (0..20).map(|i| format!("line {i}\n")).collect::<String>();
        fs::write(storage.path(), garbage)?;

        assert!(storage.load().await.is_err());
        Ok(())
    }
}
