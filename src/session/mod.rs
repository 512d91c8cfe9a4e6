use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::ingest::{FileKind, IngestError, IngestManager, file_extension, remove_store_files};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    #[serde(skip)]
    pub db_path: PathBuf,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// In-memory registry of upload sessions. Each session owns exactly one store
/// file at `<data_dir>/<session_id>.duckdb`.
pub struct SessionStore {
    data_dir: PathBuf,
    ingest: Arc<IngestManager>,
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl SessionStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ingest: Arc::new(IngestManager::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Converts an upload into a new store and registers it. The session only
    /// becomes visible once its store is complete.
    pub async fn create_session(&self, contents: &[u8], filename: &str) -> Result<String, SessionError> {
        let extension = file_extension(filename)?;
        FileKind::from_extension(&extension)?;

        let session_id = Uuid::new_v4().to_string();
        let db_path = self.data_dir.join(format!("{session_id}.duckdb"));
        let upload_path = self.data_dir.join(format!("{session_id}.upload.{extension}"));

        tokio::fs::write(&upload_path, contents).await?;

        let ingest = Arc::clone(&self.ingest);
        let (source, name, dest) = (upload_path.clone(), filename.to_string(), db_path.clone());
        let outcome = tokio::task::spawn_blocking(move || ingest.create_store(&source, &name, &dest)).await;

        if let Err(e) = tokio::fs::remove_file(&upload_path).await {
            tracing::warn!("Failed to remove upload {}: {}", upload_path.display(), e);
        }

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(join_err) => {
                remove_store_files(&db_path);
                return Err(SessionError::Task(join_err.to_string()));
            }
        }

        let now = Utc::now();
        let record = SessionRecord {
            session_id: session_id.clone(),
            db_path,
            original_filename: filename.to_string(),
            created_at: now,
            last_accessed: now,
        };
        self.sessions.write().await.insert(session_id.clone(), record);

        tracing::info!("Created session {} from '{}'", session_id, filename);
        Ok(session_id)
    }

    /// Looks up a session and marks it as used.
    pub async fn get_session(&self, session_id: &str) -> Result<SessionRecord, SessionError> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        record.last_accessed = Utc::now();
        Ok(record.clone())
    }

    /// Unregisters a session and deletes its store. Deleting an unknown id is
    /// reported as `NotFound`, so a repeated delete is harmless.
    pub async fn delete_session(&self, session_id: &str) -> Result<SessionRecord, SessionError> {
        let record = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let db_path = record.db_path.clone();
        tokio::task::spawn_blocking(move || remove_store_files(&db_path))
            .await
            .map_err(|e| SessionError::Task(e.to_string()))?;

        tracing::info!("Deleted session {}", session_id);
        Ok(record)
    }

    /// Snapshot of all sessions, oldest first.
    pub async fn list_sessions(&self) -> Vec<SessionRecord> {
        let mut records: Vec<SessionRecord> = self.sessions.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Deletes every session idle for longer than `ttl`. Returns how many went.
    pub async fn sweep_expired(&self, ttl: Duration) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return 0;
        };
        let cutoff = Utc::now() - ttl;

        let expired: Vec<String> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|record| record.last_accessed < cutoff)
            .map(|record| record.session_id.clone())
            .collect();

        let mut removed = 0;
        for session_id in expired {
            match self.delete_session(&session_id).await {
                Ok(_) => removed += 1,
                Err(SessionError::NotFound(_)) => {}
                Err(e) => tracing::warn!("Failed to expire session {}: {}", session_id, e),
            }
        }

        if removed > 0 {
            tracing::info!("Expired {} idle sessions", removed);
        }
        removed
    }

    /// Removes store and staging files left in the data directory by a
    /// previous run. Sessions do not survive restarts, so any such file is
    /// unreachable.
    pub fn remove_orphans(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_leftover = name.ends_with(".duckdb")
                || name.ends_with(".duckdb.wal")
                || name.contains(".upload.");
            if is_leftover && entry.file_type()?.is_file() {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!("Removed {} leftover files from {}", removed, self.data_dir.display());
        }
        Ok(removed)
    }
}

/// Periodically expires idle sessions. A zero `ttl` disables expiry and no
/// task is started.
pub fn spawn_sweeper(store: Arc<SessionStore>, ttl: Duration, every: Duration) -> Option<JoinHandle<()>> {
    if ttl.is_zero() || every.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            store.sweep_expired(ttl).await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEOPLE_CSV: &[u8] = b"name,age\nAlice,30\nBob,25\n";

    #[tokio::test]
    async fn test_create_and_get_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let id = store.create_session(PEOPLE_CSV, "people.csv").await.unwrap();
        let record = store.get_session(&id).await.unwrap();

        assert_eq!(record.original_filename, "people.csv");
        assert_eq!(record.db_path, dir.path().join(format!("{id}.duckdb")));
        assert!(record.db_path.exists());
        assert!(record.last_accessed >= record.created_at);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_upload_staging_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        store.create_session(PEOPLE_CSV, "people.csv").await.unwrap();

        let leftovers: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".upload."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let first = store.create_session(PEOPLE_CSV, "a.csv").await.unwrap();
        let second = store.create_session(PEOPLE_CSV, "a.csv").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.list_sessions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_sqlite_upload_creates_session() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.sqlite3");
        {
            let conn = rusqlite::Connection::open(&source).unwrap();
            conn.execute_batch(
                "CREATE TABLE people (name TEXT, age INTEGER);
                 INSERT INTO people VALUES ('Alice', 30), ('Bob', 25);",
            )
            .unwrap();
        }
        let bytes = std::fs::read(&source).unwrap();
        let data_dir = dir.path().join("sessions");
        std::fs::create_dir(&data_dir).unwrap();
        let store = SessionStore::new(&data_dir);

        let id = store.create_session(&bytes, "people.db").await.unwrap();
        let record = store.get_session(&id).await.unwrap();

        let conn = crate::db::open_read_only(&record.db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM people WHERE age > 26", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_unsupported_upload_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let err = store.create_session(b"%PDF", "report.pdf").await.unwrap_err();
        assert!(matches!(err, SessionError::Ingest(IngestError::FileFormat(_))));
        assert!(store.is_empty().await);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_conversion_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let err = store.create_session(b"garbage bytes", "broken.db").await.unwrap_err();
        assert!(matches!(err, SessionError::Ingest(IngestError::Conversion(_))));
        assert!(store.is_empty().await);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_store_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let id = store.create_session(PEOPLE_CSV, "people.csv").await.unwrap();
        let record = store.delete_session(&id).await.unwrap();

        assert!(!record.db_path.exists());
        assert!(matches!(store.get_session(&id).await, Err(SessionError::NotFound(_))));
        assert!(matches!(store.delete_session(&id).await, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sweep_expires_idle_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let stale = store.create_session(PEOPLE_CSV, "old.csv").await.unwrap();
        let fresh = store.create_session(PEOPLE_CSV, "new.csv").await.unwrap();
        {
            let mut sessions = store.sessions.write().await;
            let record = sessions.get_mut(&stale).unwrap();
            record.last_accessed = Utc::now() - chrono::Duration::hours(2);
        }

        let removed = store.sweep_expired(Duration::from_secs(3600)).await;

        assert_eq!(removed, 1);
        assert!(store.get_session(&stale).await.is_err());
        assert!(store.get_session(&fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_orphans_only_touches_store_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old-session.duckdb"), b"x").unwrap();
        std::fs::write(dir.path().join("old-session.duckdb.wal"), b"x").unwrap();
        std::fs::write(dir.path().join("old-session.upload.csv"), b"x").unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"x").unwrap();

        let store = SessionStore::new(dir.path());
        assert_eq!(store.remove_orphans().unwrap(), 3);
        assert!(dir.path().join("keep.txt").exists());
    }
}
