//! SettingsStore - durable global settings.
//!
//! Key/value layout, one JSON value per key:
//! - `persistentMode` → bool
//! - `activeTool` → tool name or null
//! - `activeToolArgs` → tool args object or null
//!
//! The connection is synchronous; the async methods hop onto the blocking
//! pool so the coordinator's mailbox is never parked on disk I/O.

use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{PersistedSettings, ToolArgs, ToolKind};

pub const KEY_PERSISTENT_MODE: &str = "persistentMode";
pub const KEY_ACTIVE_TOOL: &str = "activeTool";
pub const KEY_ACTIVE_TOOL_ARGS: &str = "activeToolArgs";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Settings directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings connection poisoned")]
    Poisoned,

    #[error("Blocking task failed: {0}")]
    Join(String),
}

#[derive(Clone)]
pub struct SettingsStore {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl SettingsStore {
    /// Open (or create) the store. Use `":memory:"` for a throwaway store.
    pub fn open(path: &str) -> Result<Self, SettingsError> {
        let conn = if path == ":memory:" {
            rusqlite::Connection::open_in_memory()?
        } else {
            if let Some(parent) = std::path::Path::new(path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
            {
                std::fs::create_dir_all(parent)?;
            }
            rusqlite::Connection::open(path)?
        };

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;

        tracing::info!(path = %path, "Settings store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, SettingsError> {
        Self::open(":memory:")
    }

    pub async fn load(&self) -> Result<PersistedSettings, SettingsError> {
        self.blocking(|conn| {
            Ok(PersistedSettings {
                persistent_mode: get_json(conn, KEY_PERSISTENT_MODE)?.unwrap_or(false),
                active_tool: get_json::<Option<ToolKind>>(conn, KEY_ACTIVE_TOOL)?.flatten(),
                active_tool_args: get_json::<Option<ToolArgs>>(conn, KEY_ACTIVE_TOOL_ARGS)?
                    .flatten(),
            })
        })
        .await
    }

    pub async fn set_persistent_mode(&self, enabled: bool) -> Result<(), SettingsError> {
        self.blocking(move |conn| put_json(conn, KEY_PERSISTENT_MODE, &enabled))
            .await
    }

    pub async fn set_active_tool(
        &self,
        tool: Option<ToolKind>,
        args: Option<ToolArgs>,
    ) -> Result<(), SettingsError> {
        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            put_json(&tx, KEY_ACTIVE_TOOL, &tool)?;
            put_json(&tx, KEY_ACTIVE_TOOL_ARGS, &args)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, SettingsError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, SettingsError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| SettingsError::Poisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| SettingsError::Join(e.to_string()))?
    }
}

fn get_json<T: DeserializeOwned>(
    conn: &rusqlite::Connection,
    key: &str,
) -> Result<Option<T>, SettingsError> {
    let raw = match conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        rusqlite::params![key],
        |row| row.get::<_, String>(0),
    ) {
        Ok(raw) => raw,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&raw)?))
}

fn put_json<T: Serialize>(
    conn: &rusqlite::Connection,
    key: &str,
    value: &T,
) -> Result<(), SettingsError> {
    let raw = serde_json::to_string(value)?;
    conn.execute(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        rusqlite::params![key, raw, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_when_empty() {
        let store = SettingsStore::in_memory().unwrap();
        assert_eq!(store.load().await.unwrap(), PersistedSettings::default());
    }

    #[tokio::test]
    async fn test_active_tool_round_trip_and_clear() {
        let store = SettingsStore::in_memory().unwrap();
        let args = ToolArgs {
            font_size: Some("14px".to_string()),
        };
        store
            .set_active_tool(Some(ToolKind::FontHighlighter), Some(args.clone()))
            .await
            .unwrap();
        store.set_persistent_mode(true).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert!(loaded.persistent_mode);
        assert_eq!(loaded.active_tool, Some(ToolKind::FontHighlighter));
        assert_eq!(loaded.active_tool_args, Some(args));

        store.set_active_tool(None, None).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.active_tool, None);
        assert_eq!(loaded.active_tool_args, None);
        assert!(loaded.persistent_mode);
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");
        let path = path.to_str().unwrap();

        SettingsStore::open(path)
            .unwrap()
            .set_persistent_mode(true)
            .await
            .unwrap();

        let reopened = SettingsStore::open(path).unwrap();
        assert!(reopened.load().await.unwrap().persistent_mode);
    }

    #[test]
    fn test_open_reports_unusable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let path = blocker.join("nested").join("settings.db");

        let result = SettingsStore::open(path.to_str().unwrap());
        assert!(matches!(result, Err(SettingsError::Io(_))));
    }

    #[test]
    fn test_open_creates_missing_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("settings.db");

        assert!(SettingsStore::open(path.to_str().unwrap()).is_ok());
        assert!(path.exists());
    }
}
