//! SQLite-backed record store: connection, schema and timestamp helpers.
//! Record CRUD lives in `records`.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Failure of the backing store. In-memory records must not be assumed durable after one.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("cannot prepare database location: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot locate XDG state directory: {0}")]
    Xdg(String),
    #[error("corrupt record {key}: unknown status {status:?}")]
    Corrupt { key: String, status: String },
}

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the record database.
///
/// Opened once by the caller and passed by reference to every `Fetcher`;
/// cloning shares the same pool. Call `close` when done.
#[derive(Clone)]
pub struct RecordStore {
    pub(crate) pool: Pool<Sqlite>,
}

impl RecordStore {
    /// Default location: `~/.local/state/datafetch/records.db`.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("datafetch")
            .map_err(|e| StoreError::Xdg(e.to_string()))?;
        Ok(xdg_dirs
            .get_state_home()
            .join("datafetch")
            .join("records.db"))
    }

    /// Open (or create) the default record database.
    pub async fn open_default() -> Result<Self, StoreError> {
        Self::open_at(Self::default_path()?).await
    }

    /// Open (or create) the database at `path`, creating parent dirs and the
    /// schema if needed. A fresh empty file is fine.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await?;
        let store = RecordStore { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "record store opened");
        Ok(store)
    }

    /// Close the pool, waiting for in-flight statements.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        // Timestamps are Unix seconds. `key` is the canonical descriptor encoding.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS download_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'empty',
                queue_id TEXT,
                origin_url TEXT,
                filepath TEXT,
                size INTEGER,
                date_queued INTEGER,
                date_queued_and_ready INTEGER,
                date_start INTEGER,
                date_stop INTEGER,
                nb_try INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_download_records_status ON download_records(status);"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Current time as Unix seconds (for DB timestamps).
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
/// Open an in-memory database for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<RecordStore, StoreError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let store = RecordStore { pool };
    store.migrate().await?;
    Ok(store)
}
