//! Record operations: get-or-create, get, save, delete, list.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::db::{unix_timestamp, RecordStore, StoreError};
use super::types::DownloadRecord;
use crate::lifecycle::RecordStatus;

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, key, status, queue_id, origin_url, filepath, size,
        date_queued, date_queued_and_ready, date_start, date_stop,
        nb_try, error, created_at, updated_at
    FROM download_records
"#;

fn record_from_row(row: &SqliteRow) -> Result<DownloadRecord, StoreError> {
    let key: String = row.try_get("key")?;
    let status_str: String = row.try_get("status")?;
    let status = RecordStatus::parse(&status_str).ok_or_else(|| StoreError::Corrupt {
        key: key.clone(),
        status: status_str.clone(),
    })?;

    Ok(DownloadRecord {
        id: row.try_get("id")?,
        key,
        status,
        queue_id: row.try_get("queue_id")?,
        origin_url: row.try_get("origin_url")?,
        filepath: row.try_get("filepath")?,
        size: row.try_get("size")?,
        date_queued: row.try_get("date_queued")?,
        date_queued_and_ready: row.try_get("date_queued_and_ready")?,
        date_start: row.try_get("date_start")?,
        date_stop: row.try_get("date_stop")?,
        nb_try: row.try_get("nb_try")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl RecordStore {
    /// Return the record for `key`, inserting an `empty` one if none exists.
    /// `created` is true only for the call that inserted the row.
    pub async fn get_or_create(&self, key: &str) -> Result<(DownloadRecord, bool), StoreError> {
        let now = unix_timestamp();
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO download_records (key, status, nb_try, created_at, updated_at)
            VALUES (?1, ?2, 0, ?3, ?4)
            "#,
        )
        .bind(key)
        .bind(RecordStatus::Empty.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let record = self.get(key).await?.ok_or(StoreError::Sqlx(sqlx::Error::RowNotFound))?;
        Ok((record, inserted == 1))
    }

    /// Fetch the current row for `key`.
    pub async fn get(&self, key: &str) -> Result<Option<DownloadRecord>, StoreError> {
        let sql = format!("{} WHERE key = ?1", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    /// All records, newest first.
    pub async fn list(&self) -> Result<Vec<DownloadRecord>, StoreError> {
        let sql = format!("{} ORDER BY created_at DESC, id DESC", SELECT_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Persist every mutable field of `record` and refresh its `updated_at`.
    /// Fails with `RowNotFound` if the row was deleted meanwhile.
    pub async fn save(&self, record: &mut DownloadRecord) -> Result<(), StoreError> {
        let now = unix_timestamp();
        let affected = sqlx::query(
            r#"
            UPDATE download_records
            SET status = ?1,
                queue_id = ?2,
                origin_url = ?3,
                filepath = ?4,
                size = ?5,
                date_queued = ?6,
                date_queued_and_ready = ?7,
                date_start = ?8,
                date_stop = ?9,
                nb_try = ?10,
                error = ?11,
                updated_at = ?12
            WHERE key = ?13
            "#,
        )
        .bind(record.status.as_str())
        .bind(&record.queue_id)
        .bind(&record.origin_url)
        .bind(&record.filepath)
        .bind(record.size)
        .bind(record.date_queued)
        .bind(record.date_queued_and_ready)
        .bind(record.date_start)
        .bind(record.date_stop)
        .bind(record.nb_try)
        .bind(&record.error)
        .bind(now)
        .bind(&record.key)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::Sqlx(sqlx::Error::RowNotFound));
        }
        record.updated_at = now;
        tracing::debug!(key = %record.key, status = %record.status, "record saved");
        Ok(())
    }

    /// Permanently remove the row of `record`.
    pub async fn delete(&self, record: &DownloadRecord) -> Result<(), StoreError> {
        self.delete_key(&record.key).await.map(|_| ())
    }

    /// Remove the row for `key`; returns whether a row existed.
    /// Local files are left alone.
    pub async fn delete_key(&self, key: &str) -> Result<bool, StoreError> {
        let r = sqlx::query(
            r#"
            DELETE FROM download_records
            WHERE key = ?1
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }
}
