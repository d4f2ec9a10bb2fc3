//! The persisted download record.

use std::fmt;
use std::time::Duration;

use crate::lifecycle::RecordStatus;

/// One row per logical resource key.
///
/// Fields are public for inspection; mutate the status only through the
/// lifecycle methods (`set_queued`, `set_start`, ...), then `RecordStore::save`.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRecord {
    /// Row id; 0 for a record that was never stored.
    pub id: i64,
    pub key: String,
    pub status: RecordStatus,
    /// Remote job id, kept once the record has reached `queued`.
    pub queue_id: Option<String>,
    /// Where the artifact is downloaded from.
    pub origin_url: Option<String>,
    pub filepath: Option<String>,
    pub size: Option<i64>,
    pub date_queued: Option<i64>,
    pub date_queued_and_ready: Option<i64>,
    pub date_start: Option<i64>,
    pub date_stop: Option<i64>,
    /// Remote attempts: submissions plus download attempts.
    pub nb_try: i64,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DownloadRecord {
    /// A fresh `empty` record, not yet stored.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            id: 0,
            key: key.into(),
            status: RecordStatus::Empty,
            queue_id: None,
            origin_url: None,
            filepath: None,
            size: None,
            date_queued: None,
            date_queued_and_ready: None,
            date_start: None,
            date_stop: None,
            nb_try: 0,
            error: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Elapsed time of the last download attempt, if it finished.
    pub fn download_time(&self) -> Option<Duration> {
        let (start, stop) = (self.date_start?, self.date_stop?);
        Some(Duration::from_secs(stop.saturating_sub(start).max(0) as u64))
    }
}

impl fmt::Display for DownloadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.key.chars().take(40).collect();
        write!(f, "<{}> {}", short, self.status)?;
        if let Some(q) = &self.queue_id {
            write!(f, " id {}", q)?;
        }
        if let Some(fp) = &self.filepath {
            write!(f, " {}", fp)?;
        }
        Ok(())
    }
}
