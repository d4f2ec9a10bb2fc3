//! Status lifecycle of a download record.
//!
//! ```text
//! empty            -> queued | failed | downloading (direct sources)
//! queued           -> queued_and_ready | failed
//! queued_and_ready -> downloading | downloaded
//! downloading      -> downloaded | failed | downloading (stale restart)
//! failed           -> queued | downloading | downloaded
//! downloaded       -> downloaded | queued_and_ready (file vanished)
//! ```
//!
//! Every mutation of a `DownloadRecord` goes through the `set_*` methods
//! below; an illegal move returns `LifecycleError` and leaves the record as it
//! was, so it can never be persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::record_store::{unix_timestamp, DownloadRecord};

/// Progress of a resource, stored as a lowercase string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordStatus {
    #[default]
    Empty,
    Queued,
    QueuedAndReady,
    Downloading,
    Downloaded,
    Failed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Empty => "empty",
            RecordStatus::Queued => "queued",
            RecordStatus::QueuedAndReady => "queued_and_ready",
            RecordStatus::Downloading => "downloading",
            RecordStatus::Downloaded => "downloaded",
            RecordStatus::Failed => "failed",
        }
    }

    /// Unknown strings are reported as `None`; the store turns them into a decode error.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "empty" => RecordStatus::Empty,
            "queued" => RecordStatus::Queued,
            "queued_and_ready" => RecordStatus::QueuedAndReady,
            "downloading" => RecordStatus::Downloading,
            "downloaded" => RecordStatus::Downloaded,
            "failed" => RecordStatus::Failed,
            _ => return None,
        })
    }

    pub fn can_transition_to(self, next: RecordStatus) -> bool {
        use RecordStatus::*;
        matches!(
            (self, next),
            (Empty, Queued)
                | (Empty, Failed)
                | (Empty, Downloading)
                | (Queued, QueuedAndReady)
                | (Queued, Failed)
                | (QueuedAndReady, Downloading)
                | (QueuedAndReady, Downloaded)
                | (Downloading, Downloaded)
                | (Downloading, Failed)
                | (Downloading, Downloading)
                | (Failed, Queued)
                | (Failed, Downloading)
                | (Failed, Downloaded)
                | (Downloaded, Downloaded)
                | (Downloaded, QueuedAndReady)
        )
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a `failed` record without a download URL does on the next fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedPolicy {
    /// Submit a new remote request.
    #[default]
    Resubmit,
    /// Report the stored failure; only `force_new` starts over.
    RequireForceNew,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal status transition {from} -> {to} for record {key}")]
pub struct LifecycleError {
    pub key: String,
    pub from: RecordStatus,
    pub to: RecordStatus,
}

/// Result of checking a `downloaded` record against the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Satisfaction {
    /// Downloaded and the file is still there.
    Satisfied(PathBuf),
    /// Downloaded, but the recorded file is gone.
    Stale(PathBuf),
    /// Not downloaded (or no filepath recorded).
    Unsatisfied,
}

impl DownloadRecord {
    fn transition(&mut self, next: RecordStatus) -> Result<(), LifecycleError> {
        if !self.status.can_transition_to(next) {
            return Err(LifecycleError {
                key: self.key.clone(),
                from: self.status,
                to: next,
            });
        }
        tracing::debug!(key = %self.key, from = %self.status, to = %next, "status transition");
        self.status = next;
        Ok(())
    }

    /// Remote job accepted with id `queue_id`. A resubmission replaces the previous id and URL.
    pub fn set_queued(&mut self, queue_id: &str) -> Result<(), LifecycleError> {
        self.transition(RecordStatus::Queued)?;
        self.queue_id = Some(queue_id.to_string());
        self.origin_url = None;
        self.date_queued = Some(unix_timestamp());
        self.date_queued_and_ready = None;
        self.error = None;
        Ok(())
    }

    /// Remote job finished; its result can be downloaded from `origin_url`.
    pub fn set_queued_and_ready(&mut self, origin_url: &str) -> Result<(), LifecycleError> {
        if self.status == RecordStatus::Downloaded {
            return Err(LifecycleError {
                key: self.key.clone(),
                from: self.status,
                to: RecordStatus::QueuedAndReady,
            });
        }
        self.transition(RecordStatus::QueuedAndReady)?;
        self.origin_url = Some(origin_url.to_string());
        self.date_queued_and_ready = Some(unix_timestamp());
        Ok(())
    }

    /// A `downloaded` record whose file vanished goes back to needing a download.
    pub fn demote_stale(&mut self) -> Result<(), LifecycleError> {
        if self.status != RecordStatus::Downloaded {
            return Err(LifecycleError {
                key: self.key.clone(),
                from: self.status,
                to: RecordStatus::QueuedAndReady,
            });
        }
        self.transition(RecordStatus::QueuedAndReady)?;
        self.filepath = None;
        self.size = None;
        Ok(())
    }

    /// Transfer begins. Direct sources pass the URL they resolved; queued sources
    /// pass `None` and reuse the URL captured at completion.
    pub fn set_start(&mut self, origin_url: Option<&str>) -> Result<(), LifecycleError> {
        self.transition(RecordStatus::Downloading)?;
        if let Some(url) = origin_url {
            self.origin_url = Some(url.to_string());
        }
        self.date_start = Some(unix_timestamp());
        self.date_stop = None;
        self.filepath = None;
        self.size = None;
        self.nb_try += 1;
        Ok(())
    }

    /// Transfer complete and file in place.
    pub fn set_downloaded(&mut self, filepath: &Path, size: u64) -> Result<(), LifecycleError> {
        self.transition(RecordStatus::Downloaded)?;
        self.filepath = Some(filepath.to_string_lossy().into_owned());
        self.size = Some(size as i64);
        self.date_stop = Some(unix_timestamp());
        self.error = None;
        Ok(())
    }

    /// Record a failure. A record that is already `failed` (a resubmission that
    /// failed again) keeps its status and only gets the new error text.
    pub fn set_failed(&mut self, error: &str) -> Result<(), LifecycleError> {
        if self.status != RecordStatus::Failed {
            self.transition(RecordStatus::Failed)?;
        }
        self.error = Some(error.to_string());
        self.date_stop = Some(unix_timestamp());
        self.filepath = None;
        self.size = None;
        Ok(())
    }

    /// Count a submission attempt (download attempts are counted by `set_start`).
    pub fn count_try(&mut self) {
        self.nb_try += 1;
    }

    pub fn needs_submission(&self, policy: FailedPolicy) -> bool {
        match self.status {
            RecordStatus::Empty => true,
            RecordStatus::Failed => {
                self.origin_url.is_none() && policy == FailedPolicy::Resubmit
            }
            _ => false,
        }
    }

    pub fn needs_poll(&self) -> bool {
        self.status == RecordStatus::Queued
    }

    /// A resolved URL exists but no confirmed local file. `downloading` counts:
    /// nothing alive is downloading it once we hold the key's lease.
    pub fn needs_download(&self) -> bool {
        matches!(
            self.status,
            RecordStatus::QueuedAndReady | RecordStatus::Downloading | RecordStatus::Failed
        ) && self.origin_url.is_some()
    }

    pub fn satisfaction(&self) -> Satisfaction {
        match (self.status, self.filepath.as_deref()) {
            (RecordStatus::Downloaded, Some(fp)) => {
                let path = PathBuf::from(fp);
                if path.is_file() {
                    Satisfaction::Satisfied(path)
                } else {
                    Satisfaction::Stale(path)
                }
            }
            _ => Satisfaction::Unsatisfied,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self.satisfaction(), Satisfaction::Satisfied(_))
    }
}
