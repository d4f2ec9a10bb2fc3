//! Persistent download-record store (SQLite via sqlx).
//!
//! One row per resource key holding its lifecycle status, remote queue id,
//! resolved download URL, local file and phase timestamps, so repeated runs
//! skip work that is already done.

mod db;
mod records;
mod types;

pub use db::{RecordStore, StoreError};
pub(crate) use db::unix_timestamp;
pub use types::DownloadRecord;

#[cfg(test)]
pub(crate) use db::open_memory;
