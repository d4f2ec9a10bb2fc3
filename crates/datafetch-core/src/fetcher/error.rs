use std::path::PathBuf;

use crate::lifecycle::LifecycleError;
use crate::record_store::StoreError;
use crate::transport::TransportError;

/// Failure of one `fetch` call. The record has been persisted in the state the
/// variant describes before it is returned.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The remote job could not be created; the record is `failed`.
    #[error("job submission failed: {message}")]
    Submission { key: String, message: String },

    /// Unknown remote state, or a completed job without a location. Record untouched.
    #[error("protocol error polling job {queue_id}: {message}")]
    PollProtocol {
        key: String,
        queue_id: String,
        message: String,
    },

    #[error("remote job {queue_id} failed: {message}")]
    RemoteJobFailed {
        key: String,
        queue_id: String,
        message: String,
    },

    /// Download failed; the record is `failed` and the temp file is gone.
    #[error("download of {url} failed: {source}")]
    Transfer {
        key: String,
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("record store: {0}")]
    Storage(#[from] StoreError),

    #[error("recorded file {} no longer exists and no download URL is known", .path.display())]
    StaleFile { key: String, path: PathBuf },

    /// Network failure while polling. Record untouched.
    #[error("polling job {queue_id} failed: {source}")]
    Poll {
        key: String,
        queue_id: String,
        #[source]
        source: TransportError,
    },

    #[error("fetch cancelled")]
    Cancelled { key: String },

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot resolve a download URL: {message}")]
    Resolve { key: String, message: String },
}

impl FetchError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        FetchError::Io {
            context: context.into(),
            source,
        }
    }

    /// A blocking transport task panicked or was cancelled by the runtime.
    pub(crate) fn join(err: tokio::task::JoinError) -> Self {
        FetchError::io("transport task", std::io::Error::other(err.to_string()))
    }

    /// Whether retrying the same `fetch` later may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Transfer { .. } | FetchError::Poll { .. } | FetchError::Cancelled { .. }
        )
    }
}
