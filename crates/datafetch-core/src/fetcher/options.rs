use std::path::{Path, PathBuf};

use crate::control::AbortToken;
use crate::transport::RemoteState;

/// Per-call options of `Fetcher::fetch`.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Created if missing.
    pub destination_dir: PathBuf,
    /// Defaults to the last path segment of the download URL.
    pub destination_filename: Option<String>,
    /// Poll until the remote job completes (bounded by `max_poll_tries`) instead of once.
    pub wait_until_complete: bool,
    /// Discard the existing record and start from scratch.
    pub force_new: bool,
    pub abort: AbortToken,
}

impl FetchOptions {
    pub fn new(destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            destination_dir: destination_dir.into(),
            destination_filename: None,
            wait_until_complete: false,
            force_new: false,
            abort: AbortToken::new(),
        }
    }

    pub fn filename(mut self, name: impl Into<String>) -> Self {
        self.destination_filename = Some(name.into());
        self
    }

    pub fn wait_until_complete(mut self, wait: bool) -> Self {
        self.wait_until_complete = wait;
        self
    }

    pub fn force_new(mut self, force: bool) -> Self {
        self.force_new = force;
        self
    }

    pub fn abort_token(mut self, token: AbortToken) -> Self {
        self.abort = token;
        self
    }
}

/// Result of a `fetch` call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The artifact is on disk at this path.
    Downloaded(PathBuf),
    /// The remote job has not completed yet; call `fetch` again later.
    Pending { queue_id: String, state: RemoteState },
}

impl FetchOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            FetchOutcome::Downloaded(p) => Some(p),
            FetchOutcome::Pending { .. } => None,
        }
    }

    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            FetchOutcome::Downloaded(p) => Some(p),
            FetchOutcome::Pending { .. } => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, FetchOutcome::Pending { .. })
    }
}
