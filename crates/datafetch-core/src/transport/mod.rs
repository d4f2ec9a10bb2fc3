//! Transport adapters: the only code that talks to the network.
//!
//! The fetch state machine depends on the four small traits below and
//! nothing else; the concrete libcurl-backed adapters (plain HTTP, public S3
//! buckets, the asynchronous job API) live in the submodules. All calls are
//! blocking and are run on tokio's blocking pool by the `Fetcher`.

mod headers;
mod http;
mod job_api;
mod probe;
mod s3;
mod synop;

use std::path::Path;
use std::time::Duration;

use crate::config::HttpConfig;
use crate::control::AbortToken;
use crate::descriptor::ResourceDescriptor;
use crate::retry::{classify_curl_error, classify_http_status, Classify, ErrorKind};

pub use headers::ResponseHeaders;
pub use http::{HttpDownloader, HttpSource};
pub use job_api::JobApiClient;
pub use probe::probe;
pub use s3::{
    era5_object_key, gfs_run_prefix, gfs_timestep_key, S3Bucket, ERA5_BUCKET, GFS_BUCKET,
};
pub use synop::{synop_descriptor, SynopSource, METEOFRANCE_BASE_URL};

/// Registers an asynchronous remote job and returns its tracking id.
pub trait QueueSubmit: Send + Sync {
    fn submit(&self, descriptor: &ResourceDescriptor) -> Result<String, TransportError>;
}

/// Queries the state of a remote job. Should return `Aborted` promptly once `abort` trips.
pub trait PollStatus: Send + Sync {
    fn poll(&self, queue_id: &str, abort: &AbortToken) -> Result<RemoteStatus, TransportError>;
}

/// Transfers bytes from `url` into `tmp_path`; returns the byte count.
/// Must leave a complete file at `tmp_path` on success and stop promptly when `abort` trips.
pub trait DirectDownload: Send + Sync {
    fn download(&self, url: &str, tmp_path: &Path, abort: &AbortToken) -> Result<u64, TransportError>;
}

/// Maps a descriptor straight to a download URL (sources without a job queue).
pub trait ResolveUrl: Send + Sync {
    fn resolve(&self, descriptor: &ResourceDescriptor) -> Result<String, TransportError>;
}

/// Remote job state as reported by a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteState {
    Pending,
    Completed,
    Failed,
    /// A state string the adapter does not know. Fatal for the fetch.
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub state: RemoteState,
    /// Download location once completed.
    pub origin_url: Option<String>,
    /// Remote error text once failed.
    pub error: Option<String>,
}

impl RemoteStatus {
    pub fn pending() -> Self {
        Self {
            state: RemoteState::Pending,
            origin_url: None,
            error: None,
        }
    }

    pub fn completed(origin_url: impl Into<String>) -> Self {
        Self {
            state: RemoteState::Completed,
            origin_url: Some(origin_url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: RemoteState::Failed,
            origin_url: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("curl: {0}")]
    Curl(#[from] curl::Error),
    #[error("HTTP {code}{}", message_suffix(.message))]
    Http { code: u32, message: Option<String> },
    #[error("incomplete transfer: expected {expected} bytes, got {received}")]
    Incomplete { expected: u64, received: u64 },
    #[error("local write failed: {0}")]
    Storage(#[from] std::io::Error),
    #[error("invalid URL {0}")]
    InvalidUrl(String),
    #[error("unexpected reply: {0}")]
    Protocol(String),
    #[error("transfer aborted")]
    Aborted,
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl Classify for TransportError {
    fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Curl(e) => classify_curl_error(e),
            TransportError::Http { code, .. } => classify_http_status(*code),
            TransportError::Incomplete { .. } => ErrorKind::Connection,
            TransportError::Storage(_)
            | TransportError::InvalidUrl(_)
            | TransportError::Protocol(_)
            | TransportError::Aborted => ErrorKind::Other,
        }
    }
}

/// libcurl settings shared by the adapters.
#[derive(Debug, Clone, Copy)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub max_recv_speed: Option<u64>,
}

impl Default for CurlOptions {
    fn default() -> Self {
        CurlOptions::from(&HttpConfig::default())
    }
}

impl From<&HttpConfig> for CurlOptions {
    fn from(cfg: &HttpConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            timeout: Duration::from_secs(cfg.timeout_secs),
            max_recv_speed: cfg.max_recv_speed,
        }
    }
}

impl CurlOptions {
    /// A fresh handle for `url` with redirects, timeouts and stall detection set.
    pub(crate) fn easy(&self, url: &str) -> Result<curl::easy::Easy, TransportError> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url)
            .map_err(|_| TransportError::InvalidUrl(url.to_string()))?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.timeout(self.timeout)?;
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(Duration::from_secs(60))?;
        if let Some(speed) = self.max_recv_speed {
            easy.max_recv_speed(speed)?;
        }
        Ok(easy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_classify() {
        assert_eq!(
            TransportError::Http { code: 503, message: None }.kind(),
            ErrorKind::Throttled
        );
        assert_eq!(
            TransportError::Http { code: 404, message: None }.kind(),
            ErrorKind::Other
        );
        assert_eq!(
            TransportError::Incomplete { expected: 10, received: 3 }.kind(),
            ErrorKind::Connection
        );
        assert_eq!(TransportError::Aborted.kind(), ErrorKind::Other);
    }

    #[test]
    fn http_error_display_includes_message() {
        let e = TransportError::Http {
            code: 401,
            message: Some("bad key".into()),
        };
        assert_eq!(e.to_string(), "HTTP 401: bad key");
        let e = TransportError::Http { code: 500, message: None };
        assert_eq!(e.to_string(), "HTTP 500");
    }
}
