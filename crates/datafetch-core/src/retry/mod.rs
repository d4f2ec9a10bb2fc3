//! Retry and backoff policy for transport-level network calls.
//!
//! Adapters classify their failures (timeouts, throttling, connection
//! errors) into an `ErrorKind`; the policy turns that into a backoff
//! decision. The fetch state machine never retries on its own: this only
//! smooths over transient network errors inside a single transfer.

mod classify;
mod policy;
mod run;

pub use classify::{classify_curl_error, classify_http_status, Classify};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
