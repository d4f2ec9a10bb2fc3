//! Client for the asynchronous job API.
//!
//! A job is created with `POST {url}/resources/{name}` (JSON params, basic
//! auth `uid:key`) and tracked with `GET {url}/tasks/{request_id}`. Replies
//! share one shape:
//!
//! ```json
//! {"state": "completed", "request_id": "Q1", "location": "http://host/f"}
//! {"state": "failed", "request_id": "Q1", "error": {"message": "..", "reason": ".."}}
//! ```

use serde::Deserialize;

use super::{CurlOptions, PollStatus, QueueSubmit, RemoteState, RemoteStatus, TransportError};
use crate::config::JobApiConfig;
use crate::control::AbortToken;
use crate::descriptor::ResourceDescriptor;
use crate::retry::{run_with_retry, RetryPolicy};

#[derive(Clone)]
pub struct JobApiClient {
    pub url: String,
    pub uid: Option<String>,
    pub key: Option<String>,
    pub curl: CurlOptions,
    /// Applied to polls only; a POST that reached the server may have created a job.
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for JobApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobApiClient")
            .field("url", &self.url)
            .field("uid", &self.uid)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TaskReply {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    error: Option<TaskError>,
}

#[derive(Debug, Deserialize)]
struct TaskError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl TaskError {
    fn joined(&self) -> String {
        match (self.message.as_deref(), self.reason.as_deref()) {
            (Some(m), Some(r)) => format!("{m}: {r}"),
            (Some(m), None) => m.to_string(),
            (None, Some(r)) => r.to_string(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

impl TaskReply {
    fn into_status(self) -> RemoteStatus {
        let state = self.state.unwrap_or_default();
        match state.as_str() {
            "queued" | "running" => RemoteStatus::pending(),
            "completed" => RemoteStatus {
                state: RemoteState::Completed,
                origin_url: self.location,
                error: None,
            },
            "failed" => RemoteStatus::failed(
                self.error
                    .as_ref()
                    .map(TaskError::joined)
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
            _ => RemoteStatus {
                state: RemoteState::Unrecognized(state),
                origin_url: None,
                error: None,
            },
        }
    }
}

/// Best-effort error text from a non-2xx body: `{"message"}`, `{"error": {...}}` or raw text.
fn error_message(body: &[u8]) -> Option<String> {
    if let Ok(v) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(m) = v.get("message").and_then(|m| m.as_str()) {
            return Some(m.to_string());
        }
        if let Some(e) = v.get("error") {
            if let Ok(e) = serde_json::from_value::<TaskError>(e.clone()) {
                return Some(e.joined());
            }
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    (!text.is_empty()).then(|| text.chars().take(200).collect())
}

impl JobApiClient {
    pub fn new(cfg: &JobApiConfig, curl: CurlOptions, retry: RetryPolicy) -> Self {
        Self {
            url: cfg.url.trim_end_matches('/').to_string(),
            uid: cfg.uid.clone(),
            key: cfg.key.clone(),
            curl,
            retry,
        }
    }

    /// `{url}/{segments..}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<String, TransportError> {
        let mut url =
            url::Url::parse(&self.url).map_err(|_| TransportError::InvalidUrl(self.url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.to_string())
    }

    /// One request; returns the parsed reply of a 2xx response.
    fn call(
        &self,
        url: &str,
        post_body: Option<&[u8]>,
        abort: &AbortToken,
    ) -> Result<TaskReply, TransportError> {
        let mut body: Vec<u8> = Vec::new();
        let mut easy = self.curl.easy(url)?;
        easy.progress(true)?;

        let mut headers = curl::easy::List::new();
        headers.append("Accept: application/json")?;
        if let Some(data) = post_body {
            headers.append("Content-Type: application/json")?;
            easy.post(true)?;
            easy.post_fields_copy(data)?;
        }
        easy.http_headers(headers)?;

        if let (Some(uid), Some(key)) = (self.uid.as_deref(), self.key.as_deref()) {
            let mut auth = curl::easy::Auth::new();
            auth.basic(true);
            easy.http_auth(&auth)?;
            easy.username(uid)?;
            easy.password(key)?;
        }

        let performed = {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.progress_function(|_, _, _, _| !abort.is_aborted())?;
            transfer.perform()
        };
        if abort.is_aborted() {
            return Err(TransportError::Aborted);
        }
        performed?;

        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            return Err(TransportError::Http {
                code,
                message: error_message(&body),
            });
        }
        serde_json::from_slice(&body)
            .map_err(|e| TransportError::Protocol(format!("invalid JSON from {}: {}", url, e)))
    }
}

impl QueueSubmit for JobApiClient {
    fn submit(&self, descriptor: &ResourceDescriptor) -> Result<String, TransportError> {
        let url = self.endpoint(&["resources", descriptor.name.as_str()])?;
        let payload = serde_json::to_vec(&descriptor.params_json())
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        tracing::info!(url = %url, resource = %descriptor.name, "submitting job");

        let reply = self.call(&url, Some(&payload), &AbortToken::new())?;
        if reply.state.as_deref() == Some("failed") {
            let msg = reply.error.as_ref().map(TaskError::joined).unwrap_or_default();
            return Err(TransportError::Protocol(format!("job rejected: {msg}")));
        }
        let request_id = reply
            .request_id
            .ok_or_else(|| TransportError::Protocol("reply has no request_id".to_string()))?;
        tracing::info!(queue_id = %request_id, state = ?reply.state, "job accepted");
        Ok(request_id)
    }
}

impl PollStatus for JobApiClient {
    fn poll(&self, queue_id: &str, abort: &AbortToken) -> Result<RemoteStatus, TransportError> {
        let url = self.endpoint(&["tasks", queue_id])?;
        let reply = run_with_retry(&self.retry, abort, |_| self.call(&url, None, abort))?;
        let status = reply.into_status();
        tracing::debug!(queue_id, state = ?status.state, "polled job");
        Ok(status)
    }
}
