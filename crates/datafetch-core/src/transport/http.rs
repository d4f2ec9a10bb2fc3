//! Plain HTTP: single-stream GET downloads and base-URL sources.

use std::path::Path;
use std::str;

use super::headers::ResponseHeaders;
use super::{CurlOptions, DirectDownload, ResolveUrl, TransportError};
use crate::control::AbortToken;
use crate::descriptor::{ParamValue, ResourceDescriptor};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::storage::StorageWriter;
use crate::url_model::join_url;

/// Downloads a URL with one GET into a temp file, retrying transient failures.
#[derive(Debug, Clone, Default)]
pub struct HttpDownloader {
    pub curl: CurlOptions,
    pub retry: RetryPolicy,
}

impl HttpDownloader {
    pub fn new(curl: CurlOptions, retry: RetryPolicy) -> Self {
        Self { curl, retry }
    }

    fn attempt(
        &self,
        url: &str,
        writer: &mut StorageWriter,
        abort: &AbortToken,
    ) -> Result<u64, TransportError> {
        writer.reset()?;
        let mut lines: Vec<String> = Vec::new();
        let mut write_err: Option<std::io::Error> = None;

        let mut easy = self.curl.easy(url)?;
        easy.progress(true)?;
        let performed = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    lines.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                if abort.is_aborted() {
                    return Ok(0);
                }
                match writer.write_chunk(data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        write_err = Some(e);
                        Ok(0) // abort transfer
                    }
                }
            })?;
            transfer.progress_function(|_, _, _, _| !abort.is_aborted())?;
            transfer.perform()
        };

        if abort.is_aborted() {
            return Err(TransportError::Aborted);
        }
        if let Some(e) = write_err {
            return Err(TransportError::Storage(e));
        }
        performed?;

        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            return Err(TransportError::Http {
                code,
                message: None,
            });
        }

        let headers = ResponseHeaders::parse(lines.iter().map(String::as_str));
        let received = writer.written();
        if let Some(expected) = headers.content_length {
            if received != expected {
                return Err(TransportError::Incomplete { expected, received });
            }
        }
        writer.sync()?;
        Ok(received)
    }
}

impl DirectDownload for HttpDownloader {
    fn download(&self, url: &str, tmp_path: &Path, abort: &AbortToken) -> Result<u64, TransportError> {
        tracing::info!(url, tmp = %tmp_path.display(), "GET");
        let mut writer = StorageWriter::create(tmp_path)?;
        let written = run_with_retry(&self.retry, abort, |attempt| {
            if attempt > 1 {
                tracing::debug!(url, attempt, "retrying GET");
            }
            self.attempt(url, &mut writer, abort)
        })?;
        tracing::debug!(url, bytes = written, "GET complete");
        Ok(written)
    }
}

/// Resolves descriptors against an optional base URL.
///
/// The descriptor name is a full URL, or a suffix joined onto the base;
/// params become query pairs, lists as repeated keys. Build descriptors with
/// [`HttpSource::descriptor`] so the base ends up in the record key.
#[derive(Debug, Clone, Default)]
pub struct HttpSource {
    pub base_url: Option<String>,
}

impl HttpSource {
    pub fn new(base_url: Option<String>) -> Self {
        Self { base_url }
    }

    /// Descriptor named by the full URL of `url_or_suffix`, so equal
    /// suffixes under different bases never share a record.
    pub fn descriptor(&self, url_or_suffix: &str) -> Result<ResourceDescriptor, TransportError> {
        Ok(ResourceDescriptor::new(self.join(url_or_suffix)?))
    }

    fn join(&self, url_or_suffix: &str) -> Result<String, TransportError> {
        if url::Url::parse(url_or_suffix).is_ok() {
            return Ok(url_or_suffix.to_string());
        }
        join_url(self.base_url.as_deref(), Some(url_or_suffix))
            .ok_or_else(|| TransportError::InvalidUrl(url_or_suffix.to_string()))
    }
}

impl ResolveUrl for HttpSource {
    fn resolve(&self, descriptor: &ResourceDescriptor) -> Result<String, TransportError> {
        let joined = self.join(&descriptor.name)?;
        let mut url = url::Url::parse(&joined).map_err(|_| TransportError::InvalidUrl(joined.clone()))?;
        if !descriptor.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &descriptor.params {
                match v {
                    ParamValue::One(s) => {
                        pairs.append_pair(k, &s.to_string());
                    }
                    ParamValue::Many(list) => {
                        for s in list {
                            pairs.append_pair(k, &s.to_string());
                        }
                    }
                }
            }
        }
        Ok(url.to_string())
    }
}
