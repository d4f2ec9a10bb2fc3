//! Fetch orchestrator.
//!
//! `Fetcher::fetch` turns a descriptor into a local file: canonical key, then
//! the record's status decides what is left to do (submit, poll, download),
//! each step persisted before the next one starts. Re-running a fetch after a
//! crash, a cancellation or a failure resumes from the last saved status.

mod download;
mod error;
mod options;
mod queue;


use std::sync::Arc;
use std::time::Duration;

use crate::config::DatafetchConfig;
use crate::control::FetchControl;
use crate::descriptor::ResourceDescriptor;
use crate::lifecycle::{FailedPolicy, RecordStatus, Satisfaction};
use crate::record_store::{DownloadRecord, RecordStore};
use crate::transport::{DirectDownload, PollStatus, QueueSubmit, ResolveUrl};

pub use error::FetchError;
pub use options::{FetchOptions, FetchOutcome};

/// How a descriptor reaches a download URL.
#[derive(Clone)]
pub enum Route {
    /// Asynchronous job API: submit, poll until completed, then download.
    Queued {
        submit: Arc<dyn QueueSubmit>,
        poll: Arc<dyn PollStatus>,
    },
    /// The URL is known up front (plain HTTP, public S3).
    Direct(Arc<dyn ResolveUrl>),
}

impl Route {
    fn name(&self) -> &'static str {
        match self {
            Route::Queued { .. } => "queued",
            Route::Direct(_) => "direct",
        }
    }
}

pub struct Fetcher {
    store: RecordStore,
    route: Route,
    downloader: Arc<dyn DirectDownload>,
    control: Arc<FetchControl>,
    failed_policy: FailedPolicy,
    poll_interval: Duration,
    max_poll_tries: u32,
    temp_extension: String,
}

impl Fetcher {
    /// Fetcher over `store` with default settings. The store handle is shared, not owned:
    /// the caller still closes it.
    pub fn new(store: &RecordStore, route: Route, downloader: Arc<dyn DirectDownload>) -> Self {
        let defaults = DatafetchConfig::default();
        Self {
            store: store.clone(),
            route,
            downloader,
            control: Arc::new(FetchControl::new()),
            failed_policy: defaults.failed_policy,
            poll_interval: defaults.poll_interval(),
            max_poll_tries: defaults.max_poll_tries,
            temp_extension: defaults.temp_extension,
        }
    }

    /// Apply the orchestration settings of `cfg` (poll cadence, failed policy, temp extension).
    pub fn with_config(mut self, cfg: &DatafetchConfig) -> Self {
        self.failed_policy = cfg.failed_policy;
        self.poll_interval = cfg.poll_interval();
        self.max_poll_tries = cfg.max_poll_tries;
        self.temp_extension = cfg.temp_extension.clone();
        self
    }

    /// Share leases and abort registrations with other fetchers over the same store.
    pub fn with_control(mut self, control: Arc<FetchControl>) -> Self {
        self.control = control;
        self
    }

    pub fn with_failed_policy(mut self, policy: FailedPolicy) -> Self {
        self.failed_policy = policy;
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_tries: u32) -> Self {
        self.poll_interval = interval;
        self.max_poll_tries = max_tries.max(1);
        self
    }

    pub fn control(&self) -> &Arc<FetchControl> {
        &self.control
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Bring `descriptor` to a local file, doing only the work its record says is missing.
    pub async fn fetch(
        &self,
        descriptor: &ResourceDescriptor,
        opts: &FetchOptions,
    ) -> Result<FetchOutcome, FetchError> {
        let key = descriptor.key();
        let _lease = self.control.acquire(&key).await;
        let _registration = self.control.register(&key, opts.abort.clone());
        let result = self.fetch_locked(&key, descriptor, opts).await;

        match &result {
            Ok(FetchOutcome::Downloaded(path)) => {
                tracing::info!(key = %key, path = %path.display(), "fetch complete")
            }
            Ok(FetchOutcome::Pending { queue_id, .. }) => {
                tracing::info!(key = %key, queue_id = %queue_id, "fetch pending")
            }
            Err(e) => tracing::warn!(key = %key, "fetch failed: {}", e),
        }
        result
    }

    async fn fetch_locked(
        &self,
        key: &str,
        descriptor: &ResourceDescriptor,
        opts: &FetchOptions,
    ) -> Result<FetchOutcome, FetchError> {
        if opts.abort.is_aborted() {
            return Err(FetchError::Cancelled { key: key.to_string() });
        }

        let (mut record, created) = self.store.get_or_create(key).await?;
        if opts.force_new && !created {
            tracing::info!(key, status = %record.status, queue_id = ?record.queue_id, "force_new: discarding record");
            self.store.delete(&record).await?;
            record = self.store.get_or_create(key).await?.0;
        }
        tracing::debug!(key, status = %record.status, route = self.route.name(), created, "record loaded");

        if let Some(path) = self.check_downloaded(&mut record).await? {
            return Ok(FetchOutcome::Downloaded(path));
        }

        let mut resolved_url = None;
        match &self.route {
            Route::Queued { submit, poll } => {
                if record.status == RecordStatus::Failed
                    && record.origin_url.is_none()
                    && self.failed_policy == FailedPolicy::RequireForceNew
                {
                    return Err(stored_failure(&record));
                }
                if record.needs_submission(self.failed_policy) {
                    self.submit_job(&mut record, descriptor, submit).await?;
                }
                if record.needs_poll() {
                    if let Some(pending) = self.poll_job(&mut record, poll, opts).await? {
                        return Ok(pending);
                    }
                }
            }
            Route::Direct(resolver) => {
                if matches!(record.status, RecordStatus::Empty | RecordStatus::Failed) {
                    resolved_url = Some(self.resolve(key, descriptor, resolver).await?);
                }
            }
        }

        if resolved_url.is_some() || record.needs_download() {
            return self.download(&mut record, resolved_url, opts).await;
        }

        Err(FetchError::Resolve {
            key: key.to_string(),
            message: format!("record is {} with no download URL", record.status),
        })
    }

    /// Short-circuit on a satisfied record; demote one whose file vanished.
    async fn check_downloaded(
        &self,
        record: &mut DownloadRecord,
    ) -> Result<Option<std::path::PathBuf>, FetchError> {
        let missing = match record.satisfaction() {
            Satisfaction::Satisfied(path) => {
                tracing::info!(key = %record.key, path = %path.display(), "already downloaded");
                return Ok(Some(path));
            }
            Satisfaction::Stale(path) => path,
            Satisfaction::Unsatisfied if record.status == RecordStatus::Downloaded => {
                std::path::PathBuf::new()
            }
            Satisfaction::Unsatisfied => return Ok(None),
        };

        if record.origin_url.is_none() {
            return Err(FetchError::StaleFile {
                key: record.key.clone(),
                path: missing,
            });
        }
        tracing::warn!(
            key = %record.key,
            path = %missing.display(),
            "recorded file is missing, downloading again"
        );
        record.demote_stale()?;
        self.store.save(record).await?;
        Ok(None)
    }

    async fn resolve(
        &self,
        key: &str,
        descriptor: &ResourceDescriptor,
        resolver: &Arc<dyn ResolveUrl>,
    ) -> Result<String, FetchError> {
        let resolver = Arc::clone(resolver);
        let descriptor = descriptor.clone();
        let url = tokio::task::spawn_blocking(move || resolver.resolve(&descriptor))
            .await
            .map_err(FetchError::join)?
            .map_err(|e| FetchError::Resolve {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!(key, url = %url, "resolved download URL");
        Ok(url)
    }
}

/// The error a `failed` record reports when resubmission needs `force_new`.
fn stored_failure(record: &DownloadRecord) -> FetchError {
    let message = record
        .error
        .clone()
        .unwrap_or_else(|| "previous attempt failed".to_string());
    match &record.queue_id {
        Some(queue_id) => FetchError::RemoteJobFailed {
            key: record.key.clone(),
            queue_id: queue_id.clone(),
            message,
        },
        None => FetchError::Submission {
            key: record.key.clone(),
            message,
        },
    }
}
