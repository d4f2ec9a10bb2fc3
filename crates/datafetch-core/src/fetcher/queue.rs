//! Submit and poll steps of the queued route.

use std::sync::Arc;

use super::{FetchError, FetchOptions, FetchOutcome, Fetcher};
use crate::descriptor::ResourceDescriptor;
use crate::record_store::DownloadRecord;
use crate::transport::{PollStatus, QueueSubmit, RemoteState, TransportError};

impl Fetcher {
    /// One submission. Never retried here: a failure is persisted and returned.
    pub(super) async fn submit_job(
        &self,
        record: &mut DownloadRecord,
        descriptor: &ResourceDescriptor,
        submit: &Arc<dyn QueueSubmit>,
    ) -> Result<(), FetchError> {
        let submitter = Arc::clone(submit);
        let request = descriptor.clone();
        let reply = tokio::task::spawn_blocking(move || submitter.submit(&request))
            .await
            .map_err(FetchError::join)?;

        record.count_try();
        match reply {
            Ok(queue_id) => {
                record.set_queued(&queue_id)?;
                self.store.save(record).await?;
                tracing::info!(key = %record.key, queue_id = %queue_id, nb_try = record.nb_try, "job queued");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                record.set_failed(&message)?;
                self.store.save(record).await?;
                tracing::warn!(key = %record.key, "job submission failed: {}", message);
                Err(FetchError::Submission {
                    key: record.key.clone(),
                    message,
                })
            }
        }
    }

    /// Poll once, or up to `max_poll_tries` times when waiting. Returns
    /// `Some(Pending)` if the job is still running, `None` once the record is
    /// `queued_and_ready`.
    pub(super) async fn poll_job(
        &self,
        record: &mut DownloadRecord,
        poll: &Arc<dyn PollStatus>,
        opts: &FetchOptions,
    ) -> Result<Option<FetchOutcome>, FetchError> {
        let key = record.key.clone();
        let queue_id = record.queue_id.clone().ok_or_else(|| FetchError::PollProtocol {
            key: key.clone(),
            queue_id: String::new(),
            message: "queued record has no queue id".to_string(),
        })?;
        let max_tries = if opts.wait_until_complete {
            self.max_poll_tries.max(1)
        } else {
            1
        };

        for attempt in 1..=max_tries {
            if attempt > 1 {
                opts.abort
                    .sleep(self.poll_interval)
                    .await
                    .map_err(|_| FetchError::Cancelled { key: key.clone() })?;
            }

            let poller = Arc::clone(poll);
            let id = queue_id.clone();
            let abort = opts.abort.clone();
            let handle = tokio::task::spawn_blocking(move || poller.poll(&id, &abort));
            // An adapter stuck in a blocking call must not hold the fetch past its token.
            let reply = tokio::select! {
                joined = handle => joined.map_err(FetchError::join)?,
                _ = opts.abort.cancelled() => Err(TransportError::Aborted),
            };
            let status = match reply {
                Ok(status) => status,
                Err(TransportError::Aborted) => {
                    tracing::info!(key = %key, queue_id = %queue_id, "poll cancelled");
                    return Err(FetchError::Cancelled { key });
                }
                Err(source) => {
                    return Err(FetchError::Poll {
                        key,
                        queue_id,
                        source,
                    })
                }
            };

            match status.state {
                RemoteState::Pending => {
                    tracing::debug!(key = %key, queue_id = %queue_id, attempt, max_tries, "job pending");
                }
                RemoteState::Completed => {
                    let origin_url = status.origin_url.ok_or_else(|| FetchError::PollProtocol {
                        key: key.clone(),
                        queue_id: queue_id.clone(),
                        message: "completed job has no location".to_string(),
                    })?;
                    record.set_queued_and_ready(&origin_url)?;
                    self.store.save(record).await?;
                    tracing::info!(key = %key, queue_id = %queue_id, url = %origin_url, "job ready");
                    return Ok(None);
                }
                RemoteState::Failed => {
                    let message = status
                        .error
                        .unwrap_or_else(|| "remote job failed".to_string());
                    record.set_failed(&message)?;
                    self.store.save(record).await?;
                    return Err(FetchError::RemoteJobFailed {
                        key,
                        queue_id,
                        message,
                    });
                }
                RemoteState::Unrecognized(raw) => {
                    return Err(FetchError::PollProtocol {
                        key,
                        queue_id,
                        message: format!("unrecognized remote state {:?}", raw),
                    });
                }
            }
        }

        if opts.wait_until_complete {
            tracing::info!(key = %key, queue_id = %queue_id, max_tries, "job still pending after poll limit");
        }
        Ok(Some(FetchOutcome::Pending {
            queue_id,
            state: RemoteState::Pending,
        }))
    }
}
