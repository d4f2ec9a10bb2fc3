//! Download step shared by both routes.

use std::path::PathBuf;
use std::sync::Arc;

use super::{FetchError, FetchOptions, FetchOutcome, Fetcher};
use crate::record_store::DownloadRecord;
use crate::storage;
use crate::transport::TransportError;
use crate::url_model::derive_filename;

impl Fetcher {
    /// Transfer into `<final>.<temp_extension>`, then rename onto the final path.
    /// `resolved_url` is set for direct sources whose URL was just resolved; otherwise
    /// the record's `origin_url` is used.
    pub(super) async fn download(
        &self,
        record: &mut DownloadRecord,
        resolved_url: Option<String>,
        opts: &FetchOptions,
    ) -> Result<FetchOutcome, FetchError> {
        let key = record.key.clone();
        let url = resolved_url
            .clone()
            .or_else(|| record.origin_url.clone())
            .ok_or_else(|| FetchError::Resolve {
                key: key.clone(),
                message: "no download URL recorded".to_string(),
            })?;

        let dir = destination_dir(opts)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| FetchError::io(format!("create {}", dir.display()), e))?;
        let filename = opts
            .destination_filename
            .clone()
            .unwrap_or_else(|| derive_filename(&url));
        let final_path = dir.join(filename);
        let tmp_path = storage::temp_path(&final_path, &self.temp_extension);

        record.set_start(resolved_url.as_deref())?;
        self.store.save(record).await?;
        tracing::info!(
            key = %key,
            url = %url,
            dest = %final_path.display(),
            nb_try = record.nb_try,
            "download started"
        );

        let downloader = Arc::clone(&self.downloader);
        let (task_url, task_tmp, abort) = (url.clone(), tmp_path.clone(), opts.abort.clone());
        let transferred =
            tokio::task::spawn_blocking(move || downloader.download(&task_url, &task_tmp, &abort))
                .await;
        let transferred = match transferred {
            Ok(r) => r,
            Err(e) => {
                storage::discard(&tmp_path);
                return Err(FetchError::join(e));
            }
        };

        match transferred {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
                    storage::discard(&tmp_path);
                    let err = FetchError::io(
                        format!("rename {} to {}", tmp_path.display(), final_path.display()),
                        e,
                    );
                    record.set_failed(&err.to_string())?;
                    self.store.save(record).await?;
                    return Err(err);
                }
                let size = tokio::fs::metadata(&final_path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(bytes);
                record.set_downloaded(&final_path, size)?;
                self.store.save(record).await?;
                tracing::info!(key = %key, path = %final_path.display(), size, "downloaded");
                Ok(FetchOutcome::Downloaded(final_path))
            }
            Err(e) if matches!(e, TransportError::Aborted) || opts.abort.is_aborted() => {
                storage::discard(&tmp_path);
                tracing::warn!(key = %key, url = %url, "download cancelled");
                Err(FetchError::Cancelled { key })
            }
            Err(source) => {
                storage::discard(&tmp_path);
                record.set_failed(&source.to_string())?;
                self.store.save(record).await?;
                Err(FetchError::Transfer { key, url, source })
            }
        }
    }
}

/// Relative destinations are anchored at the current directory so the stored
/// filepath stays valid from anywhere.
fn destination_dir(opts: &FetchOptions) -> Result<PathBuf, FetchError> {
    if opts.destination_dir.is_absolute() {
        return Ok(opts.destination_dir.clone());
    }
    let cwd = std::env::current_dir().map_err(|e| FetchError::io("current directory", e))?;
    Ok(cwd.join(&opts.destination_dir))
}
