//! `datafetch remove <key>` – delete a record; optionally its file with --delete-file.

use anyhow::Result;
use datafetch_core::RecordStore;
use std::path::Path;

pub async fn run_remove(store: &RecordStore, key: &str, delete_file: bool) -> Result<()> {
    let Some(record) = store.get(key).await? else {
        anyhow::bail!("no record with key {}", key);
    };

    if delete_file {
        if let Some(fp) = record.filepath.as_deref() {
            let path = Path::new(fp);
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "deleted file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), "could not delete file: {}", e),
            }
        }
    }

    store.delete(&record).await?;
    tracing::info!(key, status = %record.status, "record removed");
    println!("Removed record {}", record.id);
    Ok(())
}
