//! `datafetch status` – show all download records.

use anyhow::Result;
use datafetch_core::RecordStore;

pub async fn run_status(store: &RecordStore, full_keys: bool) -> Result<()> {
    let records = store.list().await?;
    if records.is_empty() {
        println!("No records in database.");
        return Ok(());
    }
    println!(
        "{:<6} {:<17} {:<14} {:<10} {:<4} {}",
        "ID", "STATUS", "QUEUE_ID", "SIZE", "TRY", "FILE"
    );
    for r in records {
        let size = r
            .size
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let target = r
            .filepath
            .as_deref()
            .or(r.origin_url.as_deref())
            .unwrap_or("-");
        println!(
            "{:<6} {:<17} {:<14} {:<10} {:<4} {}",
            r.id,
            r.status,
            r.queue_id.as_deref().unwrap_or("-"),
            size,
            r.nb_try,
            target
        );
        if let Some(err) = &r.error {
            println!("       error: {}", err);
        }
        if full_keys {
            println!("       key: {}", r.key);
        }
    }
    Ok(())
}
