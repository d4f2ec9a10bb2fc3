//! Disk side of a transfer: temp file naming, buffered writes, durable sync.
//!
//! Bytes land in `<final>.<ext>`; the fetcher renames the temp onto the final
//! path only once the transfer finished cleanly, so a file at the final path
//! is always complete.

mod writer;

pub use writer::StorageWriter;

/// Temp file path: appends `.<ext>` to the final path (`file.nc` → `file.nc.tmp`).
/// An empty extension falls back to `part` so the temp never aliases the final path.
pub fn temp_path(final_path: &std::path::Path, ext: &str) -> std::path::PathBuf {
    let ext = ext.trim_start_matches('.');
    let ext = if ext.is_empty() { "part" } else { ext };
    let mut o = final_path.as_os_str().to_owned();
    o.push(".");
    o.push(ext);
    std::path::PathBuf::from(o)
}

/// Best-effort removal of a leftover temp file.
pub fn discard(temp_path: &std::path::Path) {
    match std::fs::remove_file(temp_path) {
        Ok(()) => tracing::debug!(path = %temp_path.display(), "removed temp file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %temp_path.display(), "could not remove temp file: {}", e),
    }
}
