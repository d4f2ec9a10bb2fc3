//! CLI command handlers, one file per command family.

mod fetch;
mod remove;
mod s3_check;
mod status;

pub use fetch::{run_fetch_job, run_fetch_s3, run_fetch_synop, run_fetch_url};
#[cfg(test)]
pub use fetch::job_descriptor;
pub use remove::run_remove;
pub use s3_check::{run_gfs_check, run_s3_check};
pub use status::run_status;
