//! CLI for datafetch.

mod commands;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use datafetch_core::config::{self, DatafetchConfig};
use datafetch_core::RecordStore;
use std::path::PathBuf;

use commands::{
    run_fetch_job, run_fetch_s3, run_fetch_synop, run_fetch_url, run_gfs_check, run_remove,
    run_s3_check, run_status,
};

/// Top-level CLI for datafetch.
#[derive(Debug, Parser)]
#[command(name = "datafetch")]
#[command(about = "datafetch: idempotent, resumable fetching of remote data artifacts", long_about = None)]
pub struct Cli {
    /// Debug logging for dependencies too (RUST_LOG still wins).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Where a fetched file goes and whether to start over.
#[derive(Debug, Clone, Args)]
pub struct DestArgs {
    /// Destination directory (default: current directory).
    #[arg(long, value_name = "DIR")]
    pub dest_dir: Option<PathBuf>,

    /// Destination filename (default: last segment of the download URL).
    #[arg(long, value_name = "NAME")]
    pub filename: Option<String>,

    /// Discard the stored record for this resource and fetch from scratch.
    #[arg(long)]
    pub force_new: bool,

    /// Cancel the fetch after this many seconds; the record keeps its last saved state.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a URL (or a path under --base-url).
    FetchUrl {
        /// Full URL, or a path relative to --base-url.
        url: String,
        #[arg(long)]
        base_url: Option<String>,
        #[command(flatten)]
        dest: DestArgs,
    },

    /// Download an object from a public S3 bucket.
    FetchS3 {
        /// Object key inside the bucket.
        object_key: String,
        #[arg(long)]
        bucket: String,
        /// S3 endpoint (default: https://s3.amazonaws.com).
        #[arg(long)]
        endpoint: Option<String>,
        #[command(flatten)]
        dest: DestArgs,
    },

    /// Submit (or resume) a job on the asynchronous job API and download its result.
    FetchJob {
        /// Resource name on the job API.
        name: String,
        /// Request parameter; repeat a key to build a list.
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// Request parameters as a JSON object; --param entries override its keys.
        #[arg(long, value_name = "JSON")]
        params_json: Option<String>,
        /// Poll until the job completes (bounded by max_poll_tries) instead of polling once.
        #[arg(long)]
        wait: bool,
        #[command(flatten)]
        dest: DestArgs,
    },

    /// Download a MeteoFrance SYNOP observation bulletin.
    FetchSynop {
        /// Synoptic time, YYYYMMDDHH (e.g. 2021020812).
        datetime_ref: String,
        /// Open-data base URL (default: MeteoFrance public data).
        #[arg(long)]
        base_url: Option<String>,
        #[command(flatten)]
        dest: DestArgs,
    },

    /// Check whether a NOAA GFS run (or one of its forecast steps) is published.
    GfsCheck {
        /// Run day, YYYYMMDD.
        date_day: String,
        /// Run hour: 0, 6, 12 or 18.
        #[arg(value_parser = parse_gfs_run)]
        run: u32,
        /// Forecast step in hours (default: the run itself, via its analysis step).
        #[arg(long)]
        timestep: Option<u32>,
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Check whether an S3 object exists.
    S3Check {
        object_key: String,
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Show all download records.
    Status {
        /// Print full record keys (needed for `remove`).
        #[arg(long)]
        keys: bool,
    },

    /// Delete a download record so the next fetch starts over.
    Remove {
        /// Record key, as printed by `status --keys`.
        key: String,
        /// Also delete the downloaded file, if any.
        #[arg(long)]
        delete_file: bool,
    },
}

/// `KEY=VALUE` for `--param`.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", s)),
    }
}

/// GFS runs start every six hours.
fn parse_gfs_run(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(run @ (0 | 6 | 12 | 18)) => Ok(run),
        _ => Err(format!("run must be 0, 6, 12 or 18, got {:?}", s)),
    }
}

async fn open_store(cfg: &DatafetchConfig) -> Result<RecordStore> {
    let store = match &cfg.db_path {
        Some(path) => RecordStore::open_at(path)
            .await
            .with_context(|| format!("open record database {}", path.display()))?,
        None => RecordStore::open_default()
            .await
            .context("open record database")?,
    };
    Ok(store)
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        // Probing S3 needs no record store.
        if let CliCommand::S3Check {
            object_key,
            bucket,
            endpoint,
        } = &self.command
        {
            return run_s3_check(&cfg, object_key, bucket, endpoint.as_deref()).await;
        }
        if let CliCommand::GfsCheck {
            date_day,
            run,
            timestep,
            endpoint,
        } = &self.command
        {
            return run_gfs_check(&cfg, date_day, *run, *timestep, endpoint.as_deref()).await;
        }

        let store = open_store(&cfg).await?;
        let result = match self.command {
            CliCommand::FetchUrl {
                url,
                base_url,
                dest,
            } => run_fetch_url(&store, &cfg, &url, base_url, &dest).await,
            CliCommand::FetchS3 {
                object_key,
                bucket,
                endpoint,
                dest,
            } => run_fetch_s3(&store, &cfg, &object_key, bucket, endpoint, &dest).await,
            CliCommand::FetchSynop {
                datetime_ref,
                base_url,
                dest,
            } => run_fetch_synop(&store, &cfg, &datetime_ref, base_url, &dest).await,
            CliCommand::FetchJob {
                name,
                params,
                params_json,
                wait,
                dest,
            } => {
                run_fetch_job(&store, &cfg, &name, &params, params_json.as_deref(), wait, &dest)
                    .await
            }
            CliCommand::Status { keys } => run_status(&store, keys).await,
            CliCommand::Remove { key, delete_file } => run_remove(&store, &key, delete_file).await,
            CliCommand::S3Check { .. } | CliCommand::GfsCheck { .. } => Ok(()),
        };
        store.close().await;
        result
    }
}

#[cfg(test)]
mod tests;
