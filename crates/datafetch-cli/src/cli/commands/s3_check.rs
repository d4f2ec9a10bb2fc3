//! `datafetch s3-check <object-key> --bucket B` and `datafetch gfs-check <day> <run>`.

use anyhow::{Context, Result};
use datafetch_core::config::DatafetchConfig;
use datafetch_core::transport::{gfs_run_prefix, gfs_timestep_key, CurlOptions, S3Bucket, GFS_BUCKET};

fn s3_bucket(cfg: &DatafetchConfig, name: &str, endpoint: Option<&str>) -> S3Bucket {
    let mut s3 = S3Bucket::new(name).with_curl(CurlOptions::from(&cfg.http));
    if let Some(endpoint) = endpoint {
        s3 = s3.with_endpoint(endpoint);
    }
    s3
}

pub async fn run_s3_check(
    cfg: &DatafetchConfig,
    object_key: &str,
    bucket: &str,
    endpoint: Option<&str>,
) -> Result<()> {
    let s3 = s3_bucket(cfg, bucket, endpoint);
    let url = s3.object_url(object_key)?;
    let key = object_key.to_string();
    let available = tokio::task::spawn_blocking(move || s3.object_available(&key))
        .await
        .context("probe task join")?
        .with_context(|| format!("HEAD {}", url))?;

    if available {
        println!("available: {}", url);
    } else {
        println!("not available: {}", url);
    }
    Ok(())
}

pub async fn run_gfs_check(
    cfg: &DatafetchConfig,
    date_day: &str,
    run: u32,
    timestep: Option<u32>,
    endpoint: Option<&str>,
) -> Result<()> {
    let s3 = s3_bucket(cfg, GFS_BUCKET, endpoint);
    let label = match timestep {
        Some(ts) => gfs_timestep_key(date_day, run, ts),
        None => gfs_run_prefix(date_day, run),
    };
    let day = date_day.to_string();
    let available = tokio::task::spawn_blocking(move || match timestep {
        Some(ts) => s3.gfs_timestep_available(&day, run, ts),
        None => s3.gfs_run_available(&day, run),
    })
    .await
    .context("probe task join")?
    .with_context(|| format!("check {}", label))?;

    if available {
        println!("available: {}", label);
    } else {
        println!("not available yet: {}", label);
    }
    Ok(())
}
