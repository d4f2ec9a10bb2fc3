//! `datafetch fetch-url`, `fetch-s3`, `fetch-synop` and `fetch-job`.

use anyhow::{Context, Result};
use datafetch_core::config::DatafetchConfig;
use datafetch_core::transport::{
    synop_descriptor, CurlOptions, HttpDownloader, HttpSource, JobApiClient, S3Bucket, SynopSource,
};
use datafetch_core::{
    FetchOptions, FetchOutcome, Fetcher, ParamValue, RecordStore, ResourceDescriptor, Route, Scalar,
};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::DestArgs;

fn downloader(cfg: &DatafetchConfig) -> Arc<HttpDownloader> {
    Arc::new(HttpDownloader::new(
        CurlOptions::from(&cfg.http),
        cfg.retry_policy(),
    ))
}

fn fetch_options(dest: &DestArgs, wait: bool) -> Result<FetchOptions> {
    let dir = match &dest.dest_dir {
        Some(d) => d.clone(),
        None => std::env::current_dir().context("current directory")?,
    };
    let mut opts = FetchOptions::new(dir)
        .wait_until_complete(wait)
        .force_new(dest.force_new);
    if let Some(name) = &dest.filename {
        opts = opts.filename(name.clone());
    }
    Ok(opts)
}

/// Run the fetch, with `--timeout` turned into a cancellation, and print the outcome.
async fn fetch_and_report(
    fetcher: Fetcher,
    descriptor: &ResourceDescriptor,
    dest: &DestArgs,
    wait: bool,
) -> Result<()> {
    let opts = fetch_options(dest, wait)?;
    let timer = dest
        .timeout
        .map(|secs| opts.abort.cancel_after(Duration::from_secs(secs)));
    let outcome = fetcher.fetch(descriptor, &opts).await;
    if let Some(timer) = timer {
        timer.abort();
    }

    match outcome.with_context(|| format!("fetch {}", descriptor))? {
        FetchOutcome::Downloaded(path) => println!("{}", path.display()),
        FetchOutcome::Pending { queue_id, state } => {
            println!("pending: job {} is {:?}; run the same command again later", queue_id, state)
        }
    }
    Ok(())
}

pub async fn run_fetch_url(
    store: &RecordStore,
    cfg: &DatafetchConfig,
    url: &str,
    base_url: Option<String>,
    dest: &DestArgs,
) -> Result<()> {
    let source = HttpSource::new(base_url);
    let descriptor = source
        .descriptor(url)
        .with_context(|| format!("cannot build a URL from {:?}", url))?;
    let fetcher = Fetcher::new(store, Route::Direct(Arc::new(source)), downloader(cfg)).with_config(cfg);
    fetch_and_report(fetcher, &descriptor, dest, false).await
}

pub async fn run_fetch_s3(
    store: &RecordStore,
    cfg: &DatafetchConfig,
    object_key: &str,
    bucket: String,
    endpoint: Option<String>,
    dest: &DestArgs,
) -> Result<()> {
    let mut s3 = S3Bucket::new(bucket).with_curl(CurlOptions::from(&cfg.http));
    if let Some(endpoint) = endpoint {
        s3 = s3.with_endpoint(endpoint);
    }
    // The bucket is part of the key so equal object keys in two buckets stay distinct.
    let descriptor = ResourceDescriptor::new(object_key).param("bucket", s3.bucket.clone());
    let fetcher = Fetcher::new(store, Route::Direct(Arc::new(s3)), downloader(cfg)).with_config(cfg);
    fetch_and_report(fetcher, &descriptor, dest, false).await
}

pub async fn run_fetch_synop(
    store: &RecordStore,
    cfg: &DatafetchConfig,
    datetime_ref: &str,
    base_url: Option<String>,
    dest: &DestArgs,
) -> Result<()> {
    let mut descriptor = synop_descriptor(datetime_ref);
    let source = match base_url {
        Some(base) => {
            descriptor = descriptor.param("base_url", base.clone());
            SynopSource::with_base_url(base)
        }
        None => SynopSource::default(),
    };
    let fetcher = Fetcher::new(store, Route::Direct(Arc::new(source)), downloader(cfg)).with_config(cfg);
    fetch_and_report(fetcher, &descriptor, dest, false).await
}

/// Descriptor from `--params-json` and repeated `--param k=v` (repeats become a list).
pub fn job_descriptor(
    name: &str,
    params: &[(String, String)],
    params_json: Option<&str>,
) -> Result<ResourceDescriptor> {
    let mut descriptor = match params_json {
        Some(json) => ResourceDescriptor::with_params_json(name, json)
            .context("--params-json must be a JSON object of scalars or lists")?,
        None => ResourceDescriptor::new(name),
    };

    let mut from_flags: Vec<(String, Vec<Scalar>)> = Vec::new();
    for (k, v) in params {
        let value = Scalar::parse_loose(v);
        match from_flags.iter_mut().find(|(key, _)| key == k) {
            Some((_, values)) => values.push(value),
            None => from_flags.push((k.clone(), vec![value])),
        }
    }
    for (k, mut values) in from_flags {
        let value = if values.len() == 1 {
            ParamValue::One(values.remove(0))
        } else {
            ParamValue::Many(values)
        };
        descriptor.params.insert(k, value);
    }
    Ok(descriptor)
}

pub async fn run_fetch_job(
    store: &RecordStore,
    cfg: &DatafetchConfig,
    name: &str,
    params: &[(String, String)],
    params_json: Option<&str>,
    wait: bool,
    dest: &DestArgs,
) -> Result<()> {
    let api = cfg
        .job_api
        .as_ref()
        .context("no [job_api] section in config.toml (url, uid, key)")?;
    let descriptor = job_descriptor(name, params, params_json)?;
    let client = Arc::new(JobApiClient::new(
        api,
        CurlOptions::from(&cfg.http),
        cfg.retry_policy(),
    ));
    let route = Route::Queued {
        submit: client.clone(),
        poll: client,
    };
    let fetcher = Fetcher::new(store, route, downloader(cfg)).with_config(cfg);
    fetch_and_report(fetcher, &descriptor, dest, wait).await
}
