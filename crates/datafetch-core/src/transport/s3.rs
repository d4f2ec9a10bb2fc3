//! Public S3 buckets, accessed anonymously over HTTPS.
//!
//! Objects of open-data buckets are plain HTTP resources once addressed
//! path-style (`{endpoint}/{bucket}/{key}`), so downloads go through the
//! same `HttpDownloader` as any other URL.

use super::probe::probe;
use super::{CurlOptions, ResolveUrl, TransportError};
use crate::descriptor::ResourceDescriptor;

pub const DEFAULT_ENDPOINT: &str = "https://s3.amazonaws.com";

/// NOAA GFS open-data bucket.
pub const GFS_BUCKET: &str = "noaa-gfs-bdp-pds";
/// ERA5 reanalysis open-data bucket.
pub const ERA5_BUCKET: &str = "era5-pds";

#[derive(Debug, Clone)]
pub struct S3Bucket {
    pub bucket: String,
    pub endpoint: String,
    pub curl: CurlOptions,
}

impl S3Bucket {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            curl: CurlOptions::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_curl(mut self, curl: CurlOptions) -> Self {
        self.curl = curl;
        self
    }

    /// Path-style URL of `object_key`; each key segment is percent-encoded.
    pub fn object_url(&self, object_key: &str) -> Result<String, TransportError> {
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|_| TransportError::InvalidUrl(self.endpoint.clone()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| TransportError::InvalidUrl(self.endpoint.clone()))?;
            segments.pop_if_empty().push(&self.bucket);
            segments.extend(object_key.trim_start_matches('/').split('/'));
        }
        Ok(url.to_string())
    }

    /// Whether `object_key` exists, via a HEAD request. 403/404 mean absent
    /// (anonymous access gets 403 for missing keys on most buckets).
    pub fn object_available(&self, object_key: &str) -> Result<bool, TransportError> {
        let url = self.object_url(object_key)?;
        let (code, headers) = probe(&url, &self.curl)?;
        match code {
            200..=299 => {
                tracing::info!(
                    bucket = %self.bucket,
                    object_key,
                    size = ?headers.content_length,
                    last_modified = ?headers.last_modified,
                    "object is available"
                );
                Ok(true)
            }
            403 | 404 => {
                tracing::warn!(bucket = %self.bucket, object_key, code, "object not available");
                Ok(false)
            }
            code => Err(TransportError::Http {
                code,
                message: Some(format!("HEAD {}", url)),
            }),
        }
    }
}

impl S3Bucket {
    /// Whether one forecast step of a GFS run is published.
    pub fn gfs_timestep_available(
        &self,
        date_day: &str,
        run: u32,
        timestep: u32,
    ) -> Result<bool, TransportError> {
        let key = gfs_timestep_key(date_day, run, timestep);
        tracing::info!(date_day, run, timestep, object_key = %key, "checking GFS timestep");
        self.object_available(&key)
    }

    /// Whether a GFS run has started publishing, judged by its analysis step (`f000`),
    /// which is always the first object of a run to appear.
    pub fn gfs_run_available(&self, date_day: &str, run: u32) -> Result<bool, TransportError> {
        let available = self.gfs_timestep_available(date_day, run, 0)?;
        if !available {
            tracing::warn!(date_day, run, "GFS run is not yet available");
        }
        Ok(available)
    }
}

/// The descriptor name is the object key.
impl ResolveUrl for S3Bucket {
    fn resolve(&self, descriptor: &ResourceDescriptor) -> Result<String, TransportError> {
        self.object_url(&descriptor.name)
    }
}

/// Object key of a monthly ERA5 reanalysis parameter: `YYYY/MM/data/<parameter_filename>`.
pub fn era5_object_key(parameter_filename: &str, year: i32, month: u32) -> String {
    format!("{:04}/{:02}/data/{}", year, month, parameter_filename)
}

/// Key prefix shared by all steps of a GFS 0.25° run: `gfs.YYYYMMDD/RR/gfs.tRRz.pgrb2.0p25`.
pub fn gfs_run_prefix(date_day: &str, run: u32) -> String {
    format!("gfs.{date_day}/{run:02}/gfs.t{run:02}z.pgrb2.0p25")
}

/// Object key of one GFS forecast step: `<run prefix>.fTTT`.
pub fn gfs_timestep_key(date_day: &str, run: u32, timestep: u32) -> String {
    format!("{}.f{:03}", gfs_run_prefix(date_day, run), timestep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_style_object_url() {
        let b = S3Bucket::new("era5-pds");
        assert_eq!(
            b.object_url("2020/12/data/precipitation_amount_1hour_Accumulation.nc")
                .unwrap(),
            "https://s3.amazonaws.com/era5-pds/2020/12/data/precipitation_amount_1hour_Accumulation.nc"
        );
    }

    #[test]
    fn custom_endpoint_and_encoding() {
        let b = S3Bucket::new("noaa-gfs-bdp-pds").with_endpoint("http://127.0.0.1:9000/");
        assert_eq!(
            b.object_url("/gfs.20210101/00/a b.grib2").unwrap(),
            "http://127.0.0.1:9000/noaa-gfs-bdp-pds/gfs.20210101/00/a%20b.grib2"
        );
    }

    #[test]
    fn resolve_uses_name_as_key() {
        let b = S3Bucket::new("bucket");
        let d = ResourceDescriptor::new("dir/obj.nc");
        assert_eq!(
            b.resolve(&d).unwrap(),
            "https://s3.amazonaws.com/bucket/dir/obj.nc"
        );
    }

    #[test]
    fn gfs_keys_are_zero_padded() {
        assert_eq!(
            gfs_run_prefix("20210101", 6),
            "gfs.20210101/06/gfs.t06z.pgrb2.0p25"
        );
        assert_eq!(
            gfs_timestep_key("20210101", 0, 3),
            "gfs.20210101/00/gfs.t00z.pgrb2.0p25.f003"
        );
        assert_eq!(
            gfs_timestep_key("20210101", 18, 120),
            "gfs.20210101/18/gfs.t18z.pgrb2.0p25.f120"
        );
        assert_eq!(
            S3Bucket::new(GFS_BUCKET)
                .object_url(&gfs_timestep_key("20210101", 12, 384))
                .unwrap(),
            "https://s3.amazonaws.com/noaa-gfs-bdp-pds/gfs.20210101/12/gfs.t12z.pgrb2.0p25.f384"
        );
    }

    #[test]
    fn era5_key_is_zero_padded() {
        assert_eq!(
            era5_object_key("air_temperature_at_2_metres.nc", 2020, 2),
            "2020/02/data/air_temperature_at_2_metres.nc"
        );
    }
}
