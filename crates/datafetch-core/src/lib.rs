pub mod config;
pub mod logging;

pub mod control;
pub mod descriptor;
pub mod fetcher;
pub mod lifecycle;
pub mod record_store;
pub mod retry;
pub mod storage;
pub mod transport;
pub mod url_model;

pub use descriptor::{ParamValue, ResourceDescriptor, Scalar};
pub use fetcher::{FetchError, FetchOptions, FetchOutcome, Fetcher, Route};
pub use lifecycle::{FailedPolicy, RecordStatus};
pub use record_store::{DownloadRecord, RecordStore};
