pub mod archive;
pub mod composer;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod retention;
pub mod service;

pub use composer::{DocumentComposer, FacturXComposer};
pub use config::{load_config, BatchConfig};
pub use error::{ArchiveError, ComposeError, ConfigError, FacturoError, ManifestError, Result};
pub use jobs::{
    CancelError, DownloadError, ItemError, JobStatus, JobStatusView, JobStore,
};
pub use manifest::{InvoiceRecord, ManifestReader};
pub use pipeline::{BatchResult, BatchRunner, PipelineError};
pub use retention::{sweep, SweepReport};
pub use service::{BatchService, SubmitError, SubmitReceipt, Submission};
