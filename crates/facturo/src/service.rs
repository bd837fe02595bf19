//! Submission boundary: validates uploads, persists the pending job and
//! hands it off to a detached background task. The submitter gets the
//! job's public identifier back immediately and polls for status.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::composer::{DocumentComposer, FacturXComposer};
use crate::config::BatchConfig;
use crate::db::job_repo::NewJob;
use crate::db::{Database, DatabaseError};
use crate::jobs::{format_timestamp, CancelError, DownloadError, JobStatusView, JobStore};
use crate::pipeline::{BatchResult, BatchRunner};

/// Zip local-file-header magic.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Typed submission rejections — reported synchronously, before any job
/// row exists.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Archive file is missing or unreadable: {path}")]
    MissingArchive { path: PathBuf },

    #[error("Manifest file is missing or unreadable: {path}")]
    MissingManifest { path: PathBuf },

    #[error("Archive exceeds the {limit} byte upload cap ({size} bytes)")]
    ArchiveTooLarge { size: u64, limit: u64 },

    #[error("Manifest exceeds the {limit} byte upload cap ({size} bytes)")]
    ManifestTooLarge { size: u64, limit: u64 },

    #[error("Uploaded archive is not a zip file")]
    NotAZipArchive,

    #[error("Uploaded manifest is empty")]
    EmptyManifest,

    #[error("Failed to inspect upload '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// A validated submission, ready to become a job.
#[derive(Debug, Clone)]
pub struct Submission {
    pub archive_path: PathBuf,
    pub manifest_path: PathBuf,
    pub user_id: String,
    pub credential_id: Option<String>,
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// What the submitter gets back: the public identifier to poll, plus the
/// provisional estimate that the manifest parse will later correct.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub public_id: String,
    pub estimated_items: i64,
    pub cost_cents: i64,
}

pub struct BatchService {
    config: Arc<BatchConfig>,
    store: JobStore,
    composer: Arc<dyn DocumentComposer>,
}

impl BatchService {
    pub fn new(db: Database, config: Arc<BatchConfig>, composer: Arc<dyn DocumentComposer>) -> Self {
        Self {
            config,
            store: JobStore::new(db),
            composer,
        }
    }

    /// Production constructor with the in-repo Factur-X composer.
    pub fn from_config(db: Database, config: Arc<BatchConfig>) -> Self {
        Self::new(db, config, Arc::new(FacturXComposer::new()))
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Validates the uploads and persists a pending job. Fast and
    /// synchronous — all heavy lifting is deferred to the background
    /// task started by `spawn`.
    pub fn submit(&self, submission: Submission) -> Result<SubmitReceipt, SubmitError> {
        let archive_size = file_size(&submission.archive_path).map_err(|_| {
            SubmitError::MissingArchive {
                path: submission.archive_path.clone(),
            }
        })?;
        let manifest_size = file_size(&submission.manifest_path).map_err(|_| {
            SubmitError::MissingManifest {
                path: submission.manifest_path.clone(),
            }
        })?;

        if archive_size > self.config.max_archive_bytes {
            return Err(SubmitError::ArchiveTooLarge {
                size: archive_size,
                limit: self.config.max_archive_bytes,
            });
        }
        if manifest_size > self.config.max_manifest_bytes {
            return Err(SubmitError::ManifestTooLarge {
                size: manifest_size,
                limit: self.config.max_manifest_bytes,
            });
        }
        if manifest_size == 0 {
            return Err(SubmitError::EmptyManifest);
        }
        if !starts_with_magic(&submission.archive_path, ZIP_MAGIC)? {
            return Err(SubmitError::NotAZipArchive);
        }

        // Provisional estimate from the archive size; corrected from the
        // parsed manifest before any item is processed.
        let estimated_items = (archive_size / self.config.estimated_item_bytes.max(1))
            .clamp(1, self.config.max_items as u64) as i64;
        let cost_cents = estimated_items * self.config.unit_price_cents;

        let public_id = Uuid::new_v4().to_string();
        self.store.create(&NewJob {
            public_id: public_id.clone(),
            user_id: submission.user_id,
            credential_id: submission.credential_id,
            origin_ip: submission.origin_ip,
            user_agent: submission.user_agent,
            input_archive_path: submission.archive_path.display().to_string(),
            input_manifest_path: submission.manifest_path.display().to_string(),
            total_items: estimated_items,
            cost_cents,
            created_at: format_timestamp(Utc::now()),
        })?;

        Ok(SubmitReceipt {
            public_id,
            estimated_items,
            cost_cents,
        })
    }

    /// Builds the runner this service's jobs execute on.
    pub fn runner(&self) -> BatchRunner {
        BatchRunner::new(
            Arc::clone(&self.config),
            self.store.clone(),
            Arc::clone(&self.composer),
        )
    }

    /// Detaches the batch as a background task. The pipeline body is
    /// blocking I/O, so it runs on the blocking pool; the submitter's
    /// request task never waits on it.
    pub fn spawn(&self, public_id: String) -> tokio::task::JoinHandle<BatchResult> {
        let runner = self.runner();
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || runner.process(&public_id)).await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Batch task panicked");
                    BatchResult {
                        success: false,
                        processed: 0,
                        failed: 0,
                        output_path: None,
                        output_size: None,
                        item_errors: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            }
        })
    }

    /// Validates, persists and detaches in one call.
    pub fn submit_and_spawn(&self, submission: Submission) -> Result<SubmitReceipt, SubmitError> {
        let receipt = self.submit(submission)?;
        self.spawn(receipt.public_id.clone());
        Ok(receipt)
    }

    /// Status document for the polling endpoint.
    pub fn status(&self, public_id: &str) -> Result<Option<JobStatusView>, DatabaseError> {
        self.store.status_view(public_id)
    }

    /// Download gate — typed rejection instead of stale or partial
    /// content.
    pub fn download(&self, public_id: &str) -> Result<PathBuf, DownloadError> {
        self.store.download_path(public_id)
    }

    /// Cancellation request; only effective while the job is pending or
    /// processing.
    pub fn cancel(&self, public_id: &str) -> Result<(), CancelError> {
        self.store.cancel(public_id)
    }
}

fn file_size(path: &Path) -> std::io::Result<u64> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not a regular file",
        ));
    }
    Ok(metadata.len())
}

fn starts_with_magic(path: &Path, magic: &[u8]) -> Result<bool, SubmitError> {
    use std::io::Read;

    let mut file = std::fs::File::open(path).map_err(|e| SubmitError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut prefix = vec![0u8; magic.len()];
    match file.read_exact(&mut prefix) {
        Ok(()) => Ok(prefix == magic),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(SubmitError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
