//! The batch orchestrator — owns a job's working directory for its whole
//! processing lifetime and is the sole writer of its status.
//!
//! Error policy: per-item failures are converted to `ItemError` data at
//! the innermost boundary and never unwind past the item loop. Fatal
//! errors (extraction, manifest, packaging, workdir, db) unwind to the
//! single handler in `process`, which marks the job failed and purges
//! the working directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn};

use crate::archive;
use crate::composer::{has_pdf_magic, DocumentComposer, FacturXComposer};
use crate::config::BatchConfig;
use crate::db::job_repo::JobRow;
use crate::db::{account_repo, usage_repo};
use crate::error::ComposeError;
use crate::jobs::{format_timestamp, ItemError, JobStore};
use crate::manifest::{InvoiceRecord, ManifestReader};

use super::error::PipelineError;
use super::progress::{CheckpointProgress, ProgressEvent, ProgressReporter};

/// Transient batch summary; its fields are copied onto the job row by
/// the terminal transition before this is returned.
#[derive(Debug)]
pub struct BatchResult {
    pub success: bool,
    pub processed: i64,
    pub failed: i64,
    pub output_path: Option<PathBuf>,
    pub output_size: Option<i64>,
    pub item_errors: Vec<ItemError>,
    pub error: Option<String>,
}

impl BatchResult {
    fn not_run(reason: &str) -> Self {
        Self {
            success: false,
            processed: 0,
            failed: 0,
            output_path: None,
            output_size: None,
            item_errors: Vec::new(),
            error: Some(reason.to_string()),
        }
    }
}

struct PipelineOutcome {
    total: i64,
    processed: i64,
    failed: i64,
    item_errors: Vec<ItemError>,
    output_path: PathBuf,
    output_size: i64,
}

pub struct BatchRunner {
    config: Arc<BatchConfig>,
    store: JobStore,
    composer: Arc<dyn DocumentComposer>,
}

impl BatchRunner {
    pub fn new(
        config: Arc<BatchConfig>,
        store: JobStore,
        composer: Arc<dyn DocumentComposer>,
    ) -> Self {
        Self {
            config,
            store,
            composer,
        }
    }

    /// Production constructor with the in-repo Factur-X composer.
    pub fn from_config(config: Arc<BatchConfig>, store: JobStore) -> Self {
        Self::new(config, store, Arc::new(FacturXComposer::new()))
    }

    /// Working directory for a job, keyed by its public identifier so
    /// concurrent jobs never collide on the filesystem.
    pub fn workdir(&self, public_id: &str) -> PathBuf {
        self.config.work_root.join(public_id)
    }

    /// Runs the whole batch for one job. The single public entry point.
    pub fn process(&self, public_id: &str) -> BatchResult {
        let _span = info_span!("batch", job_id = %public_id).entered();

        let job = match self.store.get(public_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("Job not found, nothing to process");
                return BatchResult::not_run("job not found");
            }
            Err(e) => {
                error!(error = %e, "Failed to load job");
                return BatchResult::not_run(&e.to_string());
            }
        };

        // Job-acceptance boundary: a job cancelled while pending is
        // dropped here; an in-flight loop is never interrupted later.
        match self.store.claim(public_id) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Job is no longer pending (cancelled or already claimed), skipping");
                // A cancelled job never runs, so its uploads are released
                // here; anything else may belong to another worker.
                if let Ok(Some(row)) = self.store.get(public_id) {
                    if row.status == "cancelled" {
                        self.release_inputs(&row, &self.workdir(public_id).join("input"));
                    }
                }
                return BatchResult::not_run("job is no longer pending");
            }
            Err(e) => {
                error!(error = %e, "Failed to claim job");
                return BatchResult::not_run(&e.to_string());
            }
        }

        let workdir = self.workdir(public_id);
        let input_dir = workdir.join("input");
        let output_dir = workdir.join("output");

        let result = match self.run_pipeline(&job, &workdir, &input_dir, &output_dir) {
            Ok(outcome) => self.finish(&job, &workdir, outcome),
            Err(e) => self.finish_fatal(&job, &workdir, e),
        };

        self.write_usage(&job, &result);
        self.release_inputs(&job, &input_dir);

        result
    }

    /// Steps 1–7 of the batch: workdir, extract, parse, estimate
    /// correction, per-item loop, packaging. Every error returned here
    /// is fatal to the job.
    fn run_pipeline(
        &self,
        job: &JobRow,
        workdir: &Path,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Result<PipelineOutcome, PipelineError> {
        {
            let _step = info_span!("prepare_workdir").entered();
            for dir in [input_dir, output_dir] {
                fs::create_dir_all(dir).map_err(|e| PipelineError::Workdir {
                    path: dir.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let archive_path = job
            .input_archive_path
            .as_deref()
            .ok_or(PipelineError::MissingInput("archive"))?;
        let manifest_path = job
            .input_manifest_path
            .as_deref()
            .ok_or(PipelineError::MissingInput("manifest"))?;

        {
            let _step = info_span!("extract").entered();
            archive::extract(Path::new(archive_path), input_dir)
                .map_err(PipelineError::Extraction)?;
        }

        let records = {
            let _step = info_span!("parse_manifest").entered();
            ManifestReader::open(Path::new(manifest_path))?.read_all(self.config.max_items)?
        };

        // The submission-time estimate was derived from the archive size;
        // the parsed manifest is authoritative. Correct once, before any
        // item is processed, so cost never reflects a stale count.
        let total = records.len() as i64;
        if total != job.total_items {
            let cost = total * self.config.unit_price_cents;
            self.store.correct_totals(&job.public_id, total, cost)?;
            debug!(
                estimated = job.total_items,
                actual = total,
                "Corrected provisional item estimate"
            );
        }

        let progress = CheckpointProgress::new(
            self.store.clone(),
            job.public_id.clone(),
            self.config.checkpoint_every,
        );
        let mut processed = 0i64;
        let mut failed = 0i64;
        let mut item_errors = Vec::new();

        {
            let _step = info_span!("compose_items", count = records.len()).entered();
            for (index, record) in records.iter().enumerate() {
                let label = record
                    .filename
                    .clone()
                    .unwrap_or_else(|| format!("row {}", index + 1));
                match self.compose_item(record, input_dir, output_dir) {
                    Ok(_) => processed += 1,
                    Err(e) => {
                        failed += 1;
                        warn!(item = %label, error = %e, "Item composition failed");
                        item_errors.push(ItemError {
                            filename: label,
                            message: e.to_string(),
                        });
                    }
                }
                progress.report(ProgressEvent::Item { processed, failed });
            }
        }

        let (output_path, output_size) = {
            let _step = info_span!("package").entered();
            let dest = workdir.join("output.zip");
            let size = archive::pack(output_dir, &dest).map_err(PipelineError::Packaging)?;
            (dest, size as i64)
        };

        Ok(PipelineOutcome {
            total,
            processed,
            failed,
            item_errors,
            output_path,
            output_size,
        })
    }

    /// Composes one manifest row. Every failure mode here is a per-item
    /// error: it is recorded and the batch moves on.
    fn compose_item(
        &self,
        record: &InvoiceRecord,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, ComposeError> {
        let filename = record
            .filename
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .ok_or(ComposeError::MissingField("filename"))?;

        let pdf_path = archive::locate(input_dir, filename)
            .ok_or_else(|| ComposeError::PdfNotFound(filename.to_string()))?;
        let pdf_bytes = fs::read(&pdf_path).map_err(|e| ComposeError::Read {
            path: pdf_path.clone(),
            source: e,
        })?;
        if !has_pdf_magic(&pdf_bytes) {
            return Err(ComposeError::NotAPdf(filename.to_string()));
        }

        let composed = self.composer.compose(record, &pdf_bytes)?;

        let out_path = output_dir.join(output_name(record, filename));
        fs::write(&out_path, &composed).map_err(|e| ComposeError::Write {
            path: out_path.clone(),
            source: e,
        })?;
        Ok(out_path)
    }

    /// Steps 8–9: terminal status and billing settlement.
    fn finish(&self, job: &JobRow, workdir: &Path, outcome: PipelineOutcome) -> BatchResult {
        let all_failed = outcome.total > 0 && outcome.processed == 0;

        if all_failed {
            let message = format!("All {} items failed", outcome.failed);
            if let Err(e) = self.store.fail(
                &job.public_id,
                outcome.processed,
                outcome.failed,
                &message,
                &outcome.item_errors,
            ) {
                error!(error = %e, "Failed to record job failure");
            }
            purge_dir(workdir);
            info!(failed = outcome.failed, "Batch failed: no item could be composed");
            return BatchResult {
                success: false,
                processed: 0,
                failed: outcome.failed,
                output_path: None,
                output_size: None,
                item_errors: outcome.item_errors,
                error: Some(message),
            };
        }

        let output_path_str = outcome.output_path.display().to_string();
        if let Err(e) = self.store.complete(
            &job.public_id,
            outcome.processed,
            outcome.failed,
            &output_path_str,
            outcome.output_size,
            &outcome.item_errors,
            self.config.download_ttl_hours,
        ) {
            error!(error = %e, "Failed to record job completion");
        }

        // Billing: exactly the successfully processed items, never the
        // attempted total. The settlement latch makes retries no-ops.
        let amount = outcome.processed * self.config.unit_price_cents;
        match account_repo::settle_job(
            self.store.database(),
            &job.public_id,
            &job.user_id,
            amount,
            &format_timestamp(Utc::now()),
        ) {
            Ok(true) => debug!(amount_cents = amount, "Settled billing"),
            Ok(false) => warn!("Job was already settled, skipping charge"),
            Err(e) => error!(error = %e, "Billing settlement failed"),
        }

        info!(
            processed = outcome.processed,
            failed = outcome.failed,
            output_size = outcome.output_size,
            "Batch completed"
        );

        BatchResult {
            success: true,
            processed: outcome.processed,
            failed: outcome.failed,
            output_path: Some(outcome.output_path),
            output_size: Some(outcome.output_size),
            item_errors: outcome.item_errors,
            error: None,
        }
    }

    /// The single fatal-error boundary: job failed, whole working
    /// directory purged (including any partially built output), no
    /// billing.
    fn finish_fatal(&self, job: &JobRow, workdir: &Path, e: PipelineError) -> BatchResult {
        let message = e.to_string();
        error!(error = %message, "Batch aborted by fatal error");

        if let Err(db_err) = self.store.fail(&job.public_id, 0, 0, &message, &[]) {
            error!(error = %db_err, "Failed to record fatal job failure");
        }
        purge_dir(workdir);

        BatchResult {
            success: false,
            processed: 0,
            failed: 0,
            output_path: None,
            output_size: None,
            item_errors: Vec::new(),
            error: Some(message),
        }
    }

    /// Step 10: the audit trail entry.
    fn write_usage(&self, job: &JobRow, result: &BatchResult) {
        let outcome = if result.success { "completed" } else { "failed" };
        let amount = if result.success {
            result.processed * self.config.unit_price_cents
        } else {
            0
        };
        if let Err(e) = usage_repo::record(
            self.store.database(),
            &job.public_id,
            &job.user_id,
            outcome,
            result.processed + result.failed,
            result.processed,
            result.failed,
            amount,
            &format_timestamp(Utc::now()),
        ) {
            error!(error = %e, "Failed to write usage log entry");
        }
    }

    /// Step 11: the extracted input subtree and the uploaded files are
    /// released unconditionally once the job is terminal. The output
    /// archive is never touched here — the retention sweep owns it.
    fn release_inputs(&self, job: &JobRow, input_dir: &Path) {
        purge_dir(input_dir);
        for upload in [&job.input_archive_path, &job.input_manifest_path] {
            if let Some(path) = upload.as_deref() {
                if let Err(e) = fs::remove_file(path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path, error = %e, "Failed to remove uploaded file");
                    }
                }
            }
        }
    }
}

fn purge_dir(dir: &Path) {
    if dir.exists() {
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!(path = %dir.display(), error = %e, "Failed to remove directory");
        }
    }
}

/// Deterministic output name derived from the invoice number.
fn output_name(record: &InvoiceRecord, fallback: &str) -> String {
    let stem = record
        .invoice_number
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(sanitize_stem)
        .unwrap_or_else(|| {
            sanitize_stem(
                Path::new(fallback)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("invoice"),
            )
        });
    format!("{}-facturx.pdf", stem)
}

fn sanitize_stem(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
