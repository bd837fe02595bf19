//! Retention sweep — reclaims expired output archives and working
//! directories, leaving the historical job record (counts, cost, audit
//! trail) intact.
//!
//! Designed to be driven by an external scheduler; `run_sweeper` is a
//! convenience interval loop for single-instance deployments.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::BatchConfig;
use crate::db::{job_repo, Database, DatabaseError};
use crate::jobs::format_timestamp;

/// What one sweep pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub swept: u64,
    pub failures: u64,
}

/// Sweeps all completed jobs whose download window has expired: deletes
/// the output archive and the job's working directory, then nulls the
/// output fields. Per-job failures are logged and swallowed so one bad
/// deletion never stops the sweep. Running the sweep again over already
/// swept jobs is a no-op.
pub fn sweep(db: &Database, config: &BatchConfig) -> Result<SweepReport, DatabaseError> {
    let now = format_timestamp(Utc::now());
    let expired = job_repo::expired_completed(db, &now)?;

    let mut report = SweepReport::default();
    for job in expired {
        match sweep_job(db, config, &job.public_id, job.output_archive_path.as_deref()) {
            Ok(()) => {
                report.swept += 1;
                debug!(job_id = %job.public_id, "Reclaimed expired output");
            }
            Err(e) => {
                report.failures += 1;
                warn!(job_id = %job.public_id, error = %e, "Retention sweep failed for job");
            }
        }
    }

    if report.swept > 0 || report.failures > 0 {
        info!(swept = report.swept, failures = report.failures, "Retention sweep finished");
    }
    Ok(report)
}

fn sweep_job(
    db: &Database,
    config: &BatchConfig,
    public_id: &str,
    output_path: Option<&str>,
) -> Result<(), DatabaseError> {
    if let Some(path) = output_path {
        remove_if_exists(Path::new(path));
    }

    let workdir = config.work_root.join(public_id);
    if workdir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&workdir) {
            warn!(path = %workdir.display(), error = %e, "Failed to remove working directory");
        }
    }

    job_repo::clear_output(db, public_id)
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove output archive");
        }
    }
}

/// Runs the sweep on a fixed interval until the task is dropped.
pub async fn run_sweeper(db: Database, config: Arc<BatchConfig>, period: Duration) {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        match sweep(&db, &config) {
            Ok(report) if report.swept > 0 => {
                debug!(swept = report.swept, "Sweeper tick reclaimed outputs");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Retention sweep pass failed");
            }
        }
    }
}
