//! Job store — the single mutation path for job state.
//!
//! The orchestrator task owning a job is the only writer of its
//! processing counters; everything here is a thin, intention-revealing
//! facade over `job_repo` so no caller touches raw SQL.

use std::path::PathBuf;

use chrono::Utc;

use crate::db::job_repo::{self, JobRow, NewJob};
use crate::db::{Database, DatabaseError};
use crate::jobs::{
    format_timestamp, parse_status, parse_timestamp, progress_percent, CancelError,
    DownloadError, ItemError, JobStatus, JobStatusView,
};

#[derive(Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Persists a freshly submitted job in `pending` status.
    pub fn create(&self, job: &NewJob) -> Result<i64, DatabaseError> {
        job_repo::insert(&self.db, job)
    }

    pub fn get(&self, public_id: &str) -> Result<Option<JobRow>, DatabaseError> {
        job_repo::find_by_public_id(&self.db, public_id)
    }

    /// Job-acceptance boundary: pending → processing with a start stamp.
    /// Returns false when the job was cancelled (or taken) in the
    /// meantime, in which case the caller must not process it.
    pub fn claim(&self, public_id: &str) -> Result<bool, DatabaseError> {
        job_repo::claim_for_processing(&self.db, public_id, &format_timestamp(Utc::now()))
    }

    /// One-time correction of the provisional estimate after the
    /// manifest has been parsed.
    pub fn correct_totals(
        &self,
        public_id: &str,
        total_items: i64,
        cost_cents: i64,
    ) -> Result<(), DatabaseError> {
        job_repo::update_totals(&self.db, public_id, total_items, cost_cents)
    }

    /// Progress checkpoint for concurrent status readers.
    pub fn checkpoint(
        &self,
        public_id: &str,
        processed: i64,
        failed: i64,
    ) -> Result<(), DatabaseError> {
        job_repo::update_progress(&self.db, public_id, processed, failed)
    }

    /// Terminal success: output archive recorded, download window opened.
    #[allow(clippy::too_many_arguments)]
    pub fn complete(
        &self,
        public_id: &str,
        processed: i64,
        failed: i64,
        output_path: &str,
        output_size: i64,
        item_errors: &[ItemError],
        ttl_hours: i64,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now();
        let expires = now + chrono::Duration::hours(ttl_hours);
        job_repo::complete(
            &self.db,
            public_id,
            processed,
            failed,
            output_path,
            output_size,
            encode_item_errors(item_errors).as_deref(),
            &format_timestamp(expires),
            &format_timestamp(now),
        )
    }

    /// Terminal failure: message recorded, output fields stay empty.
    pub fn fail(
        &self,
        public_id: &str,
        processed: i64,
        failed: i64,
        error: &str,
        item_errors: &[ItemError],
    ) -> Result<(), DatabaseError> {
        job_repo::fail(
            &self.db,
            public_id,
            processed,
            failed,
            error,
            encode_item_errors(item_errors).as_deref(),
            &format_timestamp(Utc::now()),
        )
    }

    /// Cancels a job that is still pending or processing; terminal jobs
    /// reject the request.
    pub fn cancel(&self, public_id: &str) -> Result<(), CancelError> {
        if job_repo::cancel(&self.db, public_id, &format_timestamp(Utc::now()))? {
            return Ok(());
        }
        match self.get(public_id)? {
            Some(row) => Err(CancelError::AlreadyTerminal {
                status: parse_status(&row.status, public_id),
            }),
            None => Err(CancelError::NotFound),
        }
    }

    /// Status document for the polling endpoint.
    pub fn status_view(&self, public_id: &str) -> Result<Option<JobStatusView>, DatabaseError> {
        Ok(self
            .get(public_id)?
            .map(|row| JobStatusView::from_row(&row, Utc::now())))
    }

    /// Download gate: only completed, unexpired jobs serve their archive.
    pub fn download_path(&self, public_id: &str) -> Result<PathBuf, DownloadError> {
        let row = self.get(public_id)?.ok_or(DownloadError::NotFound)?;
        let status = parse_status(&row.status, public_id);

        if status != JobStatus::Completed {
            return Err(DownloadError::NotCompleted {
                status,
                progress_percent: progress_percent(row.processed_count, row.total_items),
            });
        }

        let expires_at = row
            .download_expires_at
            .as_deref()
            .map(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let path = row.output_archive_path.filter(|_| Utc::now() < expires_at);
        match path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Err(DownloadError::Expired {
                expired_at: expires_at,
            }),
        }
    }
}

fn encode_item_errors(errors: &[ItemError]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    serde_json::to_string(errors).ok()
}
