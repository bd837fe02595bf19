//! Job domain model: status enum, per-item errors, the polling view and
//! the typed rejections for download and cancellation.

pub mod store;

pub use store::JobStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::job_repo::JobRow;
use crate::db::DatabaseError;

// ─── Status ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal jobs are immutable apart from the retention sweep.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

pub(crate) fn parse_status(s: &str, public_id: &str) -> JobStatus {
    match s {
        "pending" => JobStatus::Pending,
        "processing" => JobStatus::Processing,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "cancelled" => JobStatus::Cancelled,
        other => {
            log::warn!(
                "Unknown job status '{}' for job {}, defaulting to Failed",
                other,
                public_id
            );
            JobStatus::Failed
        }
    }
}

pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// ─── Per-item errors ────────────────────────────────────────────────────────

/// One failed manifest row: the PDF it named and what went wrong.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    pub filename: String,
    pub message: String,
}

// ─── Derived fields ─────────────────────────────────────────────────────────

/// Progress percentage, rounded. A zero-item job reads as 0%.
pub fn progress_percent(processed: i64, total: i64) -> u8 {
    if total <= 0 {
        return 0;
    }
    ((processed as f64 / total as f64) * 100.0).round() as u8
}

/// Formats a cent amount the way the status endpoint displays it.
pub fn format_cost(cents: i64) -> String {
    format!("{},{:02} €", cents / 100, (cents % 100).abs())
}

// ─── Polling view ───────────────────────────────────────────────────────────

/// Job status document served to a polling client. Always well-formed,
/// whatever state the job is in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub public_id: String,
    pub status: JobStatus,
    pub total_items: i64,
    pub processed_count: i64,
    pub failed_count: i64,
    pub progress_percent: u8,
    pub cost_cents: i64,
    pub cost: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub download_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub item_errors: Vec<ItemError>,
}

impl JobStatusView {
    pub fn from_row(row: &JobRow, now: DateTime<Utc>) -> Self {
        let status = parse_status(&row.status, &row.public_id);
        let expires_at = row.download_expires_at.as_deref().map(parse_timestamp);
        let download_available = status == JobStatus::Completed
            && row.output_archive_path.is_some()
            && expires_at.map(|e| now < e).unwrap_or(false);
        let item_errors: Vec<ItemError> = row
            .item_errors
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default();

        Self {
            public_id: row.public_id.clone(),
            status,
            total_items: row.total_items,
            processed_count: row.processed_count,
            failed_count: row.failed_count,
            progress_percent: progress_percent(row.processed_count, row.total_items),
            cost_cents: row.cost_cents,
            cost: format_cost(row.cost_cents),
            created_at: parse_timestamp(&row.created_at),
            started_at: row.started_at.as_deref().map(parse_timestamp),
            completed_at: row.completed_at.as_deref().map(parse_timestamp),
            download_available,
            download_expires_at: expires_at,
            error: row.error.clone(),
            item_errors,
        }
    }
}

// ─── Typed rejections ───────────────────────────────────────────────────────

/// Why a download request cannot be served right now.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Job not found")]
    NotFound,

    #[error("Job is not completed (status {status:?}, {progress_percent}%)")]
    NotCompleted {
        status: JobStatus,
        progress_percent: u8,
    },

    #[error("Download expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Why a cancellation request was rejected.
#[derive(Error, Debug)]
pub enum CancelError {
    #[error("Job not found")]
    NotFound,

    #[error("Job already reached terminal status {status:?}")]
    AlreadyTerminal { status: JobStatus },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
