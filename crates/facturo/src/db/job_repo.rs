//! Job repository — CRUD and guarded status transitions for the `jobs` table.
//!
//! Status transitions are expressed as conditional UPDATEs so that the
//! affected-row count tells the caller whether the transition actually
//! happened (e.g. claiming a job that was cancelled in the meantime).

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: i64,
    pub public_id: String,
    pub status: String,
    pub total_items: i64,
    pub processed_count: i64,
    pub failed_count: i64,
    pub input_archive_path: Option<String>,
    pub input_manifest_path: Option<String>,
    pub output_archive_path: Option<String>,
    pub output_size_bytes: Option<i64>,
    pub cost_cents: i64,
    pub error: Option<String>,
    pub item_errors: Option<String>,
    pub download_expires_at: Option<String>,
    pub settled: bool,
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: String,
    pub credential_id: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            public_id: row.get("public_id")?,
            status: row.get("status")?,
            total_items: row.get("total_items")?,
            processed_count: row.get("processed_count")?,
            failed_count: row.get("failed_count")?,
            input_archive_path: row.get("input_archive_path")?,
            input_manifest_path: row.get("input_manifest_path")?,
            output_archive_path: row.get("output_archive_path")?,
            output_size_bytes: row.get("output_size_bytes")?,
            cost_cents: row.get("cost_cents")?,
            error: row.get("error")?,
            item_errors: row.get("item_errors")?,
            download_expires_at: row.get("download_expires_at")?,
            settled: row.get::<_, i64>("settled")? != 0,
            origin_ip: row.get("origin_ip")?,
            user_agent: row.get("user_agent")?,
            user_id: row.get("user_id")?,
            credential_id: row.get("credential_id")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Fields required to create a new pending job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub public_id: String,
    pub user_id: String,
    pub credential_id: Option<String>,
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
    pub input_archive_path: String,
    pub input_manifest_path: String,
    pub total_items: i64,
    pub cost_cents: i64,
    pub created_at: String,
}

/// Inserts a new pending job. Returns the internal sequence id.
pub fn insert(db: &Database, job: &NewJob) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (public_id, status, total_items, cost_cents,
             input_archive_path, input_manifest_path,
             origin_ip, user_agent, user_id, credential_id, created_at)
             VALUES (?1, 'pending', ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                job.public_id,
                job.total_items,
                job.cost_cents,
                job.input_archive_path,
                job.input_manifest_path,
                job.origin_ip,
                job.user_agent,
                job.user_id,
                job.credential_id,
                job.created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds a job by its public identifier.
pub fn find_by_public_id(db: &Database, public_id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE public_id = ?1")?;
        let mut rows = stmt.query_map(params![public_id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Claims a pending job for processing. Returns false if the job is no
/// longer pending (cancelled, already picked up, or missing) — this is
/// the orchestrator's job-acceptance boundary.
pub fn claim_for_processing(
    db: &Database,
    public_id: &str,
    started_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'processing', started_at = ?2
             WHERE public_id = ?1 AND status = 'pending'",
            params![public_id, started_at],
        )?;
        Ok(changed == 1)
    })
}

/// One-time correction of the provisional item estimate once the manifest
/// has been parsed; the cost is recomputed by the caller.
pub fn update_totals(
    db: &Database,
    public_id: &str,
    total_items: i64,
    cost_cents: i64,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET total_items = ?2, cost_cents = ?3 WHERE public_id = ?1",
            params![public_id, total_items, cost_cents],
        )?;
        Ok(())
    })
}

/// Persists a progress checkpoint. Only the owning task calls this, so
/// counters are monotonic by construction.
pub fn update_progress(
    db: &Database,
    public_id: &str,
    processed_count: i64,
    failed_count: i64,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET processed_count = ?2, failed_count = ?3 WHERE public_id = ?1",
            params![public_id, processed_count, failed_count],
        )?;
        Ok(())
    })
}

/// Terminal success transition: records the output archive, counts and
/// download expiry.
#[allow(clippy::too_many_arguments)]
pub fn complete(
    db: &Database,
    public_id: &str,
    processed_count: i64,
    failed_count: i64,
    output_archive_path: &str,
    output_size_bytes: i64,
    item_errors_json: Option<&str>,
    download_expires_at: &str,
    completed_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET status = 'completed', processed_count = ?2, failed_count = ?3,
             output_archive_path = ?4, output_size_bytes = ?5, item_errors = ?6,
             download_expires_at = ?7, completed_at = ?8
             WHERE public_id = ?1",
            params![
                public_id,
                processed_count,
                failed_count,
                output_archive_path,
                output_size_bytes,
                item_errors_json,
                download_expires_at,
                completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Terminal failure transition. Output fields stay NULL.
pub fn fail(
    db: &Database,
    public_id: &str,
    processed_count: i64,
    failed_count: i64,
    error: &str,
    item_errors_json: Option<&str>,
    completed_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET status = 'failed', processed_count = ?2, failed_count = ?3,
             error = ?4, item_errors = ?5, completed_at = ?6
             WHERE public_id = ?1",
            params![
                public_id,
                processed_count,
                failed_count,
                error,
                item_errors_json,
                completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Cancellation: only takes effect while the job is still pending or
/// processing. Returns false once the job is terminal.
pub fn cancel(db: &Database, public_id: &str, completed_at: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'cancelled', completed_at = ?2
             WHERE public_id = ?1 AND status IN ('pending', 'processing')",
            params![public_id, completed_at],
        )?;
        Ok(changed == 1)
    })
}

/// Completed jobs whose download window has expired and whose output has
/// not yet been reclaimed — the retention sweep's work list.
pub fn expired_completed(db: &Database, now: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs
             WHERE status = 'completed'
               AND output_archive_path IS NOT NULL
               AND download_expires_at < ?1
             ORDER BY completed_at",
        )?;
        let rows: Vec<JobRow> = stmt
            .query_map(params![now], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Nulls the output fields after the retention sweep reclaimed the files.
/// Counts, cost and audit fields are left intact for historical record.
pub fn clear_output(db: &Database, public_id: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET output_archive_path = NULL, output_size_bytes = NULL
             WHERE public_id = ?1",
            params![public_id],
        )?;
        Ok(())
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
