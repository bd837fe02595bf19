//! Usage log repository — append-only audit trail of batch outcomes.

use rusqlite::{params, Row};
use serde::Serialize;

use super::{Database, DatabaseError};

/// A single usage entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRow {
    pub id: i64,
    pub job_public_id: String,
    pub user_id: String,
    pub outcome: String,
    pub total_items: i64,
    pub processed_count: i64,
    pub failed_count: i64,
    pub amount_cents: i64,
    pub created_at: String,
}

impl UsageRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_public_id: row.get("job_public_id")?,
            user_id: row.get("user_id")?,
            outcome: row.get("outcome")?,
            total_items: row.get("total_items")?,
            processed_count: row.get("processed_count")?,
            failed_count: row.get("failed_count")?,
            amount_cents: row.get("amount_cents")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Records a batch outcome.
#[allow(clippy::too_many_arguments)]
pub fn record(
    db: &Database,
    job_public_id: &str,
    user_id: &str,
    outcome: &str,
    total_items: i64,
    processed_count: i64,
    failed_count: i64,
    amount_cents: i64,
    created_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO usage_log (job_public_id, user_id, outcome, total_items,
             processed_count, failed_count, amount_cents, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job_public_id,
                user_id,
                outcome,
                total_items,
                processed_count,
                failed_count,
                amount_cents,
                created_at,
            ],
        )?;
        Ok(())
    })
}

/// Returns a user's usage entries, newest first.
pub fn for_user(db: &Database, user_id: &str) -> Result<Vec<UsageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM usage_log WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows: Vec<UsageRow> = stmt
            .query_map(params![user_id], UsageRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Total amount charged to a user across all entries.
pub fn total_charged(db: &Database, user_id: &str) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM usage_log WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(total)
    })
}
