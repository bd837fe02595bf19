//! Account repository — user credit balances and billing settlement.
//!
//! The balance is the only cross-job shared mutable state, so the
//! settlement path runs as an IMMEDIATE transaction (exclusive
//! read-modify-write). Exactly-once billing per job is enforced by a
//! `settled` latch on the job row, flipped inside the same transaction
//! as the debit.

use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::{Database, DatabaseError};

/// Returns the user's balance in cents. Unknown users read as zero.
pub fn balance(db: &Database, user_id: &str) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        let balance = conn
            .query_row(
                "SELECT balance_cents FROM accounts WHERE user_id = ?1",
                params![user_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(balance.unwrap_or(0))
    })
}

/// Credits the user's account (top-up path).
pub fn credit(db: &Database, user_id: &str, amount_cents: i64, now: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO accounts (user_id, balance_cents, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
               balance_cents = balance_cents + ?2,
               updated_at = ?3",
            params![user_id, amount_cents, now],
        )?;
        Ok(())
    })
}

/// Settles a job's billing: debits `amount_cents` from the owning user,
/// exactly once per job.
///
/// Returns true if this call performed the settlement, false if the job
/// was already settled (the latch makes retries a no-op).
pub fn settle_job(
    db: &Database,
    job_public_id: &str,
    user_id: &str,
    amount_cents: i64,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Latch first: a second settlement attempt flips zero rows and
        // leaves the balance untouched.
        let latched = tx.execute(
            "UPDATE jobs SET settled = 1 WHERE public_id = ?1 AND settled = 0",
            params![job_public_id],
        )?;
        if latched == 0 {
            tx.rollback()?;
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO accounts (user_id, balance_cents, updated_at) VALUES (?1, 0, ?2)
             ON CONFLICT(user_id) DO NOTHING",
            params![user_id, now],
        )?;
        tx.execute(
            "UPDATE accounts SET balance_cents = balance_cents - ?2, updated_at = ?3
             WHERE user_id = ?1",
            params![user_id, amount_cents, now],
        )?;

        tx.commit()?;
        Ok(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo::{self, NewJob};

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn seed_job(db: &Database, public_id: &str, user_id: &str) {
        job_repo::insert(
            db,
            &NewJob {
                public_id: public_id.to_string(),
                user_id: user_id.to_string(),
                credential_id: None,
                origin_ip: None,
                user_agent: None,
                input_archive_path: "/tmp/a.zip".to_string(),
                input_manifest_path: "/tmp/m.csv".to_string(),
                total_items: 5,
                cost_cents: 100,
                created_at: "2026-01-01T00:00:00+00:00".to_string(),
            },
        )
        .unwrap();
    }

    #[test]
    fn test_balance_defaults_to_zero() {
        let db = test_db();
        assert_eq!(balance(&db, "unknown").unwrap(), 0);
    }

    #[test]
    fn test_credit_and_balance() {
        let db = test_db();
        credit(&db, "u1", 1000, "2026-01-01T00:00:00+00:00").unwrap();
        credit(&db, "u1", 500, "2026-01-01T00:01:00+00:00").unwrap();
        assert_eq!(balance(&db, "u1").unwrap(), 1500);
    }

    #[test]
    fn test_settle_debits_once() {
        let db = test_db();
        seed_job(&db, "j1", "u1");
        credit(&db, "u1", 1000, "t").unwrap();

        assert!(settle_job(&db, "j1", "u1", 60, "t").unwrap());
        assert_eq!(balance(&db, "u1").unwrap(), 940);

        // Retry is a no-op: latch already flipped.
        assert!(!settle_job(&db, "j1", "u1", 60, "t").unwrap());
        assert_eq!(balance(&db, "u1").unwrap(), 940);
    }

    #[test]
    fn test_settle_creates_missing_account() {
        let db = test_db();
        seed_job(&db, "j2", "new-user");

        assert!(settle_job(&db, "j2", "new-user", 40, "t").unwrap());
        assert_eq!(balance(&db, "new-user").unwrap(), -40);
    }

    #[test]
    fn test_settle_unknown_job_is_noop() {
        let db = test_db();
        credit(&db, "u1", 100, "t").unwrap();
        assert!(!settle_job(&db, "missing", "u1", 60, "t").unwrap());
        assert_eq!(balance(&db, "u1").unwrap(), 100);
    }
}
