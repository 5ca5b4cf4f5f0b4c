//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine calls store methods; it never executes SQL directly.

use crate::{error::ScoreResult, event::EventLogEntry};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};

mod account;
mod ip_reputation;
mod transaction;

pub struct FraudStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl FraudStore {
    pub fn open(path: &str) -> ScoreResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ScoreResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    /// For file-based databases, this opens the same file.
    pub fn reopen(&self) -> ScoreResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ScoreResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_ip_reputation.sql"))?;
        Ok(())
    }

    // ── Unit of work ───────────────────────────────────────────

    /// Open a write transaction (`BEGIN IMMEDIATE`) on this connection.
    ///
    /// Every store call made while the returned guard is alive joins it.
    /// Dropping the guard without `commit`, or after a failed `commit`,
    /// rolls the work back.
    pub fn unit_of_work(&self) -> ScoreResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// True when no transaction is open on this connection.
    pub fn is_idle(&self) -> bool {
        self.conn.is_autocommit()
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> ScoreResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (card_number, transaction_id, event_type, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.card_number,
                entry.transaction_id,
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_card(&self, card_number: &str) -> ScoreResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, card_number, transaction_id, event_type, payload
             FROM event_log WHERE card_number = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![card_number], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    card_number: row.get(1)?,
                    transaction_id: row.get(2)?,
                    event_type: row.get(3)?,
                    payload: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, event_type: &str) -> ScoreResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ── Column helpers ─────────────────────────────────────────────

fn to_millis(at: &DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Integer,
            format!("timestamp {ms} ms is out of range").into(),
        )
    })
}

/// Non-finite values are stored as NULL.
fn finite_or_null(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionSubmission;

    fn orphan_submission() -> TransactionSubmission {
        TransactionSubmission {
            card_number: "no-account".into(),
            card_holder: String::new(),
            merchant: String::new(),
            amount: 10.0,
            category_index: 0,
            latitude: 0.0,
            longitude: 0.0,
            ip_address: None,
            created_at: None,
        }
    }

    #[test]
    fn failed_commit_does_not_leave_the_connection_in_a_transaction() {
        let store = FraudStore::in_memory().unwrap();
        store.migrate().unwrap();

        let unit = store.unit_of_work().unwrap();
        // Defer the foreign-key check so the violation surfaces at COMMIT.
        store.conn.execute_batch("PRAGMA defer_foreign_keys=ON;").unwrap();
        store
            .insert_transaction(&orphan_submission(), Utc::now())
            .unwrap();

        assert!(unit.commit().is_err());
        assert!(store.is_idle());

        let next = store.unit_of_work().expect("a fresh unit of work can begin");
        next.commit().unwrap();
        assert_eq!(store.transaction_count("no-account").unwrap(), 0);
    }

    #[test]
    fn dropped_unit_of_work_rolls_back() {
        let store = FraudStore::in_memory().unwrap();
        store.migrate().unwrap();
        {
            let _unit = store.unit_of_work().unwrap();
            store
                .append_event(&EventLogEntry {
                    id: None,
                    card_number: "4111".into(),
                    transaction_id: None,
                    event_type: "account_opened".into(),
                    payload: "{}".into(),
                })
                .unwrap();
        }
        assert!(store.is_idle());
        assert_eq!(store.event_count("account_opened").unwrap(), 0);
    }
}
