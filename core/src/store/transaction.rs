use super::{from_millis, to_millis, FraudStore};
use crate::{
    error::{ScoreError, ScoreResult},
    ip_reputation::normalize_ip,
    transaction::{Transaction, TransactionSubmission},
    types::TransactionId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const TRANSACTION_COLUMNS: &str = "id, card_number, merchant, amount, category_index,
    latitude, longitude, ip_address, created_at_ms, risk_score, is_fraud, suspicious_ip";

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        card_number: row.get(1)?,
        merchant: row.get(2)?,
        amount: row.get(3)?,
        category_index: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
        ip_address: row.get(7)?,
        created_at: from_millis(row.get(8)?)?,
        risk_score: row.get(9)?,
        is_fraud: row.get::<_, i32>(10)? != 0,
        suspicious_ip: row.get::<_, i32>(11)? != 0,
    })
}

impl FraudStore {
    // ── Transactions ──────────────────────────────────────────────

    /// Append an unscored transaction and return it with its id.
    pub fn insert_transaction(
        &self,
        submission: &TransactionSubmission,
        created_at: DateTime<Utc>,
    ) -> ScoreResult<Transaction> {
        // Stored trimmed so reputation lookups match on the exact address.
        let ip_address = normalize_ip(submission.ip_address.as_deref()).map(str::to_string);
        self.conn.execute(
            "INSERT INTO card_transaction (
                card_number, merchant, amount, category_index,
                latitude, longitude, ip_address, created_at_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                submission.card_number,
                submission.merchant,
                submission.amount,
                submission.category_index,
                submission.latitude,
                submission.longitude,
                ip_address,
                to_millis(&created_at),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(Transaction {
            id,
            card_number: submission.card_number.clone(),
            merchant: submission.merchant.clone(),
            amount: submission.amount,
            category_index: submission.category_index,
            latitude: submission.latitude,
            longitude: submission.longitude,
            ip_address,
            // Round-trip through the stored precision so reads match.
            created_at: from_millis(to_millis(&created_at))?,
            risk_score: 0.0,
            is_fraud: false,
            suspicious_ip: false,
        })
    }

    /// Write the pipeline's decision. Each transaction accepts exactly one.
    pub fn record_decision(
        &self,
        transaction_id: TransactionId,
        risk_score: f64,
        is_fraud: bool,
    ) -> ScoreResult<()> {
        let updated = self.conn.execute(
            "UPDATE card_transaction SET risk_score = ?1, is_fraud = ?2, scored = 1
             WHERE id = ?3 AND scored = 0",
            params![risk_score, is_fraud as i32, transaction_id],
        )?;
        if updated == 0 {
            return Err(ScoreError::AlreadyScored { transaction_id });
        }
        Ok(())
    }

    pub fn get_transaction(&self, transaction_id: TransactionId) -> ScoreResult<Option<Transaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM card_transaction WHERE id = ?1");
        let tx = self
            .conn
            .query_row(&sql, params![transaction_id], transaction_from_row)
            .optional()?;
        Ok(tx)
    }

    /// Every transaction on the card that arrived before `before_id`, oldest first.
    pub fn transactions_before(
        &self,
        card_number: &str,
        before_id: TransactionId,
    ) -> ScoreResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM card_transaction
             WHERE card_number = ?1 AND id < ?2
             ORDER BY id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![card_number, before_id], transaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every transaction on the card, oldest first.
    pub fn transactions_for_card(&self, card_number: &str) -> ScoreResult<Vec<Transaction>> {
        self.transactions_before(card_number, TransactionId::MAX)
    }

    pub fn transaction_count(&self, card_number: &str) -> ScoreResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM card_transaction WHERE card_number = ?1",
            params![card_number],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn fraud_count(&self, card_number: &str) -> ScoreResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM card_transaction WHERE card_number = ?1 AND is_fraud = 1",
            params![card_number],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
