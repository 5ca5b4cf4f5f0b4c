use super::{from_millis, to_millis, FraudStore};
use crate::{
    error::ScoreResult,
    ip_reputation::{BlacklistedIp, IpReputation},
    types::TransactionId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

impl FraudStore {
    // ── IP blacklist ──────────────────────────────────────────────

    /// Add an address, or update whether an existing entry is blocked.
    pub fn upsert_blacklisted_ip(
        &self,
        ip_address: &str,
        blocked: bool,
        added_at: DateTime<Utc>,
    ) -> ScoreResult<()> {
        self.conn.execute(
            "INSERT INTO blacklisted_ip (ip_address, blocked, added_at_ms)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(ip_address) DO UPDATE SET blocked = excluded.blocked",
            params![ip_address, blocked as i32, to_millis(&added_at)],
        )?;
        Ok(())
    }

    pub fn blacklisted_ips(&self) -> ScoreResult<Vec<BlacklistedIp>> {
        let mut stmt = self.conn.prepare(
            "SELECT ip_address, blocked, added_at_ms FROM blacklisted_ip
             ORDER BY ip_address ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(BlacklistedIp {
                    ip_address: row.get(0)?,
                    blocked: row.get::<_, i32>(1)? != 0,
                    added_at: from_millis(row.get(2)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn is_ip_blocked(&self, ip_address: &str) -> ScoreResult<bool> {
        let blocked = self
            .conn
            .query_row(
                "SELECT blocked FROM blacklisted_ip WHERE ip_address = ?1",
                params![ip_address],
                |row| row.get::<_, i32>(0),
            )
            .optional()?;
        Ok(blocked.unwrap_or(0) != 0)
    }

    /// Blacklist status and fraud record of an address, counting only
    /// transactions (on any card) that arrived before `before_id`.
    pub fn ip_reputation(
        &self,
        ip_address: &str,
        before_id: TransactionId,
    ) -> ScoreResult<IpReputation> {
        let prior_frauds = self.conn.query_row(
            "SELECT COUNT(*) FROM card_transaction
             WHERE ip_address = ?1 AND id < ?2 AND is_fraud = 1",
            params![ip_address, before_id],
            |row| row.get(0),
        )?;
        Ok(IpReputation {
            blacklisted: self.is_ip_blocked(ip_address)?,
            prior_frauds,
        })
    }

    /// Record on the transaction row that its address was suspicious.
    pub fn mark_suspicious_ip(&self, transaction_id: TransactionId) -> ScoreResult<()> {
        self.conn.execute(
            "UPDATE card_transaction SET suspicious_ip = 1 WHERE id = ?1",
            params![transaction_id],
        )?;
        Ok(())
    }
}
