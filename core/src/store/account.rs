use super::{finite_or_null, from_millis, to_millis, FraudStore};
use crate::{
    account::Account,
    clustering::SpendingHabits,
    error::{ScoreError, ScoreResult},
    hmm::{HmmParams, NUM_STATES, NUM_SYMBOLS},
};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// The matrix half of the model, stored as one JSON column.
#[derive(Serialize, Deserialize)]
struct StoredMatrices {
    pi: [f64; NUM_STATES],
    a: [[f64; NUM_STATES]; NUM_STATES],
    b: [[f64; NUM_SYMBOLS]; NUM_STATES],
}

impl FraudStore {
    // ── Account ───────────────────────────────────────────────────

    pub fn insert_account(&self, account: &Account) -> ScoreResult<()> {
        let matrices = matrices_json(&account.model)?;
        let habits = account.spending_habits;
        self.conn.execute(
            "INSERT INTO account (
                card_number, card_holder, merchant, created_at_ms,
                habit_low, habit_average, habit_high,
                hmm_matrices, log_prob, old_log_prob
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                account.card_number,
                account.card_holder,
                account.merchant,
                to_millis(&account.created_at),
                habits.map(|h| h.low),
                habits.map(|h| h.average),
                habits.map(|h| h.high),
                matrices,
                finite_or_null(account.model.log_prob),
                finite_or_null(account.model.old_log_prob),
            ],
        )?;
        Ok(())
    }

    pub fn get_account(&self, card_number: &str) -> ScoreResult<Option<Account>> {
        let row = self
            .conn
            .query_row(
                "SELECT card_number, card_holder, merchant, created_at_ms,
                        habit_low, habit_average, habit_high,
                        hmm_matrices, log_prob, old_log_prob
                 FROM account WHERE card_number = ?1",
                params![card_number],
                |row| {
                    let habits = match (
                        row.get::<_, Option<f64>>(4)?,
                        row.get::<_, Option<f64>>(5)?,
                        row.get::<_, Option<f64>>(6)?,
                    ) {
                        (Some(low), Some(average), Some(high)) => {
                            Some(SpendingHabits { low, average, high })
                        }
                        _ => None,
                    };
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        from_millis(row.get(3)?)?,
                        habits,
                        row.get::<_, String>(7)?,
                        row.get::<_, Option<f64>>(8)?,
                        row.get::<_, Option<f64>>(9)?,
                    ))
                },
            )
            .optional()?;

        let Some((card_number, card_holder, merchant, created_at, spending_habits, matrices, log_prob, old_log_prob)) =
            row
        else {
            return Ok(None);
        };

        let stored: StoredMatrices = serde_json::from_str(&matrices)?;
        let mut model = HmmParams::from_parts(stored.pi, stored.a, stored.b);
        model.log_prob = log_prob.unwrap_or(f64::NEG_INFINITY);
        model.old_log_prob = old_log_prob.unwrap_or(f64::NEG_INFINITY);

        Ok(Some(Account {
            card_number,
            card_holder,
            merchant,
            created_at,
            spending_habits,
            model,
        }))
    }

    /// Persist thresholds and model parameters after a training cycle.
    pub fn save_account_model(&self, account: &Account) -> ScoreResult<()> {
        let matrices = matrices_json(&account.model)?;
        let habits = account.spending_habits;
        let updated = self.conn.execute(
            "UPDATE account SET
                habit_low = ?1, habit_average = ?2, habit_high = ?3,
                hmm_matrices = ?4, log_prob = ?5, old_log_prob = ?6
             WHERE card_number = ?7",
            params![
                habits.map(|h| h.low),
                habits.map(|h| h.average),
                habits.map(|h| h.high),
                matrices,
                finite_or_null(account.model.log_prob),
                finite_or_null(account.model.old_log_prob),
                account.card_number,
            ],
        )?;
        if updated == 0 {
            return Err(ScoreError::AccountNotFound {
                card_number: account.card_number.clone(),
            });
        }
        Ok(())
    }

    pub fn account_count(&self) -> ScoreResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM account", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn matrices_json(model: &HmmParams) -> ScoreResult<String> {
    let stored = StoredMatrices {
        pi: model.pi,
        a: model.a,
        b: model.b,
    };
    Ok(serde_json::to_string(&stored)?)
}
