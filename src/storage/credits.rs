//! Append-only credit ledger with a cached per-user balance.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::Store;
use crate::types::CreditTransaction;

#[derive(Debug, FromRow)]
struct CreditRow {
    id: String,
    user_id: String,
    amount: i64,
    transaction_type: String,
    description: String,
    created_at: DateTime<Utc>,
}

impl From<CreditRow> for CreditTransaction {
    fn from(row: CreditRow) -> Self {
        CreditTransaction {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            transaction_type: row.transaction_type,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

impl Store {
    /// Cached balance, or `None` if the user has never touched the ledger.
    pub async fn credit_balance(&self, user_id: &str) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT balance FROM user_credits WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load credit balance")?;
        Ok(row.map(|(balance,)| balance))
    }

    /// Append a ledger entry and move the cached balance by its amount,
    /// atomically. Returns the new balance.
    pub async fn append_credit(&self, entry: &CreditTransaction) -> Result<i64> {
        let mut tx = self.pool.begin().await.context("Failed to open ledger transaction")?;

        sqlx::query(
            "INSERT INTO credit_transactions (id, user_id, amount, transaction_type, description, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(entry.amount)
        .bind(&entry.transaction_type)
        .bind(&entry.description)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to append ledger entry")?;

        sqlx::query(
            "INSERT INTO user_credits (user_id, balance) VALUES (?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET balance = balance + excluded.balance",
        )
        .bind(&entry.user_id)
        .bind(entry.amount)
        .execute(&mut *tx)
        .await
        .context("Failed to update cached balance")?;

        let (balance,): (i64,) = sqlx::query_as("SELECT balance FROM user_credits WHERE user_id = ?")
            .bind(&entry.user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await.context("Failed to commit ledger entry")?;
        Ok(balance)
    }

    /// Newest-first ledger entries for a user.
    pub async fn credit_history(&self, user_id: &str, limit: i64) -> Result<Vec<CreditTransaction>> {
        let rows: Vec<CreditRow> = sqlx::query_as(
            "SELECT id, user_id, amount, transaction_type, description, created_at \
             FROM credit_transactions WHERE user_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load credit history")?;
        Ok(rows.into_iter().map(CreditTransaction::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user: &str, amount: i64, kind: &str) -> CreditTransaction {
        CreditTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            amount,
            transaction_type: kind.to_string(),
            description: format!("{kind} {amount}"),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_balance() {
        let store = Store::in_memory().await.unwrap();
        assert_eq!(store.credit_balance("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_append_moves_balance() {
        let store = Store::in_memory().await.unwrap();
        assert_eq!(store.append_credit(&entry("u1", 100, "signup_bonus")).await.unwrap(), 100);
        assert_eq!(store.append_credit(&entry("u1", -10, "scenario")).await.unwrap(), 90);
        assert_eq!(store.credit_balance("u1").await.unwrap(), Some(90));

        let history = store.credit_history("u1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        let sum: i64 = history.iter().map(|t| t.amount).sum();
        assert_eq!(sum, 90);
    }

    #[tokio::test]
    async fn test_history_is_per_user() {
        let store = Store::in_memory().await.unwrap();
        store.append_credit(&entry("u1", 50, "milestone")).await.unwrap();
        store.append_credit(&entry("u2", 70, "milestone")).await.unwrap();
        assert_eq!(store.credit_history("u1", 10).await.unwrap().len(), 1);
        assert_eq!(store.credit_balance("u2").await.unwrap(), Some(70));
    }
}
