//! Credit ledger service.
//!
//! Credits are an internal currency: milestones and prizes pay them out,
//! scenario simulations consume them. Every movement is an append-only
//! ledger entry; the per-user balance is a cache kept in step with it.

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::storage::Store;
use crate::types::CreditTransaction;

pub const SIGNUP_BONUS: &str = "signup_bonus";
pub const MILESTONE_REWARD: &str = "milestone_reward";
pub const PRIZE: &str = "prize";
pub const SCENARIO_SIMULATION: &str = "scenario_simulation";

#[derive(Clone)]
pub struct CreditLedger {
    store: Store,
    starting_credits: i64,
}

impl CreditLedger {
    pub fn new(store: Store, starting_credits: i64) -> Self {
        Self { store, starting_credits }
    }

    /// Current balance. A user's first touch grants the starting credits.
    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        if let Some(balance) = self.store.credit_balance(user_id).await? {
            return Ok(balance);
        }
        let balance = self
            .append(user_id, self.starting_credits, SIGNUP_BONUS, "Welcome credits")
            .await?;
        info!(user_id, balance, "Starting credits granted");
        Ok(balance)
    }

    /// Credit a positive amount; returns the new balance.
    pub async fn award(&self, user_id: &str, amount: i64, kind: &str, description: &str) -> Result<i64> {
        anyhow::ensure!(amount > 0, "Award amount must be positive, got {amount}");
        self.balance(user_id).await?;
        self.append(user_id, amount, kind, description).await
    }

    /// Debit `amount`, failing with 402 when the balance cannot cover it.
    pub async fn spend(&self, user_id: &str, amount: i64, kind: &str, description: &str) -> ApiResult<i64> {
        let balance = self.balance(user_id).await?;
        if balance < amount {
            return Err(ApiError::PaymentRequired(format!(
                "Insufficient credits: {amount} required, {balance} available"
            )));
        }
        Ok(self.append(user_id, -amount, kind, description).await?)
    }

    pub async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<CreditTransaction>> {
        self.balance(user_id).await?;
        self.store.credit_history(user_id, limit).await
    }

    async fn append(&self, user_id: &str, amount: i64, kind: &str, description: &str) -> Result<i64> {
        let entry = CreditTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount,
            transaction_type: kind.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        self.store.append_credit(&entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    async fn ledger() -> CreditLedger {
        CreditLedger::new(Store::in_memory().await.unwrap(), 100)
    }

    #[tokio::test]
    async fn test_first_touch_grants_starting_credits_once() {
        let ledger = ledger().await;
        assert_eq!(ledger.balance("u1").await.unwrap(), 100);
        assert_eq!(ledger.balance("u1").await.unwrap(), 100);
        let history = ledger.history("u1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].transaction_type, SIGNUP_BONUS);
    }

    #[tokio::test]
    async fn test_award_and_spend() {
        let ledger = ledger().await;
        assert_eq!(ledger.award("u1", 250, MILESTONE_REWARD, "day_30").await.unwrap(), 350);
        assert_eq!(ledger.spend("u1", 10, SCENARIO_SIMULATION, "what-if").await.unwrap(), 340);

        let history = ledger.history("u1", 10).await.unwrap();
        assert_eq!(history.iter().map(|t| t.amount).sum::<i64>(), 340);
    }

    #[tokio::test]
    async fn test_spend_beyond_balance_is_402() {
        let ledger = ledger().await;
        let err = ledger.spend("u1", 101, SCENARIO_SIMULATION, "too much").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(ledger.balance("u1").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_award_rejects_non_positive() {
        let ledger = ledger().await;
        assert!(ledger.award("u1", 0, PRIZE, "nothing").await.is_err());
    }
}
