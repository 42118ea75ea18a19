//! Paper-trading challenge: enrollment, trading, milestones, prizes and
//! the credit ledger working together.

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

use market_oracle::challenge::{ChallengeService, TradeRequest};
use market_oracle::config::ChallengeConfig;
use market_oracle::credits::{CreditLedger, MILESTONE_REWARD, PRIZE};
use market_oracle::storage::Store;
use market_oracle::types::{Enrollment, EnrollmentStatus, TradeSide};

use crate::mock_providers::MockQuotes;

async fn setup(quotes: Arc<MockQuotes>) -> (ChallengeService, CreditLedger, Store) {
    let store = Store::in_memory().await.unwrap();
    let config = ChallengeConfig::default();
    let ledger = CreditLedger::new(store.clone(), config.starting_credits);
    let service = ChallengeService::new(store.clone(), quotes, ledger.clone(), config);
    (service, ledger, store)
}

#[tokio::test]
async fn test_day_90_with_12_percent_return() {
    let (service, ledger, store) = setup(MockQuotes::with_prices(&[])).await;
    let now = Utc::now();

    // 89 days in, cash up 12%, earlier checks already paid day_30 and day_60
    let mut enrollment = Enrollment::new("trader", &service.config().id, dec!(100000), now - Duration::days(89));
    enrollment.balance = dec!(112000);
    enrollment.milestones_achieved = vec!["day_30".into(), "day_60".into()];
    enrollment.milestones_count = 2;
    store.insert_enrollment(&enrollment).await.unwrap();

    let check = service.check_milestones("trader", now).await.unwrap();
    assert_eq!(check.enrollment.current_day, 90);
    assert!((check.enrollment.total_return_percent - 12.0).abs() < 1e-9);

    let names: Vec<&str> = check.newly_achieved.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["complete_challenge", "10_percent_gain"]);
    assert_eq!(check.credits_awarded, 1200);
    assert_eq!(ledger.balance("trader").await.unwrap(), 100 + 1200);

    // Re-checking the same state pays nothing
    let again = service.check_milestones("trader", now).await.unwrap();
    assert!(again.newly_achieved.is_empty());
    assert_eq!(again.enrollment.milestones_count, 4);
    assert_eq!(ledger.balance("trader").await.unwrap(), 1300);

    let rewards: Vec<_> = ledger
        .history("trader", 10)
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.transaction_type == MILESTONE_REWARD)
        .collect();
    assert_eq!(rewards.len(), 2);
}

#[tokio::test]
async fn test_full_challenge_with_prizes() {
    let quotes = MockQuotes::with_prices(&[("AAPL", 100.0)]);
    let (service, ledger, _) = setup(quotes.clone()).await;
    let now = Utc::now();

    service.enroll("alice", now).await.unwrap();
    service.enroll("bob", now).await.unwrap();

    let buy = TradeRequest { ticker: "AAPL".into(), side: TradeSide::Buy, quantity: dec!(500) };
    let out = service.trade("alice", &buy, now).await.unwrap();
    assert_eq!(out.enrollment.balance, dec!(50000));

    // AAPL +30% marks alice's book to 115,000
    quotes.set("AAPL", 130.0);
    let check = service.check_milestones("alice", now + Duration::days(1)).await.unwrap();
    assert_eq!(check.enrollment.portfolio_value, dec!(115000));
    assert_eq!(check.enrollment.current_day, 2);
    let names: Vec<&str> = check.newly_achieved.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["first_trade", "10_percent_gain"]);
    assert_eq!(check.credits_awarded, 250);

    let alice = service.complete("alice", now + Duration::days(2)).await.unwrap();
    assert_eq!(alice.rank, 1);
    assert_eq!(alice.enrollment.final_rank, Some(1));
    assert_eq!(alice.prize.as_ref().unwrap().credits, 5000);

    let bob = service.complete("bob", now + Duration::days(2)).await.unwrap();
    assert_eq!(bob.rank, 2);
    assert_eq!(bob.prize.as_ref().unwrap().credits, 2500);

    assert_eq!(ledger.balance("alice").await.unwrap(), 100 + 250 + 5000);
    assert_eq!(ledger.balance("bob").await.unwrap(), 100 + 2500);
    let prizes = ledger.history("alice", 10).await.unwrap();
    assert_eq!(prizes.iter().filter(|t| t.transaction_type == PRIZE).count(), 1);

    let board = service.leaderboard(10).await.unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0].user_id, "alice");
    assert_eq!(board[0].status, EnrollmentStatus::Completed);

    // A finished challenge can be re-entered
    let fresh = service.enroll("alice", now + Duration::days(3)).await.unwrap();
    assert_eq!(fresh.balance, dec!(100000));
    let status = service.status("alice").await.unwrap();
    assert_eq!(status.enrollment.id, fresh.id);
    assert!(status.holdings.is_empty());
}

#[tokio::test]
async fn test_revaluation_keeps_last_price_on_outage() {
    let quotes = MockQuotes::with_prices(&[("MSFT", 400.0)]);
    let (service, _, _) = setup(quotes.clone()).await;
    let now = Utc::now();
    service.enroll("carol", now).await.unwrap();

    let buy = TradeRequest { ticker: "msft".into(), side: TradeSide::Buy, quantity: dec!(10) };
    service.trade("carol", &buy, now).await.unwrap();

    quotes.set_error("rate limited");
    let check = service.check_milestones("carol", now).await.unwrap();
    assert_eq!(check.enrollment.portfolio_value, dec!(100000));
    assert_eq!(check.enrollment.total_return_percent, 0.0);
}

#[tokio::test]
async fn test_abandoned_user_can_reenroll() {
    let (service, _, _) = setup(MockQuotes::with_prices(&[])).await;
    let now = Utc::now();
    service.enroll("dave", now).await.unwrap();
    assert_err!(service.enroll("dave", now).await);
    let abandoned = assert_ok!(service.abandon("dave", now).await);
    assert_eq!(abandoned.status, EnrollmentStatus::Abandoned);

    assert_ok!(service.enroll("dave", now + Duration::seconds(1)).await);
    assert!(service.leaderboard(10).await.unwrap().iter().all(|s| s.status != EnrollmentStatus::Abandoned));
}
