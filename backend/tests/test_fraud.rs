//! Fraud review against stored transactions: scoring, alert persistence,
//! and the freeze cascade across a user's accounts.

mod common;

use chrono::{DateTime, Duration, Utc};
use common::{at, funded_account};
use mockbank_core::config::{FraudConfig, LifecycleConfig};
use mockbank_core::engines::FraudEngine;
use mockbank_core::lifecycle::{LifecycleError, NewTransaction, TransactionLifecycle};
use mockbank_core::models::{
    Account, AccountKind, Category, FraudAction, FraudAlert, FraudSignal, Severity, Transaction,
    TransactionMetadata,
};
use mockbank_core::store::{BankStore, MemoryStore};

fn debit(
    store: &MemoryStore,
    account_id: &str,
    now: DateTime<Utc>,
    amount: i64,
    merchant: &str,
) -> Transaction {
    let config = LifecycleConfig::default();
    TransactionLifecycle::new(store, &config)
        .create(
            now,
            NewTransaction::debit(
                account_id,
                amount,
                TransactionMetadata::new(Category::Shopping).with_merchant(merchant),
            ),
            None,
        )
        .unwrap()
}

fn alerts(store: &MemoryStore) -> Vec<FraudAlert> {
    store.list_fraud_alerts(&|_: &FraudAlert| true).unwrap()
}

// ============================================================================
// Scoring through the store
// ============================================================================

#[test]
fn test_credit_review_is_a_no_op() {
    let store = MemoryStore::new();
    let now = at(2024, 3, 4, 2, 0);
    let (_, account_id) = funded_account(&store, "family", 5_000_000, now);
    let deposit = store.transactions_for_account(&account_id).unwrap().remove(0);

    let config = FraudConfig::default();
    let review = FraudEngine::new(&config).review(&store, now, deposit.id()).unwrap();

    assert_eq!(review.assessment.score, 0);
    assert!(review.alert.is_none());
    assert_eq!(store.get_transaction(deposit.id()).unwrap().fraud_score(), None);
    assert!(alerts(&store).is_empty());
}

#[test]
fn test_low_score_is_recorded_without_alert() {
    let store = MemoryStore::new();
    let start = at(2024, 3, 4, 14, 0);
    let (_, account_id) = funded_account(&store, "student", 100_000, start);

    debit(&store, &account_id, start, 100, "CoffeeCart");
    debit(&store, &account_id, start + Duration::minutes(2), 150, "CoffeeCart");
    let third = debit(&store, &account_id, start + Duration::minutes(4), 120, "VendCo");

    let config = FraudConfig::default();
    let review = FraudEngine::new(&config)
        .review(&store, start + Duration::minutes(4), third.id())
        .unwrap();

    assert_eq!(review.assessment.score, config.small_points);
    assert!(matches!(
        review.assessment.signals[0].signal,
        FraudSignal::SmallAmountBurst { count: 3 }
    ));
    let stored = store.get_transaction(third.id()).unwrap();
    assert_eq!(stored.fraud_score(), Some(config.small_points));
    assert!(!stored.is_flagged());
    assert!(alerts(&store).is_empty());
}

#[test]
fn test_flagged_debit_persists_alert() {
    let store = MemoryStore::new();
    let start = at(2024, 3, 4, 3, 0);
    let (user_id, account_id) = funded_account(&store, "family", 500_000, start);

    for minute in 0..4 {
        debit(&store, &account_id, start + Duration::minutes(minute), 100, "VendCo");
    }
    debit(&store, &account_id, start + Duration::minutes(8), 60_000, "TechDepot");
    let suspicious = debit(&store, &account_id, start + Duration::minutes(10), 60_000, "TechDepot");

    let config = FraudConfig::default();
    let review = FraudEngine::new(&config)
        .review(&store, start + Duration::minutes(10), suspicious.id())
        .unwrap();

    // Large at night + velocity + duplicate
    assert_eq!(
        review.assessment.score,
        config.large_night_points + config.velocity_points + config.duplicate_points
    );
    assert_eq!(review.assessment.action, FraudAction::Flag);
    assert!(review.frozen_accounts.is_empty());

    let stored = alerts(&store);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].transaction_id, suspicious.id());
    assert_eq!(stored[0].user_id, user_id);
    assert_eq!(stored[0].severity, Severity::Medium);
    assert!(store.get_transaction(suspicious.id()).unwrap().is_flagged());
    assert!(!store.get_account(&account_id).unwrap().is_frozen());
}

// ============================================================================
// Freeze cascade
// ============================================================================

#[test]
fn test_freeze_covers_every_account_of_the_user() {
    let store = MemoryStore::new();
    let now = at(2024, 3, 4, 1, 30);
    let (user_id, checking_id) = funded_account(&store, "young_professional", 200_000, now);
    let savings = Account::new(user_id.clone(), AccountKind::Savings, "young_professional", now);
    let savings_id = savings.id().to_string();
    store.insert_account(savings).unwrap();
    let (_, bystander_id) = funded_account(&store, "family", 200_000, now);

    let tx = debit(&store, &checking_id, now, 80_000, "TechDepot");

    let config = FraudConfig {
        large_night_points: 95,
        ..FraudConfig::default()
    };
    let review = FraudEngine::new(&config).review(&store, now, tx.id()).unwrap();

    assert_eq!(review.assessment.action, FraudAction::Freeze);
    assert_eq!(review.frozen_accounts.len(), 2);
    assert!(store.get_account(&checking_id).unwrap().is_frozen());
    assert!(store.get_account(&savings_id).unwrap().is_frozen());
    assert!(!store.get_account(&bystander_id).unwrap().is_frozen());
    assert_eq!(alerts(&store)[0].severity, Severity::Critical);

    // Frozen accounts reject new activity
    let lifecycle_config = LifecycleConfig::default();
    let err = TransactionLifecycle::new(&store, &lifecycle_config)
        .create(
            now + Duration::minutes(1),
            NewTransaction::debit(&checking_id, 1_000, TransactionMetadata::new(Category::Dining)),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, LifecycleError::AccountFrozen { .. }));
}

#[test]
fn test_second_freeze_does_not_refreeze() {
    let store = MemoryStore::new();
    let now = at(2024, 3, 4, 1, 30);
    let (_, account_id) = funded_account(&store, "young_professional", 300_000, now);
    let first = debit(&store, &account_id, now, 80_000, "TechDepot");
    let second = debit(&store, &account_id, now + Duration::minutes(1), 90_000, "JetAway");

    let config = FraudConfig {
        large_night_points: 95,
        ..FraudConfig::default()
    };
    let engine = FraudEngine::new(&config);
    assert_eq!(engine.review(&store, now, first.id()).unwrap().frozen_accounts.len(), 1);

    let again = engine.review(&store, now, second.id()).unwrap();
    assert_eq!(again.assessment.action, FraudAction::Freeze);
    assert!(again.frozen_accounts.is_empty());
    assert_eq!(alerts(&store).len(), 2);
}
