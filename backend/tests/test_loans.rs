//! Loan pricing, origination, collection, and default.

mod common;

use chrono::{DateTime, Utc};
use common::{assert_no_drift, at, funded_account, FlakyStore};
use mockbank_core::config::{LifecycleConfig, LoanConfig};
use mockbank_core::engines::{
    monthly_interest, monthly_payment, CollectionOutcome, LoanApplication, LoanEngine, LoanError,
};
use mockbank_core::models::{
    Account, AccountKind, Category, KycStatus, Loan, LoanStatus, RiskEvent, RiskEventKind,
    Transaction, User,
};
use mockbank_core::store::{BankStore, MemoryStore};

fn application(user_id: &str, account_id: &str, amount: i64, term: u32) -> LoanApplication {
    LoanApplication {
        user_id: user_id.to_string(),
        account_id: account_id.to_string(),
        amount,
        term_months: term,
        purpose: "home_improvement".to_string(),
    }
}

fn set_risk<S: BankStore>(store: &S, user_id: &str, score: f64) {
    let mut user = store.get_user(user_id).unwrap();
    user.risk_score = score;
    store.update_user(&user).unwrap();
}

fn due_at(loan: &Loan) -> DateTime<Utc> {
    loan.next_payment_date
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
        .and_utc()
}

// ============================================================================
// Pricing
// ============================================================================

#[test]
fn test_payment_is_rounded_up() {
    assert_eq!(monthly_payment(500_000, 0.085, 24), 22_728);
    assert_eq!(monthly_payment(120_000, 0.0, 12), 10_000);
}

#[test]
fn test_on_time_payments_retire_the_balance() {
    let rate = 0.085;
    let payment = monthly_payment(500_000, rate, 24);
    let mut remaining = 500_000i64;
    for _ in 0..24 {
        let owed = remaining + monthly_interest(remaining, rate);
        remaining = owed - payment.min(owed);
    }
    assert!(remaining <= 0);
}

// ============================================================================
// Origination
// ============================================================================

#[test]
fn test_auto_approval_disburses() {
    let store = MemoryStore::new();
    let now = at(2024, 1, 10, 11, 0);
    let (user_id, account_id) = funded_account(&store, "family", 100_000, now);
    let config = LoanConfig::default();
    let lifecycle = LifecycleConfig::default();

    let loan = LoanEngine::new(&config, &lifecycle)
        .apply(&store, now, application(&user_id, &account_id, 400_000, 12))
        .unwrap();

    assert_eq!(loan.status, LoanStatus::Active);
    assert!((loan.interest_rate - config.base_rate).abs() < 1e-12);
    assert_eq!(loan.monthly_payment, 34_243);
    assert_eq!(loan.approved_at, Some(now));
    assert_eq!(
        loan.next_payment_date,
        Some(chrono::NaiveDate::from_ymd_opt(2024, 2, 10).unwrap())
    );
    assert_eq!(store.get_account(&account_id).unwrap().balance(), 500_000);

    let disbursement: Vec<Transaction> = store
        .transactions_for_account(&account_id)
        .unwrap()
        .into_iter()
        .filter(|t| t.category() == Category::LoanDisbursement)
        .collect();
    assert_eq!(disbursement.len(), 1);
    assert!(disbursement[0].is_posted());
    assert_eq!(disbursement[0].metadata().reference.as_deref(), Some(loan.id.as_str()));
    assert_no_drift(&store);
}

#[test]
fn test_moderate_risk_waits_for_approval() {
    let store = MemoryStore::new();
    let now = at(2024, 1, 10, 11, 0);
    let (user_id, account_id) = funded_account(&store, "family", 100_000, now);
    set_risk(&store, &user_id, 50.0);
    let config = LoanConfig::default();
    let lifecycle = LifecycleConfig::default();
    let engine = LoanEngine::new(&config, &lifecycle);

    let pending = engine
        .apply(&store, now, application(&user_id, &account_id, 250_000, 24))
        .unwrap();
    assert_eq!(pending.status, LoanStatus::Pending);
    assert!((pending.interest_rate - 0.125).abs() < 1e-12);
    assert_eq!(store.get_account(&account_id).unwrap().balance(), 100_000);

    let active = engine.approve(&store, now, &pending.id).unwrap();
    assert_eq!(active.status, LoanStatus::Active);
    assert_eq!(store.get_account(&account_id).unwrap().balance(), 350_000);

    // Active loans cannot be approved twice
    let err = engine.approve(&store, now, &pending.id).unwrap_err();
    assert_eq!(err.code(), "INVALID_STATUS");
}

#[test]
fn test_ineligible_applications_are_stored_rejected() {
    let store = MemoryStore::new();
    let now = at(2024, 1, 10, 11, 0);
    let user = User::new("Una Verified", "una@mockbank.test", "student", now);
    assert_eq!(user.kyc_status, KycStatus::Unverified);
    let user_id = user.id.clone();
    store.insert_user(user).unwrap();
    let account = Account::new(user_id.clone(), AccountKind::Checking, "student", now);
    let account_id = account.id().to_string();
    store.insert_account(account).unwrap();

    let config = LoanConfig::default();
    let lifecycle = LifecycleConfig::default();
    let loan = LoanEngine::new(&config, &lifecycle)
        .apply(&store, now, application(&user_id, &account_id, 50_000, 12))
        .unwrap();

    assert_eq!(loan.status, LoanStatus::Rejected);
    assert!(loan.rejection_reason.is_some());
    assert_eq!(store.get_loan(&loan.id).unwrap().status, LoanStatus::Rejected);
    assert_eq!(store.get_account(&account_id).unwrap().balance(), 0);
}

#[test]
fn test_debt_ratio_rejects() {
    let store = MemoryStore::new();
    let now = at(2024, 1, 10, 11, 0);
    let (user_id, account_id) = funded_account(&store, "student", 100_000, now);
    let config = LoanConfig::default();
    let lifecycle = LifecycleConfig::default();
    let engine = LoanEngine::new(&config, &lifecycle);

    // Existing debt of 4x the balance
    store
        .insert_loan(Loan {
            id: "loan-existing".to_string(),
            user_id: user_id.clone(),
            account_id: account_id.clone(),
            principal: 450_000,
            remaining_amount: 400_000,
            interest_rate: 0.08,
            term_months: 36,
            monthly_payment: 14_102,
            payments_made: 2,
            payments_missed: 0,
            consecutive_missed: 0,
            status: LoanStatus::Active,
            purpose: "car".to_string(),
            applied_at: now,
            approved_at: Some(now),
            next_payment_date: None,
            last_payment_date: None,
            rejection_reason: None,
        })
        .unwrap();

    let second = engine
        .apply(&store, now, application(&user_id, &account_id, 100_000, 12))
        .unwrap();
    assert_eq!(second.status, LoanStatus::Rejected);
    assert!(second.rejection_reason.unwrap().contains("debt"));
}

#[test]
fn test_application_validation() {
    let store = MemoryStore::new();
    let now = at(2024, 1, 10, 11, 0);
    let (user_id, account_id) = funded_account(&store, "family", 100_000, now);
    let (_, other_account) = funded_account(&store, "family", 100_000, now);
    let config = LoanConfig::default();
    let lifecycle = LifecycleConfig::default();
    let engine = LoanEngine::new(&config, &lifecycle);

    let err = engine
        .apply(&store, now, application(&user_id, &account_id, 500, 12))
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_AMOUNT");

    let err = engine
        .apply(&store, now, application(&user_id, &account_id, 100_000, 600))
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TERM");

    let err = engine
        .apply(&store, now, application(&user_id, &other_account, 100_000, 12))
        .unwrap_err();
    assert!(matches!(err, LoanError::AccountMismatch { .. }));
    assert!(store.list_loans(&|_: &Loan| true).unwrap().is_empty());
}

#[test]
fn test_failed_disbursement_restores_pending() {
    let store = FlakyStore::new();
    let now = at(2024, 1, 10, 11, 0);
    let (user_id, account_id) = funded_account(&store, "family", 100_000, now);
    set_risk(&store, &user_id, 50.0);
    let config = LoanConfig::default();
    let lifecycle = LifecycleConfig::default();
    let engine = LoanEngine::new(&config, &lifecycle);

    let loan = engine
        .apply(&store, now, application(&user_id, &account_id, 250_000, 24))
        .unwrap();
    store.fail_account(&account_id);

    let err = engine.approve(&store, now, &loan.id).unwrap_err();
    assert!(matches!(err, LoanError::Posting(_)));
    assert!(!err.is_domain_failure());

    let stored = store.get_loan(&loan.id).unwrap();
    assert_eq!(stored.status, LoanStatus::Pending);
    assert_eq!(stored.approved_at, None);
    assert_eq!(store.get_account(&account_id).unwrap().balance(), 100_000);
    assert_no_drift(&store);
}

// ============================================================================
// Collection and default
// ============================================================================

#[test]
fn test_full_term_collection_pays_off() {
    let store = MemoryStore::new();
    let now = at(2024, 1, 10, 11, 0);
    let (user_id, account_id) = funded_account(&store, "family", 100_000, now);
    let config = LoanConfig::default();
    let lifecycle = LifecycleConfig::default();
    let engine = LoanEngine::new(&config, &lifecycle);
    let loan = engine
        .apply(&store, now, application(&user_id, &account_id, 400_000, 12))
        .unwrap();

    let mut collected = 0i64;
    for month in 1..=12 {
        let current = store.get_loan(&loan.id).unwrap();
        assert!(current.is_active(), "loan closed early at month {month}");
        let summary = engine.collect_due_payments(&store, due_at(&current)).unwrap();
        assert_eq!(summary.collected, 1);
        collected += summary.amount_collected;
    }

    let done = store.get_loan(&loan.id).unwrap();
    assert_eq!(done.status, LoanStatus::Paid);
    assert_eq!(done.remaining_amount, 0);
    assert_eq!(done.payments_made, 12);
    assert!(collected > 400_000);
    assert_eq!(
        store.get_account(&account_id).unwrap().balance(),
        500_000 - collected
    );
    assert_no_drift(&store);
}

#[test]
fn test_nothing_collected_before_due_date() {
    let store = MemoryStore::new();
    let now = at(2024, 1, 10, 11, 0);
    let (user_id, account_id) = funded_account(&store, "family", 100_000, now);
    let config = LoanConfig::default();
    let lifecycle = LifecycleConfig::default();
    let engine = LoanEngine::new(&config, &lifecycle);
    engine
        .apply(&store, now, application(&user_id, &account_id, 400_000, 12))
        .unwrap();

    let summary = engine
        .collect_due_payments(&store, at(2024, 2, 9, 23, 0))
        .unwrap();
    assert_eq!(summary.due, 0);
}

#[test]
fn test_three_missed_payments_default() {
    let store = MemoryStore::new();
    let now = at(2024, 1, 10, 11, 0);
    let (user_id, account_id) = funded_account(&store, "student", 0, now);
    let config = LoanConfig::default();
    let lifecycle = LifecycleConfig::default();
    let engine = LoanEngine::new(&config, &lifecycle);
    let loan = engine
        .apply(&store, now, application(&user_id, &account_id, 100_000, 12))
        .unwrap();

    let mut account = store.get_account(&account_id).unwrap();
    account.freeze();
    store.update_account(&account).unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        let current = store.get_loan(&loan.id).unwrap();
        let summary = engine.collect_due_payments(&store, due_at(&current)).unwrap();
        outcomes.extend(summary.outcomes);
    }

    assert!(matches!(outcomes[0], CollectionOutcome::Missed { consecutive: 1, .. }));
    assert!(matches!(outcomes[1], CollectionOutcome::Missed { consecutive: 2, .. }));
    assert!(matches!(outcomes[2], CollectionOutcome::Defaulted { .. }));

    let defaulted = store.get_loan(&loan.id).unwrap();
    assert_eq!(defaulted.status, LoanStatus::Defaulted);
    assert_eq!(defaulted.payments_missed, 3);
    // Missed interest is capitalized
    assert!(defaulted.remaining_amount > 100_000);

    let events = store.list_risk_events(&|e: &RiskEvent| e.user_id == user_id).unwrap();
    let missed = events
        .iter()
        .filter(|e| matches!(e.kind, RiskEventKind::MissedPayment { .. }))
        .count();
    let defaults = events
        .iter()
        .filter(|e| matches!(e.kind, RiskEventKind::LoanDefault { .. }))
        .count();
    assert_eq!(missed, 3);
    assert_eq!(defaults, 1);

    // Defaulted loans are no longer due
    let later = engine
        .collect_due_payments(&store, at(2024, 12, 31, 12, 0))
        .unwrap();
    assert_eq!(later.due, 0);
}

#[test]
fn test_one_failing_loan_does_not_stop_collection() {
    let store = FlakyStore::new();
    let now = at(2024, 1, 10, 11, 0);
    let (user_a, account_a) = funded_account(&store, "family", 100_000, now);
    let (user_b, account_b) = funded_account(&store, "family", 100_000, now);
    let config = LoanConfig::default();
    let lifecycle = LifecycleConfig::default();
    let engine = LoanEngine::new(&config, &lifecycle);
    engine
        .apply(&store, now, application(&user_a, &account_a, 100_000, 12))
        .unwrap();
    engine
        .apply(&store, now, application(&user_b, &account_b, 100_000, 12))
        .unwrap();

    store.fail_account(&account_a);
    let summary = engine
        .collect_due_payments(&store, at(2024, 2, 10, 12, 0))
        .unwrap();

    assert_eq!(summary.due, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.collected, 1);
    assert_no_drift(&store);
}
