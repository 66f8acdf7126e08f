//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use mockbank_core::config::LifecycleConfig;
use mockbank_core::lifecycle::{NewTransaction, TransactionLifecycle};
use mockbank_core::models::{
    Account, AccountKind, Category, ComplianceLog, FraudAlert, KycStatus, Loan, MarketAsset,
    Portfolio, RiskEvent, SimulationState, Transaction, TransactionMetadata, User,
};
use mockbank_core::store::{BankStore, Filter, MemoryStore, StoreError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// Insert a verified user with one checking account funded with `opening`
pub fn funded_account<S: BankStore + ?Sized>(
    store: &S,
    persona: &str,
    opening: i64,
    now: DateTime<Utc>,
) -> (String, String) {
    let mut user = User::new("Test Holder", "holder@mockbank.test", persona, now);
    user.kyc_status = KycStatus::Verified;
    let user_id = user.id.clone();
    store.insert_user(user).unwrap();

    let account = Account::new(user_id.clone(), AccountKind::Checking, persona, now);
    let account_id = account.id().to_string();
    store.insert_account(account).unwrap();

    if opening > 0 {
        let config = LifecycleConfig::default();
        TransactionLifecycle::new(store, &config)
            .post_immediately(
                now,
                NewTransaction::credit(
                    &account_id,
                    opening,
                    TransactionMetadata::new(Category::Deposit),
                ),
            )
            .unwrap();
    }
    (user_id, account_id)
}

/// Signed sum of every posted and pending transaction on the account
pub fn ledger_balance<S: BankStore + ?Sized>(store: &S, account_id: &str) -> i64 {
    store
        .transactions_for_account(account_id)
        .unwrap()
        .iter()
        .filter(|tx| tx.affects_balance())
        .map(|tx| tx.signed_amount())
        .sum()
}

/// Assert the balance invariant for every account in the store
pub fn assert_no_drift<S: BankStore + ?Sized>(store: &S) {
    for account in store.list_accounts(&|_: &Account| true).unwrap() {
        assert_eq!(
            account.balance(),
            ledger_balance(store, account.id()),
            "balance drift on account {}",
            account.id()
        );
    }
}

// ============================================================================
// FlakyStore: MemoryStore with switchable write failures
// ============================================================================

pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_account_updates: AtomicBool,
    fail_transaction_updates: AtomicBool,
    fail_loan_updates: AtomicBool,
    failing_accounts: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_account_updates: AtomicBool::new(false),
            fail_transaction_updates: AtomicBool::new(false),
            fail_loan_updates: AtomicBool::new(false),
            failing_accounts: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_account_updates(&self, on: bool) {
        self.fail_account_updates.store(on, Ordering::SeqCst);
    }

    pub fn fail_transaction_updates(&self, on: bool) {
        self.fail_transaction_updates.store(on, Ordering::SeqCst);
    }

    pub fn fail_loan_updates(&self, on: bool) {
        self.fail_loan_updates.store(on, Ordering::SeqCst);
    }

    /// Fail every update of one account only
    pub fn fail_account(&self, account_id: &str) {
        self.failing_accounts
            .lock()
            .unwrap()
            .insert(account_id.to_string());
    }

    fn down() -> StoreError {
        StoreError::Unavailable("injected failure".to_string())
    }
}

impl BankStore for FlakyStore {
    fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.inner.insert_user(user)
    }
    fn get_user(&self, id: &str) -> Result<User, StoreError> {
        self.inner.get_user(id)
    }
    fn update_user(&self, user: &User) -> Result<(), StoreError> {
        self.inner.update_user(user)
    }
    fn list_users(&self, filter: Filter<'_, User>) -> Result<Vec<User>, StoreError> {
        self.inner.list_users(filter)
    }

    fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        self.inner.insert_account(account)
    }
    fn get_account(&self, id: &str) -> Result<Account, StoreError> {
        self.inner.get_account(id)
    }
    fn update_account(&self, account: &Account) -> Result<(), StoreError> {
        if self.fail_account_updates.load(Ordering::SeqCst)
            || self.failing_accounts.lock().unwrap().contains(account.id())
        {
            return Err(Self::down());
        }
        self.inner.update_account(account)
    }
    fn list_accounts(&self, filter: Filter<'_, Account>) -> Result<Vec<Account>, StoreError> {
        self.inner.list_accounts(filter)
    }

    fn insert_transaction(&self, tx: Transaction) -> Result<(), StoreError> {
        self.inner.insert_transaction(tx)
    }
    fn get_transaction(&self, id: &str) -> Result<Transaction, StoreError> {
        self.inner.get_transaction(id)
    }
    fn update_transaction(&self, tx: &Transaction) -> Result<(), StoreError> {
        if self.fail_transaction_updates.load(Ordering::SeqCst) {
            return Err(Self::down());
        }
        self.inner.update_transaction(tx)
    }
    fn list_transactions(
        &self,
        filter: Filter<'_, Transaction>,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.inner.list_transactions(filter)
    }

    fn insert_loan(&self, loan: Loan) -> Result<(), StoreError> {
        self.inner.insert_loan(loan)
    }
    fn get_loan(&self, id: &str) -> Result<Loan, StoreError> {
        self.inner.get_loan(id)
    }
    fn update_loan(&self, loan: &Loan) -> Result<(), StoreError> {
        if self.fail_loan_updates.load(Ordering::SeqCst) {
            return Err(Self::down());
        }
        self.inner.update_loan(loan)
    }
    fn list_loans(&self, filter: Filter<'_, Loan>) -> Result<Vec<Loan>, StoreError> {
        self.inner.list_loans(filter)
    }

    fn insert_asset(&self, asset: MarketAsset) -> Result<(), StoreError> {
        self.inner.insert_asset(asset)
    }
    fn get_asset(&self, symbol: &str) -> Result<MarketAsset, StoreError> {
        self.inner.get_asset(symbol)
    }
    fn update_asset(&self, asset: &MarketAsset) -> Result<(), StoreError> {
        self.inner.update_asset(asset)
    }
    fn list_assets(&self) -> Result<Vec<MarketAsset>, StoreError> {
        self.inner.list_assets()
    }

    fn insert_portfolio(&self, portfolio: Portfolio) -> Result<(), StoreError> {
        self.inner.insert_portfolio(portfolio)
    }
    fn get_portfolio(&self, id: &str) -> Result<Portfolio, StoreError> {
        self.inner.get_portfolio(id)
    }
    fn update_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        self.inner.update_portfolio(portfolio)
    }
    fn list_portfolios(&self, filter: Filter<'_, Portfolio>) -> Result<Vec<Portfolio>, StoreError> {
        self.inner.list_portfolios(filter)
    }

    fn append_risk_event(&self, event: RiskEvent) -> Result<(), StoreError> {
        self.inner.append_risk_event(event)
    }
    fn list_risk_events(&self, filter: Filter<'_, RiskEvent>) -> Result<Vec<RiskEvent>, StoreError> {
        self.inner.list_risk_events(filter)
    }

    fn append_fraud_alert(&self, alert: FraudAlert) -> Result<(), StoreError> {
        self.inner.append_fraud_alert(alert)
    }
    fn list_fraud_alerts(
        &self,
        filter: Filter<'_, FraudAlert>,
    ) -> Result<Vec<FraudAlert>, StoreError> {
        self.inner.list_fraud_alerts(filter)
    }

    fn append_compliance_log(&self, log: ComplianceLog) -> Result<(), StoreError> {
        self.inner.append_compliance_log(log)
    }
    fn list_compliance_logs(
        &self,
        filter: Filter<'_, ComplianceLog>,
    ) -> Result<Vec<ComplianceLog>, StoreError> {
        self.inner.list_compliance_logs(filter)
    }

    fn get_state(&self) -> Result<SimulationState, StoreError> {
        self.inner.get_state()
    }
    fn put_state(&self, state: &SimulationState) -> Result<(), StoreError> {
        self.inner.put_state(state)
    }
}
