//! Persistence seam
//!
//! The simulation core reads and writes entities only through [`BankStore`].
//! Implementations provide per-row consistency; nothing here spans a
//! transaction across several rows, so callers that touch more than one
//! entity must order their writes so a partial failure is recoverable.
//!
//! Writers that may race with each other (facade calls overlapping a
//! scheduled cycle) go through the `modify_*` operations, which apply a
//! change to the current row atomically instead of overwriting it with a
//! stale copy.

mod checkpoint;
mod memory;

pub use checkpoint::StoreSnapshot;
pub use memory::MemoryStore;

use crate::models::{
    Account, ComplianceLog, FraudAlert, Loan, MarketAsset, Portfolio, RiskEvent, SimulationState,
    Transaction, User,
};
use thiserror::Error;

/// Infrastructure failures of the backing store
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {id}")]
    Duplicate { entity: &'static str, id: String },

    /// Store unreachable or otherwise unable to serve the request
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Row filter used by the list operations
pub type Filter<'a, T> = &'a dyn Fn(&T) -> bool;

/// Verdict of a read-modify-write callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Store the modified row
    Commit,
    /// Leave the stored row as it was
    Abort,
}

/// Callback of the `modify_*` operations
pub type Mutation<'a, T> = &'a mut dyn FnMut(&mut T) -> Change;

/// CRUD access to every simulated entity
///
/// Listing returns rows in insertion order so that iteration over a store is
/// deterministic for a given history of writes.
pub trait BankStore: Send + Sync {
    fn insert_user(&self, user: User) -> Result<(), StoreError>;
    fn get_user(&self, id: &str) -> Result<User, StoreError>;
    fn update_user(&self, user: &User) -> Result<(), StoreError>;
    fn list_users(&self, filter: Filter<'_, User>) -> Result<Vec<User>, StoreError>;

    fn insert_account(&self, account: Account) -> Result<(), StoreError>;
    fn get_account(&self, id: &str) -> Result<Account, StoreError>;
    fn update_account(&self, account: &Account) -> Result<(), StoreError>;
    fn list_accounts(&self, filter: Filter<'_, Account>) -> Result<Vec<Account>, StoreError>;

    fn insert_transaction(&self, tx: Transaction) -> Result<(), StoreError>;
    fn get_transaction(&self, id: &str) -> Result<Transaction, StoreError>;
    fn update_transaction(&self, tx: &Transaction) -> Result<(), StoreError>;
    fn list_transactions(
        &self,
        filter: Filter<'_, Transaction>,
    ) -> Result<Vec<Transaction>, StoreError>;

    fn insert_loan(&self, loan: Loan) -> Result<(), StoreError>;
    fn get_loan(&self, id: &str) -> Result<Loan, StoreError>;
    fn update_loan(&self, loan: &Loan) -> Result<(), StoreError>;
    fn list_loans(&self, filter: Filter<'_, Loan>) -> Result<Vec<Loan>, StoreError>;

    fn insert_asset(&self, asset: MarketAsset) -> Result<(), StoreError>;
    fn get_asset(&self, symbol: &str) -> Result<MarketAsset, StoreError>;
    fn update_asset(&self, asset: &MarketAsset) -> Result<(), StoreError>;
    fn list_assets(&self) -> Result<Vec<MarketAsset>, StoreError>;

    fn insert_portfolio(&self, portfolio: Portfolio) -> Result<(), StoreError>;
    fn get_portfolio(&self, id: &str) -> Result<Portfolio, StoreError>;
    fn update_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError>;
    fn list_portfolios(&self, filter: Filter<'_, Portfolio>)
        -> Result<Vec<Portfolio>, StoreError>;

    fn append_risk_event(&self, event: RiskEvent) -> Result<(), StoreError>;
    fn list_risk_events(&self, filter: Filter<'_, RiskEvent>)
        -> Result<Vec<RiskEvent>, StoreError>;

    fn append_fraud_alert(&self, alert: FraudAlert) -> Result<(), StoreError>;
    fn list_fraud_alerts(&self, filter: Filter<'_, FraudAlert>)
        -> Result<Vec<FraudAlert>, StoreError>;

    fn append_compliance_log(&self, log: ComplianceLog) -> Result<(), StoreError>;
    fn list_compliance_logs(
        &self,
        filter: Filter<'_, ComplianceLog>,
    ) -> Result<Vec<ComplianceLog>, StoreError>;

    fn get_state(&self) -> Result<SimulationState, StoreError>;
    fn put_state(&self, state: &SimulationState) -> Result<(), StoreError>;

    /// Apply `change` to the current account row and return the row as stored
    ///
    /// The default reads then writes through [`BankStore::update_account`]
    /// and is only atomic for single-threaded use. Stores shared across
    /// threads override it to hold their write lock for the whole change.
    fn modify_account(&self, id: &str, change: Mutation<'_, Account>) -> Result<Account, StoreError> {
        let mut account = self.get_account(id)?;
        let original = account.clone();
        match change(&mut account) {
            Change::Commit => {
                self.update_account(&account)?;
                Ok(account)
            }
            Change::Abort => Ok(original),
        }
    }

    /// [`BankStore::modify_account`] for transaction rows
    fn modify_transaction(
        &self,
        id: &str,
        change: Mutation<'_, Transaction>,
    ) -> Result<Transaction, StoreError> {
        let mut tx = self.get_transaction(id)?;
        let original = tx.clone();
        match change(&mut tx) {
            Change::Commit => {
                self.update_transaction(&tx)?;
                Ok(tx)
            }
            Change::Abort => Ok(original),
        }
    }

    /// Every transaction on one account, oldest first
    fn transactions_for_account(&self, account_id: &str) -> Result<Vec<Transaction>, StoreError> {
        self.list_transactions(&|tx: &Transaction| tx.account_id() == account_id)
    }

    /// Every account owned by one user
    fn accounts_for_user(&self, user_id: &str) -> Result<Vec<Account>, StoreError> {
        self.list_accounts(&|a: &Account| a.user_id() == user_id)
    }
}
