//! In-memory store
//!
//! Rows live in insertion-ordered tables behind a single `RwLock`. Used by
//! the CLI and by tests.

use super::{BankStore, Change, Filter, Mutation, StoreError, StoreSnapshot};
use crate::models::{
    Account, ComplianceLog, FraudAlert, Loan, MarketAsset, Portfolio, RiskEvent, SimulationState,
    Transaction, User,
};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Row with a stable primary key
pub(crate) trait Keyed: Clone {
    const ENTITY: &'static str;
    fn key(&self) -> &str;
}

impl Keyed for User {
    const ENTITY: &'static str = "user";
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Account {
    const ENTITY: &'static str = "account";
    fn key(&self) -> &str {
        self.id()
    }
}

impl Keyed for Transaction {
    const ENTITY: &'static str = "transaction";
    fn key(&self) -> &str {
        self.id()
    }
}

impl Keyed for Loan {
    const ENTITY: &'static str = "loan";
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for MarketAsset {
    const ENTITY: &'static str = "asset";
    fn key(&self) -> &str {
        &self.symbol
    }
}

impl Keyed for Portfolio {
    const ENTITY: &'static str = "portfolio";
    fn key(&self) -> &str {
        &self.id
    }
}

/// Insertion-ordered table with a key index
#[derive(Debug, Clone)]
pub(crate) struct Table<T> {
    rows: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Keyed> Table<T> {
    pub(crate) fn from_rows(rows: Vec<T>) -> Self {
        let index = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.key().to_string(), i))
            .collect();
        Self { rows, index }
    }

    fn insert(&mut self, row: T) -> Result<(), StoreError> {
        if self.index.contains_key(row.key()) {
            return Err(StoreError::Duplicate {
                entity: T::ENTITY,
                id: row.key().to_string(),
            });
        }
        self.index.insert(row.key().to_string(), self.rows.len());
        self.rows.push(row);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<T, StoreError> {
        self.index
            .get(id)
            .map(|&i| self.rows[i].clone())
            .ok_or_else(|| StoreError::NotFound {
                entity: T::ENTITY,
                id: id.to_string(),
            })
    }

    fn update(&mut self, row: &T) -> Result<(), StoreError> {
        match self.index.get(row.key()) {
            Some(&i) => {
                self.rows[i] = row.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: T::ENTITY,
                id: row.key().to_string(),
            }),
        }
    }

    /// Change a row in place; an aborted change never touches the stored row
    fn modify(&mut self, id: &str, change: Mutation<'_, T>) -> Result<T, StoreError> {
        let i = *self.index.get(id).ok_or_else(|| StoreError::NotFound {
            entity: T::ENTITY,
            id: id.to_string(),
        })?;
        let mut row = self.rows[i].clone();
        if change(&mut row) == Change::Commit {
            self.rows[i] = row;
        }
        Ok(self.rows[i].clone())
    }

    fn list(&self, filter: Filter<'_, T>) -> Vec<T> {
        self.rows.iter().filter(|row| filter(row)).cloned().collect()
    }

    pub(crate) fn rows(&self) -> &[T] {
        &self.rows
    }
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) users: Table<User>,
    pub(crate) accounts: Table<Account>,
    pub(crate) transactions: Table<Transaction>,
    pub(crate) loans: Table<Loan>,
    pub(crate) assets: Table<MarketAsset>,
    pub(crate) portfolios: Table<Portfolio>,
    pub(crate) risk_events: Vec<RiskEvent>,
    pub(crate) fraud_alerts: Vec<FraudAlert>,
    pub(crate) compliance_logs: Vec<ComplianceLog>,
    pub(crate) state: SimulationState,
}

/// Thread-safe in-memory implementation of [`BankStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    /// Capture every row, tagged with the fingerprint of the active config
    pub fn snapshot(&self, config_fingerprint: &str) -> Result<StoreSnapshot, StoreError> {
        StoreSnapshot::capture(self, config_fingerprint)
    }

    /// Rebuild a store from a snapshot taken under the same configuration
    pub fn restore(
        snapshot: StoreSnapshot,
        config_fingerprint: &str,
    ) -> Result<Self, crate::SimulationError> {
        snapshot.into_store(config_fingerprint)
    }
}

impl BankStore for MemoryStore {
    fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.write()?.users.insert(user)
    }

    fn get_user(&self, id: &str) -> Result<User, StoreError> {
        self.read()?.users.get(id)
    }

    fn update_user(&self, user: &User) -> Result<(), StoreError> {
        self.write()?.users.update(user)
    }

    fn list_users(&self, filter: Filter<'_, User>) -> Result<Vec<User>, StoreError> {
        Ok(self.read()?.users.list(filter))
    }

    fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        self.write()?.accounts.insert(account)
    }

    fn get_account(&self, id: &str) -> Result<Account, StoreError> {
        self.read()?.accounts.get(id)
    }

    fn update_account(&self, account: &Account) -> Result<(), StoreError> {
        self.write()?.accounts.update(account)
    }

    fn list_accounts(&self, filter: Filter<'_, Account>) -> Result<Vec<Account>, StoreError> {
        Ok(self.read()?.accounts.list(filter))
    }

    fn modify_account(&self, id: &str, change: Mutation<'_, Account>) -> Result<Account, StoreError> {
        self.write()?.accounts.modify(id, change)
    }

    fn insert_transaction(&self, tx: Transaction) -> Result<(), StoreError> {
        self.write()?.transactions.insert(tx)
    }

    fn get_transaction(&self, id: &str) -> Result<Transaction, StoreError> {
        self.read()?.transactions.get(id)
    }

    fn update_transaction(&self, tx: &Transaction) -> Result<(), StoreError> {
        self.write()?.transactions.update(tx)
    }

    fn list_transactions(
        &self,
        filter: Filter<'_, Transaction>,
    ) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.read()?.transactions.list(filter))
    }

    fn modify_transaction(
        &self,
        id: &str,
        change: Mutation<'_, Transaction>,
    ) -> Result<Transaction, StoreError> {
        self.write()?.transactions.modify(id, change)
    }

    fn insert_loan(&self, loan: Loan) -> Result<(), StoreError> {
        self.write()?.loans.insert(loan)
    }

    fn get_loan(&self, id: &str) -> Result<Loan, StoreError> {
        self.read()?.loans.get(id)
    }

    fn update_loan(&self, loan: &Loan) -> Result<(), StoreError> {
        self.write()?.loans.update(loan)
    }

    fn list_loans(&self, filter: Filter<'_, Loan>) -> Result<Vec<Loan>, StoreError> {
        Ok(self.read()?.loans.list(filter))
    }

    fn insert_asset(&self, asset: MarketAsset) -> Result<(), StoreError> {
        self.write()?.assets.insert(asset)
    }

    fn get_asset(&self, symbol: &str) -> Result<MarketAsset, StoreError> {
        self.read()?.assets.get(symbol)
    }

    fn update_asset(&self, asset: &MarketAsset) -> Result<(), StoreError> {
        self.write()?.assets.update(asset)
    }

    fn list_assets(&self) -> Result<Vec<MarketAsset>, StoreError> {
        Ok(self.read()?.assets.rows().to_vec())
    }

    fn insert_portfolio(&self, portfolio: Portfolio) -> Result<(), StoreError> {
        self.write()?.portfolios.insert(portfolio)
    }

    fn get_portfolio(&self, id: &str) -> Result<Portfolio, StoreError> {
        self.read()?.portfolios.get(id)
    }

    fn update_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        self.write()?.portfolios.update(portfolio)
    }

    fn list_portfolios(
        &self,
        filter: Filter<'_, Portfolio>,
    ) -> Result<Vec<Portfolio>, StoreError> {
        Ok(self.read()?.portfolios.list(filter))
    }

    fn append_risk_event(&self, event: RiskEvent) -> Result<(), StoreError> {
        self.write()?.risk_events.push(event);
        Ok(())
    }

    fn list_risk_events(
        &self,
        filter: Filter<'_, RiskEvent>,
    ) -> Result<Vec<RiskEvent>, StoreError> {
        Ok(self
            .read()?
            .risk_events
            .iter()
            .filter(|e| filter(e))
            .cloned()
            .collect())
    }

    fn append_fraud_alert(&self, alert: FraudAlert) -> Result<(), StoreError> {
        self.write()?.fraud_alerts.push(alert);
        Ok(())
    }

    fn list_fraud_alerts(
        &self,
        filter: Filter<'_, FraudAlert>,
    ) -> Result<Vec<FraudAlert>, StoreError> {
        Ok(self
            .read()?
            .fraud_alerts
            .iter()
            .filter(|a| filter(a))
            .cloned()
            .collect())
    }

    fn append_compliance_log(&self, log: ComplianceLog) -> Result<(), StoreError> {
        self.write()?.compliance_logs.push(log);
        Ok(())
    }

    fn list_compliance_logs(
        &self,
        filter: Filter<'_, ComplianceLog>,
    ) -> Result<Vec<ComplianceLog>, StoreError> {
        Ok(self
            .read()?
            .compliance_logs
            .iter()
            .filter(|l| filter(l))
            .cloned()
            .collect())
    }

    fn get_state(&self) -> Result<SimulationState, StoreError> {
        Ok(self.read()?.state.clone())
    }

    fn put_state(&self, state: &SimulationState) -> Result<(), StoreError> {
        self.write()?.state = state.clone();
        Ok(())
    }
}
