//! Checkpoint - Save/Restore Store Contents
//!
//! Serializes every row of a [`MemoryStore`] together with the fingerprint
//! of the configuration it was produced under.
//!
//! # Invariants
//!
//! - **Config Matching**: a snapshot can only be restored under the config it was taken with
//! - **Referential Integrity**: every transaction references a snapshotted account
//! - **Balance Conservation**: each account balance equals its signed non-canceled transactions

use super::memory::{Table, Tables};
use super::{MemoryStore, StoreError};
use crate::error::SimulationError;
use crate::models::{
    Account, ComplianceLog, FraudAlert, Loan, MarketAsset, Portfolio, RiskEvent, SimulationState,
    Transaction, User,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Complete store snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// SHA-256 fingerprint of the config in force when captured
    pub config_fingerprint: String,
    pub users: Vec<User>,
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
    pub loans: Vec<Loan>,
    pub assets: Vec<MarketAsset>,
    pub portfolios: Vec<Portfolio>,
    pub risk_events: Vec<RiskEvent>,
    pub fraud_alerts: Vec<FraudAlert>,
    pub compliance_logs: Vec<ComplianceLog>,
    pub state: SimulationState,
}

impl StoreSnapshot {
    pub(crate) fn capture(store: &MemoryStore, config_fingerprint: &str) -> Result<Self, StoreError> {
        let tables = store.read()?;
        Ok(Self {
            config_fingerprint: config_fingerprint.to_string(),
            users: tables.users.rows().to_vec(),
            accounts: tables.accounts.rows().to_vec(),
            transactions: tables.transactions.rows().to_vec(),
            loans: tables.loans.rows().to_vec(),
            assets: tables.assets.rows().to_vec(),
            portfolios: tables.portfolios.rows().to_vec(),
            risk_events: tables.risk_events.clone(),
            fraud_alerts: tables.fraud_alerts.clone(),
            compliance_logs: tables.compliance_logs.clone(),
            state: tables.state.clone(),
        })
    }

    pub fn to_json(&self) -> Result<String, SimulationError> {
        serde_json::to_string(self)
            .map_err(|e| SimulationError::Serialization(format!("snapshot encode failed: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        serde_json::from_str(json)
            .map_err(|e| SimulationError::Serialization(format!("snapshot decode failed: {}", e)))
    }

    /// Check referential integrity and balance conservation
    pub fn validate(&self) -> Result<(), SimulationError> {
        let mut expected: HashMap<&str, i64> = self
            .accounts
            .iter()
            .map(|a| (a.id(), 0))
            .collect();

        for tx in &self.transactions {
            match expected.get_mut(tx.account_id()) {
                Some(sum) => {
                    if tx.affects_balance() {
                        *sum += tx.signed_amount();
                    }
                }
                None => {
                    return Err(SimulationError::Snapshot(format!(
                        "transaction {} references unknown account {}",
                        tx.id(),
                        tx.account_id()
                    )))
                }
            }
        }

        for account in &self.accounts {
            let sum = expected.get(account.id()).copied().unwrap_or_default();
            if sum != account.balance() {
                return Err(SimulationError::Snapshot(format!(
                    "balance drift on account {}: balance {}, transactions {}",
                    account.id(),
                    account.balance(),
                    sum
                )));
            }
        }

        Ok(())
    }

    pub(crate) fn into_store(self, config_fingerprint: &str) -> Result<MemoryStore, SimulationError> {
        if self.config_fingerprint != config_fingerprint {
            return Err(SimulationError::Snapshot(format!(
                "config mismatch: snapshot {}, current {}",
                self.config_fingerprint, config_fingerprint
            )));
        }
        self.validate()?;

        Ok(MemoryStore::from_tables(Tables {
            users: Table::from_rows(self.users),
            accounts: Table::from_rows(self.accounts),
            transactions: Table::from_rows(self.transactions),
            loans: Table::from_rows(self.loans),
            assets: Table::from_rows(self.assets),
            portfolios: Table::from_rows(self.portfolios),
            risk_events: self.risk_events,
            fraud_alerts: self.fraud_alerts,
            compliance_logs: self.compliance_logs,
            state: self.state,
        }))
    }
}
