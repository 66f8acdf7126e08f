//! Account model
//!
//! Represents a customer deposit account at the simulated bank.
//! Each account has:
//! - Balance (i64 cents), including amounts currently held by pending transactions
//! - Daily spend counter with the calendar day it applies to
//! - Frozen flag (set by fraud response, blocks new transactions)
//! - Optional overdraft facility
//!
//! # Balance invariant
//!
//! `balance` equals the signed sum of every posted transaction plus every
//! pending (held) transaction on the account. Canceled transactions contribute
//! nothing. The lifecycle manager is the only writer of `balance`.
//!
//! CRITICAL: All money values are i64 (cents)

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Default daily debit limit: $5,000.00
pub const DEFAULT_DAILY_LIMIT: i64 = 500_000;

/// Product type of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Checking,
    Savings,
}

/// Customer deposit account
///
/// # Example
/// ```
/// use chrono::Utc;
/// use mockbank_core::models::{Account, AccountKind};
///
/// let account = Account::new("user-1".to_string(), AccountKind::Checking, "student", Utc::now())
///     .with_overdraft(20_000);
/// assert_eq!(account.available_funds(), 20_000);
/// assert!(account.can_cover(20_000));
/// assert!(!account.can_cover(20_001));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier (UUID)
    id: String,

    /// Owning user
    user_id: String,

    kind: AccountKind,

    /// Persona driving synthetic activity on this account
    persona: String,

    /// Current balance (i64 cents), negative when in overdraft
    balance: i64,

    /// Maximum debit volume per calendar day (i64 cents)
    daily_limit: i64,

    /// Debit volume already authorized on `daily_spent_date`
    daily_spent: i64,

    /// Day the `daily_spent` counter applies to; a different day means zero
    daily_spent_date: Option<NaiveDate>,

    frozen: bool,

    overdraft_enabled: bool,

    /// Maximum negative balance when overdraft is enabled (positive cents)
    overdraft_limit: i64,

    /// Number of times the balance crossed from non-negative to negative
    overdraft_count: u32,

    /// Last day an income credit was generated for this account
    last_income_on: Option<NaiveDate>,

    created_at: DateTime<Utc>,
}

impl Account {
    /// Create an empty, unfrozen account without overdraft
    pub fn new(
        user_id: String,
        kind: AccountKind,
        persona: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            kind,
            persona: persona.to_string(),
            balance: 0,
            daily_limit: DEFAULT_DAILY_LIMIT,
            daily_spent: 0,
            daily_spent_date: None,
            frozen: false,
            overdraft_enabled: false,
            overdraft_limit: 0,
            overdraft_count: 0,
            last_income_on: None,
            created_at,
        }
    }

    /// Set the daily debit limit (builder pattern)
    pub fn with_daily_limit(mut self, daily_limit: i64) -> Self {
        assert!(daily_limit >= 0, "daily_limit must be non-negative");
        self.daily_limit = daily_limit;
        self
    }

    /// Enable overdraft up to `limit` cents (builder pattern)
    pub fn with_overdraft(mut self, limit: i64) -> Self {
        assert!(limit >= 0, "overdraft limit must be non-negative");
        self.overdraft_enabled = limit > 0;
        self.overdraft_limit = limit;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// Current balance (i64 cents)
    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn daily_limit(&self) -> i64 {
        self.daily_limit
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn overdraft_enabled(&self) -> bool {
        self.overdraft_enabled
    }

    pub fn overdraft_limit(&self) -> i64 {
        self.overdraft_limit
    }

    pub fn overdraft_count(&self) -> u32 {
        self.overdraft_count
    }

    pub fn last_income_on(&self) -> Option<NaiveDate> {
        self.last_income_on
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// How far below zero the balance may go
    pub fn overdraft_allowance(&self) -> i64 {
        if self.overdraft_enabled {
            self.overdraft_limit
        } else {
            0
        }
    }

    /// Balance plus overdraft allowance
    pub fn available_funds(&self) -> i64 {
        self.balance + self.overdraft_allowance()
    }

    /// Check whether a debit of `amount` fits within available funds
    pub fn can_cover(&self, amount: i64) -> bool {
        amount <= self.available_funds()
    }

    /// Debit volume already authorized on `date`
    pub fn daily_spent_on(&self, date: NaiveDate) -> i64 {
        if self.daily_spent_date == Some(date) {
            self.daily_spent
        } else {
            0
        }
    }

    /// Check whether a further debit of `amount` on `date` breaks the daily limit
    pub fn would_exceed_daily_limit(&self, amount: i64, date: NaiveDate) -> bool {
        self.daily_spent_on(date) + amount > self.daily_limit
    }

    /// Apply a signed balance change
    ///
    /// Counts an overdraft event when the balance crosses below zero.
    pub(crate) fn adjust_balance(&mut self, delta: i64) {
        let before = self.balance;
        self.balance += delta;
        if before >= 0 && self.balance < 0 {
            self.overdraft_count += 1;
        }
    }

    /// Add `amount` to the daily spend counter, resetting it on a new day
    pub fn record_spend(&mut self, amount: i64, date: NaiveDate) {
        if self.daily_spent_date != Some(date) {
            self.daily_spent = 0;
            self.daily_spent_date = Some(date);
        }
        self.daily_spent += amount;
    }

    /// Give back daily spend after a canceled debit made on `date`
    pub fn release_spend(&mut self, amount: i64, date: NaiveDate) {
        if self.daily_spent_date == Some(date) {
            self.daily_spent = (self.daily_spent - amount).max(0);
        }
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    /// Remember that income was paid on `date`
    pub fn mark_income(&mut self, date: NaiveDate) {
        self.last_income_on = Some(date);
    }
}
