//! Transaction Lifecycle Manager
//!
//! Owns the `pending -> posted | canceled` state machine and is the only
//! writer of account balances.
//!
//! # Flow
//!
//! ```text
//! create ──hold──> Pending ──post_at reached──> Posted   (optionally re-priced)
//!                     │
//!                     └──cancel / declined────> Canceled (hold reversed)
//! ```
//!
//! # Critical Invariants
//!
//! - **No Drift**: an account balance equals the signed sum of its posted and
//!   pending transactions after every operation
//! - **Single Resolution**: a pending transaction resolves exactly once
//! - **Two-Phase Apply**: the transaction row is written before the account;
//!   when the account write fails the row is compensated so no balance change
//!   is left without a matching row state
//! - **Atomic Rows**: every row change goes through the store's `modify_*`
//!   operations, so concurrent callers sharing a store never lose an update

use crate::config::LifecycleConfig;
use crate::models::{Account, Direction, Transaction, TransactionError, TransactionMetadata};
use crate::rng::SeededRng;
use crate::store::{BankStore, Change, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Cancel reason recorded when the account hold could not be written
pub const HOLD_FAILED_REASON: &str = "hold_failed";

/// Cancel reason used by the pending batch
pub const DECLINED_REASON: &str = "issuer_declined";

/// Failures of lifecycle operations
///
/// Everything except [`LifecycleError::Store`] is a domain outcome that the
/// caller is expected to branch on via [`LifecycleError::code`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LifecycleError {
    #[error("amount must be positive, got {amount}")]
    InvalidAmount { amount: i64 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("account {account_id} is frozen")]
    AccountFrozen { account_id: String },

    #[error("daily limit exceeded: spent {spent} + {amount} > limit {limit}")]
    DailyLimitExceeded { spent: i64, amount: i64, limit: i64 },

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("transaction {id} is {status}, expected pending")]
    InvalidStatus { id: String, status: &'static str },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => LifecycleError::NotFound { entity, id },
            other => LifecycleError::Store(other),
        }
    }
}

impl LifecycleError {
    /// Stable machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::InvalidAmount { .. } => "INVALID_AMOUNT",
            LifecycleError::NotFound { .. } => "NOT_FOUND",
            LifecycleError::AccountFrozen { .. } => "ACCOUNT_FROZEN",
            LifecycleError::DailyLimitExceeded { .. } => "DAILY_LIMIT_EXCEEDED",
            LifecycleError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LifecycleError::InvalidStatus { .. } => "INVALID_STATUS",
            LifecycleError::Store(_) => "STORE_UNAVAILABLE",
        }
    }

    /// True for rule violations, false for infrastructure failures
    pub fn is_domain_failure(&self) -> bool {
        !matches!(self, LifecycleError::Store(_))
    }

    fn from_transaction(id: &str, err: TransactionError) -> Self {
        match err {
            TransactionError::NotPending { status } => LifecycleError::InvalidStatus {
                id: id.to_string(),
                status,
            },
            TransactionError::InvalidAmount { amount } => LifecycleError::InvalidAmount { amount },
        }
    }
}

/// Request to create a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub account_id: String,
    pub direction: Direction,
    pub amount: i64,
    pub metadata: TransactionMetadata,
    /// Bypass frozen / limit / funds checks (bulk seeding path)
    pub skip_validation: bool,
}

impl NewTransaction {
    pub fn new(
        account_id: impl Into<String>,
        direction: Direction,
        amount: i64,
        metadata: TransactionMetadata,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            direction,
            amount,
            metadata,
            skip_validation: false,
        }
    }

    pub fn debit(account_id: impl Into<String>, amount: i64, metadata: TransactionMetadata) -> Self {
        Self::new(account_id, Direction::Debit, amount, metadata)
    }

    pub fn credit(account_id: impl Into<String>, amount: i64, metadata: TransactionMetadata) -> Self {
        Self::new(account_id, Direction::Credit, amount, metadata)
    }

    pub fn skip_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }
}

/// Resolution of one due pending transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PendingOutcome {
    Posted {
        tx_id: String,
        account_id: String,
        amount: i64,
        adjusted: bool,
    },
    Canceled {
        tx_id: String,
        account_id: String,
        reason: String,
    },
    Failed {
        tx_id: String,
        code: &'static str,
        message: String,
    },
}

/// Result of one pending batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PendingSummary {
    pub examined: usize,
    pub posted: usize,
    pub adjusted: usize,
    pub canceled: usize,
    pub errors: usize,
    pub outcomes: Vec<PendingOutcome>,
}

/// Lifecycle operations over a store
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use mockbank_core::config::LifecycleConfig;
/// use mockbank_core::lifecycle::{NewTransaction, TransactionLifecycle};
/// use mockbank_core::models::{Account, AccountKind, Category, TransactionMetadata};
/// use mockbank_core::store::{BankStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// let account = Account::new("user-1".to_string(), AccountKind::Checking, "family", Utc::now());
/// let account_id = account.id().to_string();
/// store.insert_account(account).unwrap();
///
/// let config = LifecycleConfig::default();
/// let lifecycle = TransactionLifecycle::new(&store, &config);
/// let now = Utc::now();
///
/// lifecycle
///     .post_immediately(now, NewTransaction::credit(&account_id, 100_000, TransactionMetadata::new(Category::Deposit)))
///     .unwrap();
/// let tx = lifecycle
///     .create(now, NewTransaction::debit(&account_id, 30_000, TransactionMetadata::new(Category::Groceries)), None)
///     .unwrap();
///
/// assert!(tx.is_pending());
/// assert_eq!(store.get_account(&account_id).unwrap().balance(), 70_000);
/// ```
pub struct TransactionLifecycle<'a, S: BankStore + ?Sized> {
    store: &'a S,
    config: &'a LifecycleConfig,
}

impl<'a, S: BankStore + ?Sized> TransactionLifecycle<'a, S> {
    pub fn new(store: &'a S, config: &'a LifecycleConfig) -> Self {
        Self { store, config }
    }

    fn validate(
        &self,
        account: &Account,
        direction: Direction,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if account.is_frozen() {
            return Err(LifecycleError::AccountFrozen {
                account_id: account.id().to_string(),
            });
        }

        if direction == Direction::Debit {
            let today = now.date_naive();
            if account.would_exceed_daily_limit(amount, today) {
                return Err(LifecycleError::DailyLimitExceeded {
                    spent: account.daily_spent_on(today),
                    amount,
                    limit: account.daily_limit(),
                });
            }
            if !account.can_cover(amount) {
                return Err(LifecycleError::InsufficientFunds {
                    required: amount,
                    available: account.available_funds(),
                });
            }
        }

        Ok(())
    }

    fn pending_duration(&self, rng: Option<&mut SeededRng>) -> Duration {
        let min = self.config.min_pending_minutes;
        let max = self.config.max_pending_minutes.max(min);
        let minutes = match rng {
            Some(rng) => rng.next_int(min, max),
            None => min,
        };
        Duration::minutes(minutes)
    }

    /// Create a pending transaction and place its hold
    ///
    /// Validation order: amount, account existence, frozen, daily limit
    /// (debits), funds against balance + overdraft (debits). Validation
    /// after the amount check is skipped when `skip_validation` is set.
    ///
    /// The checks run again against the current account row when the hold is
    /// applied, so a concurrent writer can never push the account past a
    /// limit that the first check accepted.
    ///
    /// `post_at` is `now` plus a pending duration drawn from `rng` within the
    /// configured range, or the minimum when no source is given.
    pub fn create(
        &self,
        now: DateTime<Utc>,
        request: NewTransaction,
        rng: Option<&mut SeededRng>,
    ) -> Result<Transaction, LifecycleError> {
        if request.amount <= 0 {
            return Err(LifecycleError::InvalidAmount {
                amount: request.amount,
            });
        }

        let account = self.store.get_account(&request.account_id)?;
        let checked = !request.skip_validation;
        if checked {
            self.validate(&account, request.direction, request.amount, now)?;
        }

        let post_at = now + self.pending_duration(rng);
        let tx = Transaction::new(
            request.account_id,
            request.direction,
            request.amount,
            now,
            post_at,
            request.metadata,
        );

        // Phase 1: stage the row
        self.store.insert_transaction(tx.clone())?;

        // Phase 2: apply the hold against the current account row
        let mut refused = None;
        let held = self.store.modify_account(tx.account_id(), &mut |account: &mut Account| {
            if checked {
                if let Err(err) = self.validate(account, tx.direction(), tx.amount(), now) {
                    refused = Some(err);
                    return Change::Abort;
                }
            }
            account.adjust_balance(tx.signed_amount());
            if tx.direction() == Direction::Debit {
                account.record_spend(tx.amount(), now.date_naive());
            }
            Change::Commit
        });

        let failure = match held {
            Ok(_) => refused,
            Err(err) => {
                error!(
                    tx_id = tx.id(),
                    account_id = tx.account_id(),
                    error = %err,
                    "hold write failed, compensating transaction row"
                );
                Some(err.into())
            }
        };
        if let Some(err) = failure {
            self.compensate(&tx, now);
            return Err(err);
        }

        debug!(
            tx_id = tx.id(),
            account_id = tx.account_id(),
            amount = tx.amount(),
            direction = ?tx.direction(),
            "transaction created"
        );
        Ok(tx)
    }

    /// Cancel a staged row whose hold never landed
    fn compensate(&self, tx: &Transaction, now: DateTime<Utc>) {
        let result = self.store.modify_transaction(tx.id(), &mut |row: &mut Transaction| {
            match row.mark_canceled(HOLD_FAILED_REASON, now) {
                Ok(_) => Change::Commit,
                Err(_) => Change::Abort,
            }
        });
        if let Err(err) = result {
            error!(tx_id = tx.id(), error = %err, "compensation write failed");
        }
    }

    /// Move a pending row to its resolution, then settle the balance delta
    ///
    /// The status change is atomic on the row, so of two racing resolutions
    /// exactly one wins and the other sees `InvalidStatus`. Restores the
    /// pending row when the account write fails.
    fn resolve(
        &self,
        id: &str,
        mut transition: impl FnMut(&mut Transaction) -> Result<i64, TransactionError>,
        mut adjust: impl FnMut(&mut Account, &Transaction, &Transaction),
    ) -> Result<Transaction, LifecycleError> {
        let mut original = None;
        let mut outcome = Ok(0);
        let resolved = self.store.modify_transaction(id, &mut |row: &mut Transaction| {
            let before = row.clone();
            outcome = transition(row);
            if outcome.is_err() {
                return Change::Abort;
            }
            original = Some(before);
            Change::Commit
        })?;
        let delta = outcome.map_err(|e| LifecycleError::from_transaction(id, e))?;
        let Some(original) = original else {
            return Ok(resolved);
        };

        if delta == 0 {
            return Ok(resolved);
        }

        let settled = self
            .store
            .modify_account(resolved.account_id(), &mut |account: &mut Account| {
                account.adjust_balance(delta);
                adjust(account, &original, &resolved);
                Change::Commit
            });

        if let Err(err) = settled {
            error!(
                tx_id = id,
                error = %err,
                "balance write failed, restoring pending row"
            );
            let restored = self.store.modify_transaction(id, &mut |row: &mut Transaction| {
                *row = original.clone();
                Change::Commit
            });
            if let Err(comp) = restored {
                error!(tx_id = id, error = %comp, "compensation write failed");
            }
            return Err(err.into());
        }
        Ok(resolved)
    }

    /// Post a pending transaction, optionally at a different final amount
    pub fn post(
        &self,
        now: DateTime<Utc>,
        id: &str,
        final_amount: Option<i64>,
    ) -> Result<Transaction, LifecycleError> {
        let tx = self.resolve(
            id,
            |row| row.mark_posted(final_amount, now),
            |account, original, resolved| {
                if resolved.direction() != Direction::Debit {
                    return;
                }
                let change = resolved.amount() - original.amount();
                let spend_day = original.created_at().date_naive();
                if change > 0 {
                    account.record_spend(change, spend_day);
                } else if change < 0 {
                    account.release_spend(-change, spend_day);
                }
            },
        )?;

        debug!(tx_id = id, amount = tx.amount(), "transaction posted");
        Ok(tx)
    }

    /// Cancel a pending transaction, reversing its hold
    pub fn cancel(
        &self,
        now: DateTime<Utc>,
        id: &str,
        reason: &str,
    ) -> Result<Transaction, LifecycleError> {
        let tx = self.resolve(
            id,
            |row| row.mark_canceled(reason, now),
            |account, original, _| {
                if original.direction() == Direction::Debit {
                    account.release_spend(original.amount(), original.created_at().date_naive());
                }
            },
        )?;

        debug!(tx_id = id, reason, "transaction canceled");
        Ok(tx)
    }

    /// Create and immediately post a transaction
    ///
    /// Used for loan disbursements and payments, deposits and the bulk
    /// history path.
    pub fn post_immediately(
        &self,
        now: DateTime<Utc>,
        request: NewTransaction,
    ) -> Result<Transaction, LifecycleError> {
        let tx = self.create(now, request, None)?;
        self.post(now, tx.id(), None)
    }

    /// Resolve every pending transaction whose `post_at` has elapsed
    ///
    /// Each transaction is resolved independently: it is canceled with
    /// `cancel_rate`, otherwise posted at a changed amount with
    /// `amount_change_rate`, otherwise posted as-is. A failure on one
    /// transaction is logged and counted and never stops the batch.
    pub fn process_pending(
        &self,
        now: DateTime<Utc>,
        rng: &mut SeededRng,
    ) -> Result<PendingSummary, StoreError> {
        let due = self
            .store
            .list_transactions(&|tx: &Transaction| tx.is_due(now))?;

        let mut summary = PendingSummary {
            examined: due.len(),
            ..PendingSummary::default()
        };

        for tx in due {
            let outcome = if rng.next_bool(self.config.cancel_rate) {
                self.cancel(now, tx.id(), DECLINED_REASON)
                    .map(|resolved| PendingOutcome::Canceled {
                        tx_id: resolved.id().to_string(),
                        account_id: resolved.account_id().to_string(),
                        reason: DECLINED_REASON.to_string(),
                    })
            } else {
                let final_amount = if rng.next_bool(self.config.amount_change_rate) {
                    let max = self.config.max_amount_change_pct / 100.0;
                    let pct = rng.next_range(-max, max);
                    Some((((tx.amount() as f64) * (1.0 + pct)).round() as i64).max(1))
                } else {
                    None
                };
                self.post(now, tx.id(), final_amount)
                    .map(|resolved| PendingOutcome::Posted {
                        tx_id: resolved.id().to_string(),
                        account_id: resolved.account_id().to_string(),
                        amount: resolved.amount(),
                        adjusted: resolved.amount() != resolved.authorized_amount(),
                    })
            };

            match outcome {
                Ok(outcome) => {
                    match &outcome {
                        PendingOutcome::Posted { adjusted, .. } => {
                            summary.posted += 1;
                            if *adjusted {
                                summary.adjusted += 1;
                            }
                        }
                        PendingOutcome::Canceled { .. } => summary.canceled += 1,
                        PendingOutcome::Failed { .. } => {}
                    }
                    summary.outcomes.push(outcome);
                }
                Err(err) => {
                    warn!(tx_id = tx.id(), code = err.code(), error = %err, "pending resolution failed");
                    summary.errors += 1;
                    summary.outcomes.push(PendingOutcome::Failed {
                        tx_id: tx.id().to_string(),
                        code: err.code(),
                        message: err.to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }
}
