//! Transaction model
//!
//! Represents a card or transfer movement on a single account.
//! Each transaction has:
//! - Account ID and direction (credit or debit)
//! - Amount (i64 cents) - current and originally authorized
//! - Creation time and scheduled resolution time (`post_at`)
//! - Status (Pending → Posted | Canceled)
//! - Metadata (category, merchant, location, reference)
//!
//! A transaction is created `Pending` and transitions exactly once to either
//! `Posted` or `Canceled`. Both are terminal.
//!
//! CRITICAL: All money values are i64 (cents)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Money flow direction relative to the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Money in
    Credit,
    /// Money out
    Debit,
}

impl Direction {
    /// +1 for credits, -1 for debits
    pub fn sign(self) -> i64 {
        match self {
            Direction::Credit => 1,
            Direction::Debit => -1,
        }
    }
}

/// Spending or income category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Groceries,
    Dining,
    Transport,
    Utilities,
    Shopping,
    Entertainment,
    Healthcare,
    Travel,
    Rent,
    Education,
    Salary,
    Transfer,
    LoanDisbursement,
    LoanPayment,
    Investment,
    Deposit,
}

impl Category {
    /// Income and internal movements are excluded from spending analysis
    pub fn is_spending(self) -> bool {
        !matches!(
            self,
            Category::Salary
                | Category::Transfer
                | Category::LoanDisbursement
                | Category::LoanPayment
                | Category::Investment
                | Category::Deposit
        )
    }
}

/// Point on the map where a card transaction happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub city: String,
    pub lat: f64,
    pub lon: f64,
}

impl GeoLocation {
    pub fn new(city: &str, lat: f64, lon: f64) -> Self {
        Self {
            city: city.to_string(),
            lat,
            lon,
        }
    }

    /// Great-circle distance in kilometres (haversine)
    pub fn distance_km(&self, other: &GeoLocation) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Descriptive data carried by a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub category: Category,
    pub merchant: Option<String>,
    pub location: Option<GeoLocation>,
    /// External reference (card auth code, transfer reference, loan id...)
    pub reference: Option<String>,
    pub description: Option<String>,
}

impl TransactionMetadata {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            merchant: None,
            location: None,
            reference: None,
            description: None,
        }
    }

    pub fn with_merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }

    pub fn with_location(mut self, location: GeoLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Transaction status
///
/// Tracks the authorization lifecycle of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Authorized and held against the balance, awaiting resolution
    Pending,

    /// Finalized
    Posted {
        /// When the transaction was posted
        at: DateTime<Utc>,
    },

    /// Authorization reversed, hold released
    Canceled {
        at: DateTime<Utc>,
        reason: String,
    },
}

impl TransactionStatus {
    /// Short lowercase name ("pending", "posted", "canceled")
    pub fn name(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Posted { .. } => "posted",
            TransactionStatus::Canceled { .. } => "canceled",
        }
    }
}

/// Errors that can occur during transaction state changes
#[derive(Debug, Error, PartialEq)]
pub enum TransactionError {
    #[error("Transaction is {status}, expected pending")]
    NotPending { status: &'static str },

    #[error("Amount must be positive, got {amount}")]
    InvalidAmount { amount: i64 },
}

/// A movement of money on one account
///
/// # Example
/// ```
/// use chrono::{Duration, Utc};
/// use mockbank_core::models::{Category, Direction, Transaction, TransactionMetadata};
///
/// let now = Utc::now();
/// let mut tx = Transaction::new(
///     "acc-1".to_string(),
///     Direction::Debit,
///     4_250, // $42.50
///     now,
///     now + Duration::hours(2),
///     TransactionMetadata::new(Category::Dining).with_merchant("Corner Bistro"),
/// );
/// assert!(tx.is_pending());
/// assert_eq!(tx.signed_amount(), -4_250);
///
/// // Tip added after authorization: final amount is larger than the hold
/// let delta = tx.mark_posted(Some(5_000), now).unwrap();
/// assert_eq!(delta, -750);
/// assert!(tx.is_posted());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction identifier (UUID)
    id: String,

    account_id: String,

    direction: Direction,

    /// Current amount (i64 cents); equals the final amount once posted
    amount: i64,

    /// Amount held at authorization time (i64 cents)
    authorized_amount: i64,

    status: TransactionStatus,

    created_at: DateTime<Utc>,

    /// Scheduled resolution time
    post_at: DateTime<Utc>,

    metadata: TransactionMetadata,

    /// Marked by the fraud engine
    flagged: bool,

    fraud_score: Option<u8>,
}

impl Transaction {
    /// Create a new pending transaction
    ///
    /// # Panics
    /// Panics if amount <= 0
    pub fn new(
        account_id: String,
        direction: Direction,
        amount: i64,
        created_at: DateTime<Utc>,
        post_at: DateTime<Utc>,
        metadata: TransactionMetadata,
    ) -> Self {
        assert!(amount > 0, "amount must be positive");

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id,
            direction,
            amount,
            authorized_amount: amount,
            status: TransactionStatus::Pending,
            created_at,
            post_at,
            metadata,
            flagged: false,
            fraud_score: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current amount (i64 cents)
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Amount held at authorization (i64 cents)
    pub fn authorized_amount(&self) -> i64 {
        self.authorized_amount
    }

    /// Amount with the direction's sign applied
    pub fn signed_amount(&self) -> i64 {
        self.direction.sign() * self.amount
    }

    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn post_at(&self) -> DateTime<Utc> {
        self.post_at
    }

    pub fn metadata(&self) -> &TransactionMetadata {
        &self.metadata
    }

    pub fn category(&self) -> Category {
        self.metadata.category
    }

    pub fn is_flagged(&self) -> bool {
        self.flagged
    }

    pub fn fraud_score(&self) -> Option<u8> {
        self.fraud_score
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, TransactionStatus::Pending)
    }

    pub fn is_posted(&self) -> bool {
        matches!(self.status, TransactionStatus::Posted { .. })
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self.status, TransactionStatus::Canceled { .. })
    }

    /// Contributes to the account balance (posted or currently held)
    pub fn affects_balance(&self) -> bool {
        !self.is_canceled()
    }

    /// Check whether the scheduled resolution time has been reached
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.post_at <= now
    }

    /// Post the transaction, optionally with a different final amount
    ///
    /// # Returns
    /// - Ok(delta) where delta is the balance change still to apply
    ///   (zero when the final amount equals the held amount)
    /// - Err if the transaction is not pending or the amount is not positive
    pub fn mark_posted(
        &mut self,
        final_amount: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<i64, TransactionError> {
        if !self.is_pending() {
            return Err(TransactionError::NotPending {
                status: self.status.name(),
            });
        }

        let final_amount = final_amount.unwrap_or(self.amount);
        if final_amount <= 0 {
            return Err(TransactionError::InvalidAmount {
                amount: final_amount,
            });
        }

        let delta = self.direction.sign() * (final_amount - self.amount);
        self.amount = final_amount;
        self.status = TransactionStatus::Posted { at };
        Ok(delta)
    }

    /// Cancel the transaction
    ///
    /// # Returns
    /// - Ok(delta) where delta reverses the full hold
    /// - Err if the transaction is not pending
    pub fn mark_canceled(
        &mut self,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<i64, TransactionError> {
        if !self.is_pending() {
            return Err(TransactionError::NotPending {
                status: self.status.name(),
            });
        }

        self.status = TransactionStatus::Canceled {
            at,
            reason: reason.to_string(),
        };
        Ok(-self.signed_amount())
    }

    /// Record a fraud score, flagging the transaction when `flagged` is set
    pub fn set_fraud_score(&mut self, score: u8, flagged: bool) {
        self.fraud_score = Some(score);
        self.flagged = self.flagged || flagged;
    }
}
