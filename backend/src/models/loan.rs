//! Loan model
//!
//! Lifecycle:
//!
//! ```text
//! Pending ──approve──▶ Approved ──disburse──▶ Active ──▶ Paid
//!    │                                          │
//!    ├──auto-approve──▶ Active                  └──▶ Defaulted
//!    └──reject──▶ Rejected
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Approved,
    Active,
    Paid,
    Defaulted,
    Rejected,
}

impl LoanStatus {
    /// Check whether moving to `next` is a legal transition
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Active)
                | (Pending, Rejected)
                | (Approved, Active)
                | (Active, Paid)
                | (Active, Defaulted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoanStatus::Paid | LoanStatus::Defaulted | LoanStatus::Rejected)
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("Invalid loan transition from {from:?} to {to:?}")]
pub struct LoanTransitionError {
    pub from: LoanStatus,
    pub to: LoanStatus,
}

/// An amortizing consumer loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: String,
    pub user_id: String,
    /// Account receiving the disbursement and paying the installments
    pub account_id: String,
    /// Borrowed amount (i64 cents)
    pub principal: i64,
    /// Outstanding balance including accrued interest (i64 cents)
    pub remaining_amount: i64,
    /// Annual rate, e.g. 0.085
    pub interest_rate: f64,
    pub term_months: u32,
    /// Installment (i64 cents)
    pub monthly_payment: i64,
    pub payments_made: u32,
    pub payments_missed: u32,
    pub consecutive_missed: u32,
    pub status: LoanStatus,
    pub purpose: String,
    pub applied_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub next_payment_date: Option<NaiveDate>,
    pub last_payment_date: Option<NaiveDate>,
    pub rejection_reason: Option<String>,
}

impl Loan {
    /// Move to `next`, rejecting illegal transitions
    pub fn transition(&mut self, next: LoanStatus) -> Result<(), LoanTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(LoanTransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_paths() {
        assert!(LoanStatus::Pending.can_transition_to(LoanStatus::Active));
        assert!(LoanStatus::Approved.can_transition_to(LoanStatus::Active));
        assert!(LoanStatus::Active.can_transition_to(LoanStatus::Defaulted));
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        for terminal in [LoanStatus::Paid, LoanStatus::Defaulted, LoanStatus::Rejected] {
            assert!(terminal.is_terminal());
            for next in [
                LoanStatus::Pending,
                LoanStatus::Approved,
                LoanStatus::Active,
                LoanStatus::Paid,
                LoanStatus::Defaulted,
                LoanStatus::Rejected,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_cannot_skip_activation() {
        assert!(!LoanStatus::Pending.can_transition_to(LoanStatus::Paid));
        assert!(!LoanStatus::Approved.can_transition_to(LoanStatus::Rejected));
    }
}
