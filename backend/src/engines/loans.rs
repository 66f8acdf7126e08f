//! Loan origination and servicing
//!
//! # Pricing
//!
//! - Rate: `base_rate + risk_score / 100 × risk_premium`
//! - Payment: standard amortization formula, rounded up to the next cent
//! - Interest: accrued monthly on the remaining balance, rounded down
//!
//! Rounding the payment up and the interest down guarantees the balance is
//! fully repaid after `term_months` on-time payments.
//!
//! # Default
//!
//! A loan defaults after `default_after_missed` consecutive missed payments
//! or `default_after_days` without any payment.

use crate::config::{LifecycleConfig, LoanConfig};
use crate::core::time::add_months;
use crate::lifecycle::{LifecycleError, NewTransaction, TransactionLifecycle};
use crate::models::{
    Account, AmlStatus, Category, KycStatus, Loan, LoanStatus, LoanTransitionError, RiskEvent,
    RiskEventKind, Severity, TransactionMetadata, User,
};
use crate::store::{BankStore, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

/// Why an application was turned down
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IneligibleReason {
    RiskTooHigh { score: f64, max: f64 },
    KycNotVerified { status: KycStatus },
    AmlFlagged,
    DebtRatio { ratio: f64, max: f64 },
}

impl std::fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IneligibleReason::RiskTooHigh { score, max } => {
                write!(f, "risk score {:.1} above {:.1}", score, max)
            }
            IneligibleReason::KycNotVerified { status } => write!(f, "KYC is {:?}", status),
            IneligibleReason::AmlFlagged => write!(f, "AML flagged"),
            IneligibleReason::DebtRatio { ratio, max } => {
                write!(f, "debt ratio {:.2} above {:.2}", ratio, max)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum LoanError {
    #[error("loan amount {amount} outside [{min}, {max}]")]
    InvalidAmount { amount: i64, min: i64, max: i64 },

    #[error("loan term {term} months outside [{min}, {max}]")]
    InvalidTerm { term: u32, min: u32, max: u32 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("account {account_id} does not belong to user {user_id}")]
    AccountMismatch { account_id: String, user_id: String },

    #[error(transparent)]
    InvalidStatus(#[from] LoanTransitionError),

    #[error("posting failed: {0}")]
    Posting(LifecycleError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LoanError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => LoanError::NotFound { entity, id },
            other => LoanError::Store(other),
        }
    }
}

impl LoanError {
    pub fn code(&self) -> &'static str {
        match self {
            LoanError::InvalidAmount { .. } => "INVALID_AMOUNT",
            LoanError::InvalidTerm { .. } => "INVALID_TERM",
            LoanError::NotFound { .. } => "NOT_FOUND",
            LoanError::AccountMismatch { .. } => "ACCOUNT_MISMATCH",
            LoanError::InvalidStatus(_) => "INVALID_STATUS",
            LoanError::Posting(inner) => inner.code(),
            LoanError::Store(_) => "STORE_UNAVAILABLE",
        }
    }

    pub fn is_domain_failure(&self) -> bool {
        match self {
            LoanError::Store(_) => false,
            LoanError::Posting(inner) => inner.is_domain_failure(),
            _ => true,
        }
    }
}

/// A request for credit
#[derive(Debug, Clone, PartialEq)]
pub struct LoanApplication {
    pub user_id: String,
    pub account_id: String,
    pub amount: i64,
    pub term_months: u32,
    pub purpose: String,
}

/// Outcome of one daily collection run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionSummary {
    pub due: usize,
    pub collected: usize,
    pub amount_collected: i64,
    pub missed: usize,
    pub defaulted: usize,
    pub paid_off: usize,
    pub errors: usize,
    /// Per-loan results in processing order
    pub outcomes: Vec<CollectionOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CollectionOutcome {
    Collected { loan_id: String, amount: i64, remaining: i64 },
    Missed { loan_id: String, consecutive: u32 },
    Defaulted { loan_id: String },
}

/// Standard amortization payment, rounded up to the next cent
///
/// # Example
/// ```
/// use mockbank_core::engines::loans::monthly_payment;
///
/// assert_eq!(monthly_payment(120_000, 0.0, 12), 10_000);
/// assert!(monthly_payment(500_000, 0.085, 24) > 500_000 / 24);
/// ```
pub fn monthly_payment(principal: i64, annual_rate: f64, term_months: u32) -> i64 {
    if term_months == 0 {
        return principal;
    }
    let n = f64::from(term_months);
    let p = principal as f64;
    let r = annual_rate / 12.0;
    let exact = if r.abs() < f64::EPSILON {
        p / n
    } else {
        p * r / (1.0 - (1.0 + r).powf(-n))
    };
    exact.ceil() as i64
}

/// One month of interest on `remaining`, rounded down
pub fn monthly_interest(remaining: i64, annual_rate: f64) -> i64 {
    ((remaining.max(0) as f64) * annual_rate / 12.0).floor() as i64
}

pub struct LoanEngine<'a> {
    config: &'a LoanConfig,
    lifecycle: &'a LifecycleConfig,
}

impl<'a> LoanEngine<'a> {
    pub fn new(config: &'a LoanConfig, lifecycle: &'a LifecycleConfig) -> Self {
        Self { config, lifecycle }
    }

    /// Annual rate offered at a risk score
    pub fn interest_rate(&self, risk_score: f64) -> f64 {
        self.config.base_rate + risk_score.clamp(0.0, 100.0) / 100.0 * self.config.risk_premium
    }

    /// Check eligibility against risk, KYC, AML and existing debt
    pub fn check_eligibility(
        &self,
        user: &User,
        accounts: &[Account],
        loans: &[Loan],
    ) -> Result<(), IneligibleReason> {
        if user.risk_score > self.config.max_risk_score {
            return Err(IneligibleReason::RiskTooHigh {
                score: user.risk_score,
                max: self.config.max_risk_score,
            });
        }
        if user.kyc_status != KycStatus::Verified {
            return Err(IneligibleReason::KycNotVerified {
                status: user.kyc_status,
            });
        }
        if user.aml_status == AmlStatus::Flagged {
            return Err(IneligibleReason::AmlFlagged);
        }

        let debt: i64 = loans
            .iter()
            .filter(|l| l.is_active() || l.status == LoanStatus::Approved)
            .map(|l| l.remaining_amount)
            .sum();
        if debt > 0 {
            let balance: i64 = accounts.iter().map(|a| a.balance()).sum();
            let ratio = if balance > 0 {
                debt as f64 / balance as f64
            } else {
                f64::INFINITY
            };
            if ratio > self.config.max_debt_ratio {
                return Err(IneligibleReason::DebtRatio {
                    ratio,
                    max: self.config.max_debt_ratio,
                });
            }
        }

        Ok(())
    }

    /// Submit an application
    ///
    /// Ineligible applications are stored as `Rejected` with the reason.
    /// Applicants below the auto-approval risk score are approved and
    /// disbursed immediately.
    pub fn apply<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        application: LoanApplication,
    ) -> Result<Loan, LoanError> {
        let cfg = self.config;
        if application.amount < cfg.min_amount || application.amount > cfg.max_amount {
            return Err(LoanError::InvalidAmount {
                amount: application.amount,
                min: cfg.min_amount,
                max: cfg.max_amount,
            });
        }
        if application.term_months < cfg.min_term_months
            || application.term_months > cfg.max_term_months
        {
            return Err(LoanError::InvalidTerm {
                term: application.term_months,
                min: cfg.min_term_months,
                max: cfg.max_term_months,
            });
        }

        let user = store.get_user(&application.user_id)?;
        let account = store.get_account(&application.account_id)?;
        if account.user_id() != user.id {
            return Err(LoanError::AccountMismatch {
                account_id: account.id().to_string(),
                user_id: user.id.clone(),
            });
        }
        let accounts = store.accounts_for_user(&user.id)?;
        let existing = store.list_loans(&|l: &Loan| l.user_id == user.id)?;

        let rate = self.interest_rate(user.risk_score);
        let mut loan = Loan {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            account_id: account.id().to_string(),
            principal: application.amount,
            remaining_amount: application.amount,
            interest_rate: rate,
            term_months: application.term_months,
            monthly_payment: monthly_payment(application.amount, rate, application.term_months),
            payments_made: 0,
            payments_missed: 0,
            consecutive_missed: 0,
            status: LoanStatus::Pending,
            purpose: application.purpose,
            applied_at: now,
            approved_at: None,
            next_payment_date: None,
            last_payment_date: None,
            rejection_reason: None,
        };

        if let Err(reason) = self.check_eligibility(&user, &accounts, &existing) {
            loan.transition(LoanStatus::Rejected)?;
            loan.rejection_reason = Some(reason.to_string());
            store.insert_loan(loan.clone())?;
            info!(loan_id = %loan.id, user_id = %user.id, %reason, "loan rejected");
            return Ok(loan);
        }

        store.insert_loan(loan.clone())?;
        info!(loan_id = %loan.id, user_id = %user.id, amount = loan.principal, rate, "loan applied");

        if user.risk_score < cfg.auto_approve_below {
            return self.approve(store, now, &loan.id);
        }
        Ok(loan)
    }

    /// Approve a pending loan and disburse the principal
    ///
    /// The loan row is activated first; if the disbursement credit fails the
    /// row is restored to pending.
    pub fn approve<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        loan_id: &str,
    ) -> Result<Loan, LoanError> {
        let original = store.get_loan(loan_id)?;
        let mut loan = original.clone();
        loan.transition(LoanStatus::Active)?;
        loan.approved_at = Some(now);
        loan.next_payment_date = Some(add_months(now.date_naive(), 1));
        store.update_loan(&loan)?;

        let lifecycle = TransactionLifecycle::new(store, self.lifecycle);
        let disbursement = NewTransaction::credit(
            &loan.account_id,
            loan.principal,
            TransactionMetadata::new(Category::LoanDisbursement).with_reference(&loan.id),
        );
        if let Err(err) = lifecycle.post_immediately(now, disbursement) {
            error!(loan_id, error = %err, "disbursement failed, restoring pending loan");
            if let Err(comp) = store.update_loan(&original) {
                error!(loan_id, error = %comp, "loan compensation write failed");
            }
            return Err(LoanError::Posting(err));
        }

        info!(loan_id, amount = loan.principal, "loan approved and disbursed");
        Ok(loan)
    }

    pub fn reject<S: BankStore + ?Sized>(
        &self,
        store: &S,
        loan_id: &str,
        reason: &str,
    ) -> Result<Loan, LoanError> {
        let mut loan = store.get_loan(loan_id)?;
        loan.transition(LoanStatus::Rejected)?;
        loan.rejection_reason = Some(reason.to_string());
        store.update_loan(&loan)?;
        Ok(loan)
    }

    fn should_default(&self, loan: &Loan, today: NaiveDate) -> bool {
        if loan.consecutive_missed >= self.config.default_after_missed {
            return true;
        }
        let reference = loan
            .last_payment_date
            .or_else(|| loan.approved_at.map(|at| at.date_naive()));
        reference.is_some_and(|since| (today - since).num_days() >= self.config.default_after_days)
    }

    /// Collect one installment of a due loan
    fn collect_one<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        mut loan: Loan,
    ) -> Result<CollectionOutcome, LoanError> {
        let today = now.date_naive();
        let interest = monthly_interest(loan.remaining_amount, loan.interest_rate);
        let owed = loan.remaining_amount + interest;
        let payment = loan.monthly_payment.min(owed);
        let account = store.get_account(&loan.account_id)?;
        let next_due = loan
            .next_payment_date
            .map(|d| add_months(d, 1))
            .unwrap_or_else(|| add_months(today, 1));

        if !account.is_frozen() && account.can_cover(payment) {
            let lifecycle = TransactionLifecycle::new(store, self.lifecycle);
            let request = NewTransaction::debit(
                &loan.account_id,
                payment,
                TransactionMetadata::new(Category::LoanPayment).with_reference(&loan.id),
            )
            .skip_validation();
            lifecycle
                .post_immediately(now, request)
                .map_err(LoanError::Posting)?;

            loan.remaining_amount = owed - payment;
            loan.payments_made += 1;
            loan.consecutive_missed = 0;
            loan.last_payment_date = Some(today);
            loan.next_payment_date = Some(next_due);
            if loan.remaining_amount <= 0 {
                loan.remaining_amount = 0;
                loan.transition(LoanStatus::Paid)?;
                loan.next_payment_date = None;
            }
            store.update_loan(&loan)?;
            return Ok(CollectionOutcome::Collected {
                loan_id: loan.id,
                amount: payment,
                remaining: loan.remaining_amount,
            });
        }

        // Missed: unpaid interest is capitalized
        loan.remaining_amount = owed;
        loan.payments_missed += 1;
        loan.consecutive_missed += 1;
        loan.next_payment_date = Some(next_due);
        warn!(loan_id = %loan.id, consecutive = loan.consecutive_missed, "loan payment missed");

        let severity = if loan.consecutive_missed > 1 {
            Severity::High
        } else {
            Severity::Medium
        };
        store.append_risk_event(RiskEvent::new(
            &loan.user_id,
            RiskEventKind::MissedPayment {
                loan_id: loan.id.clone(),
                consecutive: loan.consecutive_missed,
            },
            severity,
            now,
        ))?;

        if self.should_default(&loan, today) {
            loan.transition(LoanStatus::Defaulted)?;
            loan.next_payment_date = None;
            store.update_loan(&loan)?;
            store.append_risk_event(RiskEvent::new(
                &loan.user_id,
                RiskEventKind::LoanDefault {
                    loan_id: loan.id.clone(),
                    remaining_amount: loan.remaining_amount,
                },
                Severity::Critical,
                now,
            ))?;
            warn!(loan_id = %loan.id, remaining = loan.remaining_amount, "loan defaulted");
            return Ok(CollectionOutcome::Defaulted { loan_id: loan.id });
        }

        store.update_loan(&loan)?;
        Ok(CollectionOutcome::Missed {
            loan_id: loan.id,
            consecutive: loan.consecutive_missed,
        })
    }

    /// Collect every active loan whose payment date has arrived
    ///
    /// One loan's failure is logged and counted; it never stops the batch.
    pub fn collect_due_payments<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
    ) -> Result<CollectionSummary, StoreError> {
        let today = now.date_naive();
        let due = store.list_loans(&|l: &Loan| {
            l.is_active() && l.next_payment_date.is_some_and(|d| d <= today)
        })?;

        let mut summary = CollectionSummary {
            due: due.len(),
            ..CollectionSummary::default()
        };

        for loan in due {
            let loan_id = loan.id.clone();
            match self.collect_one(store, now, loan) {
                Ok(outcome) => {
                    match &outcome {
                        CollectionOutcome::Collected { amount, remaining, .. } => {
                            summary.collected += 1;
                            summary.amount_collected += amount;
                            if *remaining == 0 {
                                summary.paid_off += 1;
                            }
                        }
                        CollectionOutcome::Missed { .. } => summary.missed += 1,
                        CollectionOutcome::Defaulted { .. } => {
                            summary.missed += 1;
                            summary.defaulted += 1;
                        }
                    }
                    summary.outcomes.push(outcome);
                }
                Err(err) => {
                    error!(loan_id = %loan_id, code = err.code(), error = %err, "loan collection failed");
                    summary.errors += 1;
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_scales_with_risk() {
        let loans = LoanConfig::default();
        let lifecycle = LifecycleConfig::default();
        let engine = LoanEngine::new(&loans, &lifecycle);
        assert!((engine.interest_rate(0.0) - 0.05).abs() < 1e-12);
        assert!((engine.interest_rate(100.0) - 0.20).abs() < 1e-12);
        assert!((engine.interest_rate(40.0) - 0.11).abs() < 1e-12);
    }

    #[test]
    fn test_interest_rounds_down() {
        // 100_001 × 0.12 / 12 = 1000.01
        assert_eq!(monthly_interest(100_001, 0.12), 1_000);
        assert_eq!(monthly_interest(-5, 0.12), 0);
    }

    #[test]
    fn test_eligibility_gates() {
        let loans = LoanConfig::default();
        let lifecycle = LifecycleConfig::default();
        let engine = LoanEngine::new(&loans, &lifecycle);
        let mut user = User::new("Bo", "bo@example.com", "family", Utc::now());

        assert!(matches!(
            engine.check_eligibility(&user, &[], &[]),
            Err(IneligibleReason::KycNotVerified { .. })
        ));

        user.kyc_status = KycStatus::Verified;
        assert!(engine.check_eligibility(&user, &[], &[]).is_ok());

        user.aml_status = AmlStatus::Flagged;
        assert_eq!(
            engine.check_eligibility(&user, &[], &[]),
            Err(IneligibleReason::AmlFlagged)
        );

        user.aml_status = AmlStatus::Clear;
        user.risk_score = 71.0;
        assert!(matches!(
            engine.check_eligibility(&user, &[], &[]),
            Err(IneligibleReason::RiskTooHigh { .. })
        ));
    }
}
