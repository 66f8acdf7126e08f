//! Composite risk scoring
//!
//! Seven sub-scores (0 = safe, 100 = risky) are blended with configured
//! weights into a composite score, which maps to a [`RiskLevel`] band.
//! A sub-score without data to judge falls back to a neutral default
//! instead of failing.

use crate::config::RiskConfig;
use crate::models::{
    Account, Category, Direction, Loan, LoanStatus, RiskEvent, RiskEventKind, RiskLevel,
    Severity, Transaction, User,
};
use crate::store::{BankStore, StoreError};
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, info};

/// Hours strictly before this are "unusual" for large spending
const UNUSUAL_HOUR_END: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskSubScores {
    /// Coefficient of variation of daily spending
    pub stability: f64,
    /// Variation between income payments
    pub income: f64,
    pub overdraft: f64,
    /// Missed share of scheduled loan payments
    pub loans: f64,
    pub unusual_hour: f64,
    pub account_age: f64,
    /// Few spending categories score high
    pub diversity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub user_id: String,
    pub score: f64,
    pub level: RiskLevel,
    pub sub_scores: RiskSubScores,
}

/// Outcome of recomputing every user
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskRecompute {
    pub assessed: usize,
    /// Users whose level rose to high or critical
    pub escalated: usize,
    pub errors: usize,
}

fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt() / mean)
}

fn level_severity(level: RiskLevel) -> Severity {
    match level {
        RiskLevel::Low => Severity::Low,
        RiskLevel::Medium => Severity::Medium,
        RiskLevel::High => Severity::High,
        RiskLevel::Critical => Severity::Critical,
    }
}

pub struct RiskEngine<'a> {
    config: &'a RiskConfig,
}

impl<'a> RiskEngine<'a> {
    pub fn new(config: &'a RiskConfig) -> Self {
        Self { config }
    }

    /// Compute sub-scores from a user's accounts, transactions and loans
    pub fn sub_scores(
        &self,
        accounts: &[Account],
        transactions: &[Transaction],
        loans: &[Loan],
        now: DateTime<Utc>,
    ) -> RiskSubScores {
        let default = self.config.default_sub_score;
        let since = now - Duration::days(self.config.lookback_days);
        let window: Vec<&Transaction> = transactions
            .iter()
            .filter(|t| !t.is_canceled() && t.created_at() >= since && t.created_at() <= now)
            .collect();
        let spending: Vec<&Transaction> = window
            .iter()
            .copied()
            .filter(|t| t.direction() == Direction::Debit && t.category().is_spending())
            .collect();

        let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for t in &spending {
            *daily.entry(t.created_at().date_naive()).or_default() += t.amount() as f64;
        }
        let daily: Vec<f64> = daily.into_values().collect();
        let stability = coefficient_of_variation(&daily)
            .map(|cv| (cv * 50.0).min(100.0))
            .unwrap_or(default);

        let incomes: Vec<f64> = window
            .iter()
            .filter(|t| t.direction() == Direction::Credit && t.category() == Category::Salary)
            .map(|t| t.amount() as f64)
            .collect();
        let income = coefficient_of_variation(&incomes)
            .map(|cv| (cv * 100.0).min(100.0))
            .unwrap_or(default);

        let overdraft = if window.is_empty() {
            default
        } else {
            let events: u32 = accounts.iter().map(|a| a.overdraft_count()).sum();
            let negative = accounts.iter().any(|a| a.balance() < 0);
            let score = f64::from(events) * 20.0 + if negative { 20.0 } else { 0.0 };
            score.min(100.0)
        };

        let loans_score = if loans.iter().any(|l| l.status == LoanStatus::Defaulted) {
            100.0
        } else {
            let made: u32 = loans.iter().map(|l| l.payments_made).sum();
            let missed: u32 = loans.iter().map(|l| l.payments_missed).sum();
            if made + missed == 0 {
                default
            } else {
                f64::from(missed) / f64::from(made + missed) * 100.0
            }
        };

        let unusual_hour = if window.is_empty() {
            default
        } else {
            let count = window
                .iter()
                .filter(|t| {
                    t.direction() == Direction::Debit
                        && t.amount() >= self.config.unusual_hour_amount
                        && t.created_at().hour() < UNUSUAL_HOUR_END
                })
                .count();
            (count as f64 * 25.0).min(100.0)
        };

        let account_age = accounts
            .iter()
            .map(|a| a.created_at())
            .min()
            .map(|opened| match (now - opened).num_days() {
                d if d < 30 => 80.0,
                d if d < 180 => 50.0,
                d if d < 365 => 30.0,
                _ => 10.0,
            })
            .unwrap_or(default);

        let categories: BTreeSet<_> = spending.iter().map(|t| t.category()).collect();
        let diversity = if categories.is_empty() {
            default
        } else {
            (100.0 - categories.len() as f64 * 15.0).max(0.0)
        };

        RiskSubScores {
            stability,
            income,
            overdraft,
            loans: loans_score,
            unusual_hour,
            account_age,
            diversity,
        }
    }

    /// Blend sub-scores into a composite in [0, 100]
    pub fn composite(&self, s: &RiskSubScores) -> f64 {
        let w = &self.config.weights;
        let total = w.total();
        if total <= 0.0 {
            return self.config.default_sub_score;
        }
        let weighted = s.stability * w.stability
            + s.income * w.income
            + s.overdraft * w.overdraft
            + s.loans * w.loans
            + s.unusual_hour * w.unusual_hour
            + s.account_age * w.account_age
            + s.diversity * w.diversity;
        (weighted / total).clamp(0.0, 100.0)
    }

    /// Score one user from raw entities
    pub fn assess(
        &self,
        user: &User,
        accounts: &[Account],
        transactions: &[Transaction],
        loans: &[Loan],
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let sub_scores = self.sub_scores(accounts, transactions, loans, now);
        let score = self.composite(&sub_scores);
        RiskAssessment {
            user_id: user.id.clone(),
            score,
            level: RiskLevel::from_score(score),
            sub_scores,
        }
    }

    /// Score a stored user and persist the result
    ///
    /// Appends a [`RiskEvent`] when the level changes to high or critical.
    pub fn assess_user<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        user_id: &str,
    ) -> Result<RiskAssessment, StoreError> {
        let mut user = store.get_user(user_id)?;
        let accounts = store.accounts_for_user(user_id)?;
        let account_ids: BTreeSet<&str> = accounts.iter().map(|a| a.id()).collect();
        let transactions =
            store.list_transactions(&|t: &Transaction| account_ids.contains(t.account_id()))?;
        let loans = store.list_loans(&|l: &Loan| l.user_id == user_id)?;

        let assessment = self.assess(&user, &accounts, &transactions, &loans, now);
        let previous = user.risk_level;

        user.risk_score = assessment.score;
        user.risk_level = assessment.level;
        store.update_user(&user)?;

        if assessment.level != previous && assessment.level >= RiskLevel::High {
            store.append_risk_event(RiskEvent::new(
                user_id,
                RiskEventKind::LevelChange {
                    from: previous,
                    to: assessment.level,
                    score: assessment.score,
                },
                level_severity(assessment.level),
                now,
            ))?;
            info!(
                user_id,
                score = assessment.score,
                level = ?assessment.level,
                "risk level escalated"
            );
        }

        Ok(assessment)
    }

    /// Recompute every user's score; one user's failure never stops the rest
    pub fn recompute_all<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
    ) -> Result<RiskRecompute, StoreError> {
        let users = store.list_users(&|_: &User| true)?;
        let mut summary = RiskRecompute::default();

        for user in users {
            let before = user.risk_level;
            match self.assess_user(store, now, &user.id) {
                Ok(assessment) => {
                    summary.assessed += 1;
                    if assessment.level != before && assessment.level >= RiskLevel::High {
                        summary.escalated += 1;
                    }
                }
                Err(err) => {
                    error!(user_id = %user.id, error = %err, "risk assessment failed");
                    summary.errors += 1;
                }
            }
        }

        Ok(summary)
    }
}
