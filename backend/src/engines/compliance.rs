//! KYC, AML and sanctions screening
//!
//! # Critical Invariants
//! - AML standing only escalates: `Clear` -> `UnderReview` -> `Flagged`
//! - A verified KYC record always carries an expiry
//! - Every finding is appended to the compliance log, including clears

use crate::config::{AmlConfig, ComplianceConfig};
use crate::models::{
    AmlFlag, AmlStatus, ComplianceFinding, ComplianceLog, Direction, KycStatus, Severity,
    Transaction, User,
};
use crate::rng::SeededRng;
use crate::store::{BankStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

/// AML rules that fired for one transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmlScreening {
    pub tx_id: String,
    pub account_id: String,
    pub user_id: String,
    pub flags: Vec<AmlFlag>,
}

impl AmlScreening {
    pub fn is_clear(&self) -> bool {
        self.flags.is_empty()
    }
}

/// Outcome of a sanctions check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SanctionsResult {
    Clear,
    Hit { matched: String },
    FalsePositive,
}

/// Counters of the once-per-day compliance batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyReview {
    pub users_reviewed: usize,
    pub expired: usize,
    pub rescreened: usize,
    pub verified: usize,
    pub sanctions_hits: usize,
    pub errors: usize,
}

pub struct ComplianceEngine<'a> {
    config: &'a ComplianceConfig,
    aml: &'a AmlConfig,
}

impl<'a> ComplianceEngine<'a> {
    pub fn new(config: &'a ComplianceConfig, aml: &'a AmlConfig) -> Self {
        Self { config, aml }
    }

    /// Draw a KYC outcome without touching the store
    pub fn draw_kyc(&self, rng: &mut SeededRng) -> KycStatus {
        let table = [
            (KycStatus::Verified, self.config.kyc_verified_probability),
            (KycStatus::Pending, self.config.kyc_pending_probability),
            (KycStatus::Rejected, self.config.kyc_rejected_probability),
        ];
        rng.pick_weighted(&table)
            .copied()
            .unwrap_or(KycStatus::Pending)
    }

    /// Apply a KYC outcome to `user` in place and build its log entry
    pub fn apply_kyc(&self, user: &mut User, status: KycStatus, now: DateTime<Utc>) -> ComplianceLog {
        user.kyc_status = status;
        let (finding, severity) = match status {
            KycStatus::Verified => {
                user.kyc_verified_at = Some(now);
                user.kyc_expires_at = Some(now + Duration::days(self.config.kyc_validity_days));
                (ComplianceFinding::KycVerified, Severity::Low)
            }
            KycStatus::Rejected => {
                user.kyc_expires_at = None;
                (ComplianceFinding::KycRejected, Severity::Medium)
            }
            KycStatus::Expired => (ComplianceFinding::KycExpired, Severity::Medium),
            KycStatus::Pending | KycStatus::Unverified => {
                (ComplianceFinding::KycPending, Severity::Low)
            }
        };
        ComplianceLog::new(&user.id, finding, severity, now)
    }

    /// Run a KYC verification for a stored user
    pub fn verify_kyc<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        user_id: &str,
        rng: &mut SeededRng,
    ) -> Result<KycStatus, StoreError> {
        let mut user = store.get_user(user_id)?;
        let status = self.draw_kyc(rng);
        let log = self.apply_kyc(&mut user, status, now);
        store.update_user(&user)?;
        store.append_compliance_log(log)?;
        info!(user_id, status = ?status, "kyc verification");
        Ok(status)
    }

    /// AML flags for `tx` given the account's other transactions
    ///
    /// The window is the trailing `window_hours` up to and including `tx`;
    /// canceled transactions are ignored.
    pub fn aml_flags(&self, tx: &Transaction, history: &[Transaction]) -> Vec<AmlFlag> {
        let at = tx.created_at();
        let since = at - Duration::hours(self.aml.window_hours);
        let window: Vec<&Transaction> = history
            .iter()
            .filter(|t| t.id() != tx.id() && !t.is_canceled())
            .filter(|t| t.created_at() > since && t.created_at() <= at)
            .chain(std::iter::once(tx))
            .collect();

        let mut flags = Vec::new();
        if tx.amount() >= self.aml.large_amount {
            flags.push(AmlFlag::LargeTransaction);
        }

        let in_band = |t: &Transaction| {
            t.direction() == Direction::Debit
                && t.amount() >= self.aml.structuring_floor
                && t.amount() < self.aml.large_amount
        };
        if in_band(tx) && window.iter().filter(|t| in_band(t)).count() >= self.aml.structuring_count {
            flags.push(AmlFlag::Structuring);
        }

        let aggregate: i64 = window.iter().map(|t| t.amount()).sum();
        if aggregate >= self.aml.daily_aggregate {
            flags.push(AmlFlag::DailyAggregate);
        }

        if window.len() >= self.aml.high_frequency_count {
            flags.push(AmlFlag::HighFrequency);
        }
        flags
    }

    /// Screen a stored transaction and record every fired flag
    pub fn screen_transaction<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        tx_id: &str,
    ) -> Result<AmlScreening, StoreError> {
        let tx = store.get_transaction(tx_id)?;
        let history = store.transactions_for_account(tx.account_id())?;
        let account = store.get_account(tx.account_id())?;
        let flags = self.aml_flags(&tx, &history);

        let screening = AmlScreening {
            tx_id: tx.id().to_string(),
            account_id: account.id().to_string(),
            user_id: account.user_id().to_string(),
            flags,
        };
        if screening.is_clear() {
            return Ok(screening);
        }

        let mut user = store.get_user(account.user_id())?;
        let mut next = user.aml_status;
        for flag in &screening.flags {
            store.append_compliance_log(ComplianceLog::new(
                &user.id,
                ComplianceFinding::Aml {
                    flag: *flag,
                    transaction_id: screening.tx_id.clone(),
                },
                flag.severity(),
                now,
            ))?;
            let target = match flag {
                AmlFlag::Structuring => AmlStatus::Flagged,
                _ => AmlStatus::UnderReview,
            };
            next = escalate(next, target);
        }
        if next != user.aml_status {
            user.aml_status = next;
            store.update_user(&user)?;
        }

        warn!(
            tx_id,
            user_id = %user.id,
            flags = ?screening.flags,
            aml_status = ?user.aml_status,
            "aml flags raised"
        );
        Ok(screening)
    }

    /// Case-insensitive blocklist match, with a small false-positive rate
    pub fn check_sanctions(&self, name: &str, rng: &mut SeededRng) -> SanctionsResult {
        let lowered = name.to_lowercase();
        if let Some(entry) = self
            .config
            .sanctions_blocklist
            .iter()
            .find(|entry| !entry.is_empty() && lowered.contains(&entry.to_lowercase()))
        {
            return SanctionsResult::Hit {
                matched: entry.clone(),
            };
        }
        if rng.next_bool(self.config.sanctions_false_positive_rate) {
            return SanctionsResult::FalsePositive;
        }
        SanctionsResult::Clear
    }

    /// Screen a stored user's name against the sanctions list
    ///
    /// A hit marks the user sanctioned and AML-flagged. A false positive is
    /// logged but leaves the user untouched.
    pub fn screen_sanctions<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        user_id: &str,
        rng: &mut SeededRng,
    ) -> Result<SanctionsResult, StoreError> {
        let mut user = store.get_user(user_id)?;
        let result = self.check_sanctions(&user.name, rng);
        let (finding, severity) = match &result {
            SanctionsResult::Clear => (ComplianceFinding::SanctionsClear, Severity::Low),
            SanctionsResult::FalsePositive => {
                (ComplianceFinding::SanctionsFalsePositive, Severity::Low)
            }
            SanctionsResult::Hit { matched } => (
                ComplianceFinding::SanctionsHit {
                    matched: matched.clone(),
                },
                Severity::Critical,
            ),
        };

        if let SanctionsResult::Hit { matched } = &result {
            user.sanctioned = true;
            user.aml_status = AmlStatus::Flagged;
            store.update_user(&user)?;
            warn!(user_id, matched = %matched, "sanctions hit");
        }
        store.append_compliance_log(ComplianceLog::new(&user.id, finding, severity, now))?;
        Ok(result)
    }

    /// Expire stale KYC records and re-screen pending or expired users
    ///
    /// Per-user failures are logged and counted; the batch continues.
    pub fn daily_review<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        rng: &mut SeededRng,
    ) -> Result<DailyReview, StoreError> {
        let mut review = DailyReview::default();
        for user in store.list_users(&|_: &User| true)? {
            review.users_reviewed += 1;
            if let Err(err) = self.review_user(store, now, user, rng, &mut review) {
                error!(error = %err, "compliance review failed for user");
                review.errors += 1;
            }
        }
        info!(
            reviewed = review.users_reviewed,
            expired = review.expired,
            rescreened = review.rescreened,
            "daily compliance review"
        );
        Ok(review)
    }

    fn review_user<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        mut user: User,
        rng: &mut SeededRng,
        review: &mut DailyReview,
    ) -> Result<(), StoreError> {
        let lapsed = user.kyc_status == KycStatus::Verified
            && user.kyc_expires_at.is_some_and(|expiry| expiry <= now);
        if lapsed {
            let log = self.apply_kyc(&mut user, KycStatus::Expired, now);
            store.update_user(&user)?;
            store.append_compliance_log(log)?;
            review.expired += 1;
        }

        if matches!(user.kyc_status, KycStatus::Pending | KycStatus::Expired) {
            review.rescreened += 1;
            if self.verify_kyc(store, now, &user.id, rng)? == KycStatus::Verified {
                review.verified += 1;
            }
            if let SanctionsResult::Hit { .. } = self.screen_sanctions(store, now, &user.id, rng)? {
                review.sanctions_hits += 1;
            }
        }
        Ok(())
    }
}

fn escalate(current: AmlStatus, target: AmlStatus) -> AmlStatus {
    match (current, target) {
        (AmlStatus::Flagged, _) | (_, AmlStatus::Flagged) => AmlStatus::Flagged,
        (AmlStatus::UnderReview, _) | (_, AmlStatus::UnderReview) => AmlStatus::UnderReview,
        _ => AmlStatus::Clear,
    }
}
