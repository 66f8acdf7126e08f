//! Fraud scoring
//!
//! Scores a debit 0-100 from additive heuristic contributions computed over
//! the account's trailing history, then maps the score to a recommended
//! action. Credits are never scored.

use crate::config::FraudConfig;
use crate::models::{
    Account, Direction, FraudAction, FraudAlert, FraudSignal, ScoredSignal, Transaction,
};
use crate::store::{BankStore, Change, StoreError};
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Score and fired heuristics for one transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudAssessment {
    pub score: u8,
    pub action: FraudAction,
    pub signals: Vec<ScoredSignal>,
}

impl FraudAssessment {
    fn clean() -> Self {
        Self {
            score: 0,
            action: FraudAction::Allow,
            signals: Vec::new(),
        }
    }

    pub fn is_flagged(&self) -> bool {
        self.action >= FraudAction::Flag
    }
}

/// Persisted outcome of reviewing one transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudReview {
    pub assessment: FraudAssessment,
    pub alert: Option<FraudAlert>,
    /// Accounts frozen by this review
    pub frozen_accounts: Vec<String>,
}

pub struct FraudEngine<'a> {
    config: &'a FraudConfig,
}

impl<'a> FraudEngine<'a> {
    pub fn new(config: &'a FraudConfig) -> Self {
        Self { config }
    }

    /// Map a score to its recommended action
    pub fn action_for(&self, score: u8) -> FraudAction {
        if score >= self.config.freeze_threshold {
            FraudAction::Freeze
        } else if score >= self.config.block_threshold {
            FraudAction::Block
        } else if score >= self.config.flag_threshold {
            FraudAction::Flag
        } else {
            FraudAction::Allow
        }
    }

    /// Score `tx` against earlier activity on the same account
    ///
    /// `history` may contain any transactions of the account; entries that
    /// are canceled, later than `tx`, or `tx` itself are ignored.
    pub fn assess(&self, tx: &Transaction, history: &[Transaction]) -> FraudAssessment {
        if tx.direction() != Direction::Debit {
            return FraudAssessment::clean();
        }

        let cfg = self.config;
        let at = tx.created_at();
        let prior: Vec<&Transaction> = history
            .iter()
            .filter(|h| h.id() != tx.id() && !h.is_canceled() && h.created_at() <= at)
            .collect();
        let prior_debits: Vec<&Transaction> = prior
            .iter()
            .copied()
            .filter(|h| h.direction() == Direction::Debit)
            .collect();

        let mut signals = Vec::new();

        // Large at night
        let hour = at.hour();
        if tx.amount() >= cfg.large_amount && hour < cfg.night_end_hour {
            signals.push(ScoredSignal {
                signal: FraudSignal::LargeAtNight {
                    amount: tx.amount(),
                    hour,
                },
                points: cfg.large_night_points,
            });
        }

        // Velocity, counting this transaction
        let velocity_since = at - Duration::minutes(cfg.velocity_window_minutes);
        let count = 1 + prior.iter().filter(|h| h.created_at() >= velocity_since).count();
        if count >= cfg.velocity_high_count {
            signals.push(ScoredSignal {
                signal: FraudSignal::Velocity { count },
                points: cfg.velocity_high_points,
            });
        } else if count >= cfg.velocity_count {
            signals.push(ScoredSignal {
                signal: FraudSignal::Velocity { count },
                points: cfg.velocity_points,
            });
        }

        if let Some(signal) = self.geo_jump(tx, &prior) {
            signals.push(ScoredSignal {
                signal,
                points: cfg.geo_jump_points,
            });
        }

        // Amount against the rolling average
        let lookback = at - Duration::days(cfg.spike_lookback_days);
        let recent: Vec<i64> = prior_debits
            .iter()
            .filter(|h| h.created_at() >= lookback)
            .map(|h| h.amount())
            .collect();
        if recent.len() >= cfg.spike_min_history {
            let average = recent.iter().sum::<i64>() as f64 / recent.len() as f64;
            if average > 0.0 {
                let ratio = tx.amount() as f64 / average;
                if ratio >= cfg.spike_high_ratio {
                    signals.push(ScoredSignal {
                        signal: FraudSignal::AmountSpike { ratio },
                        points: cfg.spike_high_points,
                    });
                } else if ratio >= cfg.spike_ratio {
                    signals.push(ScoredSignal {
                        signal: FraudSignal::AmountSpike { ratio },
                        points: cfg.spike_points,
                    });
                }
            }
        }

        // Duplicate: same amount and merchant moments ago
        let duplicate_since = at - Duration::minutes(cfg.duplicate_window_minutes);
        if let Some(merchant) = tx.metadata().merchant.as_deref() {
            if let Some(previous) = prior_debits.iter().rev().find(|h| {
                h.created_at() >= duplicate_since
                    && h.amount() == tx.amount()
                    && h.metadata().merchant.as_deref() == Some(merchant)
            }) {
                signals.push(ScoredSignal {
                    signal: FraudSignal::Duplicate {
                        previous_id: previous.id().to_string(),
                    },
                    points: cfg.duplicate_points,
                });
            }
        }

        // Card testing: burst of tiny debits
        if tx.amount() < cfg.small_amount {
            let small = 1 + prior_debits
                .iter()
                .filter(|h| h.created_at() >= velocity_since && h.amount() < cfg.small_amount)
                .count();
            if small >= cfg.small_count {
                signals.push(ScoredSignal {
                    signal: FraudSignal::SmallAmountBurst { count: small },
                    points: cfg.small_points,
                });
            }
        }

        let total: u32 = signals.iter().map(|s| u32::from(s.points)).sum();
        let score = total.min(100) as u8;
        FraudAssessment {
            score,
            action: self.action_for(score),
            signals,
        }
    }

    fn geo_jump(&self, tx: &Transaction, prior: &[&Transaction]) -> Option<FraudSignal> {
        let here = tx.metadata().location.as_ref()?;
        let previous = prior
            .iter()
            .rev()
            .find(|h| h.metadata().location.is_some())?;
        let there = previous.metadata().location.as_ref()?;

        let distance_km = there.distance_km(here);
        if distance_km <= 0.0 {
            return None;
        }
        let elapsed_secs = (tx.created_at() - previous.created_at()).num_seconds().max(60);
        let speed_kmh = distance_km / (elapsed_secs as f64 / 3600.0);

        (speed_kmh > self.config.max_travel_speed_kmh).then(|| FraudSignal::GeoJump {
            from_city: there.city.clone(),
            to_city: here.city.clone(),
            distance_km,
            speed_kmh,
        })
    }

    /// Assess a stored transaction and persist the consequences
    ///
    /// Records the score on the transaction, appends a [`FraudAlert`] when
    /// the score reaches the flag threshold, and freezes every account of
    /// the owning user on a freeze recommendation.
    pub fn review<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        tx_id: &str,
    ) -> Result<FraudReview, StoreError> {
        let tx = store.get_transaction(tx_id)?;
        let history = store.transactions_for_account(tx.account_id())?;
        let assessment = self.assess(&tx, &history);

        let mut review = FraudReview {
            assessment,
            alert: None,
            frozen_accounts: Vec::new(),
        };
        if review.assessment.score == 0 {
            return Ok(review);
        }

        let (score, flagged) = (review.assessment.score, review.assessment.is_flagged());
        let tx = store.modify_transaction(tx_id, &mut |row: &mut Transaction| {
            row.set_fraud_score(score, flagged);
            Change::Commit
        })?;

        if !review.assessment.is_flagged() {
            return Ok(review);
        }

        let account = store.get_account(tx.account_id())?;
        let alert = FraudAlert {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: account.user_id().to_string(),
            account_id: account.id().to_string(),
            transaction_id: tx.id().to_string(),
            score: review.assessment.score,
            action: review.assessment.action,
            severity: review.assessment.action.severity(),
            signals: review.assessment.signals.clone(),
            created_at: now,
        };
        store.append_fraud_alert(alert.clone())?;
        info!(
            tx_id,
            account_id = account.id(),
            score = alert.score,
            action = ?alert.action,
            "fraud alert raised"
        );

        if review.assessment.action == FraudAction::Freeze {
            for owned in store.accounts_for_user(account.user_id())? {
                let mut newly_frozen = false;
                store.modify_account(owned.id(), &mut |row: &mut Account| {
                    if row.is_frozen() {
                        return Change::Abort;
                    }
                    row.freeze();
                    newly_frozen = true;
                    Change::Commit
                })?;
                if newly_frozen {
                    warn!(account_id = owned.id(), user_id = owned.user_id(), "account frozen");
                    review.frozen_accounts.push(owned.id().to_string());
                }
            }
        }

        review.alert = Some(alert);
        Ok(review)
    }
}
