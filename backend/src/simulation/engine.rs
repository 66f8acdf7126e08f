//! Simulation cycle
//!
//! A [`Simulation`] owns everything one simulated bank needs: the store,
//! the clock, the configuration, the persona catalog and the event log.
//! Several instances can run side by side.
//!
//! # Cycle
//!
//! ```text
//! 1. Derive the cycle seed
//! 2. Generate live activity for every non-frozen account
//! 3. Fraud and AML screening of the new transactions
//! 4. Resolve due pending transactions
//! 5. Anomaly injection (fraud incident, market shock)
//! 6. Market price update and portfolio revaluation
//! 7. Day rollover batch (loan collection, compliance review, risk recompute)
//! 8. Persist counters, return the summary
//! ```
//!
//! # Critical Invariants
//!
//! 1. In deterministic mode every random draw of a cycle comes from one
//!    generator seeded from `seed_key`, the date and the cycle of the day
//! 2. A failing account, transaction, loan or user is logged and counted;
//!    it never stops the rest of its batch
//! 3. At most one cycle runs at a time on a given instance

use crate::config::SimulatorConfig;
use crate::core::time::Clock;
use crate::engines::{
    CollectionOutcome, ComplianceEngine, CrashSeverity, FraudEngine, InvestmentEngine, LoanEngine,
    RiskEngine,
};
use crate::error::SimulationError;
use crate::generator::generate_live;
use crate::lifecycle::{
    LifecycleError, NewTransaction, PendingOutcome, PendingSummary, TransactionLifecycle,
};
use crate::models::{
    Account, Category, Direction, Event, EventLog, FraudAlert, Loan, LoanStatus, Portfolio,
    SimulationState, Transaction, TransactionMetadata, TransactionStatus, User,
};
use crate::persona::{merchants, PersonaCatalog};
use crate::rng::{hash_seed, SeededRng};
use crate::store::{BankStore, Change, MemoryStore, StoreError, StoreSnapshot};
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, info_span, warn};

/// Structured result of one cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub at: Option<DateTime<Utc>>,
    pub seed: u32,
    pub generated: usize,
    /// Creations refused by a domain rule
    pub rejected: usize,
    pub posted: usize,
    pub adjusted: usize,
    pub canceled: usize,
    pub flagged: usize,
    pub frozen_accounts: usize,
    pub aml_flags: usize,
    pub anomalies: usize,
    pub day_rollover: bool,
    pub loan_payments_collected: usize,
    pub loan_payments_missed: usize,
    pub loans_defaulted: usize,
    pub errors: usize,
}

/// Point-in-time counters of a simulation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationStats {
    pub running: bool,
    pub cycles_run: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub current_day: Option<NaiveDate>,
    pub transactions_today: u64,
    pub users: usize,
    pub accounts: usize,
    pub frozen_accounts: usize,
    pub total_balance: i64,
    pub transactions: usize,
    pub pending: usize,
    pub posted: usize,
    pub canceled: usize,
    pub flagged: usize,
    pub active_loans: usize,
    pub defaulted_loans: usize,
    pub portfolios: usize,
    pub portfolio_value: i64,
    pub fraud_alerts: usize,
    pub market_crash_active: bool,
    pub fraud_event_active: bool,
    /// Account targeted by the active fraud incident
    pub fraud_event_account: Option<String>,
    pub events_logged: usize,
}

pub struct Simulation<S: BankStore> {
    store: S,
    clock: Arc<dyn Clock>,
    config: SimulatorConfig,
    personas: PersonaCatalog,
    events: Mutex<EventLog>,
    running: AtomicBool,
}

impl<S: BankStore> Simulation<S> {
    /// Create a simulation over `store`, rejecting an invalid config
    pub fn new(
        store: S,
        clock: Arc<dyn Clock>,
        config: SimulatorConfig,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        Ok(Self {
            store,
            clock,
            config,
            personas: PersonaCatalog::builtin(),
            events: Mutex::new(EventLog::new()),
            running: AtomicBool::new(false),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn personas(&self) -> &PersonaCatalog {
        &self.personas
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// True while a cycle is executing
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn event_log(&self) -> MutexGuard<'_, EventLog> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every event logged so far
    pub fn events(&self) -> Vec<Event> {
        self.event_log().events().to_vec()
    }

    /// Events of one type, e.g. `"TransactionPosted"`
    pub fn events_of_type(&self, event_type: &str) -> Vec<Event> {
        self.event_log()
            .events_of_type(event_type)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn clear_events(&self) {
        self.event_log().clear();
    }

    fn record(&self, events: Vec<Event>) {
        let mut log = self.event_log();
        for event in events {
            log.log(event);
        }
    }

    // ========================================================================
    // Engines
    // ========================================================================

    pub fn lifecycle(&self) -> TransactionLifecycle<'_, S> {
        TransactionLifecycle::new(&self.store, &self.config.lifecycle)
    }

    pub fn fraud(&self) -> FraudEngine<'_> {
        FraudEngine::new(&self.config.fraud)
    }

    pub fn risk(&self) -> RiskEngine<'_> {
        RiskEngine::new(&self.config.risk)
    }

    pub fn loans(&self) -> LoanEngine<'_> {
        LoanEngine::new(&self.config.loans, &self.config.lifecycle)
    }

    pub fn investment(&self) -> InvestmentEngine<'_> {
        InvestmentEngine::new(&self.config.market, &self.config.lifecycle)
    }

    pub fn compliance(&self) -> ComplianceEngine<'_> {
        ComplianceEngine::new(&self.config.compliance, &self.config.aml)
    }

    // ========================================================================
    // Transaction facade
    // ========================================================================

    /// Create a pending transaction at the current instant
    pub fn create_transaction(&self, request: NewTransaction) -> Result<Transaction, LifecycleError> {
        let now = self.now();
        let account_id = request.account_id.clone();
        match self.lifecycle().create(now, request, None) {
            Ok(tx) => {
                self.record(vec![Event::TransactionCreated {
                    at: now,
                    tx_id: tx.id().to_string(),
                    account_id,
                    direction: tx.direction(),
                    amount: tx.amount(),
                }]);
                Ok(tx)
            }
            Err(err) => {
                if err.is_domain_failure() {
                    self.record(vec![Event::TransactionRejected {
                        at: now,
                        account_id,
                        code: err.code(),
                    }]);
                }
                Err(err)
            }
        }
    }

    pub fn post_transaction(
        &self,
        id: &str,
        final_amount: Option<i64>,
    ) -> Result<Transaction, LifecycleError> {
        let now = self.now();
        let tx = self.lifecycle().post(now, id, final_amount)?;
        let adjusted = tx.amount() != tx.authorized_amount();
        self.record(vec![Event::TransactionPosted {
            at: now,
            tx_id: tx.id().to_string(),
            account_id: tx.account_id().to_string(),
            amount: tx.amount(),
            adjusted,
        }]);
        Ok(tx)
    }

    pub fn cancel_transaction(&self, id: &str, reason: &str) -> Result<Transaction, LifecycleError> {
        let now = self.now();
        let tx = self.lifecycle().cancel(now, id, reason)?;
        self.record(vec![Event::TransactionCanceled {
            at: now,
            tx_id: tx.id().to_string(),
            account_id: tx.account_id().to_string(),
            reason: reason.to_string(),
        }]);
        Ok(tx)
    }

    /// Resolve due pending transactions outside a cycle
    pub fn process_pending_transactions(&self) -> Result<PendingSummary, SimulationError> {
        let now = self.now();
        let seed = self.seed_for(&format!("pending:{}", now.timestamp_millis()));
        let mut rng = SeededRng::new(seed);
        let summary = self.lifecycle().process_pending(now, &mut rng)?;
        self.record(pending_events(now, &summary));
        Ok(summary)
    }

    fn seed_for(&self, label: &str) -> u32 {
        if self.config.simulation.deterministic {
            hash_seed(&format!("{}:{}", self.config.simulation.seed_key, label))
        } else {
            Utc::now().timestamp_millis() as u32
        }
    }

    // ========================================================================
    // Cycle
    // ========================================================================

    /// Run one simulation cycle
    ///
    /// Returns [`SimulationError::CycleInProgress`] if another cycle is
    /// executing on this instance. An error escaping the cycle clears the
    /// running flag before it propagates.
    pub fn run_cycle(&self) -> Result<CycleSummary, SimulationError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SimulationError::CycleInProgress);
        }
        let result = self.execute_cycle();
        self.running.store(false, Ordering::Release);
        if let Err(err) = &result {
            error!(error = %err, "simulation cycle aborted");
        }
        result
    }

    fn execute_cycle(&self) -> Result<CycleSummary, SimulationError> {
        let now = self.now();
        let today = now.date_naive();
        let mut state = self.store.get_state()?;
        let day_rollover = state.current_day != Some(today);
        let cycle_of_day = if day_rollover { 0 } else { state.cycles_today };
        let seed = self.seed_for(&format!("{}:{}", today, cycle_of_day));
        let cycle = state.cycles_run + 1;

        let span = info_span!("simulation_cycle", cycle, seed, %today);
        let _enter = span.enter();

        let mut rng = SeededRng::new(seed);
        let mut summary = CycleSummary {
            cycle,
            at: Some(now),
            seed,
            day_rollover,
            ..CycleSummary::default()
        };
        let mut events = Vec::new();

        // STEP 2: LIVE ACTIVITY
        let created = self.generate_activity(now, &mut rng, &mut summary, &mut events)?;

        // STEP 3: SCREENING
        for tx_id in &created {
            self.screen(now, tx_id, &mut summary, &mut events);
        }

        // STEP 4: PENDING RESOLUTION
        let pending = self.lifecycle().process_pending(now, &mut rng)?;
        summary.posted += pending.posted;
        summary.adjusted += pending.adjusted;
        summary.canceled += pending.canceled;
        summary.errors += pending.errors;
        events.extend(pending_events(now, &pending));

        // STEP 5: ANOMALIES
        self.inject_anomalies(now, &mut state, &mut rng, &mut summary, &mut events)?;

        // STEP 6: MARKET
        let market = self.investment().update_prices(&self.store, now, &mut rng)?;
        summary.errors += market.errors;
        events.push(Event::PricesUpdated {
            at: now,
            assets: market.assets_updated,
            portfolios: market.portfolios_revalued,
        });

        // STEP 7: DAY ROLLOVER
        if day_rollover {
            self.daily_batch(now, &mut rng, &mut summary, &mut events)?;
            events.push(Event::DayRollover { at: now, day: today });
            state.current_day = Some(today);
            state.transactions_today = 0;
            state.cycles_today = 0;
        }

        // STEP 8: BOOKKEEPING
        state.transactions_today += summary.generated as u64;
        state.cycles_today += 1;
        state.cycles_run = cycle;
        state.last_run_at = Some(now);
        self.store.put_state(&state)?;

        events.push(Event::CycleCompleted {
            at: now,
            cycle,
            generated: summary.generated,
            posted: summary.posted,
            canceled: summary.canceled,
            flagged: summary.flagged,
        });
        self.record(events);

        info!(
            generated = summary.generated,
            rejected = summary.rejected,
            posted = summary.posted,
            canceled = summary.canceled,
            flagged = summary.flagged,
            errors = summary.errors,
            "cycle complete"
        );
        Ok(summary)
    }

    fn generate_activity(
        &self,
        now: DateTime<Utc>,
        rng: &mut SeededRng,
        summary: &mut CycleSummary,
        events: &mut Vec<Event>,
    ) -> Result<Vec<String>, StoreError> {
        let accounts = self.store.list_accounts(&|a: &Account| !a.is_frozen())?;
        let lifecycle = self.lifecycle();
        let mut created = Vec::new();

        for account in accounts {
            let Some(persona) = self.personas.get(account.persona()) else {
                warn!(account_id = account.id(), persona = account.persona(), "unknown persona");
                continue;
            };

            for draft in generate_live(persona, &account, now, rng, &self.config) {
                let is_income = draft.direction == Direction::Credit
                    && draft.metadata.category == Category::Salary;
                let request =
                    NewTransaction::new(account.id(), draft.direction, draft.amount, draft.metadata);
                match lifecycle.create(now, request, Some(&mut *rng)) {
                    Ok(tx) => {
                        summary.generated += 1;
                        events.push(Event::TransactionCreated {
                            at: now,
                            tx_id: tx.id().to_string(),
                            account_id: account.id().to_string(),
                            direction: tx.direction(),
                            amount: tx.amount(),
                        });
                        created.push(tx.id().to_string());
                        if is_income {
                            if let Err(err) = self.mark_income(account.id(), now.date_naive()) {
                                error!(account_id = account.id(), error = %err, "income bookkeeping failed");
                                summary.errors += 1;
                            }
                        }
                    }
                    Err(err) if err.is_domain_failure() => {
                        debug!(account_id = account.id(), code = err.code(), "generated transaction refused");
                        summary.rejected += 1;
                        events.push(Event::TransactionRejected {
                            at: now,
                            account_id: account.id().to_string(),
                            code: err.code(),
                        });
                    }
                    Err(err) => {
                        error!(account_id = account.id(), error = %err, "transaction creation failed");
                        summary.errors += 1;
                    }
                }
            }
        }
        Ok(created)
    }

    fn mark_income(&self, account_id: &str, day: NaiveDate) -> Result<(), StoreError> {
        self.store
            .modify_account(account_id, &mut |account: &mut Account| {
                account.mark_income(day);
                Change::Commit
            })
            .map(|_| ())
    }

    fn screen(
        &self,
        now: DateTime<Utc>,
        tx_id: &str,
        summary: &mut CycleSummary,
        events: &mut Vec<Event>,
    ) {
        match self.fraud().review(&self.store, now, tx_id) {
            Ok(review) => {
                if let Some(alert) = &review.alert {
                    summary.flagged += 1;
                    events.push(Event::FraudFlagged {
                        at: now,
                        tx_id: tx_id.to_string(),
                        account_id: alert.account_id.clone(),
                        score: alert.score,
                        action: alert.action,
                    });
                }
                summary.frozen_accounts += review.frozen_accounts.len();
                for account_id in review.frozen_accounts {
                    events.push(Event::AccountFrozen { at: now, account_id });
                }
            }
            Err(err) => {
                error!(tx_id, error = %err, "fraud review failed");
                summary.errors += 1;
            }
        }

        match self.compliance().screen_transaction(&self.store, now, tx_id) {
            Ok(screening) => {
                summary.aml_flags += screening.flags.len();
                for flag in screening.flags {
                    events.push(Event::AmlFlagged {
                        at: now,
                        tx_id: tx_id.to_string(),
                        account_id: screening.account_id.clone(),
                        flag,
                    });
                }
            }
            Err(err) => {
                error!(tx_id, error = %err, "aml screening failed");
                summary.errors += 1;
            }
        }
    }

    fn inject_anomalies(
        &self,
        now: DateTime<Utc>,
        state: &mut SimulationState,
        rng: &mut SeededRng,
        summary: &mut CycleSummary,
        events: &mut Vec<Event>,
    ) -> Result<(), StoreError> {
        let cfg = &self.config.anomalies;

        if state.fraud_event_active {
            if rng.next_bool(cfg.incident_end_probability) {
                state.fraud_event_active = false;
                let account_id = state.fraud_event_account.take();
                info!(account_id = ?account_id, "fraud incident ended");
                events.push(Event::FraudIncidentEnded { at: now, account_id });
            }
        } else if rng.next_bool(cfg.fraud_incident_probability) {
            if let Some(account_id) = self.start_fraud_incident(now, rng, summary, events)? {
                state.fraud_event_active = true;
                state.fraud_event_account = Some(account_id);
                summary.anomalies += 1;
            }
        }

        let investment = self.investment();
        if state.market_crash_active {
            if rng.next_bool(cfg.incident_end_probability) {
                let pct = self.config.market.recovery_pct;
                let update = investment.market_recovery(&self.store, now, pct, rng)?;
                summary.errors += update.errors;
                state.market_crash_active = false;
                events.push(Event::MarketRecovery { at: now, pct });
            }
        } else if rng.next_bool(cfg.market_shock_probability) {
            let severity = rng
                .pick(&CrashSeverity::ALL)
                .copied()
                .unwrap_or(CrashSeverity::Mild);
            let update = investment.market_crash(&self.store, now, severity, rng)?;
            summary.errors += update.errors;
            state.market_crash_active = true;
            summary.anomalies += 1;
            events.push(Event::MarketCrash {
                at: now,
                severity: severity.name().to_string(),
            });
        }
        Ok(())
    }

    /// Card-testing burst followed by a large night-time debit on one account
    fn start_fraud_incident(
        &self,
        now: DateTime<Utc>,
        rng: &mut SeededRng,
        summary: &mut CycleSummary,
        events: &mut Vec<Event>,
    ) -> Result<Option<String>, StoreError> {
        let candidates = self.store.list_accounts(&|a: &Account| !a.is_frozen())?;
        let Some(target) = rng.pick(&candidates) else {
            return Ok(None);
        };
        let account_id = target.id().to_string();
        warn!(account_id = %account_id, "fraud incident started");
        events.push(Event::FraudIncidentStarted {
            at: now,
            account_id: account_id.clone(),
        });

        let cfg = &self.config.anomalies;
        let shops = merchants(Category::Shopping);
        let mut requests = Vec::new();
        for _ in 0..cfg.card_test_count {
            let merchant = rng.pick(shops).copied().unwrap_or("Online Store");
            let amount = rng.next_int(100, cfg.card_test_max_amount.max(100));
            requests.push((
                now,
                NewTransaction::debit(
                    &account_id,
                    amount,
                    TransactionMetadata::new(Category::Shopping).with_merchant(merchant),
                ),
            ));
        }

        let night_end = self.config.fraud.night_end_hour;
        let night = if now.hour() < night_end {
            now
        } else {
            let minute = rng.next_int(0, 59) as u32;
            now.with_hour(2)
                .and_then(|t| t.with_minute(minute))
                .unwrap_or(now)
        };
        requests.push((
            night,
            NewTransaction::debit(
                &account_id,
                cfg.incident_large_amount,
                TransactionMetadata::new(Category::Shopping).with_merchant("Electronics Outlet"),
            ),
        ));

        let lifecycle = self.lifecycle();
        for (at, request) in requests {
            match lifecycle.create(at, request, Some(&mut *rng)) {
                Ok(tx) => {
                    summary.generated += 1;
                    events.push(Event::TransactionCreated {
                        at,
                        tx_id: tx.id().to_string(),
                        account_id: account_id.clone(),
                        direction: tx.direction(),
                        amount: tx.amount(),
                    });
                    self.screen(now, tx.id(), summary, events);
                }
                Err(err) if err.is_domain_failure() => {
                    summary.rejected += 1;
                    events.push(Event::TransactionRejected {
                        at,
                        account_id: account_id.clone(),
                        code: err.code(),
                    });
                }
                Err(err) => {
                    error!(account_id = %account_id, error = %err, "incident transaction failed");
                    summary.errors += 1;
                }
            }
        }
        Ok(Some(account_id))
    }

    fn daily_batch(
        &self,
        now: DateTime<Utc>,
        rng: &mut SeededRng,
        summary: &mut CycleSummary,
        events: &mut Vec<Event>,
    ) -> Result<(), StoreError> {
        let collection = self.loans().collect_due_payments(&self.store, now)?;
        summary.loan_payments_collected += collection.collected;
        summary.loan_payments_missed += collection.missed;
        summary.loans_defaulted += collection.defaulted;
        summary.errors += collection.errors;
        for outcome in collection.outcomes {
            events.push(match outcome {
                CollectionOutcome::Collected {
                    loan_id,
                    amount,
                    remaining,
                } => Event::LoanPaymentCollected {
                    at: now,
                    loan_id,
                    amount,
                    remaining,
                },
                CollectionOutcome::Missed {
                    loan_id,
                    consecutive,
                } => Event::LoanPaymentMissed {
                    at: now,
                    loan_id,
                    consecutive,
                },
                CollectionOutcome::Defaulted { loan_id } => Event::LoanDefaulted { at: now, loan_id },
            });
        }

        let review = self.compliance().daily_review(&self.store, now, rng)?;
        summary.errors += review.errors;

        let risk = self.risk().recompute_all(&self.store, now)?;
        summary.errors += risk.errors;
        Ok(())
    }

    /// Population and activity counters
    pub fn stats(&self) -> Result<SimulationStats, SimulationError> {
        let state = self.store.get_state()?;
        let accounts = self.store.list_accounts(&|_: &Account| true)?;
        let transactions = self.store.list_transactions(&|_: &Transaction| true)?;
        let loans = self.store.list_loans(&|_: &Loan| true)?;
        let portfolios = self.store.list_portfolios(&|_: &Portfolio| true)?;

        let mut stats = SimulationStats {
            running: self.is_running(),
            cycles_run: state.cycles_run,
            last_run_at: state.last_run_at,
            current_day: state.current_day,
            transactions_today: state.transactions_today,
            users: self.store.list_users(&|_: &User| true)?.len(),
            accounts: accounts.len(),
            frozen_accounts: accounts.iter().filter(|a| a.is_frozen()).count(),
            total_balance: accounts.iter().map(|a| a.balance()).sum(),
            transactions: transactions.len(),
            flagged: transactions.iter().filter(|t| t.is_flagged()).count(),
            active_loans: loans.iter().filter(|l| l.status == LoanStatus::Active).count(),
            defaulted_loans: loans.iter().filter(|l| l.status == LoanStatus::Defaulted).count(),
            portfolios: portfolios.len(),
            portfolio_value: portfolios.iter().map(|p| p.total_value).sum(),
            fraud_alerts: self.store.list_fraud_alerts(&|_: &FraudAlert| true)?.len(),
            market_crash_active: state.market_crash_active,
            fraud_event_active: state.fraud_event_active,
            fraud_event_account: state.fraud_event_account.clone(),
            events_logged: self.event_log().len(),
            ..SimulationStats::default()
        };
        for tx in &transactions {
            match tx.status() {
                TransactionStatus::Pending => stats.pending += 1,
                TransactionStatus::Posted { .. } => stats.posted += 1,
                TransactionStatus::Canceled { .. } => stats.canceled += 1,
            }
        }
        Ok(stats)
    }
}

impl Simulation<MemoryStore> {
    /// Capture the store tagged with this configuration's fingerprint
    pub fn checkpoint(&self) -> Result<StoreSnapshot, SimulationError> {
        let fingerprint = self.config.fingerprint();
        Ok(self.store.snapshot(&fingerprint)?)
    }

    /// Resume from a checkpoint taken under the same configuration
    pub fn restore(
        snapshot: StoreSnapshot,
        clock: Arc<dyn Clock>,
        config: SimulatorConfig,
    ) -> Result<Self, SimulationError> {
        snapshot.validate()?;
        let fingerprint = config.fingerprint();
        let store = MemoryStore::restore(snapshot, &fingerprint)?;
        Self::new(store, clock, config)
    }
}

fn pending_events(now: DateTime<Utc>, summary: &PendingSummary) -> Vec<Event> {
    summary
        .outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            PendingOutcome::Posted {
                tx_id,
                account_id,
                amount,
                adjusted,
            } => Some(Event::TransactionPosted {
                at: now,
                tx_id: tx_id.clone(),
                account_id: account_id.clone(),
                amount: *amount,
                adjusted: *adjusted,
            }),
            PendingOutcome::Canceled {
                tx_id,
                account_id,
                reason,
            } => Some(Event::TransactionCanceled {
                at: now,
                tx_id: tx_id.clone(),
                account_id: account_id.clone(),
                reason: reason.clone(),
            }),
            PendingOutcome::Failed { .. } => None,
        })
        .collect()
}
