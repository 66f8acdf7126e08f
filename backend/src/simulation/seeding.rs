//! Synthetic population
//!
//! Creates users with personas, runs their KYC and sanctions checks, opens
//! an account with an opening deposit, backfills posted history through the
//! generator, and opens portfolios and loans for some of them.

use super::engine::Simulation;
use crate::engines::{InvestmentError, LoanApplication};
use crate::error::SimulationError;
use crate::generator::generate_history_with;
use crate::lifecycle::NewTransaction;
use crate::models::{Account, AccountKind, Category, LoanStatus, TransactionMetadata, User};
use crate::rng::{Seed, SeededRng};
use crate::store::BankStore;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

const FIRST_NAMES: [&str; 16] = [
    "Ada", "Bruno", "Chen", "Dana", "Emeka", "Farah", "Gus", "Hana", "Ivo", "Jun", "Kira", "Luis",
    "Mara", "Noor", "Otto", "Priya",
];

const LAST_NAMES: [&str; 12] = [
    "Abara", "Berg", "Costa", "Dubois", "Eriksen", "Fujita", "Garcia", "Haddad", "Ivanova",
    "Jensen", "Kowalski", "Lindqvist",
];

/// Probability that a seeded user applies for a loan
const LOAN_APPLICATION_PROBABILITY: f64 = 0.25;

/// Counts of what seeding created
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeedReport {
    pub users: usize,
    pub accounts: usize,
    pub transactions: usize,
    pub portfolios: usize,
    pub loans_applied: usize,
    pub loans_active: usize,
    pub assets: usize,
    /// Per-user steps that failed and were skipped
    pub errors: usize,
}

impl<S: BankStore> Simulation<S> {
    /// Seed `count` users with `months_of_history` months of posted activity
    ///
    /// History ends the day before the clock's current day, so the first
    /// live cycle starts from a settled ledger.
    pub fn seed_population(
        &self,
        count: usize,
        months_of_history: u32,
    ) -> Result<SeedReport, SimulationError> {
        let now = self.now();
        let seed_key = &self.config().simulation.seed_key;
        let mut rng = if self.config().simulation.deterministic {
            SeededRng::from_seed(format!("{}:population", seed_key))
        } else {
            SeededRng::new(Utc::now().timestamp_millis() as u32)
        };

        let mut report = SeedReport {
            assets: self.investment().seed_assets(self.store(), now)?,
            ..SeedReport::default()
        };

        let start = now - Duration::days(30 * months_of_history as i64);
        let mut seeded = Vec::new();
        for index in 0..count {
            let account_id = self.seed_user(index, start, now, &mut rng, &mut report)?;
            seeded.push(account_id);
        }

        self.risk().recompute_all(self.store(), now)?;
        for account_id in seeded {
            if !rng.next_bool(LOAN_APPLICATION_PROBABILITY) {
                continue;
            }
            let account = self.store().get_account(&account_id)?;
            let application = LoanApplication {
                user_id: account.user_id().to_string(),
                account_id,
                amount: rng.next_int(5, 50) * 10_000,
                term_months: *rng.pick(&[12, 24, 36]).unwrap_or(&24),
                purpose: "personal".to_string(),
            };
            match self.loans().apply(self.store(), now, application) {
                Ok(loan) => {
                    report.loans_applied += 1;
                    if loan.status == LoanStatus::Active {
                        report.loans_active += 1;
                    }
                }
                Err(err) if err.is_domain_failure() => {
                    warn!(code = err.code(), "seed loan application refused");
                }
                Err(err) => {
                    warn!(error = %err, "seed loan application failed");
                    report.errors += 1;
                }
            }
        }

        info!(
            users = report.users,
            transactions = report.transactions,
            portfolios = report.portfolios,
            loans = report.loans_active,
            "population seeded"
        );
        Ok(report)
    }

    fn seed_user(
        &self,
        index: usize,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
        rng: &mut SeededRng,
        report: &mut SeedReport,
    ) -> Result<String, SimulationError> {
        let persona = self
            .personas()
            .pick(rng)
            .cloned()
            .ok_or_else(|| SimulationError::Seeding("persona catalog is empty".to_string()))?;
        let first = rng.pick(&FIRST_NAMES).copied().unwrap_or("Alex");
        let last = rng.pick(&LAST_NAMES).copied().unwrap_or("Doe");
        let name = format!("{} {}", first, last);
        let email = format!(
            "{}.{}{}@mockbank.test",
            first.to_lowercase(),
            last.to_lowercase(),
            index
        );

        let compliance = self.compliance();
        let mut user = User::new(&name, &email, persona.name, start);
        let kyc = compliance.draw_kyc(rng);
        let kyc_log = compliance.apply_kyc(&mut user, kyc, start);
        let user_id = user.id.clone();
        self.store().insert_user(user)?;
        self.store().append_compliance_log(kyc_log)?;
        compliance.screen_sanctions(self.store(), start, &user_id, rng)?;
        report.users += 1;

        let account = Account::new(user_id.clone(), AccountKind::Checking, persona.name, start)
            .with_overdraft(persona.overdraft_limit);
        let account_id = account.id().to_string();
        self.store().insert_account(account)?;
        report.accounts += 1;

        let lifecycle = self.lifecycle();
        let opening = NewTransaction::credit(
            &account_id,
            persona.opening_balance,
            TransactionMetadata::new(Category::Deposit).with_description("opening deposit"),
        )
        .skip_validation();
        lifecycle.post_immediately(start, opening)?;
        report.transactions += 1;

        let first_day = start.date_naive();
        let last_day = now.date_naive() - Duration::days(1);
        if last_day >= first_day {
            // Random runs draw from the per-run stream so histories differ between runs
            let history_seed = if self.config().simulation.deterministic {
                Seed::Text(format!("{}:history:{}", self.config().simulation.seed_key, index))
            } else {
                Seed::from(rng.next_u32())
            };
            let drafts = generate_history_with(
                &self.config().generation,
                &persona,
                first_day.succ_opt().unwrap_or(first_day),
                last_day,
                persona.opening_balance,
                history_seed,
            );
            for draft in drafts {
                let request = NewTransaction::new(
                    &account_id,
                    draft.direction,
                    draft.amount,
                    draft.metadata,
                )
                .skip_validation();
                match lifecycle.post_immediately(draft.at, request) {
                    Ok(_) => report.transactions += 1,
                    Err(err) => {
                        warn!(account_id = %account_id, error = %err, "history transaction skipped");
                        report.errors += 1;
                    }
                }
            }
        }

        if let Some(kind) = persona.portfolio {
            let account = self.store().get_account(&account_id)?;
            let amount = account.balance() / 4;
            if amount > 0 {
                match self
                    .investment()
                    .create_portfolio(self.store(), now, &account_id, kind, amount)
                {
                    Ok(_) => report.portfolios += 1,
                    Err(InvestmentError::InsufficientFunds { .. }) => {}
                    Err(err) => {
                        warn!(account_id = %account_id, error = %err, "seed portfolio failed");
                        report.errors += 1;
                    }
                }
            }
        }

        Ok(account_id)
    }
}
