//! Synthetic transaction generation
//!
//! Two entry points share the same persona model:
//!
//! - [`generate_history`] backfills a date range for a new account. It is a
//!   pure function of (persona, range, starting balance, seed).
//! - [`generate_live`] produces the activity of a single simulation cycle
//!   "as of now", scaled by hour of day and weekend.
//!
//! Both return [`GeneratedTransaction`] drafts without identifiers so the
//! output is byte-identical for a given seed; the lifecycle manager turns
//! drafts into stored transactions.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use mockbank_core::generator::generate_history;
//! use mockbank_core::persona::PersonaCatalog;
//!
//! let catalog = PersonaCatalog::builtin();
//! let persona = catalog.get("student").unwrap();
//! let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
//!
//! let a = generate_history(persona, start, end, 50_000, "seed-1");
//! let b = generate_history(persona, start, end, 50_000, "seed-1");
//! assert_eq!(a, b);
//! ```

use crate::config::{GenerationConfig, SimulatorConfig};
use crate::core::time::last_day_of_month;
use crate::models::{Account, Category, Direction, TransactionMetadata};
use crate::persona::{merchants, travel_destinations, IncomePattern, Persona};
use crate::rng::{Seed, SeededRng};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use serde::Serialize;

/// Hour-of-day weights for backfilled expenses
const HOUR_WEIGHTS: [(u32, f64); 16] = [
    (7, 0.03),
    (8, 0.06),
    (9, 0.06),
    (10, 0.06),
    (11, 0.08),
    (12, 0.11),
    (13, 0.09),
    (14, 0.06),
    (15, 0.06),
    (16, 0.06),
    (17, 0.08),
    (18, 0.10),
    (19, 0.07),
    (20, 0.05),
    (21, 0.02),
    (22, 0.01),
];

/// Hour at which income is paid
const PAYROLL_HOUR: u32 = 9;

/// A transaction to be created, without identity or lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedTransaction {
    pub direction: Direction,
    pub amount: i64,
    pub at: DateTime<Utc>,
    pub metadata: TransactionMetadata,
}

impl GeneratedTransaction {
    pub fn signed_amount(&self) -> i64 {
        self.direction.sign() * self.amount
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Whether `date` is a payday for a deterministic pattern
///
/// Sporadic income has no fixed calendar and always returns false here.
pub fn is_fixed_payday(pattern: IncomePattern, date: NaiveDate) -> bool {
    match pattern {
        IncomePattern::Monthly => date == last_day_of_month(date),
        IncomePattern::Biweekly => date.day() == 15 || date == last_day_of_month(date),
        IncomePattern::Weekly => date.weekday() == Weekday::Fri,
        IncomePattern::Sporadic => false,
    }
}

fn sporadic_probability(config: &GenerationConfig, date: NaiveDate) -> f64 {
    if is_weekend(date) {
        config.sporadic_weekend_probability
    } else {
        config.sporadic_weekday_probability
    }
}

fn at_time(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    date.and_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN))
        .and_utc()
}

fn income(persona: &Persona, amount: i64, at: DateTime<Utc>) -> GeneratedTransaction {
    GeneratedTransaction {
        direction: Direction::Credit,
        amount: amount.max(1),
        at,
        metadata: TransactionMetadata::new(Category::Salary)
            .with_merchant("Payroll")
            .with_description(format!("{} income", persona.name)),
    }
}

fn income_amount(persona: &Persona, rng: &mut SeededRng) -> i64 {
    match persona.income_pattern {
        IncomePattern::Sporadic => rng
            .next_with_variance(persona.income_amount as f64, 0.5)
            .round() as i64,
        _ => persona.income_amount,
    }
}

/// Draw one expense at `at`, or None if the persona has no categories
fn expense(persona: &Persona, at: DateTime<Utc>, rng: &mut SeededRng) -> Option<GeneratedTransaction> {
    let category = *rng.pick_weighted(&persona.category_weights)?;
    let amount = rng
        .next_with_variance(persona.avg_expense as f64, persona.expense_variance)
        .round() as i64;

    let mut metadata = TransactionMetadata::new(category);
    if let Some(merchant) = rng.pick(merchants(category)) {
        metadata = metadata.with_merchant(*merchant);
    }
    let location = if category == Category::Travel {
        rng.pick(&travel_destinations())
            .cloned()
            .unwrap_or_else(|| persona.home.clone())
    } else {
        persona.home.clone()
    };

    Some(GeneratedTransaction {
        direction: Direction::Debit,
        amount: amount.max(1),
        at,
        metadata: metadata.with_location(location),
    })
}

/// Backfill a persona's activity over `[start, end]` (inclusive)
///
/// Uses the default generation config for sporadic-income probabilities.
pub fn generate_history(
    persona: &Persona,
    start: NaiveDate,
    end: NaiveDate,
    starting_balance: i64,
    seed: impl Into<Seed>,
) -> Vec<GeneratedTransaction> {
    generate_history_with(
        &GenerationConfig::default(),
        persona,
        start,
        end,
        starting_balance,
        seed,
    )
}

/// [`generate_history`] with explicit generation settings
pub fn generate_history_with(
    config: &GenerationConfig,
    persona: &Persona,
    start: NaiveDate,
    end: NaiveDate,
    starting_balance: i64,
    seed: impl Into<Seed>,
) -> Vec<GeneratedTransaction> {
    let mut rng = SeededRng::from_seed(seed);
    let mut balance = starting_balance;
    let mut out = Vec::new();

    let mut day = start;
    while day <= end {
        let mut drafts = Vec::new();

        let payday = match persona.income_pattern {
            IncomePattern::Sporadic => rng.next_bool(sporadic_probability(config, day)),
            pattern => is_fixed_payday(pattern, day),
        };
        if payday {
            let amount = income_amount(persona, &mut rng);
            let minute = rng.next_int(0, 59) as u32;
            drafts.push(income(persona, amount, at_time(day, PAYROLL_HOUR, minute)));
        }

        let mut mean = persona.weekly_midpoint() / 7.0;
        if is_weekend(day) {
            mean *= persona.weekend_multiplier;
        }
        let count = (mean.round() as i64 + rng.next_int(-1, 1)).max(0);

        for _ in 0..count {
            let hour = rng.pick_weighted(&HOUR_WEIGHTS).copied().unwrap_or(12);
            let minute = rng.next_int(0, 59) as u32;
            if let Some(draft) = expense(persona, at_time(day, hour, minute), &mut rng) {
                drafts.push(draft);
            }
        }

        // Stable sort keeps draw order for equal timestamps
        drafts.sort_by_key(|d| d.at);

        for draft in drafts {
            if draft.direction == Direction::Debit
                && balance - draft.amount < -persona.overdraft_limit
            {
                continue;
            }
            balance += draft.signed_amount();
            out.push(draft);
        }

        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    out
}

/// Expected expense count for one cycle at `now`
pub fn expected_live_count(persona: &Persona, now: DateTime<Utc>, config: &SimulatorConfig) -> f64 {
    let cycles_per_day = config.simulation.cycles_per_day() as f64;
    let mut expected = persona.weekly_midpoint() / 7.0 / cycles_per_day
        * config.generation.hour_multiplier(now.hour());
    if is_weekend(now.date_naive()) {
        expected *= persona.weekend_multiplier;
    }
    expected
}

/// Activity for one account in the current cycle
///
/// Emits an income credit at most once per payday (tracked through
/// `account.last_income_on`) once payroll hour has passed, then the cycle's
/// share of expenses: the integer part of the expected count plus one more
/// with probability equal to its fraction.
pub fn generate_live(
    persona: &Persona,
    account: &Account,
    now: DateTime<Utc>,
    rng: &mut SeededRng,
    config: &SimulatorConfig,
) -> Vec<GeneratedTransaction> {
    let mut out = Vec::new();
    let today = now.date_naive();

    if now.hour() >= PAYROLL_HOUR && account.last_income_on() != Some(today) {
        let payday = match persona.income_pattern {
            IncomePattern::Sporadic => {
                let p = sporadic_probability(&config.generation, today)
                    / config.simulation.cycles_per_day() as f64;
                rng.next_bool(p)
            }
            pattern => is_fixed_payday(pattern, today),
        };
        if payday {
            let amount = income_amount(persona, rng);
            out.push(income(persona, amount, now));
        }
    }

    let expected = expected_live_count(persona, now, config);
    let whole = expected.floor();
    let mut count = whole as u64;
    if rng.next_bool(expected - whole) {
        count += 1;
    }

    for _ in 0..count {
        if let Some(draft) = expense(persona, now, rng) {
            out.push(draft);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountKind;
    use crate::persona::PersonaCatalog;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_fixed_paydays() {
        assert!(is_fixed_payday(IncomePattern::Monthly, date(2024, 2, 29)));
        assert!(!is_fixed_payday(IncomePattern::Monthly, date(2024, 2, 28)));
        assert!(is_fixed_payday(IncomePattern::Biweekly, date(2024, 4, 15)));
        assert!(is_fixed_payday(IncomePattern::Biweekly, date(2024, 4, 30)));
        assert!(!is_fixed_payday(IncomePattern::Biweekly, date(2024, 4, 16)));
        // 2024-03-01 is a Friday
        assert!(is_fixed_payday(IncomePattern::Weekly, date(2024, 3, 1)));
        assert!(!is_fixed_payday(IncomePattern::Weekly, date(2024, 3, 2)));
    }

    #[test]
    fn test_live_count_scales_with_hour() {
        let catalog = PersonaCatalog::builtin();
        let persona = catalog.get("family").unwrap();
        let config = SimulatorConfig::default();
        let night = at_time(date(2024, 3, 5), 3, 0);
        let noon = at_time(date(2024, 3, 5), 13, 0);
        assert!(
            expected_live_count(persona, night, &config)
                < expected_live_count(persona, noon, &config)
        );
    }

    #[test]
    fn test_live_income_only_once_per_payday() {
        let catalog = PersonaCatalog::builtin();
        let persona = catalog.get("family").unwrap();
        let config = SimulatorConfig::default();
        let now = at_time(date(2024, 3, 31), 10, 0);
        let mut account = Account::new("u".to_string(), AccountKind::Checking, "family", now);
        let mut rng = SeededRng::new(3);

        let first = generate_live(persona, &account, now, &mut rng, &config);
        assert_eq!(
            first.iter().filter(|t| t.direction == Direction::Credit).count(),
            1
        );

        account.mark_income(now.date_naive());
        let second = generate_live(persona, &account, now, &mut rng, &config);
        assert!(second.iter().all(|t| t.direction == Direction::Debit));
    }
}
