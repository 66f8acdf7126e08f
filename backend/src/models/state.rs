//! Simulation bookkeeping singleton
//!
//! Persisted once per cycle. Holds the counters that must survive a restart
//! of the process driving the simulation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub last_run_at: Option<DateTime<Utc>>,
    /// Calendar day of the last processed cycle; a different day triggers rollover
    pub current_day: Option<NaiveDate>,
    /// Transactions generated since the start of `current_day`
    pub transactions_today: u64,
    /// Cycles run since the start of `current_day`
    pub cycles_today: u64,
    pub cycles_run: u64,
    pub market_crash_active: bool,
    pub fraud_event_active: bool,
    /// Account targeted by the active fraud incident
    pub fraud_event_account: Option<String>,
}
