//! Simulation orchestration
//!
//! - **engine**: the [`Simulation`] context and its recurring cycle
//! - **seeding**: synthetic population with backfilled history
//! - **scheduler**: repeating timer that drives cycles

pub mod engine;
pub mod scheduler;
pub mod seeding;

pub use engine::{CycleSummary, Simulation, SimulationStats};
pub use scheduler::{
    IntervalTicker, ManualTicker, Scheduler, SchedulerOptions, SchedulerReport, StopHandle,
    TickHandle, Ticker,
};
pub use seeding::SeedReport;
