//! MockBank Simulation Core
//!
//! Deterministic simulator of a fictional retail bank: synthetic customers,
//! a transaction authorization lifecycle, and a recurring cycle that drives
//! fraud, risk, loan, investment and compliance engines.
//!
//! # Architecture
//!
//! - **core**: Clock abstraction and calendar helpers
//! - **rng**: Deterministic random number generation
//! - **models**: Domain types (User, Account, Transaction, Loan, ...)
//! - **store**: Persistence seam and the in-memory store
//! - **persona**: Behavioral archetypes
//! - **generator**: Synthetic transaction generation
//! - **lifecycle**: Hold / post / cancel state machine
//! - **engines**: Fraud, risk, loans, investment, compliance
//! - **simulation**: Cycle orchestrator, seeding, scheduler
//! - **chaos**: Response fault injection
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 (cents)
//! 2. All randomness is deterministic (seeded RNG)
//! 3. `balance == sum(signed amounts of posted and pending transactions)`

pub mod chaos;
pub mod config;
pub mod core;
pub mod engines;
pub mod error;
pub mod generator;
pub mod lifecycle;
pub mod models;
pub mod persona;
pub mod rng;
pub mod simulation;
pub mod store;

pub use chaos::{ChaosAction, ChaosInjector, ChaosResponse};
pub use config::{ConfigError, SimulatorConfig};
pub use core::time::{Clock, ManualClock, SystemClock};
pub use error::SimulationError;
pub use lifecycle::{LifecycleError, NewTransaction, TransactionLifecycle};
pub use models::{
    Account, AccountKind, Event, EventLog, Loan, LoanStatus, SimulationState, Transaction,
    TransactionStatus, User,
};
pub use persona::{Persona, PersonaCatalog};
pub use rng::SeededRng;
pub use simulation::{CycleSummary, Scheduler, Simulation, SimulationStats};
pub use store::{BankStore, MemoryStore, StoreError, StoreSnapshot};
