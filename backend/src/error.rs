//! Top-level error type of the simulation core

use crate::config::ConfigError;
use crate::lifecycle::LifecycleError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors escaping the orchestrator
///
/// Domain-rule failures of individual operations have their own types
/// (`LifecycleError`, `LoanError`, ...). Only failures that abort a whole
/// cycle or a whole facade call surface here.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A lifecycle operation inside a batch step failed outright
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Seeding error: {0}")]
    Seeding(String),

    /// A cycle is already running on this simulation
    #[error("a simulation cycle is already in progress")]
    CycleInProgress,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Snapshot rejected: {0}")]
    Snapshot(String),
}
