//! Domain models for the bank simulator

pub mod account;
pub mod audit;
pub mod event;
pub mod loan;
pub mod market;
pub mod state;
pub mod transaction;
pub mod user;

// Re-exports
pub use account::{Account, AccountKind};
pub use audit::{
    AmlFlag, ComplianceFinding, ComplianceLog, FraudAction, FraudAlert, FraudSignal, RiskEvent,
    RiskEventKind, ScoredSignal, Severity,
};
pub use event::{Event, EventLog};
pub use loan::{Loan, LoanStatus, LoanTransitionError};
pub use market::{AssetClass, Holding, MarketAsset, Portfolio, PortfolioType};
pub use state::SimulationState;
pub use transaction::{
    Category, Direction, GeoLocation, Transaction, TransactionError, TransactionMetadata,
    TransactionStatus,
};
pub use user::{AmlStatus, KycStatus, RiskLevel, User};
