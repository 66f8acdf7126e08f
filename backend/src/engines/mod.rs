//! Domain engines
//!
//! Stateless-per-call evaluators that read persisted entities through a
//! [`BankStore`](crate::store::BankStore), apply configured heuristics and
//! append audit records. Each engine borrows its configuration section.

pub mod compliance;
pub mod fraud;
pub mod investment;
pub mod loans;
pub mod risk;

pub use compliance::{AmlScreening, ComplianceEngine, DailyReview, SanctionsResult};
pub use fraud::{FraudAssessment, FraudEngine, FraudReview};
pub use investment::{
    default_assets, target_weights, CrashSeverity, InvestmentEngine, InvestmentError, MarketUpdate,
};
pub use loans::{
    monthly_interest, monthly_payment, CollectionOutcome, CollectionSummary, IneligibleReason,
    LoanApplication, LoanEngine, LoanError,
};
pub use risk::{RiskAssessment, RiskEngine, RiskRecompute, RiskSubScores};
