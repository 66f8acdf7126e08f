//! Append-only audit records
//!
//! Risk events, fraud alerts and compliance log entries are written once and
//! never updated. Every record is keyed to a user and carries a severity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

// ============================================================================
// Risk
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskEventKind {
    /// Composite risk level moved to a higher band
    LevelChange { from: crate::models::RiskLevel, to: crate::models::RiskLevel, score: f64 },
    MissedPayment { loan_id: String, consecutive: u32 },
    LoanDefault { loan_id: String, remaining_amount: i64 },
    /// Portfolio hit by a market shock
    MarketShock { portfolio_id: String, loss: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub id: String,
    pub user_id: String,
    pub kind: RiskEventKind,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

impl RiskEvent {
    pub fn new(user_id: &str, kind: RiskEventKind, severity: Severity, at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            severity,
            created_at: at,
        }
    }
}

// ============================================================================
// Fraud
// ============================================================================

/// A fraud heuristic that fired for a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum FraudSignal {
    /// Large amount in the small hours
    LargeAtNight { amount: i64, hour: u32 },
    /// Many transactions in the trailing window
    Velocity { count: usize },
    /// Implausible travel speed between consecutive card locations
    GeoJump { from_city: String, to_city: String, distance_km: f64, speed_kmh: f64 },
    /// Amount far above the rolling average
    AmountSpike { ratio: f64 },
    /// Same amount and merchant moments ago
    Duplicate { previous_id: String },
    /// Burst of tiny debits (card testing)
    SmallAmountBurst { count: usize },
}

/// A fired heuristic and its contribution to the score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSignal {
    pub signal: FraudSignal,
    pub points: u8,
}

/// Recommended response to a fraud score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudAction {
    Allow,
    Flag,
    Block,
    Freeze,
}

impl FraudAction {
    pub fn severity(self) -> Severity {
        match self {
            FraudAction::Allow => Severity::Low,
            FraudAction::Flag => Severity::Medium,
            FraudAction::Block => Severity::High,
            FraudAction::Freeze => Severity::Critical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAlert {
    pub id: String,
    pub user_id: String,
    pub account_id: String,
    pub transaction_id: String,
    pub score: u8,
    pub action: FraudAction,
    pub severity: Severity,
    pub signals: Vec<ScoredSignal>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Compliance
// ============================================================================

/// Fixed-threshold AML rule that fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmlFlag {
    LargeTransaction,
    Structuring,
    DailyAggregate,
    HighFrequency,
}

impl AmlFlag {
    pub fn severity(self) -> Severity {
        match self {
            AmlFlag::LargeTransaction => Severity::Medium,
            AmlFlag::Structuring => Severity::High,
            AmlFlag::DailyAggregate => Severity::Medium,
            AmlFlag::HighFrequency => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "finding", rename_all = "snake_case")]
pub enum ComplianceFinding {
    KycVerified,
    KycPending,
    KycRejected,
    KycExpired,
    Aml { flag: AmlFlag, transaction_id: String },
    SanctionsClear,
    SanctionsHit { matched: String },
    /// Injected false positive, cleared on review
    SanctionsFalsePositive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceLog {
    pub id: String,
    pub user_id: String,
    pub finding: ComplianceFinding,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

impl ComplianceLog {
    pub fn new(user_id: &str, finding: ComplianceFinding, severity: Severity, at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            finding,
            severity,
            created_at: at,
        }
    }
}
