//! Account holder model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Know-your-customer verification state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    Unverified,
    Pending,
    Verified,
    Rejected,
    Expired,
}

/// Anti-money-laundering standing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmlStatus {
    Clear,
    UnderReview,
    Flagged,
}

/// Ordinal risk classification derived from the composite risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Map a 0-100 score onto the fixed bands
    ///
    /// # Example
    /// ```
    /// use mockbank_core::models::RiskLevel;
    ///
    /// assert_eq!(RiskLevel::from_score(24.9), RiskLevel::Low);
    /// assert_eq!(RiskLevel::from_score(25.0), RiskLevel::Medium);
    /// assert_eq!(RiskLevel::from_score(74.9), RiskLevel::High);
    /// assert_eq!(RiskLevel::from_score(75.0), RiskLevel::Critical);
    /// ```
    pub fn from_score(score: f64) -> Self {
        if score < 25.0 {
            RiskLevel::Low
        } else if score < 50.0 {
            RiskLevel::Medium
        } else if score < 75.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// A simulated customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Persona name from the catalog
    pub persona: String,
    pub kyc_status: KycStatus,
    pub kyc_verified_at: Option<DateTime<Utc>>,
    pub kyc_expires_at: Option<DateTime<Utc>>,
    pub aml_status: AmlStatus,
    /// Set when sanction screening produced a hit
    pub sanctioned: bool,
    /// Composite risk score, 0-100
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: &str, email: &str, persona: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            persona: persona.to_string(),
            kyc_status: KycStatus::Unverified,
            kyc_verified_at: None,
            kyc_expires_at: None,
            aml_status: AmlStatus::Clear,
            sanctioned: false,
            risk_score: 0.0,
            risk_level: RiskLevel::Low,
            created_at,
        }
    }
}
