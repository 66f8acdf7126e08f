//! Simulator configuration
//!
//! Loaded from TOML with per-section defaults, then optionally overridden
//! from the environment. Every heuristic threshold used by the domain
//! engines lives here so a deployment can tune them without code changes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

/// Configuration error type
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("IO error: {0}")]
    Io(String),

    /// Parse error in config file
    #[error("Parse error: {0}")]
    Parse(String),

    /// Validation error
    #[error("Validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// Complete simulator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub simulation: SimulationConfig,
    pub lifecycle: LifecycleConfig,
    pub generation: GenerationConfig,
    pub fraud: FraudConfig,
    pub aml: AmlConfig,
    pub risk: RiskConfig,
    pub loans: LoanConfig,
    pub market: MarketConfig,
    pub compliance: ComplianceConfig,
    pub anomalies: AnomalyConfig,
    pub chaos: ChaosConfig,
}

/// Cycle scheduling and seeding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Key mixed into per-cycle seeds in deterministic mode
    pub seed_key: String,
    /// Derive cycle seeds from `seed_key` + date instead of wall-clock time
    pub deterministic: bool,
    /// Seconds between scheduled cycles
    pub interval_secs: u64,
    pub log_level: String,
    /// Users created by population seeding
    pub population: usize,
    /// Months of backfilled history per seeded account
    pub history_months: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed_key: "mockbank".to_string(),
            deterministic: true,
            interval_secs: 300,
            log_level: "info".to_string(),
            population: 20,
            history_months: 2,
        }
    }
}

impl SimulationConfig {
    /// Number of scheduled cycles in one day, at least 1
    pub fn cycles_per_day(&self) -> u64 {
        (86_400 / self.interval_secs.max(1)).max(1)
    }
}

/// Pending-transaction resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Minimum minutes a transaction stays pending
    pub min_pending_minutes: i64,
    /// Maximum minutes a transaction stays pending
    pub max_pending_minutes: i64,
    /// Probability a due pending transaction is canceled
    pub cancel_rate: f64,
    /// Probability a posted transaction settles at a different amount
    pub amount_change_rate: f64,
    /// Largest settlement amount change, in percent of the held amount
    pub max_amount_change_pct: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            min_pending_minutes: 30,
            max_pending_minutes: 24 * 60,
            cancel_rate: 0.03,
            amount_change_rate: 0.08,
            max_amount_change_pct: 15.0,
        }
    }
}

/// Activity multipliers by hour of day (UTC)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// 00:00-05:59
    pub night_multiplier: f64,
    /// 06:00-11:59
    pub morning_multiplier: f64,
    /// 12:00-17:59
    pub afternoon_multiplier: f64,
    /// 18:00-23:59
    pub evening_multiplier: f64,
    pub sporadic_weekday_probability: f64,
    pub sporadic_weekend_probability: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            night_multiplier: 0.2,
            morning_multiplier: 1.0,
            afternoon_multiplier: 1.4,
            evening_multiplier: 1.2,
            sporadic_weekday_probability: 0.15,
            sporadic_weekend_probability: 0.05,
        }
    }
}

impl GenerationConfig {
    /// Activity multiplier for an hour of the day
    pub fn hour_multiplier(&self, hour: u32) -> f64 {
        match hour {
            0..=5 => self.night_multiplier,
            6..=11 => self.morning_multiplier,
            12..=17 => self.afternoon_multiplier,
            _ => self.evening_multiplier,
        }
    }
}

/// Fraud scoring heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    pub large_amount: i64,
    /// Hours strictly before this count as night
    pub night_end_hour: u32,
    pub large_night_points: u8,

    pub velocity_window_minutes: i64,
    pub velocity_count: usize,
    pub velocity_points: u8,
    pub velocity_high_count: usize,
    pub velocity_high_points: u8,

    pub max_travel_speed_kmh: f64,
    pub geo_jump_points: u8,

    pub spike_lookback_days: i64,
    pub spike_min_history: usize,
    pub spike_ratio: f64,
    pub spike_points: u8,
    pub spike_high_ratio: f64,
    pub spike_high_points: u8,

    pub duplicate_window_minutes: i64,
    pub duplicate_points: u8,

    pub small_amount: i64,
    pub small_count: usize,
    pub small_points: u8,

    pub flag_threshold: u8,
    pub block_threshold: u8,
    pub freeze_threshold: u8,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            large_amount: 50_000,
            night_end_hour: 5,
            large_night_points: 25,
            velocity_window_minutes: 60,
            velocity_count: 5,
            velocity_points: 20,
            velocity_high_count: 10,
            velocity_high_points: 30,
            max_travel_speed_kmh: 900.0,
            geo_jump_points: 30,
            spike_lookback_days: 30,
            spike_min_history: 5,
            spike_ratio: 5.0,
            spike_points: 20,
            spike_high_ratio: 10.0,
            spike_high_points: 30,
            duplicate_window_minutes: 5,
            duplicate_points: 15,
            small_amount: 500,
            small_count: 3,
            small_points: 25,
            flag_threshold: 50,
            block_threshold: 70,
            freeze_threshold: 90,
        }
    }
}

/// Anti-money-laundering thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmlConfig {
    pub large_amount: i64,
    /// Lower bound of the just-below-threshold structuring band
    pub structuring_floor: i64,
    pub structuring_count: usize,
    pub daily_aggregate: i64,
    pub high_frequency_count: usize,
    pub window_hours: i64,
}

impl Default for AmlConfig {
    fn default() -> Self {
        Self {
            large_amount: 1_000_000,
            structuring_floor: 900_000,
            structuring_count: 3,
            daily_aggregate: 1_500_000,
            high_frequency_count: 20,
            window_hours: 24,
        }
    }
}

/// Composite risk weights, expected to sum to 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub stability: f64,
    pub income: f64,
    pub overdraft: f64,
    pub loans: f64,
    pub unusual_hour: f64,
    pub account_age: f64,
    pub diversity: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            stability: 0.20,
            income: 0.15,
            overdraft: 0.20,
            loans: 0.20,
            unusual_hour: 0.10,
            account_age: 0.05,
            diversity: 0.10,
        }
    }
}

impl RiskWeights {
    pub fn total(&self) -> f64 {
        self.stability
            + self.income
            + self.overdraft
            + self.loans
            + self.unusual_hour
            + self.account_age
            + self.diversity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub weights: RiskWeights,
    /// Sub-score used when there is no data to judge
    pub default_sub_score: f64,
    pub lookback_days: i64,
    /// Debits at or above this amount during night hours are unusual
    pub unusual_hour_amount: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            default_sub_score: 40.0,
            lookback_days: 90,
            unusual_hour_amount: 50_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanConfig {
    pub max_risk_score: f64,
    /// Existing debt divided by balance must not exceed this
    pub max_debt_ratio: f64,
    pub base_rate: f64,
    /// Added rate at risk score 100
    pub risk_premium: f64,
    pub auto_approve_below: f64,
    pub default_after_missed: u32,
    pub default_after_days: i64,
    pub min_amount: i64,
    pub max_amount: i64,
    pub min_term_months: u32,
    pub max_term_months: u32,
}

impl Default for LoanConfig {
    fn default() -> Self {
        Self {
            max_risk_score: 70.0,
            max_debt_ratio: 3.0,
            base_rate: 0.05,
            risk_premium: 0.15,
            auto_approve_below: 30.0,
            default_after_missed: 3,
            default_after_days: 90,
            min_amount: 10_000,
            max_amount: 5_000_000,
            min_term_months: 6,
            max_term_months: 60,
        }
    }
}

/// Shock multipliers per asset class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassMultipliers {
    pub crypto: f64,
    pub stock: f64,
    pub etf: f64,
    pub commodity: f64,
    pub bond: f64,
    pub savings: f64,
}

impl Default for ClassMultipliers {
    fn default() -> Self {
        Self {
            crypto: 1.5,
            stock: 1.0,
            etf: 0.9,
            commodity: 0.8,
            bond: 0.3,
            savings: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Share of the previous move carried into the next one
    pub momentum: f64,
    pub mild_drop: f64,
    pub moderate_drop: f64,
    pub severe_drop: f64,
    pub jitter_min: f64,
    pub jitter_max: f64,
    /// Recovery applied when a market shock ends
    pub recovery_pct: f64,
    pub multipliers: ClassMultipliers,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            momentum: 0.10,
            mild_drop: 0.10,
            moderate_drop: 0.20,
            severe_drop: 0.35,
            jitter_min: 0.8,
            jitter_max: 1.2,
            recovery_pct: 0.08,
            multipliers: ClassMultipliers::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    pub kyc_verified_probability: f64,
    pub kyc_pending_probability: f64,
    pub kyc_rejected_probability: f64,
    pub kyc_validity_days: i64,
    /// Case-insensitive substrings that hit the sanctions list
    pub sanctions_blocklist: Vec<String>,
    pub sanctions_false_positive_rate: f64,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            kyc_verified_probability: 0.85,
            kyc_pending_probability: 0.10,
            kyc_rejected_probability: 0.05,
            kyc_validity_days: 365,
            sanctions_blocklist: vec![
                "ivan drago".to_string(),
                "blofeld".to_string(),
                "le chiffre".to_string(),
                "shell holdings".to_string(),
            ],
            sanctions_false_positive_rate: 0.001,
        }
    }
}

/// Rare stochastic incidents injected by the cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub fraud_incident_probability: f64,
    pub market_shock_probability: f64,
    pub incident_end_probability: f64,
    /// Small debits in a card-testing burst
    pub card_test_count: u32,
    pub card_test_max_amount: i64,
    pub incident_large_amount: i64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            fraud_incident_probability: 0.002,
            market_shock_probability: 0.001,
            incident_end_probability: 0.2,
            card_test_count: 4,
            card_test_max_amount: 400,
            incident_large_amount: 250_000,
        }
    }
}

/// Request-level chaos policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosConfig {
    pub enabled: bool,
    pub latency_probability: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub failure_probability: f64,
    pub failure_statuses: Vec<u16>,
    pub corruption_probability: f64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            latency_probability: 0.05,
            min_latency_ms: 100,
            max_latency_ms: 2_000,
            failure_probability: 0.02,
            failure_statuses: vec![500, 502, 503],
            corruption_probability: 0.01,
        }
    }
}

impl SimulatorConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn with_env_override(mut self) -> Self {
        if let Ok(seed_key) = std::env::var("MOCKBANK_SEED_KEY") {
            self.simulation.seed_key = seed_key;
        }

        if let Ok(deterministic) = std::env::var("MOCKBANK_DETERMINISTIC") {
            self.simulation.deterministic = match deterministic.to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => self.simulation.deterministic,
            };
        }

        if let Ok(interval) = std::env::var("MOCKBANK_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse() {
                self.simulation.interval_secs = secs;
            }
        }

        if let Ok(log_level) = std::env::var("MOCKBANK_LOG_LEVEL") {
            self.simulation.log_level = log_level;
        }

        self
    }

    /// Validate the configuration, reporting every problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.simulation.log_level.to_lowercase().as_str()) {
            errors.push(format!(
                "Invalid log_level '{}'. Valid values: {:?}",
                self.simulation.log_level, valid_log_levels
            ));
        }
        if self.simulation.interval_secs == 0 {
            errors.push("simulation.interval_secs must be greater than 0".to_string());
        }
        if self.simulation.seed_key.is_empty() {
            errors.push("simulation.seed_key cannot be empty".to_string());
        }

        let probabilities = [
            ("lifecycle.cancel_rate", self.lifecycle.cancel_rate),
            ("lifecycle.amount_change_rate", self.lifecycle.amount_change_rate),
            (
                "generation.sporadic_weekday_probability",
                self.generation.sporadic_weekday_probability,
            ),
            (
                "generation.sporadic_weekend_probability",
                self.generation.sporadic_weekend_probability,
            ),
            (
                "compliance.kyc_verified_probability",
                self.compliance.kyc_verified_probability,
            ),
            (
                "compliance.kyc_pending_probability",
                self.compliance.kyc_pending_probability,
            ),
            (
                "compliance.kyc_rejected_probability",
                self.compliance.kyc_rejected_probability,
            ),
            (
                "compliance.sanctions_false_positive_rate",
                self.compliance.sanctions_false_positive_rate,
            ),
            (
                "anomalies.fraud_incident_probability",
                self.anomalies.fraud_incident_probability,
            ),
            (
                "anomalies.market_shock_probability",
                self.anomalies.market_shock_probability,
            ),
            (
                "anomalies.incident_end_probability",
                self.anomalies.incident_end_probability,
            ),
            ("chaos.latency_probability", self.chaos.latency_probability),
            ("chaos.failure_probability", self.chaos.failure_probability),
            ("chaos.corruption_probability", self.chaos.corruption_probability),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                errors.push(format!("{} must be within [0, 1], got {}", name, p));
            }
        }

        if self.lifecycle.min_pending_minutes <= 0 {
            errors.push("lifecycle.min_pending_minutes must be greater than 0".to_string());
        }
        if self.lifecycle.max_pending_minutes < self.lifecycle.min_pending_minutes {
            errors.push(
                "lifecycle.max_pending_minutes must not be below min_pending_minutes".to_string(),
            );
        }
        if !(0.0..100.0).contains(&self.lifecycle.max_amount_change_pct) {
            errors.push("lifecycle.max_amount_change_pct must be within [0, 100)".to_string());
        }

        let kyc_total = self.compliance.kyc_verified_probability
            + self.compliance.kyc_pending_probability
            + self.compliance.kyc_rejected_probability;
        if kyc_total <= 0.0 {
            errors.push("compliance KYC outcome weights cannot all be zero".to_string());
        }
        if self.compliance.kyc_validity_days <= 0 {
            errors.push("compliance.kyc_validity_days must be greater than 0".to_string());
        }

        if (self.risk.weights.total() - 1.0).abs() > 1e-6 {
            errors.push(format!(
                "risk.weights must sum to 1.0, got {:.4}",
                self.risk.weights.total()
            ));
        }

        let fraud = &self.fraud;
        if !(fraud.flag_threshold <= fraud.block_threshold
            && fraud.block_threshold <= fraud.freeze_threshold
            && fraud.freeze_threshold <= 100)
        {
            errors.push(
                "fraud thresholds must satisfy flag <= block <= freeze <= 100".to_string(),
            );
        }
        if fraud.velocity_window_minutes <= 0 || fraud.duplicate_window_minutes <= 0 {
            errors.push("fraud windows must be greater than 0".to_string());
        }

        if self.aml.structuring_floor >= self.aml.large_amount {
            errors.push("aml.structuring_floor must be below aml.large_amount".to_string());
        }
        if self.aml.window_hours <= 0 {
            errors.push("aml.window_hours must be greater than 0".to_string());
        }

        if self.loans.min_amount <= 0 || self.loans.max_amount < self.loans.min_amount {
            errors.push("loans amount bounds are inconsistent".to_string());
        }
        if self.loans.min_term_months == 0 || self.loans.max_term_months < self.loans.min_term_months
        {
            errors.push("loans term bounds are inconsistent".to_string());
        }
        if self.loans.default_after_missed == 0 || self.loans.default_after_days <= 0 {
            errors.push("loans default triggers must be greater than 0".to_string());
        }

        if self.market.jitter_min <= 0.0 || self.market.jitter_max < self.market.jitter_min {
            errors.push("market jitter range is inconsistent".to_string());
        }

        if self.chaos.max_latency_ms < self.chaos.min_latency_ms {
            errors.push("chaos.max_latency_ms must not be below min_latency_ms".to_string());
        }
        if self.chaos.enabled && self.chaos.failure_statuses.is_empty() {
            errors.push("chaos.failure_statuses cannot be empty when chaos is enabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load from file with environment overrides and validate
    pub fn load_with_env_and_validate(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?.with_env_override();
        config.validate()?;
        Ok(config)
    }

    /// SHA-256 hex digest of the configuration
    ///
    /// Uses canonical JSON serialization with sorted keys so the digest
    /// does not depend on field order.
    pub fn fingerprint(&self) -> String {
        use serde_json::Value;
        use std::collections::BTreeMap;

        fn canonicalize(value: Value) -> Value {
            match value {
                Value::Object(map) => {
                    let sorted: BTreeMap<String, Value> =
                        map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                    Value::Object(sorted.into_iter().collect())
                }
                Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
                other => other,
            }
        }

        // Plain structs of numbers, strings and vectors always serialize
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        let json = canonicalize(value).to_string();

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimulatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.cycles_per_day(), 288);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SimulatorConfig::from_toml_str(
            r#"
            [simulation]
            seed_key = "demo"
            interval_secs = 60

            [fraud]
            flag_threshold = 40
            "#,
        )
        .unwrap();

        assert_eq!(config.simulation.seed_key, "demo");
        assert_eq!(config.simulation.cycles_per_day(), 1440);
        assert_eq!(config.fraud.flag_threshold, 40);
        assert_eq!(config.fraud.block_threshold, 70);
        assert_eq!(config.loans.default_after_missed, 3);
    }

    #[test]
    fn test_parse_error() {
        let err = SimulatorConfig::from_toml_str("[simulation\nseed_key = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = SimulatorConfig::default();
        config.lifecycle.cancel_rate = 1.5;
        config.simulation.interval_secs = 0;
        config.risk.weights.loans = 0.5;

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 3);
                assert!(errors.iter().any(|e| e.contains("cancel_rate")));
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = SimulatorConfig::default();
        let mut b = SimulatorConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        b.fraud.freeze_threshold = 95;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
