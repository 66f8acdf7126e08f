//! Chaos injection for responses served on top of the simulation
//!
//! Independent of the cycle: a caller serving simulation data asks the
//! injector what to do with each response and gets latency, a synthetic
//! failure status, or a corrupted payload with the configured probabilities.

use crate::config::ChaosConfig;
use crate::rng::SeededRng;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// What to do with one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChaosAction {
    PassThrough,
    Delay(Duration),
    Fail { status: u16 },
    Corrupt,
}

/// Response after chaos was applied
#[derive(Debug, Clone, PartialEq)]
pub enum ChaosResponse {
    Ok(Value),
    Failed { status: u16, body: Value },
}

#[derive(Debug, Clone)]
pub struct ChaosInjector {
    config: ChaosConfig,
}

impl ChaosInjector {
    pub fn new(config: ChaosConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Roll the action for one response
    ///
    /// Failure is checked first, then latency, then corruption. A disabled
    /// injector always passes through without drawing.
    pub fn decide(&self, rng: &mut SeededRng) -> ChaosAction {
        if !self.config.enabled {
            return ChaosAction::PassThrough;
        }
        if rng.next_bool(self.config.failure_probability) {
            let status = rng
                .pick(&self.config.failure_statuses)
                .copied()
                .unwrap_or(500);
            return ChaosAction::Fail { status };
        }
        if rng.next_bool(self.config.latency_probability) {
            let min = self.config.min_latency_ms;
            let max = self.config.max_latency_ms.max(min);
            let ms = rng.next_int(min as i64, max as i64) as u64;
            return ChaosAction::Delay(Duration::from_millis(ms));
        }
        if rng.next_bool(self.config.corruption_probability) {
            return ChaosAction::Corrupt;
        }
        ChaosAction::PassThrough
    }

    /// Run `produce` under a freshly decided action
    ///
    /// A failure short-circuits without running the producer.
    pub async fn intercept<F, Fut>(&self, rng: &mut SeededRng, produce: F) -> ChaosResponse
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Value>,
    {
        match self.decide(rng) {
            ChaosAction::PassThrough => ChaosResponse::Ok(produce().await),
            ChaosAction::Delay(delay) => {
                debug!(delay_ms = delay.as_millis() as u64, "chaos latency");
                tokio::time::sleep(delay).await;
                ChaosResponse::Ok(produce().await)
            }
            ChaosAction::Fail { status } => {
                debug!(status, "chaos failure");
                ChaosResponse::Failed {
                    status,
                    body: serde_json::json!({
                        "error": "injected failure",
                        "status": status,
                    }),
                }
            }
            ChaosAction::Corrupt => {
                let mut value = produce().await;
                corrupt(&mut value, rng);
                debug!("chaos corruption");
                ChaosResponse::Ok(value)
            }
        }
    }
}

/// Null one randomly chosen field, descending into arrays
pub fn corrupt(value: &mut Value, rng: &mut SeededRng) {
    match value {
        Value::Object(map) => {
            let keys: Vec<String> = map.keys().cloned().collect();
            if let Some(key) = rng.pick(&keys) {
                map.insert(key.clone(), Value::Null);
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                return;
            }
            let index = rng.next_int(0, items.len() as i64 - 1) as usize;
            if let Some(item) = items.get_mut(index) {
                corrupt(item, rng);
            }
        }
        other => *other = Value::Null,
    }
}
