//! Market assets and investment portfolios
//!
//! Prices are i64 cents per unit; holding quantities are fractional units.
//! Portfolios are created on purchase, revalued every cycle and never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Stock,
    Etf,
    Bond,
    Crypto,
    Commodity,
    Savings,
}

/// A tradable instrument with a simulated price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAsset {
    pub symbol: String,
    pub name: String,
    pub class: AssetClass,
    /// Price per unit (i64 cents), never below 1
    pub price: i64,
    /// Typical absolute daily move, e.g. 0.02 = 2%
    pub volatility: f64,
    /// Fractional move applied by the last price update
    pub last_change_pct: f64,
    pub updated_at: DateTime<Utc>,
}

impl MarketAsset {
    pub fn new(
        symbol: &str,
        name: &str,
        class: AssetClass,
        price: i64,
        volatility: f64,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            class,
            price: price.max(1),
            volatility,
            last_change_pct: 0.0,
            updated_at,
        }
    }

    /// Apply a fractional move, flooring the price at 1 cent
    ///
    /// Records the realized move (after flooring) in `last_change_pct`.
    pub fn apply_move(&mut self, pct: f64, at: DateTime<Utc>) {
        let before = self.price;
        let next = ((before as f64) * (1.0 + pct)).round() as i64;
        self.price = next.max(1);
        self.last_change_pct = (self.price - before) as f64 / before as f64;
        self.updated_at = at;
    }
}

/// Allocation strategy of a portfolio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioType {
    Conservative,
    Balanced,
    Aggressive,
}

/// Position in a single asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: f64,
    /// Amount paid for the position (i64 cents)
    pub cost_basis: i64,
    /// Mark-to-market value (i64 cents)
    pub market_value: i64,
    /// `market_value - cost_basis`
    pub unrealized_gain: i64,
}

impl Holding {
    /// Recompute value and gain at `price`
    pub fn revalue(&mut self, price: i64) {
        self.market_value = (self.quantity * price as f64).round() as i64;
        self.unrealized_gain = self.market_value - self.cost_basis;
    }
}

/// A user's basket of holdings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: String,
    pub user_id: String,
    /// Account the purchase was funded from
    pub account_id: String,
    pub kind: PortfolioType,
    pub holdings: Vec<Holding>,
    pub total_cost: i64,
    pub total_value: i64,
    pub unrealized_gain: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Portfolio {
    /// Recompute the aggregates from the holdings
    pub fn recompute_totals(&mut self, at: DateTime<Utc>) {
        self.total_cost = self.holdings.iter().map(|h| h.cost_basis).sum();
        self.total_value = self.holdings.iter().map(|h| h.market_value).sum();
        self.unrealized_gain = self.total_value - self.total_cost;
        self.updated_at = at;
    }
}
