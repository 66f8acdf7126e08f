//! Market simulation and portfolio valuation
//!
//! Asset prices move once per cycle by a random draw within ±volatility
//! plus a momentum carry of the previous move. Crashes and recoveries are
//! bulk shocks scaled per asset class and jittered. Every draw comes from
//! the caller's seeded source.

use crate::config::{ClassMultipliers, LifecycleConfig, MarketConfig};
use crate::lifecycle::{LifecycleError, NewTransaction, TransactionLifecycle};
use crate::models::{
    AssetClass, Category, Holding, MarketAsset, Portfolio, PortfolioType, RiskEvent,
    RiskEventKind, Severity, TransactionMetadata,
};
use crate::rng::SeededRng;
use crate::store::{BankStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum InvestmentError {
    #[error("investment amount must be positive, got {amount}")]
    InvalidAmount { amount: i64 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("account {account_id} cannot fund {amount}")]
    InsufficientFunds { account_id: String, amount: i64 },

    #[error("account {account_id} is frozen")]
    AccountFrozen { account_id: String },

    #[error("purchase posting failed: {0}")]
    Posting(LifecycleError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for InvestmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => InvestmentError::NotFound { entity, id },
            other => InvestmentError::Store(other),
        }
    }
}

impl InvestmentError {
    pub fn code(&self) -> &'static str {
        match self {
            InvestmentError::InvalidAmount { .. } => "INVALID_AMOUNT",
            InvestmentError::NotFound { .. } => "NOT_FOUND",
            InvestmentError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            InvestmentError::AccountFrozen { .. } => "ACCOUNT_FROZEN",
            InvestmentError::Posting(inner) => inner.code(),
            InvestmentError::Store(_) => "STORE_UNAVAILABLE",
        }
    }
}

/// Size of a market crash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashSeverity {
    Mild,
    Moderate,
    Severe,
}

impl CrashSeverity {
    pub const ALL: [CrashSeverity; 3] = [
        CrashSeverity::Mild,
        CrashSeverity::Moderate,
        CrashSeverity::Severe,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CrashSeverity::Mild => "mild",
            CrashSeverity::Moderate => "moderate",
            CrashSeverity::Severe => "severe",
        }
    }

    /// Base fractional drop before class multipliers
    pub fn base_drop(self, config: &MarketConfig) -> f64 {
        match self {
            CrashSeverity::Mild => config.mild_drop,
            CrashSeverity::Moderate => config.moderate_drop,
            CrashSeverity::Severe => config.severe_drop,
        }
    }

    fn audit_severity(self) -> Severity {
        match self {
            CrashSeverity::Mild => Severity::Low,
            CrashSeverity::Moderate => Severity::Medium,
            CrashSeverity::Severe => Severity::High,
        }
    }
}

fn class_multiplier(m: &ClassMultipliers, class: AssetClass) -> f64 {
    match class {
        AssetClass::Crypto => m.crypto,
        AssetClass::Stock => m.stock,
        AssetClass::Etf => m.etf,
        AssetClass::Commodity => m.commodity,
        AssetClass::Bond => m.bond,
        AssetClass::Savings => m.savings,
    }
}

/// Result of a market-wide price change
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketUpdate {
    pub assets_updated: usize,
    pub portfolios_revalued: usize,
    pub errors: usize,
}

/// Built-in asset catalog
pub fn default_assets(at: DateTime<Utc>) -> Vec<MarketAsset> {
    vec![
        MarketAsset::new("ACME", "Acme Corp", AssetClass::Stock, 15_000, 0.020, at),
        MarketAsset::new("GLBX", "Globex Industries", AssetClass::Stock, 8_500, 0.025, at),
        MarketAsset::new("TOTL", "Total Market ETF", AssetClass::Etf, 42_000, 0.012, at),
        MarketAsset::new("INTL", "International ETF", AssetClass::Etf, 5_500, 0.014, at),
        MarketAsset::new("GOVB", "Treasury Bond Fund", AssetClass::Bond, 10_000, 0.004, at),
        MarketAsset::new("CORP", "Corporate Bond Fund", AssetClass::Bond, 9_800, 0.006, at),
        MarketAsset::new("BTC", "Bitcoin", AssetClass::Crypto, 6_500_000, 0.050, at),
        MarketAsset::new("ETH", "Ether", AssetClass::Crypto, 350_000, 0.060, at),
        MarketAsset::new("GOLD", "Gold Trust", AssetClass::Commodity, 19_000, 0.010, at),
        // Priced in 100-unit lots so sub-basis-point moves still change the cent price
        MarketAsset::new("CASH", "High-Yield Savings", AssetClass::Savings, 10_000, 0.0005, at),
    ]
}

/// Fixed target weights of a portfolio type
pub fn target_weights(kind: PortfolioType) -> &'static [(&'static str, f64)] {
    match kind {
        PortfolioType::Conservative => &[
            ("GOVB", 0.40),
            ("CORP", 0.20),
            ("CASH", 0.20),
            ("TOTL", 0.15),
            ("GOLD", 0.05),
        ],
        PortfolioType::Balanced => &[
            ("TOTL", 0.30),
            ("GOVB", 0.20),
            ("ACME", 0.15),
            ("INTL", 0.15),
            ("GOLD", 0.10),
            ("CASH", 0.10),
        ],
        PortfolioType::Aggressive => &[
            ("ACME", 0.25),
            ("GLBX", 0.20),
            ("TOTL", 0.15),
            ("INTL", 0.15),
            ("BTC", 0.15),
            ("ETH", 0.10),
        ],
    }
}

pub struct InvestmentEngine<'a> {
    config: &'a MarketConfig,
    lifecycle: &'a LifecycleConfig,
}

impl<'a> InvestmentEngine<'a> {
    pub fn new(config: &'a MarketConfig, lifecycle: &'a LifecycleConfig) -> Self {
        Self { config, lifecycle }
    }

    /// Insert catalog assets that are not yet stored
    pub fn seed_assets<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for asset in default_assets(now) {
            match store.get_asset(&asset.symbol) {
                Ok(_) => {}
                Err(err) if err.is_not_found() => {
                    store.insert_asset(asset)?;
                    inserted += 1;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(inserted)
    }

    /// Buy a target-weight basket funded from `account_id`
    ///
    /// The purchase debit is posted first; if the portfolio row cannot be
    /// written the debit is refunded.
    pub fn create_portfolio<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        account_id: &str,
        kind: PortfolioType,
        amount: i64,
    ) -> Result<Portfolio, InvestmentError> {
        if amount <= 0 {
            return Err(InvestmentError::InvalidAmount { amount });
        }

        let account = store.get_account(account_id)?;
        if account.is_frozen() {
            return Err(InvestmentError::AccountFrozen {
                account_id: account_id.to_string(),
            });
        }
        if !account.can_cover(amount) {
            return Err(InvestmentError::InsufficientFunds {
                account_id: account_id.to_string(),
                amount,
            });
        }

        let mut holdings = Vec::new();
        for (symbol, weight) in target_weights(kind) {
            let asset = store.get_asset(symbol)?;
            let allocation = ((amount as f64) * weight).floor() as i64;
            if allocation <= 0 {
                continue;
            }
            holdings.push(Holding {
                symbol: asset.symbol.clone(),
                quantity: allocation as f64 / asset.price as f64,
                cost_basis: allocation,
                market_value: allocation,
                unrealized_gain: 0,
            });
        }

        let mut portfolio = Portfolio {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: account.user_id().to_string(),
            account_id: account_id.to_string(),
            kind,
            holdings,
            total_cost: 0,
            total_value: 0,
            unrealized_gain: 0,
            created_at: now,
            updated_at: now,
        };
        portfolio.recompute_totals(now);

        let lifecycle = TransactionLifecycle::new(store, self.lifecycle);
        let purchase = NewTransaction::debit(
            account_id,
            portfolio.total_cost,
            TransactionMetadata::new(Category::Investment).with_reference(&portfolio.id),
        )
        .skip_validation();
        lifecycle
            .post_immediately(now, purchase)
            .map_err(InvestmentError::Posting)?;

        if let Err(err) = store.insert_portfolio(portfolio.clone()) {
            error!(portfolio_id = %portfolio.id, error = %err, "portfolio write failed, refunding");
            let refund = NewTransaction::credit(
                account_id,
                portfolio.total_cost,
                TransactionMetadata::new(Category::Investment)
                    .with_reference(&portfolio.id)
                    .with_description("portfolio purchase refund"),
            )
            .skip_validation();
            if let Err(comp) = lifecycle.post_immediately(now, refund) {
                error!(portfolio_id = %portfolio.id, error = %comp, "refund failed");
            }
            return Err(err.into());
        }

        info!(
            portfolio_id = %portfolio.id,
            kind = ?kind,
            amount = portfolio.total_cost,
            "portfolio created"
        );
        Ok(portfolio)
    }

    fn apply_to_assets<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        mut pct_for: impl FnMut(&MarketAsset) -> f64,
    ) -> Result<MarketUpdate, StoreError> {
        let mut update = MarketUpdate::default();
        for mut asset in store.list_assets()? {
            let pct = pct_for(&asset).max(-0.99);
            asset.apply_move(pct, now);
            match store.update_asset(&asset) {
                Ok(()) => update.assets_updated += 1,
                Err(err) => {
                    error!(symbol = %asset.symbol, error = %err, "asset update failed");
                    update.errors += 1;
                }
            }
        }
        Ok(update)
    }

    /// Daily price move for every asset, then revalue every portfolio
    pub fn update_prices<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        rng: &mut SeededRng,
    ) -> Result<MarketUpdate, StoreError> {
        let momentum = self.config.momentum;
        let mut update = self.apply_to_assets(store, now, |asset| {
            rng.next_range(-asset.volatility, asset.volatility) + momentum * asset.last_change_pct
        })?;
        let revalued = self.revalue_all(store, now)?;
        update.portfolios_revalued = revalued.portfolios_revalued;
        update.errors += revalued.errors;
        Ok(update)
    }

    /// Mark every portfolio to market at current prices
    pub fn revalue_all<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
    ) -> Result<MarketUpdate, StoreError> {
        let prices: HashMap<String, i64> = store
            .list_assets()?
            .into_iter()
            .map(|a| (a.symbol, a.price))
            .collect();

        let mut update = MarketUpdate::default();
        for mut portfolio in store.list_portfolios(&|_: &Portfolio| true)? {
            for holding in &mut portfolio.holdings {
                if let Some(&price) = prices.get(&holding.symbol) {
                    holding.revalue(price);
                }
            }
            portfolio.recompute_totals(now);
            match store.update_portfolio(&portfolio) {
                Ok(()) => update.portfolios_revalued += 1,
                Err(err) => {
                    error!(portfolio_id = %portfolio.id, error = %err, "portfolio revaluation failed");
                    update.errors += 1;
                }
            }
        }
        Ok(update)
    }

    /// Drop every asset by the severity's base drop × class multiplier × jitter
    ///
    /// Appends a market-shock risk event for each portfolio that lost value.
    pub fn market_crash<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        severity: CrashSeverity,
        rng: &mut SeededRng,
    ) -> Result<MarketUpdate, StoreError> {
        let base = severity.base_drop(self.config);
        let before: HashMap<String, i64> = store
            .list_portfolios(&|_: &Portfolio| true)?
            .into_iter()
            .map(|p| (p.id, p.total_value))
            .collect();

        let (jitter_min, jitter_max) = (self.config.jitter_min, self.config.jitter_max);
        let multipliers = &self.config.multipliers;
        let mut update = self.apply_to_assets(store, now, |asset| {
            let jitter = rng.next_range(jitter_min, jitter_max);
            -(base * class_multiplier(multipliers, asset.class) * jitter)
        })?;
        let revalued = self.revalue_all(store, now)?;
        update.portfolios_revalued = revalued.portfolios_revalued;
        update.errors += revalued.errors;

        for portfolio in store.list_portfolios(&|_: &Portfolio| true)? {
            let loss = before.get(&portfolio.id).copied().unwrap_or(portfolio.total_value)
                - portfolio.total_value;
            if loss > 0 {
                store.append_risk_event(RiskEvent::new(
                    &portfolio.user_id,
                    RiskEventKind::MarketShock {
                        portfolio_id: portfolio.id.clone(),
                        loss,
                    },
                    severity.audit_severity(),
                    now,
                ))?;
            }
        }

        warn!(severity = severity.name(), assets = update.assets_updated, "market crash applied");
        Ok(update)
    }

    /// Lift every asset by `pct` × class multiplier × jitter
    pub fn market_recovery<S: BankStore + ?Sized>(
        &self,
        store: &S,
        now: DateTime<Utc>,
        pct: f64,
        rng: &mut SeededRng,
    ) -> Result<MarketUpdate, StoreError> {
        let (jitter_min, jitter_max) = (self.config.jitter_min, self.config.jitter_max);
        let multipliers = &self.config.multipliers;
        let mut update = self.apply_to_assets(store, now, |asset| {
            let jitter = rng.next_range(jitter_min, jitter_max);
            pct * class_multiplier(multipliers, asset.class) * jitter
        })?;
        let revalued = self.revalue_all(store, now)?;
        update.portfolios_revalued = revalued.portfolios_revalued;
        update.errors += revalued.errors;

        info!(pct, assets = update.assets_updated, "market recovery applied");
        Ok(update)
    }
}
