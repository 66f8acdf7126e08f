//! Persona catalog
//!
//! Static behavioral archetypes that drive synthetic activity. Each persona
//! fixes how often an account holder spends, how much, on what, when income
//! arrives, and how the account is provisioned.

use crate::models::{Category, GeoLocation, PortfolioType};
use crate::rng::SeededRng;
use serde::Serialize;

/// When a persona receives income
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomePattern {
    /// Last day of each month
    Monthly,
    /// 15th and last day of each month
    Biweekly,
    /// Every Friday
    Weekly,
    /// Random days, rarer on weekends
    Sporadic,
}

/// Behavioral archetype
#[derive(Debug, Clone, Serialize)]
pub struct Persona {
    pub name: &'static str,
    /// Expense transactions per week (min, max)
    pub weekly_frequency: (u32, u32),
    /// Average expense amount (i64 cents)
    pub avg_expense: i64,
    /// Expense variance as a fraction of the average (0.5 = ±50%)
    pub expense_variance: f64,
    pub category_weights: Vec<(Category, f64)>,
    pub income_pattern: IncomePattern,
    /// Amount of each income payment (i64 cents)
    pub income_amount: i64,
    /// Activity scale on Saturdays and Sundays
    pub weekend_multiplier: f64,
    /// Overdraft granted to the persona's accounts, 0 when not allowed
    pub overdraft_limit: i64,
    /// Portfolio opened at seeding time, if the persona invests
    pub portfolio: Option<PortfolioType>,
    pub home: GeoLocation,
    pub opening_balance: i64,
    /// Share of a seeded population
    pub population_weight: f64,
}

impl Persona {
    pub fn allows_overdraft(&self) -> bool {
        self.overdraft_limit > 0
    }

    /// Midpoint of the weekly frequency range
    pub fn weekly_midpoint(&self) -> f64 {
        (self.weekly_frequency.0 + self.weekly_frequency.1) as f64 / 2.0
    }
}

/// Built-in persona set
#[derive(Debug, Clone)]
pub struct PersonaCatalog {
    personas: Vec<Persona>,
}

impl Default for PersonaCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PersonaCatalog {
    pub fn builtin() -> Self {
        use Category::*;

        let personas = vec![
            Persona {
                name: "student",
                weekly_frequency: (8, 15),
                avg_expense: 1_800,
                expense_variance: 0.5,
                category_weights: vec![
                    (Groceries, 0.25),
                    (Dining, 0.25),
                    (Transport, 0.15),
                    (Entertainment, 0.15),
                    (Shopping, 0.10),
                    (Education, 0.10),
                ],
                income_pattern: IncomePattern::Sporadic,
                income_amount: 60_000,
                weekend_multiplier: 1.4,
                overdraft_limit: 20_000,
                portfolio: None,
                home: GeoLocation::new("Austin", 30.2672, -97.7431),
                opening_balance: 80_000,
                population_weight: 0.15,
            },
            Persona {
                name: "young_professional",
                weekly_frequency: (12, 20),
                avg_expense: 3_500,
                expense_variance: 0.6,
                category_weights: vec![
                    (Dining, 0.25),
                    (Groceries, 0.20),
                    (Shopping, 0.15),
                    (Transport, 0.15),
                    (Entertainment, 0.15),
                    (Travel, 0.05),
                    (Utilities, 0.05),
                ],
                income_pattern: IncomePattern::Biweekly,
                income_amount: 260_000,
                weekend_multiplier: 1.3,
                overdraft_limit: 50_000,
                portfolio: Some(PortfolioType::Aggressive),
                home: GeoLocation::new("New York", 40.7128, -74.0060),
                opening_balance: 400_000,
                population_weight: 0.25,
            },
            Persona {
                name: "family",
                weekly_frequency: (15, 25),
                avg_expense: 6_000,
                expense_variance: 0.5,
                category_weights: vec![
                    (Groceries, 0.35),
                    (Utilities, 0.15),
                    (Shopping, 0.15),
                    (Healthcare, 0.10),
                    (Transport, 0.10),
                    (Education, 0.10),
                    (Dining, 0.05),
                ],
                income_pattern: IncomePattern::Monthly,
                income_amount: 650_000,
                weekend_multiplier: 1.5,
                overdraft_limit: 100_000,
                portfolio: Some(PortfolioType::Balanced),
                home: GeoLocation::new("Chicago", 41.8781, -87.6298),
                opening_balance: 800_000,
                population_weight: 0.25,
            },
            Persona {
                name: "retiree",
                weekly_frequency: (5, 10),
                avg_expense: 4_000,
                expense_variance: 0.3,
                category_weights: vec![
                    (Groceries, 0.35),
                    (Healthcare, 0.25),
                    (Utilities, 0.20),
                    (Dining, 0.10),
                    (Travel, 0.10),
                ],
                income_pattern: IncomePattern::Monthly,
                income_amount: 320_000,
                weekend_multiplier: 1.0,
                overdraft_limit: 0,
                portfolio: Some(PortfolioType::Conservative),
                home: GeoLocation::new("Miami", 25.7617, -80.1918),
                opening_balance: 1_500_000,
                population_weight: 0.15,
            },
            Persona {
                name: "small_business",
                weekly_frequency: (20, 35),
                avg_expense: 15_000,
                expense_variance: 0.8,
                category_weights: vec![
                    (Shopping, 0.30),
                    (Utilities, 0.20),
                    (Transport, 0.20),
                    (Rent, 0.10),
                    (Travel, 0.10),
                    (Dining, 0.10),
                ],
                income_pattern: IncomePattern::Weekly,
                income_amount: 400_000,
                weekend_multiplier: 0.6,
                overdraft_limit: 300_000,
                portfolio: Some(PortfolioType::Balanced),
                home: GeoLocation::new("Seattle", 47.6062, -122.3321),
                opening_balance: 2_000_000,
                population_weight: 0.12,
            },
            Persona {
                name: "high_net_worth",
                weekly_frequency: (8, 16),
                avg_expense: 25_000,
                expense_variance: 0.9,
                category_weights: vec![
                    (Dining, 0.25),
                    (Travel, 0.25),
                    (Shopping, 0.25),
                    (Entertainment, 0.15),
                    (Healthcare, 0.10),
                ],
                income_pattern: IncomePattern::Monthly,
                income_amount: 2_500_000,
                weekend_multiplier: 1.2,
                overdraft_limit: 1_000_000,
                portfolio: Some(PortfolioType::Aggressive),
                home: GeoLocation::new("San Francisco", 37.7749, -122.4194),
                opening_balance: 10_000_000,
                population_weight: 0.08,
            },
        ];

        Self { personas }
    }

    /// Look up a persona by name
    pub fn get(&self, name: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.name == name)
    }

    pub fn all(&self) -> &[Persona] {
        &self.personas
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.personas.iter().map(|p| p.name).collect()
    }

    /// Draw a persona by population weight
    pub fn pick(&self, rng: &mut SeededRng) -> Option<&Persona> {
        let table: Vec<(&Persona, f64)> = self
            .personas
            .iter()
            .map(|p| (p, p.population_weight))
            .collect();
        rng.pick_weighted(&table).copied()
    }
}

/// Merchant names used for a spending category
pub fn merchants(category: Category) -> &'static [&'static str] {
    match category {
        Category::Groceries => &["FreshMart", "Green Basket", "Corner Grocer", "Harvest Foods"],
        Category::Dining => &["Blue Spoon Cafe", "Noodle House", "Taco Loco", "The Daily Grind"],
        Category::Transport => &["Metro Transit", "QuickRide", "FuelStop", "City Parking"],
        Category::Utilities => &["PowerGrid Energy", "AquaWorks", "FiberNet", "CellOne"],
        Category::Shopping => &["MegaStore", "StyleHub", "TechDepot", "HomeGoods Plus"],
        Category::Entertainment => &["CineMax", "StreamFlix", "Arcade Alley", "Live Nation Tix"],
        Category::Healthcare => &["CarePlus Pharmacy", "City Clinic", "SmileDental"],
        Category::Travel => &["SkyHigh Airlines", "StayWell Hotels", "RoadTrip Rentals"],
        Category::Rent => &["Oakwood Properties", "Summit Leasing"],
        Category::Education => &["BookNook", "LearnOnline", "State University"],
        Category::Salary => &["Payroll"],
        Category::Transfer
        | Category::LoanDisbursement
        | Category::LoanPayment
        | Category::Investment
        | Category::Deposit => &[],
    }
}

/// Cities used for travel spending
pub fn travel_destinations() -> Vec<GeoLocation> {
    vec![
        GeoLocation::new("London", 51.5074, -0.1278),
        GeoLocation::new("Paris", 48.8566, 2.3522),
        GeoLocation::new("Tokyo", 35.6762, 139.6503),
        GeoLocation::new("Mexico City", 19.4326, -99.1332),
        GeoLocation::new("Toronto", 43.6532, -79.3832),
        GeoLocation::new("Denver", 39.7392, -104.9903),
    ]
}
