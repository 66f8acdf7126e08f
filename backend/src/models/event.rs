//! Event logging for simulation replay and auditing.
//!
//! This module defines the Event enum which captures all significant state changes
//! made by the simulation. Events enable:
//! - Debugging (understand what happened and when)
//! - Assertions in tests (what a cycle actually did)
//! - Analysis (extract metrics and patterns)
//!
//! # Event Types
//!
//! Events are categorized by subsystem:
//! - **Lifecycle**: Transaction created, rejected, posted, canceled
//! - **Fraud/AML**: Transaction flagged, account frozen, AML rule fired
//! - **Loans**: Payment collected, payment missed, default
//! - **Market**: Price update, crash, recovery
//! - **Cycle**: Anomaly injection, day rollover, cycle completion

use crate::models::{AmlFlag, Direction, FraudAction};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Simulation event capturing a state change.
///
/// All events include a timestamp for temporal ordering.
/// Events are logged in the order they occur within a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    TransactionCreated {
        at: DateTime<Utc>,
        tx_id: String,
        account_id: String,
        direction: Direction,
        amount: i64,
    },

    /// Creation refused by a domain rule
    TransactionRejected {
        at: DateTime<Utc>,
        account_id: String,
        code: &'static str,
    },

    TransactionPosted {
        at: DateTime<Utc>,
        tx_id: String,
        account_id: String,
        amount: i64,
        /// Final amount differs from the authorized hold
        adjusted: bool,
    },

    TransactionCanceled {
        at: DateTime<Utc>,
        tx_id: String,
        account_id: String,
        reason: String,
    },

    FraudFlagged {
        at: DateTime<Utc>,
        tx_id: String,
        account_id: String,
        score: u8,
        action: FraudAction,
    },

    AccountFrozen {
        at: DateTime<Utc>,
        account_id: String,
    },

    AmlFlagged {
        at: DateTime<Utc>,
        tx_id: String,
        account_id: String,
        flag: AmlFlag,
    },

    LoanPaymentCollected {
        at: DateTime<Utc>,
        loan_id: String,
        amount: i64,
        remaining: i64,
    },

    LoanPaymentMissed {
        at: DateTime<Utc>,
        loan_id: String,
        consecutive: u32,
    },

    LoanDefaulted {
        at: DateTime<Utc>,
        loan_id: String,
    },

    PricesUpdated {
        at: DateTime<Utc>,
        assets: usize,
        portfolios: usize,
    },

    MarketCrash {
        at: DateTime<Utc>,
        severity: String,
    },

    MarketRecovery {
        at: DateTime<Utc>,
        pct: f64,
    },

    FraudIncidentStarted {
        at: DateTime<Utc>,
        account_id: String,
    },

    FraudIncidentEnded {
        at: DateTime<Utc>,
        /// Account the incident targeted, when still known
        account_id: Option<String>,
    },

    DayRollover {
        at: DateTime<Utc>,
        day: NaiveDate,
    },

    CycleCompleted {
        at: DateTime<Utc>,
        cycle: u64,
        generated: usize,
        posted: usize,
        canceled: usize,
        flagged: usize,
    },
}

impl Event {
    /// Get the instant this event occurred
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::TransactionCreated { at, .. }
            | Event::TransactionRejected { at, .. }
            | Event::TransactionPosted { at, .. }
            | Event::TransactionCanceled { at, .. }
            | Event::FraudFlagged { at, .. }
            | Event::AccountFrozen { at, .. }
            | Event::AmlFlagged { at, .. }
            | Event::LoanPaymentCollected { at, .. }
            | Event::LoanPaymentMissed { at, .. }
            | Event::LoanDefaulted { at, .. }
            | Event::PricesUpdated { at, .. }
            | Event::MarketCrash { at, .. }
            | Event::MarketRecovery { at, .. }
            | Event::FraudIncidentStarted { at, .. }
            | Event::FraudIncidentEnded { at, .. }
            | Event::DayRollover { at, .. }
            | Event::CycleCompleted { at, .. } => *at,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::TransactionCreated { .. } => "TransactionCreated",
            Event::TransactionRejected { .. } => "TransactionRejected",
            Event::TransactionPosted { .. } => "TransactionPosted",
            Event::TransactionCanceled { .. } => "TransactionCanceled",
            Event::FraudFlagged { .. } => "FraudFlagged",
            Event::AccountFrozen { .. } => "AccountFrozen",
            Event::AmlFlagged { .. } => "AmlFlagged",
            Event::LoanPaymentCollected { .. } => "LoanPaymentCollected",
            Event::LoanPaymentMissed { .. } => "LoanPaymentMissed",
            Event::LoanDefaulted { .. } => "LoanDefaulted",
            Event::PricesUpdated { .. } => "PricesUpdated",
            Event::MarketCrash { .. } => "MarketCrash",
            Event::MarketRecovery { .. } => "MarketRecovery",
            Event::FraudIncidentStarted { .. } => "FraudIncidentStarted",
            Event::FraudIncidentEnded { .. } => "FraudIncidentEnded",
            Event::DayRollover { .. } => "DayRollover",
            Event::CycleCompleted { .. } => "CycleCompleted",
        }
    }

    /// Get transaction ID if event relates to a specific transaction
    pub fn tx_id(&self) -> Option<&str> {
        match self {
            Event::TransactionCreated { tx_id, .. }
            | Event::TransactionPosted { tx_id, .. }
            | Event::TransactionCanceled { tx_id, .. }
            | Event::FraudFlagged { tx_id, .. }
            | Event::AmlFlagged { tx_id, .. } => Some(tx_id),
            _ => None,
        }
    }

    /// Get account ID if event relates to a specific account
    pub fn account_id(&self) -> Option<&str> {
        match self {
            Event::TransactionCreated { account_id, .. }
            | Event::TransactionRejected { account_id, .. }
            | Event::TransactionPosted { account_id, .. }
            | Event::TransactionCanceled { account_id, .. }
            | Event::FraudFlagged { account_id, .. }
            | Event::AccountFrozen { account_id, .. }
            | Event::AmlFlagged { account_id, .. }
            | Event::FraudIncidentStarted { account_id, .. } => Some(account_id),
            Event::FraudIncidentEnded { account_id, .. } => account_id.as_deref(),
            _ => None,
        }
    }
}

/// Event log for storing and querying simulation events.
///
/// This is a simple wrapper around Vec<Event> with convenience methods.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Get the number of events logged
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get all events
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Get events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get events for a specific transaction
    pub fn events_for_tx(&self, tx_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.tx_id() == Some(tx_id))
            .collect()
    }

    /// Get events for a specific account
    pub fn events_for_account(&self, account_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.account_id() == Some(account_id))
            .collect()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
