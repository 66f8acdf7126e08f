//! Repeating timer that drives simulation cycles
//!
//! The [`Ticker`] abstraction lets production code run on a wall-clock
//! interval while tests step cycles one at a time through a
//! [`ManualTicker`].
//!
//! # Critical Invariants
//!
//! - Stopping prevents new cycles; it never interrupts one in flight
//! - A failed cycle is logged and counted and the loop keeps going

use super::engine::{CycleSummary, Simulation};
use crate::error::SimulationError;
use crate::store::BankStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Source of cycle triggers
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next trigger; `false` once the ticker is exhausted
    async fn tick(&mut self) -> bool;
}

/// Wall-clock ticker over `tokio::time::interval`
///
/// The first tick fires immediately. Ticks missed while a slow cycle runs
/// are skipped rather than replayed in a burst.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticker fired by hand through a [`TickHandle`]
pub struct ManualTicker {
    rx: mpsc::Receiver<()>,
}

/// Sending side of a [`ManualTicker`]; dropping every handle exhausts it
#[derive(Clone)]
pub struct TickHandle {
    tx: mpsc::Sender<()>,
}

impl ManualTicker {
    pub fn channel() -> (Self, TickHandle) {
        let (tx, rx) = mpsc::channel(16);
        (Self { rx }, TickHandle { tx })
    }
}

impl TickHandle {
    /// Trigger one cycle; `false` if the scheduler is gone
    pub async fn tick(&self) -> bool {
        self.tx.send(()).await.is_ok()
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

/// Scheduler limits
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerOptions {
    /// Stop by itself after this many attempted cycles
    pub max_cycles: Option<u64>,
}

/// Totals of a scheduler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
}

/// Handle to a running scheduling loop
pub struct Scheduler {
    stop_tx: Arc<watch::Sender<bool>>,
    handle: JoinHandle<SchedulerReport>,
}

/// Cloneable stop signal, e.g. for a signal handler task
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        if self.tx.send(true).is_err() {
            debug!("stop requested after scheduler exited");
        }
    }
}

impl Scheduler {
    /// Start running cycles on every tick of `ticker`
    pub fn start<S, T>(simulation: Arc<Simulation<S>>, ticker: T) -> Self
    where
        S: BankStore + 'static,
        T: Ticker + 'static,
    {
        Self::start_with(simulation, ticker, SchedulerOptions::default(), |_| {})
    }

    /// [`Scheduler::start`] with limits and a per-cycle callback
    pub fn start_with<S, T, F>(
        simulation: Arc<Simulation<S>>,
        mut ticker: T,
        options: SchedulerOptions,
        on_cycle: F,
    ) -> Self
    where
        S: BankStore + 'static,
        T: Ticker + 'static,
        F: Fn(&CycleSummary) + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut report = SchedulerReport::default();
            info!(max_cycles = ?options.max_cycles, "scheduler started");

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    more = ticker.tick() => {
                        if !more {
                            break;
                        }
                    }
                }
                if *stop_rx.borrow() {
                    break;
                }

                let sim = Arc::clone(&simulation);
                match tokio::task::spawn_blocking(move || sim.run_cycle()).await {
                    Ok(Ok(summary)) => {
                        report.cycles_completed += 1;
                        on_cycle(&summary);
                    }
                    Ok(Err(SimulationError::CycleInProgress)) => {
                        warn!("cycle skipped, previous cycle still running");
                        report.cycles_failed += 1;
                    }
                    Ok(Err(err)) => {
                        error!(error = %err, "scheduled cycle failed");
                        report.cycles_failed += 1;
                    }
                    Err(err) => {
                        error!(error = %err, "scheduled cycle panicked");
                        report.cycles_failed += 1;
                    }
                }

                let attempted = report.cycles_completed + report.cycles_failed;
                if options.max_cycles.is_some_and(|max| attempted >= max) {
                    break;
                }
            }

            info!(
                completed = report.cycles_completed,
                failed = report.cycles_failed,
                "scheduler stopped"
            );
            report
        });

        Self {
            stop_tx: Arc::new(stop_tx),
            handle,
        }
    }

    /// True until the loop has exited
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.stop_tx),
        }
    }

    /// Signal the loop to stop and wait for the cycle in flight to finish
    pub async fn stop(self) -> SchedulerReport {
        if self.stop_tx.send(true).is_err() {
            debug!("scheduler already exited before stop");
        }
        self.join().await
    }

    /// Wait for the loop to exit on its own
    pub async fn join(self) -> SchedulerReport {
        match self.handle.await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "scheduler task failed");
                SchedulerReport::default()
            }
        }
    }
}
