//! Tick-driven scheduling: cycles per tick, stop semantics and limits.

mod common;

use chrono::Duration;
use common::{assert_no_drift, at};
use mockbank_core::config::{SimulationConfig, SimulatorConfig};
use mockbank_core::core::time::ManualClock;
use mockbank_core::simulation::{
    IntervalTicker, ManualTicker, Scheduler, SchedulerOptions, SchedulerReport,
};
use mockbank_core::store::{BankStore, MemoryStore};
use mockbank_core::{CycleSummary, Simulation};
use std::sync::Arc;
use tokio::sync::mpsc;

fn simulation() -> (Arc<Simulation<MemoryStore>>, ManualClock) {
    let clock = ManualClock::new(at(2024, 7, 1, 9, 0));
    let config = SimulatorConfig {
        simulation: SimulationConfig {
            seed_key: "scheduler-tests".to_string(),
            ..SimulationConfig::default()
        },
        ..SimulatorConfig::default()
    };
    let sim = Simulation::new(MemoryStore::new(), Arc::new(clock.clone()), config).unwrap();
    sim.seed_population(3, 1).unwrap();
    (Arc::new(sim), clock)
}

/// Forward each completed cycle and move the clock one interval on
fn forwarding(
    clock: ManualClock,
) -> (
    impl Fn(&CycleSummary) + Send + 'static,
    mpsc::UnboundedReceiver<CycleSummary>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let on_cycle = move |summary: &CycleSummary| {
        clock.advance(Duration::minutes(5));
        let _ = tx.send(summary.clone());
    };
    (on_cycle, rx)
}

// ============================================================================
// Tick-driven cycles
// ============================================================================

#[tokio::test]
async fn test_each_tick_runs_one_cycle() {
    let (sim, clock) = simulation();
    let (ticker, handle) = ManualTicker::channel();
    let (on_cycle, mut done) = forwarding(clock);
    let scheduler =
        Scheduler::start_with(Arc::clone(&sim), ticker, SchedulerOptions::default(), on_cycle);

    for expected in 1..=3u64 {
        assert!(handle.tick().await);
        let summary = done.recv().await.unwrap();
        assert_eq!(summary.cycle, expected);
    }
    assert!(scheduler.is_running());

    let report = scheduler.stop().await;
    assert_eq!(
        report,
        SchedulerReport {
            cycles_completed: 3,
            cycles_failed: 0,
        }
    );
    assert_eq!(sim.store().get_state().unwrap().cycles_run, 3);
    assert_no_drift(sim.store());
}

#[tokio::test]
async fn test_max_cycles_stops_on_its_own() {
    let (sim, clock) = simulation();
    let (ticker, handle) = ManualTicker::channel();
    let (on_cycle, mut done) = forwarding(clock);
    let scheduler = Scheduler::start_with(
        Arc::clone(&sim),
        ticker,
        SchedulerOptions {
            max_cycles: Some(2),
        },
        on_cycle,
    );

    handle.tick().await;
    done.recv().await.unwrap();
    handle.tick().await;

    let report = scheduler.join().await;
    assert_eq!(report.cycles_completed, 2);
    assert_eq!(sim.store().get_state().unwrap().cycles_run, 2);

    // Loop is gone, further ticks go nowhere
    assert!(!handle.tick().await);
}

#[tokio::test]
async fn test_interval_ticker_drives_cycles() {
    let (sim, clock) = simulation();
    let (on_cycle, _done) = forwarding(clock);
    let scheduler = Scheduler::start_with(
        Arc::clone(&sim),
        IntervalTicker::new(std::time::Duration::from_millis(10)),
        SchedulerOptions {
            max_cycles: Some(2),
        },
        on_cycle,
    );

    let report = scheduler.join().await;
    assert_eq!(report.cycles_completed, 2);
    assert_eq!(report.cycles_failed, 0);
}

// ============================================================================
// Stopping
// ============================================================================

#[tokio::test]
async fn test_stop_before_first_tick_runs_nothing() {
    let (sim, _) = simulation();
    let (ticker, _handle) = ManualTicker::channel();
    let scheduler = Scheduler::start(Arc::clone(&sim), ticker);

    let report = scheduler.stop().await;
    assert_eq!(report, SchedulerReport::default());
    assert_eq!(sim.store().get_state().unwrap().cycles_run, 0);
}

#[tokio::test]
async fn test_stop_after_loop_exited_keeps_report() {
    let (sim, clock) = simulation();
    let (ticker, handle) = ManualTicker::channel();
    let (on_cycle, mut done) = forwarding(clock);
    let scheduler = Scheduler::start_with(
        Arc::clone(&sim),
        ticker,
        SchedulerOptions {
            max_cycles: Some(1),
        },
        on_cycle,
    );
    let late = scheduler.stop_handle();

    handle.tick().await;
    done.recv().await.unwrap();
    while scheduler.is_running() {
        tokio::task::yield_now().await;
    }

    // Nobody is listening any more; both stop paths are no-ops
    late.stop();
    let report = scheduler.stop().await;
    assert_eq!(report.cycles_completed, 1);
    late.stop();
    assert_eq!(sim.store().get_state().unwrap().cycles_run, 1);
}

#[tokio::test]
async fn test_stop_handle_from_another_task() {
    let (sim, clock) = simulation();
    let (ticker, handle) = ManualTicker::channel();
    let (on_cycle, mut done) = forwarding(clock);
    let scheduler =
        Scheduler::start_with(Arc::clone(&sim), ticker, SchedulerOptions::default(), on_cycle);

    handle.tick().await;
    done.recv().await.unwrap();

    let stop = scheduler.stop_handle();
    tokio::spawn(async move { stop.stop() }).await.unwrap();

    let report = scheduler.join().await;
    assert_eq!(report.cycles_completed, 1);
    assert_eq!(sim.store().get_state().unwrap().cycles_run, 1);
}

#[tokio::test]
async fn test_dropping_every_handle_exhausts_ticker() {
    let (sim, clock) = simulation();
    let (ticker, handle) = ManualTicker::channel();
    let (on_cycle, mut done) = forwarding(clock);
    let scheduler =
        Scheduler::start_with(Arc::clone(&sim), ticker, SchedulerOptions::default(), on_cycle);

    let second = handle.clone();
    handle.tick().await;
    done.recv().await.unwrap();
    drop(handle);
    assert!(scheduler.is_running());
    drop(second);

    let report = scheduler.join().await;
    assert_eq!(report.cycles_completed, 1);
}
