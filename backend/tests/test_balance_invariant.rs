//! Balance invariant under arbitrary operation sequences
//!
//! After every lifecycle operation, each account balance equals the signed
//! sum of its posted and pending transactions, and no transaction ever
//! leaves a terminal state. The same holds when several threads share one
//! store, or when facade calls overlap a running cycle.

mod common;

use chrono::Duration;
use common::{assert_no_drift, at, funded_account, ledger_balance};
use mockbank_core::config::{LifecycleConfig, SimulationConfig, SimulatorConfig};
use mockbank_core::core::time::ManualClock;
use mockbank_core::lifecycle::{NewTransaction, TransactionLifecycle};
use mockbank_core::models::{Account, Category, Direction, TransactionMetadata};
use mockbank_core::rng::SeededRng;
use mockbank_core::store::{BankStore, MemoryStore};
use mockbank_core::Simulation;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone)]
enum Op {
    Debit(i64),
    Credit(i64),
    Post { pick: usize, final_amount: Option<i64> },
    Cancel { pick: usize },
    Batch { minutes: i64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..80_000).prop_map(Op::Debit),
        (1i64..50_000).prop_map(Op::Credit),
        (any::<usize>(), proptest::option::of(1i64..90_000))
            .prop_map(|(pick, final_amount)| Op::Post { pick, final_amount }),
        any::<usize>().prop_map(|pick| Op::Cancel { pick }),
        (0i64..3_000).prop_map(|minutes| Op::Batch { minutes }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_no_drift(ops in proptest::collection::vec(op(), 1..40), seed in any::<u32>()) {
        let store = MemoryStore::new();
        let start = at(2024, 3, 4, 8, 0);
        let (_, account_id) = funded_account(&store, "young_professional", 150_000, start);
        let config = LifecycleConfig::default();
        let lifecycle = TransactionLifecycle::new(&store, &config);
        let mut rng = SeededRng::new(seed);
        let mut now = start;
        let mut created = Vec::new();

        for op in ops {
            now += Duration::minutes(7);
            let meta = TransactionMetadata::new(Category::Shopping);
            match op {
                Op::Debit(amount) => {
                    if let Ok(tx) = lifecycle.create(now, NewTransaction::new(&account_id, Direction::Debit, amount, meta), Some(&mut rng)) {
                        created.push(tx.id().to_string());
                    }
                }
                Op::Credit(amount) => {
                    if let Ok(tx) = lifecycle.create(now, NewTransaction::new(&account_id, Direction::Credit, amount, meta), Some(&mut rng)) {
                        created.push(tx.id().to_string());
                    }
                }
                Op::Post { pick, final_amount } => {
                    if !created.is_empty() {
                        let id = &created[pick % created.len()];
                        let _ = lifecycle.post(now, id, final_amount);
                    }
                }
                Op::Cancel { pick } => {
                    if !created.is_empty() {
                        let id = &created[pick % created.len()];
                        let before = store.get_transaction(id).unwrap();
                        let result = lifecycle.cancel(now, id, "test");
                        prop_assert_eq!(result.is_ok(), before.is_pending());
                    }
                }
                Op::Batch { minutes } => {
                    let _ = lifecycle.process_pending(now + Duration::minutes(minutes), &mut rng);
                }
            }

            let account = store.get_account(&account_id).unwrap();
            prop_assert_eq!(account.balance(), ledger_balance(&store, &account_id));
        }

        assert_no_drift(&store);
    }
}

#[test]
fn test_terminal_states_never_revert() {
    let store = MemoryStore::new();
    let now = at(2024, 3, 4, 8, 0);
    let (_, account_id) = funded_account(&store, "family", 100_000, now);
    let config = LifecycleConfig::default();
    let lifecycle = TransactionLifecycle::new(&store, &config);
    let meta = || TransactionMetadata::new(Category::Dining);

    let posted = lifecycle
        .create(now, NewTransaction::debit(&account_id, 2_000, meta()), None)
        .unwrap();
    lifecycle.post(now, posted.id(), None).unwrap();
    assert!(lifecycle.cancel(now, posted.id(), "late").is_err());
    assert!(lifecycle.post(now, posted.id(), Some(1)).is_err());

    let canceled = lifecycle
        .create(now, NewTransaction::debit(&account_id, 2_000, meta()), None)
        .unwrap();
    lifecycle.cancel(now, canceled.id(), "changed mind").unwrap();
    assert!(lifecycle.post(now, canceled.id(), None).is_err());

    assert!(store.get_transaction(posted.id()).unwrap().is_posted());
    assert!(store.get_transaction(canceled.id()).unwrap().is_canceled());
    assert_eq!(store.get_account(&account_id).unwrap().balance(), 98_000);
}

// ============================================================================
// Concurrent writers
// ============================================================================

#[test]
fn test_parallel_create_and_cancel_keeps_ledger() {
    let store = Arc::new(MemoryStore::new());
    let now = at(2024, 3, 4, 8, 0);
    let (_, account_id) = funded_account(store.as_ref(), "small_business", 100_000, now);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let account_id = account_id.clone();
            thread::spawn(move || {
                let config = LifecycleConfig::default();
                let lifecycle = TransactionLifecycle::new(store.as_ref(), &config);
                for _ in 0..2_000 {
                    let meta = TransactionMetadata::new(Category::Deposit);
                    let tx = lifecycle
                        .create(now, NewTransaction::credit(&account_id, 10, meta), None)
                        .unwrap();
                    lifecycle.cancel(now, tx.id(), "reversed").unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(store.get_account(&account_id).unwrap().balance(), 100_000);
    assert_eq!(ledger_balance(store.as_ref(), &account_id), 100_000);
}

#[test]
fn test_racing_resolutions_settle_once() {
    let store = Arc::new(MemoryStore::new());
    let now = at(2024, 3, 4, 8, 0);
    let (_, account_id) = funded_account(store.as_ref(), "high_net_worth", 1_000_000, now);
    let config = LifecycleConfig::default();
    let ids: Vec<String> = {
        let lifecycle = TransactionLifecycle::new(store.as_ref(), &config);
        (0..200)
            .map(|i| {
                let meta = TransactionMetadata::new(Category::Shopping);
                lifecycle
                    .create(now, NewTransaction::debit(&account_id, 100 + i, meta).skip_validation(), None)
                    .unwrap()
                    .id()
                    .to_string()
            })
            .collect()
    };
    let ids = Arc::new(ids);
    let resolved = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            let ids = Arc::clone(&ids);
            let resolved = Arc::clone(&resolved);
            thread::spawn(move || {
                let config = LifecycleConfig::default();
                let lifecycle = TransactionLifecycle::new(store.as_ref(), &config);
                for id in ids.iter() {
                    let result = if worker % 2 == 0 {
                        lifecycle.post(now, id, Some(150)).map(|_| ())
                    } else {
                        lifecycle.cancel(now, id, "race").map(|_| ())
                    };
                    match result {
                        Ok(()) => {
                            resolved.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(err) => assert_eq!(err.code(), "INVALID_STATUS"),
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(resolved.load(Ordering::SeqCst), ids.len());
    assert_no_drift(store.as_ref());
}

#[test]
fn test_facade_calls_overlapping_cycles_keep_ledger() {
    let clock = ManualClock::new(at(2024, 3, 4, 8, 0));
    let config = SimulatorConfig {
        simulation: SimulationConfig {
            seed_key: "overlap".to_string(),
            interval_secs: 3_600,
            ..SimulationConfig::default()
        },
        ..SimulatorConfig::default()
    };
    let sim = Arc::new(Simulation::new(MemoryStore::new(), Arc::new(clock.clone()), config).unwrap());
    sim.seed_population(4, 1).unwrap();
    let account_ids: Vec<String> = sim
        .store()
        .list_accounts(&|_: &Account| true)
        .unwrap()
        .iter()
        .map(|a| a.id().to_string())
        .collect();

    let cycles = {
        let sim = Arc::clone(&sim);
        thread::spawn(move || {
            for _ in 0..12 {
                sim.run_cycle().unwrap();
                clock.advance(Duration::hours(1));
            }
        })
    };
    let callers: Vec<_> = (0..3)
        .map(|caller| {
            let sim = Arc::clone(&sim);
            let account_id = account_ids[caller % account_ids.len()].clone();
            thread::spawn(move || {
                for i in 0..300 {
                    let meta = TransactionMetadata::new(Category::Transfer);
                    let request = if i % 2 == 0 {
                        NewTransaction::credit(&account_id, 25, meta)
                    } else {
                        NewTransaction::debit(&account_id, 25, meta)
                    };
                    // Refusals (frozen account, limits) and lost races are fine here
                    if let Ok(tx) = sim.create_transaction(request) {
                        let _ = sim.cancel_transaction(tx.id(), "caller");
                    }
                }
            })
        })
        .collect();

    cycles.join().unwrap();
    for caller in callers {
        caller.join().unwrap();
    }
    assert_no_drift(sim.store());
}
