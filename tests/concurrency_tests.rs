//! Concurrent acquisition and ledger invariants.

use genus::scenario::contend;
use genus::{CapacityRegistry, Pid, ProcessTable, RegistryConfig};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

fn fresh_table() -> ProcessTable {
    ProcessTable::new(CapacityRegistry::shared(RegistryConfig::default()).unwrap())
}

fn spawn_many(table: &ProcessTable, count: usize) -> Vec<Pid> {
    (0..count)
        .map(|_| table.fork(table.init_pid()).expect("fork"))
        .collect()
}

#[test]
fn test_three_concurrent_thirties_fill_the_pool() {
    for _ in 0..20 {
        let table = fresh_table();
        let holders = spawn_many(&table, 3);

        let results = contend(&table, &holders, 30).unwrap();
        assert!(results.iter().all(|(_, r)| *r >= 0), "{results:?}");
        assert_eq!(table.registry().total_reserved(), 90);

        let late = spawn_many(&table, 2);
        let results = contend(&table, &late, 1).unwrap();
        assert!(results.iter().all(|(_, r)| *r == -1), "{results:?}");
    }
}

#[test]
fn test_oversubscribed_burst_never_overshoots() {
    for _ in 0..20 {
        let table = fresh_table();
        let contenders = spawn_many(&table, 4);
        let amounts = [30, 30, 30, 1];

        let barrier = std::sync::Barrier::new(contenders.len());
        let results: Vec<i64> = crossbeam::scope(|s| {
            let handles: Vec<_> = contenders
                .iter()
                .zip(amounts)
                .map(|(&pid, amount)| {
                    let table = &table;
                    let barrier = &barrier;
                    s.spawn(move |_| {
                        barrier.wait();
                        table.setgenus(pid, amount)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
        .unwrap();

        let rejected = results.iter().filter(|r| **r == -1).count();
        assert_eq!(rejected, 1, "{results:?}");
        let snapshot = table.registry().snapshot();
        assert!(snapshot.is_consistent());
        assert!(snapshot.total_reserved == 90 || snapshot.total_reserved == 61);
    }
}

#[test]
fn test_accepted_ids_are_distinct_and_dense() {
    let table = fresh_table();
    let contenders = spawn_many(&table, 40);

    let results = contend(&table, &contenders, 2).unwrap();
    let mut ids: Vec<i64> = results.iter().map(|(_, r)| *r).collect();
    ids.sort();

    // 40 * 2 = 80 fits, so everyone wins and ids form one contiguous run.
    assert_eq!(ids, (1..=40).collect::<Vec<i64>>());
}

#[test]
fn test_churn_keeps_ledger_consistent() {
    let table = fresh_table();
    let workers = spawn_many(&table, 6);
    let stop = AtomicBool::new(false);

    crossbeam::scope(|s| {
        let monitor = s.spawn(|_| {
            let mut observations = 0usize;
            loop {
                let snapshot = table.registry().snapshot();
                assert!(snapshot.is_consistent(), "{snapshot:?}");
                observations += 1;
                if stop.load(Ordering::Acquire) {
                    return observations;
                }
            }
        });

        let handles: Vec<_> = workers
            .iter()
            .enumerate()
            .map(|(i, &worker)| {
                let table = &table;
                s.spawn(move |_| {
                    for round in 0..200 {
                        let child = table.fork(worker).unwrap();
                        let amount = ((i + round) % 25 + 1) as i64;
                        table.setgenus(child, amount);
                        if round % 3 == 0 {
                            table.exec(child, "next").unwrap();
                        }
                        table.exit(child).unwrap();
                        table.try_wait(worker).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        stop.store(true, Ordering::Release);
        assert!(monitor.join().unwrap() > 0);
    })
    .unwrap();

    assert_eq!(table.registry().total_reserved(), 0);
    assert_eq!(table.registry().live_entries(), 0);
}

#[derive(Debug, Clone)]
enum Op {
    Fork(usize),
    Acquire(usize, i64),
    Exec(usize),
    Exit(usize),
    Wait(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..64).prop_map(Op::Fork),
        ((0usize..64), -5i64..100).prop_map(|(i, amount)| Op::Acquire(i, amount)),
        (0usize..64).prop_map(Op::Exec),
        (0usize..64).prop_map(Op::Exit),
        (0usize..64).prop_map(Op::Wait),
    ]
}

proptest! {
    #[test]
    fn prop_ledger_matches_owner_views(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let table = fresh_table();
        let mut known = vec![table.init_pid()];
        let mut acquired = HashSet::new();

        for op in ops {
            match op {
                Op::Fork(i) => {
                    if let Ok(child) = table.fork(known[i % known.len()]) {
                        known.push(child);
                    }
                }
                Op::Acquire(i, amount) => {
                    let pid = known[i % known.len()];
                    if table.setgenus(pid, amount) >= 0 {
                        // One successful acquisition per process, exec or not.
                        prop_assert!(acquired.insert(pid), "{} acquired twice", pid);
                    }
                }
                Op::Exec(i) => {
                    let _ = table.exec(known[i % known.len()], "image");
                }
                Op::Exit(i) => {
                    let _ = table.exit(known[i % known.len()]);
                }
                Op::Wait(i) => {
                    let _ = table.try_wait(known[i % known.len()]);
                }
            }

            let snapshot = table.registry().snapshot();
            prop_assert!(snapshot.is_consistent());
            prop_assert!(snapshot.total_reserved <= 90);

            // Every live entry belongs to a process still in the table whose
            // own view names that entry.
            for entry in &snapshot.entries {
                let view = table.view(entry.owner);
                prop_assert!(view.is_ok());
                prop_assert_eq!(view.unwrap().genus(), Some(entry.id));
            }
        }
    }
}
