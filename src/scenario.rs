//! Scenario harness
//!
//! End-to-end walkthroughs of the genus lifecycle against a fresh registry
//! and process table: inheritance, exec, zombies, kills and concurrent
//! acquisition near the budget ceiling. Each scenario returns a report of
//! named checks instead of panicking, so the CLI can print every result.

use crate::config::{RegistryConfig, MAX_TOTAL_CAPACITY};
use crate::core::models::{Pid, RegistrySnapshot};
use crate::process_table::ProcessTable;
use crate::registry::CapacityRegistry;
use anyhow::{anyhow, bail, Result};
use crossbeam::channel::unbounded;
use serde::Serialize;
use std::sync::Barrier;

pub const SCENARIOS: &[&str] = &[
    "simple",
    "invalid-inputs",
    "boundary-values",
    "capacity-accounting",
    "nested-inheritance",
    "exec",
    "race",
    "killed",
    "zombie",
    "id-assignment",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub label: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub checks: Vec<Check>,
}

impl ScenarioReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            checks: Vec::new(),
        }
    }

    fn check(&mut self, label: impl Into<String>, passed: bool, detail: impl Into<String>) {
        self.checks.push(Check {
            label: label.into(),
            passed,
            detail: detail.into(),
        });
    }

    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|check| !check.passed)
    }
}

/// Run one named scenario at the default budget.
pub fn run(name: &str) -> Result<ScenarioReport> {
    let table = ProcessTable::new(CapacityRegistry::shared(RegistryConfig::default())?);
    let mut report = ScenarioReport::new(name);

    match name {
        "simple" => simple(&table, &mut report)?,
        "invalid-inputs" => invalid_inputs(&table, &mut report)?,
        "boundary-values" => boundary_values(&table, &mut report)?,
        "capacity-accounting" => capacity_accounting(&table, &mut report)?,
        "nested-inheritance" => nested_inheritance(&table, &mut report)?,
        "exec" => exec(&table, &mut report)?,
        "race" => race(&table, &mut report)?,
        "killed" => killed(&table, &mut report)?,
        "zombie" => zombie(&table, &mut report)?,
        "id-assignment" => id_assignment(&table, &mut report)?,
        other => bail!("unknown scenario: {other}"),
    }

    let snapshot = table.registry().snapshot();
    report.check(
        "ledger consistent",
        snapshot.is_consistent(),
        format!("reserved {}/{}", snapshot.total_reserved, snapshot.total_budget),
    );
    Ok(report)
}

pub fn run_all() -> Result<Vec<ScenarioReport>> {
    SCENARIOS.iter().map(|name| run(name)).collect()
}

/// Let every pid in `contenders` call `setgenus(capacity)` at the same moment.
///
/// Returns `(pid, result)` pairs sorted by pid.
pub fn contend(table: &ProcessTable, contenders: &[Pid], capacity: i64) -> Result<Vec<(Pid, i64)>> {
    let barrier = Barrier::new(contenders.len());
    let (tx, rx) = unbounded();

    crossbeam::scope(|s| {
        for &pid in contenders {
            let tx = tx.clone();
            let barrier = &barrier;
            s.spawn(move |_| {
                barrier.wait();
                let result = table.setgenus(pid, capacity);
                let _ = tx.send((pid, result));
            });
        }
    })
    .map_err(|_| anyhow!("contender thread panicked"))?;
    drop(tx);

    let mut results: Vec<(Pid, i64)> = rx.iter().collect();
    results.sort_by_key(|(pid, _)| *pid);
    Ok(results)
}

fn simple(table: &ProcessTable, report: &mut ScenarioReport) -> Result<()> {
    let init = table.init_pid();
    let p = table.fork(init)?;

    report.check(
        "initial genus is -1",
        table.getgenus(p) == -1 && table.getcapacity(p) == -1,
        format!("({}, {})", table.getgenus(p), table.getcapacity(p)),
    );

    let gid = table.setgenus(p, 40);
    report.check("setgenus(40) succeeds", gid >= 0, format!("id {gid}"));
    report.check(
        "view stamped",
        table.getgenus(p) == gid && table.getcapacity(p) == 40,
        format!("({}, {})", table.getgenus(p), table.getcapacity(p)),
    );
    report.check(
        "second setgenus fails",
        table.setgenus(p, 10) == -1,
        "setgenus(10)",
    );

    let child = table.fork(p)?;
    report.check(
        "child inherits genus",
        table.getgenus(child) == gid && table.getcapacity(child) == 40,
        format!("({}, {})", table.getgenus(child), table.getcapacity(child)),
    );
    table.exit(child)?;
    table.try_wait(p)?;
    report.check(
        "parent keeps genus after child reaped",
        table.getgenus(p) == gid,
        format!("genus {}", table.getgenus(p)),
    );

    let child = table.fork(p)?;
    report.check(
        "inherited child cannot setgenus",
        table.setgenus(child, 20) == -1,
        "setgenus(20)",
    );
    table.exit(child)?;
    table.try_wait(p)?;
    report.check(
        "reservation unchanged",
        table.registry().total_reserved() == 40,
        format!("reserved {}", table.registry().total_reserved()),
    );

    table.exit(p)?;
    table.try_wait(init)?;
    report.check(
        "owner reap frees pool",
        table.registry().total_reserved() == 0,
        format!("reserved {}", table.registry().total_reserved()),
    );
    Ok(())
}

fn invalid_inputs(table: &ProcessTable, report: &mut ScenarioReport) -> Result<()> {
    let p = table.fork(table.init_pid())?;
    for amount in [-10, 0, 100, i64::from(MAX_TOTAL_CAPACITY) + 1] {
        let result = table.setgenus(p, amount);
        report.check(
            format!("setgenus({amount}) rejected"),
            result == -1,
            format!("= {result}"),
        );
    }
    report.check(
        "view still empty",
        table.getgenus(p) == -1,
        format!("genus {}", table.getgenus(p)),
    );
    Ok(())
}

fn boundary_values(table: &ProcessTable, report: &mut ScenarioReport) -> Result<()> {
    let init = table.init_pid();
    for amount in [1, i64::from(MAX_TOTAL_CAPACITY)] {
        let child = table.fork(init)?;
        let result = table.setgenus(child, amount);
        report.check(
            format!("setgenus({amount}) accepted"),
            result >= 0 && table.getcapacity(child) == amount,
            format!("id {result}, capacity {}", table.getcapacity(child)),
        );
        table.exit(child)?;
        table.try_wait(init)?;
    }
    report.check(
        "pool empty after reaps",
        table.registry().total_reserved() == 0,
        format!("reserved {}", table.registry().total_reserved()),
    );
    Ok(())
}

fn capacity_accounting(table: &ProcessTable, report: &mut ScenarioReport) -> Result<()> {
    let init = table.init_pid();

    for round in 0..5 {
        let child = table.fork(init)?;
        let result = table.setgenus(child, 20);
        table.exit(child)?;
        table.try_wait(init)?;
        report.check(
            format!("round {round}: setgenus(20) accepted"),
            result >= 0,
            format!("id {result}"),
        );
    }

    let holders = (0..3)
        .map(|_| table.fork(init))
        .collect::<Result<Vec<_>, _>>()?;
    let results = contend(table, &holders, 30)?;
    report.check(
        "three concurrent setgenus(30) accepted",
        results.iter().all(|(_, result)| *result >= 0),
        format!("{results:?}"),
    );
    report.check(
        "pool full",
        table.registry().total_reserved() == MAX_TOTAL_CAPACITY,
        format!("reserved {}", table.registry().total_reserved()),
    );

    let late = table.fork(init)?;
    report.check(
        "fourth request rejected",
        table.setgenus(late, 1) == -1,
        "setgenus(1)",
    );
    table.exit(late)?;

    for pid in &holders {
        table.kill(*pid)?;
    }
    table.reap_zombies(init)?;
    report.check(
        "kills and reaps free the pool",
        table.registry().total_reserved() == 0,
        format!("reserved {}", table.registry().total_reserved()),
    );
    Ok(())
}

fn nested_inheritance(table: &ProcessTable, report: &mut ScenarioReport) -> Result<()> {
    let init = table.init_pid();
    let p = table.fork(init)?;
    let gid = table.setgenus(p, 25);

    let mut chain = vec![p];
    for depth in 1..=3 {
        let parent = chain[chain.len() - 1];
        let child = table.fork(parent)?;
        report.check(
            format!("level {depth} inherits genus"),
            table.getgenus(child) == gid,
            format!("genus {}", table.getgenus(child)),
        );
        chain.push(child);
    }

    let deepest = chain[chain.len() - 1];
    report.check(
        "great-grandchild cannot setgenus",
        table.setgenus(deepest, 10) == -1,
        "setgenus(10)",
    );

    for pair in chain.windows(2).rev() {
        table.exit(pair[1])?;
        table.try_wait(pair[0])?;
    }
    report.check(
        "descendant reaps keep reservation",
        table.registry().total_reserved() == 25,
        format!("reserved {}", table.registry().total_reserved()),
    );

    table.exit(p)?;
    table.try_wait(init)?;
    report.check(
        "owner reap frees reservation",
        table.registry().total_reserved() == 0,
        format!("reserved {}", table.registry().total_reserved()),
    );
    Ok(())
}

fn exec(table: &ProcessTable, report: &mut ScenarioReport) -> Result<()> {
    let init = table.init_pid();

    let owner = table.fork(init)?;
    table.setgenus(owner, 15);
    let outcome = table.exec(owner, "cat")?;
    report.check(
        "owner exec releases capacity",
        outcome.released_capacity() == 15 && table.registry().total_reserved() == 0,
        format!("{outcome:?}"),
    );
    report.check(
        "owner view reset by exec",
        table.getgenus(owner) == -1,
        format!("genus {}", table.getgenus(owner)),
    );
    let again = table.setgenus(owner, 15);
    report.check(
        "owner cannot acquire again after exec",
        again == -1 && table.registry().total_reserved() == 0,
        format!("setgenus {again}, reserved {}", table.registry().total_reserved()),
    );
    table.exit(owner)?;
    table.try_wait(init)?;

    let p = table.fork(init)?;
    let gid = table.setgenus(p, 20);
    let heir = table.fork(p)?;
    let outcome = table.exec(heir, "cat")?;
    report.check(
        "inherited exec keeps capacity",
        outcome.released_capacity() == 0 && table.registry().total_reserved() == 20,
        format!("{outcome:?}"),
    );
    table.exit(heir)?;
    table.try_wait(p)?;
    report.check(
        "parent genus intact",
        table.getgenus(p) == gid,
        format!("genus {}", table.getgenus(p)),
    );
    Ok(())
}

fn race(table: &ProcessTable, report: &mut ScenarioReport) -> Result<()> {
    let init = table.init_pid();

    let prefill = (0..7)
        .map(|_| table.fork(init))
        .collect::<Result<Vec<_>, _>>()?;
    let filled = contend(table, &prefill, 10)?;
    report.check(
        "prefill to 70",
        filled.iter().all(|(_, r)| *r >= 0) && table.registry().total_reserved() == 70,
        format!("reserved {}", table.registry().total_reserved()),
    );

    let contenders = (0..10)
        .map(|_| table.fork(init))
        .collect::<Result<Vec<_>, _>>()?;
    let results = contend(table, &contenders, 5)?;
    let mut accepted: Vec<i64> = results
        .iter()
        .map(|(_, r)| *r)
        .filter(|r| *r >= 0)
        .collect();
    accepted.sort();
    accepted.dedup();

    report.check(
        "exactly four of ten accepted",
        accepted.len() == 4,
        format!("accepted ids {accepted:?}"),
    );
    report.check(
        "pool exactly full",
        table.registry().total_reserved() == MAX_TOTAL_CAPACITY,
        format!("reserved {}", table.registry().total_reserved()),
    );

    for pid in prefill.iter().chain(contenders.iter()) {
        table.kill(*pid)?;
    }
    let reaped = table.reap_zombies(init)?;
    report.check(
        "all seventeen reaped, pool empty",
        reaped.len() == 17 && table.registry().total_reserved() == 0,
        format!("reaped {}, reserved {}", reaped.len(), table.registry().total_reserved()),
    );
    Ok(())
}

fn killed(table: &ProcessTable, report: &mut ScenarioReport) -> Result<()> {
    let init = table.init_pid();

    let victim = table.fork(init)?;
    let result = table.setgenus(victim, 30);
    report.check("victim setgenus(30)", result >= 0, format!("id {result}"));

    table.kill(victim)?;
    let reaped = table
        .try_wait(init)?
        .ok_or_else(|| anyhow!("killed child was not reaped"))?;
    report.check(
        "killed owner released on reap",
        reaped.killed && reaped.released == 30,
        format!("{reaped:?}"),
    );

    let next = table.fork(init)?;
    let result = table.setgenus(next, 30);
    report.check(
        "capacity reusable after kill",
        result >= 0,
        format!("id {result}"),
    );
    Ok(())
}

fn zombie(table: &ProcessTable, report: &mut ScenarioReport) -> Result<()> {
    let caps = table.capabilities();
    report.check(
        "host separates reap from exit",
        caps.deferred_reap,
        format!("{caps:?}"),
    );
    if !caps.deferred_reap {
        return Ok(());
    }

    let p = table.fork(table.init_pid())?;
    let child = table.fork(p)?;
    table.setgenus(child, 40);
    table.exit(child)?;

    let while_zombie = table.setgenus(p, 60);
    report.check(
        "zombie holds its capacity",
        while_zombie == -1,
        format!("setgenus(60) = {while_zombie}"),
    );

    table.try_wait(p)?;
    let after_reap = table.setgenus(p, 60);
    report.check(
        "capacity released after reap",
        after_reap >= 0,
        format!("setgenus(60) = {after_reap}"),
    );
    Ok(())
}

fn id_assignment(table: &ProcessTable, report: &mut ScenarioReport) -> Result<()> {
    let init = table.init_pid();
    let mut ids = Vec::new();
    for _ in 0..10 {
        let child = table.fork(init)?;
        ids.push(table.setgenus(child, 5));
        table.exit(child)?;
        table.try_wait(init)?;
    }
    report.check(
        "ids unique and incrementing",
        ids.windows(2).all(|w| w[1] == w[0] + 1) && ids[0] >= 0,
        format!("{ids:?}"),
    );
    Ok(())
}

/// Parameters for a stress run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StressPlan {
    pub prefill: usize,
    pub prefill_capacity: i64,
    pub contenders: usize,
    pub capacity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub plan: StressPlan,
    pub accepted: usize,
    pub rejected: usize,
    pub snapshot: RegistrySnapshot,
}

/// Prefill part of the budget, then let a batch of processes race for the rest.
pub fn stress(config: RegistryConfig, plan: StressPlan) -> Result<StressReport> {
    let table = ProcessTable::new(CapacityRegistry::shared(config)?);
    let init = table.init_pid();

    let holders = (0..plan.prefill)
        .map(|_| table.fork(init))
        .collect::<Result<Vec<_>, _>>()?;
    contend(&table, &holders, plan.prefill_capacity)?;

    let contenders = (0..plan.contenders)
        .map(|_| table.fork(init))
        .collect::<Result<Vec<_>, _>>()?;
    let results = contend(&table, &contenders, plan.capacity)?;
    let accepted = results.iter().filter(|(_, r)| *r >= 0).count();

    let snapshot = table.registry().snapshot();
    if !snapshot.is_consistent() {
        bail!("ledger inconsistent after stress run: {snapshot:?}");
    }

    Ok(StressReport {
        plan,
        accepted,
        rejected: results.len() - accepted,
        snapshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_scenario_passes() {
        for report in run_all().unwrap() {
            let failures: Vec<_> = report.failures().collect();
            assert!(failures.is_empty(), "{}: {:?}", report.name, failures);
        }
    }

    #[test]
    fn test_unknown_scenario_is_an_error() {
        assert!(run("does-not-exist").is_err());
    }

    #[test]
    fn test_stress_respects_budget() {
        let report = stress(
            RegistryConfig::default(),
            StressPlan {
                prefill: 7,
                prefill_capacity: 10,
                contenders: 10,
                capacity: 5,
            },
        )
        .unwrap();

        assert_eq!(report.accepted, 4);
        assert_eq!(report.rejected, 6);
        assert_eq!(report.snapshot.total_reserved, 90);
    }
}
