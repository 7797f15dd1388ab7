// Copyright © 2026 Pathway

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;

use traverse_engine::engine::computer::{JobStage, Memory};
use traverse_engine::engine::side_effects::MergeOperator;
use traverse_engine::engine::step::{StepBase, StepContext, Upstream};
use traverse_engine::engine::{
    Error, GraphComputer, JobDescriptor, Partitioning, Result, Step, StepId, Traversal,
    TraversalSideEffects, Traverser, Value,
};

use super::helpers::{fast_config, frequencies, letters, map_of, modern_graph, string};

fn seeds(values: &[Value], partitions: usize) -> Partitioning {
    let mut split = vec![Vec::new(); partitions];
    for (i, value) in values.iter().enumerate() {
        split[i % partitions].push(value.clone());
    }
    Partitioning::Seeds(split)
}

fn computer(partitioning: Partitioning) -> eyre::Result<GraphComputer> {
    Ok(GraphComputer::new(fast_config()).with_partitioning(partitioning)?)
}

fn max_by_constant_key() -> eyre::Result<Traversal> {
    Ok(Traversal::new()
        .group("g")?
        .by(Traversal::new().map(|_| Ok(string("k")))?)?
        .by(Traversal::new())?
        .by(Traversal::new().unfold()?.max()?)?)
}

#[test]
fn test_group_count_matches_local_run() -> eyre::Result<()> {
    let values = letters(1000);
    let traversal = Traversal::new().group_count("c")?;

    let mut local = traversal.clone();
    local.add_starts(values.clone());
    local.iterate()?;

    let result = computer(seeds(&values, 7))?.submit(&traversal)?;
    assert_eq!(result.side_effects.get("c")?, local.side_effect("c")?);
    assert_eq!(result.side_effects.get("c")?, frequencies(&values));
    assert_eq!(result.memory.get("c"), Some(&frequencies(&values)));
    let total: u64 = result.halted.iter().map(|traverser| traverser.bulk()).sum();
    assert_eq!(total, 1000);
    Ok(())
}

#[test]
fn test_group_reduce_runs_once_per_key() -> eyre::Result<()> {
    let traversal = max_by_constant_key()?;
    let partitioning = Partitioning::Seeds(vec![
        vec![Value::Int(1)],
        vec![Value::Int(5), Value::Int(3)],
    ]);
    let result = computer(partitioning)?.submit(&traversal)?;
    let expected = map_of([(string("k"), Value::Int(5))]);
    assert_eq!(result.side_effects.get("g")?, expected);

    let mut local = traversal.clone();
    local.add_starts([1, 5, 3].map(Value::Int));
    local.iterate()?;
    assert_eq!(local.side_effect("g")?, expected);
    Ok(())
}

#[test]
fn test_group_without_reduce_merges_bags() -> eyre::Result<()> {
    let traversal = Traversal::new().group("g")?;
    let partitioning = Partitioning::Seeds(vec![
        vec![string("a"), string("b")],
        vec![string("a")],
        vec![],
    ]);
    let result = computer(partitioning)?.submit(&traversal)?;
    let groups = result.side_effects.get("g")?;
    assert_eq!(groups.as_map()?[&string("a")].as_bag()?.get(&string("a")), 2);
    assert_eq!(groups.as_map()?[&string("b")].as_bag()?.total(), 1);
    Ok(())
}

#[test]
fn test_graph_partitions_match_local_run() -> eyre::Result<()> {
    let modern = modern_graph()?;
    let traversal = Traversal::new()
        .with_graph(modern.graph.clone())
        .v([])?
        .out(&[])?
        .group_count("names")?
        .by(Traversal::new().values("name")?)?;

    let mut local = traversal.clone();
    local.iterate()?;

    for partitions in [1, 2, 3, 8] {
        let result = computer(Partitioning::Graph { partitions })?.submit(&traversal)?;
        assert_eq!(result.side_effects.get("names")?, local.side_effect("names")?);
    }
    assert_eq!(
        local.side_effect("names")?,
        map_of([
            (string("josh"), Value::Int(1)),
            (string("lop"), Value::Int(3)),
            (string("ripple"), Value::Int(1)),
            (string("vadas"), Value::Int(1)),
        ])
    );
    Ok(())
}

#[test]
fn test_halted_results_from_every_partition() -> eyre::Result<()> {
    let modern = modern_graph()?;
    let traversal = Traversal::new().with_graph(modern.graph.clone()).v([])?;
    let result = computer(Partitioning::Graph { partitions: 3 })?.submit(&traversal)?;

    let mut ids: Vec<u64> = result
        .halted
        .iter()
        .map(|traverser| -> eyre::Result<u64> {
            Ok(traverser.get().as_element()?.reference().id)
        })
        .collect::<eyre::Result<_>>()?;
    ids.sort_unstable();
    assert_eq!(ids.len(), modern.graph.vertex_count());
    ids.dedup();
    assert_eq!(ids.len(), modern.graph.vertex_count());
    for traverser in &result.halted {
        assert!(traverser.get().as_element()?.is_reference());
    }
    Ok(())
}

#[test]
fn test_submit_leaves_the_traversal_untouched() -> eyre::Result<()> {
    let traversal = Traversal::new().group_count("c")?;
    computer(seeds(&letters(10), 2))?.submit(&traversal)?;
    assert!(!traversal.is_locked());
    assert_eq!(traversal.side_effect("c")?, Value::empty_map());
    assert_eq!(traversal.steps().len(), 1);
    Ok(())
}

#[test]
fn test_failed_partition_is_rerun() -> eyre::Result<()> {
    let values = letters(100);
    let failed = Arc::new(AtomicBool::new(false));
    let traversal = Traversal::new()
        .map({
            let failed = failed.clone();
            move |t| {
                if t.get() == &string("b") && !failed.swap(true, Ordering::SeqCst) {
                    return Err("worker lost".into());
                }
                Ok(t.get().clone())
            }
        })?
        .group_count("c")?;

    let result = computer(seeds(&values, 4))?.submit(&traversal)?;
    assert!(failed.load(Ordering::SeqCst));
    assert_eq!(result.side_effects.get("c")?, frequencies(&values));
    Ok(())
}

#[test]
fn test_partition_failure_after_retries() -> eyre::Result<()> {
    let attempts = Arc::new(AtomicUsize::new(0));
    let traversal = Traversal::new()
        .map({
            let attempts = attempts.clone();
            move |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("always broken".into())
            }
        })?
        .group_count("c")?;
    let config = fast_config().with_retries(2, 0);
    let computer = GraphComputer::new(config)
        .with_partitioning(Partitioning::Seeds(vec![vec![Value::Int(1)]]))?;

    assert_matches!(
        computer.submit(&traversal),
        Err(Error::PartitionFailed {
            partition: 0,
            attempts: 3,
            ..
        })
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn test_failed_reduce_is_rerun() -> eyre::Result<()> {
    let failed = Arc::new(AtomicBool::new(false));
    let reduce = Traversal::new().map({
        let failed = failed.clone();
        move |t| {
            if !failed.swap(true, Ordering::SeqCst) {
                return Err("reducer lost".into());
            }
            Ok(Value::Int(i64::try_from(t.get().as_bag()?.total())?))
        }
    })?;
    let traversal = Traversal::new()
        .group("g")?
        .by(Traversal::new())?
        .by(Traversal::new())?
        .by(reduce)?;

    let values = letters(30);
    let result = computer(seeds(&values, 3))?.submit(&traversal)?;
    assert!(failed.load(Ordering::SeqCst));
    assert_eq!(result.side_effects.get("g")?, frequencies(&values));
    Ok(())
}

#[test]
fn test_reduce_failure_after_retries() -> eyre::Result<()> {
    let traversal = Traversal::new()
        .group("g")?
        .by(Traversal::new())?
        .by(Traversal::new())?
        .by(Traversal::new().map(|_| Err("always broken".into()))?)?;
    let config = fast_config().with_retries(0, 1);
    let computer = GraphComputer::new(config)
        .with_partitioning(Partitioning::Seeds(vec![vec![string("a")]]))?;
    assert_matches!(
        computer.submit(&traversal),
        Err(Error::ReduceFailed { attempts: 2, key, .. }) if key == string("a")
    );
    Ok(())
}

#[test]
fn test_computer_rejects_unsupported_traversals() -> eyre::Result<()> {
    let traversal = Traversal::new().count()?;
    assert_matches!(
        computer(seeds(&[Value::Int(1)], 1))?.submit(&traversal),
        Err(Error::InvalidStepConfiguration(_))
    );

    let mut locked = Traversal::new().group_count("c")?;
    locked.apply_strategies()?;
    assert_matches!(
        computer(seeds(&[Value::Int(1)], 1))?.submit(&locked),
        Err(Error::TraversalLocked)
    );

    assert_matches!(
        GraphComputer::new(fast_config()).with_partitioning(Partitioning::Seeds(vec![])),
        Err(Error::InvalidStepConfiguration(_))
    );
    Ok(())
}

/// Adds up the integers it sees into the `total` side effect.
#[derive(Debug, Clone, Default)]
struct TotalStep {
    base: StepBase,
}

impl Step for TotalStep {
    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "total"
    }

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.next(ctx)? else {
            return Ok(None);
        };
        let bulk = i64::try_from(traverser.bulk()).unwrap_or(i64::MAX);
        let total = ctx.side_effects.get_mut("total")?;
        *total = Value::Int(total.as_int()? + traverser.get().as_int()? * bulk);
        Ok(Some(traverser))
    }

    fn box_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn register_side_effects(&self, side_effects: &mut TraversalSideEffects) {
        side_effects.register_supplier_if_absent("total", Arc::new(|| Value::Int(0)));
        side_effects.register_merge(
            "total",
            MergeOperator::new(
                |accumulator, value| Ok(Value::Int(accumulator.as_int()? + value.as_int()?)),
                true,
                false,
            ),
        );
    }
}

#[test]
fn test_unclaimed_side_effects_are_merged() -> eyre::Result<()> {
    let traversal = Traversal::new().add_step(Box::new(TotalStep::default()))?;
    let values = [1, 2, 3, 4, 5].map(Value::Int);
    let result = computer(seeds(&values, 3))?.submit(&traversal)?;
    assert_eq!(result.side_effects.get("total")?, Value::Int(15));
    assert_eq!(result.memory.get("total"), Some(&Value::Int(15)));
    Ok(())
}

#[test]
fn test_job_descriptor() -> eyre::Result<()> {
    let traversal = Traversal::new()
        .inject([Value::Int(1)])?
        .group_count("c")?
        .by(Traversal::new().identity()?.as_("x")?)?
        .group("g")?;

    let Some(job) = traversal.steps()[1].map_reduce() else {
        eyre::bail!("groupCount has a map-reduce job");
    };
    let descriptor = job.job_id();
    assert_eq!(descriptor, JobDescriptor::new(StepId::new("1"), "c".into()));
    assert_eq!(descriptor.to_string(), "1[c]");

    let restored = JobDescriptor::from_json(&descriptor.to_json()?)?;
    assert_eq!(restored, descriptor);
    let loaded = restored.load(&traversal)?;
    assert_eq!(loaded.memory_key().as_str(), "c");
    assert_eq!(loaded.job_id(), descriptor);

    let group = JobDescriptor::new(StepId::new("2"), "g".into()).load(&traversal)?;
    assert_eq!(group.memory_key().as_str(), "g");

    assert_matches!(
        JobDescriptor::new(StepId::new("1"), "g".into()).load(&traversal),
        Err(Error::JobNotFound(_))
    );
    assert_matches!(
        JobDescriptor::new(StepId::new("1.0.0"), "c".into()).load(&traversal),
        Err(Error::JobNotFound(_))
    );
    assert_matches!(
        JobDescriptor::from_json("{\"step\": 1}"),
        Err(Error::MalformedDescriptor(_))
    );
    Ok(())
}

#[test]
fn test_memory() -> eyre::Result<()> {
    let mut memory = Memory::new();
    assert_matches!(memory.add("n", Value::Int(1)), Err(_));

    memory.register(
        "n",
        MergeOperator::new(
            |accumulator, value| Ok(Value::Int(accumulator.as_int()? + value.as_int()?)),
            true,
            false,
        ),
    );
    memory.add("n", Value::Int(1))?;
    memory.add("n", Value::Int(2))?;
    assert_eq!(memory.get("n"), Some(&Value::Int(3)));

    memory.set("n", Value::Int(10));
    assert_eq!(memory.get("n"), Some(&Value::Int(10)));
    assert!(memory.contains("n"));
    assert_eq!(memory.len(), 1);
    Ok(())
}

#[test]
fn test_job_stages() {
    assert_eq!(JobStage::Map.next(true), JobStage::Combine);
    assert_eq!(JobStage::Map.next(false), JobStage::Reduce);
    assert_eq!(JobStage::Combine.next(true), JobStage::Reduce);
    assert_eq!(JobStage::Reduce.next(true), JobStage::Finalize);
    assert_eq!(JobStage::Finalize.next(false), JobStage::Done);
    assert_eq!(JobStage::Done.next(true), JobStage::Done);
}
