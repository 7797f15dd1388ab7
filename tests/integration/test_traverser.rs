// Copyright © 2026 Pathway

use assert_matches::assert_matches;

use traverse_engine::engine::traverser::PathCache;
use traverse_engine::engine::{
    BulkSet, Error, Future, GraphProvider, Requirements, StepId, Traversal, Traverser,
    TraverserGenerator, TraverserSet, Value,
};

use super::helpers::{modern_graph, string};

fn generate(generator: &TraverserGenerator, value: Value, cache: &mut PathCache) -> Traverser {
    generator.generate(value, Future::Halt, &[], 1, None, cache)
}

#[test]
fn test_merge_adds_bulk() -> eyre::Result<()> {
    let generator = TraverserGenerator::new(Requirements::BULK, true);
    let mut cache = PathCache::new();
    let mut first = generate(&generator, string("a"), &mut cache);
    let mut second = generate(&generator, string("a"), &mut cache);
    second.set_bulk(4);

    first.merge(&second)?;
    assert_eq!(first.bulk(), 5);
    assert_eq!(first.get(), &string("a"));
    Ok(())
}

#[test]
fn test_bulk_saturates() -> eyre::Result<()> {
    let generator = TraverserGenerator::new(Requirements::BULK, true);
    let mut cache = PathCache::new();
    let mut huge = generate(&generator, string("a"), &mut cache);
    huge.set_bulk(u64::MAX);
    let one = generate(&generator, string("a"), &mut cache);
    huge.merge(&one)?;
    assert_eq!(huge.bulk(), u64::MAX);

    let mut set = TraverserSet::new();
    set.add(huge);
    set.add(one.clone());
    set.add(generate(&generator, string("b"), &mut cache));
    assert_eq!(set.len(), 2);
    assert_eq!(set.total_bulk(), u64::MAX);

    let mut bag = BulkSet::new();
    bag.add(string("a"), u64::MAX);
    bag.add(string("a"), 1);
    bag.add(string("b"), 1);
    assert_eq!(bag.get(&string("a")), u64::MAX);
    assert_eq!(bag.total(), u64::MAX);
    Ok(())
}

#[test]
fn test_merge_rejects_different_traversers() -> eyre::Result<()> {
    let generator = TraverserGenerator::new(Requirements::BULK, true);
    let mut cache = PathCache::new();
    let mut first = generate(&generator, string("a"), &mut cache);

    let other_value = generate(&generator, string("b"), &mut cache);
    assert_matches!(first.merge(&other_value), Err(Error::IncompatibleMerge));

    let mut other_loops = generate(&generator, string("a"), &mut cache);
    other_loops.incr_loops();
    assert_matches!(first.merge(&other_loops), Err(Error::IncompatibleMerge));

    let mut other_future = generate(&generator, string("a"), &mut cache);
    other_future.set_future(Future::Step(StepId::new("3")));
    assert_matches!(first.merge(&other_future), Err(Error::IncompatibleMerge));

    assert_eq!(first.bulk(), 1);
    Ok(())
}

#[test]
fn test_merge_ignores_path() -> eyre::Result<()> {
    let generator = TraverserGenerator::new(Requirements::PATH, true);
    let mut cache = PathCache::new();
    let from_x = generate(&generator, string("x"), &mut cache);
    let from_y = generate(&generator, string("y"), &mut cache);
    let mut first = from_x.split(string("z"), &[], &mut cache);
    let second = from_y.split(string("z"), &[], &mut cache);
    assert_ne!(first.path()?, second.path()?);

    first.merge(&second)?;
    assert_eq!(first.bulk(), 2);
    assert_eq!(first.path()?.objects(), vec![string("x"), string("z")]);
    Ok(())
}

#[test]
fn test_sack_prevents_merge() -> eyre::Result<()> {
    let generator = TraverserGenerator::new(Requirements::SACK, true);
    let mut cache = PathCache::new();
    let mut first =
        generator.generate(string("a"), Future::Halt, &[], 1, Some(Value::Int(0)), &mut cache);
    let second =
        generator.generate(string("a"), Future::Halt, &[], 1, Some(Value::Int(0)), &mut cache);
    assert_eq!(first.sack()?, &Value::Int(0));
    assert!(!first.is_mergeable_with(&second));
    assert_matches!(first.merge(&second), Err(Error::IncompatibleMerge));

    let mut set = TraverserSet::new();
    set.add(first);
    set.add(second);
    assert_eq!(set.len(), 2);
    assert_eq!(set.total_bulk(), 2);
    Ok(())
}

#[test]
fn test_missing_features_are_unsupported() -> eyre::Result<()> {
    let generator = TraverserGenerator::new(Requirements::BULK, true);
    let mut cache = PathCache::new();
    let mut traverser =
        generator.generate(string("a"), Future::Halt, &[], 1, Some(Value::Int(1)), &mut cache);

    assert_matches!(traverser.path(), Err(Error::UnsupportedOperation(_)));
    assert_matches!(traverser.sack(), Err(Error::UnsupportedOperation(_)));
    assert_matches!(
        traverser.set_sack(Value::Int(2)),
        Err(Error::UnsupportedOperation(_))
    );
    Ok(())
}

#[test]
fn test_set_coalesces_in_arrival_order() -> eyre::Result<()> {
    let generator = TraverserGenerator::new(Requirements::BULK, true);
    let mut cache = PathCache::new();
    let mut set = TraverserSet::new();
    for value in ["a", "b", "a", "c", "a"] {
        set.add(generate(&generator, string(value), &mut cache));
    }
    assert_eq!(set.len(), 3);
    assert_eq!(set.total_bulk(), 5);

    let drained: Vec<(Value, u64)> = std::iter::from_fn(|| set.pop_front())
        .map(|traverser| (traverser.get().clone(), traverser.bulk()))
        .collect();
    assert_eq!(
        drained,
        vec![(string("a"), 3), (string("b"), 1), (string("c"), 1)]
    );
    assert!(set.is_empty());
    Ok(())
}

#[test]
fn test_bulk_is_unrolled_in_results() -> eyre::Result<()> {
    let values = ["a", "a", "b", "a"].map(string);

    let mut traversal = Traversal::new().inject(values.clone())?.barrier()?;
    let traversers = traversal.to_traversers()?;
    assert_eq!(traversers.len(), 2);
    assert_eq!(traversers[0].get(), &string("a"));
    assert_eq!(traversers[0].bulk(), 3);

    let mut traversal = Traversal::new().inject(values.clone())?.barrier()?;
    assert_eq!(traversal.to_list()?.len(), 4);

    let mut traversal = Traversal::new().inject(values)?.barrier()?;
    let mut unrolled = Vec::new();
    while let Some(value) = traversal.next()? {
        unrolled.push(value);
    }
    assert_eq!(unrolled, ["a", "a", "a", "b"].map(string));
    Ok(())
}

#[test]
fn test_attach_resolves_references() -> eyre::Result<()> {
    let modern = modern_graph()?;
    let generator = TraverserGenerator::new(Requirements::PATH, true);
    let mut cache = PathCache::new();
    let marko = modern.graph.resolve(&modern.marko)?.to_reference();
    let mut traverser = generate(&generator, Value::from(marko), &mut cache);
    assert!(traverser.get().as_element()?.is_reference());

    traverser.attach(modern.graph.as_ref(), &mut cache)?;
    let element = traverser.get().as_element()?;
    assert!(element.is_attached());
    assert_eq!(element.property("name"), Some(&string("marko")));
    let recorded = traverser.path()?.objects();
    assert!(recorded[0].as_element()?.is_attached());
    Ok(())
}
