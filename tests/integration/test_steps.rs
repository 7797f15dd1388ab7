// Copyright © 2026 Pathway

use assert_matches::assert_matches;

use traverse_engine::engine::{BulkSet, Error, Traversal, Value};

use super::helpers::{map_of, modern_graph, string};

fn numbers() -> [Value; 4] {
    [1, 2, 3, 3].map(Value::Int)
}

#[test]
fn test_reducers_count_bulk() -> eyre::Result<()> {
    let mut count = Traversal::new().inject(numbers())?.count()?;
    assert_eq!(count.to_list()?, vec![Value::Int(4)]);

    let mut sum = Traversal::new().inject(numbers())?.sum()?;
    assert_eq!(sum.to_list()?, vec![Value::Int(9)]);

    let mut min = Traversal::new().inject(numbers())?.min()?;
    assert_eq!(min.to_list()?, vec![Value::Int(1)]);

    let mut max = Traversal::new().inject(numbers())?.max()?;
    assert_eq!(max.to_list()?, vec![Value::Int(3)]);

    let mut fold = Traversal::new().inject(numbers())?.fold()?;
    let folded = fold.to_list()?;
    let mut folded = folded[0].as_list()?.to_vec();
    folded.sort();
    assert_eq!(folded, numbers());
    Ok(())
}

#[test]
fn test_reducers_on_empty_input() -> eyre::Result<()> {
    let mut count = Traversal::new().inject(Vec::new())?.count()?;
    assert_eq!(count.to_list()?, vec![Value::Int(0)]);

    let mut max = Traversal::new().inject(Vec::new())?.max()?;
    assert!(max.to_list()?.is_empty());

    let mut fold = Traversal::new().inject(Vec::new())?.fold()?;
    assert_eq!(fold.to_list()?, vec![Value::from(Vec::<Value>::new())]);
    Ok(())
}

#[test]
fn test_sum_mixes_numbers() -> eyre::Result<()> {
    let mut sum = Traversal::new()
        .inject([Value::Int(1), Value::from(2.5)])?
        .sum()?;
    assert_eq!(sum.to_list()?, vec![Value::from(3.5)]);

    let mut overflowing = Traversal::new()
        .inject([Value::Int(i64::MAX), Value::Int(1)])?
        .sum()?;
    assert_matches!(overflowing.to_list(), Err(Error::Other(_)));

    let mut not_a_number = Traversal::new().inject([string("a")])?.sum()?;
    assert_matches!(
        not_a_number.to_list(),
        Err(Error::TypeMismatch {
            expected: "number",
            ..
        })
    );
    Ok(())
}

#[test]
fn test_unfold() -> eyre::Result<()> {
    let bag: BulkSet = [(string("a"), 3), (string("b"), 1)].into_iter().collect();
    let mut traversal = Traversal::new()
        .inject([
            Value::from(bag),
            Value::from(vec![Value::Int(1), Value::Int(2)]),
            Value::Int(7),
        ])?
        .unfold()?;
    let traversers = traversal.to_traversers()?;
    let unfolded: Vec<(Value, u64)> = traversers
        .iter()
        .map(|traverser| (traverser.get().clone(), traverser.bulk()))
        .collect();
    assert_eq!(
        unfolded,
        vec![
            (string("a"), 3),
            (string("b"), 1),
            (Value::Int(1), 1),
            (Value::Int(2), 1),
            (Value::Int(7), 1),
        ]
    );
    Ok(())
}

#[test]
fn test_unfold_map_entries() -> eyre::Result<()> {
    let mut traversal = Traversal::new()
        .inject([map_of([(string("k"), Value::Int(1))])])?
        .unfold()?;
    assert_eq!(
        traversal.to_list()?,
        vec![Value::from(vec![string("k"), Value::Int(1)])]
    );
    Ok(())
}

#[test]
fn test_values() -> eyre::Result<()> {
    let modern = modern_graph()?;
    let mut traversal = Traversal::new()
        .with_graph(modern.graph.clone())
        .v([modern.marko])?
        .out(&["knows"])?
        .values("age")?;
    let mut ages = traversal.to_list()?;
    ages.sort();
    assert_eq!(ages, vec![Value::Int(27), Value::Int(32)]);

    let mut missing = Traversal::new()
        .inject([map_of([(string("k"), Value::Int(1))])])?
        .values("other")?;
    assert!(missing.to_list()?.is_empty());

    let mut wrong_type = Traversal::new().inject([Value::Int(1)])?.values("k")?;
    assert_matches!(wrong_type.to_list(), Err(Error::TypeMismatch { .. }));
    Ok(())
}

#[test]
fn test_in_and_both() -> eyre::Result<()> {
    let modern = modern_graph()?;
    let mut creators = Traversal::new()
        .with_graph(modern.graph.clone())
        .v([modern.lop])?
        .in_(&["created"])?
        .values("name")?;
    let mut names = creators.to_list()?;
    names.sort();
    assert_eq!(names, ["josh", "marko", "peter"].map(string));

    let mut neighbours = Traversal::new()
        .with_graph(modern.graph.clone())
        .v([modern.josh])?
        .both(&[])?
        .values("name")?;
    let mut names = neighbours.to_list()?;
    names.sort();
    assert_eq!(names, ["lop", "marko", "ripple"].map(string));
    Ok(())
}

#[test]
fn test_graph_steps_need_a_graph() -> eyre::Result<()> {
    let mut traversal = Traversal::new().v([])?;
    assert_matches!(traversal.to_list(), Err(Error::NoGraph));
    Ok(())
}

#[test]
fn test_filter_and_flat_map() -> eyre::Result<()> {
    let mut traversal = Traversal::new()
        .inject([1, 2, 3, 4].map(Value::Int))?
        .filter(|t| Ok(t.get().as_int()? % 2 == 0))?
        .flat_map(|t| {
            let n = t.get().as_int()?;
            Ok(vec![Value::Int(n), Value::Int(n * 10)])
        })?;
    assert_eq!(traversal.to_list()?, [2, 20, 4, 40].map(Value::Int));
    Ok(())
}

#[test]
fn test_repeat_walks_the_graph() -> eyre::Result<()> {
    let modern = modern_graph()?;
    let mut traversal = Traversal::new()
        .with_graph(modern.graph.clone())
        .v([modern.marko])?
        .repeat(Traversal::new().out(&[])?, 2)?
        .values("name")?;
    let mut names = traversal.to_list()?;
    names.sort();
    assert_eq!(names, ["lop", "ripple"].map(string));
    Ok(())
}

#[test]
fn test_repeat_coalesces_each_iteration() -> eyre::Result<()> {
    let mut traversal = Traversal::new()
        .inject([string("x")])?
        .repeat(
            Traversal::new().flat_map(|t| Ok(vec![t.get().clone(), t.get().clone()]))?,
            10,
        )?;
    let traversers = traversal.to_traversers()?;
    assert_eq!(traversers.len(), 1);
    assert_eq!(traversers[0].bulk(), 1024);
    assert_eq!(traversers[0].loops(), 0);
    Ok(())
}

#[test]
fn test_repeat_needs_an_iteration() -> eyre::Result<()> {
    assert_matches!(
        Traversal::new().repeat(Traversal::new().identity()?, 0),
        Err(Error::InvalidStepConfiguration(_))
    );
    Ok(())
}

#[test]
fn test_sack_starts_at_initial_value() -> eyre::Result<()> {
    let mut traversal = Traversal::new()
        .with_sack(|| Value::Int(10))?
        .inject(["a", "a"].map(string))?
        .map(|t| Ok(t.sack()?.clone()))?;
    let traversers = traversal.to_traversers()?;
    assert_eq!(traversers.len(), 2);
    assert!(traversers
        .iter()
        .all(|traverser| traverser.get() == &Value::Int(10) && traverser.bulk() == 1));
    Ok(())
}

#[test]
fn test_steps_get_stable_ids() -> eyre::Result<()> {
    let traversal = Traversal::new()
        .inject([Value::Int(1)])?
        .group("g")?
        .by(Traversal::new().identity()?.as_("k")?)?
        .by(Traversal::new().unfold()?)?;
    let ids: Vec<&str> = traversal.steps().iter().map(|step| step.id().as_str()).collect();
    assert_eq!(ids, ["0", "1"]);

    let children = traversal.steps()[1].local_children();
    assert_eq!(children[0].steps()[0].id().as_str(), "1.0.0");
    assert_eq!(children[1].steps()[0].id().as_str(), "1.1.0");
    assert!(!children[0].is_root());
    Ok(())
}
