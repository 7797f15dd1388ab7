// Copyright © 2026 Pathway

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use traverse_engine::config::ExecutionConfig;
use traverse_engine::engine::{ElementData, ElementRef, MemoryGraph, Value};

pub fn string(s: &str) -> Value {
    Value::from(s)
}

pub fn map_of(entries: impl IntoIterator<Item = (Value, Value)>) -> Value {
    Value::from(entries.into_iter().collect::<BTreeMap<_, _>>())
}

/// `n` values drawn from `{"a", "b", "c"}` with a fixed seed.
pub fn letters(n: usize) -> Vec<Value> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    (0..n)
        .map(|_| string(["a", "b", "c"][rng.random_range(0..3)]))
        .collect()
}

pub fn frequencies(values: &[Value]) -> Value {
    let mut counts: BTreeMap<Value, Value> = BTreeMap::new();
    for value in values {
        let count = counts.entry(value.clone()).or_insert(Value::Int(0));
        *count = Value::Int(count.as_int().unwrap() + 1);
    }
    Value::from(counts)
}

pub fn fast_config() -> ExecutionConfig {
    ExecutionConfig::default().with_retry_backoff(Duration::ZERO)
}

pub struct ModernGraph {
    pub graph: Arc<MemoryGraph>,
    pub marko: ElementRef,
    pub vadas: ElementRef,
    pub lop: ElementRef,
    pub josh: ElementRef,
    pub ripple: ElementRef,
    pub peter: ElementRef,
}

fn person(name: &str, age: i64) -> ElementData {
    ElementData::new("person")
        .with_property("name", name)
        .with_property("age", age)
}

fn software(name: &str) -> ElementData {
    ElementData::new("software")
        .with_property("name", name)
        .with_property("lang", "java")
}

pub fn modern_graph() -> eyre::Result<ModernGraph> {
    let mut graph = MemoryGraph::new();
    let marko = graph.add_vertex(person("marko", 29));
    let vadas = graph.add_vertex(person("vadas", 27));
    let lop = graph.add_vertex(software("lop"));
    let josh = graph.add_vertex(person("josh", 32));
    let ripple = graph.add_vertex(software("ripple"));
    let peter = graph.add_vertex(person("peter", 35));
    graph.add_edge(marko, vadas, ElementData::new("knows").with_property("weight", 0.5))?;
    graph.add_edge(marko, josh, ElementData::new("knows").with_property("weight", 1.0))?;
    graph.add_edge(marko, lop, ElementData::new("created").with_property("weight", 0.4))?;
    graph.add_edge(josh, ripple, ElementData::new("created").with_property("weight", 1.0))?;
    graph.add_edge(josh, lop, ElementData::new("created").with_property("weight", 0.4))?;
    graph.add_edge(peter, lop, ElementData::new("created").with_property("weight", 0.2))?;
    Ok(ModernGraph {
        graph: Arc::new(graph),
        marko,
        vadas,
        lop,
        josh,
        ripple,
        peter,
    })
}
