// Copyright © 2026 Pathway

use std::collections::BTreeMap;
use std::sync::Arc;

use arcstr::ArcStr;

use super::{apply_slot, step_boilerplate, Engine, Step, StepBase, StepContext, StepId, Upstream};
use crate::engine::computer::{JobDescriptor, MapEmitter, MapReduce, Stage};
use crate::engine::error::{Error, Result};
use crate::engine::side_effects::{empty_map_supplier, MergeOperator, TraversalSideEffects};
use crate::engine::traversal::Traversal;
use crate::engine::traverser::{Requirements, Traverser};
use crate::engine::{BulkSet, Value};

fn bulk_as_int(bulk: u64) -> i64 {
    i64::try_from(bulk).unwrap_or(i64::MAX)
}

fn child_requirements(children: &[Option<&Traversal>]) -> Requirements {
    children
        .iter()
        .flatten()
        .fold(Requirements::empty(), |acc, child| acc | child.requirements())
}

/// Adds `value` `bulk` times to the bag stored under `key` in a group map.
fn add_to_bucket(groups: &mut Value, key: Value, value: Value, bulk: u64) -> Result<()> {
    let groups = groups.as_map_mut()?;
    match groups.get_mut(&key) {
        Some(Value::Bag(bucket)) => Arc::make_mut(bucket).add(value, bulk),
        Some(other) => {
            return Err(Error::TypeMismatch {
                expected: "bag",
                value: other.clone(),
            })
        }
        None => {
            let mut bucket = BulkSet::new();
            bucket.add(value, bulk);
            groups.insert(key, Value::from(bucket));
        }
    }
    Ok(())
}

fn merge_group_maps(mut accumulator: Value, other: &Value) -> Result<Value> {
    for (key, bucket) in other.as_map()? {
        let bucket = bucket.as_bag()?;
        let groups = accumulator.as_map_mut()?;
        match groups.get_mut(key) {
            Some(Value::Bag(existing)) => Arc::make_mut(existing).merge(bucket),
            Some(other) => {
                return Err(Error::TypeMismatch {
                    expected: "bag",
                    value: other.clone(),
                })
            }
            None => {
                groups.insert(key.clone(), Value::from(bucket.clone()));
            }
        }
    }
    Ok(accumulator)
}

fn merge_count_maps(mut accumulator: Value, other: &Value) -> Result<Value> {
    for (key, count) in other.as_map()? {
        let count = count.as_int()?;
        let counts = accumulator.as_map_mut()?;
        let slot = counts.entry(key.clone()).or_insert(Value::Int(0));
        *slot = Value::Int(slot.as_int()?.saturating_add(count));
    }
    Ok(accumulator)
}

/// Turns one key's bucket into its final value, running the reduce traversal
/// over the whole bag if there is one.
fn reduce_bucket(
    reduce: Option<&mut Traversal>,
    bucket: BulkSet,
    ctx: &mut StepContext<'_>,
) -> Result<Value> {
    let bag = Value::from(bucket);
    match reduce {
        Some(reduce) => {
            let traverser = ctx.generate(bag, &[], 1);
            reduce.apply_value(&traverser, ctx)
        }
        None => Ok(bag),
    }
}

/// Groups objects into bags by key.
///
/// Under the standard engine with a reduce traversal, bags are kept by the step
/// and the reduced map replaces the side effect once the upstream runs dry.
/// Otherwise bags are written straight into the side effect and reduction, if
/// any, is left to [`GroupMapReduce`].
#[derive(Debug, Clone)]
pub struct GroupStep {
    base: StepBase,
    side_effect_key: ArcStr,
    key: Option<Traversal>,
    value: Option<Traversal>,
    reduce: Option<Traversal>,
    slots_filled: usize,
    on_computer: bool,
    pending: BTreeMap<Value, BulkSet>,
}

impl GroupStep {
    pub fn new(side_effect_key: impl Into<ArcStr>) -> Self {
        Self {
            base: StepBase::default(),
            side_effect_key: side_effect_key.into(),
            key: None,
            value: None,
            reduce: None,
            slots_filled: 0,
            on_computer: false,
            pending: BTreeMap::new(),
        }
    }

    pub fn reduce_traversal(&self) -> Option<&Traversal> {
        self.reduce.as_ref()
    }

    fn finalize(&mut self, ctx: &mut StepContext<'_>) -> Result<()> {
        let mut reduced = BTreeMap::new();
        for (key, bucket) in &self.pending {
            let value = reduce_bucket(self.reduce.as_mut(), bucket.clone(), ctx)?;
            reduced.insert(key.clone(), value);
        }
        ctx.side_effects
            .set(self.side_effect_key.clone(), Value::from(reduced));
        Ok(())
    }
}

impl Step for GroupStep {
    step_boilerplate!("group");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.next(ctx)? else {
            return Ok(None);
        };
        let key = apply_slot(self.key.as_mut(), &traverser, ctx)?;
        let value = apply_slot(self.value.as_mut(), &traverser, ctx)?;
        let bulk = traverser.bulk();
        if self.reduce.is_some() && !self.on_computer {
            self.pending.entry(key).or_default().add(value, bulk);
            if !upstream.has_next(ctx)? {
                self.finalize(ctx)?;
            }
        } else {
            let groups = ctx.side_effects.get_mut(&self.side_effect_key)?;
            add_to_bucket(groups, key, value, bulk)?;
        }
        Ok(Some(traverser))
    }

    fn requirements(&self) -> Requirements {
        Requirements::SIDE_EFFECTS
            | Requirements::BULK
            | child_requirements(&[self.key.as_ref(), self.value.as_ref(), self.reduce.as_ref()])
    }

    fn reset(&mut self) {
        self.pending.clear();
        for child in self.local_children_mut() {
            child.reset();
        }
    }

    fn local_children(&self) -> Vec<&Traversal> {
        [&self.key, &self.value, &self.reduce]
            .into_iter()
            .flatten()
            .collect()
    }

    fn local_children_mut(&mut self) -> Vec<&mut Traversal> {
        [&mut self.key, &mut self.value, &mut self.reduce]
            .into_iter()
            .flatten()
            .collect()
    }

    fn add_local_child(&mut self, mut child: Traversal) -> Result<()> {
        child.mark_child();
        let slot = match self.slots_filled {
            0 => &mut self.key,
            1 => &mut self.value,
            2 => &mut self.reduce,
            _ => {
                return Err(Error::invalid_configuration(
                    "group takes at most a key, a value and a reduce traversal",
                ))
            }
        };
        *slot = Some(child);
        self.slots_filled += 1;
        Ok(())
    }

    fn on_engine(&mut self, engine: Engine) {
        self.on_computer = engine == Engine::Computer;
    }

    fn side_effect_key(&self) -> Option<&ArcStr> {
        Some(&self.side_effect_key)
    }

    fn register_side_effects(&self, side_effects: &mut TraversalSideEffects) {
        side_effects.register_supplier_if_absent(self.side_effect_key.clone(), empty_map_supplier());
        side_effects.register_merge(
            self.side_effect_key.clone(),
            MergeOperator::new(merge_group_maps, true, self.reduce.is_some()),
        );
    }

    fn map_reduce(&self) -> Option<Box<dyn MapReduce>> {
        Some(Box::new(GroupMapReduce {
            step_id: self.base.id.clone(),
            side_effect_key: self.side_effect_key.clone(),
            reduce: self.reduce.clone(),
        }))
    }
}

/// Distributed form of [`GroupStep`]: partitions emit their bags, the reduce
/// phase merges them per key and applies the reduce traversal exactly once.
#[derive(Debug, Clone)]
pub struct GroupMapReduce {
    step_id: StepId,
    side_effect_key: ArcStr,
    reduce: Option<Traversal>,
}

impl MapReduce for GroupMapReduce {
    fn memory_key(&self) -> &ArcStr {
        &self.side_effect_key
    }

    fn job_id(&self) -> JobDescriptor {
        JobDescriptor::new(self.step_id.clone(), self.side_effect_key.clone())
    }

    fn do_stage(&self, stage: Stage) -> bool {
        stage != Stage::Combine
    }

    fn map(&self, side_effects: &TraversalSideEffects, emitter: &mut MapEmitter) -> Result<()> {
        let groups = side_effects.get(&self.side_effect_key)?;
        for (key, bucket) in groups.as_map()? {
            emitter.emit(key.clone(), bucket.clone());
        }
        Ok(())
    }

    fn reduce(
        &mut self,
        _key: &Value,
        values: &mut dyn Iterator<Item = Value>,
        ctx: &mut StepContext<'_>,
    ) -> Result<Value> {
        let mut merged = BulkSet::new();
        for bucket in values {
            merged.merge(bucket.as_bag()?);
        }
        reduce_bucket(self.reduce.as_mut(), merged, ctx)
    }

    fn generate_final_result(&self, reduced: Vec<(Value, Value)>) -> Value {
        Value::from(reduced.into_iter().collect::<BTreeMap<_, _>>())
    }

    fn box_clone(&self) -> Box<dyn MapReduce> {
        Box::new(self.clone())
    }
}

/// Counts objects by key, adding each traverser's bulk. Counts are stored as
/// `Value::Int`, so a count saturates at `i64::MAX`.
#[derive(Debug, Clone)]
pub struct GroupCountStep {
    base: StepBase,
    side_effect_key: ArcStr,
    key: Option<Traversal>,
}

impl GroupCountStep {
    pub fn new(side_effect_key: impl Into<ArcStr>) -> Self {
        Self {
            base: StepBase::default(),
            side_effect_key: side_effect_key.into(),
            key: None,
        }
    }
}

impl Step for GroupCountStep {
    step_boilerplate!("groupCount");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.next(ctx)? else {
            return Ok(None);
        };
        let key = apply_slot(self.key.as_mut(), &traverser, ctx)?;
        let counts = ctx.side_effects.get_mut(&self.side_effect_key)?.as_map_mut()?;
        let slot = counts.entry(key).or_insert(Value::Int(0));
        *slot = Value::Int(slot.as_int()?.saturating_add(bulk_as_int(traverser.bulk())));
        Ok(Some(traverser))
    }

    fn requirements(&self) -> Requirements {
        Requirements::SIDE_EFFECTS | Requirements::BULK | child_requirements(&[self.key.as_ref()])
    }

    fn reset(&mut self) {
        if let Some(key) = &mut self.key {
            key.reset();
        }
    }

    fn local_children(&self) -> Vec<&Traversal> {
        self.key.iter().collect()
    }

    fn local_children_mut(&mut self) -> Vec<&mut Traversal> {
        self.key.iter_mut().collect()
    }

    fn add_local_child(&mut self, mut child: Traversal) -> Result<()> {
        if self.key.is_some() {
            return Err(Error::invalid_configuration(
                "groupCount takes at most a key traversal",
            ));
        }
        child.mark_child();
        self.key = Some(child);
        Ok(())
    }

    fn side_effect_key(&self) -> Option<&ArcStr> {
        Some(&self.side_effect_key)
    }

    fn register_side_effects(&self, side_effects: &mut TraversalSideEffects) {
        side_effects.register_supplier_if_absent(self.side_effect_key.clone(), empty_map_supplier());
        side_effects.register_merge(
            self.side_effect_key.clone(),
            MergeOperator::new(merge_count_maps, true, false),
        );
    }

    fn map_reduce(&self) -> Option<Box<dyn MapReduce>> {
        Some(Box::new(GroupCountMapReduce {
            step_id: self.base.id.clone(),
            side_effect_key: self.side_effect_key.clone(),
        }))
    }
}

/// Distributed form of [`GroupCountStep`]. Counts add up, so partial counts
/// are combined inside each partition before the shuffle.
#[derive(Debug, Clone)]
pub struct GroupCountMapReduce {
    step_id: StepId,
    side_effect_key: ArcStr,
}

impl MapReduce for GroupCountMapReduce {
    fn memory_key(&self) -> &ArcStr {
        &self.side_effect_key
    }

    fn job_id(&self) -> JobDescriptor {
        JobDescriptor::new(self.step_id.clone(), self.side_effect_key.clone())
    }

    fn do_stage(&self, _stage: Stage) -> bool {
        true
    }

    fn map(&self, side_effects: &TraversalSideEffects, emitter: &mut MapEmitter) -> Result<()> {
        let counts = side_effects.get(&self.side_effect_key)?;
        for (key, count) in counts.as_map()? {
            emitter.emit(key.clone(), count.clone());
        }
        Ok(())
    }

    fn reduce(
        &mut self,
        _key: &Value,
        values: &mut dyn Iterator<Item = Value>,
        _ctx: &mut StepContext<'_>,
    ) -> Result<Value> {
        let mut total: i64 = 0;
        for count in values {
            total = total.saturating_add(count.as_int()?);
        }
        Ok(Value::Int(total))
    }

    fn generate_final_result(&self, reduced: Vec<(Value, Value)>) -> Value {
        Value::from(reduced.into_iter().collect::<BTreeMap<_, _>>())
    }

    fn box_clone(&self) -> Box<dyn MapReduce> {
        Box::new(self.clone())
    }
}
