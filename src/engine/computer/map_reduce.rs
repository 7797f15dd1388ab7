// Copyright © 2026 Pathway

use std::fmt::{self, Debug, Display};

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use crate::engine::error::{Error, Result};
use crate::engine::side_effects::TraversalSideEffects;
use crate::engine::step::{Engine, StepContext, StepId};
use crate::engine::traversal::Traversal;
use crate::engine::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Map,
    Combine,
    Reduce,
}

/// Collects the key/value pairs a partition's map phase produces.
#[derive(Clone, Debug, Default)]
pub struct MapEmitter {
    pairs: Vec<(Value, Value)>,
}

impl MapEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, key: Value, value: Value) {
        self.pairs.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn into_pairs(self) -> Vec<(Value, Value)> {
        self.pairs
    }
}

/// The distributed form of a side-effect step.
///
/// `map` runs once per partition over that partition's side effects, `combine`
/// (when [`MapReduce::do_stage`] allows it) folds one partition's values of a
/// key, `reduce` folds all values of a key across partitions, and
/// `generate_final_result` builds the side effect from the reduced pairs.
/// Reducing the map output of any partitioning must give what the step would
/// have produced locally over all the input.
pub trait MapReduce: Send + Sync + Debug {
    /// Side-effect key the final result is stored under.
    fn memory_key(&self) -> &ArcStr;

    fn job_id(&self) -> JobDescriptor;

    fn do_stage(&self, stage: Stage) -> bool;

    fn map(&self, side_effects: &TraversalSideEffects, emitter: &mut MapEmitter) -> Result<()>;

    fn combine(
        &mut self,
        key: &Value,
        values: &mut dyn Iterator<Item = Value>,
        ctx: &mut StepContext<'_>,
    ) -> Result<Value> {
        self.reduce(key, values, ctx)
    }

    /// Consumes every value of `key` once and yields the key's single result.
    fn reduce(
        &mut self,
        key: &Value,
        values: &mut dyn Iterator<Item = Value>,
        ctx: &mut StepContext<'_>,
    ) -> Result<Value>;

    fn generate_final_result(&self, reduced: Vec<(Value, Value)>) -> Value;

    fn box_clone(&self) -> Box<dyn MapReduce>;
}

impl Clone for Box<dyn MapReduce> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// What identifies a map-reduce job across restarts: the step that owns it
/// and the side effect it produces.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub step_id: StepId,
    pub side_effect_key: ArcStr,
}

impl JobDescriptor {
    pub fn new(step_id: StepId, side_effect_key: ArcStr) -> Self {
        Self {
            step_id,
            side_effect_key,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Finds the job again in `traversal`. An unlocked traversal first gets
    /// its strategies applied for the graph computer, so step ids match the
    /// ones the job was created with.
    pub fn load(&self, traversal: &Traversal) -> Result<Box<dyn MapReduce>> {
        let mut traversal = traversal.clone();
        if !traversal.is_locked() {
            traversal.set_engine(Engine::Computer);
            traversal.apply_strategies()?;
        }
        traversal
            .find_step(&self.step_id)
            .filter(|step| step.side_effect_key() == Some(&self.side_effect_key))
            .and_then(|step| step.map_reduce())
            .ok_or_else(|| Error::JobNotFound(self.to_string()))
    }
}

impl Display for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}[{}]", self.step_id, self.side_effect_key)
    }
}
