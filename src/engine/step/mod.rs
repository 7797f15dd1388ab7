// Copyright © 2026 Pathway

mod barrier;
mod branch;
mod filter;
mod map;
mod side_effect;
mod source;

pub use barrier::{NoOpBarrierStep, ReducingBarrierStep};
pub use branch::RepeatStep;
pub use filter::LambdaFilterStep;
pub use map::{
    IdentityStep, LambdaFlatMapStep, LambdaMapStep, PathStep, PropertiesStep, UnfoldStep,
    VertexStep,
};
pub use side_effect::{GroupCountMapReduce, GroupCountStep, GroupMapReduce, GroupStep};
pub use source::{GraphStep, StartStep};

use std::any::Any;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use super::computer::MapReduce;
use super::error::{Error, Result};
use super::side_effects::TraversalSideEffects;
use super::structure::{GraphProvider, Partition};
use super::traversal::Traversal;
use super::traverser::{Future, Labels, Requirements, Traverser, TraverserGenerator};
use super::Value;

/// Identifier of a step, unique within the root traversal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepId(ArcStr);

impl StepId {
    pub fn new(id: impl Into<ArcStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self(arcstr::literal!("~unassigned"))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Engine {
    #[default]
    Standard,
    Computer,
}

/// Everything a step may read while it runs, fixed once the traversal is prepared.
#[derive(Clone)]
pub struct ExecutionEnv {
    pub graph: Option<Arc<dyn GraphProvider>>,
    pub partition: Option<Partition>,
    pub engine: Engine,
    pub generator: TraverserGenerator,
}

impl Debug for ExecutionEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ExecutionEnv")
            .field("graph", &self.graph.is_some())
            .field("partition", &self.partition)
            .field("engine", &self.engine)
            .field("generator", &self.generator)
            .finish()
    }
}

pub struct StepContext<'a> {
    pub side_effects: &'a mut TraversalSideEffects,
    pub env: &'a ExecutionEnv,
}

impl StepContext<'_> {
    pub fn reborrow(&mut self) -> StepContext<'_> {
        StepContext {
            side_effects: &mut *self.side_effects,
            env: self.env,
        }
    }

    pub fn engine(&self) -> Engine {
        self.env.engine
    }

    pub fn graph(&self) -> Result<&dyn GraphProvider> {
        self.env.graph.as_deref().ok_or(Error::NoGraph)
    }

    /// A fresh traverser for a seed value produced by a step labeled `labels`.
    pub fn generate(&mut self, value: Value, labels: &[ArcStr], bulk: u64) -> Traverser {
        let sack = self.side_effects.sack_initial();
        self.env.generator.generate(
            value,
            Future::Halt,
            labels,
            bulk,
            sack,
            self.side_effects.path_cache_mut(),
        )
    }

    pub fn split(&mut self, traverser: &Traverser, value: Value, labels: &[ArcStr]) -> Traverser {
        traverser.split(value, labels, self.side_effects.path_cache_mut())
    }
}

/// The part of the chain in front of a step.
pub trait Upstream {
    fn next(&mut self, ctx: &mut StepContext<'_>) -> Result<Option<Traverser>>;

    fn has_next(&mut self, ctx: &mut StepContext<'_>) -> Result<bool>;
}

/// Identity and labels every step carries.
#[derive(Clone, Debug, Default)]
pub struct StepBase {
    pub id: StepId,
    pub labels: Labels,
}

pub trait Step: Send + Sync + Debug + Any {
    fn base(&self) -> &StepBase;

    fn base_mut(&mut self) -> &mut StepBase;

    fn name(&self) -> &'static str;

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>>;

    fn box_clone(&self) -> Box<dyn Step>;

    fn as_any(&self) -> &dyn Any;

    fn id(&self) -> &StepId {
        &self.base().id
    }

    fn set_id(&mut self, id: StepId) {
        self.base_mut().id = id;
    }

    fn labels(&self) -> &[ArcStr] {
        &self.base().labels
    }

    fn add_label(&mut self, label: ArcStr) {
        let labels = &mut self.base_mut().labels;
        if !labels.contains(&label) {
            labels.push(label);
        }
    }

    fn requirements(&self) -> Requirements {
        Requirements::empty()
    }

    /// Drops all execution state so the step can run again from scratch.
    fn reset(&mut self) {}

    fn local_children(&self) -> Vec<&Traversal> {
        Vec::new()
    }

    fn local_children_mut(&mut self) -> Vec<&mut Traversal> {
        Vec::new()
    }

    fn add_local_child(&mut self, _child: Traversal) -> Result<()> {
        Err(Error::invalid_configuration(format!(
            "{} step does not take child traversals",
            self.name()
        )))
    }

    fn on_engine(&mut self, _engine: Engine) {}

    fn is_barrier(&self) -> bool {
        false
    }

    fn side_effect_key(&self) -> Option<&ArcStr> {
        None
    }

    fn register_side_effects(&self, _side_effects: &mut TraversalSideEffects) {}

    fn map_reduce(&self) -> Option<Box<dyn MapReduce>> {
        None
    }
}

impl Clone for Box<dyn Step> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Implements the bookkeeping methods of [`Step`] for a struct with a `base` field.
macro_rules! step_boilerplate {
    ($name:literal) => {
        fn base(&self) -> &$crate::engine::step::StepBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut $crate::engine::step::StepBase {
            &mut self.base
        }

        fn name(&self) -> &'static str {
            $name
        }

        fn box_clone(&self) -> Box<dyn $crate::engine::step::Step> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    };
}

pub(crate) use step_boilerplate;

/// Evaluates an optional child slot, falling back to the traverser's own value.
pub(crate) fn apply_slot(
    slot: Option<&mut Traversal>,
    traverser: &Traverser,
    ctx: &mut StepContext<'_>,
) -> Result<Value> {
    match slot {
        Some(child) => child.apply_value(traverser, ctx),
        None => Ok(traverser.get().clone()),
    }
}
