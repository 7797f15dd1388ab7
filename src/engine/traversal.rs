// Copyright © 2026 Pathway

use std::fmt::{self, Debug};
use std::mem::take;
use std::sync::Arc;

use arcstr::ArcStr;
use crossbeam_channel::Sender;
use itertools::Itertools as _;
use log::debug;

use super::error::{DynError, DynResult, Error, Result};
use super::reduce::Reducer;
use super::side_effects::TraversalSideEffects;
use super::step::{
    Engine, ExecutionEnv, GraphStep, GroupCountStep, GroupStep, IdentityStep, LambdaFilterStep,
    LambdaFlatMapStep, LambdaMapStep, NoOpBarrierStep, PathStep, PropertiesStep,
    ReducingBarrierStep, RepeatStep, StartStep, Step, StepContext, StepId, Upstream, UnfoldStep,
    VertexStep,
};
use super::strategy::{HaltedTraverserStrategy, TraversalStrategies, TraversalStrategy};
use super::structure::{Direction, ElementRef, GraphProvider, Partition};
use super::traverser::{Future, Requirements, Traverser, TraverserGenerator, TraverserSet};
use super::Value;
use crate::config::ExecutionConfig;

/// The steps in front of some position of a traversal, pulled from the back.
struct Chain<'a> {
    steps: &'a mut [Box<dyn Step>],
    peeked: &'a mut [Option<Traverser>],
    starts: &'a mut TraverserSet,
    future: Future,
}

impl Upstream for Chain<'_> {
    fn next(&mut self, ctx: &mut StepContext<'_>) -> Result<Option<Traverser>> {
        let next = match (self.steps.split_last_mut(), self.peeked.split_last_mut()) {
            (Some((step, steps)), Some((slot, peeked))) => match slot.take() {
                Some(traverser) => Some(traverser),
                None => {
                    let mut upstream = Chain {
                        steps,
                        peeked,
                        starts: &mut *self.starts,
                        future: Future::Step(step.id().clone()),
                    };
                    step.next(&mut upstream, ctx)?
                }
            },
            _ => self.starts.pop_front(),
        };
        Ok(next.map(|mut traverser| {
            traverser.set_future(self.future.clone());
            traverser
        }))
    }

    fn has_next(&mut self, ctx: &mut StepContext<'_>) -> Result<bool> {
        if self.steps.is_empty() {
            return Ok(!self.starts.is_empty());
        }
        if self.peeked.last().is_some_and(Option::is_some) {
            return Ok(true);
        }
        let next = self.next(ctx)?;
        let found = next.is_some();
        if let Some(slot) = self.peeked.last_mut() {
            *slot = next;
        }
        Ok(found)
    }
}

/// An ordered pipeline of steps together with everything needed to run it.
///
/// Built with the consuming builder methods, rewritten once by its strategies
/// and then locked. Child traversals (the `by` modulators of grouping steps,
/// the body of a repeat) are owned by their steps and run with the root's side
/// effects and environment.
pub struct Traversal {
    steps: Vec<Box<dyn Step>>,
    peeked: Vec<Option<Traverser>>,
    starts: TraverserSet,
    seeds: Vec<Value>,
    pending: Option<(Value, u64)>,
    side_effects: TraversalSideEffects,
    strategies: TraversalStrategies,
    config: ExecutionConfig,
    extra_requirements: Requirements,
    env: ExecutionEnv,
    id_prefix: String,
    next_index: usize,
    prepared: bool,
    locked: bool,
    cancelled: bool,
    child: bool,
}

impl Default for Traversal {
    fn default() -> Self {
        Self::new()
    }
}

impl Traversal {
    pub fn new() -> Self {
        let config = ExecutionConfig::default();
        Self {
            steps: Vec::new(),
            peeked: Vec::new(),
            starts: TraverserSet::new(),
            seeds: Vec::new(),
            pending: None,
            side_effects: TraversalSideEffects::new(),
            strategies: TraversalStrategies::default(),
            env: ExecutionEnv {
                graph: None,
                partition: None,
                engine: Engine::Standard,
                generator: TraverserGenerator::new(Requirements::empty(), config.share_paths),
            },
            config,
            extra_requirements: Requirements::empty(),
            id_prefix: String::new(),
            next_index: 0,
            prepared: false,
            locked: false,
            cancelled: false,
            child: false,
        }
    }

    /// A traversal reading from `graph`.
    #[must_use]
    pub fn with_graph(mut self, graph: Arc<dyn GraphProvider>) -> Self {
        self.env.graph = Some(graph);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_strategy(mut self, strategy: impl TraversalStrategy) -> Result<Self> {
        self.ensure_unlocked()?;
        self.strategies.add(Arc::new(strategy));
        Ok(self)
    }

    pub fn without_strategy(mut self, name: &str) -> Result<Self> {
        self.ensure_unlocked()?;
        self.strategies.remove(name);
        Ok(self)
    }

    /// Gives every traverser a sack starting at `initial()`.
    pub fn with_sack(
        mut self,
        initial: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Result<Self> {
        self.ensure_unlocked()?;
        self.side_effects.with_sack(Arc::new(initial));
        self.extra_requirements |= Requirements::SACK;
        Ok(self)
    }

    /// Asks for traverser features no step needs on its own, e.g. full paths.
    pub fn require(mut self, requirements: Requirements) -> Result<Self> {
        self.ensure_unlocked()?;
        self.extra_requirements |= requirements;
        Ok(self)
    }

    pub fn inject(self, values: impl IntoIterator<Item = Value>) -> Result<Self> {
        self.add_step(Box::new(StartStep::new(values)))
    }

    pub fn v(self, ids: impl IntoIterator<Item = ElementRef>) -> Result<Self> {
        self.add_step(Box::new(GraphStep::new(ids)))
    }

    pub fn out(self, labels: &[&str]) -> Result<Self> {
        self.to(Direction::Out, labels)
    }

    pub fn in_(self, labels: &[&str]) -> Result<Self> {
        self.to(Direction::In, labels)
    }

    pub fn both(self, labels: &[&str]) -> Result<Self> {
        self.to(Direction::Both, labels)
    }

    fn to(self, direction: Direction, labels: &[&str]) -> Result<Self> {
        let labels = labels.iter().map(|label| ArcStr::from(*label));
        self.add_step(Box::new(VertexStep::new(direction, labels)))
    }

    pub fn values(self, key: &str) -> Result<Self> {
        self.add_step(Box::new(PropertiesStep::new(key)))
    }

    pub fn identity(self) -> Result<Self> {
        self.add_step(Box::new(IdentityStep::new()))
    }

    pub fn map(
        self,
        function: impl Fn(&Traverser) -> DynResult<Value> + Send + Sync + 'static,
    ) -> Result<Self> {
        self.add_step(Box::new(LambdaMapStep::new(function)))
    }

    pub fn flat_map(
        self,
        function: impl Fn(&Traverser) -> DynResult<Vec<Value>> + Send + Sync + 'static,
    ) -> Result<Self> {
        self.add_step(Box::new(LambdaFlatMapStep::new(function)))
    }

    pub fn filter(
        self,
        predicate: impl Fn(&Traverser) -> DynResult<bool> + Send + Sync + 'static,
    ) -> Result<Self> {
        self.add_step(Box::new(LambdaFilterStep::new(predicate)))
    }

    pub fn unfold(self) -> Result<Self> {
        self.add_step(Box::new(UnfoldStep::new()))
    }

    pub fn path(self) -> Result<Self> {
        self.add_step(Box::new(PathStep::new()))
    }

    pub fn repeat(self, body: Traversal, times: u32) -> Result<Self> {
        self.add_step(Box::new(RepeatStep::new(body, times)?))
    }

    pub fn barrier(self) -> Result<Self> {
        self.add_step(Box::new(NoOpBarrierStep::new()))
    }

    pub fn count(self) -> Result<Self> {
        self.add_step(Box::new(ReducingBarrierStep::new(Reducer::Count)))
    }

    pub fn sum(self) -> Result<Self> {
        self.add_step(Box::new(ReducingBarrierStep::new(Reducer::Sum)))
    }

    pub fn min(self) -> Result<Self> {
        self.add_step(Box::new(ReducingBarrierStep::new(Reducer::Min)))
    }

    pub fn max(self) -> Result<Self> {
        self.add_step(Box::new(ReducingBarrierStep::new(Reducer::Max)))
    }

    pub fn fold(self) -> Result<Self> {
        self.add_step(Box::new(ReducingBarrierStep::new(Reducer::Fold)))
    }

    pub fn group(self, side_effect_key: &str) -> Result<Self> {
        self.add_step(Box::new(GroupStep::new(side_effect_key)))
    }

    pub fn group_count(self, side_effect_key: &str) -> Result<Self> {
        self.add_step(Box::new(GroupCountStep::new(side_effect_key)))
    }

    /// Fills the next child slot of the last step.
    pub fn by(mut self, mut child: Traversal) -> Result<Self> {
        self.ensure_unlocked()?;
        let Some(step) = self.steps.last_mut() else {
            return Err(Error::invalid_configuration("by() needs a preceding step"));
        };
        let slot = step.local_children().len();
        child.adopt(format!("{}.{slot}.", step.id()));
        step.add_local_child(child)?;
        step.register_side_effects(&mut self.side_effects);
        Ok(self)
    }

    /// Labels the last step.
    pub fn as_(mut self, label: &str) -> Result<Self> {
        self.ensure_unlocked()?;
        let Some(step) = self.steps.last_mut() else {
            return Err(Error::invalid_configuration("as() needs a preceding step"));
        };
        step.add_label(label.into());
        Ok(self)
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.locked {
            Err(Error::TraversalLocked)
        } else {
            Ok(())
        }
    }

    fn allocate_id(&mut self) -> StepId {
        let id = StepId::new(format!("{}{}", self.id_prefix, self.next_index));
        self.next_index += 1;
        id
    }

    /// Renames this traversal's steps, and recursively their children, under
    /// `prefix`; used when the traversal becomes a child of another step.
    fn adopt(&mut self, prefix: String) {
        self.child = true;
        self.id_prefix = prefix;
        self.next_index = 0;
        for index in 0..self.steps.len() {
            let id = self.allocate_id();
            let step = &mut self.steps[index];
            for (slot, child) in step.local_children_mut().into_iter().enumerate() {
                child.adopt(format!("{id}.{slot}."));
            }
            step.set_id(id);
        }
    }

    pub fn add_step(mut self, step: Box<dyn Step>) -> Result<Self> {
        let index = self.steps.len();
        self.insert_step(index, step)?;
        Ok(self)
    }

    pub fn insert_step(&mut self, index: usize, mut step: Box<dyn Step>) -> Result<()> {
        self.ensure_unlocked()?;
        if index > self.steps.len() {
            return Err(Error::invalid_configuration(format!(
                "can't insert a step at {index} into a traversal of {} steps",
                self.steps.len()
            )));
        }
        let id = self.allocate_id();
        for (slot, child) in step.local_children_mut().into_iter().enumerate() {
            child.adopt(format!("{id}.{slot}."));
        }
        step.set_id(id);
        step.register_side_effects(&mut self.side_effects);
        self.steps.insert(index, step);
        self.peeked.insert(index, None);
        Ok(())
    }

    pub fn remove_step(&mut self, index: usize) -> Result<Box<dyn Step>> {
        self.ensure_unlocked()?;
        if index >= self.steps.len() {
            return Err(Error::invalid_configuration(format!(
                "no step at {index} in a traversal of {} steps",
                self.steps.len()
            )));
        }
        self.peeked.remove(index);
        Ok(self.steps.remove(index))
    }

    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    pub(crate) fn steps_mut(&mut self) -> &mut [Box<dyn Step>] {
        &mut self.steps
    }

    /// Looks up a step by id in this traversal and its children.
    pub fn find_step(&self, id: &StepId) -> Option<&dyn Step> {
        self.steps.iter().find_map(|step| {
            if step.id() == id {
                Some(step.as_ref())
            } else {
                step.local_children()
                    .into_iter()
                    .find_map(|child| child.find_step(id))
            }
        })
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_root(&self) -> bool {
        !self.child
    }

    pub(crate) fn mark_child(&mut self) {
        self.child = true;
    }

    pub(crate) fn lock(&mut self) {
        self.locked = true;
        for step in &mut self.steps {
            for child in step.local_children_mut() {
                child.lock();
            }
        }
    }

    pub fn engine(&self) -> Engine {
        self.env.engine
    }

    pub(crate) fn set_engine(&mut self, engine: Engine) {
        self.env.engine = engine;
    }

    pub(crate) fn env(&self) -> &ExecutionEnv {
        &self.env
    }

    pub(crate) fn set_partition(&mut self, partition: Option<Partition>) {
        self.env.partition = partition;
    }

    pub fn graph(&self) -> Option<&Arc<dyn GraphProvider>> {
        self.env.graph.as_ref()
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn strategies(&self) -> &TraversalStrategies {
        &self.strategies
    }

    /// The halting policy, the default reference policy if none was set.
    pub fn halted_strategy(&self) -> HaltedTraverserStrategy {
        self.strategies
            .get::<HaltedTraverserStrategy>()
            .copied()
            .unwrap_or_default()
    }

    /// Union of what the steps, their children and the caller asked for.
    pub fn requirements(&self) -> Requirements {
        self.steps
            .iter()
            .fold(self.extra_requirements, |acc, step| acc | step.requirements())
    }

    pub fn side_effects(&self) -> &TraversalSideEffects {
        &self.side_effects
    }

    pub fn side_effects_mut(&mut self) -> &mut TraversalSideEffects {
        &mut self.side_effects
    }

    pub(crate) fn take_side_effects(&mut self) -> TraversalSideEffects {
        take(&mut self.side_effects)
    }

    pub fn side_effect(&self, key: &str) -> Result<Value> {
        self.side_effects.get(key)
    }

    /// Runs the strategies and locks the traversal. Does nothing when the
    /// traversal is already locked.
    pub fn apply_strategies(&mut self) -> Result<()> {
        if self.locked {
            debug!("strategies were already applied, skipping");
            return Ok(());
        }
        let strategies = self.strategies.clone();
        strategies.apply(self)
    }

    fn register_side_effects_recursively(&self, side_effects: &mut TraversalSideEffects) {
        for step in &self.steps {
            step.register_side_effects(side_effects);
            for child in step.local_children() {
                child.register_side_effects_recursively(side_effects);
            }
        }
    }

    /// Applies the strategies if needed, registers side effects and fixes the
    /// traverser features. Runs once; pulling results calls it implicitly.
    pub(crate) fn prepare(&mut self) -> Result<()> {
        if self.prepared {
            return Ok(());
        }
        self.apply_strategies()?;
        let mut side_effects = take(&mut self.side_effects);
        self.register_side_effects_recursively(&mut side_effects);
        self.side_effects = side_effects;
        self.env.generator = TraverserGenerator::new(self.requirements(), self.config.share_paths);
        debug!(
            "prepared traversal [{}] with requirements {:?}",
            self.steps.iter().map(|step| step.name()).format(", "),
            self.env.generator.requirements()
        );
        self.prepared = true;
        let seeds = take(&mut self.seeds);
        self.generate_starts(seeds);
        Ok(())
    }

    fn generate_starts(&mut self, seeds: Vec<Value>) {
        for seed in seeds {
            let sack = self.side_effects.sack_initial();
            let traverser = self.env.generator.generate(
                seed,
                Future::Halt,
                &[],
                1,
                sack,
                self.side_effects.path_cache_mut(),
            );
            self.starts.add(traverser);
        }
    }

    /// Feeds values into the front of the traversal.
    pub fn add_starts(&mut self, values: impl IntoIterator<Item = Value>) {
        let values = values.into_iter().collect();
        if self.prepared {
            self.generate_starts(values);
        } else {
            self.seeds.extend(values);
        }
    }

    pub(crate) fn push_start(&mut self, traverser: Traverser) {
        self.starts.add(traverser);
    }

    pub(crate) fn has_starts(&self) -> bool {
        !self.starts.is_empty()
    }

    fn chain(&mut self) -> (Chain<'_>, StepContext<'_>) {
        let chain = Chain {
            steps: &mut self.steps,
            peeked: &mut self.peeked,
            starts: &mut self.starts,
            future: Future::Halt,
        };
        let ctx = StepContext {
            side_effects: &mut self.side_effects,
            env: &self.env,
        };
        (chain, ctx)
    }

    pub fn next_traverser(&mut self) -> Result<Option<Traverser>> {
        if self.cancelled {
            return Ok(None);
        }
        self.prepare()?;
        let (mut chain, mut ctx) = self.chain();
        chain.next(&mut ctx)
    }

    pub fn has_next(&mut self) -> Result<bool> {
        if self.cancelled {
            return Ok(false);
        }
        if self.pending.is_some() {
            return Ok(true);
        }
        self.prepare()?;
        let (mut chain, mut ctx) = self.chain();
        chain.has_next(&mut ctx)
    }

    /// The next result; a traverser with bulk `n` is returned `n` times.
    pub fn next(&mut self) -> Result<Option<Value>> {
        if self.pending.is_none() {
            self.pending = self
                .next_traverser()?
                .map(|traverser| (traverser.get().clone(), traverser.bulk()));
        }
        Ok(match self.pending.take() {
            Some((value, bulk)) if bulk > 1 => {
                self.pending = Some((value.clone(), bulk - 1));
                Some(value)
            }
            Some((value, _)) => Some(value),
            None => None,
        })
    }

    pub fn to_traversers(&mut self) -> Result<Vec<Traverser>> {
        let mut result = Vec::new();
        while let Some(traverser) = self.next_traverser()? {
            result.push(traverser);
        }
        Ok(result)
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn to_list(&mut self) -> Result<Vec<Value>> {
        let mut result = Vec::new();
        while let Some(traverser) = self.next_traverser()? {
            let bulk = traverser.bulk() as usize;
            result.extend(std::iter::repeat_n(traverser.into_value(), bulk));
        }
        Ok(result)
    }

    /// Runs the traversal for its side effects only.
    pub fn iterate(&mut self) -> Result<()> {
        while self.next_traverser()?.is_some() {}
        Ok(())
    }

    /// Halts every result with the traversal's halting policy and sends it
    /// out. Returns the number of traversers sent.
    pub fn stream_halted(&mut self, sender: &Sender<Traverser>) -> Result<usize> {
        let policy = self.halted_strategy();
        let mut sent = 0;
        while let Some(traverser) = self.next_traverser()? {
            sender
                .send(policy.halt(traverser)?)
                .map_err(|err| Error::from(DynError::from(err.to_string())))?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Stops the execution: later pulls yield nothing. Side effects already
    /// installed stay as they are; shared path segments are released.
    pub fn cancel(&mut self) {
        debug!("traversal cancelled");
        self.cancelled = true;
        self.reset();
        self.side_effects.release_path_cache();
    }

    /// Releases the shared path segments and any buffered traversers.
    pub fn close(&mut self) {
        self.reset();
        self.side_effects.release_path_cache();
    }

    /// Drops the execution state of every step and the queued starts.
    pub fn reset(&mut self) {
        self.starts.clear();
        self.pending = None;
        for slot in &mut self.peeked {
            *slot = None;
        }
        for step in &mut self.steps {
            step.reset();
        }
    }

    /// Runs this child traversal over a single traverser and returns its first
    /// result. The child shares the caller's side effects and environment.
    pub fn apply_to(&mut self, traverser: &Traverser, ctx: &mut StepContext<'_>) -> Result<Traverser> {
        self.reset();
        let mut start = traverser.clone();
        start.set_bulk(1);
        self.push_start(start);
        let result = self.process(ctx);
        self.reset();
        result?.ok_or_else(|| {
            Error::NoResult(format!(
                "child traversal [{}] produced nothing for {}",
                self.steps.iter().map(|step| step.name()).format(", "),
                traverser.get()
            ))
        })
    }

    pub fn apply_value(&mut self, traverser: &Traverser, ctx: &mut StepContext<'_>) -> Result<Value> {
        self.apply_to(traverser, ctx).map(Traverser::into_value)
    }

    /// One result of a child traversal, run with the caller's context.
    pub(crate) fn process(&mut self, ctx: &mut StepContext<'_>) -> Result<Option<Traverser>> {
        Chain {
            steps: &mut self.steps,
            peeked: &mut self.peeked,
            starts: &mut self.starts,
            future: Future::Halt,
        }
        .next(ctx)
    }

    /// Every result of a child traversal for the starts queued so far.
    pub(crate) fn drain_with(&mut self, ctx: &mut StepContext<'_>) -> Result<Vec<Traverser>> {
        let mut result = Vec::new();
        while let Some(traverser) = self.process(ctx)? {
            result.push(traverser);
        }
        Ok(result)
    }
}

/// A structural copy with fresh execution state: steps and their children are
/// cloned, queued starts and side-effect values are not.
impl Clone for Traversal {
    fn clone(&self) -> Self {
        let mut steps: Vec<Box<dyn Step>> = self.steps.clone();
        for step in &mut steps {
            step.reset();
        }
        let mut side_effects = self.side_effects.clone();
        side_effects.clear_values();
        Self {
            peeked: vec![None; steps.len()],
            steps,
            starts: TraverserSet::new(),
            seeds: Vec::new(),
            pending: None,
            side_effects,
            strategies: self.strategies.clone(),
            config: self.config.clone(),
            extra_requirements: self.extra_requirements,
            env: self.env.clone(),
            id_prefix: self.id_prefix.clone(),
            next_index: self.next_index,
            prepared: false,
            locked: self.locked,
            cancelled: false,
            child: self.child,
        }
    }
}

impl Debug for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}]",
            self.steps
                .iter()
                .map(|step| format!("{}({})", step.name(), step.id()))
                .format(", ")
        )
    }
}
