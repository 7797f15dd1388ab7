// Copyright © 2026 Pathway

mod decoration;
mod finalization;
mod optimization;
mod verification;

pub use decoration::{Detachment, HaltedTraverserStrategy};
pub use finalization::EngineDependentStrategy;
pub use optimization::{IdentityRemovalStrategy, LazyBarrierStrategy};
pub use verification::ComputerVerificationStrategy;

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use itertools::Itertools as _;
use log::debug;

use super::error::{Error, Result};
use super::traversal::Traversal;

/// Phases strategies run in, in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StrategyCategory {
    Decoration,
    Optimization,
    Finalization,
    Verification,
}

/// A rewrite of a traversal applied once before it executes.
pub trait TraversalStrategy: Send + Sync + Debug + Any {
    fn name(&self) -> &'static str;

    fn category(&self) -> StrategyCategory;

    /// Strategies of the same category that must run before this one.
    fn prior(&self) -> &'static [&'static str] {
        &[]
    }

    /// Strategies of the same category that must run after this one.
    fn posterior(&self) -> &'static [&'static str] {
        &[]
    }

    fn apply(&self, traversal: &mut Traversal) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// The set of strategies of a traversal, at most one per name.
#[derive(Clone, Debug)]
pub struct TraversalStrategies {
    strategies: Vec<Arc<dyn TraversalStrategy>>,
}

impl Default for TraversalStrategies {
    fn default() -> Self {
        Self::empty()
            .with(HaltedTraverserStrategy::reference())
            .with(IdentityRemovalStrategy)
            .with(LazyBarrierStrategy)
            .with(EngineDependentStrategy)
            .with(ComputerVerificationStrategy)
    }
}

impl TraversalStrategies {
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, strategy: impl TraversalStrategy) -> Self {
        self.add(Arc::new(strategy));
        self
    }

    /// Adds a strategy, replacing the one with the same name if present.
    pub fn add(&mut self, strategy: Arc<dyn TraversalStrategy>) {
        match self
            .strategies
            .iter_mut()
            .find(|existing| existing.name() == strategy.name())
        {
            Some(existing) => *existing = strategy,
            None => self.strategies.push(strategy),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn TraversalStrategy>> {
        let position = self.strategies.iter().position(|s| s.name() == name)?;
        Some(self.strategies.remove(position))
    }

    pub fn get<S: TraversalStrategy>(&self) -> Option<&S> {
        self.strategies
            .iter()
            .find_map(|strategy| strategy.as_any().downcast_ref::<S>())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategies in application order: by category, then by the declared
    /// prior/posterior constraints, keeping insertion order where unconstrained.
    pub fn sorted(&self) -> Result<Vec<Arc<dyn TraversalStrategy>>> {
        let mut result = Vec::with_capacity(self.strategies.len());
        let by_category = self
            .strategies
            .iter()
            .cloned()
            .into_group_map_by(|strategy| strategy.category());
        for category in by_category.keys().copied().sorted() {
            result.extend(sort_category(&by_category[&category])?);
        }
        Ok(result)
    }

    /// Applies every strategy to the traversal and its children, then locks them.
    pub fn apply(&self, traversal: &mut Traversal) -> Result<()> {
        for strategy in self.sorted()? {
            debug!(
                "applying {} strategy {}",
                format!("{:?}", strategy.category()).to_lowercase(),
                strategy.name()
            );
            apply_recursively(strategy.as_ref(), traversal)?;
        }
        traversal.lock();
        Ok(())
    }
}

fn apply_recursively(strategy: &dyn TraversalStrategy, traversal: &mut Traversal) -> Result<()> {
    let engine = traversal.engine();
    for step in traversal.steps_mut() {
        for child in step.local_children_mut() {
            child.set_engine(engine);
            apply_recursively(strategy, child)?;
        }
    }
    strategy.apply(traversal)
}

/// Kahn's algorithm over the constraints that name strategies of this category.
fn sort_category(
    strategies: &[Arc<dyn TraversalStrategy>],
) -> Result<Vec<Arc<dyn TraversalStrategy>>> {
    let index: HashMap<&str, usize> = strategies
        .iter()
        .enumerate()
        .map(|(i, strategy)| (strategy.name(), i))
        .collect();
    let mut successors = vec![Vec::new(); strategies.len()];
    let mut in_degree = vec![0_usize; strategies.len()];
    for (i, strategy) in strategies.iter().enumerate() {
        let before = strategy.prior().iter().filter_map(|name| index.get(name));
        for &j in before {
            successors[j].push(i);
            in_degree[i] += 1;
        }
        let after = strategy.posterior().iter().filter_map(|name| index.get(name));
        for &j in after {
            successors[i].push(j);
            in_degree[j] += 1;
        }
    }

    let mut done = vec![false; strategies.len()];
    let mut order = Vec::with_capacity(strategies.len());
    while order.len() < strategies.len() {
        let Some(next) = (0..strategies.len()).find(|&i| !done[i] && in_degree[i] == 0) else {
            let cycle = (0..strategies.len())
                .filter(|&i| !done[i])
                .map(|i| strategies[i].name())
                .join(", ");
            return Err(Error::StrategyOrdering(format!(
                "cyclic ordering between strategies: {cycle}"
            )));
        };
        done[next] = true;
        for &successor in &successors[next] {
            in_degree[successor] -= 1;
        }
        order.push(strategies[next].clone());
    }
    Ok(order)
}
