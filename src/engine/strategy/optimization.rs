// Copyright © 2026 Pathway

use std::any::Any;

use super::{StrategyCategory, TraversalStrategy};
use crate::engine::error::Result;
use crate::engine::step::{Engine, IdentityStep, NoOpBarrierStep};
use crate::engine::traversal::Traversal;

/// Drops unlabeled identity steps.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityRemovalStrategy;

impl TraversalStrategy for IdentityRemovalStrategy {
    fn name(&self) -> &'static str {
        "IdentityRemovalStrategy"
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Optimization
    }

    fn apply(&self, traversal: &mut Traversal) -> Result<()> {
        if traversal.steps().len() <= 1 {
            return Ok(());
        }
        let removable: Vec<usize> = traversal
            .steps()
            .iter()
            .enumerate()
            .filter(|(_, step)| step.as_any().is::<IdentityStep>() && step.labels().is_empty())
            .map(|(index, _)| index)
            .collect();
        for index in removable.into_iter().rev() {
            traversal.remove_step(index)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Puts a bounded coalescing barrier in front of every side-effect step of a
/// root traversal running on the standard engine, so equal traversers reach
/// the side effect as one. The bound is `ExecutionConfig::lazy_barrier_size`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LazyBarrierStrategy;

impl TraversalStrategy for LazyBarrierStrategy {
    fn name(&self) -> &'static str {
        "LazyBarrierStrategy"
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Optimization
    }

    fn prior(&self) -> &'static [&'static str] {
        &["IdentityRemovalStrategy"]
    }

    fn apply(&self, traversal: &mut Traversal) -> Result<()> {
        if !traversal.is_root() || traversal.engine() == Engine::Computer {
            return Ok(());
        }
        let max_size = traversal.config().lazy_barrier_size;
        let mut index = 1;
        while index < traversal.steps().len() {
            let steps = traversal.steps();
            if steps[index].side_effect_key().is_some() && !steps[index - 1].is_barrier() {
                traversal.insert_step(index, Box::new(NoOpBarrierStep::bounded(max_size)))?;
                index += 1;
            }
            index += 1;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
