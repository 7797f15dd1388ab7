// Copyright © 2026 Pathway

use super::{step_boilerplate, Step, StepBase, StepContext, Upstream};
use crate::engine::error::Result;
use crate::engine::reduce::Reducer;
use crate::engine::traverser::{Traverser, TraverserSet};
use crate::engine::BulkSet;

/// Collects traversers from its upstream before emitting any, merging equal
/// ones on the way. Unbounded by default; with a size limit it pulls at most
/// that many traversers per refill.
#[derive(Debug, Clone, Default)]
pub struct NoOpBarrierStep {
    base: StepBase,
    barrier: TraverserSet,
    max_size: Option<usize>,
}

impl NoOpBarrierStep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(max_size: usize) -> Self {
        Self {
            max_size: Some(max_size.max(1)),
            ..Self::default()
        }
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }
}

impl Step for NoOpBarrierStep {
    step_boilerplate!("barrier");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if self.barrier.is_empty() {
            let mut pulled = 0;
            while self.max_size.is_none_or(|max_size| pulled < max_size) {
                let Some(traverser) = upstream.next(ctx)? else {
                    break;
                };
                self.barrier.add(traverser);
                pulled += 1;
            }
        }
        Ok(self.barrier.pop_front())
    }

    fn reset(&mut self) {
        self.barrier.clear();
    }

    fn is_barrier(&self) -> bool {
        true
    }
}

/// Folds every incoming traverser into one value, counting each object
/// `bulk` times.
#[derive(Debug, Clone)]
pub struct ReducingBarrierStep {
    base: StepBase,
    reducer: Reducer,
    done: bool,
}

impl ReducingBarrierStep {
    pub fn new(reducer: Reducer) -> Self {
        Self {
            base: StepBase::default(),
            reducer,
            done: false,
        }
    }

    pub fn reducer(&self) -> Reducer {
        self.reducer
    }
}

impl Step for ReducingBarrierStep {
    step_boilerplate!("reduce");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if self.done {
            return Ok(None);
        }
        let mut seen = BulkSet::new();
        while let Some(traverser) = upstream.next(ctx)? {
            let bulk = traverser.bulk();
            seen.add(traverser.into_value(), bulk);
        }
        self.done = true;
        let reduced = self.reducer.reduce(seen.iter())?;
        Ok(reduced.map(|value| ctx.generate(value, &self.base.labels, 1)))
    }

    fn reset(&mut self) {
        self.done = false;
    }

    fn is_barrier(&self) -> bool {
        true
    }
}
