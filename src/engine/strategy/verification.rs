// Copyright © 2026 Pathway

use std::any::Any;

use super::{StrategyCategory, TraversalStrategy};
use crate::engine::error::{Error, Result};
use crate::engine::step::{Engine, ReducingBarrierStep};
use crate::engine::traversal::Traversal;

/// Rejects traversals the graph computer cannot run: every side effect must
/// have a distributed form, and a root traversal can't reduce to one value
/// per partition.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComputerVerificationStrategy;

impl TraversalStrategy for ComputerVerificationStrategy {
    fn name(&self) -> &'static str {
        "ComputerVerificationStrategy"
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Verification
    }

    fn apply(&self, traversal: &mut Traversal) -> Result<()> {
        if traversal.engine() != Engine::Computer {
            return Ok(());
        }
        for step in traversal.steps() {
            if step.side_effect_key().is_some() && step.map_reduce().is_none() {
                return Err(Error::invalid_configuration(format!(
                    "{} step {} has no distributed form",
                    step.name(),
                    step.id()
                )));
            }
            if traversal.is_root() && step.as_any().is::<ReducingBarrierStep>() {
                return Err(Error::invalid_configuration(format!(
                    "{} step {} can't run on the graph computer outside a child traversal",
                    step.name(),
                    step.id()
                )));
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
