use std::any::Any;

use super::{StrategyCategory, TraversalStrategy};
use crate::engine::error::Result;
use crate::engine::traversal::Traversal;

/// Tells every step which engine it is going to run on.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineDependentStrategy;

impl TraversalStrategy for EngineDependentStrategy {
    fn name(&self) -> &'static str {
        "EngineDependentStrategy"
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Finalization
    }

    fn apply(&self, traversal: &mut Traversal) -> Result<()> {
        let engine = traversal.engine();
        for step in traversal.steps_mut() {
            step.on_engine(engine);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
