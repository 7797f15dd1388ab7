use std::sync::Arc;

use derivative::Derivative;

use super::{step_boilerplate, Step, StepBase, StepContext, Upstream};
use crate::engine::error::{DynResult, Result};
use crate::engine::traverser::Traverser;

pub type FilterFn = Arc<dyn Fn(&Traverser) -> DynResult<bool> + Send + Sync>;

#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct LambdaFilterStep {
    base: StepBase,
    #[derivative(Debug = "ignore")]
    predicate: FilterFn,
}

impl LambdaFilterStep {
    pub fn new(predicate: impl Fn(&Traverser) -> DynResult<bool> + Send + Sync + 'static) -> Self {
        Self {
            base: StepBase::default(),
            predicate: Arc::new(predicate),
        }
    }
}

impl Step for LambdaFilterStep {
    step_boilerplate!("filter");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        while let Some(mut traverser) = upstream.next(ctx)? {
            if (self.predicate)(&traverser)? {
                if !self.base.labels.is_empty() {
                    traverser.extend_path(&self.base.labels, ctx.side_effects.path_cache_mut());
                }
                return Ok(Some(traverser));
            }
        }
        Ok(None)
    }
}
