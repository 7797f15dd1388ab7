// Copyright © 2026 Pathway

use super::{step_boilerplate, Engine, Step, StepBase, StepContext, Upstream};
use crate::engine::error::{Error, Result};
use crate::engine::traversal::Traversal;
use crate::engine::traverser::{Requirements, Traverser, TraverserSet};

/// Runs the body traversal `times` times over every incoming traverser.
///
/// Iterations advance breadth-first: the whole output of one pass is collected
/// before it is looped back, so traversers that reach the same object in the
/// same iteration merge into one.
#[derive(Debug, Clone)]
pub struct RepeatStep {
    base: StepBase,
    body: Traversal,
    times: u32,
    emitted: TraverserSet,
}

impl RepeatStep {
    pub fn new(mut body: Traversal, times: u32) -> Result<Self> {
        if times == 0 {
            return Err(Error::invalid_configuration(
                "repeat needs at least one iteration",
            ));
        }
        body.mark_child();
        Ok(Self {
            base: StepBase::default(),
            body,
            times,
            emitted: TraverserSet::new(),
        })
    }

    pub fn times(&self) -> u32 {
        self.times
    }

    fn run(&mut self, traverser: Traverser, ctx: &mut StepContext<'_>) -> Result<()> {
        self.body.push_start(traverser);
        while self.body.has_starts() {
            for mut output in self.body.drain_with(ctx)? {
                output.incr_loops();
                if output.loops() >= self.times {
                    output.reset_loops();
                    if !self.base.labels.is_empty() {
                        output.extend_path(&self.base.labels, ctx.side_effects.path_cache_mut());
                    }
                    self.emitted.add(output);
                } else {
                    self.body.push_start(output);
                }
            }
        }
        Ok(())
    }
}

impl Step for RepeatStep {
    step_boilerplate!("repeat");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        loop {
            if let Some(traverser) = self.emitted.pop_front() {
                return Ok(Some(traverser));
            }
            let Some(traverser) = upstream.next(ctx)? else {
                return Ok(None);
            };
            if let Err(err) = self.run(traverser, ctx) {
                self.body.reset();
                return Err(err);
            }
        }
    }

    fn requirements(&self) -> Requirements {
        self.body.requirements() | Requirements::SINGLE_LOOP
    }

    fn reset(&mut self) {
        self.body.reset();
        self.emitted.clear();
    }

    fn local_children(&self) -> Vec<&Traversal> {
        vec![&self.body]
    }

    fn local_children_mut(&mut self) -> Vec<&mut Traversal> {
        vec![&mut self.body]
    }

    fn on_engine(&mut self, engine: Engine) {
        self.body.set_engine(engine);
    }
}
