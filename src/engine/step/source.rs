// Copyright © 2026 Pathway

use super::{step_boilerplate, Step, StepBase, StepContext, Upstream};
use crate::engine::error::Result;
use crate::engine::structure::ElementRef;
use crate::engine::traverser::{Traverser, TraverserSet};
use crate::engine::Value;

/// Emits its seed values once, then passes through whatever the traversal was
/// started with.
#[derive(Debug, Clone, Default)]
pub struct StartStep {
    base: StepBase,
    seeds: Vec<Value>,
    generated: TraverserSet,
    started: bool,
}

impl StartStep {
    pub fn new(seeds: impl IntoIterator<Item = Value>) -> Self {
        Self {
            seeds: seeds.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn seeds(&self) -> &[Value] {
        &self.seeds
    }
}

impl Step for StartStep {
    step_boilerplate!("start");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if !self.started {
            self.started = true;
            for seed in &self.seeds {
                let traverser = ctx.generate(seed.clone(), &self.base.labels, 1);
                self.generated.add(traverser);
            }
        }
        match self.generated.pop_front() {
            Some(traverser) => Ok(Some(traverser)),
            None => upstream.next(ctx),
        }
    }

    fn reset(&mut self) {
        self.generated.clear();
        self.started = false;
    }
}

/// Emits graph vertices: all of them, the ones with the given ids, or, inside a
/// partitioned run, only the vertices the current partition owns.
#[derive(Debug, Clone, Default)]
pub struct GraphStep {
    base: StepBase,
    ids: Vec<ElementRef>,
    generated: TraverserSet,
    started: bool,
}

impl GraphStep {
    pub fn new(ids: impl IntoIterator<Item = ElementRef>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    fn fill(&mut self, ctx: &mut StepContext<'_>) -> Result<()> {
        let graph = ctx.graph()?;
        let mut vertices = match ctx.env.partition {
            Some(partition) => graph.local_vertices(partition)?,
            None => graph.vertices()?,
        };
        if !self.ids.is_empty() {
            vertices.retain(|vertex| self.ids.contains(&vertex.reference()));
        }
        for vertex in vertices {
            let traverser = ctx.generate(Value::Element(vertex), &self.base.labels, 1);
            self.generated.add(traverser);
        }
        Ok(())
    }
}

impl Step for GraphStep {
    step_boilerplate!("graph");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if !self.started {
            self.started = true;
            self.fill(ctx)?;
        }
        match self.generated.pop_front() {
            Some(traverser) => Ok(Some(traverser)),
            None => upstream.next(ctx),
        }
    }

    fn reset(&mut self) {
        self.generated.clear();
        self.started = false;
    }
}
