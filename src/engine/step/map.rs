// Copyright © 2026 Pathway

use std::collections::VecDeque;
use std::sync::Arc;

use arcstr::ArcStr;
use derivative::Derivative;

use super::{step_boilerplate, Step, StepBase, StepContext, Upstream};
use crate::engine::error::{DynResult, Error, Result};
use crate::engine::structure::Direction;
use crate::engine::traverser::{Requirements, Traverser};
use crate::engine::Value;

pub type MapFn = Arc<dyn Fn(&Traverser) -> DynResult<Value> + Send + Sync>;
pub type FlatMapFn = Arc<dyn Fn(&Traverser) -> DynResult<Vec<Value>> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct IdentityStep {
    base: StepBase,
}

impl IdentityStep {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Step for IdentityStep {
    step_boilerplate!("identity");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        let Some(mut traverser) = upstream.next(ctx)? else {
            return Ok(None);
        };
        if !self.base.labels.is_empty() {
            traverser.extend_path(&self.base.labels, ctx.side_effects.path_cache_mut());
        }
        Ok(Some(traverser))
    }
}

#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct LambdaMapStep {
    base: StepBase,
    #[derivative(Debug = "ignore")]
    function: MapFn,
}

impl LambdaMapStep {
    pub fn new(function: impl Fn(&Traverser) -> DynResult<Value> + Send + Sync + 'static) -> Self {
        Self {
            base: StepBase::default(),
            function: Arc::new(function),
        }
    }
}

impl Step for LambdaMapStep {
    step_boilerplate!("map");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.next(ctx)? else {
            return Ok(None);
        };
        let value = (self.function)(&traverser)?;
        Ok(Some(ctx.split(&traverser, value, &self.base.labels)))
    }
}

/// Value of one property of an element, or of one entry of a map. Traversers
/// whose object lacks the key are dropped.
#[derive(Debug, Clone)]
pub struct PropertiesStep {
    base: StepBase,
    key: ArcStr,
}

impl PropertiesStep {
    pub fn new(key: impl Into<ArcStr>) -> Self {
        Self {
            base: StepBase::default(),
            key: key.into(),
        }
    }

    fn lookup(&self, value: &Value) -> Result<Option<Value>> {
        match value {
            Value::Element(element) => Ok(element.property(&self.key).cloned()),
            Value::Map(map) => Ok(map.get(&Value::String(self.key.clone())).cloned()),
            other => Err(Error::TypeMismatch {
                expected: "element or map",
                value: other.clone(),
            }),
        }
    }
}

impl Step for PropertiesStep {
    step_boilerplate!("values");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        while let Some(traverser) = upstream.next(ctx)? {
            if let Some(value) = self.lookup(traverser.get())? {
                return Ok(Some(ctx.split(&traverser, value, &self.base.labels)));
            }
        }
        Ok(None)
    }
}

/// Emits the members of a collection. Members of a bag keep their
/// multiplicity as bulk instead of being repeated.
#[derive(Debug, Clone, Default)]
pub struct UnfoldStep {
    base: StepBase,
    buffer: VecDeque<Traverser>,
}

impl UnfoldStep {
    pub fn new() -> Self {
        Self::default()
    }

    fn unfold(&mut self, traverser: &Traverser, ctx: &mut StepContext<'_>) {
        let labels = &self.base.labels;
        match traverser.get() {
            Value::List(items) => {
                for item in items.iter() {
                    self.buffer.push_back(ctx.split(traverser, item.clone(), labels));
                }
            }
            Value::Bag(bag) => {
                for (item, multiplicity) in bag.iter() {
                    let mut next = ctx.split(traverser, item.clone(), labels);
                    next.set_bulk(traverser.bulk().saturating_mul(multiplicity));
                    self.buffer.push_back(next);
                }
            }
            Value::Map(map) => {
                for (key, value) in map.iter() {
                    let entry = Value::from(vec![key.clone(), value.clone()]);
                    self.buffer.push_back(ctx.split(traverser, entry, labels));
                }
            }
            other => {
                let next = ctx.split(traverser, other.clone(), labels);
                self.buffer.push_back(next);
            }
        }
    }
}

impl Step for UnfoldStep {
    step_boilerplate!("unfold");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        loop {
            if let Some(traverser) = self.buffer.pop_front() {
                return Ok(Some(traverser));
            }
            let Some(traverser) = upstream.next(ctx)? else {
                return Ok(None);
            };
            self.unfold(&traverser, ctx);
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct LambdaFlatMapStep {
    base: StepBase,
    #[derivative(Debug = "ignore")]
    function: FlatMapFn,
    buffer: VecDeque<Traverser>,
}

impl LambdaFlatMapStep {
    pub fn new(
        function: impl Fn(&Traverser) -> DynResult<Vec<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            base: StepBase::default(),
            function: Arc::new(function),
            buffer: VecDeque::new(),
        }
    }
}

impl Step for LambdaFlatMapStep {
    step_boilerplate!("flatMap");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        loop {
            if let Some(traverser) = self.buffer.pop_front() {
                return Ok(Some(traverser));
            }
            let Some(traverser) = upstream.next(ctx)? else {
                return Ok(None);
            };
            for value in (self.function)(&traverser)? {
                let next = ctx.split(&traverser, value, &self.base.labels);
                self.buffer.push_back(next);
            }
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Walks from a vertex to its neighbours.
#[derive(Debug, Clone)]
pub struct VertexStep {
    base: StepBase,
    direction: Direction,
    edge_labels: Vec<ArcStr>,
    buffer: VecDeque<Traverser>,
}

impl VertexStep {
    pub fn new(direction: Direction, edge_labels: impl IntoIterator<Item = ArcStr>) -> Self {
        Self {
            base: StepBase::default(),
            direction,
            edge_labels: edge_labels.into_iter().collect(),
            buffer: VecDeque::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl Step for VertexStep {
    step_boilerplate!("vertex");

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        loop {
            if let Some(traverser) = self.buffer.pop_front() {
                return Ok(Some(traverser));
            }
            let Some(traverser) = upstream.next(ctx)? else {
                return Ok(None);
            };
            let vertex = traverser.get().as_element()?.reference();
            let neighbours = ctx
                .graph()?
                .adjacent(&vertex, self.direction, &self.edge_labels)?;
            for neighbour in neighbours {
                let next = ctx.split(&traverser, Value::Element(neighbour), &self.base.labels);
                self.buffer.push_back(next);
            }
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Replaces the object with the list of objects on the traverser's path.
#[derive(Debug, Clone, Default)]
pub struct PathStep {
    base: StepBase,
}

impl PathStep {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Step for PathStep {
    step_boilerplate!("path");

    fn requirements(&self) -> Requirements {
        Requirements::PATH
    }

    fn next(
        &mut self,
        upstream: &mut dyn Upstream,
        ctx: &mut StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.next(ctx)? else {
            return Ok(None);
        };
        let objects = Value::from(traverser.path()?.objects());
        Ok(Some(ctx.split(&traverser, objects, &self.base.labels)))
    }
}
