// Copyright © 2026 Pathway

mod path;
mod set;

pub use path::{Labels, Path, PathCache, PathEntry};
pub use set::TraverserSet;

use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

use arcstr::ArcStr;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use super::step::StepId;
use super::structure::GraphProvider;
use super::Value;

bitflags! {
    /// Capabilities a step pipeline needs from its traversers.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Requirements: u16 {
        const OBJECT = 1;
        const BULK = 1 << 1;
        const SINGLE_LOOP = 1 << 2;
        const PATH = 1 << 3;
        const LABELED_PATH = 1 << 4;
        const SIDE_EFFECTS = 1 << 5;
        const SACK = 1 << 6;
    }
}

impl Requirements {
    pub fn tracks_path(self) -> bool {
        self.intersects(Self::PATH | Self::LABELED_PATH)
    }
}

/// Where a traverser goes next.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Future {
    Step(StepId),
    Halt,
}

impl Display for Future {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Step(id) => write!(f, "{id}"),
            Self::Halt => write!(f, "halt"),
        }
    }
}

/// The part of a traverser that decides whether two traversers may be merged.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CoalesceKey {
    pub value: Value,
    pub future: Future,
    pub loops: u32,
}

/// A value flowing through a traversal, standing for `bulk` identical traversers.
///
/// Path and sack are only carried when the traversal requirements ask for them.
/// Equality looks at `(value, future, loops)` and never at the path: two
/// traversers that only differ in provenance are merged. A traverser with a
/// sack is not equal to anything.
#[derive(Clone, Debug)]
pub struct Traverser {
    value: Value,
    future: Future,
    loops: u32,
    bulk: u64,
    path: Option<Path>,
    sack: Option<Value>,
    requirements: Requirements,
}

impl Traverser {
    pub fn get(&self) -> &Value {
        &self.value
    }

    pub fn set(&mut self, value: Value) {
        self.value = value;
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn future(&self) -> &Future {
        &self.future
    }

    pub fn set_future(&mut self, future: Future) {
        self.future = future;
    }

    pub fn loops(&self) -> u32 {
        self.loops
    }

    pub fn incr_loops(&mut self) {
        self.loops += 1;
    }

    pub fn reset_loops(&mut self) {
        self.loops = 0;
    }

    pub fn bulk(&self) -> u64 {
        self.bulk
    }

    pub fn set_bulk(&mut self, bulk: u64) {
        self.bulk = bulk;
    }

    pub fn requirements(&self) -> Requirements {
        self.requirements
    }

    pub fn path(&self) -> Result<&Path> {
        self.path
            .as_ref()
            .ok_or(Error::UnsupportedOperation("path tracking was not requested"))
    }

    pub fn sack(&self) -> Result<&Value> {
        self.sack
            .as_ref()
            .ok_or(Error::UnsupportedOperation("sack was not requested"))
    }

    pub fn set_sack(&mut self, sack: Value) -> Result<()> {
        if !self.requirements.contains(Requirements::SACK) {
            return Err(Error::UnsupportedOperation("sack was not requested"));
        }
        self.sack = Some(sack);
        Ok(())
    }

    fn records(&self, labels: &[ArcStr]) -> bool {
        self.requirements.contains(Requirements::PATH)
            || (self.requirements.contains(Requirements::LABELED_PATH) && !labels.is_empty())
    }

    /// Records the current value in the path under `labels`.
    pub fn extend_path(&mut self, labels: &[ArcStr], cache: &mut PathCache) {
        if !self.records(labels) {
            return;
        }
        if let Some(path) = &self.path {
            self.path = Some(path.extend(labels.iter().cloned().collect(), self.value.clone(), cache));
        }
    }

    /// The successor of this traverser holding `value`, produced by a step labeled `labels`.
    #[must_use]
    pub fn split(&self, value: Value, labels: &[ArcStr], cache: &mut PathCache) -> Self {
        let mut next = Self {
            value,
            future: self.future.clone(),
            loops: self.loops,
            bulk: self.bulk,
            path: self.path.clone(),
            sack: self.sack.clone(),
            requirements: self.requirements,
        };
        next.extend_path(labels, cache);
        next
    }

    /// Resolves every element reference in the value, and in the path if there is
    /// one, into its attached form.
    pub fn attach(&mut self, graph: &dyn GraphProvider, cache: &mut PathCache) -> Result<()> {
        let attach = |value: &Value| {
            value.map_elements(&mut |element| {
                if element.is_attached() {
                    Ok(element.clone())
                } else {
                    graph.resolve(&element.reference())
                }
            })
        };
        self.value = attach(&self.value)?;
        if let Some(path) = &self.path {
            self.path = Some(path.try_map_objects(attach, cache)?);
        }
        Ok(())
    }

    pub fn coalesce_key(&self) -> Option<CoalesceKey> {
        self.sack.is_none().then(|| CoalesceKey {
            value: self.value.clone(),
            future: self.future.clone(),
            loops: self.loops,
        })
    }

    pub fn is_mergeable_with(&self, other: &Self) -> bool {
        self.sack.is_none()
            && other.sack.is_none()
            && self.loops == other.loops
            && self.future == other.future
            && self.value == other.value
    }

    /// Absorbs `other`, which must be equal to this traverser. Bulk saturates
    /// at `u64::MAX`.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if !self.is_mergeable_with(other) {
            return Err(Error::IncompatibleMerge);
        }
        self.bulk = self.bulk.saturating_add(other.bulk);
        Ok(())
    }
}

impl PartialEq for Traverser {
    fn eq(&self, other: &Self) -> bool {
        self.is_mergeable_with(other)
    }
}

impl Hash for Traverser {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
        self.future.hash(state);
        self.loops.hash(state);
    }
}

impl Display for Traverser {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.bulk == 1 {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{}*{}", self.value, self.bulk)
        }
    }
}

/// Builds traversers carrying exactly the features the requirements ask for.
#[derive(Clone, Copy, Debug)]
pub struct TraverserGenerator {
    requirements: Requirements,
    share_paths: bool,
}

impl TraverserGenerator {
    pub fn new(requirements: Requirements, share_paths: bool) -> Self {
        Self {
            requirements,
            share_paths,
        }
    }

    pub fn requirements(&self) -> Requirements {
        self.requirements
    }

    pub fn generate(
        &self,
        value: Value,
        future: Future,
        labels: &[ArcStr],
        bulk: u64,
        sack: Option<Value>,
        cache: &mut PathCache,
    ) -> Traverser {
        let mut traverser = Traverser {
            value,
            future,
            loops: 0,
            bulk,
            path: self
                .requirements
                .tracks_path()
                .then(|| Path::empty(self.share_paths)),
            sack: sack.filter(|_| self.requirements.contains(Requirements::SACK)),
            requirements: self.requirements,
        };
        traverser.extend_path(labels, cache);
        traverser
    }
}
