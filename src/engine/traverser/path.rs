use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use arcstr::ArcStr;
use itertools::Itertools as _;
use smallvec::SmallVec;

use crate::engine::error::Result;
use crate::engine::Value;

pub type Labels = SmallVec<[ArcStr; 2]>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathEntry {
    pub labels: Labels,
    pub object: Value,
}

#[derive(Debug)]
struct PathSegment {
    id: u64,
    parent: Option<Arc<PathSegment>>,
    entry: PathEntry,
    len: usize,
}

#[derive(Clone)]
enum Repr {
    Flat(Vec<PathEntry>),
    Shared(Option<Arc<PathSegment>>),
}

/// Provenance of a traverser: the objects it visited and the labels of the
/// steps it visited them at.
///
/// A path is either a plain vector, copied whenever a traverser splits, or a
/// chain of segments interned by a [`PathCache`], in which case traversers with a
/// common prefix point at the same segments. Both forms behave identically.
#[derive(Clone)]
pub struct Path {
    repr: Repr,
}

impl Path {
    pub fn empty(shared: bool) -> Self {
        let repr = if shared {
            Repr::Shared(None)
        } else {
            Repr::Flat(Vec::new())
        };
        Self { repr }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.repr, Repr::Shared(_))
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Flat(entries) => entries.len(),
            Repr::Shared(tip) => tip.as_ref().map_or(0, |segment| segment.len),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn extend(&self, labels: Labels, object: Value, cache: &mut PathCache) -> Self {
        let entry = PathEntry { labels, object };
        let repr = match &self.repr {
            Repr::Flat(entries) => {
                let mut entries = entries.clone();
                entries.push(entry);
                Repr::Flat(entries)
            }
            Repr::Shared(tip) => Repr::Shared(Some(cache.segment(tip.as_ref(), entry))),
        };
        Self { repr }
    }

    /// Entries from the oldest to the most recent.
    pub fn entries(&self) -> Vec<PathEntry> {
        match &self.repr {
            Repr::Flat(entries) => entries.clone(),
            Repr::Shared(tip) => {
                let mut entries = Vec::with_capacity(self.len());
                let mut current = tip.as_deref();
                while let Some(segment) = current {
                    entries.push(segment.entry.clone());
                    current = segment.parent.as_deref();
                }
                entries.reverse();
                entries
            }
        }
    }

    pub fn objects(&self) -> Vec<Value> {
        self.entries().into_iter().map(|entry| entry.object).collect()
    }

    pub fn labels(&self) -> Vec<Labels> {
        self.entries().into_iter().map(|entry| entry.labels).collect()
    }

    /// The most recent object recorded under `label`.
    pub fn get(&self, label: &str) -> Option<Value> {
        match &self.repr {
            Repr::Flat(entries) => entries
                .iter()
                .rev()
                .find(|entry| entry.labels.iter().any(|l| l == label))
                .map(|entry| entry.object.clone()),
            Repr::Shared(tip) => {
                let mut current = tip.as_deref();
                while let Some(segment) = current {
                    if segment.entry.labels.iter().any(|l| l == label) {
                        return Some(segment.entry.object.clone());
                    }
                    current = segment.parent.as_deref();
                }
                None
            }
        }
    }

    /// Rebuilds the path with every object passed through `fun`, keeping its form.
    pub fn try_map_objects(
        &self,
        mut fun: impl FnMut(&Value) -> Result<Value>,
        cache: &mut PathCache,
    ) -> Result<Self> {
        let mut rebuilt = Self::empty(self.is_shared());
        for entry in self.entries() {
            rebuilt = rebuilt.extend(entry.labels, fun(&entry.object)?, cache);
        }
        Ok(rebuilt)
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.entries() == other.entries()
    }
}

impl Eq for Path {}

impl Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "path[{}]",
            self.entries().iter().format_with(", ", |entry, f| {
                if entry.labels.is_empty() {
                    f(&entry.object)
                } else {
                    f(&format_args!("{}@{}", entry.object, entry.labels.iter().format("/")))
                }
            })
        )
    }
}

/// Interns path segments for one traversal execution, so that traversers
/// extending the same prefix with the same entry share the resulting segment.
///
/// The cache is owned by the side-effects store of the execution and is
/// emptied by [`PathCache::release`] when the execution ends.
#[derive(Debug, Default)]
pub struct PathCache {
    segments: HashMap<(u64, PathEntry), Arc<PathSegment>>,
    next_id: u64,
    hits: u64,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn segment(&mut self, parent: Option<&Arc<PathSegment>>, entry: PathEntry) -> Arc<PathSegment> {
        let parent_id = parent.map_or(0, |segment| segment.id);
        let key = (parent_id, entry);
        if let Some(segment) = self.segments.get(&key) {
            let same_parent = match (&segment.parent, parent) {
                (None, None) => true,
                (Some(cached), Some(parent)) => Arc::ptr_eq(cached, parent),
                _ => false,
            };
            if same_parent {
                self.hits += 1;
                return segment.clone();
            }
        }
        self.next_id += 1;
        let segment = Arc::new(PathSegment {
            id: self.next_id,
            parent: parent.cloned(),
            entry: key.1.clone(),
            len: parent.map_or(0, |segment| segment.len) + 1,
        });
        self.segments.insert(key, segment.clone());
        segment
    }

    /// Number of interned segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// How many extensions were served by an existing segment.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn release(&mut self) {
        self.segments.clear();
        self.segments.shrink_to_fit();
    }
}
