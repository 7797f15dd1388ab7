// Copyright © 2026 Pathway

use std::collections::VecDeque;

use indexmap::map::Entry;
use indexmap::IndexMap;

use super::{CoalesceKey, Traverser};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum SetKey {
    Coalesced(CoalesceKey),
    Unique(u64),
}

/// An ordered collection of traversers in which equal traversers are merged
/// into one, adding up their bulks.
///
/// Traversers are coalesced while they wait; once the front is taken with
/// [`TraverserSet::pop_front`] the waiting traversers move to a ready queue
/// in arrival order.
#[derive(Clone, Debug, Default)]
pub struct TraverserSet {
    pending: IndexMap<SetKey, Traverser>,
    ready: VecDeque<Traverser>,
    next_unique: u64,
}

impl TraverserSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, traverser: Traverser) {
        let key = match traverser.coalesce_key() {
            Some(key) => SetKey::Coalesced(key),
            None => {
                self.next_unique += 1;
                SetKey::Unique(self.next_unique)
            }
        };
        let rejected = match self.pending.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().merge(&traverser).err().map(|_| traverser),
            Entry::Vacant(entry) => {
                entry.insert(traverser);
                None
            }
        };
        if let Some(traverser) = rejected {
            self.next_unique += 1;
            self.pending.insert(SetKey::Unique(self.next_unique), traverser);
        }
    }

    pub fn pop_front(&mut self) -> Option<Traverser> {
        if self.ready.is_empty() {
            self.ready
                .extend(self.pending.drain(..).map(|(_key, traverser)| traverser));
        }
        self.ready.pop_front()
    }

    /// Number of distinct traversers held.
    pub fn len(&self) -> usize {
        self.pending.len() + self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.ready.is_empty()
    }

    /// Number of logical traversers held, saturating at `u64::MAX`.
    pub fn total_bulk(&self) -> u64 {
        self.iter()
            .fold(0, |total, traverser| total.saturating_add(traverser.bulk()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Traverser> {
        self.ready.iter().chain(self.pending.values())
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.ready.clear();
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Traverser> + '_ {
        self.ready
            .drain(..)
            .chain(self.pending.drain(..).map(|(_key, traverser)| traverser))
    }
}

impl Extend<Traverser> for TraverserSet {
    fn extend<I: IntoIterator<Item = Traverser>>(&mut self, iter: I) {
        for traverser in iter {
            self.add(traverser);
        }
    }
}
