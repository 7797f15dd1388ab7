// Copyright © 2026 Pathway

use std::any::Any;

use serde::{Deserialize, Serialize};

use super::{StrategyCategory, TraversalStrategy};
use crate::engine::error::Result;
use crate::engine::traversal::Traversal;
use crate::engine::traverser::Traverser;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Detachment {
    /// Only the identifier and label survive.
    #[default]
    Reference,
    /// A self-contained copy of the element and its properties.
    Detached,
}

/// Decides what an element looks like once a traverser leaves the process.
///
/// Applying the strategy changes nothing; the engine calls [`halt`] on every
/// traverser it hands out through a remote channel or returns from a
/// partitioned run.
///
/// [`halt`]: HaltedTraverserStrategy::halt
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HaltedTraverserStrategy {
    detachment: Detachment,
}

impl HaltedTraverserStrategy {
    pub fn new(detachment: Detachment) -> Self {
        Self { detachment }
    }

    pub fn reference() -> Self {
        Self::new(Detachment::Reference)
    }

    pub fn detached() -> Self {
        Self::new(Detachment::Detached)
    }

    pub fn detachment(&self) -> Detachment {
        self.detachment
    }

    /// Rewrites the elements in the traverser's value. Nothing else about the
    /// traverser changes, and halting twice is the same as halting once.
    pub fn halt(&self, mut traverser: Traverser) -> Result<Traverser> {
        let value = traverser.get().map_elements(&mut |element| {
            Ok(match self.detachment {
                Detachment::Reference => element.to_reference(),
                Detachment::Detached => element.to_detached(),
            })
        })?;
        traverser.set(value);
        Ok(traverser)
    }
}

impl TraversalStrategy for HaltedTraverserStrategy {
    fn name(&self) -> &'static str {
        "HaltedTraverserStrategy"
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Decoration
    }

    fn apply(&self, _traversal: &mut Traversal) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
