// too sensitive for `Arc<dyn Fn(...)>`
#![allow(clippy::type_complexity)]

pub mod error;
pub use self::error::{Error, Result};

pub mod value;
pub use self::value::{BulkSet, Key, KeyImpl, Value};

pub mod structure;
pub use structure::{
    Direction, Element, ElementData, ElementForm, ElementKind, ElementRef, GraphProvider,
    MemoryGraph, Partition,
};

pub mod reduce;
pub use reduce::Reducer;

pub mod traverser;
pub use traverser::{Future, Path, Requirements, Traverser, TraverserGenerator, TraverserSet};

pub mod side_effects;
pub use side_effects::{MergeOperator, TraversalSideEffects};

pub mod step;
pub use step::{Engine, Step, StepId};

pub mod traversal;
pub use traversal::Traversal;

pub mod strategy;
pub use strategy::{
    Detachment, HaltedTraverserStrategy, StrategyCategory, TraversalStrategies, TraversalStrategy,
};

pub mod computer;
pub use computer::{ComputerResult, GraphComputer, JobDescriptor, MapReduce, Partitioning};
