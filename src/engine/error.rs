// Copyright © 2026 Pathway

use std::error;
use std::result;

use arcstr::ArcStr;

use super::structure::ElementRef;
use super::Value;

#[allow(clippy::module_name_repetitions)]
pub type DynError = Box<dyn error::Error + Send + Sync>;
pub type DynResult<T> = result::Result<T, DynError>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid step configuration: {0}")]
    InvalidStepConfiguration(String),

    #[error("strategy ordering error: {0}")]
    StrategyOrdering(String),

    #[error("traversal is locked, strategies have already been applied")]
    TraversalLocked,

    #[error("traversers are not mergeable")]
    IncompatibleMerge,

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("the provided traverser does not map to a value: {0}")]
    NoResult(String),

    #[error("type mismatch: expected {expected}, got {value:?}")]
    TypeMismatch {
        expected: &'static str,
        value: Value,
    },

    #[error("side effect {0:?} has no value and no registered supplier")]
    SideEffectNotRegistered(ArcStr),

    #[error("element not found: {0}")]
    ElementNotFound(ElementRef),

    #[error("no graph is attached to the traversal")]
    NoGraph,

    #[error("partition {partition} failed after {attempts} attempts: {source}")]
    PartitionFailed {
        partition: usize,
        attempts: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("reduce of key {key} failed after {attempts} attempts: {source}")]
    ReduceFailed {
        key: Value,
        attempts: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("no map-reduce job for step {0}")]
    JobNotFound(String),

    #[error("job descriptor is malformed: {0}")]
    MalformedDescriptor(#[from] serde_json::Error),

    #[error(transparent)]
    Other(DynError),
}

impl Error {
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidStepConfiguration(message.into())
    }

    pub fn downcast<E: error::Error + 'static>(self) -> Result<E, Self> {
        match self {
            Self::Other(inner) => match inner.downcast::<E>() {
                Ok(error) => Ok(*error),
                Err(other) => Err(Self::Other(other)),
            },
            other => Err(other),
        }
    }
}

impl From<DynError> for Error {
    fn from(value: DynError) -> Self {
        match value.downcast::<Self>() {
            Ok(this) => *this,
            Err(other) => Self::Other(other),
        }
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;
