use std::iter::repeat_n;
use std::num::NonZeroU64;

use ordered_float::OrderedFloat;

use super::error::{DynError, Error, Result};
use super::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Count,
    Sum,
    Min,
    Max,
    Fold,
}

pub trait ReducerImpl {
    type State;

    /// State for one distinct value that occurs `bulk` times.
    fn init(&self, value: &Value, bulk: NonZeroU64) -> Result<Self::State>;

    fn combine(&self, lhs: Self::State, rhs: Self::State) -> Result<Self::State>;

    /// Result for an empty input, if the reducer produces one.
    fn neutral(&self) -> Option<Value>;

    fn finish(&self, state: Self::State) -> Value;
}

impl Reducer {
    pub fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Fold => "fold",
        }
    }

    /// Reduces `(value, bulk)` pairs; `None` when the input is empty and the
    /// reducer has no neutral element.
    pub fn reduce<'a>(
        self,
        values: impl IntoIterator<Item = (&'a Value, u64)>,
    ) -> Result<Option<Value>> {
        match self {
            Self::Count => run(&CountReducer, values),
            Self::Sum => run(&SumReducer, values),
            Self::Min => run(&MinReducer, values),
            Self::Max => run(&MaxReducer, values),
            Self::Fold => run(&FoldReducer, values),
        }
    }
}

fn run<'a, R: ReducerImpl>(
    reducer: &R,
    values: impl IntoIterator<Item = (&'a Value, u64)>,
) -> Result<Option<Value>> {
    let mut state: Option<R::State> = None;
    for (value, bulk) in values {
        let Some(bulk) = NonZeroU64::new(bulk) else {
            continue;
        };
        let next = reducer.init(value, bulk)?;
        state = Some(match state {
            Some(state) => reducer.combine(state, next)?,
            None => next,
        });
    }
    Ok(match state {
        Some(state) => Some(reducer.finish(state)),
        None => reducer.neutral(),
    })
}

fn overflow() -> Error {
    Error::from(DynError::from("integer overflow in sum"))
}

#[derive(Debug, Clone, Copy)]
pub struct CountReducer;

impl ReducerImpl for CountReducer {
    type State = u64;

    fn init(&self, _value: &Value, bulk: NonZeroU64) -> Result<Self::State> {
        Ok(bulk.get())
    }

    fn combine(&self, lhs: Self::State, rhs: Self::State) -> Result<Self::State> {
        Ok(lhs + rhs)
    }

    fn neutral(&self) -> Option<Value> {
        Some(Value::Int(0))
    }

    fn finish(&self, state: Self::State) -> Value {
        Value::Int(i64::try_from(state).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SumReducer;

#[derive(Debug, Clone, Copy)]
pub enum SumState {
    Int(i64),
    Float(f64),
}

impl ReducerImpl for SumReducer {
    type State = SumState;

    #[allow(clippy::cast_precision_loss)]
    fn init(&self, value: &Value, bulk: NonZeroU64) -> Result<Self::State> {
        match value {
            Value::Int(i) => i64::try_from(bulk.get())
                .ok()
                .and_then(|bulk| i.checked_mul(bulk))
                .map(SumState::Int)
                .ok_or_else(overflow),
            Value::Float(OrderedFloat(f)) => Ok(SumState::Float(f * bulk.get() as f64)),
            other => Err(Error::TypeMismatch {
                expected: "number",
                value: other.clone(),
            }),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn combine(&self, lhs: Self::State, rhs: Self::State) -> Result<Self::State> {
        Ok(match (lhs, rhs) {
            (SumState::Int(lhs), SumState::Int(rhs)) => {
                SumState::Int(lhs.checked_add(rhs).ok_or_else(overflow)?)
            }
            (SumState::Int(lhs), SumState::Float(rhs)) => SumState::Float(lhs as f64 + rhs),
            (SumState::Float(lhs), SumState::Int(rhs)) => SumState::Float(lhs + rhs as f64),
            (SumState::Float(lhs), SumState::Float(rhs)) => SumState::Float(lhs + rhs),
        })
    }

    fn neutral(&self) -> Option<Value> {
        Some(Value::Int(0))
    }

    fn finish(&self, state: Self::State) -> Value {
        match state {
            SumState::Int(i) => Value::Int(i),
            SumState::Float(f) => Value::from(f),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MinReducer;

impl ReducerImpl for MinReducer {
    type State = Value;

    fn init(&self, value: &Value, _bulk: NonZeroU64) -> Result<Self::State> {
        Ok(value.clone())
    }

    fn combine(&self, lhs: Self::State, rhs: Self::State) -> Result<Self::State> {
        Ok(lhs.min(rhs))
    }

    fn neutral(&self) -> Option<Value> {
        None
    }

    fn finish(&self, state: Self::State) -> Value {
        state
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaxReducer;

impl ReducerImpl for MaxReducer {
    type State = Value;

    fn init(&self, value: &Value, _bulk: NonZeroU64) -> Result<Self::State> {
        Ok(value.clone())
    }

    fn combine(&self, lhs: Self::State, rhs: Self::State) -> Result<Self::State> {
        Ok(lhs.max(rhs))
    }

    fn neutral(&self) -> Option<Value> {
        None
    }

    fn finish(&self, state: Self::State) -> Value {
        state
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FoldReducer;

impl ReducerImpl for FoldReducer {
    type State = Vec<Value>;

    #[allow(clippy::cast_possible_truncation)]
    fn init(&self, value: &Value, bulk: NonZeroU64) -> Result<Self::State> {
        Ok(repeat_n(value.clone(), bulk.get() as usize).collect())
    }

    fn combine(&self, mut lhs: Self::State, rhs: Self::State) -> Result<Self::State> {
        lhs.extend(rhs);
        Ok(lhs)
    }

    fn neutral(&self) -> Option<Value> {
        Some(Value::from(Vec::<Value>::new()))
    }

    fn finish(&self, state: Self::State) -> Value {
        Value::from(state)
    }
}
