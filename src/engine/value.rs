// Copyright © 2026 Pathway

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher as _};
use std::sync::Arc;

use arcstr::ArcStr;
use itertools::Itertools as _;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3 as Hasher;

use super::error::{Error, Result};
use super::structure::Element;

pub type KeyImpl = u128;

/// Stable digest of a value, independent of the process that computed it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(pub KeyImpl);

impl Key {
    pub fn for_value(value: &Value) -> Self {
        let mut hasher = Hasher::default();
        value.hash(&mut hasher);
        Self(hasher.digest128())
    }

    pub fn for_values(values: &[Value]) -> Self {
        let mut hasher = Hasher::default();
        values.iter().for_each(|v| v.hash(&mut hasher));
        Self(hasher.digest128())
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn shard(&self) -> u64 {
        self.0 as u64
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn partition(&self, partitions: usize) -> usize {
        (self.shard() % partitions.max(1) as u64) as usize
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "^{:032X}", self.0)
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// A multiset that stores each distinct value once together with its multiplicity.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BulkSet {
    entries: BTreeMap<Value, u64>,
}

impl BulkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: Value, bulk: u64) {
        if bulk == 0 {
            return;
        }
        let entry = self.entries.entry(value).or_insert(0);
        *entry = entry.saturating_add(bulk);
    }

    pub fn merge(&mut self, other: &BulkSet) {
        for (value, bulk) in other.iter() {
            self.add(value.clone(), bulk);
        }
    }

    pub fn get(&self, value: &Value) -> u64 {
        self.entries.get(value).copied().unwrap_or(0)
    }

    /// Number of distinct values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all multiplicities, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.entries
            .values()
            .fold(0, |total, bulk| total.saturating_add(*bulk))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, u64)> {
        self.entries.iter().map(|(value, bulk)| (value, *bulk))
    }

    /// Every value repeated by its multiplicity.
    #[allow(clippy::cast_possible_truncation)]
    pub fn unroll(&self) -> impl Iterator<Item = &Value> {
        self.entries
            .iter()
            .flat_map(|(value, bulk)| std::iter::repeat_n(value, *bulk as usize))
    }
}

impl FromIterator<(Value, u64)> for BulkSet {
    fn from_iter<I: IntoIterator<Item = (Value, u64)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (value, bulk) in iter {
            set.add(value, bulk);
        }
        set
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(ArcStr),
    List(Arc<[Self]>),
    Map(Arc<BTreeMap<Self, Self>>),
    Bag(Arc<BulkSet>),
    Element(Element),
}

impl Value {
    #[inline(never)]
    #[cold]
    fn type_mismatch(&self, expected: &'static str) -> Error {
        Error::TypeMismatch {
            expected,
            value: self.clone(),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        if let Self::Int(i) = self {
            Ok(*i)
        } else {
            Err(self.type_mismatch("integer"))
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        if let Self::Bool(b) = self {
            Ok(*b)
        } else {
            Err(self.type_mismatch("bool"))
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match self {
            Self::Float(f) => Ok(f.into_inner()),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Ok(*i as f64),
            _ => Err(self.type_mismatch("float")),
        }
    }

    pub fn as_string(&self) -> Result<&ArcStr> {
        if let Self::String(s) = self {
            Ok(s)
        } else {
            Err(self.type_mismatch("string"))
        }
    }

    pub fn as_list(&self) -> Result<&Arc<[Self]>> {
        if let Self::List(l) = self {
            Ok(l)
        } else {
            Err(self.type_mismatch("list"))
        }
    }

    pub fn as_map(&self) -> Result<&BTreeMap<Self, Self>> {
        if let Self::Map(m) = self {
            Ok(m)
        } else {
            Err(self.type_mismatch("map"))
        }
    }

    /// Mutable access to a map value, copying the map first if it is shared.
    pub fn as_map_mut(&mut self) -> Result<&mut BTreeMap<Self, Self>> {
        if let Self::Map(m) = self {
            Ok(Arc::make_mut(m))
        } else {
            Err(self.type_mismatch("map"))
        }
    }

    pub fn as_bag(&self) -> Result<&BulkSet> {
        if let Self::Bag(b) = self {
            Ok(b)
        } else {
            Err(self.type_mismatch("bag"))
        }
    }

    pub fn as_element(&self) -> Result<&Element> {
        if let Self::Element(e) = self {
            Ok(e)
        } else {
            Err(self.type_mismatch("element"))
        }
    }

    pub fn empty_map() -> Self {
        Self::Map(Arc::new(BTreeMap::new()))
    }

    /// Rebuilds the value with every contained element replaced by `fun(element)`.
    pub fn map_elements(&self, fun: &mut impl FnMut(&Element) -> Result<Element>) -> Result<Self> {
        Ok(match self {
            Self::Element(element) => Self::Element(fun(element)?),
            Self::List(values) => Self::List(
                values
                    .iter()
                    .map(|v| v.map_elements(fun))
                    .collect::<Result<Vec<_>>>()?
                    .into(),
            ),
            Self::Map(map) => Self::Map(Arc::new(
                map.iter()
                    .map(|(k, v)| Ok((k.map_elements(fun)?, v.map_elements(fun)?)))
                    .collect::<Result<_>>()?,
            )),
            Self::Bag(bag) => Self::Bag(Arc::new(
                bag.iter()
                    .map(|(v, bulk)| Ok((v.map_elements(fun)?, bulk)))
                    .collect::<Result<_>>()?,
            )),
            other => other.clone(),
        })
    }
}

impl Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::None => write!(fmt, "None"),
            Self::Bool(b) => write!(fmt, "{b}"),
            Self::Int(i) => write!(fmt, "{i}"),
            Self::Float(OrderedFloat(f)) => write!(fmt, "{f:?}"),
            Self::String(s) => write!(fmt, "{s:?}"),
            Self::List(vals) => write!(fmt, "[{}]", vals.iter().format(", ")),
            Self::Map(map) => write!(
                fmt,
                "{{{}}}",
                map.iter().format_with(", ", |(k, v), f| f(&format_args!("{k}: {v}")))
            ),
            Self::Bag(bag) => write!(
                fmt,
                "{{{}}}",
                bag.iter()
                    .format_with(", ", |(v, bulk), f| f(&format_args!("{v}*{bulk}")))
            ),
            Self::Element(element) => write!(fmt, "{element}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(OrderedFloat(f))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<ArcStr> for Value {
    fn from(s: ArcStr) -> Self {
        Self::String(s)
    }
}

impl From<&[Value]> for Value {
    fn from(t: &[Value]) -> Self {
        Self::List(t.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(t: Vec<Value>) -> Self {
        Self::List(t.into())
    }
}

impl From<BTreeMap<Value, Value>> for Value {
    fn from(map: BTreeMap<Value, Value>) -> Self {
        Self::Map(Arc::new(map))
    }
}

impl From<BulkSet> for Value {
    fn from(bag: BulkSet) -> Self {
        Self::Bag(Arc::new(bag))
    }
}

impl From<Element> for Value {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Self::None,
        }
    }
}
