use std::collections::{BTreeMap, HashMap};

use arcstr::ArcStr;

use crate::engine::error::{Error, Result};
use crate::engine::side_effects::{MergeOperator, TraversalSideEffects};
use crate::engine::Value;

/// Results of a graph computer run, one slot per side-effect key.
///
/// Slots with a registered merge operator accumulate with [`Memory::add`];
/// any slot can be overwritten with [`Memory::set`].
#[derive(Clone, Debug, Default)]
pub struct Memory {
    values: BTreeMap<ArcStr, Value>,
    merges: HashMap<ArcStr, MergeOperator>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<ArcStr>, operator: MergeOperator) {
        self.merges.insert(key.into(), operator);
    }

    pub fn set(&mut self, key: impl Into<ArcStr>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Merges `value` into the slot, or fills the slot if it is empty.
    pub fn add(&mut self, key: &str, value: Value) -> Result<()> {
        let operator = self.merges.get(key).ok_or_else(|| {
            Error::invalid_configuration(format!("memory key {key:?} has no merge operator"))
        })?;
        let merged = match self.values.get(key) {
            Some(current) => operator.apply(current.clone(), &value)?,
            None => value,
        };
        self.values.insert(key.into(), merged);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ArcStr> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Writes every slot into `side_effects`.
    pub fn install_into(&self, side_effects: &mut TraversalSideEffects) {
        for (key, value) in &self.values {
            side_effects.set(key.clone(), value.clone());
        }
    }
}
