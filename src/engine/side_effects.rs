// Copyright © 2026 Pathway

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arcstr::ArcStr;
use derivative::Derivative;
use itertools::Itertools as _;

use super::error::{Error, Result};
use super::traverser::PathCache;
use super::Value;

pub type Supplier = Arc<dyn Fn() -> Value + Send + Sync>;

pub fn empty_map_supplier() -> Supplier {
    Arc::new(Value::empty_map)
}

/// Associative operator that folds partial side-effect values into one.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct MergeOperator {
    #[derivative(Debug = "ignore")]
    op: Arc<dyn Fn(Value, &Value) -> Result<Value> + Send + Sync>,
    commutative: bool,
    requires_final_pass: bool,
}

impl MergeOperator {
    pub fn new(
        op: impl Fn(Value, &Value) -> Result<Value> + Send + Sync + 'static,
        commutative: bool,
        requires_final_pass: bool,
    ) -> Self {
        Self {
            op: Arc::new(op),
            commutative,
            requires_final_pass,
        }
    }

    pub fn apply(&self, accumulator: Value, value: &Value) -> Result<Value> {
        (self.op)(accumulator, value)
    }

    pub fn is_commutative(&self) -> bool {
        self.commutative
    }

    pub fn requires_final_pass(&self) -> bool {
        self.requires_final_pass
    }
}

/// Named values shared by every traverser of one traversal execution.
///
/// Every key a step writes has a supplier registered when the step is added,
/// so reading a key that was never written yields the default value.
#[derive(Default)]
pub struct TraversalSideEffects {
    values: HashMap<ArcStr, Value>,
    suppliers: HashMap<ArcStr, Supplier>,
    merges: HashMap<ArcStr, MergeOperator>,
    sack: Option<Supplier>,
    path_cache: PathCache,
}

impl TraversalSideEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_supplier(&mut self, key: impl Into<ArcStr>, supplier: Supplier) {
        self.suppliers.insert(key.into(), supplier);
    }

    pub fn register_supplier_if_absent(&mut self, key: impl Into<ArcStr>, supplier: Supplier) {
        self.suppliers.entry(key.into()).or_insert(supplier);
    }

    pub fn registered_supplier(&self, key: &str) -> Option<Supplier> {
        self.suppliers.get(key).cloned()
    }

    pub fn register_merge(&mut self, key: impl Into<ArcStr>, operator: MergeOperator) {
        self.merges.insert(key.into(), operator);
    }

    pub fn merge_operator(&self, key: &str) -> Option<&MergeOperator> {
        self.merges.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Result<Value> {
        if let Some(value) = self.values.get(key) {
            return Ok(value.clone());
        }
        self.suppliers
            .get(key)
            .map(|supplier| supplier())
            .ok_or_else(|| Error::SideEffectNotRegistered(key.into()))
    }

    /// Mutable access to the value, materialising the default first if needed.
    pub fn get_mut(&mut self, key: &str) -> Result<&mut Value> {
        if !self.values.contains_key(key) {
            let supplier = self
                .suppliers
                .get(key)
                .ok_or_else(|| Error::SideEffectNotRegistered(key.into()))?;
            self.values.insert(key.into(), supplier());
        }
        self.values
            .get_mut(key)
            .ok_or_else(|| Error::SideEffectNotRegistered(key.into()))
    }

    pub fn set(&mut self, key: impl Into<ArcStr>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Keys that currently hold a value, sorted.
    pub fn keys(&self) -> Vec<ArcStr> {
        self.values.keys().cloned().sorted().collect()
    }

    /// Folds `value` into the current value of `key` with the registered merge operator.
    pub fn merge_into(&mut self, key: &str, value: &Value) -> Result<()> {
        let operator = self.merges.get(key).cloned().ok_or_else(|| {
            Error::invalid_configuration(format!("no merge operator registered for {key:?}"))
        })?;
        let current = self.get(key)?;
        let merged = operator.apply(current, value)?;
        self.set(key, merged);
        Ok(())
    }

    pub fn with_sack(&mut self, supplier: Supplier) {
        self.sack = Some(supplier);
    }

    pub fn has_sack(&self) -> bool {
        self.sack.is_some()
    }

    pub fn sack_initial(&self) -> Option<Value> {
        self.sack.as_ref().map(|supplier| supplier())
    }

    pub fn path_cache(&self) -> &PathCache {
        &self.path_cache
    }

    pub fn path_cache_mut(&mut self) -> &mut PathCache {
        &mut self.path_cache
    }

    pub fn release_path_cache(&mut self) {
        self.path_cache.release();
    }

    /// Forgets every written value, keeping the registrations.
    pub fn clear_values(&mut self) {
        self.values.clear();
    }
}

impl Clone for TraversalSideEffects {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            suppliers: self.suppliers.clone(),
            merges: self.merges.clone(),
            sack: self.sack.clone(),
            path_cache: PathCache::new(),
        }
    }
}

impl fmt::Debug for TraversalSideEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraversalSideEffects")
            .field("keys", &self.keys())
            .field("registered", &self.suppliers.keys().sorted().collect_vec())
            .field("cached_path_segments", &self.path_cache.len())
            .finish_non_exhaustive()
    }
}
