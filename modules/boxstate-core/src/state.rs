//! State values and the snapshot mapping.
//!
//! Box state lives in the snapshot type-erased behind [`StateValue`], so a
//! single mapping can hold partitions of different types. Every state type
//! must serialize, which keeps the whole snapshot dehydratable.

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};

/// Requirements for the state held by a box.
pub trait State: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> State for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Object-safe view of a box's state.
pub trait StateValue: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Dehydrate into the JSON shape used for preloaded snapshots.
    fn to_json(&self) -> Result<serde_json::Value>;

    fn type_name(&self) -> &'static str;
}

impl<T: State> StateValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

impl std::fmt::Debug for dyn StateValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_json() {
            Ok(value) => write!(f, "{value}"),
            Err(_) => write!(f, "<{}>", self.type_name()),
        }
    }
}

/// Recover a typed clone of an erased state value.
pub(crate) fn downcast_state<S: State>(key: &str, value: &dyn StateValue) -> Result<S> {
    value
        .as_any()
        .downcast_ref::<S>()
        .cloned()
        .ok_or_else(|| StoreError::StateType {
            key: key.to_string(),
            expected: type_name::<S>(),
        })
}

/// The mutable mapping owned by the base engine.
pub type StateMap = BTreeMap<String, Arc<dyn StateValue>>;

/// A read-only copy of the store's state, keyed by box key.
///
/// Only boxes that have been selected or written appear here.
#[derive(Clone, Default)]
pub struct Snapshot {
    entries: StateMap,
}

impl Snapshot {
    pub(crate) fn new(entries: StateMap) -> Self {
        Self { entries }
    }

    /// Typed state of `key`, `None` if the box has not been materialized.
    pub fn get<S: State>(&self, key: &str) -> Result<Option<S>> {
        self.entries
            .get(key)
            .map(|value| downcast_state::<S>(key, value.as_ref()))
            .transpose()
    }

    pub fn get_raw(&self, key: &str) -> Option<&Arc<dyn StateValue>> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dehydrate every entry. The result can be fed back as
    /// `StoreOptions::preloaded_state` of another store.
    pub fn to_json(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        self.entries
            .iter()
            .map(|(key, value)| Ok((key.clone(), value.to_json()?)))
            .collect()
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}
