use std::env;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::boxes::{AnyBox, StateBox};
use crate::error::{Result, StoreError};
use crate::state::State;

/// Persisted state layout: box key to the box's hydration-shaped value.
pub type PreloadedState = serde_json::Map<String, serde_json::Value>;

/// Options handed to every enhancer while a store is composed.
///
/// Deserializing ignores keys it does not recognize.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreOptions {
    /// Values recovered from a previous snapshot, read lazily by the preload enhancer.
    pub preloaded_state: PreloadedState,

    /// Store name, used by devtools.
    pub name: String,

    /// Enable the devtools layer. Defaults to on in debug builds.
    pub devtools: bool,

    /// Hold change notifications until [`Store::flush`](crate::Store::flush).
    pub defer_notify: bool,

    /// Boxes the store knows from the start. Signals reach these even
    /// before they are first read.
    #[serde(skip)]
    pub boxes: Vec<Arc<dyn AnyBox>>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            preloaded_state: PreloadedState::new(),
            name: "store".to_string(),
            devtools: cfg!(debug_assertions),
            defer_notify: false,
            boxes: Vec::new(),
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from environment variables, falling back to defaults.
    ///
    /// - `BOXSTATE_STORE_NAME`
    /// - `BOXSTATE_DEVTOOLS` (`1`/`true`/`on` or `0`/`false`/`off`)
    /// - `BOXSTATE_DEFER_NOTIFY` (same flag syntax)
    /// - `BOXSTATE_PRELOADED_STATE` (a JSON object keyed by box key)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::default();
        if let Some(name) = lookup("BOXSTATE_STORE_NAME") {
            options.name = name;
        }
        if let Some(flag) = lookup("BOXSTATE_DEVTOOLS") {
            options.devtools = parse_flag("BOXSTATE_DEVTOOLS", &flag)?;
        }
        if let Some(flag) = lookup("BOXSTATE_DEFER_NOTIFY") {
            options.defer_notify = parse_flag("BOXSTATE_DEFER_NOTIFY", &flag)?;
        }
        if let Some(raw) = lookup("BOXSTATE_PRELOADED_STATE") {
            options.preloaded_state = match serde_json::from_str(&raw) {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(other) => {
                    return Err(StoreError::Config(format!(
                        "BOXSTATE_PRELOADED_STATE must be a JSON object, got {}",
                        json_kind(&other)
                    )))
                }
                Err(e) => {
                    return Err(StoreError::Config(format!(
                        "BOXSTATE_PRELOADED_STATE is not valid JSON: {e}"
                    )))
                }
            };
        }
        options.log_summary();
        Ok(options)
    }

    pub fn with_preloaded_state(mut self, preloaded_state: PreloadedState) -> Self {
        self.preloaded_state = preloaded_state;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_devtools(mut self, enabled: bool) -> Self {
        self.devtools = enabled;
        self
    }

    pub fn with_defer_notify(mut self, enabled: bool) -> Self {
        self.defer_notify = enabled;
        self
    }

    /// Declare a box so signals reach it before it is first read.
    pub fn with_box<S: State>(mut self, target: &StateBox<S>) -> Self {
        self.boxes.push(target.erased());
        self
    }

    pub fn with_boxes(mut self, boxes: impl IntoIterator<Item = Arc<dyn AnyBox>>) -> Self {
        self.boxes.extend(boxes);
        self
    }

    /// Log the effective options. Preloaded values are summarized by key only.
    pub fn log_summary(&self) {
        let preloaded: Vec<&str> = self.preloaded_state.keys().map(String::as_str).collect();
        let declared: Vec<&str> = self.boxes.iter().map(|b| b.key()).collect();
        info!(
            name = %self.name,
            devtools = self.devtools,
            defer_notify = self.defer_notify,
            preloaded_keys = ?preloaded,
            declared_boxes = ?declared,
            "Store options"
        );
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(StoreError::Config(format!(
            "{key} must be a boolean flag, got {other:?}"
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
