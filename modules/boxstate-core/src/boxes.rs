//! Boxes: named, typed partitions of the store's state.
//!
//! A [`StateBox`] is defined once, usually in a `static`, and only ever
//! referenced by descriptors and by the snapshot key. It owns the initial
//! value, the table of signal listeners and the hydration transform; it
//! knows nothing about any store.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::Value;

use crate::dispatchable::Mutation;
use crate::error::{Result, StoreError};
use crate::selector::{Selectable, SelectTarget, Selected};
use crate::signal::SignalFactory;
use crate::state::{downcast_state, State, StateValue};

type Preload<S> = Arc<dyn Fn(&Value, &S) -> Result<S> + Send + Sync>;
type Listener<S> = Arc<dyn Fn(&S, &dyn Any) -> Result<S> + Send + Sync>;

/// Erased view of a box, as seen by the engine and by enhancers.
pub trait AnyBox: Send + Sync {
    fn key(&self) -> &str;

    /// A fresh copy of the initial state.
    fn initial_state(&self) -> Arc<dyn StateValue>;

    /// Transform a raw preloaded value into this box's state.
    fn preload(&self, raw: &Value, initial: &dyn StateValue) -> Result<Arc<dyn StateValue>>;

    /// Whether this box folds signals of `signal_type` into its state.
    fn listens_to(&self, signal_type: &str) -> bool;

    /// Apply this box's listener for `signal_type` to `state`.
    fn on_signal(
        &self,
        signal_type: &str,
        state: &dyn StateValue,
        data: &dyn Any,
    ) -> Result<Arc<dyn StateValue>>;
}

impl std::fmt::Debug for dyn AnyBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnyBox").field(&self.key()).finish()
    }
}

struct BoxInner<S> {
    key: String,
    initial_state: S,
    preload: Preload<S>,
    listeners: RwLock<HashMap<String, Listener<S>>>,
}

impl<S: State> AnyBox for BoxInner<S> {
    fn key(&self) -> &str {
        &self.key
    }

    fn initial_state(&self) -> Arc<dyn StateValue> {
        Arc::new(self.initial_state.clone())
    }

    fn preload(&self, raw: &Value, initial: &dyn StateValue) -> Result<Arc<dyn StateValue>> {
        let initial = state_ref::<S>(&self.key, initial)?;
        match (self.preload)(raw, initial) {
            Ok(state) => Ok(Arc::new(state)),
            Err(StoreError::Serialization(source)) => Err(StoreError::Hydration {
                key: self.key.clone(),
                source,
            }),
            Err(e) => Err(e),
        }
    }

    fn listens_to(&self, signal_type: &str) -> bool {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(signal_type)
    }

    fn on_signal(
        &self,
        signal_type: &str,
        state: &dyn StateValue,
        data: &dyn Any,
    ) -> Result<Arc<dyn StateValue>> {
        let listener = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(signal_type)
            .cloned()
            .ok_or_else(|| {
                StoreError::InvalidDispatchable(format!(
                    "box `{}` does not listen to `{signal_type}`",
                    self.key
                ))
            })?;
        let state = state_ref::<S>(&self.key, state)?;
        Ok(Arc::new(listener(state, data)?))
    }
}

/// Handle to a box definition. Cloning shares the definition.
pub struct StateBox<S> {
    inner: Arc<BoxInner<S>>,
}

impl<S> Clone for StateBox<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> std::fmt::Debug for StateBox<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBox")
            .field("key", &self.inner.key)
            .field("state", &type_name::<S>())
            .finish()
    }
}

impl<S: State> StateBox<S> {
    /// Create a box hydrated by [`hydrate`].
    pub fn new(key: impl Into<String>, initial_state: S) -> Self {
        Self::with_preload(key, initial_state, hydrate::<S>)
    }

    /// Create a box with a custom hydration transform.
    pub fn with_preload<F>(key: impl Into<String>, initial_state: S, preload: F) -> Self
    where
        F: Fn(&Value, &S) -> Result<S> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(BoxInner {
                key: key.into(),
                initial_state,
                preload: Arc::new(preload),
                listeners: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn initial_state(&self) -> &S {
        &self.inner.initial_state
    }

    /// The erased handle stores keep to find this box again.
    pub fn erased(&self) -> Arc<dyn AnyBox> {
        self.inner.clone()
    }

    /// Listen to a signal. `listener` folds the signal's data into the box's
    /// state. A second registration for the same signal type replaces the
    /// first.
    pub fn listen<A, T, F>(&self, signal: &SignalFactory<A, T>, listener: F)
    where
        T: 'static,
        F: Fn(&S, &T) -> S + Send + Sync + 'static,
    {
        self.listen_type(signal.signal_type(), listener)
    }

    /// Listen to a signal by its type string. Data of any other type than
    /// `T` fails the dispatch that delivers it.
    pub fn listen_type<T, F>(&self, signal_type: impl Into<String>, listener: F)
    where
        T: 'static,
        F: Fn(&S, &T) -> S + Send + Sync + 'static,
    {
        let signal_type = signal_type.into();
        let expected = signal_type.clone();
        let listener: Listener<S> = Arc::new(move |state: &S, data: &dyn Any| {
            let data = data.downcast_ref::<T>().ok_or_else(|| {
                StoreError::InvalidDispatchable(format!(
                    "signal `{expected}` data is not a `{}`",
                    type_name::<T>()
                ))
            })?;
            Ok(listener(state, data))
        });
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(signal_type, listener);
    }

    /// Whether a listener is registered for `signal_type`.
    pub fn listens_to(&self, signal_type: &str) -> bool {
        self.inner.listens_to(signal_type)
    }

    /// Build a mutation factory. Each call of the factory produces a
    /// [`Mutation`] whose result is the argument it was called with.
    pub fn mutation<A, F>(&self, mutator: F) -> MutationFactory<S, A>
    where
        F: Fn(&S, &A) -> S + Send + Sync + 'static,
    {
        self.try_mutation(move |state: &S, args: &A| Ok(mutator(state, args)))
    }

    /// Like [`StateBox::mutation`], with a mutator that can fail.
    pub fn try_mutation<A, F>(&self, mutator: F) -> MutationFactory<S, A>
    where
        F: Fn(&S, &A) -> Result<S> + Send + Sync + 'static,
    {
        MutationFactory {
            target: self.clone(),
            label: None,
            mutator: Arc::new(mutator),
        }
    }

    /// Replace the state.
    pub fn set_state(&self, state: S) -> Mutation<()> {
        self.mutate(Some(format!("{}/setState", self.key())), move |_| Ok(state))
    }

    /// Replace the state with a value derived from the current one.
    pub fn update_state<F>(&self, updater: F) -> Mutation<()>
    where
        F: FnOnce(&S) -> S + 'static,
    {
        self.mutate(Some(format!("{}/setState", self.key())), move |state| {
            Ok(updater(state))
        })
    }

    /// Shallow-merge `props` into the state. Fields absent from `props` keep
    /// their current value; the previous state is never modified.
    pub fn merge_state<P: Serialize>(&self, props: P) -> Mutation<()> {
        let key = self.key().to_string();
        let props = serde_json::to_value(props);
        self.mutate(Some(format!("{key}/mergeState")), move |state| {
            let props = props?;
            shallow_merge(&key, state, props)
        })
    }

    /// A one-off mutation from a closure.
    pub(crate) fn mutate<F>(&self, label: Option<String>, mutator: F) -> Mutation<()>
    where
        F: FnOnce(&S) -> Result<S> + 'static,
    {
        let key = self.key().to_string();
        Mutation::new(
            label,
            self.inner.clone(),
            Box::new(move |current: &dyn StateValue| {
                let state = state_ref::<S>(&key, current)?;
                let next: Arc<dyn StateValue> = Arc::new(mutator(state)?);
                Ok(next)
            }),
            (),
        )
    }
}

impl<S: State> Selectable for StateBox<S> {
    type Output = S;

    fn target(&self) -> SelectTarget<'_> {
        SelectTarget::Box(self.inner.clone())
    }

    fn extract(&self, selected: Selected) -> Result<S> {
        match selected {
            Selected::State(value) => downcast_state::<S>(self.key(), value.as_ref()),
            Selected::Computed(_) => Err(StoreError::StateType {
                key: self.key().to_string(),
                expected: type_name::<S>(),
            }),
        }
    }
}

/// Produces [`Mutation`]s for one box. Cheap to clone.
pub struct MutationFactory<S, A> {
    target: StateBox<S>,
    label: Option<String>,
    mutator: Arc<dyn Fn(&S, &A) -> Result<S> + Send + Sync>,
}

impl<S, A> Clone for MutationFactory<S, A> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            label: self.label.clone(),
            mutator: self.mutator.clone(),
        }
    }
}

impl<S: State, A: Clone + 'static> MutationFactory<S, A> {
    /// Label the produced mutations, for observability.
    pub fn with_type(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn call(&self, args: A) -> Mutation<A> {
        let mutator = self.mutator.clone();
        let result = args.clone();
        self.target
            .mutate(self.label.clone(), move |state| mutator(state, &args))
            .with_result(result)
    }
}

/// Default hydration: the raw value is deep-merged over the JSON form of
/// the initial state, then deserialized. Missing fields keep their initial
/// values.
pub fn hydrate<S: State>(raw: &Value, initial: &S) -> Result<S> {
    let mut base = serde_json::to_value(initial)?;
    deep_merge(&mut base, raw);
    Ok(serde_json::from_value(base)?)
}

fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

fn shallow_merge<S: State>(key: &str, state: &S, props: Value) -> Result<S> {
    let Value::Object(props) = props else {
        return Err(StoreError::Merge {
            key: key.to_string(),
            reason: "merged props must serialize to an object".to_string(),
        });
    };
    let Value::Object(mut merged) = serde_json::to_value(state)? else {
        return Err(StoreError::Merge {
            key: key.to_string(),
            reason: "state must serialize to an object".to_string(),
        });
    };
    merged.extend(props);
    Ok(serde_json::from_value(Value::Object(merged))?)
}

fn state_ref<'a, S: State>(key: &str, value: &'a dyn StateValue) -> Result<&'a S> {
    value
        .as_any()
        .downcast_ref::<S>()
        .ok_or_else(|| StoreError::StateType {
            key: key.to_string(),
            expected: type_name::<S>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        tags: Vec<String>,
        settings: Settings,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Settings {
        theme: String,
        volume: u8,
    }

    fn profile() -> Profile {
        Profile {
            name: "anon".into(),
            tags: vec![],
            settings: Settings {
                theme: "light".into(),
                volume: 5,
            },
        }
    }

    #[test]
    fn hydrate_keeps_missing_fields() {
        let raw = json!({"name": "ada", "settings": {"volume": 9}});
        let hydrated = hydrate(&raw, &profile()).unwrap();
        assert_eq!(hydrated.name, "ada");
        assert_eq!(hydrated.settings.theme, "light");
        assert_eq!(hydrated.settings.volume, 9);
    }

    #[test]
    fn hydrate_replaces_non_objects() {
        let hydrated: Vec<u32> = hydrate(&json!([1, 2]), &vec![7]).unwrap();
        assert_eq!(hydrated, vec![1, 2]);
    }

    #[test]
    fn preload_failure_names_the_box() {
        let b = StateBox::new("profile", profile());
        let initial = b.inner.initial_state();
        let err = b
            .inner
            .preload(&json!({"settings": {"volume": "loud"}}), initial.as_ref())
            .unwrap_err();
        assert!(matches!(err, StoreError::Hydration { ref key, .. } if key == "profile"));
    }

    #[test]
    fn shallow_merge_replaces_top_level_fields_only() {
        let patch = json!({"settings": {"theme": "dark"}});
        let merged = shallow_merge("profile", &profile(), patch);
        // `settings` is replaced wholesale, so the missing volume fails to deserialize.
        assert!(merged.is_err());

        let merged = shallow_merge("profile", &profile(), json!({"name": "bob"})).unwrap();
        assert_eq!(merged.name, "bob");
        assert_eq!(merged.settings, profile().settings);
    }

    #[test]
    fn shallow_merge_rejects_non_objects() {
        let err = shallow_merge("profile", &profile(), json!(3)).unwrap_err();
        assert!(matches!(err, StoreError::Merge { .. }));

        let err = shallow_merge("count", &3_i32, json!({"a": 1})).unwrap_err();
        assert!(matches!(err, StoreError::Merge { ref reason, .. } if reason.contains("state")));
    }

    #[test]
    fn mutation_factory_defaults_result_to_args() {
        let b = StateBox::new("counter", 0_i64);
        let add = b
            .mutation(|state: &i64, by: &i64| state + by)
            .with_type("counter/add");
        let mutation = add.call(4);
        assert_eq!(mutation.label(), Some("counter/add"));
        assert_eq!(mutation.box_key(), "counter");
        assert_eq!(*mutation.result(), 4);
    }

    #[test]
    fn convenience_mutations_are_labelled() {
        let b = StateBox::new("profile", profile());
        assert_eq!(b.set_state(profile()).label(), Some("profile/setState"));
        assert_eq!(b.update_state(|p| p.clone()).label(), Some("profile/setState"));
        assert_eq!(b.merge_state(json!({})).label(), Some("profile/mergeState"));
    }

    #[test]
    fn listeners_by_type_string_share_the_table() {
        let b = StateBox::new("total", 1_i32);
        b.listen_type("ADD", |n: &i32, by: &i32| n + by);
        assert!(b.listens_to("ADD"));

        let next = b
            .inner
            .on_signal("ADD", &1_i32, &4_i32 as &dyn Any)
            .unwrap();
        assert_eq!(next.as_any().downcast_ref::<i32>(), Some(&5));
    }

    #[test]
    fn signal_data_of_the_wrong_type_is_rejected() {
        let b = StateBox::new("total", 1_i32);
        b.listen_type("ADD", |n: &i32, by: &i32| n + by);
        let err = b
            .inner
            .on_signal("ADD", &1_i32, &"four" as &dyn Any)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidDispatchable(msg) if msg.contains("ADD")));

        let err = b.inner.on_signal("OTHER", &1_i32, &4_i32 as &dyn Any).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDispatchable(msg) if msg.contains("OTHER")));
    }
}
