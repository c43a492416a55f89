//! The dispatch/select engine and the public store facade.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::boxes::AnyBox;
use crate::config::StoreOptions;
use crate::dispatchable::{Action, Dispatchable, IntoDispatchable, Output};
use crate::enhancer::{apply_enhancers, StoreEnhancer, StoreFactory};
use crate::enhancers::{with_batch, with_devtools, with_preload};
use crate::error::{Result, StoreError};
use crate::events::{EventCenter, Unsubscribe};
use crate::selector::{SelectTarget, Selectable, Selected};
use crate::signal::distribute;
use crate::state::{Snapshot, StateMap, StateValue};

/// The contract every layer of a composed store satisfies.
///
/// `store` is the outermost, fully composed store: nested dispatches and
/// selects made through it pass through every layer again.
pub trait EnhanceableStore {
    /// The mutable state, owned by the base engine.
    fn state(&self) -> &RefCell<StateMap>;

    fn snapshot(&self) -> Snapshot;

    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Unsubscribe;

    fn dispatch(&self, store: &Store, task: Dispatchable) -> Result<Output>;

    fn select(&self, store: &Store, target: SelectTarget<'_>) -> Result<Selected>;

    /// A value recovered from preloaded data, or `None`.
    fn get_preloaded_state(
        &self,
        store: &Store,
        target: &dyn AnyBox,
        initial: &Arc<dyn StateValue>,
    ) -> Result<Option<Arc<dyn StateValue>>>;

    /// Called once, after the full composition.
    fn on_init(&self, store: &Store);

    /// Called once per box, when it is first materialized.
    fn on_mount(
        &self,
        store: &Store,
        target: &dyn AnyBox,
        initial: &Arc<dyn StateValue>,
        preloaded: Option<&Arc<dyn StateValue>>,
    );

    /// Deliver notifications a layer has been holding back. Returns whether
    /// any subscriber was called.
    fn flush(&self) -> bool;
}

/// A layer wrapping an inner store. Every method defaults to delegating to
/// [`StoreLayer::next`]; override only what the layer changes, then turn it
/// into a store with [`layer`].
pub trait StoreLayer {
    fn next(&self) -> &dyn EnhanceableStore;

    fn state(&self) -> &RefCell<StateMap> {
        self.next().state()
    }

    fn snapshot(&self) -> Snapshot {
        self.next().snapshot()
    }

    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Unsubscribe {
        self.next().subscribe(listener)
    }

    fn dispatch(&self, store: &Store, task: Dispatchable) -> Result<Output> {
        self.next().dispatch(store, task)
    }

    fn select(&self, store: &Store, target: SelectTarget<'_>) -> Result<Selected> {
        self.next().select(store, target)
    }

    fn get_preloaded_state(
        &self,
        store: &Store,
        target: &dyn AnyBox,
        initial: &Arc<dyn StateValue>,
    ) -> Result<Option<Arc<dyn StateValue>>> {
        self.next().get_preloaded_state(store, target, initial)
    }

    fn on_init(&self, store: &Store) {
        self.next().on_init(store)
    }

    fn on_mount(
        &self,
        store: &Store,
        target: &dyn AnyBox,
        initial: &Arc<dyn StateValue>,
        preloaded: Option<&Arc<dyn StateValue>>,
    ) {
        self.next().on_mount(store, target, initial, preloaded)
    }

    fn flush(&self) -> bool {
        self.next().flush()
    }
}

struct Layered<L>(L);

impl<L: StoreLayer> EnhanceableStore for Layered<L> {
    fn state(&self) -> &RefCell<StateMap> {
        self.0.state()
    }

    fn snapshot(&self) -> Snapshot {
        self.0.snapshot()
    }

    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Unsubscribe {
        self.0.subscribe(listener)
    }

    fn dispatch(&self, store: &Store, task: Dispatchable) -> Result<Output> {
        self.0.dispatch(store, task)
    }

    fn select(&self, store: &Store, target: SelectTarget<'_>) -> Result<Selected> {
        self.0.select(store, target)
    }

    fn get_preloaded_state(
        &self,
        store: &Store,
        target: &dyn AnyBox,
        initial: &Arc<dyn StateValue>,
    ) -> Result<Option<Arc<dyn StateValue>>> {
        self.0.get_preloaded_state(store, target, initial)
    }

    fn on_init(&self, store: &Store) {
        self.0.on_init(store)
    }

    fn on_mount(
        &self,
        store: &Store,
        target: &dyn AnyBox,
        initial: &Arc<dyn StateValue>,
        preloaded: Option<&Arc<dyn StateValue>>,
    ) {
        self.0.on_mount(store, target, initial, preloaded)
    }

    fn flush(&self) -> bool {
        self.0.flush()
    }
}

/// Turn a [`StoreLayer`] into a composable store.
pub fn layer<L: StoreLayer + 'static>(layer: L) -> Rc<dyn EnhanceableStore> {
    Rc::new(Layered(layer))
}

// ---------------------------------------------------------------------------
// Base engine
// ---------------------------------------------------------------------------

/// Marks the store as dispatching for the lifetime of the root frame.
/// Dropping the root guard clears the flag on every exit path, panics included.
struct DispatchGuard<'a> {
    flag: &'a Cell<bool>,
    is_root: bool,
}

impl<'a> DispatchGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        let is_root = !flag.replace(true);
        Self { flag, is_root }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if self.is_root {
            self.flag.set(false);
        }
    }
}

/// The innermost store: owns the snapshot, the re-entrancy flag, the
/// notification channel and the boxes it knows about. Hooks are no-ops
/// here; enhancers override them.
pub(crate) struct BaseStore {
    state: RefCell<StateMap>,
    boxes: RefCell<BTreeMap<String, Arc<dyn AnyBox>>>,
    dispatching: Cell<bool>,
    events: Rc<EventCenter>,
}

impl BaseStore {
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::with_boxes(Vec::new())
    }

    /// A store that knows `declared` before any of them is read.
    pub(crate) fn with_boxes(declared: Vec<Arc<dyn AnyBox>>) -> Self {
        let boxes = declared
            .into_iter()
            .map(|b| (b.key().to_string(), b))
            .collect();
        Self {
            state: RefCell::new(StateMap::new()),
            boxes: RefCell::new(boxes),
            dispatching: Cell::new(false),
            events: EventCenter::new(),
        }
    }

    /// Known boxes listening for `signal_type`, in key order.
    fn listeners_of(&self, signal_type: &str) -> Vec<Arc<dyn AnyBox>> {
        self.boxes
            .borrow()
            .values()
            .filter(|b| b.listens_to(signal_type))
            .cloned()
            .collect()
    }

    fn apply(&self, store: &Store, task: Dispatchable) -> Result<Output> {
        match task {
            Dispatchable::Mutation(mutation) => {
                let current = store.select_state(&mutation.target)?;
                let next = (mutation.mutator)(current.as_ref())?;
                self.state
                    .borrow_mut()
                    .insert(mutation.target.key().to_string(), next);
                Ok(mutation.result)
            }
            Dispatchable::Action(action) => (action.actor)(store),
            Dispatchable::Signal(signal) => {
                let data = (signal.creator)(store)?;
                let targets = self.listeners_of(&signal.signal_type);
                distribute(store, &signal.signal_type, targets, &data)?;
                (signal.output)(data.as_ref())
            }
            other => Err(StoreError::UnknownDispatchable(other.tag().to_string())),
        }
    }
}

impl EnhanceableStore for BaseStore {
    fn state(&self) -> &RefCell<StateMap> {
        &self.state
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.state.borrow().clone())
    }

    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Unsubscribe {
        self.events.subscribe(listener)
    }

    fn dispatch(&self, store: &Store, task: Dispatchable) -> Result<Output> {
        let guard = DispatchGuard::enter(&self.dispatching);
        let output = self.apply(store, task)?;
        let is_root = guard.is_root;
        drop(guard);
        if is_root {
            self.events.notify();
        }
        Ok(output)
    }

    fn select(&self, store: &Store, target: SelectTarget<'_>) -> Result<Selected> {
        let target = match target {
            SelectTarget::Box(target) => target,
            SelectTarget::Selector(selector) => {
                return Ok(Selected::Computed(selector.compute(store)?));
            }
        };

        let existing = self.state.borrow().get(target.key()).cloned();
        if let Some(value) = existing {
            return Ok(Selected::State(value));
        }

        let initial = target.initial_state();
        let preloaded = store
            .enhanced()
            .get_preloaded_state(store, target.as_ref(), &initial)?;
        let value = preloaded.clone().unwrap_or_else(|| initial.clone());
        self.state
            .borrow_mut()
            .insert(target.key().to_string(), value.clone());
        self.boxes
            .borrow_mut()
            .entry(target.key().to_string())
            .or_insert_with(|| target.clone());
        debug!(
            key = target.key(),
            preloaded = preloaded.is_some(),
            "box materialized"
        );
        store
            .enhanced()
            .on_mount(store, target.as_ref(), &initial, preloaded.as_ref());
        Ok(Selected::State(value))
    }

    fn get_preloaded_state(
        &self,
        _store: &Store,
        _target: &dyn AnyBox,
        _initial: &Arc<dyn StateValue>,
    ) -> Result<Option<Arc<dyn StateValue>>> {
        Ok(None)
    }

    fn on_init(&self, _store: &Store) {}

    fn on_mount(
        &self,
        _store: &Store,
        _target: &dyn AnyBox,
        _initial: &Arc<dyn StateValue>,
        _preloaded: Option<&Arc<dyn StateValue>>,
    ) {
    }

    fn flush(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

/// The public store: `snapshot`, `subscribe`, `dispatch` and `select`.
///
/// Cloning is cheap and shares the same state. A store is single-threaded.
#[derive(Clone)]
pub struct Store {
    inner: Rc<dyn EnhanceableStore>,
}

impl Store {
    /// A store with default options and no extra enhancers.
    pub fn new() -> Self {
        create_store(StoreOptions::default(), Vec::new())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshot()
    }

    /// Register `listener`, called with no arguments after every root
    /// dispatch settles.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn() + 'static,
    {
        self.inner.subscribe(Rc::new(listener))
    }

    pub fn dispatch<D: IntoDispatchable>(&self, task: D) -> Result<D::Output> {
        let output = self.inner.dispatch(self, task.into_dispatchable())?;
        D::extract(output)
    }

    pub fn select<S: Selectable + ?Sized>(&self, selectable: &S) -> Result<S::Output> {
        let selected = self.inner.select(self, selectable.target())?;
        selectable.extract(selected)
    }

    /// Run `scope` as one root dispatch: everything it dispatches settles
    /// together and subscribers hear about it once.
    pub fn batch<R, F>(&self, scope: F) -> Result<R>
    where
        R: 'static,
        F: FnOnce(&Store) -> Result<R> + 'static,
    {
        self.dispatch(Action::labelled("batch", scope))
    }

    /// Deliver notifications held back by `StoreOptions::defer_notify`.
    /// Returns whether any subscriber was called.
    pub fn flush(&self) -> bool {
        self.inner.flush()
    }

    pub(crate) fn enhanced(&self) -> &dyn EnhanceableStore {
        &*self.inner
    }

    pub(crate) fn select_state(&self, target: &Arc<dyn AnyBox>) -> Result<Arc<dyn StateValue>> {
        match self.inner.select(self, SelectTarget::Box(target.clone()))? {
            Selected::State(value) => Ok(value),
            Selected::Computed(_) => Err(StoreError::StateType {
                key: target.key().to_string(),
                expected: "box state",
            }),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Compose a store: devtools outermost, then batch, preload, the caller's
/// enhancers in order, and the base engine innermost. `on_init` runs once
/// on the composed store before it is returned.
pub fn create_store(options: StoreOptions, enhancers: Vec<Box<dyn StoreEnhancer>>) -> Store {
    let mut chain: Vec<Box<dyn StoreEnhancer>> = Vec::with_capacity(enhancers.len() + 3);
    chain.push(Box::new(with_devtools));
    chain.push(Box::new(with_batch));
    chain.push(Box::new(with_preload));
    chain.extend(enhancers);

    let base: StoreFactory = Box::new(|options: &StoreOptions| -> Rc<dyn EnhanceableStore> {
        Rc::new(BaseStore::with_boxes(options.boxes.clone()))
    });
    let store = Store {
        inner: apply_enhancers(chain, &options, base),
    };
    store.inner.on_init(&store);
    store
}
