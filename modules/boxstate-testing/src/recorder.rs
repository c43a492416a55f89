//! Observers for stores under test.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use boxstate_core::{
    enhancer, layer, AnyBox, Dispatchable, EnhanceableStore, Output, Result, StateValue, Store,
    StoreEnhancer, StoreFactory, StoreLayer, StoreOptions, Unsubscribe,
};

/// Counts the notifications a store sends.
pub struct Notifications {
    count: Rc<Cell<usize>>,
    unsubscribe: Unsubscribe,
}

impl Notifications {
    pub fn attach(store: &Store) -> Self {
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let unsubscribe = store.subscribe(move || counter.set(counter.get() + 1));
        Self { count, unsubscribe }
    }

    pub fn count(&self) -> usize {
        self.count.get()
    }

    /// Return the count so far and start again from zero.
    pub fn take(&self) -> usize {
        self.count.replace(0)
    }

    pub fn stop(&self) {
        self.unsubscribe.unsubscribe();
    }
}

/// An enhancer that records every hook and dispatch it sees, as
/// `"<name>:<event>"` strings in a log shared between recorders.
#[derive(Clone)]
pub struct HookRecorder {
    name: &'static str,
    log: Rc<RefCell<Vec<String>>>,
}

impl HookRecorder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Another recorder writing to the same log.
    pub fn sibling(&self, name: &'static str) -> Self {
        Self {
            name,
            log: self.log.clone(),
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }

    pub fn enhancer(&self) -> Box<dyn StoreEnhancer> {
        let recorder = self.clone();
        enhancer(move |options: &StoreOptions, next: StoreFactory| {
            recorder.record(format!("compose {}", options.name));
            layer(RecordingLayer {
                recorder,
                next: next(options),
            })
        })
    }

    fn record(&self, event: String) {
        self.log.borrow_mut().push(format!("{}:{event}", self.name));
    }
}

struct RecordingLayer {
    recorder: HookRecorder,
    next: Rc<dyn EnhanceableStore>,
}

impl StoreLayer for RecordingLayer {
    fn next(&self) -> &dyn EnhanceableStore {
        &*self.next
    }

    fn dispatch(&self, store: &Store, task: Dispatchable) -> Result<Output> {
        let label = task.label().map(str::to_string).unwrap_or_default();
        self.recorder.record(format!("dispatch {} {label}", task.tag()));
        self.next.dispatch(store, task)
    }

    fn get_preloaded_state(
        &self,
        store: &Store,
        target: &dyn AnyBox,
        initial: &Arc<dyn StateValue>,
    ) -> Result<Option<Arc<dyn StateValue>>> {
        self.recorder.record(format!("preload {}", target.key()));
        self.next.get_preloaded_state(store, target, initial)
    }

    fn on_init(&self, store: &Store) {
        self.recorder.record("init".to_string());
        self.next.on_init(store)
    }

    fn on_mount(
        &self,
        store: &Store,
        target: &dyn AnyBox,
        initial: &Arc<dyn StateValue>,
        preloaded: Option<&Arc<dyn StateValue>>,
    ) {
        self.recorder.record(format!(
            "mount {} preloaded={}",
            target.key(),
            preloaded.is_some()
        ));
        self.next.on_mount(store, target, initial, preloaded)
    }
}
