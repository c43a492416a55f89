use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, debug_span, info, warn};

use crate::boxes::AnyBox;
use crate::config::StoreOptions;
use crate::dispatchable::{Dispatchable, Output};
use crate::enhancer::StoreFactory;
use crate::error::Result;
use crate::state::StateValue;
use crate::store::{layer, EnhanceableStore, Store, StoreLayer};

struct Devtools {
    name: String,
    seq: Cell<u64>,
    next: Rc<dyn EnhanceableStore>,
}

impl StoreLayer for Devtools {
    fn next(&self) -> &dyn EnhanceableStore {
        &*self.next
    }

    fn dispatch(&self, store: &Store, task: Dispatchable) -> Result<Output> {
        let seq = self.seq.get() + 1;
        self.seq.set(seq);
        let tag = task.tag();
        let label = task.label().unwrap_or_default().to_string();

        let span = debug_span!("dispatch", store = %self.name, seq, tag, label = %label);
        let _enter = span.enter();

        let result = self.next.dispatch(store, task);
        match &result {
            Ok(_) => debug!(boxes = self.next.state().borrow().len(), "dispatched"),
            Err(e) => warn!(error = %e, "dispatch failed"),
        }
        result
    }

    fn on_init(&self, store: &Store) {
        info!(store = %self.name, "store initialized");
        self.next.on_init(store)
    }

    fn on_mount(
        &self,
        store: &Store,
        target: &dyn AnyBox,
        initial: &Arc<dyn StateValue>,
        preloaded: Option<&Arc<dyn StateValue>>,
    ) {
        debug!(
            store = %self.name,
            key = target.key(),
            state = initial.type_name(),
            preloaded = preloaded.is_some(),
            "box mounted"
        );
        self.next.on_mount(store, target, initial, preloaded)
    }
}

/// Observability bridge over `tracing`: one span per dispatch, events for
/// init, mounts and failures. Adds no layer when devtools are disabled.
pub fn with_devtools(options: &StoreOptions, next: StoreFactory) -> Rc<dyn EnhanceableStore> {
    if !options.devtools {
        return next(options);
    }
    layer(Devtools {
        name: options.name.clone(),
        seq: Cell::new(0),
        next: next(options),
    })
}
