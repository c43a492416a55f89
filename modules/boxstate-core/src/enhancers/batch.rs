use std::cell::Cell;
use std::rc::Rc;

use tracing::trace;

use crate::config::StoreOptions;
use crate::dispatchable::{Action, Dispatchable, IntoDispatchable, Output};
use crate::enhancer::StoreFactory;
use crate::error::Result;
use crate::events::{EventCenter, Unsubscribe};
use crate::store::{layer, EnhanceableStore, Store, StoreLayer};

/// Relays settled root dispatches to subscribers, either at once or on the
/// next flush.
struct Notifier {
    defer: bool,
    pending: Cell<bool>,
    events: Rc<EventCenter>,
}

impl Notifier {
    fn settled(&self) {
        if self.defer {
            self.pending.set(true);
        } else {
            self.events.notify();
        }
    }

    fn flush(&self) -> bool {
        if !self.pending.replace(false) {
            return false;
        }
        trace!(listeners = self.events.len(), "flushing deferred notification");
        self.events.notify();
        true
    }
}

struct Batch {
    next: Rc<dyn EnhanceableStore>,
    notifier: Rc<Notifier>,
}

impl StoreLayer for Batch {
    fn next(&self) -> &dyn EnhanceableStore {
        &*self.next
    }

    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Unsubscribe {
        self.notifier.events.subscribe(listener)
    }

    fn dispatch(&self, store: &Store, task: Dispatchable) -> Result<Output> {
        let items = match task {
            Dispatchable::Batch(items) => items,
            other => return self.next.dispatch(store, other),
        };
        // One action, so the whole batch settles in a single root dispatch.
        let batch = Action::labelled("batch", move |store: &Store| {
            let mut outputs: Vec<Output> = Vec::with_capacity(items.len());
            for item in items {
                outputs.push(store.dispatch(item)?);
            }
            Ok(outputs)
        });
        self.next.dispatch(store, batch.into_dispatchable())
    }

    fn flush(&self) -> bool {
        let inner = self.next.flush();
        self.notifier.flush() || inner
    }
}

/// Lowers [`Dispatchable::Batch`] into an action dispatching each item in
/// order through the outermost store. Results come back in the same order.
///
/// With `defer_notify` set, consecutive root dispatches collapse into one
/// notification delivered by [`Store::flush`](crate::Store::flush).
pub fn with_batch(options: &StoreOptions, next: StoreFactory) -> Rc<dyn EnhanceableStore> {
    let next = next(options);
    let notifier = Rc::new(Notifier {
        defer: options.defer_notify,
        pending: Cell::new(false),
        events: EventCenter::new(),
    });
    let relay = notifier.clone();
    // Lives as long as the inner store.
    let _ = next.subscribe(Rc::new(move || relay.settled()));
    layer(Batch { next, notifier })
}
