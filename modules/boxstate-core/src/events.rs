//! Change notification channel.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type Listener = Rc<dyn Fn()>;

/// Fan-out of argument-less change notifications.
///
/// `notify` works on a copy of the listener list taken when the pass starts,
/// so listeners may subscribe or unsubscribe from inside a notification.
#[derive(Default)]
pub struct EventCenter {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(u64, Listener)>>,
}

impl EventCenter {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn subscribe(self: &Rc<Self>, listener: Rc<dyn Fn()>) -> Unsubscribe {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, listener));
        Unsubscribe {
            center: Rc::downgrade(self),
            id,
        }
    }

    pub fn notify(&self) {
        let pass: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in pass {
            listener();
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    fn remove(&self, id: u64) {
        self.listeners.borrow_mut().retain(|(other, _)| *other != id);
    }
}

/// Handle returned by `subscribe`. Calling it more than once is harmless.
#[derive(Clone)]
pub struct Unsubscribe {
    center: Weak<EventCenter>,
    id: u64,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        if let Some(center) = self.center.upgrade() {
            center.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe").field("id", &self.id).finish()
    }
}
