//! Signals: domain events fanned out to every box listening for their type.
//!
//! A signal carries no subscriber list of its own. When it is dispatched the
//! store folds its data into each box it knows that listens for the type:
//! boxes declared in `StoreOptions::boxes` and boxes it has materialized.

use std::any::{type_name, Any};
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::boxes::AnyBox;
use crate::dispatchable::{downcast_output, Dispatchable, IntoDispatchable, Mutation, Output};
use crate::error::{Result, StoreError};
use crate::state::StateValue;
use crate::store::Store;

type Creator<A, T> = Arc<dyn Fn(&Store, A) -> Result<T> + Send + Sync>;

/// Defines a signal type and builds [`Signal`]s from arguments.
///
/// The creator turns the arguments into the event data, with read access to
/// the store. Safe to keep in a `static`.
pub struct SignalFactory<A, T> {
    signal_type: String,
    creator: Creator<A, T>,
}

impl<A, T> Clone for SignalFactory<A, T> {
    fn clone(&self) -> Self {
        Self {
            signal_type: self.signal_type.clone(),
            creator: self.creator.clone(),
        }
    }
}

impl<A: 'static, T: 'static> SignalFactory<A, T> {
    pub fn new<F>(signal_type: impl Into<String>, creator: F) -> Self
    where
        F: Fn(&Store, A) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            signal_type: signal_type.into(),
            creator: Arc::new(creator),
        }
    }

    pub fn call(&self, args: A) -> Signal<T> {
        let creator = self.creator.clone();
        Signal {
            signal_type: self.signal_type.clone(),
            creator: Box::new(move |store: &Store| creator(store, args)),
        }
    }
}

impl<T: 'static> SignalFactory<T, T> {
    /// A signal whose data is its argument.
    pub fn passthrough(signal_type: impl Into<String>) -> Self {
        Self::new(signal_type, |_: &Store, data: T| Ok(data))
    }
}

impl<A, T> SignalFactory<A, T> {
    pub fn signal_type(&self) -> &str {
        &self.signal_type
    }
}

/// A domain event ready to dispatch. Dispatching it returns the event data.
pub struct Signal<T> {
    signal_type: String,
    creator: Box<dyn FnOnce(&Store) -> Result<T>>,
}

impl<T> Signal<T> {
    pub fn signal_type(&self) -> &str {
        &self.signal_type
    }
}

/// Erased signal, as carried by [`Dispatchable::Signal`].
pub struct SignalTask {
    pub(crate) signal_type: String,
    pub(crate) creator: Box<dyn FnOnce(&Store) -> Result<Rc<dyn Any>>>,
    pub(crate) output: fn(&dyn Any) -> Result<Output>,
}

impl SignalTask {
    pub fn signal_type(&self) -> &str {
        &self.signal_type
    }
}

fn clone_output<T: Clone + 'static>(data: &dyn Any) -> Result<Output> {
    data.downcast_ref::<T>()
        .map(|data| Box::new(data.clone()) as Output)
        .ok_or_else(|| {
            StoreError::InvalidDispatchable(format!(
                "signal data is not a `{}`",
                type_name::<T>()
            ))
        })
}

impl<T: Clone + 'static> IntoDispatchable for Signal<T> {
    type Output = T;

    fn into_dispatchable(self) -> Dispatchable {
        let creator = self.creator;
        Dispatchable::Signal(SignalTask {
            signal_type: self.signal_type,
            creator: Box::new(move |store: &Store| Ok(Rc::new(creator(store)?) as Rc<dyn Any>)),
            output: clone_output::<T>,
        })
    }

    fn extract(output: Output) -> Result<T> {
        downcast_output(output)
    }
}

/// Fold `data` into every box in `targets`, one nested mutation each,
/// labelled with the signal type.
pub(crate) fn distribute(
    store: &Store,
    signal_type: &str,
    targets: Vec<Arc<dyn AnyBox>>,
    data: &Rc<dyn Any>,
) -> Result<()> {
    debug!(
        signal = signal_type,
        listeners = targets.len(),
        "distributing signal"
    );
    for target in targets {
        store.dispatch(fold_signal(signal_type, target, data.clone()))?;
    }
    Ok(())
}

fn fold_signal(signal_type: &str, target: Arc<dyn AnyBox>, data: Rc<dyn Any>) -> Mutation<()> {
    let receiver = target.clone();
    let label = signal_type.to_string();
    let signal_type = label.clone();
    Mutation::new(
        Some(label),
        target,
        Box::new(move |current: &dyn StateValue| {
            receiver.on_signal(&signal_type, current, data.as_ref())
        }),
        (),
    )
}
