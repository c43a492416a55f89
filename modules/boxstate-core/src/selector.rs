//! Selection: reading boxes and composed selectors.

use std::any::type_name;
use std::sync::Arc;

use crate::boxes::AnyBox;
use crate::dispatchable::{downcast_output, Output};
use crate::error::{Result, StoreError};
use crate::state::StateValue;
use crate::store::Store;

/// What `select` is asked for, erased.
pub enum SelectTarget<'a> {
    Box(Arc<dyn AnyBox>),
    Selector(&'a dyn AnySelector),
}

/// What `select` answers, erased.
pub enum Selected {
    State(Arc<dyn StateValue>),
    Computed(Output),
}

/// Anything `Store::select` accepts.
pub trait Selectable {
    type Output;

    fn target(&self) -> SelectTarget<'_>;

    fn extract(&self, selected: Selected) -> Result<Self::Output>;
}

/// Erased composed selector.
pub trait AnySelector {
    fn label(&self) -> Option<&str>;

    fn compute(&self, store: &Store) -> Result<Output>;
}

/// A value derived from other boxes or selectors.
///
/// `compute` gets the store so it can select recursively. It must not
/// dispatch. Nothing is cached by the base engine.
pub struct Selector<T> {
    label: Option<String>,
    compute: Arc<dyn Fn(&Store) -> Result<T> + Send + Sync>,
}

impl<T> Clone for Selector<T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            compute: self.compute.clone(),
        }
    }
}

impl<T: 'static> Selector<T> {
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&Store) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            label: None,
            compute: Arc::new(compute),
        }
    }

    pub fn labelled<F>(label: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Store) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            label: Some(label.into()),
            compute: Arc::new(compute),
        }
    }
}

/// Shorthand for [`Selector::new`].
pub fn selector<T, F>(compute: F) -> Selector<T>
where
    T: 'static,
    F: Fn(&Store) -> Result<T> + Send + Sync + 'static,
{
    Selector::new(compute)
}

impl<T: 'static> AnySelector for Selector<T> {
    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn compute(&self, store: &Store) -> Result<Output> {
        Ok(Box::new((self.compute)(store)?) as Output)
    }
}

impl<T: 'static> Selectable for Selector<T> {
    type Output = T;

    fn target(&self) -> SelectTarget<'_> {
        SelectTarget::Selector(self)
    }

    fn extract(&self, selected: Selected) -> Result<T> {
        match selected {
            Selected::Computed(output) => downcast_output(output).map_err(|_| {
                StoreError::SelectType {
                    expected: type_name::<T>(),
                }
            }),
            Selected::State(_) => Err(StoreError::SelectType {
                expected: type_name::<T>(),
            }),
        }
    }
}
