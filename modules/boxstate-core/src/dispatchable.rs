//! Dispatchable descriptors.
//!
//! Typed descriptors ([`Mutation`], [`Action`], [`Signal`](crate::Signal))
//! are erased into the closed [`Dispatchable`] enum before they reach the
//! engine, and [`IntoDispatchable::extract`] recovers the typed result on
//! the way out.

use std::any::{type_name, Any};
use std::future::Future;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};

use crate::boxes::AnyBox;
use crate::error::{Result, StoreError};
use crate::signal::SignalTask;
use crate::state::StateValue;
use crate::store::Store;

/// Erased result of a dispatch.
pub type Output = Box<dyn Any>;

pub(crate) type Mutator = Box<dyn FnOnce(&dyn StateValue) -> Result<Arc<dyn StateValue>>>;
type Actor<R> = Box<dyn FnOnce(&Store) -> Result<R>>;

/// A synchronous state transition targeting one box.
///
/// The value returned by dispatching it is `result`, which is independent
/// of the state written.
pub struct Mutation<R> {
    pub(crate) label: Option<String>,
    pub(crate) target: Arc<dyn AnyBox>,
    pub(crate) mutator: Mutator,
    pub(crate) result: R,
}

impl<R> Mutation<R> {
    pub(crate) fn new(
        label: Option<String>,
        target: Arc<dyn AnyBox>,
        mutator: Mutator,
        result: R,
    ) -> Self {
        Self {
            label,
            target,
            mutator,
            result,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn box_key(&self) -> &str {
        self.target.key()
    }

    pub fn result(&self) -> &R {
        &self.result
    }

    /// Replace the value handed back to the dispatcher.
    pub fn with_result<T>(self, result: T) -> Mutation<T> {
        Mutation {
            label: self.label,
            target: self.target,
            mutator: self.mutator,
            result,
        }
    }
}

/// An arbitrary function given the store, so it can dispatch and select.
/// Whatever it returns, a pending future included, is handed back verbatim.
pub struct Action<R> {
    pub(crate) label: Option<String>,
    pub(crate) actor: Actor<R>,
}

impl<R: 'static> Action<R> {
    pub fn new<F>(actor: F) -> Self
    where
        F: FnOnce(&Store) -> Result<R> + 'static,
    {
        Self {
            label: None,
            actor: Box::new(actor),
        }
    }

    pub fn labelled<F>(label: impl Into<String>, actor: F) -> Self
    where
        F: FnOnce(&Store) -> Result<R> + 'static,
    {
        Self {
            label: Some(label.into()),
            actor: Box::new(actor),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn erase(self) -> Action<Output> {
        let actor = self.actor;
        Action {
            label: self.label,
            actor: Box::new(move |store: &Store| Ok(Box::new(actor(store)?) as Output)),
        }
    }
}

/// Shorthand for [`Action::new`].
pub fn action<R, F>(actor: F) -> Action<R>
where
    R: 'static,
    F: FnOnce(&Store) -> Result<R> + 'static,
{
    Action::new(actor)
}

/// An action whose actor runs asynchronously.
///
/// Dispatching it returns the pending future. Futures are lazy: no part of
/// the actor runs inside the root dispatch, not even the code before its
/// first `.await`, and every dispatch the future makes starts its own root
/// cycle. For work that must happen inside the root dispatch, do it in a
/// plain action and return the future from there:
///
/// ```ignore
/// action(|store: &Store| {
///     store.dispatch(set_loading(true))?;
///     let store = store.clone();
///     Ok(async move { store.dispatch(load().await?) }.boxed_local())
/// })
/// ```
pub fn async_action<T, F, Fut>(actor: F) -> Action<LocalBoxFuture<'static, Result<T>>>
where
    T: 'static,
    F: FnOnce(Store) -> Fut + 'static,
    Fut: Future<Output = Result<T>> + 'static,
{
    Action::new(move |store: &Store| Ok(actor(store.clone()).boxed_local()))
}

/// Builds actions from arguments. Safe to keep in a `static`.
pub struct ActionFactory<A, R> {
    label: Option<String>,
    actor: Arc<dyn Fn(&Store, A) -> Result<R> + Send + Sync>,
}

impl<A, R> Clone for ActionFactory<A, R> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            actor: self.actor.clone(),
        }
    }
}

impl<A: 'static, R: 'static> ActionFactory<A, R> {
    pub fn new<F>(actor: F) -> Self
    where
        F: Fn(&Store, A) -> Result<R> + Send + Sync + 'static,
    {
        Self {
            label: None,
            actor: Arc::new(actor),
        }
    }

    pub fn with_type(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn call(&self, args: A) -> Action<R> {
        let actor = self.actor.clone();
        Action {
            label: self.label.clone(),
            actor: Box::new(move |store: &Store| actor(store, args)),
        }
    }
}

/// The closed set of descriptors the engine understands.
///
/// `Batch` is not interpreted by the base engine; the batch enhancer lowers
/// it into a single action.
pub enum Dispatchable {
    Mutation(Mutation<Output>),
    Action(Action<Output>),
    Signal(SignalTask),
    Batch(Vec<Dispatchable>),
}

impl Dispatchable {
    pub fn tag(&self) -> &'static str {
        match self {
            Dispatchable::Mutation(_) => "mutation",
            Dispatchable::Action(_) => "action",
            Dispatchable::Signal(_) => "signal",
            Dispatchable::Batch(_) => "batch",
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Dispatchable::Mutation(m) => m.label(),
            Dispatchable::Action(a) => a.label(),
            Dispatchable::Signal(s) => Some(s.signal_type()),
            Dispatchable::Batch(_) => None,
        }
    }
}

impl std::fmt::Debug for Dispatchable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("Dispatchable");
        out.field("tag", &self.tag()).field("label", &self.label());
        match self {
            Dispatchable::Mutation(m) => out.field("box", &m.box_key()),
            Dispatchable::Batch(items) => out.field("items", items),
            _ => &mut out,
        };
        out.finish()
    }
}

/// Anything `Store::dispatch` accepts.
pub trait IntoDispatchable {
    type Output: 'static;

    fn into_dispatchable(self) -> Dispatchable;

    fn extract(output: Output) -> Result<Self::Output>;
}

pub(crate) fn downcast_output<T: 'static>(output: Output) -> Result<T> {
    output.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
        StoreError::InvalidDispatchable(format!(
            "dispatch result is not a `{}`",
            type_name::<T>()
        ))
    })
}

impl IntoDispatchable for Dispatchable {
    type Output = Output;

    fn into_dispatchable(self) -> Dispatchable {
        self
    }

    fn extract(output: Output) -> Result<Output> {
        Ok(output)
    }
}

impl<R: 'static> IntoDispatchable for Mutation<R> {
    type Output = R;

    fn into_dispatchable(self) -> Dispatchable {
        let result = Box::new(self.result) as Output;
        Dispatchable::Mutation(Mutation {
            label: self.label,
            target: self.target,
            mutator: self.mutator,
            result,
        })
    }

    fn extract(output: Output) -> Result<R> {
        downcast_output(output)
    }
}

impl<R: 'static> IntoDispatchable for Action<R> {
    type Output = R;

    fn into_dispatchable(self) -> Dispatchable {
        Dispatchable::Action(self.erase())
    }

    fn extract(output: Output) -> Result<R> {
        downcast_output(output)
    }
}

impl<D: IntoDispatchable> IntoDispatchable for Vec<D> {
    type Output = Vec<D::Output>;

    fn into_dispatchable(self) -> Dispatchable {
        Dispatchable::Batch(self.into_iter().map(D::into_dispatchable).collect())
    }

    fn extract(output: Output) -> Result<Self::Output> {
        downcast_output::<Vec<Output>>(output)?
            .into_iter()
            .map(D::extract)
            .collect()
    }
}

macro_rules! batch_tuple {
    ($($name:ident),+) => {
        impl<$($name: IntoDispatchable),+> IntoDispatchable for ($($name,)+) {
            type Output = ($($name::Output,)+);

            #[allow(non_snake_case)]
            fn into_dispatchable(self) -> Dispatchable {
                let ($($name,)+) = self;
                Dispatchable::Batch(vec![$($name.into_dispatchable()),+])
            }

            #[allow(non_snake_case)]
            fn extract(output: Output) -> Result<Self::Output> {
                let mut outputs = downcast_output::<Vec<Output>>(output)?.into_iter();
                $(
                    let $name = $name::extract(outputs.next().ok_or_else(|| {
                        StoreError::InvalidDispatchable("batch returned too few results".to_string())
                    })?)?;
                )+
                Ok(($($name,)+))
            }
        }
    };
}

batch_tuple!(A, B);
batch_tuple!(A, B, C);
batch_tuple!(A, B, C, D);
batch_tuple!(A, B, C, D, E);
