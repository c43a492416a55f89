//! Reactive state container.
//!
//! A store holds one snapshot of named state partitions ("boxes"). State
//! changes only through dispatched descriptors (mutations, actions and
//! signals); subscribers are notified once per settled root dispatch.
//! Reads go through `select`, which materializes boxes lazily on first
//! access.
//!
//! Cross-cutting behavior (batching, hydration, devtools, or anything a
//! caller supplies) is layered on as enhancers wrapping the base engine.

pub mod boxes;
pub mod config;
pub mod dispatchable;
pub mod enhancer;
pub mod enhancers;
pub mod error;
pub mod events;
pub mod selector;
pub mod signal;
pub mod state;
pub mod store;

pub use boxes::{hydrate, AnyBox, MutationFactory, StateBox};
pub use config::{PreloadedState, StoreOptions};
pub use dispatchable::{
    action, async_action, Action, ActionFactory, Dispatchable, IntoDispatchable, Mutation, Output,
};
pub use enhancer::{apply_enhancers, enhancer, StoreEnhancer, StoreFactory};
pub use error::{Result, StoreError};
pub use events::Unsubscribe;
pub use selector::{selector, AnySelector, SelectTarget, Selectable, Selected, Selector};
pub use signal::{Signal, SignalFactory, SignalTask};
pub use state::{Snapshot, State, StateMap, StateValue};
pub use store::{create_store, layer, EnhanceableStore, Store, StoreLayer};
