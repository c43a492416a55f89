use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::boxes::AnyBox;
use crate::config::{PreloadedState, StoreOptions};
use crate::enhancer::StoreFactory;
use crate::error::Result;
use crate::state::StateValue;
use crate::store::{layer, EnhanceableStore, Store, StoreLayer};

struct Preload {
    preloaded: PreloadedState,
    next: Rc<dyn EnhanceableStore>,
}

impl StoreLayer for Preload {
    fn next(&self) -> &dyn EnhanceableStore {
        &*self.next
    }

    fn get_preloaded_state(
        &self,
        store: &Store,
        target: &dyn AnyBox,
        initial: &Arc<dyn StateValue>,
    ) -> Result<Option<Arc<dyn StateValue>>> {
        match self.preloaded.get(target.key()) {
            Some(raw) => {
                debug!(key = target.key(), "hydrating box from preloaded state");
                target.preload(raw, initial.as_ref()).map(Some)
            }
            None => self.next.get_preloaded_state(store, target, initial),
        }
    }
}

/// Hydrates boxes from `StoreOptions::preloaded_state` on first access,
/// through each box's own preload transform.
pub fn with_preload(options: &StoreOptions, next: StoreFactory) -> Rc<dyn EnhanceableStore> {
    layer(Preload {
        preloaded: options.preloaded_state.clone(),
        next: next(options),
    })
}
