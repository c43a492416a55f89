//! Enhancer composition.
//!
//! An enhancer receives the store options and a factory for the next-inner
//! store, and returns a store satisfying the same contract. Enhancers are
//! folded right to left over the base engine, so the first enhancer in the
//! list ends up outermost.

use std::rc::Rc;

use crate::config::StoreOptions;
use crate::store::EnhanceableStore;

/// Builds the next-inner store. An enhancer may pass adjusted options on.
pub type StoreFactory = Box<dyn FnOnce(&StoreOptions) -> Rc<dyn EnhanceableStore>>;

pub trait StoreEnhancer {
    fn enhance(
        self: Box<Self>,
        options: &StoreOptions,
        next: StoreFactory,
    ) -> Rc<dyn EnhanceableStore>;
}

impl<F> StoreEnhancer for F
where
    F: FnOnce(&StoreOptions, StoreFactory) -> Rc<dyn EnhanceableStore>,
{
    fn enhance(
        self: Box<Self>,
        options: &StoreOptions,
        next: StoreFactory,
    ) -> Rc<dyn EnhanceableStore> {
        (*self)(options, next)
    }
}

/// Box an enhancer for [`create_store`](crate::create_store).
pub fn enhancer<E: StoreEnhancer + 'static>(enhancer: E) -> Box<dyn StoreEnhancer> {
    Box::new(enhancer)
}

pub fn apply_enhancers(
    enhancers: Vec<Box<dyn StoreEnhancer>>,
    options: &StoreOptions,
    base: StoreFactory,
) -> Rc<dyn EnhanceableStore> {
    let factory = enhancers
        .into_iter()
        .rev()
        .fold(base, |next, enhancer| -> StoreFactory {
            Box::new(move |options: &StoreOptions| enhancer.enhance(options, next))
        });
    factory(options)
}
