//! Shared fixtures for boxstate tests.
//!
//! Sample boxes, signals and actions modelled on a small app (a greeting
//! board and a session table), plus helpers to observe a store from tests.
//! Nothing here needs a runtime beyond the store itself.

pub mod greets;
pub mod logging;
pub mod recorder;
pub mod session;

pub use greets::{add_greet, fail_with, merge_test, set_count, test_box, GreetsPatch, TestState};
pub use logging::init_tracing;
pub use recorder::{HookRecorder, Notifications};
pub use session::{
    logout, session_box, session_id_box, user_box, LogoutEvent, Session, SessionTable, LOGOUT,
};

use std::sync::Arc;

use boxstate_core::{create_store, AnyBox, PreloadedState, Store, StoreOptions};

/// A preloaded snapshot from a JSON object literal. Anything else is empty.
pub fn preloaded(value: serde_json::Value) -> PreloadedState {
    match value {
        serde_json::Value::Object(map) => map,
        _ => PreloadedState::new(),
    }
}

/// Every fixture box, for stores that should deliver signals to boxes
/// nobody has read yet.
pub fn fixture_boxes() -> Vec<Arc<dyn AnyBox>> {
    vec![
        test_box().erased(),
        session_box().erased(),
        session_id_box().erased(),
        user_box().erased(),
    ]
}

/// A store with only the built-in enhancers that knows every fixture box.
pub fn fixture_store() -> Store {
    create_store(StoreOptions::new().with_boxes(fixture_boxes()), Vec::new())
}

/// Like [`fixture_store`], hydrated from `value`.
pub fn preloaded_store(value: serde_json::Value) -> Store {
    create_store(
        StoreOptions::new()
            .with_preloaded_state(preloaded(value))
            .with_boxes(fixture_boxes()),
        Vec::new(),
    )
}
