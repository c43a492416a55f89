//! The greeting board: a list of greetings and a counter.

use std::sync::LazyLock;

use boxstate_core::{async_action, Action, MutationFactory, StateBox, Store, StoreError};
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::session::{LogoutEvent, LOGOUT};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestState {
    pub greets: Vec<String>,
    pub count: i32,
}

/// Greetings to append.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GreetsPatch {
    pub greets: Vec<String>,
}

impl GreetsPatch {
    pub fn new<I, G>(greets: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<String>,
    {
        Self {
            greets: greets.into_iter().map(Into::into).collect(),
        }
    }
}

static TEST_BOX: LazyLock<StateBox<TestState>> = LazyLock::new(|| {
    let b = StateBox::new("test", TestState::default());
    b.listen(&*LOGOUT, |_state: &TestState, event: &LogoutEvent| TestState {
        greets: Vec::new(),
        count: event.count,
    });
    b
});

static MERGE_TEST: LazyLock<MutationFactory<TestState, GreetsPatch>> = LazyLock::new(|| {
    TEST_BOX
        .mutation(|state: &TestState, patch: &GreetsPatch| TestState {
            greets: state.greets.iter().chain(&patch.greets).cloned().collect(),
            count: state.count,
        })
        .with_type("test/merge")
});

static SET_COUNT: LazyLock<MutationFactory<TestState, i32>> = LazyLock::new(|| {
    TEST_BOX
        .mutation(|state: &TestState, count: &i32| TestState {
            count: *count,
            ..state.clone()
        })
        .with_type("test/setCount")
});

pub fn test_box() -> &'static StateBox<TestState> {
    &TEST_BOX
}

/// Append greetings. Dispatching returns the patch.
pub fn merge_test(patch: GreetsPatch) -> boxstate_core::Mutation<GreetsPatch> {
    MERGE_TEST.call(patch)
}

pub fn set_count(count: i32) -> boxstate_core::Mutation<i32> {
    SET_COUNT.call(count)
}

/// Append one greeting and bump the counter. The work happens when the
/// returned future is polled, so each write is its own root dispatch.
///
/// Resolves to the greeting added and the new count.
pub fn add_greet(
    greet: impl Into<String>,
) -> Action<LocalBoxFuture<'static, boxstate_core::Result<TestState>>> {
    let greet = greet.into();
    async_action(move |store: Store| async move {
        store.dispatch(merge_test(GreetsPatch::new([greet.clone()])))?;
        let count = store.select(test_box())?.count + 1;
        store.dispatch(set_count(count))?;
        Ok::<_, StoreError>(TestState {
            greets: vec![greet],
            count,
        })
    })
}

/// An action whose actor fails with `message`.
pub fn fail_with(message: &'static str) -> Action<()> {
    Action::labelled("test/fail", move |_: &Store| {
        Err(StoreError::from(anyhow::anyhow!(message)))
    })
}
