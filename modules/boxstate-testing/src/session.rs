//! Sessions, and the logout signal every interested box listens to.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use boxstate_core::{Signal, SignalFactory, StateBox, Store};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: u64,
    pub token: String,
    pub user_id: u64,
}

impl Session {
    pub fn is_anonymous(&self) -> bool {
        self.user_id == 0
    }
}

pub type SessionTable = BTreeMap<u64, Session>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoutEvent {
    pub session_id: u64,
    pub count: i32,
}

/// Logs out the current session. The argument becomes the greeting
/// board's counter.
pub static LOGOUT: LazyLock<SignalFactory<i32, LogoutEvent>> = LazyLock::new(|| {
    SignalFactory::new("LOGOUT", |store: &Store, count: i32| {
        Ok(LogoutEvent {
            session_id: store.select(session_id_box())?,
            count,
        })
    })
});

static SESSION_BOX: LazyLock<StateBox<SessionTable>> = LazyLock::new(|| {
    let b = StateBox::new("sessions", SessionTable::new());
    b.listen(&*LOGOUT, |sessions: &SessionTable, event: &LogoutEvent| {
        let mut sessions = sessions.clone();
        sessions.remove(&event.session_id);
        sessions
    });
    b
});

static SESSION_ID_BOX: LazyLock<StateBox<u64>> = LazyLock::new(|| {
    let b = StateBox::new("sessions.currentId", 0_u64);
    b.listen(&*LOGOUT, |_: &u64, _: &LogoutEvent| 0);
    b
});

static USER_BOX: LazyLock<StateBox<Vec<String>>> =
    LazyLock::new(|| StateBox::new("users", Vec::new()));

pub fn session_box() -> &'static StateBox<SessionTable> {
    &SESSION_BOX
}

pub fn session_id_box() -> &'static StateBox<u64> {
    &SESSION_ID_BOX
}

/// A box that does not listen to `LOGOUT`.
pub fn user_box() -> &'static StateBox<Vec<String>> {
    &USER_BOX
}

/// Build a `LOGOUT` signal.
pub fn logout(count: i32) -> Signal<LogoutEvent> {
    LOGOUT.call(count)
}
