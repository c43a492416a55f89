use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("dispatching non-dispatchable type: {0}")]
    InvalidDispatchable(String),

    #[error("dispatching non-dispatchable object: {0}")]
    UnknownDispatchable(String),

    #[error("state of box `{key}` is not a `{expected}`")]
    StateType { key: String, expected: &'static str },

    #[error("selected value is not a `{expected}`")]
    SelectType { expected: &'static str },

    #[error("failed to hydrate box `{key}`: {source}")]
    Hydration {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot merge state of box `{key}`: {reason}")]
    Merge { key: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
