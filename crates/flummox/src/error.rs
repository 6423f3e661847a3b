//! Error types for Flummox.

use std::fmt;

use thiserror::Error;

use crate::dispatch::DispatchToken;

/// Which registry a key or class belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Store,
    Actions,
}

impl RegistryKind {
    fn plural(self) -> &'static str {
        match self {
            RegistryKind::Store => "stores",
            RegistryKind::Actions => "actions",
        }
    }

    fn article(self) -> &'static str {
        match self {
            RegistryKind::Store => "a store",
            RegistryKind::Actions => "actions",
        }
    }

    /// Name of the capability a class must implement to belong here.
    pub fn capability(self) -> &'static str {
        match self {
            RegistryKind::Store => "Store",
            RegistryKind::Actions => "ActionSet",
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.capability())
    }
}

/// Every failure surfaced by the orchestrator, its action sets and the
/// dispatch channel.
///
/// Channel errors (`ReentrantDispatch`, `WaitOutsideDispatch`,
/// `CircularDependency`, `UnknownToken`) pass through store handlers and
/// [`Flux::wait_for`](crate::Flux::wait_for) unchanged.
#[derive(Debug, Error)]
pub enum FluxError {
    /// An action ran before its action set was added to a `Flux` instance.
    #[error(
        "You've attempted to perform the action {set}#{method}, but it hasn't been added to a Flux instance."
    )]
    NotWired { set: String, method: String },

    #[error("You've attempted to create multiple {} with key {key}. Keys must be unique.", .kind.plural())]
    DuplicateKey { kind: RegistryKind, key: String },

    #[error(
        "You've attempted to create {} from the class {class}, which does not implement the {expected} capability. Make sure it is registered as one: `impl {expected} for {class} {{ ... }}`",
        .expected.article()
    )]
    InvalidVariant {
        class: String,
        expected: RegistryKind,
    },

    #[error("no class named {0} in the catalog")]
    UnknownClass(String),

    #[error("failed to construct {class}: {source}")]
    Construct {
        class: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{set} has no action named {method}")]
    UnknownAction { set: String, method: String },

    #[error("{set} cannot declare an action named {method:?}; action names must be identifiers")]
    InvalidMethodName { set: String, method: String },

    #[error("{set} declares the action {method} more than once")]
    DuplicateAction { set: String, method: String },

    #[error("invalid arguments for {set}#{method}: {source}")]
    InvalidArguments {
        set: String,
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("action {set}#{method} failed: {source}")]
    ActionFailed {
        set: String,
        method: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Cannot dispatch in the middle of a dispatch.")]
    ReentrantDispatch,

    #[error("wait_for must be invoked while dispatching.")]
    WaitOutsideDispatch,

    #[error("Circular dependency detected while waiting for `{0}`.")]
    CircularDependency(DispatchToken),

    #[error("`{0}` does not map to a registered callback.")]
    UnknownToken(DispatchToken),

    #[error("store handler failed: {0}")]
    Handler(#[from] anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FluxError {
    /// True for failures raised by the dispatch channel itself.
    pub fn is_channel_error(&self) -> bool {
        matches!(
            self,
            FluxError::ReentrantDispatch
                | FluxError::WaitOutsideDispatch
                | FluxError::CircularDependency(_)
                | FluxError::UnknownToken(_)
        )
    }
}
