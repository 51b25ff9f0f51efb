//! Action-chaining reconciliation engine.
//!
//! A reconcile invocation is expressed as a [`Chain`] of [`Action`] values
//! (store reads and writes, opaque calls, and guarded `HandleResult`
//! combinators). The [`Executor`] runs the chain against a
//! [`ResourceStore`](rekon_store::ResourceStore), short-circuiting on the
//! first outcome that is not `Continue`, and [`Directive::from_outcome`]
//! turns the final [`Outcome`] into a scheduling decision. [`retry`] and
//! [`retry_chain`] wrap operations in bounded retries, and [`OwnerLookup`]
//! resolves controller owner references through a [`RestMapper`](rekon_store::RestMapper).

pub mod action;
pub mod config;
pub mod context;
pub mod directive;
pub mod executor;
pub mod outcome;
pub mod owner;
pub mod patterns;
pub mod reconciler;
pub mod retry;

pub use action::{
    call, create, delete, get, handle_result, list, on_any, on_code, on_continue, on_error,
    on_not_found, on_requeue, update, Action, ActionKind, Handler, Predicate,
};
pub use config::EngineConfig;
pub use context::{install_signal_handler, CancelToken, ExecutionContext};
pub use directive::{Directive, ReconcileError, StopReason};
pub use executor::{Chain, Executor};
pub use outcome::{Code, Outcome, Payload, RequeueDelay};
pub use owner::{OwnerLookup, DEFAULT_MAX_OWNER_DEPTH};
pub use patterns::{delete_if_present, ensure_exists, require_field, update_with};
pub use reconciler::{Reconcile, Reconciler};
pub use retry::{retry, retry_chain, RetryPolicy, DEFAULT_RETRY_ATTEMPTS};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A store call issued by an action failed.
    #[error("{kind} {target} failed: {source}")]
    Store {
        kind: ActionKind,
        target: String,
        source: rekon_store::StoreError,
    },
    /// A non-store failure raised while running an action, such as a
    /// `Call` thunk returning an error.
    #[error("{kind} '{label}': {source}")]
    Step {
        kind: ActionKind,
        label: String,
        source: Box<CoreError>,
    },
    #[error("mapping error: {0}")]
    Mapping(#[from] rekon_store::MappingError),
    #[error("schema error: {0}")]
    Schema(#[from] rekon_schema::SchemaError),
    #[error("missing field '{field}' in {object}")]
    MissingField { object: String, field: String },
    #[error("call '{label}' failed: {reason}")]
    Call { label: String, reason: String },
    #[error("invalid requeue delay: {0}")]
    InvalidDelay(String),
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),
    #[error("owner chain of {0} loops back on itself")]
    OwnerCycle(String),
    #[error("owner chain of {object} exceeds {depth} levels")]
    OwnerDepthExceeded { object: String, depth: usize },
    #[error("reconciliation of {0} cancelled")]
    Cancelled(String),
    #[error("signal handler error: {0}")]
    Signal(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn store(kind: ActionKind, target: impl ToString, source: rekon_store::StoreError) -> Self {
        Self::Store {
            kind,
            target: target.to_string(),
            source,
        }
    }

    /// Failure raised from inside a `Call` thunk.
    pub fn call(label: &str, reason: impl ToString) -> Self {
        Self::Call {
            label: label.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// Tag `source` with the action that raised it.
    pub fn step(kind: ActionKind, label: &str, source: CoreError) -> Self {
        Self::Step {
            kind,
            label: label.to_owned(),
            source: Box::new(source),
        }
    }

    /// The kind of the action that failed, if this error came from one.
    pub fn action(&self) -> Option<ActionKind> {
        match self {
            Self::Store { kind, .. } | Self::Step { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The error beneath any `Step` tags.
    pub fn innermost(&self) -> &CoreError {
        match self {
            Self::Step { source, .. } => source.innermost(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.innermost(), Self::Store { source, .. } if source.is_not_found())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.innermost(), Self::Store { source, .. } if source.is_conflict())
    }
}
