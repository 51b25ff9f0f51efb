use crate::outcome::{Code, Outcome, RequeueDelay};
use crate::CoreError;
use rekon_schema::{DynamicObject, ListFilter, ObjectKey, Resource as _, ResourceType};
use rekon_store::DeleteOptions;
use std::fmt;
use std::sync::Arc;

/// Opaque computation run by a `Call` action. It sees the outcome of the
/// action before it and may hand back a follow-up action to run in its place.
pub type CallFn = dyn Fn(&Outcome) -> Result<Option<Action>, CoreError> + Send + Sync;

/// One unit of reconcile work. Built before execution, runnable any number of times.
#[derive(Clone)]
pub enum Action {
    Get {
        rt: ResourceType,
        key: ObjectKey,
    },
    List {
        rt: ResourceType,
        filter: ListFilter,
    },
    Create {
        object: DynamicObject,
    },
    Update {
        object: DynamicObject,
    },
    Delete {
        rt: ResourceType,
        key: ObjectKey,
        options: DeleteOptions,
    },
    Call {
        label: String,
        thunk: Arc<CallFn>,
    },
    /// Run `action`, then the first handler whose predicate matches its code.
    HandleResult {
        action: Box<Action>,
        handlers: Vec<Handler>,
    },
    /// Ask to be scheduled again, immediately or after a delay.
    Requeue {
        after: Option<RequeueDelay>,
    },
    /// End the invocation successfully.
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Get,
    List,
    Create,
    Update,
    Delete,
    Call,
    HandleResult,
    Requeue,
    Finish,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Get => write!(f, "get"),
            ActionKind::List => write!(f, "list"),
            ActionKind::Create => write!(f, "create"),
            ActionKind::Update => write!(f, "update"),
            ActionKind::Delete => write!(f, "delete"),
            ActionKind::Call => write!(f, "call"),
            ActionKind::HandleResult => write!(f, "handle-result"),
            ActionKind::Requeue => write!(f, "requeue"),
            ActionKind::Finish => write!(f, "finish"),
        }
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Get { .. } => ActionKind::Get,
            Action::List { .. } => ActionKind::List,
            Action::Create { .. } => ActionKind::Create,
            Action::Update { .. } => ActionKind::Update,
            Action::Delete { .. } => ActionKind::Delete,
            Action::Call { .. } => ActionKind::Call,
            Action::HandleResult { .. } => ActionKind::HandleResult,
            Action::Requeue { .. } => ActionKind::Requeue,
            Action::Finish => ActionKind::Finish,
        }
    }

    pub fn requeue() -> Self {
        Action::Requeue { after: None }
    }

    /// Requeue after `delay`. A zero delay is rejected here, before anything runs.
    pub fn requeue_after(delay: std::time::Duration) -> Result<Self, CoreError> {
        Ok(Action::Requeue {
            after: Some(RequeueDelay::new(delay)?),
        })
    }

    /// A call that does nothing and lets the chain continue.
    pub fn noop() -> Self {
        call("noop", |_| Ok(None))
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Get { rt, key } => write!(f, "Get({rt} {key})"),
            Action::List { rt, filter } => {
                write!(f, "List({rt}")?;
                if let Some(ns) = &filter.namespace {
                    write!(f, " in {ns}")?;
                }
                if !filter.labels.is_empty() {
                    write!(f, " labels={}", filter.label_selector())?;
                }
                write!(f, ")")
            }
            Action::Create { object } => write!(f, "Create({} {})", object.kind, object.key()),
            Action::Update { object } => write!(f, "Update({} {})", object.kind, object.key()),
            Action::Delete { rt, key, .. } => write!(f, "Delete({rt} {key})"),
            Action::Call { label, .. } => write!(f, "Call({label})"),
            Action::HandleResult { action, handlers } => f
                .debug_struct("HandleResult")
                .field("action", action)
                .field("handlers", handlers)
                .finish(),
            Action::Requeue { after: None } => write!(f, "Requeue"),
            Action::Requeue { after: Some(d) } => write!(f, "RequeueAfter({:?})", d.duration()),
            Action::Finish => write!(f, "Finish"),
        }
    }
}

/// Which result codes a [`Handler`] reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Continue,
    NotFound,
    Error,
    /// Both `Requeue` and `RequeueAfter`.
    Requeue,
    Code(Code),
    /// Any code except `Cancelled`.
    Any,
}

impl Predicate {
    pub fn matches(self, code: Code) -> bool {
        if code == Code::Cancelled {
            return false;
        }
        match self {
            Predicate::Continue => code == Code::Continue,
            Predicate::NotFound => code == Code::NotFound,
            Predicate::Error => code == Code::Error,
            Predicate::Requeue => matches!(code, Code::Requeue | Code::RequeueAfter),
            Predicate::Code(c) => code == c,
            Predicate::Any => true,
        }
    }
}

/// A predicate paired with the action to run when it matches.
#[derive(Debug, Clone)]
pub struct Handler {
    pub on: Predicate,
    pub then: Action,
}

pub fn get(rt: &ResourceType, key: &ObjectKey) -> Action {
    Action::Get {
        rt: rt.clone(),
        key: key.clone(),
    }
}

pub fn list(rt: &ResourceType, filter: ListFilter) -> Action {
    Action::List {
        rt: rt.clone(),
        filter,
    }
}

pub fn create(object: DynamicObject) -> Action {
    Action::Create { object }
}

pub fn update(object: DynamicObject) -> Action {
    Action::Update { object }
}

pub fn delete(rt: &ResourceType, key: &ObjectKey, options: DeleteOptions) -> Action {
    Action::Delete {
        rt: rt.clone(),
        key: key.clone(),
        options,
    }
}

pub fn call<F>(label: &str, thunk: F) -> Action
where
    F: Fn(&Outcome) -> Result<Option<Action>, CoreError> + Send + Sync + 'static,
{
    Action::Call {
        label: label.to_owned(),
        thunk: Arc::new(thunk),
    }
}

/// Guard `action` with handlers, checked in order; the first match wins.
/// With no match the guarded action's outcome passes through unchanged.
pub fn handle_result(action: Action, handlers: impl IntoIterator<Item = Handler>) -> Action {
    Action::HandleResult {
        action: Box::new(action),
        handlers: handlers.into_iter().collect(),
    }
}

pub fn on_continue(then: Action) -> Handler {
    Handler {
        on: Predicate::Continue,
        then,
    }
}

pub fn on_not_found(then: Action) -> Handler {
    Handler {
        on: Predicate::NotFound,
        then,
    }
}

pub fn on_error(then: Action) -> Handler {
    Handler {
        on: Predicate::Error,
        then,
    }
}

pub fn on_requeue(then: Action) -> Handler {
    Handler {
        on: Predicate::Requeue,
        then,
    }
}

pub fn on_code(code: Code, then: Action) -> Handler {
    Handler {
        on: Predicate::Code(code),
        then,
    }
}

pub fn on_any(then: Action) -> Handler {
    Handler {
        on: Predicate::Any,
        then,
    }
}
