use crate::action::ActionKind;
use crate::outcome::{Code, Outcome};
use crate::CoreError;
use rekon_schema::ObjectKey;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The chain finished; nothing left to do until the next change.
    Done,
    /// A required object is absent. Wait for it to appear.
    NotFound,
    /// The invocation was cancelled.
    Cancelled,
}

/// A failed reconcile of one target.
#[derive(Debug, Error)]
#[error("reconcile {target}: {cause}")]
pub struct ReconcileError {
    pub target: ObjectKey,
    #[source]
    pub cause: CoreError,
}

impl ReconcileError {
    /// Kind of the action whose store call failed, when known.
    pub fn action(&self) -> Option<ActionKind> {
        self.cause.action()
    }
}

/// What the scheduling loop should do with the target after one invocation.
#[derive(Debug)]
pub enum Directive {
    Stop(StopReason),
    RetryNow,
    RetryAfter(Duration),
    Error(ReconcileError),
}

impl Directive {
    pub fn from_outcome(outcome: Outcome, target: &ObjectKey) -> Self {
        match outcome.code() {
            Code::Continue | Code::Done => Directive::Stop(StopReason::Done),
            Code::NotFound => Directive::Stop(StopReason::NotFound),
            Code::Cancelled => Directive::Stop(StopReason::Cancelled),
            Code::Requeue => Directive::RetryNow,
            Code::RequeueAfter => match outcome.requeue_delay() {
                Some(delay) => Directive::RetryAfter(delay),
                None => Directive::RetryNow,
            },
            Code::Error => {
                let cause = outcome
                    .into_error()
                    .unwrap_or_else(|| CoreError::Internal("error outcome without cause".to_owned()));
                Self::failed(target, cause)
            }
        }
    }

    /// An error directive for failures raised outside an action chain.
    pub fn failed(target: &ObjectKey, cause: CoreError) -> Self {
        Directive::Error(ReconcileError {
            target: target.clone(),
            cause,
        })
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Directive::Stop(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Directive::Error(_))
    }

    pub fn error(&self) -> Option<&ReconcileError> {
        match self {
            Directive::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Stop(StopReason::Done) => write!(f, "stop (done)"),
            Directive::Stop(StopReason::NotFound) => write!(f, "stop (not found)"),
            Directive::Stop(StopReason::Cancelled) => write!(f, "stop (cancelled)"),
            Directive::RetryNow => write!(f, "retry now"),
            Directive::RetryAfter(delay) => write!(f, "retry after {}s", delay.as_secs_f64()),
            Directive::Error(e) => write!(f, "error: {e}"),
        }
    }
}
