use crate::CoreError;
use rekon_schema::DynamicObject;
use std::fmt;
use std::time::Duration;

/// Sentinel code of one executed action. Only `Continue` lets a chain advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Continue,
    NotFound,
    Error,
    Requeue,
    RequeueAfter,
    Done,
    /// The invocation was cancelled before the next action was issued.
    Cancelled,
}

impl Code {
    pub fn is_terminal(self) -> bool {
        self != Code::Continue
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Continue => write!(f, "continue"),
            Code::NotFound => write!(f, "not-found"),
            Code::Error => write!(f, "error"),
            Code::Requeue => write!(f, "requeue"),
            Code::RequeueAfter => write!(f, "requeue-after"),
            Code::Done => write!(f, "done"),
            Code::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A strictly positive requeue delay. Zero is rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequeueDelay(Duration);

impl RequeueDelay {
    pub fn new(delay: Duration) -> Result<Self, CoreError> {
        if delay.is_zero() {
            return Err(CoreError::InvalidDelay(
                "requeue delay must be positive, got 0s".to_owned(),
            ));
        }
        Ok(Self(delay))
    }

    /// Build from signed seconds, as delays arrive from configuration and status fields.
    pub fn from_secs(secs: i64) -> Result<Self, CoreError> {
        match u64::try_from(secs) {
            Ok(secs) => Self::new(Duration::from_secs(secs)),
            Err(_) => Err(CoreError::InvalidDelay(format!(
                "requeue delay must be positive, got {secs}s"
            ))),
        }
    }

    pub fn duration(self) -> Duration {
        self.0
    }
}

/// Data produced by a read.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Object(DynamicObject),
    List(Vec<DynamicObject>),
}

/// The result of executing one action.
#[derive(Debug)]
pub struct Outcome {
    code: Code,
    error: Option<CoreError>,
    requeue_after: Option<RequeueDelay>,
    payload: Option<Payload>,
}

impl Outcome {
    fn with_code(code: Code) -> Self {
        Self {
            code,
            error: None,
            requeue_after: None,
            payload: None,
        }
    }

    /// `Continue` with no payload.
    pub fn proceed() -> Self {
        Self::with_code(Code::Continue)
    }

    pub fn proceed_with(payload: Payload) -> Self {
        Self {
            payload: Some(payload),
            ..Self::proceed()
        }
    }

    pub fn done() -> Self {
        Self::with_code(Code::Done)
    }

    pub fn not_found(cause: CoreError) -> Self {
        Self {
            error: Some(cause),
            ..Self::with_code(Code::NotFound)
        }
    }

    pub fn error(cause: CoreError) -> Self {
        Self {
            error: Some(cause),
            ..Self::with_code(Code::Error)
        }
    }

    pub fn requeue() -> Self {
        Self::with_code(Code::Requeue)
    }

    pub fn requeue_after(delay: RequeueDelay) -> Self {
        Self {
            requeue_after: Some(delay),
            ..Self::with_code(Code::RequeueAfter)
        }
    }

    pub fn cancelled(cause: CoreError) -> Self {
        Self {
            error: Some(cause),
            ..Self::with_code(Code::Cancelled)
        }
    }

    /// Turn an exhausted chain's last `Continue` into `Done`, keeping its payload.
    pub(crate) fn into_done(self) -> Self {
        Self {
            code: Code::Done,
            ..self
        }
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn is(&self, code: Code) -> bool {
        self.code == code
    }

    pub fn error_ref(&self) -> Option<&CoreError> {
        self.error.as_ref()
    }

    pub fn into_error(self) -> Option<CoreError> {
        self.error
    }

    pub fn requeue_delay(&self) -> Option<Duration> {
        self.requeue_after.map(RequeueDelay::duration)
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<Payload> {
        self.payload
    }

    /// The single object read by the action, if any.
    pub fn object(&self) -> Option<&DynamicObject> {
        match &self.payload {
            Some(Payload::Object(obj)) => Some(obj),
            _ => None,
        }
    }

    /// Items read by a list, if any.
    pub fn objects(&self) -> Option<&[DynamicObject]> {
        match &self.payload {
            Some(Payload::List(items)) => Some(items),
            _ => None,
        }
    }

    /// Split off `Error` outcomes so they can drive [`retry`](crate::retry::retry).
    /// Every other code, including `NotFound`, stays `Ok`.
    pub fn into_result(self) -> Result<Self, CoreError> {
        if self.code == Code::Error {
            return Err(self
                .error
                .unwrap_or_else(|| CoreError::Internal("error outcome without cause".to_owned())));
        }
        Ok(self)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if let Some(delay) = self.requeue_after {
            write!(f, " after {:?}", delay.duration())?;
        }
        if let Some(err) = &self.error {
            write!(f, ": {err}")?;
        }
        Ok(())
    }
}
