use crate::CoreError;
use rekon_schema::ObjectKey;
use rekon_store::ResourceStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Cancel `token` on SIGINT/SIGTERM. A second signal exits the process.
///
/// Only one handler can be installed per process.
pub fn install_signal_handler(token: &CancelToken) -> Result<(), CoreError> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        if token.is_cancelled() {
            std::process::exit(1);
        }
        token.cancel();
        eprintln!("\nshutdown requested, finishing current action...");
    })
    .map_err(|e| CoreError::Signal(e.to_string()))
}

/// Everything one reconcile invocation runs against: the store, the object
/// being reconciled, the cancellation flag, and the span all logging goes to.
pub struct ExecutionContext {
    store: Arc<dyn ResourceStore>,
    target: ObjectKey,
    cancel: CancelToken,
    span: tracing::Span,
}

impl ExecutionContext {
    pub fn new(store: Arc<dyn ResourceStore>, target: ObjectKey) -> Self {
        let span = tracing::info_span!("reconcile", target = %target);
        Self {
            store,
            target,
            cancel: CancelToken::new(),
            span,
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Log under `span` instead of the default `reconcile` span.
    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn store(&self) -> &dyn ResourceStore {
        self.store.as_ref()
    }

    pub fn target(&self) -> &ObjectKey {
        &self.target
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("store", &self.store.name())
            .field("target", &self.target)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
