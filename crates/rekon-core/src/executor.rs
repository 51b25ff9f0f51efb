use crate::action::{Action, ActionKind};
use crate::context::ExecutionContext;
use crate::outcome::{Outcome, Payload};
use crate::CoreError;
use rekon_schema::Resource;
use rekon_store::StoreError;
use tracing::{debug, trace, warn};

/// An ordered sequence of actions run front to back.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    steps: Vec<Action>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then(mut self, action: Action) -> Self {
        self.steps.push(action);
        self
    }

    pub fn push(&mut self, action: Action) {
        self.steps.push(action);
    }

    pub fn steps(&self) -> &[Action] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl From<Vec<Action>> for Chain {
    fn from(steps: Vec<Action>) -> Self {
        Self { steps }
    }
}

impl FromIterator<Action> for Chain {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

/// Runs actions against the store held by an [`ExecutionContext`].
pub struct Executor<'a> {
    ctx: &'a ExecutionContext,
}

impl<'a> Executor<'a> {
    pub fn new(ctx: &'a ExecutionContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ExecutionContext {
        self.ctx
    }

    /// Run the chain until an outcome other than `Continue` appears.
    /// Running off the end yields `Done`, carrying the last payload.
    pub fn run(&self, chain: &Chain) -> Outcome {
        let _span = self.ctx.span().enter();
        debug!("running chain of {} actions", chain.len());
        let mut prior = Outcome::proceed();
        for (index, action) in chain.steps().iter().enumerate() {
            let outcome = self.execute_after(action, &prior);
            if outcome.code().is_terminal() {
                debug!("chain stopped at step {index} ({:?}): {outcome}", action.kind());
                return outcome;
            }
            prior = outcome;
        }
        debug!("chain exhausted");
        prior.into_done()
    }

    /// Execute a single action with no preceding outcome.
    pub fn execute(&self, action: &Action) -> Outcome {
        self.execute_after(action, &Outcome::proceed())
    }

    /// Execute a single action. `prior` is what a `Call` thunk gets to see.
    pub fn execute_after(&self, action: &Action, prior: &Outcome) -> Outcome {
        if self.ctx.is_cancelled() {
            debug!("cancelled before {action:?}");
            return Outcome::cancelled(CoreError::Cancelled(self.ctx.target().to_string()));
        }
        trace!("executing {action:?}");
        let store = self.ctx.store();
        match action {
            Action::Get { rt, key } => match store.get(rt, key) {
                Ok(obj) => Outcome::proceed_with(Payload::Object(obj)),
                Err(e) => read_failure(ActionKind::Get, key, e),
            },
            Action::List { rt, filter } => match store.list(rt, filter) {
                Ok(items) => Outcome::proceed_with(Payload::List(items)),
                Err(e) => read_failure(ActionKind::List, rt, e),
            },
            Action::Create { object } => match store.create(object) {
                Ok(stored) => Outcome::proceed_with(Payload::Object(stored)),
                Err(e) => write_failure(ActionKind::Create, object.key(), e),
            },
            Action::Update { object } => match store.update(object) {
                Ok(stored) => Outcome::proceed_with(Payload::Object(stored)),
                Err(e) => write_failure(ActionKind::Update, object.key(), e),
            },
            Action::Delete { rt, key, options } => match store.delete(rt, key, options) {
                Ok(()) => Outcome::proceed(),
                Err(e) => write_failure(ActionKind::Delete, key, e),
            },
            Action::Call { label, thunk } => match thunk(prior) {
                Ok(Some(next)) => {
                    trace!("call '{label}' yielded {next:?}");
                    self.execute_after(&next, prior)
                }
                Ok(None) => match prior.payload() {
                    Some(payload) => Outcome::proceed_with(payload.clone()),
                    None => Outcome::proceed(),
                },
                Err(e) => {
                    warn!("call '{label}' failed: {e}");
                    Outcome::error(CoreError::step(ActionKind::Call, label, e))
                }
            },
            Action::HandleResult { action, handlers } => {
                let first = self.execute_after(action, prior);
                match handlers.iter().find(|h| h.on.matches(first.code())) {
                    Some(handler) => {
                        debug!(
                            "{} matched {:?}, running {:?}",
                            first.code(),
                            handler.on,
                            handler.then
                        );
                        self.execute_after(&handler.then, &first)
                    }
                    None => first,
                }
            }
            Action::Requeue { after: None } => Outcome::requeue(),
            Action::Requeue { after: Some(delay) } => Outcome::requeue_after(*delay),
            Action::Finish => Outcome::done(),
        }
    }
}

fn read_failure(kind: ActionKind, target: impl ToString, err: StoreError) -> Outcome {
    if err.is_not_found() {
        debug!("{kind}: {err}");
        return Outcome::not_found(CoreError::store(kind, target, err));
    }
    warn!("{kind} failed: {err}");
    Outcome::error(CoreError::store(kind, target, err))
}

fn write_failure(kind: ActionKind, target: impl ToString, err: StoreError) -> Outcome {
    warn!("{kind} failed: {err}");
    Outcome::error(CoreError::store(kind, target, err))
}
