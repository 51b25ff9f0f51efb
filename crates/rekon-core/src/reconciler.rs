use crate::config::EngineConfig;
use crate::context::{CancelToken, ExecutionContext};
use crate::directive::Directive;
use crate::executor::{Chain, Executor};
use crate::owner::OwnerLookup;
use crate::retry::retry_chain;
use crate::CoreError;
use rekon_schema::{ObjectKey, OwnerReference, Resource};
use rekon_store::{ResourceStore, RestMapper};
use std::sync::Arc;
use tracing::{info, warn};

/// A controller: builds the chain that reconciles one target.
pub trait Reconcile: Send + Sync {
    fn name(&self) -> &str;

    fn chain(&self, target: &ObjectKey) -> Result<Chain, CoreError>;
}

/// Entry point tying a store, a mapper and engine settings together.
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    mapper: Arc<dyn RestMapper>,
    config: EngineConfig,
    cancel: CancelToken,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        mapper: Arc<dyn RestMapper>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            mapper,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Share `cancel` with every context this reconciler creates.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &dyn ResourceStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn context(&self, target: ObjectKey) -> ExecutionContext {
        ExecutionContext::new(Arc::clone(&self.store), target).with_cancel(self.cancel.clone())
    }

    pub fn owners(&self) -> OwnerLookup<'_> {
        OwnerLookup::new(self.store.as_ref(), self.mapper.as_ref())
    }

    /// Run `chain` once for `target` and map the result to a directive.
    pub fn run(&self, target: &ObjectKey, chain: &Chain) -> Directive {
        let ctx = self.context(target.clone());
        let outcome = Executor::new(&ctx).run(chain);
        let directive = Directive::from_outcome(outcome, target);
        log_directive(&ctx, &directive);
        directive
    }

    /// Like [`run`](Self::run), re-running the chain on error up to the
    /// configured number of attempts.
    pub fn run_with_retry(&self, target: &ObjectKey, chain: &Chain) -> Directive {
        let ctx = self.context(target.clone());
        let outcome = retry_chain(&Executor::new(&ctx), self.config.retry, chain);
        let directive = Directive::from_outcome(outcome, target);
        log_directive(&ctx, &directive);
        directive
    }

    /// Build the controller's chain for `target` and run it with retries.
    pub fn reconcile(&self, controller: &dyn Reconcile, target: &ObjectKey) -> Directive {
        match controller.chain(target) {
            Ok(chain) => self.run_with_retry(target, &chain),
            Err(e) => {
                warn!("{}: could not build chain for {target}: {e}", controller.name());
                Directive::failed(target, e)
            }
        }
    }

    /// Controller reference of the object that controls `obj`'s controller.
    pub fn find_owner(&self, obj: &impl Resource) -> Result<Option<OwnerReference>, CoreError> {
        match obj.controller() {
            Some(reference) => self
                .owners()
                .find_owner(obj.meta().namespace.as_ref(), reference),
            None => Ok(None),
        }
    }

    /// Topmost controller above `obj`, bounded by the configured depth.
    pub fn root_owner(&self, obj: &impl Resource) -> Result<Option<OwnerReference>, CoreError> {
        self.owners().root_owner(obj, self.config.max_owner_depth)
    }
}

fn log_directive(ctx: &ExecutionContext, directive: &Directive) {
    let _span = ctx.span().enter();
    match directive {
        Directive::Error(e) => warn!("{e}"),
        other => info!("{other}"),
    }
}
