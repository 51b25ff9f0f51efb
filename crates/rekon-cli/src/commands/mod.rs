pub mod completions;
pub mod delete;
pub mod ensure;
pub mod get;
pub mod list;
pub mod owner;

use rekon_core::{CancelToken, Chain, Directive, EngineConfig, Executor, Reconciler, StopReason};
use rekon_schema::{DynamicObject, ObjectKey, ResourceType};
use rekon_store::{open_store, RestMapper, StaticMapper, StoreConfig};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_RETRY: u8 = 2;

pub fn json_pretty(value: &impl Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Process exit code for a directive: stops succeed, retries ask the caller
/// to come back, errors fail.
pub fn exit_code(directive: &Directive) -> u8 {
    match directive {
        Directive::Stop(_) => EXIT_SUCCESS,
        Directive::RetryNow | Directive::RetryAfter(_) => EXIT_RETRY,
        Directive::Error(_) => EXIT_FAILURE,
    }
}

/// Machine-readable summary of one command run.
#[derive(Debug, Serialize)]
pub struct Report {
    pub directive: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<DynamicObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<DynamicObject>>,
}

impl Report {
    pub fn new(directive: &Directive) -> Self {
        let (name, reason, retry_after_secs, error) = match directive {
            Directive::Stop(reason) => {
                let reason = match reason {
                    StopReason::Done => "done",
                    StopReason::NotFound => "not-found",
                    StopReason::Cancelled => "cancelled",
                };
                ("stop", Some(reason), None, None)
            }
            Directive::RetryNow => ("retry", None, None, None),
            Directive::RetryAfter(delay) => {
                ("retry-after", None, Some(delay.as_secs_f64()), None)
            }
            Directive::Error(e) => ("error", None, None, Some(e.to_string())),
        };
        Self {
            directive: name,
            reason,
            retry_after_secs,
            error,
            object: None,
            items: None,
        }
    }
}

/// Everything a command needs: the reconciler and the type table.
pub struct Session {
    pub reconciler: Reconciler,
    pub mapper: Arc<StaticMapper>,
}

impl Session {
    pub fn open(config: EngineConfig, cancel: CancelToken) -> Result<Self, String> {
        let store = open_store(&config.store).map_err(|e| format!("store error: {e}"))?;
        let mapper = Arc::new(StaticMapper::with_builtin_types());
        let types: Arc<dyn RestMapper> = mapper.clone();
        let reconciler = Reconciler::new(Arc::from(store), types, config).with_cancel(cancel);
        Ok(Self { reconciler, mapper })
    }

    /// Resolve `Kind[.group][/version]`, e.g. `ConfigMap` or `Deployment.apps/v1`.
    pub fn resolve_type(&self, spec: &str) -> Result<ResourceType, String> {
        let (coords, version) = spec.split_once('/').unwrap_or((spec, ""));
        let (kind, group) = coords.split_once('.').unwrap_or((coords, ""));
        if kind.is_empty() {
            return Err(format!("invalid resource type '{spec}'"));
        }
        self.mapper
            .resolve(group, kind, version)
            .map_err(|e| e.to_string())
    }

    /// Run `chain` once and keep whatever the last step read.
    pub fn run_reading(&self, target: &ObjectKey, chain: &Chain) -> (Directive, Report) {
        let ctx = self.reconciler.context(target.clone());
        let outcome = Executor::new(&ctx).run(chain);
        let object = outcome.object().cloned();
        let items = outcome.objects().map(<[DynamicObject]>::to_vec);
        let directive = Directive::from_outcome(outcome, target);
        let mut report = Report::new(&directive);
        report.object = object;
        report.items = items;
        (directive, report)
    }
}

/// Pick the engine config: an explicit store file wins over the engine
/// file, which wins over `~/.config/rekon/store.json`.
pub fn load_config(
    config_path: Option<&Path>,
    store_config: Option<&Path>,
    retries: Option<u32>,
) -> Result<EngineConfig, String> {
    let mut config = match config_path {
        Some(path) => EngineConfig::load(path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };
    if let Some(path) = store_config {
        config.store = StoreConfig::load(path)
            .map_err(|e| format!("failed to read store config {}: {e}", path.display()))?;
    } else if config_path.is_none() {
        config.store = StoreConfig::load_default()
            .map_err(|e| format!("no --store-config and no default store config: {e}"))?;
    }
    if let Some(n) = retries {
        config.retry = rekon_core::RetryPolicy::new(n).map_err(|e| e.to_string())?;
    }
    Ok(config)
}

/// Qualify a bare name with `namespace` when the type is namespaced.
pub fn resolve_key(rt: &ResourceType, key: &str, namespace: &str) -> Result<ObjectKey, String> {
    let parsed = ObjectKey::parse(key).map_err(|e| e.to_string())?;
    match (rt.namespaced, parsed.namespace.is_some()) {
        (true, false) => Ok(ObjectKey::namespaced(namespace, &parsed.name)),
        (false, true) => Err(format!(
            "{} is cluster-scoped; drop the namespace from '{key}'",
            rt.kind
        )),
        _ => Ok(parsed),
    }
}

/// Print the directive in the selected format and return its exit code.
pub fn finish(directive: &Directive, report: &Report, json: bool) -> Result<u8, String> {
    if json {
        println!("{}", json_pretty(report)?);
    } else if let Directive::Error(e) = directive {
        eprintln!("error: {e}");
    } else {
        println!("{directive}");
    }
    Ok(exit_code(directive))
}

pub fn print_object(obj: &DynamicObject) -> Result<(), String> {
    println!("{}", json_pretty(obj)?);
    Ok(())
}
