use super::{finish, Report, Session};
use rekon_core::{ensure_exists, Action, Chain};
use rekon_schema::{DynamicObject, Resource};
use rekon_store::RestMapper;
use std::path::Path;
use std::time::Duration;

pub fn run(
    session: &Session,
    file: &Path,
    requeue_after: Option<u64>,
    json: bool,
) -> Result<u8, String> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("failed to read {}: {e}", file.display()))?;
    let object: DynamicObject = serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse {}: {e}", file.display()))?;
    let gvk = object.gvk().map_err(|e| e.to_string())?;
    let rt = session.mapper.resolve_gvk(&gvk).map_err(|e| e.to_string())?;
    if rt.namespaced && object.meta().namespace.is_none() {
        return Err(format!("{} '{}' needs a namespace", rt.kind, object.meta().name));
    }

    let target = object.key();
    let mut chain = Chain::new().then(ensure_exists(&rt, object));
    if let Some(secs) = requeue_after {
        chain.push(Action::requeue_after(Duration::from_secs(secs)).map_err(|e| e.to_string())?);
    }

    let directive = session.reconciler.run_with_retry(&target, &chain);
    finish(&directive, &Report::new(&directive), json)
}
