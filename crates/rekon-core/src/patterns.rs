//! Ready-made action shapes for the usual reconcile steps.

use crate::action::{call, delete, get, handle_result, on_continue, on_not_found, Action};
use crate::CoreError;
use rekon_schema::{DynamicObject, ObjectKey, Resource, ResourceType};
use rekon_store::DeleteOptions;
use std::sync::Arc;

/// Get the object; if it is absent, create `default` in its place.
pub fn ensure_exists(rt: &ResourceType, default: DynamicObject) -> Action {
    let key = default.key();
    handle_result(
        get(rt, &key),
        [on_not_found(call("create-default", move |_| {
            Ok(Some(Action::Create {
                object: default.clone(),
            }))
        }))],
    )
}

/// Get the object and apply `mutate` to a copy. When `mutate` reports a
/// change, write it back carrying the version that was read, so a concurrent
/// write surfaces as a conflict. Wrap in [`retry_chain`](crate::retry_chain)
/// for read-modify-write.
pub fn update_with<F>(rt: &ResourceType, key: &ObjectKey, mutate: F) -> Action
where
    F: Fn(&mut DynamicObject) -> Result<bool, CoreError> + Send + Sync + 'static,
{
    let label = format!("update {key}");
    let name = label.clone();
    let mutate = Arc::new(mutate);
    handle_result(
        get(rt, key),
        [on_continue(call(&name, move |prior| {
            let Some(current) = prior.object() else {
                return Err(CoreError::call(&label, "no object read"));
            };
            let mut next = current.clone();
            if mutate(&mut next)? {
                Ok(Some(Action::Update { object: next }))
            } else {
                Ok(None)
            }
        }))],
    )
}

/// Delete the object if it exists, guarded by the version just read.
/// An absent object counts as success.
pub fn delete_if_present(rt: &ResourceType, key: &ObjectKey, options: DeleteOptions) -> Action {
    let target_rt = rt.clone();
    let target = key.clone();
    handle_result(
        get(rt, key),
        [
            on_continue(call("delete-current", move |prior| {
                let mut options = options.clone();
                if let Some(current) = prior.object() {
                    options.precondition = current.resource_version().cloned();
                }
                Ok(Some(delete(&target_rt, &target, options)))
            })),
            on_not_found(Action::noop()),
        ],
    )
}

/// Fail unless the object from the previous step has a value at `path`.
pub fn require_field(path: &[&str]) -> Action {
    let path: Vec<String> = path.iter().map(|s| (*s).to_owned()).collect();
    let dotted = path.join(".");
    call(&format!("require {dotted}"), move |prior| {
        let Some(obj) = prior.object() else {
            return Err(CoreError::call(&format!("require {dotted}"), "no object read"));
        };
        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        match obj.field(&segments) {
            Some(value) if !value.is_null() => Ok(None),
            _ => Err(CoreError::MissingField {
                object: obj.key().to_string(),
                field: dotted.clone(),
            }),
        }
    })
}
