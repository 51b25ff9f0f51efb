use crate::{DeleteOptions, PropagationPolicy, ResourceStore, StoreError, StoreOp};
use rekon_schema::{
    validate_name, DynamicObject, ListFilter, ObjectKey, Resource, ResourceType, ResourceVersion,
    Uid,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

type GroupKind = (String, String);
type Slot = (String, String, ObjectKey);

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<Slot, DynamicObject>,
    next_version: u64,
    calls: BTreeMap<StoreOp, usize>,
    faults: VecDeque<(StoreOp, StoreError)>,
    known_types: Option<BTreeSet<GroupKind>>,
}

impl MemoryState {
    fn stamp(&mut self, obj: &mut DynamicObject, gk: &GroupKind) {
        self.next_version += 1;
        obj.metadata.resource_version = Some(ResourceVersion::new(self.next_version.to_string()));
        if obj.metadata.uid.is_none() {
            let seed = format!("{}/{}/{}/{}", gk.0, gk.1, obj.key(), self.next_version);
            let hex = blake3::hash(seed.as_bytes()).to_hex();
            obj.metadata.uid = Some(Uid::new(&hex.as_str()[..32]));
        }
        if obj.metadata.creation_timestamp.is_none() {
            obj.metadata.creation_timestamp = Some(chrono::Utc::now().to_rfc3339());
        }
    }

    fn check_known(&self, gk: &GroupKind, kind: &str, key: &ObjectKey) -> Result<(), StoreError> {
        match &self.known_types {
            Some(known) if !known.contains(gk) => Err(StoreError::not_found(kind, key)),
            _ => Ok(()),
        }
    }

    /// Delete or orphan every object controlled (transitively) by `uid`.
    fn propagate(&mut self, uid: &Uid, policy: PropagationPolicy) {
        let mut pending = vec![uid.clone()];
        while let Some(owner_uid) = pending.pop() {
            let dependents: Vec<Slot> = self
                .objects
                .iter()
                .filter(|(_, o)| o.owner_references().iter().any(|r| r.uid == owner_uid))
                .map(|(slot, _)| slot.clone())
                .collect();
            for slot in dependents {
                if policy == PropagationPolicy::Orphan {
                    if let Some(obj) = self.objects.get_mut(&slot) {
                        obj.metadata.owner_references.retain(|r| r.uid != owner_uid);
                    }
                } else if let Some(removed) = self.objects.remove(&slot) {
                    debug!("memory store: cascade delete {} {}", slot.1, slot.2);
                    if let Some(dep_uid) = removed.metadata.uid {
                        pending.push(dep_uid);
                    }
                }
            }
        }
    }
}

/// In-process resource store with optimistic concurrency.
///
/// Every write bumps a store-wide version counter, and updates and guarded
/// deletes are rejected with `Conflict` when the caller's token is stale.
/// Calls are counted per operation and errors can be queued with
/// [`fail_next`](Self::fail_next), so it doubles as the store test double.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept the given types; every other type behaves as not installed.
    #[must_use]
    pub fn restrict_types<'a>(self, types: impl IntoIterator<Item = &'a ResourceType>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.known_types = Some(
                types
                    .into_iter()
                    .map(|rt| (rt.group.clone(), rt.kind.clone()))
                    .collect(),
            );
        }
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Internal(format!("mutex poisoned: {e}")))
    }

    /// Record the call and hand back an injected fault if one is queued for `op`.
    fn begin(&self, op: StoreOp) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let mut state = self.lock()?;
        *state.calls.entry(op).or_insert(0) += 1;
        if let Some(pos) = state.faults.iter().position(|(o, _)| *o == op) {
            if let Some((_, err)) = state.faults.remove(pos) {
                debug!("memory store: injected {op} failure: {err}");
                return Err(err);
            }
        }
        Ok(state)
    }

    /// Seed an object without counting a call. Version and uid are assigned.
    pub fn insert(&self, obj: DynamicObject) -> Result<DynamicObject, StoreError> {
        let gvk = obj.gvk()?;
        let gk = (gvk.group, gvk.kind);
        let mut state = self.lock()?;
        let mut obj = obj;
        state.stamp(&mut obj, &gk);
        state
            .objects
            .insert((gk.0, gk.1, obj.key()), obj.clone());
        Ok(obj)
    }

    /// Make the next `op` call fail with `err`. Faults queue up in order.
    pub fn fail_next(&self, op: StoreOp, err: StoreError) {
        if let Ok(mut state) = self.state.lock() {
            state.faults.push_back((op, err));
        }
    }

    /// Number of `op` calls made through the [`ResourceStore`] interface.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.state
            .lock()
            .map(|s| s.calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total number of calls across all operations.
    pub fn total_calls(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.calls.values().sum())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, rt: &ResourceType, key: &ObjectKey) -> Result<DynamicObject, StoreError> {
        let state = self.begin(StoreOp::Get)?;
        debug!("memory store: get {} {key}", rt.kind);
        let gk = (rt.group.clone(), rt.kind.clone());
        state.check_known(&gk, &rt.kind, key)?;
        state
            .objects
            .get(&(gk.0, gk.1, key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(&rt.kind, key))
    }

    fn list(
        &self,
        rt: &ResourceType,
        filter: &ListFilter,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let state = self.begin(StoreOp::List)?;
        debug!("memory store: list {} {:?}", rt.kind, filter.namespace);
        let gk = (rt.group.clone(), rt.kind.clone());
        if let Some(known) = &state.known_types {
            if !known.contains(&gk) {
                return Err(StoreError::NotFound {
                    kind: rt.kind.clone(),
                    key: String::from("*"),
                });
            }
        }
        Ok(state
            .objects
            .iter()
            .filter(|((g, k, _), o)| *g == gk.0 && *k == gk.1 && filter.matches(*o))
            .map(|(_, o)| o.clone())
            .collect())
    }

    fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let mut state = self.begin(StoreOp::Create)?;
        let gvk = obj.gvk()?;
        let key = obj.key();
        debug!("memory store: create {} {key}", gvk.kind);
        validate_name(&key.name)?;
        let gk = (gvk.group, gvk.kind);
        state.check_known(&gk, &gk.1, &key)?;
        let slot = (gk.0.clone(), gk.1.clone(), key.clone());
        if state.objects.contains_key(&slot) {
            return Err(StoreError::AlreadyExists {
                kind: gk.1,
                key: key.to_string(),
            });
        }
        let mut stored = obj.clone();
        stored.metadata.uid = None;
        stored.metadata.creation_timestamp = None;
        stored.metadata.deletion_timestamp = None;
        state.stamp(&mut stored, &gk);
        state.objects.insert(slot, stored.clone());
        Ok(stored)
    }

    fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let mut state = self.begin(StoreOp::Update)?;
        let gvk = obj.gvk()?;
        let key = obj.key();
        debug!("memory store: update {} {key}", gvk.kind);
        let slot = (gvk.group.clone(), gvk.kind.clone(), key.clone());
        let Some(current) = state.objects.get(&slot) else {
            return Err(StoreError::not_found(&gvk.kind, &key));
        };
        let Some(expected) = obj.resource_version() else {
            return Err(StoreError::Invalid(format!(
                "update of {} '{key}' requires metadata.resourceVersion",
                gvk.kind
            )));
        };
        if current.resource_version() != Some(expected) {
            return Err(StoreError::conflict(
                &key,
                format!(
                    "object has been modified (have {expected}, store has {})",
                    current
                        .resource_version()
                        .map_or("none", ResourceVersion::as_str)
                ),
            ));
        }
        let mut stored = obj.clone();
        stored.metadata.uid.clone_from(&current.metadata.uid);
        stored
            .metadata
            .creation_timestamp
            .clone_from(&current.metadata.creation_timestamp);
        state.stamp(&mut stored, &(gvk.group, gvk.kind));
        state.objects.insert(slot, stored.clone());
        Ok(stored)
    }

    fn delete(
        &self,
        rt: &ResourceType,
        key: &ObjectKey,
        options: &DeleteOptions,
    ) -> Result<(), StoreError> {
        let mut state = self.begin(StoreOp::Delete)?;
        debug!("memory store: delete {} {key}", rt.kind);
        let slot = (rt.group.clone(), rt.kind.clone(), key.clone());
        let Some(current) = state.objects.get(&slot) else {
            return Err(StoreError::not_found(&rt.kind, key));
        };
        if let Some(expected) = &options.precondition {
            if current.resource_version() != Some(expected) {
                return Err(StoreError::conflict(
                    key,
                    format!("precondition failed: expected version {expected}"),
                ));
            }
        }
        let removed = state.objects.remove(&slot);
        if let Some(uid) = removed.and_then(|o| o.metadata.uid) {
            let policy = options.propagation.unwrap_or(PropagationPolicy::Background);
            state.propagate(&uid, policy);
        }
        Ok(())
    }
}
