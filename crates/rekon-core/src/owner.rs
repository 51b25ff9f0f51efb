use crate::action::ActionKind;
use crate::CoreError;
use rekon_schema::{Namespace, ObjectKey, OwnerReference, Resource};
use rekon_store::{MappingError, ResourceStore, RestMapper};
use std::collections::BTreeSet;
use tracing::debug;

/// How far [`OwnerLookup::root_owner`] walks before giving up.
pub const DEFAULT_MAX_OWNER_DEPTH: usize = 8;

/// Resolves owner references to the objects they point at.
pub struct OwnerLookup<'a> {
    store: &'a dyn ResourceStore,
    mapper: &'a dyn RestMapper,
}

impl<'a> OwnerLookup<'a> {
    pub fn new(store: &'a dyn ResourceStore, mapper: &'a dyn RestMapper) -> Self {
        Self { store, mapper }
    }

    /// Fetch the object `reference` points at and return that object's own
    /// controller reference, or `None` if it has no controller.
    ///
    /// `namespace` is the dependent's namespace; it is ignored when the
    /// owner's type is cluster-scoped. A type the mapper cannot resolve
    /// fails before any store call is made.
    pub fn find_owner(
        &self,
        namespace: Option<&Namespace>,
        reference: &OwnerReference,
    ) -> Result<Option<OwnerReference>, CoreError> {
        let gvk = reference.gvk().map_err(MappingError::from)?;
        let rt = self.mapper.resolve_gvk(&gvk)?;
        let key = ObjectKey {
            namespace: if rt.namespaced {
                namespace.cloned()
            } else {
                None
            },
            name: reference.name.clone(),
        };
        debug!("looking up owner {} {key}", rt.kind);
        let owner = self
            .store
            .get(&rt, &key)
            .map_err(|e| CoreError::store(ActionKind::Get, &key, e))?;
        Ok(owner.controller().cloned())
    }

    /// Follow controller references from `obj` to the topmost controller.
    ///
    /// Returns `None` if `obj` has no controller. Fails if the chain loops
    /// or is longer than `max_depth`.
    pub fn root_owner(
        &self,
        obj: &impl Resource,
        max_depth: usize,
    ) -> Result<Option<OwnerReference>, CoreError> {
        let Some(mut current) = obj.controller().cloned() else {
            return Ok(None);
        };
        let origin = obj.key();
        let namespace = obj.meta().namespace.clone();
        let mut seen = BTreeSet::new();
        seen.insert((current.kind.clone(), current.name.clone()));

        for _ in 0..max_depth {
            match self.find_owner(namespace.as_ref(), &current)? {
                Some(next) => {
                    if !seen.insert((next.kind.clone(), next.name.clone())) {
                        return Err(CoreError::OwnerCycle(origin.to_string()));
                    }
                    current = next;
                }
                None => return Ok(Some(current)),
            }
        }
        Err(CoreError::OwnerDepthExceeded {
            object: origin.to_string(),
            depth: max_depth,
        })
    }
}
