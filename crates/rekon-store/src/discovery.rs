use rekon_schema::{GroupVersionKind, ResourceType, SchemaError};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("no resource type registered for group '{group}', kind '{kind}', version '{version}'")]
    NoMatch {
        group: String,
        kind: String,
        version: String,
    },
    #[error("invalid type coordinates: {0}")]
    Schema(#[from] SchemaError),
}

/// Discovery: maps declared type coordinates to the resource type the store addresses.
pub trait RestMapper: Send + Sync {
    /// Resolve `group`/`kind` at `version`. An empty version picks the preferred one.
    fn resolve(&self, group: &str, kind: &str, version: &str) -> Result<ResourceType, MappingError>;

    fn resolve_gvk(&self, gvk: &GroupVersionKind) -> Result<ResourceType, MappingError> {
        self.resolve(&gvk.group, &gvk.kind, &gvk.version)
    }
}

/// A fixed table of resource types. The first version registered for a
/// group/kind is the preferred one.
#[derive(Debug, Clone, Default)]
pub struct StaticMapper {
    types: BTreeMap<(String, String), Vec<ResourceType>>,
}

impl StaticMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mapper preloaded with the core and workload types.
    pub fn with_builtin_types() -> Self {
        let mut mapper = Self::new();
        for rt in [
            ResourceType::namespaced("", "v1", "Secret", "secrets"),
            ResourceType::namespaced("", "v1", "ConfigMap", "configmaps"),
            ResourceType::namespaced("", "v1", "Service", "services"),
            ResourceType::namespaced("", "v1", "Pod", "pods"),
            ResourceType::namespaced("", "v1", "ServiceAccount", "serviceaccounts"),
            ResourceType::cluster("", "v1", "Namespace", "namespaces"),
            ResourceType::namespaced("apps", "v1", "Deployment", "deployments"),
            ResourceType::namespaced("apps", "v1", "ReplicaSet", "replicasets"),
            ResourceType::namespaced("apps", "v1", "StatefulSet", "statefulsets"),
            ResourceType::namespaced("batch", "v1", "Job", "jobs"),
        ] {
            mapper.register(rt);
        }
        mapper
    }

    pub fn register(&mut self, rt: ResourceType) {
        let versions = self
            .types
            .entry((rt.group.clone(), rt.kind.clone()))
            .or_default();
        if !versions.iter().any(|v| v.version == rt.version) {
            versions.push(rt);
        }
    }

    #[must_use]
    pub fn with(mut self, rt: ResourceType) -> Self {
        self.register(rt);
        self
    }

    pub fn len(&self) -> usize {
        self.types.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl RestMapper for StaticMapper {
    fn resolve(&self, group: &str, kind: &str, version: &str) -> Result<ResourceType, MappingError> {
        let no_match = || MappingError::NoMatch {
            group: group.to_owned(),
            kind: kind.to_owned(),
            version: version.to_owned(),
        };
        let versions = self
            .types
            .get(&(group.to_owned(), kind.to_owned()))
            .ok_or_else(no_match)?;
        let found = if version.is_empty() {
            versions.first()
        } else {
            versions.iter().find(|rt| rt.version == version)
        };
        found.cloned().ok_or_else(no_match)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_types_resolve() {
        let mapper = StaticMapper::with_builtin_types();
        let rt = mapper.resolve("apps", "Deployment", "v1").unwrap();
        assert_eq!(rt.plural, "deployments");
        assert!(rt.namespaced);

        let ns = mapper.resolve("", "Namespace", "v1").unwrap();
        assert!(!ns.namespaced);
    }

    #[test]
    fn unknown_kind_fails() {
        let mapper = StaticMapper::with_builtin_types();
        let err = mapper.resolve("apps", "Widget", "v1").unwrap_err();
        assert!(matches!(err, MappingError::NoMatch { .. }));
        assert!(err.to_string().contains("Widget"));
    }

    #[test]
    fn unknown_version_fails() {
        let mapper = StaticMapper::with_builtin_types();
        assert!(mapper.resolve("apps", "Deployment", "v1beta2").is_err());
    }

    #[test]
    fn empty_version_picks_first_registered() {
        let mapper = StaticMapper::new()
            .with(ResourceType::namespaced("x.io", "v2", "Thing", "things"))
            .with(ResourceType::namespaced("x.io", "v1", "Thing", "things"));
        assert_eq!(mapper.resolve("x.io", "Thing", "").unwrap().version, "v2");
        assert_eq!(mapper.len(), 2);
    }

    #[test]
    fn register_is_idempotent_per_version() {
        let mut mapper = StaticMapper::new();
        mapper.register(ResourceType::namespaced("", "v1", "Secret", "secrets"));
        mapper.register(ResourceType::namespaced("", "v1", "Secret", "secrets"));
        assert_eq!(mapper.len(), 1);
    }

    #[test]
    fn resolve_gvk_uses_coordinates() {
        let mapper = StaticMapper::with_builtin_types();
        let gvk = GroupVersionKind::from_api_version("batch/v1", "Job").unwrap();
        assert_eq!(mapper.resolve_gvk(&gvk).unwrap().plural, "jobs");
    }
}
