use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type coordinates of an object as declared in its `apiVersion` and `kind`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    /// API group; empty for the core group.
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_owned(),
            version: version.to_owned(),
            kind: kind.to_owned(),
        }
    }

    /// Split an `apiVersion` such as `apps/v1` or `v1` and pair it with `kind`.
    pub fn from_api_version(api_version: &str, kind: &str) -> Result<Self, SchemaError> {
        let (group, version) = parse_api_version(api_version)?;
        if kind.is_empty() {
            return Err(SchemaError::MissingField("kind".to_owned()));
        }
        Ok(Self::new(group, version, kind))
    }

    /// Render back to the `apiVersion` form.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Parse `group/version` or a bare `version` (core group).
pub fn parse_api_version(api_version: &str) -> Result<(&str, &str), SchemaError> {
    let invalid = || SchemaError::InvalidApiVersion(api_version.to_owned());
    match api_version.split_once('/') {
        Some((group, version)) => {
            if group.is_empty() || version.is_empty() || version.contains('/') {
                return Err(invalid());
            }
            Ok((group, version))
        }
        None if api_version.is_empty() => Err(invalid()),
        None => Ok(("", api_version)),
    }
}

/// Concrete resource type as resolved by discovery: what the store addresses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Lowercase plural resource name, e.g. `deployments`.
    pub plural: String,
    pub namespaced: bool,
}

impl ResourceType {
    /// A namespaced resource type.
    pub fn namespaced(group: &str, version: &str, kind: &str, plural: &str) -> Self {
        Self {
            group: group.to_owned(),
            version: version.to_owned(),
            kind: kind.to_owned(),
            plural: plural.to_owned(),
            namespaced: true,
        }
    }

    /// A cluster-scoped resource type.
    pub fn cluster(group: &str, version: &str, kind: &str, plural: &str) -> Self {
        Self {
            namespaced: false,
            ..Self::namespaced(group, version, kind, plural)
        }
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::new(&self.group, &self.version, &self.kind)
    }

    pub fn api_version(&self) -> String {
        self.gvk().api_version()
    }

    /// Whether an object of the given coordinates is stored under this type.
    /// Versions are not compared: the store keeps one copy per group/kind.
    pub fn matches(&self, gvk: &GroupVersionKind) -> bool {
        self.group == gvk.group && self.kind == gvk.kind
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.plural, self.version)
        } else {
            write!(f, "{}.{}/{}", self.plural, self.group, self.version)
        }
    }
}
