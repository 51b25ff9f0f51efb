//! Resource store port and backends for rekon.
//!
//! The engine never talks to a control plane directly: it goes through the
//! [`ResourceStore`] trait defined here. This crate also provides the
//! discovery mapping used to turn declared type coordinates into addressable
//! resource types ([`RestMapper`]), an in-process [`MemoryStore`] with
//! optimistic concurrency and fault injection, a blocking [`HttpStore`] client,
//! and the [`StoreConfig`] used to select between them.

pub mod config;
pub mod discovery;
pub mod http;
pub mod memory;

pub use config::{open_store, StoreConfig};
pub use discovery::{MappingError, RestMapper, StaticMapper};
pub use http::HttpStore;
pub use memory::MemoryStore;

use rekon_schema::{DynamicObject, ListFilter, ObjectKey, Resource, ResourceType, ResourceVersion};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Protocol version sent as `X-Rekon-Protocol` header on all HTTP requests.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: String, key: String },
    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: String, key: String },
    #[error("conflict on '{key}': {reason}")]
    Conflict { key: String, reason: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("internal store error: {0}")]
    Internal(String),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("schema error: {0}")]
    Schema(#[from] rekon_schema::SchemaError),
}

impl StoreError {
    pub fn not_found(kind: &str, key: &ObjectKey) -> Self {
        Self::NotFound {
            kind: kind.to_owned(),
            key: key.to_string(),
        }
    }

    pub fn conflict(key: &ObjectKey, reason: impl Into<String>) -> Self {
        Self::Conflict {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// The five store operations, used for logging, call accounting, and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOp::Get => write!(f, "get"),
            StoreOp::List => write!(f, "list"),
            StoreOp::Create => write!(f, "create"),
            StoreOp::Update => write!(f, "update"),
            StoreOp::Delete => write!(f, "delete"),
        }
    }
}

/// What happens to dependents of a deleted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropagationPolicy {
    /// Dependents are deleted before the owner.
    Foreground,
    /// The owner is deleted and dependents are collected afterwards.
    Background,
    /// Dependents are kept and their owner reference is removed.
    Orphan,
}

impl fmt::Display for PropagationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropagationPolicy::Foreground => write!(f, "Foreground"),
            PropagationPolicy::Background => write!(f, "Background"),
            PropagationPolicy::Orphan => write!(f, "Orphan"),
        }
    }
}

impl FromStr for PropagationPolicy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Foreground" => Ok(Self::Foreground),
            "Background" => Ok(Self::Background),
            "Orphan" => Ok(Self::Orphan),
            other => Err(StoreError::Invalid(format!(
                "unknown propagation policy '{other}'"
            ))),
        }
    }
}

/// Options attached to a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// Only delete if the stored object still carries this version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precondition: Option<ResourceVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagation: Option<PropagationPolicy>,
}

impl DeleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard the delete with the version token of a previously read object.
    #[must_use]
    pub fn with_object(mut self, obj: &impl Resource) -> Self {
        self.precondition = obj.resource_version().cloned();
        self
    }

    #[must_use]
    pub fn with_propagation(mut self, policy: PropagationPolicy) -> Self {
        self.propagation = Some(policy);
        self
    }
}

/// The capability the engine consumes to read and write resources.
///
/// Implementations are blocking. Writes are checked against the version
/// token carried in `metadata.resourceVersion`.
pub trait ResourceStore: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, rt: &ResourceType, key: &ObjectKey) -> Result<DynamicObject, StoreError>;

    fn list(&self, rt: &ResourceType, filter: &ListFilter)
        -> Result<Vec<DynamicObject>, StoreError>;

    /// Create a new object. Returns the stored copy with its assigned version.
    fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    /// Replace an existing object. Fails with `Conflict` if the version token is stale.
    fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    fn delete(
        &self,
        rt: &ResourceType,
        key: &ObjectKey,
        options: &DeleteOptions,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekon_schema::GroupVersionKind;

    #[test]
    fn store_error_predicates() {
        let key = ObjectKey::namespaced("ns", "a");
        assert!(StoreError::not_found("Secret", &key).is_not_found());
        assert!(!StoreError::not_found("Secret", &key).is_conflict());
        assert!(StoreError::conflict(&key, "stale").is_conflict());
        assert!(!StoreError::Http("boom".to_owned()).is_not_found());
    }

    #[test]
    fn store_error_display_not_found() {
        let e = StoreError::not_found("Secret", &ObjectKey::namespaced("ns", "a"));
        assert_eq!(e.to_string(), "Secret 'ns/a' not found");
    }

    #[test]
    fn propagation_policy_parse() {
        for p in [
            PropagationPolicy::Foreground,
            PropagationPolicy::Background,
            PropagationPolicy::Orphan,
        ] {
            assert_eq!(p.to_string().parse::<PropagationPolicy>().unwrap(), p);
        }
        assert!("Cascade".parse::<PropagationPolicy>().is_err());
    }

    #[test]
    fn delete_options_with_object_takes_version() {
        let mut obj = DynamicObject::new(
            &GroupVersionKind::new("", "v1", "Secret"),
            &ObjectKey::namespaced("ns", "a"),
        );
        obj.metadata.resource_version = Some(ResourceVersion::new("9"));
        let opts = DeleteOptions::new()
            .with_object(&obj)
            .with_propagation(PropagationPolicy::Orphan);
        assert_eq!(opts.precondition.unwrap(), "9");
        assert_eq!(opts.propagation, Some(PropagationPolicy::Orphan));
    }
}
