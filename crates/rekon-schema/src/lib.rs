//! Resource identity and object model for rekon.
//!
//! This crate defines the schema layer the engine is written against: identifier
//! newtypes (`Namespace`, `Name`, `ResourceVersion`, `Uid`), type coordinates
//! (`GroupVersionKind`, `ResourceType`), owner references, the schema-less
//! `DynamicObject`, the `Resource` capability trait every concrete schema
//! implements, and `ListFilter` for label-selected listing.

pub mod filter;
pub mod gvk;
pub mod object;
pub mod types;

pub use filter::ListFilter;
pub use gvk::{parse_api_version, GroupVersionKind, ResourceType};
pub use object::{validate_name, DynamicObject, ObjectKey, ObjectMeta, OwnerReference, Resource};
pub use types::{Name, Namespace, ResourceVersion, Uid};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid apiVersion '{0}'")]
    InvalidApiVersion(String),
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("invalid label selector term '{0}'")]
    InvalidSelector(String),
    #[error("invalid field path '{0}'")]
    InvalidPath(String),
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
