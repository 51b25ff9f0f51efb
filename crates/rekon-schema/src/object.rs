use crate::gvk::GroupVersionKind;
use crate::types::{Name, Namespace, ResourceVersion, Uid};
use crate::SchemaError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Namespaced name of an object. Cluster-scoped objects have no namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Namespace>,
    pub name: Name,
}

impl ObjectKey {
    pub fn namespaced(namespace: &str, name: &str) -> Self {
        Self {
            namespace: Some(Namespace::new(namespace)),
            name: Name::new(name),
        }
    }

    pub fn cluster(name: &str) -> Self {
        Self {
            namespace: None,
            name: Name::new(name),
        }
    }

    /// Parse `namespace/name` or a bare `name`.
    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        let key = match s.split_once('/') {
            Some((ns, name)) => Self::namespaced(ns, name),
            None => Self::cluster(s),
        };
        if let Some(ns) = &key.namespace {
            validate_name(ns)?;
        }
        validate_name(&key.name)?;
        Ok(key)
    }

    pub fn namespace_str(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Reference from a dependent object to the object that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: Name,
    #[serde(default)]
    pub uid: Uid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

impl OwnerReference {
    /// Build a controller reference pointing at `owner`.
    pub fn controller_for(owner: &impl Resource) -> Result<Self, SchemaError> {
        let gvk = owner.gvk()?;
        let meta = owner.meta();
        Ok(Self {
            api_version: gvk.api_version(),
            kind: gvk.kind,
            name: meta.name.clone(),
            uid: meta.uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        })
    }

    pub fn is_controller(&self) -> bool {
        self.controller == Some(true)
    }

    pub fn gvk(&self) -> Result<GroupVersionKind, SchemaError> {
        GroupVersionKind::from_api_version(&self.api_version, &self.kind)
    }
}

/// Standard object metadata shared by every resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: Name,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Namespace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<ResourceVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<String>,
}

/// The capability set the engine needs from any object it handles:
/// type coordinates, identity, version token, and owner references.
///
/// Concrete schemas implement this and convert through [`DynamicObject`]
/// at the store boundary.
pub trait Resource {
    fn gvk(&self) -> Result<GroupVersionKind, SchemaError>;

    fn meta(&self) -> &ObjectMeta;

    fn key(&self) -> ObjectKey {
        let meta = self.meta();
        ObjectKey {
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
        }
    }

    fn resource_version(&self) -> Option<&ResourceVersion> {
        self.meta().resource_version.as_ref()
    }

    fn owner_references(&self) -> &[OwnerReference] {
        &self.meta().owner_references
    }

    /// The owner reference flagged as controller, if any.
    fn controller(&self) -> Option<&OwnerReference> {
        self.owner_references().iter().find(|o| o.is_controller())
    }
}

/// Schema-less object: typed envelope plus arbitrary JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicObject {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Every top-level field other than the envelope (`spec`, `status`, `data`, ...).
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl DynamicObject {
    pub fn new(gvk: &GroupVersionKind, key: &ObjectKey) -> Self {
        Self {
            api_version: gvk.api_version(),
            kind: gvk.kind.clone(),
            metadata: ObjectMeta {
                name: key.name.clone(),
                namespace: key.namespace.clone(),
                ..ObjectMeta::default()
            },
            body: Map::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.body.insert(name.to_owned(), value);
        self
    }

    #[must_use]
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.metadata.labels.insert(key.to_owned(), value.to_owned());
        self
    }

    #[must_use]
    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.metadata.owner_references.push(owner);
        self
    }

    /// Convert a typed resource into its dynamic form.
    pub fn from_resource<T: Serialize>(resource: &T) -> Result<Self, SchemaError> {
        let value = serde_json::to_value(resource)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Convert back into a typed resource.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, SchemaError> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Look up a nested body field by path, e.g. `["data", ".dockerconfigjson"]`.
    pub fn field(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.body.get(*first)?;
        for segment in rest {
            current = current.as_object()?.get(*segment)?;
        }
        Some(current)
    }

    /// Like [`field`](Self::field) but requires a string value.
    pub fn str_field(&self, path: &[&str]) -> Option<&str> {
        self.field(path).and_then(Value::as_str)
    }

    /// Set a nested body field, creating intermediate objects.
    pub fn set_field(&mut self, path: &[&str], value: Value) -> Result<(), SchemaError> {
        let Some((last, parents)) = path.split_last() else {
            return Err(SchemaError::InvalidPath(String::new()));
        };
        let mut current = &mut self.body;
        for segment in parents {
            let entry = current
                .entry((*segment).to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            current = entry
                .as_object_mut()
                .ok_or_else(|| SchemaError::InvalidPath(path.join(".")))?;
        }
        current.insert((*last).to_owned(), value);
        Ok(())
    }
}

impl Resource for DynamicObject {
    fn gvk(&self) -> Result<GroupVersionKind, SchemaError> {
        GroupVersionKind::from_api_version(&self.api_version, &self.kind)
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
}

/// Validate an object or namespace name as a DNS-1123 subdomain.
pub fn validate_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.len() > 253 {
        return Err(SchemaError::InvalidName(
            "name must be 1-253 characters".to_owned(),
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return Err(SchemaError::InvalidName(format!(
            "'{name}' must match [a-z0-9.-]"
        )));
    }
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let bytes = name.as_bytes();
    if !bytes.first().copied().is_some_and(alnum) || !bytes.last().copied().is_some_and(alnum) {
        return Err(SchemaError::InvalidName(format!(
            "'{name}' must start and end with an alphanumeric character"
        )));
    }
    Ok(())
}
