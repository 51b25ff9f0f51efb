use crate::object::Resource;
use crate::types::Namespace;
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Restricts a List to one namespace (or all) and an equality label selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    /// `None` lists across every namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Namespace>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ListFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_namespace(namespace: &str) -> Self {
        Self {
            namespace: Some(Namespace::new(namespace)),
            labels: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn matches(&self, obj: &impl Resource) -> bool {
        let meta = obj.meta();
        if let Some(ns) = &self.namespace {
            if meta.namespace.as_ref() != Some(ns) {
                return false;
            }
        }
        self.labels
            .iter()
            .all(|(k, v)| meta.labels.get(k) == Some(v))
    }

    /// Render the label selector as `k=v,k2=v2` (sorted by key).
    pub fn label_selector(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse a `k=v,k2=v2` selector; the empty string selects everything.
    pub fn parse_label_selector(selector: &str) -> Result<BTreeMap<String, String>, SchemaError> {
        selector
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(|term| match term.split_once('=') {
                Some((k, v)) if !k.is_empty() => Ok((k.to_owned(), v.to_owned())),
                _ => Err(SchemaError::InvalidSelector(term.to_owned())),
            })
            .collect()
    }
}
