use crate::{
    DeleteOptions, ResourceStore, StoreConfig, StoreError, StoreOp, PROTOCOL_VERSION,
};
use rekon_schema::{DynamicObject, ListFilter, ObjectKey, Resource, ResourceType};
use std::io::Read;

/// Path segment standing in for the core (empty) API group.
pub const CORE_GROUP: &str = "core";
/// Namespace segment for cluster-scoped objects.
pub const NO_NAMESPACE: &str = "_";
/// Namespace segment for listing across every namespace.
pub const ALL_NAMESPACES: &str = "*";

/// Collection path for one type in one namespace segment.
pub fn collection_path(group: &str, version: &str, kind: &str, namespace: &str) -> String {
    let group = if group.is_empty() { CORE_GROUP } else { group };
    format!("/resources/{group}/{version}/{kind}/{namespace}")
}

/// Path of one named object.
pub fn object_path(group: &str, version: &str, kind: &str, key: &ObjectKey) -> String {
    format!(
        "{}/{}",
        collection_path(group, version, kind, key.namespace_str().unwrap_or(NO_NAMESPACE)),
        key.name
    )
}

/// Blocking HTTP resource store.
///
/// Expects a simple REST API:
/// - `GET    /resources/{group}/{version}/{kind}/{ns}/{name}`: read one object
/// - `GET    /resources/{group}/{version}/{kind}/{ns}?labels=k=v`: list (`*` = all namespaces)
/// - `POST   /resources/{group}/{version}/{kind}/{ns}`: create
/// - `PUT    /resources/{group}/{version}/{kind}/{ns}/{name}`: update (409 on stale version)
/// - `DELETE /resources/{group}/{version}/{kind}/{ns}/{name}?precondition=V&propagation=P`
///
/// The core group is spelled `core`, cluster scope `_`.
pub struct HttpStore {
    config: StoreConfig,
    agent: ureq::Agent,
}

impl HttpStore {
    pub fn new(config: StoreConfig) -> Self {
        // Error statuses come back as responses so their bodies can be read.
        let agent = ureq::Agent::new_with_config(
            ureq::Agent::config_builder()
                .http_status_as_error(false)
                .build(),
        );
        Self { config, agent }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.url)
    }

    fn with_headers<B>(&self, req: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let req = req.header("X-Rekon-Protocol", &PROTOCOL_VERSION.to_string());
        match self.config.auth_token {
            Some(ref token) => req.header("Authorization", &format!("Bearer {token}")),
            None => req,
        }
    }

    /// Turn a ureq outcome into the response body, mapping status codes onto the store taxonomy.
    fn read(
        op: StoreOp,
        kind: &str,
        key: &str,
        result: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    ) -> Result<Vec<u8>, StoreError> {
        let resp = match result {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(code)) => {
                return Err(status_error(op, code, kind, key, ""));
            }
            Err(e) => return Err(StoreError::Http(e.to_string())),
        };
        let code = resp.status().as_u16();
        let mut reader = resp.into_body().into_reader();
        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;
        if code >= 400 {
            let detail = String::from_utf8_lossy(&body);
            return Err(status_error(op, code, kind, key, detail.trim()));
        }
        Ok(body)
    }
}

/// Map an error status onto the store taxonomy. `detail` is the server's
/// error body and may be empty.
fn status_error(op: StoreOp, code: u16, kind: &str, key: &str, detail: &str) -> StoreError {
    let message = if detail.is_empty() {
        format!("HTTP {code} for {op} {kind} '{key}'")
    } else {
        format!("HTTP {code} for {op} {kind} '{key}': {detail}")
    };
    match code {
        404 => StoreError::NotFound {
            kind: kind.to_owned(),
            key: key.to_owned(),
        },
        409 if op == StoreOp::Create => StoreError::AlreadyExists {
            kind: kind.to_owned(),
            key: key.to_owned(),
        },
        409 => StoreError::Conflict {
            key: key.to_owned(),
            reason: if detail.is_empty() {
                format!("{op} rejected by store (HTTP 409)")
            } else {
                detail.to_owned()
            },
        },
        401 | 403 => StoreError::Unauthorized(message),
        400 | 422 => StoreError::Invalid(message),
        _ => StoreError::Http(message),
    }
}

impl ResourceStore for HttpStore {
    fn name(&self) -> &'static str {
        "http"
    }

    fn get(&self, rt: &ResourceType, key: &ObjectKey) -> Result<DynamicObject, StoreError> {
        let url = self.url(&object_path(&rt.group, &rt.version, &rt.kind, key));
        tracing::debug!("GET {url}");
        let result = self.with_headers(self.agent.get(&url)).call();
        let body = Self::read(StoreOp::Get, &rt.kind, &key.to_string(), result)?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn list(
        &self,
        rt: &ResourceType,
        filter: &ListFilter,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let namespace = filter.namespace.as_deref().unwrap_or(ALL_NAMESPACES);
        let url = self.url(&collection_path(&rt.group, &rt.version, &rt.kind, namespace));
        tracing::debug!("GET {url} labels={}", filter.label_selector());
        let mut req = self.with_headers(self.agent.get(&url));
        if !filter.labels.is_empty() {
            req = req.query("labels", filter.label_selector());
        }
        let body = Self::read(StoreOp::List, &rt.kind, namespace, req.call())?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let gvk = obj.gvk()?;
        let key = obj.key();
        let namespace = key.namespace_str().unwrap_or(NO_NAMESPACE);
        let url = self.url(&collection_path(&gvk.group, &gvk.version, &gvk.kind, namespace));
        let payload = serde_json::to_vec(obj)?;
        tracing::debug!("POST {url} ({} bytes)", payload.len());
        let result = self
            .with_headers(self.agent.post(&url))
            .header("Content-Type", "application/json")
            .send(&payload[..]);
        let body = Self::read(StoreOp::Create, &gvk.kind, &key.to_string(), result)?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let gvk = obj.gvk()?;
        let key = obj.key();
        let url = self.url(&object_path(&gvk.group, &gvk.version, &gvk.kind, &key));
        let payload = serde_json::to_vec(obj)?;
        tracing::debug!("PUT {url} ({} bytes)", payload.len());
        let result = self
            .with_headers(self.agent.put(&url))
            .header("Content-Type", "application/json")
            .send(&payload[..]);
        let body = Self::read(StoreOp::Update, &gvk.kind, &key.to_string(), result)?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn delete(
        &self,
        rt: &ResourceType,
        key: &ObjectKey,
        options: &DeleteOptions,
    ) -> Result<(), StoreError> {
        let url = self.url(&object_path(&rt.group, &rt.version, &rt.kind, key));
        tracing::debug!("DELETE {url}");
        let mut req = self.with_headers(self.agent.delete(&url));
        if let Some(ref version) = options.precondition {
            req = req.query("precondition", version.as_str());
        }
        if let Some(policy) = options.propagation {
            req = req.query("propagation", policy.to_string());
        }
        Self::read(StoreOp::Delete, &rt.kind, &key.to_string(), req.call())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_group_path() {
        let key = ObjectKey::namespaced("openshift-config", "pull-secret");
        assert_eq!(
            object_path("", "v1", "Secret", &key),
            "/resources/core/v1/Secret/openshift-config/pull-secret"
        );
    }

    #[test]
    fn cluster_scoped_path() {
        let key = ObjectKey::cluster("version");
        assert_eq!(
            object_path("config.openshift.io", "v1", "ClusterVersion", &key),
            "/resources/config.openshift.io/v1/ClusterVersion/_/version"
        );
    }

    #[test]
    fn status_codes_map_to_taxonomy() {
        assert!(status_error(StoreOp::Get, 404, "Secret", "a", "").is_not_found());
        assert!(status_error(StoreOp::Update, 409, "Secret", "a", "").is_conflict());
        assert!(matches!(
            status_error(StoreOp::Create, 409, "Secret", "a", ""),
            StoreError::AlreadyExists { .. }
        ));
        assert!(matches!(
            status_error(StoreOp::Get, 403, "Secret", "a", ""),
            StoreError::Unauthorized(_)
        ));
        assert!(matches!(
            status_error(StoreOp::Get, 500, "Secret", "a", ""),
            StoreError::Http(_)
        ));
    }

    #[test]
    fn status_errors_carry_server_detail() {
        let err = status_error(
            StoreOp::Update,
            409,
            "Secret",
            "ns/a",
            "object has been modified",
        );
        assert!(matches!(
            &err,
            StoreError::Conflict { reason, .. } if reason == "object has been modified"
        ));

        let err = status_error(StoreOp::Create, 400, "Secret", "ns/a", "missing apiVersion");
        assert_eq!(
            err.to_string(),
            "invalid request: HTTP 400 for create Secret 'ns/a': missing apiVersion"
        );

        let err = status_error(StoreOp::Update, 409, "Secret", "ns/a", "");
        assert!(err.to_string().contains("rejected by store (HTTP 409)"));
    }

    #[test]
    fn unreachable_server_is_http_error() {
        let store = HttpStore::new(StoreConfig::http("http://127.0.0.1:1"));
        let rt = ResourceType::namespaced("", "v1", "Secret", "secrets");
        let err = store
            .get(&rt, &ObjectKey::namespaced("ns", "a"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Http(_)));
    }
}
