//! Reference HTTP server for the rekon store protocol v1.
//!
//! Serves any [`ResourceStore`] (normally a [`MemoryStore`]) over the REST
//! layout the `HttpStore` client speaks:
//!
//! - `GET    /resources/{group}/{version}/{kind}/{ns}/{name}`
//! - `GET    /resources/{group}/{version}/{kind}/{ns}?labels=k=v` (`*` lists every namespace)
//! - `POST   /resources/{group}/{version}/{kind}/{ns}`
//! - `PUT    /resources/{group}/{version}/{kind}/{ns}/{name}`
//! - `DELETE /resources/{group}/{version}/{kind}/{ns}/{name}?precondition=V&propagation=P`
//! - `GET    /health`
//!
//! The [`TestServer`] helper starts a server on a random port for integration testing.

use percent_encoding::percent_decode_str;
use rekon_schema::{
    DynamicObject, ListFilter, Name, Namespace, ObjectKey, Resource, ResourceType,
    ResourceVersion,
};
use rekon_store::http::{ALL_NAMESPACES, CORE_GROUP, NO_NAMESPACE};
use rekon_store::{
    DeleteOptions, MemoryStore, PropagationPolicy, ResourceStore, StoreError, PROTOCOL_VERSION,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
    #[error("failed to load seed objects: {0}")]
    Seed(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A parsed `/resources/...` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Raw namespace segment: a namespace, `_` or `*`.
    pub namespace: String,
    pub name: Option<String>,
}

impl Route {
    pub fn resource_type(&self) -> ResourceType {
        ResourceType {
            group: self.group.clone(),
            version: self.version.clone(),
            kind: self.kind.clone(),
            plural: self.kind.to_lowercase(),
            namespaced: self.namespace != NO_NAMESPACE,
        }
    }

    fn namespace(&self) -> Option<Namespace> {
        match self.namespace.as_str() {
            NO_NAMESPACE | ALL_NAMESPACES => None,
            ns => Some(Namespace::new(ns)),
        }
    }

    fn key(&self, name: &str) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace(),
            name: Name::new(name),
        }
    }
}

/// Parse `/resources/{group}/{version}/{kind}/{ns}[/{name}]`.
pub fn parse_route(path: &str) -> Option<Route> {
    let rest = path.strip_prefix("/resources/")?;
    let segments: Vec<String> = rest
        .split('/')
        .map(|seg| percent_decode_str(seg).decode_utf8_lossy().into_owned())
        .collect();
    let (group, version, kind, namespace, name) = match segments.as_slice() {
        [g, v, k, ns] => (g, v, k, ns, None),
        [g, v, k, ns, name] if !name.is_empty() => (g, v, k, ns, Some(name.clone())),
        _ => return None,
    };
    if [group, version, kind, namespace].iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(Route {
        group: if group == CORE_GROUP {
            String::new()
        } else {
            group.clone()
        },
        version: version.clone(),
        kind: kind.clone(),
        namespace: namespace.clone(),
        name,
    })
}

/// Split `path?query` into the path and its form-decoded query pairs.
pub fn split_query(url: &str) -> (&str, Vec<(String, String)>) {
    let Some((path, query)) = url.split_once('?') else {
        return (url, Vec::new());
    };
    let pairs = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    (path, pairs)
}

fn query_value<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// HTTP status for a store failure.
pub fn status_for(err: &StoreError) -> u16 {
    match err {
        StoreError::NotFound { .. } => 404,
        StoreError::AlreadyExists { .. } | StoreError::Conflict { .. } => 409,
        StoreError::Unauthorized(_) => 403,
        StoreError::Invalid(_) | StoreError::Schema(_) | StoreError::Serialization(_) => 400,
        StoreError::Http(_) | StoreError::Internal(_) | StoreError::Io(_) => 500,
    }
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn respond(req: tiny_http::Request, code: u16, body: Vec<u8>, json: bool) {
    let mut resp = Response::from_data(body).with_status_code(StatusCode(code));
    if json {
        if let Some(h) = header("Content-Type", "application/json") {
            resp = resp.with_header(h);
        }
    }
    if let Err(e) = req.respond(resp) {
        debug!("failed to send response: {e}");
    }
}

fn respond_err(req: tiny_http::Request, code: u16, msg: &str) {
    respond(req, code, msg.as_bytes().to_vec(), false);
}

fn respond_json<T: serde::Serialize>(req: tiny_http::Request, code: u16, value: &T) {
    match serde_json::to_vec(value) {
        Ok(body) => respond(req, code, body, true),
        Err(e) => {
            error!("failed to encode response: {e}");
            respond_err(req, 500, "encode error");
        }
    }
}

fn respond_store_err(req: tiny_http::Request, err: &StoreError) {
    let code = status_for(err);
    if code >= 500 {
        error!("{err}");
    } else {
        debug!("{err}");
    }
    respond_err(req, code, &err.to_string());
}

fn read_object(req: &mut tiny_http::Request) -> Result<DynamicObject, StoreError> {
    let mut body = Vec::new();
    req.as_reader().read_to_end(&mut body)?;
    serde_json::from_slice(&body).map_err(|e| StoreError::Invalid(format!("bad object body: {e}")))
}

/// Routes protocol requests to a resource store.
pub struct Service {
    store: Arc<dyn ResourceStore>,
    token: Option<String>,
}

impl Service {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store, token: None }
    }

    /// Require `Authorization: Bearer <token>` on every resource request.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn header_value(req: &tiny_http::Request, name: &'static str) -> Option<String> {
        req.headers()
            .iter()
            .find(|h| h.field.equiv(name))
            .map(|h| h.value.as_str().to_owned())
    }

    /// Reject wrong protocol versions and missing credentials.
    fn admit(&self, req: &tiny_http::Request) -> Result<(), (u16, String)> {
        if let Some(version) = Self::header_value(req, "X-Rekon-Protocol") {
            if version.trim() != PROTOCOL_VERSION.to_string() {
                return Err((400, format!("unsupported protocol version '{version}'")));
            }
        }
        if let Some(ref token) = self.token {
            let expected = format!("Bearer {token}");
            if Self::header_value(req, "Authorization").as_deref() != Some(expected.as_str()) {
                return Err((401, "missing or invalid bearer token".to_owned()));
            }
        }
        Ok(())
    }

    /// Handle a single HTTP request.
    pub fn handle(&self, req: tiny_http::Request) {
        let method = req.method().clone();
        let url = req.url().to_owned();
        debug!("{method} {url}");
        let (path, query) = split_query(&url);

        if path == "/health" && method == Method::Get {
            respond(req, 200, br#"{"status":"ok"}"#.to_vec(), true);
            return;
        }
        let Some(route) = parse_route(path) else {
            respond_err(req, 404, "not found");
            return;
        };
        if let Err((code, msg)) = self.admit(&req) {
            warn!("{method} {path}: {msg}");
            respond_err(req, code, &msg);
            return;
        }

        match (&method, route.name.clone()) {
            (Method::Get, Some(name)) => self.get(req, &route, &name),
            (Method::Get, None) => self.list(req, &route, &query),
            (Method::Post, None) => self.create(req, &route),
            (Method::Put, Some(name)) => self.update(req, &route, &name),
            (Method::Delete, Some(name)) => self.delete(req, &route, &name, &query),
            _ => respond_err(req, 405, "method not allowed"),
        }
    }

    fn get(&self, req: tiny_http::Request, route: &Route, name: &str) {
        match self.store.get(&route.resource_type(), &route.key(name)) {
            Ok(obj) => respond_json(req, 200, &obj),
            Err(e) => respond_store_err(req, &e),
        }
    }

    fn list(&self, req: tiny_http::Request, route: &Route, query: &[(String, String)]) {
        let labels = match query_value(query, "labels") {
            Some(selector) => match ListFilter::parse_label_selector(selector) {
                Ok(labels) => labels,
                Err(e) => {
                    respond_err(req, 400, &e.to_string());
                    return;
                }
            },
            None => Default::default(),
        };
        let filter = ListFilter {
            namespace: route.namespace(),
            labels,
        };
        match self.store.list(&route.resource_type(), &filter) {
            Ok(items) => respond_json(req, 200, &items),
            Err(e) => respond_store_err(req, &e),
        }
    }

    fn create(&self, mut req: tiny_http::Request, route: &Route) {
        let obj = match read_object(&mut req) {
            Ok(obj) => obj,
            Err(e) => return respond_store_err(req, &e),
        };
        if let Err(msg) = check_body(route, &obj) {
            return respond_err(req, 400, &msg);
        }
        match self.store.create(&obj) {
            Ok(stored) => {
                info!("created {} {}", stored.kind, stored.key());
                respond_json(req, 201, &stored);
            }
            Err(e) => respond_store_err(req, &e),
        }
    }

    fn update(&self, mut req: tiny_http::Request, route: &Route, name: &str) {
        let obj = match read_object(&mut req) {
            Ok(obj) => obj,
            Err(e) => return respond_store_err(req, &e),
        };
        if let Err(msg) = check_body(route, &obj) {
            return respond_err(req, 400, &msg);
        }
        if obj.metadata.name.as_str() != name {
            return respond_err(
                req,
                400,
                &format!("body names '{}', path names '{name}'", obj.metadata.name),
            );
        }
        match self.store.update(&obj) {
            Ok(stored) => {
                info!("updated {} {}", stored.kind, stored.key());
                respond_json(req, 200, &stored);
            }
            Err(e) => respond_store_err(req, &e),
        }
    }

    fn delete(
        &self,
        req: tiny_http::Request,
        route: &Route,
        name: &str,
        query: &[(String, String)],
    ) {
        let mut options = DeleteOptions::new();
        options.precondition = query_value(query, "precondition").map(ResourceVersion::new);
        if let Some(policy) = query_value(query, "propagation") {
            match policy.parse::<PropagationPolicy>() {
                Ok(policy) => options.propagation = Some(policy),
                Err(e) => return respond_store_err(req, &e),
            }
        }
        let key = route.key(name);
        match self.store.delete(&route.resource_type(), &key, &options) {
            Ok(()) => {
                info!("deleted {} {key}", route.kind);
                respond(req, 200, b"{}".to_vec(), true);
            }
            Err(e) => respond_store_err(req, &e),
        }
    }
}

/// The body must describe the type and namespace the path addresses.
fn check_body(route: &Route, obj: &DynamicObject) -> Result<(), String> {
    let gvk = obj.gvk().map_err(|e| e.to_string())?;
    if gvk.group != route.group || gvk.kind != route.kind {
        return Err(format!(
            "body is {}, path addresses {}",
            gvk,
            route.resource_type().gvk()
        ));
    }
    if obj.meta().namespace != route.namespace() {
        return Err(format!(
            "body namespace {:?} does not match path segment '{}'",
            obj.meta().namespace.as_deref(),
            route.namespace
        ));
    }
    Ok(())
}

/// Seed a memory store from a JSON array of objects.
pub fn load_seed(store: &MemoryStore, path: &Path) -> Result<usize, ServerError> {
    let content = std::fs::read_to_string(path)?;
    let objects: Vec<DynamicObject> =
        serde_json::from_str(&content).map_err(|e| ServerError::Seed(e.to_string()))?;
    let count = objects.len();
    for obj in objects {
        store.insert(obj)?;
    }
    Ok(count)
}

pub fn bind(addr: &str) -> Result<Server, ServerError> {
    Server::http(addr).map_err(|e| ServerError::Bind {
        addr: addr.to_owned(),
        reason: e.to_string(),
    })
}

/// Serve requests until the server is unblocked.
pub fn serve(server: &Server, service: &Service) {
    for request in server.incoming_requests() {
        service.handle(request);
    }
}

/// A test helper that serves a [`MemoryStore`] on a random port in a background thread.
///
/// The server listens on `127.0.0.1:{port}`. Dropping the `TestServer` stops it.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub store: Arc<MemoryStore>,
    server: Arc<Server>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    pub fn start() -> Result<Self, ServerError> {
        Self::start_with(Arc::new(MemoryStore::new()), None)
    }

    /// Serve `store`, requiring `token` when given.
    pub fn start_with(store: Arc<MemoryStore>, token: Option<&str>) -> Result<Self, ServerError> {
        let server = Arc::new(bind("127.0.0.1:0")?);
        let port = server
            .server_addr()
            .to_ip()
            .map(|a| a.port())
            .ok_or_else(|| ServerError::Bind {
                addr: "127.0.0.1:0".to_owned(),
                reason: "not an IP address".to_owned(),
            })?;
        let url = format!("http://127.0.0.1:{port}");

        let service = Service::new(store.clone()).with_token(token.map(str::to_owned));
        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || serve(&srv, &service));

        Ok(Self {
            url,
            port,
            store,
            server,
            handle: Some(handle),
        })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_route_object() {
        let route = parse_route("/resources/apps/v1/Deployment/ns/web").unwrap();
        assert_eq!(route.group, "apps");
        assert_eq!(route.kind, "Deployment");
        assert_eq!(route.name.as_deref(), Some("web"));
        assert!(route.resource_type().namespaced);
    }

    #[test]
    fn parse_route_core_group_and_cluster_scope() {
        let route = parse_route("/resources/core/v1/Namespace/_/kube-system").unwrap();
        assert_eq!(route.group, "");
        let rt = route.resource_type();
        assert!(!rt.namespaced);
        assert_eq!(route.key("kube-system"), ObjectKey::cluster("kube-system"));
    }

    #[test]
    fn parse_route_collection() {
        let route = parse_route("/resources/core/v1/Secret/*").unwrap();
        assert_eq!(route.name, None);
        assert_eq!(route.namespace(), None);
    }

    #[test]
    fn parse_route_rejects_other_paths() {
        assert!(parse_route("/blobs/Object/abc").is_none());
        assert!(parse_route("/resources/core/v1").is_none());
        assert!(parse_route("/resources/core/v1/Secret/ns/a/extra").is_none());
        assert!(parse_route("/resources/core/v1/Secret/ns/").is_none());
    }

    #[test]
    fn split_query_decodes_pairs() {
        let (path, query) =
            split_query("/resources/core/v1/Secret/ns?labels=app%3Dweb%2Ctier%3Dfront");
        assert_eq!(path, "/resources/core/v1/Secret/ns");
        assert_eq!(query_value(&query, "labels"), Some("app=web,tier=front"));
        assert_eq!(query_value(&query, "missing"), None);
    }

    #[test]
    fn parse_route_keeps_plus_in_path_segments() {
        let route = parse_route("/resources/core/v1/Secret/ns/a+b").unwrap();
        assert_eq!(route.name.as_deref(), Some("a+b"));
        let route = parse_route("/resources/core/v1/Secret/n%73/%61%2Bb").unwrap();
        assert_eq!(route.namespace, "ns");
        assert_eq!(route.name.as_deref(), Some("a+b"));
    }

    #[test]
    fn split_query_decodes_plus_as_space() {
        let (_, query) = split_query("/x?labels=app%3Dweb&note=a+b&flag");
        assert_eq!(query_value(&query, "labels"), Some("app=web"));
        assert_eq!(query_value(&query, "note"), Some("a b"));
        assert_eq!(query_value(&query, "flag"), Some(""));
    }

    #[test]
    fn store_errors_map_to_status() {
        let key = ObjectKey::namespaced("ns", "a");
        assert_eq!(status_for(&StoreError::not_found("Secret", &key)), 404);
        assert_eq!(status_for(&StoreError::conflict(&key, "stale")), 409);
        assert_eq!(status_for(&StoreError::Invalid("x".to_owned())), 400);
        assert_eq!(status_for(&StoreError::Internal("x".to_owned())), 500);
    }

    #[test]
    fn body_must_match_path() {
        let route = parse_route("/resources/core/v1/Secret/ns").unwrap();
        let gvk = route.resource_type().gvk();
        let ok = DynamicObject::new(&gvk, &ObjectKey::namespaced("ns", "a"));
        assert!(check_body(&route, &ok).is_ok());

        let wrong_ns = DynamicObject::new(&gvk, &ObjectKey::namespaced("other", "a"));
        assert!(check_body(&route, &wrong_ns).is_err());
    }

    #[test]
    fn seed_file_populates_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(
            &path,
            r#"[{"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "a", "namespace": "ns"}}]"#,
        )
        .unwrap();
        let store = MemoryStore::new();
        assert_eq!(load_seed(&store, &path).unwrap(), 1);
        assert_eq!(store.len(), 1);
    }
}
