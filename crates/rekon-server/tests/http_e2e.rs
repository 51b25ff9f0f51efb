//! HTTP client <-> server end-to-end tests.
//!
//! These tests start a real `rekon-server` in-process on a random port and
//! exercise the real `HttpStore` client against it.

use rekon_core::{
    ensure_exists, get, retry_chain, update_with, Chain, Code, Directive, ExecutionContext,
    Executor, RetryPolicy, StopReason,
};
use rekon_schema::{
    DynamicObject, ListFilter, ObjectKey, OwnerReference, ResourceType, ResourceVersion,
};
use rekon_server::TestServer;
use rekon_store::{
    DeleteOptions, HttpStore, MemoryStore, PropagationPolicy, ResourceStore, StoreConfig,
    StoreError, StoreOp,
};
use serde_json::json;
use std::io::Read;
use std::sync::Arc;

fn start_server() -> TestServer {
    TestServer::start().unwrap()
}

fn make_client(url: &str) -> HttpStore {
    HttpStore::new(StoreConfig::http(url))
}

fn config_maps() -> ResourceType {
    ResourceType::namespaced("", "v1", "ConfigMap", "configmaps")
}

fn deployments() -> ResourceType {
    ResourceType::namespaced("apps", "v1", "Deployment", "deployments")
}

fn config_map(ns: &str, name: &str) -> DynamicObject {
    DynamicObject::new(&config_maps().gvk(), &ObjectKey::namespaced(ns, name))
}

#[test]
fn http_e2e_health() {
    let server = start_server();
    let resp = ureq::get(&format!("{}/health", server.url)).call().unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let mut body = String::new();
    resp.into_body()
        .into_reader()
        .read_to_string(&mut body)
        .unwrap();
    assert!(body.contains("ok"));
}

#[test]
fn http_e2e_crud_roundtrip() {
    let server = start_server();
    let client = make_client(&server.url);
    let key = ObjectKey::namespaced("default", "settings");

    let created = client
        .create(&config_map("default", "settings").with_field("data", json!({"mode": "fast"})))
        .unwrap();
    assert!(created.metadata.resource_version.is_some());
    assert!(created.metadata.uid.is_some());

    let fetched = client.get(&config_maps(), &key).unwrap();
    assert_eq!(fetched.str_field(&["data", "mode"]), Some("fast"));

    let mut changed = fetched.clone();
    changed.set_field(&["data", "mode"], json!("safe")).unwrap();
    let updated = client.update(&changed).unwrap();
    assert_ne!(updated.metadata.resource_version, fetched.metadata.resource_version);

    client
        .delete(&config_maps(), &key, &DeleteOptions::new())
        .unwrap();
    assert!(client.get(&config_maps(), &key).unwrap_err().is_not_found());
    assert!(server.store.is_empty());
}

#[test]
fn http_e2e_error_taxonomy() {
    let server = start_server();
    let client = make_client(&server.url);
    let key = ObjectKey::namespaced("default", "settings");

    assert!(matches!(
        client.get(&config_maps(), &key),
        Err(StoreError::NotFound { .. })
    ));

    let created = client.create(&config_map("default", "settings")).unwrap();
    assert!(matches!(
        client.create(&config_map("default", "settings")),
        Err(StoreError::AlreadyExists { .. })
    ));

    let mut stale = created.clone();
    stale.metadata.resource_version = Some(ResourceVersion::new("0"));
    match client.update(&stale).unwrap_err() {
        StoreError::Conflict { reason, .. } => {
            assert!(reason.contains("object has been modified"), "{reason}");
        }
        other => panic!("expected conflict, got {other}"),
    }

    let err = client
        .delete(
            &config_maps(),
            &key,
            &DeleteOptions {
                precondition: Some(ResourceVersion::new("0")),
                propagation: None,
            },
        )
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(err.to_string().contains("precondition failed"), "{err}");
}

#[test]
fn http_e2e_list_with_labels_across_namespaces() {
    let server = start_server();
    let client = make_client(&server.url);
    client
        .create(&config_map("a", "one").with_label("app", "web"))
        .unwrap();
    client
        .create(&config_map("b", "two").with_label("app", "web"))
        .unwrap();
    client
        .create(&config_map("b", "three").with_label("app", "db"))
        .unwrap();

    let all = client
        .list(&config_maps(), &ListFilter::all().with_label("app", "web"))
        .unwrap();
    assert_eq!(all.len(), 2);

    let in_b = client
        .list(&config_maps(), &ListFilter::in_namespace("b"))
        .unwrap();
    assert_eq!(in_b.len(), 2);

    let none = client
        .list(&config_maps(), &ListFilter::all().with_label("app", "cache"))
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn http_e2e_delete_propagation() {
    let server = start_server();
    let client = make_client(&server.url);
    let owner = client
        .create(&DynamicObject::new(
            &deployments().gvk(),
            &ObjectKey::namespaced("default", "web"),
        ))
        .unwrap();
    let owned = config_map("default", "web-config")
        .with_owner(OwnerReference::controller_for(&owner).unwrap());
    client.create(&owned).unwrap();

    let key = ObjectKey::namespaced("default", "web");
    client
        .delete(
            &deployments(),
            &key,
            &DeleteOptions::new().with_propagation(PropagationPolicy::Orphan),
        )
        .unwrap();

    let orphan = client
        .get(&config_maps(), &ObjectKey::namespaced("default", "web-config"))
        .unwrap();
    assert!(orphan.metadata.owner_references.is_empty());
}

#[test]
fn http_e2e_token_required() {
    let store = Arc::new(MemoryStore::new());
    let server = TestServer::start_with(store, Some("s3cret")).unwrap();
    let key = ObjectKey::namespaced("default", "settings");

    let anonymous = make_client(&server.url);
    assert!(matches!(
        anonymous.get(&config_maps(), &key),
        Err(StoreError::Unauthorized(_))
    ));

    let authed = HttpStore::new(StoreConfig::http(&server.url).with_token("s3cret"));
    assert!(authed.get(&config_maps(), &key).unwrap_err().is_not_found());
}

#[test]
fn http_e2e_cluster_scoped_objects() {
    let server = start_server();
    let client = make_client(&server.url);
    let namespaces = ResourceType::cluster("", "v1", "Namespace", "namespaces");
    client
        .create(&DynamicObject::new(&namespaces.gvk(), &ObjectKey::cluster("team-a")))
        .unwrap();
    let ns = client.get(&namespaces, &ObjectKey::cluster("team-a")).unwrap();
    assert_eq!(ns.metadata.name.as_str(), "team-a");
    assert!(ns.metadata.namespace.is_none());
}

#[test]
fn http_e2e_engine_creates_default() {
    let server = start_server();
    let client: Arc<dyn ResourceStore> = Arc::new(make_client(&server.url));
    let target = ObjectKey::namespaced("openshift-config", "settings");
    let ctx = ExecutionContext::new(Arc::clone(&client), target.clone());

    let chain = Chain::new().then(ensure_exists(
        &config_maps(),
        config_map("openshift-config", "settings").with_field("data", json!({"mode": "default"})),
    ));
    let directive = Directive::from_outcome(Executor::new(&ctx).run(&chain), &target);
    assert!(matches!(directive, Directive::Stop(StopReason::Done)));
    assert_eq!(server.store.calls(StoreOp::Create), 1);
    assert_eq!(server.store.len(), 1);
}

#[test]
fn http_e2e_engine_retries_conflicts() {
    let server = start_server();
    let key = ObjectKey::namespaced("default", "settings");
    server.store.insert(config_map("default", "settings")).unwrap();
    server
        .store
        .fail_next(StoreOp::Update, StoreError::conflict(&key, "object was modified"));
    server
        .store
        .fail_next(StoreOp::Update, StoreError::conflict(&key, "object was modified"));

    let ctx = ExecutionContext::new(Arc::new(make_client(&server.url)), key.clone());
    let chain = Chain::new().then(update_with(&config_maps(), &key, |obj| {
        obj.set_field(&["data", "replicas"], json!("3"))?;
        Ok(true)
    }));
    let outcome = retry_chain(&Executor::new(&ctx), RetryPolicy::default(), &chain);
    assert!(outcome.is(Code::Done));
    assert_eq!(server.store.calls(StoreOp::Update), 3);

    let check = Executor::new(&ctx).execute(&get(&config_maps(), &key));
    assert_eq!(
        check.object().and_then(|o| o.str_field(&["data", "replicas"])),
        Some("3")
    );
}

#[test]
fn http_e2e_concurrent_clients() {
    let server = start_server();
    let url = server.url.clone();

    let handles: Vec<_> = (0..4)
        .map(|thread_idx| {
            let u = url.clone();
            std::thread::spawn(move || {
                let client = make_client(&u);
                for i in 0..10 {
                    client
                        .create(&config_map("default", &format!("t{thread_idx}-cm-{i}")))
                        .unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let client = make_client(&server.url);
    let all = client
        .list(&config_maps(), &ListFilter::in_namespace("default"))
        .unwrap();
    assert_eq!(all.len(), 40);
}
