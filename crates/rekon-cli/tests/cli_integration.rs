//! CLI subprocess integration tests.
//!
//! These tests invoke the `rekon` binary as a subprocess against an
//! in-process `rekon-server` and verify exit codes, stdout content, and
//! JSON output.

use rekon_schema::{DynamicObject, GroupVersionKind, ObjectKey, OwnerReference};
use rekon_server::TestServer;
use rekon_store::StoreConfig;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

struct Fixture {
    server: TestServer,
    dir: tempfile::TempDir,
    store_config: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let server = TestServer::start().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store_config = dir.path().join("store.json");
        StoreConfig::http(&server.url).save(&store_config).unwrap();
        Self {
            server,
            dir,
            store_config,
        }
    }

    fn rekon(&self, args: &[&str]) -> Output {
        rekon_bin(self.dir.path())
            .arg("--store-config")
            .arg(&self.store_config)
            .args(args)
            .output()
            .unwrap()
    }

    fn write_object(&self, file: &str, value: &serde_json::Value) -> PathBuf {
        let path = self.dir.path().join(file);
        std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
        path
    }
}

fn rekon_bin(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_rekon"));
    cmd.env("HOME", home);
    cmd.env_remove("REKON_LOG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout)
        .unwrap_or_else(|e| panic!("invalid JSON ({e}): {}", stdout(output)))
}

fn settings_json() -> serde_json::Value {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": "settings", "namespace": "openshift-config"},
        "data": {"mode": "default"}
    })
}

#[test]
fn cli_version_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = rekon_bin(dir.path()).arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("rekon"));
}

#[test]
fn cli_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = rekon_bin(dir.path()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    for cmd in ["get", "list", "ensure", "delete", "owner", "completions"] {
        assert!(text.contains(cmd), "help should mention '{cmd}'");
    }
}

#[test]
fn cli_completions_need_no_store() {
    let dir = tempfile::tempdir().unwrap();
    let output = rekon_bin(dir.path())
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("rekon"));
}

#[test]
fn cli_missing_store_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = rekon_bin(dir.path())
        .args(["get", "ConfigMap", "settings"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("no --store-config"));
}

#[test]
fn cli_verbose_logs_command_to_stderr() {
    let fx = Fixture::new();
    let output = fx.rekon(&["--verbose", "--json", "get", "ConfigMap", "absent"]);
    assert!(output.status.success());
    let log = stderr(&output);
    assert!(log.contains("running Get"), "stderr: {log}");
    assert!(log.contains("store backend http"), "stderr: {log}");
    assert_eq!(stdout_json(&output)["reason"], "not-found");
}

#[test]
fn cli_ensure_creates_once() {
    let fx = Fixture::new();
    let file = fx.write_object("settings.json", &settings_json());
    let file = file.to_str().unwrap();

    let first = fx.rekon(&["ensure", file]);
    assert!(first.status.success(), "stderr: {}", stderr(&first));
    assert!(stdout(&first).contains("stop (done)"));
    assert_eq!(fx.server.store.len(), 1);

    let second = fx.rekon(&["--json", "ensure", file]);
    assert!(second.status.success());
    let report = stdout_json(&second);
    assert_eq!(report["directive"], "stop");
    assert_eq!(report["reason"], "done");
    assert_eq!(fx.server.store.len(), 1);
}

#[test]
fn cli_ensure_with_requeue_exits_retry() {
    let fx = Fixture::new();
    let file = fx.write_object("settings.json", &settings_json());

    let output = fx.rekon(&[
        "--json",
        "ensure",
        file.to_str().unwrap(),
        "--requeue-after",
        "30",
    ]);
    assert_eq!(output.status.code(), Some(2));
    let report = stdout_json(&output);
    assert_eq!(report["directive"], "retry-after");
    assert_eq!(report["retry_after_secs"], 30.0);
    assert_eq!(fx.server.store.len(), 1);
}

#[test]
fn cli_ensure_rejects_unknown_kind() {
    let fx = Fixture::new();
    let file = fx.write_object(
        "widget.json",
        &serde_json::json!({
            "apiVersion": "example.io/v1",
            "kind": "Widget",
            "metadata": {"name": "w", "namespace": "default"}
        }),
    );
    let output = fx.rekon(&["ensure", file.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Widget"));
    assert!(fx.server.store.is_empty());
}

#[test]
fn cli_get_json_returns_object() {
    let fx = Fixture::new();
    let file = fx.write_object("settings.json", &settings_json());
    assert!(fx.rekon(&["ensure", file.to_str().unwrap()]).status.success());

    let output = fx.rekon(&["--json", "get", "ConfigMap", "openshift-config/settings"]);
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["directive"], "stop");
    assert_eq!(report["object"]["data"]["mode"], "default");
    assert!(report["object"]["metadata"]["resourceVersion"].is_string());
}

#[test]
fn cli_get_missing_is_not_found_stop() {
    let fx = Fixture::new();
    let output = fx.rekon(&["--json", "get", "ConfigMap", "absent"]);
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["directive"], "stop");
    assert_eq!(report["reason"], "not-found");
    assert!(report.get("object").is_none());
}

#[test]
fn cli_get_unknown_type_fails() {
    let fx = Fixture::new();
    let output = fx.rekon(&["get", "Widget.example.io", "w"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Widget"));
}

#[test]
fn cli_list_filters_by_label_and_namespace() {
    let fx = Fixture::new();
    let gvk = GroupVersionKind::new("", "v1", "ConfigMap");
    for (ns, name, app) in [("a", "one", "web"), ("b", "two", "web"), ("b", "three", "db")] {
        fx.server
            .store
            .insert(DynamicObject::new(&gvk, &ObjectKey::namespaced(ns, name)).with_label("app", app))
            .unwrap();
    }

    let web = stdout_json(&fx.rekon(&["--json", "list", "ConfigMap", "-l", "app=web"]));
    assert_eq!(web["items"].as_array().unwrap().len(), 2);

    let in_b = stdout_json(&fx.rekon(&["--json", "list", "ConfigMap", "-n", "b"]));
    assert_eq!(in_b["items"].as_array().unwrap().len(), 2);

    let table = fx.rekon(&["list", "ConfigMap", "-n", "a"]);
    assert!(table.status.success());
    let text = stdout(&table);
    assert!(text.contains("NAMESPACE"));
    assert!(text.contains("one"));
    assert!(!text.contains("three"));

    let none = fx.rekon(&["list", "Secret"]);
    assert!(none.status.success());
    assert!(stdout(&none).contains("No secrets found."));
}

#[test]
fn cli_delete_missing_fails_unless_if_present() {
    let fx = Fixture::new();

    let strict = fx.rekon(&["delete", "ConfigMap", "absent"]);
    assert_eq!(strict.status.code(), Some(1));
    assert!(stderr(&strict).contains("not found"));

    let lenient = fx.rekon(&["delete", "ConfigMap", "absent", "--if-present"]);
    assert!(lenient.status.success(), "stderr: {}", stderr(&lenient));
}

#[test]
fn cli_delete_removes_object() {
    let fx = Fixture::new();
    let file = fx.write_object("settings.json", &settings_json());
    assert!(fx.rekon(&["ensure", file.to_str().unwrap()]).status.success());

    let output = fx.rekon(&[
        "delete",
        "ConfigMap",
        "settings",
        "-n",
        "openshift-config",
        "--propagation",
        "Background",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(fx.server.store.is_empty());
}

#[test]
fn cli_delete_rejects_unknown_propagation() {
    let fx = Fixture::new();
    let output = fx.rekon(&["delete", "ConfigMap", "x", "--propagation", "Sideways"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Sideways"));
}

#[test]
fn cli_owner_walks_controllers() {
    let fx = Fixture::new();
    let store = &fx.server.store;
    let deploy = store
        .insert(DynamicObject::new(
            &GroupVersionKind::new("apps", "v1", "Deployment"),
            &ObjectKey::namespaced("default", "web"),
        ))
        .unwrap();
    let replica_set = store
        .insert(
            DynamicObject::new(
                &GroupVersionKind::new("apps", "v1", "ReplicaSet"),
                &ObjectKey::namespaced("default", "web-abc"),
            )
            .with_owner(OwnerReference::controller_for(&deploy).unwrap()),
        )
        .unwrap();
    store
        .insert(
            DynamicObject::new(
                &GroupVersionKind::new("", "v1", "Pod"),
                &ObjectKey::namespaced("default", "web-abc-1"),
            )
            .with_owner(OwnerReference::controller_for(&replica_set).unwrap()),
        )
        .unwrap();

    let direct = fx.rekon(&["owner", "Pod", "web-abc-1"]);
    assert!(direct.status.success(), "stderr: {}", stderr(&direct));
    let text = stdout(&direct);
    assert!(text.contains("controller: ReplicaSet web-abc"));
    assert!(text.contains("owner: Deployment web"));

    let root = stdout_json(&fx.rekon(&["--json", "owner", "Pod", "web-abc-1", "--root"]));
    assert_eq!(root["root"]["kind"], "Deployment");
    assert_eq!(root["root"]["name"], "web");

    let top = fx.rekon(&["owner", "Deployment.apps", "web"]);
    assert!(top.status.success());
    assert!(stdout(&top).contains("controller: none"));
}

#[test]
fn cli_memory_backend_runs_in_process() {
    let dir = tempfile::tempdir().unwrap();
    let store_config = dir.path().join("store.json");
    StoreConfig::memory().save(&store_config).unwrap();
    let file = dir.path().join("settings.json");
    std::fs::write(&file, settings_json().to_string()).unwrap();

    let output = rekon_bin(dir.path())
        .arg("--store-config")
        .arg(&store_config)
        .arg("ensure")
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("stop (done)"));
}
