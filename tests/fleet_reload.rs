//! Fleet serving and reconciliation tests over real sockets.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use std::net::{Ipv4Addr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use mock_harbor::config::{ConfigChange, ConfigChangeEvent, ConfigStore};
use mock_harbor::fleet::FleetError;
use mock_harbor::http::{RuntimeError, RuntimeState};
use mock_harbor::lifecycle::hot_reload::ReloadAction;

mod common;
use common::{client, url, ConfigTree};

#[tokio::test]
async fn serves_configured_mocks_and_404s_the_rest() {
    let tree = ConfigTree::new();
    let port = common::free_port();
    tree.global(&[("users", "happy")]);
    tree.service("users", port);
    tree.mocks(
        "users",
        "happy",
        json!([{
            "request": { "path": "/users", "method": "GET" },
            "response": {
                "statusCode": 200,
                "headers": { "X-Mock": "users" },
                "body": [{ "id": 1 }]
            }
        }]),
    );

    let fleet = common::fleet(&tree);
    let global = ConfigStore::new(tree.root()).load_validated_global().unwrap();
    let report = fleet.populate(global).await;
    assert_eq!(report.started, vec!["users"]);

    let client = client();
    let res = client.get(url(port, "/users")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-mock"], "users");
    assert_eq!(res.headers()["content-type"], "application/json");
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.json::<Value>().await.unwrap(), json!([{ "id": 1 }]));

    let res = client.post(url(port, "/users")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), "No matching mock found");

    fleet.shutdown(Duration::from_secs(1)).await;
    assert!(!common::port_in_use(port));
}

#[tokio::test]
async fn body_matching_is_a_subset_check() {
    let tree = ConfigTree::new();
    let port = common::free_port();
    tree.global(&[("auth", "default")]);
    tree.service("auth", port);
    tree.mocks(
        "auth",
        "default",
        json!([
            {
                "request": { "path": "/login", "method": "POST", "body": { "user": "admin" } },
                "response": { "statusCode": 200, "body": { "token": "abc" } }
            },
            {
                "request": { "path": "/login", "method": "POST" },
                "response": { "statusCode": 401 }
            }
        ]),
    );

    let fleet = common::fleet(&tree);
    fleet.reload_global().await.unwrap();

    let client = client();
    let res = client
        .post(url(port, "/login"))
        .json(&json!({ "user": "admin", "password": "secret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "token": "abc" }));

    let res = client
        .post(url(port, "/login"))
        .json(&json!({ "user": "guest" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = client.post(url(port, "/login")).body("not json").send().await.unwrap();
    assert_eq!(res.status(), 401);

    fleet.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn fixed_delay_is_applied() {
    let tree = ConfigTree::new();
    let port = common::free_port();
    tree.global(&[("slow", "default")]);
    tree.service_with_delay("slow", port, 300);
    tree.simple_mock("slow", "default", "/wait", 200);

    let fleet = common::fleet(&tree);
    fleet.reload_global().await.unwrap();

    let started = Instant::now();
    let res = client().get(url(port, "/wait")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(started.elapsed() >= Duration::from_millis(300));

    fleet.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn rejected_reload_keeps_previous_runtime() {
    let tree = ConfigTree::new();
    let port = common::free_port();
    tree.global(&[("users", "happy")]);
    tree.service("users", port);
    tree.simple_mock("users", "happy", "/users", 200);

    let fleet = common::fleet(&tree);
    fleet.reload_global().await.unwrap();
    let before = fleet.runtime("users").unwrap();

    tree.write("users/usecases/happy/all.json", "[ this is not json");
    let err = fleet.reload_service("users", "happy").await.unwrap_err();
    assert!(matches!(err, FleetError::Load(_)));

    let after = fleet.runtime("users").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.state(), RuntimeState::Running);

    let res = client().get(url(port, "/users")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    tree.write("users/config.yaml", "port: 80\n");
    assert!(fleet.reload_service("users", "happy").await.is_err());
    assert_eq!(fleet.runtime("users").unwrap().state(), RuntimeState::Running);

    fleet.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn reload_switches_usecase() {
    let tree = ConfigTree::new();
    let port = common::free_port();
    tree.global(&[("users", "happy")]);
    tree.service("users", port);
    tree.simple_mock("users", "happy", "/users", 200);
    tree.simple_mock("users", "error", "/users", 500);

    let fleet = common::fleet(&tree);
    fleet.reload_global().await.unwrap();
    let client = client();
    assert_eq!(client.get(url(port, "/users")).send().await.unwrap().status(), 200);

    fleet.reload_service("users", "error").await.unwrap();
    let res = client.get(url(port, "/users")).send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "usecase": "error" }));
    assert_eq!(fleet.runtime("users").unwrap().usecase(), "error");

    fleet.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn global_reload_reconciles_fleet() {
    let tree = ConfigTree::new();
    let (port_a, port_b) = (common::free_port(), common::free_port());
    tree.global(&[("a", "u1"), ("b", "u2")]);
    tree.service("a", port_a);
    tree.service("b", port_b);
    tree.simple_mock("a", "u1", "/a", 200);
    tree.simple_mock("b", "u2", "/b", 200);
    tree.simple_mock("b", "u3", "/b", 202);

    let fleet = common::fleet(&tree);
    fleet.reload_global().await.unwrap();
    assert_eq!(fleet.len(), 2);

    tree.global(&[("b", "u3")]);
    let report = fleet.reload_global().await.unwrap();
    assert_eq!(report.removed, vec!["a"]);
    assert_eq!(report.reloaded, vec!["b"]);
    assert!(report.failed.is_empty());

    assert_eq!(fleet.names(), vec!["b"]);
    assert_eq!(fleet.port_owner(port_a), None);
    assert!(!common::port_in_use(port_a));

    let res = client().get(url(port_b, "/b")).send().await.unwrap();
    assert_eq!(res.status(), 202);

    fleet.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn removed_service_port_is_reusable_in_same_pass() {
    let tree = ConfigTree::new();
    let port = common::free_port();
    tree.global(&[("old", "default")]);
    tree.service("old", port);
    tree.simple_mock("old", "default", "/old", 200);

    let fleet = common::fleet(&tree);
    fleet.reload_global().await.unwrap();

    tree.service("new", port);
    tree.simple_mock("new", "default", "/new", 200);
    tree.global(&[("new", "default")]);

    let report = fleet.reload_global().await.unwrap();
    assert_eq!(report.removed, vec!["old"]);
    assert_eq!(report.reloaded, vec!["new"]);
    assert_eq!(fleet.port_owner(port).as_deref(), Some("new"));

    let client = client();
    assert_eq!(client.get(url(port, "/new")).send().await.unwrap().status(), 200);
    assert_eq!(client.get(url(port, "/old")).send().await.unwrap().status(), 404);

    fleet.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn invalid_global_leaves_fleet_untouched() {
    let tree = ConfigTree::new();
    let port = common::free_port();
    tree.global(&[("users", "happy")]);
    tree.service("users", port);
    tree.simple_mock("users", "happy", "/users", 200);

    let fleet = common::fleet(&tree);
    fleet.reload_global().await.unwrap();

    tree.write("config.yaml", "services: [ {name: users");
    assert!(fleet.reload_global().await.is_err());

    tree.write("config.yaml", "services:\n  - name: \"\"\n    usecase: happy\n");
    assert!(fleet.reload_global().await.is_err());

    assert_eq!(fleet.names(), vec!["users"]);
    assert_eq!(fleet.usecase_for("users").as_deref(), Some("happy"));
    let res = client().get(url(port, "/users")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    fleet.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn startup_skips_broken_services() {
    let tree = ConfigTree::new();
    let port = common::free_port();
    tree.global(&[("good", "default"), ("missing", "default"), ("bad", "default")]);
    tree.service("good", port);
    tree.simple_mock("good", "default", "/ok", 200);
    tree.service("bad", 80);
    tree.simple_mock("bad", "default", "/ok", 200);

    let fleet = common::fleet(&tree);
    let global = ConfigStore::new(tree.root()).load_validated_global().unwrap();
    let report = fleet.populate(global).await;

    assert_eq!(report.started, vec!["good"]);
    let skipped: Vec<&str> = report.skipped.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(skipped, vec!["missing", "bad"]);
    assert_eq!(fleet.names(), vec!["good"]);

    fleet.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn global_reload_isolates_broken_service() {
    let tree = ConfigTree::new();
    let (port_a, port_b) = (common::free_port(), common::free_port());
    tree.global(&[("a", "default"), ("b", "default")]);
    tree.service("a", port_a);
    tree.service("b", port_b);
    tree.simple_mock("a", "default", "/a", 200);
    tree.simple_mock("b", "default", "/b", 200);

    let fleet = common::fleet(&tree);
    fleet.reload_global().await.unwrap();
    let b_before = fleet.runtime("b").unwrap();

    tree.write("b/usecases/default/all.json", "[]");
    tree.simple_mock("a", "default", "/a", 203);
    let report = fleet.reload_global().await.unwrap();

    assert_eq!(report.reloaded, vec!["a"]);
    let failed: Vec<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(failed, vec!["b"]);
    assert!(Arc::ptr_eq(&b_before, &fleet.runtime("b").unwrap()));

    let client = client();
    assert_eq!(client.get(url(port_a, "/a")).send().await.unwrap().status(), 203);
    assert_eq!(client.get(url(port_b, "/b")).send().await.unwrap().status(), 200);

    fleet.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn queued_reload_uses_usecase_current_at_run_time() {
    let tree = ConfigTree::new();
    let port = common::free_port();
    tree.global(&[("a", "u1")]);
    tree.service("a", port);
    tree.simple_mock("a", "u1", "/a", 201);
    tree.simple_mock("a", "u2", "/a", 202);

    let fleet = common::fleet(&tree);
    fleet.reload_global().await.unwrap();

    // A service config change is planned while u1 is still active...
    let planned = ReloadAction::plan(&ConfigChangeEvent {
        path: PathBuf::from("a/config.yaml"),
        change: ConfigChange::Service { service: "a".into() },
        deleted: false,
        timestamp: SystemTime::now(),
    });
    let ReloadAction::Service { service, changed_usecase } = planned else {
        panic!("expected a service reload");
    };

    // ...but a global switch to u2 lands before it runs.
    tree.global(&[("a", "u2")]);
    fleet.reload_global().await.unwrap();

    let reloaded = fleet.reload_active(&service, changed_usecase.as_deref()).await.unwrap();
    assert_eq!(reloaded.as_deref(), Some("u2"));
    assert_eq!(fleet.runtime("a").unwrap().usecase(), "u2");
    assert_eq!(client().get(url(port, "/a")).send().await.unwrap().status(), 202);

    // A mock change for the usecase that is no longer active is dropped.
    let current = fleet.runtime("a").unwrap();
    assert_eq!(fleet.reload_active("a", Some("u1")).await.unwrap(), None);
    assert!(Arc::ptr_eq(&current, &fleet.runtime("a").unwrap()));

    fleet.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn replacement_bind_failure_leaves_service_down() {
    let tree = ConfigTree::new();
    let port = common::free_port();
    tree.global(&[("a", "default")]);
    tree.service("a", port);
    tree.simple_mock("a", "default", "/a", 200);

    let fleet = common::fleet(&tree);
    fleet.reload_global().await.unwrap();

    let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let taken_port = taken.local_addr().unwrap().port();
    tree.service("a", taken_port);

    let err = fleet.reload_service("a", "default").await.unwrap_err();
    assert!(matches!(err, FleetError::Runtime(RuntimeError::Bind(_))));

    // No rollback: the old runtime is gone from every view and its port is free.
    assert!(fleet.runtime("a").is_none());
    assert_eq!(fleet.port_owner(port), None);
    assert_eq!(fleet.port_owner(taken_port), None);
    assert!(fleet.is_empty());
    assert!(!common::port_in_use(port));
    drop(taken);
}

#[tokio::test]
async fn startup_bind_collision_hands_port_back() {
    let tree = ConfigTree::new();
    let port = common::free_port();
    tree.global(&[("a", "default"), ("b", "default")]);
    tree.service("a", port);
    tree.service("b", port);
    tree.simple_mock("a", "default", "/a", 200);
    tree.simple_mock("b", "default", "/b", 200);

    let fleet = common::fleet(&tree);
    let global = ConfigStore::new(tree.root()).load_validated_global().unwrap();
    let report = fleet.populate(global).await;

    assert_eq!(report.started, vec!["a"]);
    let failed: Vec<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(failed, vec!["b"]);
    assert!(matches!(report.failed[0].1, RuntimeError::Bind(_)));

    assert_eq!(fleet.names(), vec!["a"]);
    assert_eq!(fleet.port_owner(port).as_deref(), Some("a"));
    assert_eq!(client().get(url(port, "/a")).send().await.unwrap().status(), 200);

    fleet.shutdown(Duration::from_secs(1)).await;
}
