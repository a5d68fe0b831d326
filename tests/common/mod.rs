//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::fs;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use mock_harbor::config::{ConfigStore, FleetSettings};
use mock_harbor::fleet::FleetManager;

/// A throwaway configuration tree.
pub struct ConfigTree {
    dir: TempDir,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> PathBuf {
        // Canonical so watcher paths compare equal on macOS tmp symlinks.
        self.dir.path().canonicalize().unwrap()
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Write the global config listing `(service, usecase)` pairs.
    pub fn global(&self, services: &[(&str, &str)]) {
        let mut yaml = String::from("services:\n");
        for (name, usecase) in services {
            yaml.push_str(&format!("  - name: {name}\n    usecase: {usecase}\n"));
        }
        self.write("config.yaml", &yaml);
    }

    pub fn service(&self, name: &str, port: u16) {
        self.write(&format!("{name}/config.yaml"), &format!("port: {port}\n"));
    }

    pub fn service_with_delay(&self, name: &str, port: u16, fixed_ms: u64) {
        self.write(
            &format!("{name}/config.yaml"),
            &format!("port: {port}\ndelay:\n  enabled: true\n  fixed: {fixed_ms}\n"),
        );
    }

    pub fn mocks(&self, service: &str, usecase: &str, mocks: Value) {
        self.write(
            &format!("{service}/usecases/{usecase}/all.json"),
            &serde_json::to_string_pretty(&mocks).unwrap(),
        );
    }

    /// One `GET <path>` mock answering `status` with `{"usecase": <usecase>}`.
    pub fn simple_mock(&self, service: &str, usecase: &str, path: &str, status: u16) {
        self.mocks(
            service,
            usecase,
            json!([{
                "request": { "path": path, "method": "GET" },
                "response": { "statusCode": status, "body": { "usecase": usecase } }
            }]),
        );
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Ask the OS for a port that is free right now.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

/// Whether something is accepting connections on `port`.
pub fn port_in_use(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_err()
}

pub fn settings() -> FleetSettings {
    FleetSettings {
        bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
        grace_period: Duration::from_secs(2),
        settle_delay: Duration::from_millis(50),
    }
}

pub fn fleet(tree: &ConfigTree) -> Arc<FleetManager> {
    Arc::new(FleetManager::new(ConfigStore::new(tree.root()), settings()))
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

pub fn url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{port}{path}")
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
