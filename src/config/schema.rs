//! Configuration schema definitions.
//!
//! This module defines the on-disk structures of a mock tree plus the
//! runtime tuning knobs of the fleet. All on-disk types derive Serde traits;
//! field names follow the file formats (`statusCode` in mock files).

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root `config.yaml`: the services to run and the usecase each one serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Ordered service references.
    pub services: Vec<ServiceReference>,
}

impl GlobalConfig {
    /// Usecase currently assigned to `service`, if it is referenced.
    pub fn usecase_for(&self, service: &str) -> Option<&str> {
        self.services
            .iter()
            .find(|s| s.name == service)
            .map(|s| s.usecase.as_str())
    }
}

/// Points at a service directory and selects one of its usecases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceReference {
    pub name: String,
    pub usecase: String,
}

/// Per-service `<service>/config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service name; the loader fills in the directory name when empty.
    pub name: String,

    /// Listening port. Kept signed so out-of-range values surface as
    /// validation errors rather than parse errors.
    pub port: i64,

    /// Response latency simulation.
    pub delay: DelayConfig,
}

impl ServiceConfig {
    /// The port as a socket port, if it fits.
    pub fn socket_port(&self) -> Option<u16> {
        u16::try_from(self.port).ok().filter(|p| *p != 0)
    }
}

/// Latency injected before each matched response, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DelayConfig {
    pub enabled: bool,

    /// Fixed delay; takes precedence over the range when greater than zero.
    pub fixed: Option<u64>,

    /// Lower bound of the random range.
    pub min: Option<u64>,

    /// Upper bound of the random range (inclusive).
    pub max: Option<u64>,
}

/// One request matcher and its canned response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MockEntry {
    pub request: RequestSpec,
    pub response: ResponseSpec,
}

/// Request side of a mock entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestSpec {
    pub path: String,
    pub method: String,

    /// Expected JSON fields; the actual body may carry more.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Map<String, Value>>,
}

/// Response side of a mock entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseSpec {
    #[serde(rename = "statusCode")]
    pub status_code: u16,

    pub headers: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// A fully loaded and validated service, ready to be turned into a runtime.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub usecase: String,
    pub port: u16,
    pub config: ServiceConfig,
    pub mocks: Vec<MockEntry>,
}

/// Runtime tuning for the fleet and its listeners.
#[derive(Debug, Clone)]
pub struct FleetSettings {
    /// Address every service listener binds to.
    pub bind_ip: IpAddr,

    /// How long a replaced or removed listener may drain.
    pub grace_period: Duration,

    /// Pause between stopping a listener and binding its replacement.
    pub settle_delay: Duration,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            grace_period: Duration::from_secs(5),
            settle_delay: Duration::from_millis(100),
        }
    }
}
