//! Classification of filesystem changes inside a configuration tree.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use crate::config::loader::USECASES_DIR;

/// What part of the configuration a changed file belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigChange {
    /// The root `config.{yaml,yml}`.
    Global,
    /// `<service>/config.{yaml,yml}`.
    Service { service: String },
    /// `<service>/usecases/<usecase>/*.json`.
    MockSet { service: String, usecase: String },
    /// Anything else under the root.
    Unknown,
}

impl ConfigChange {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigChange::Global => "global",
            ConfigChange::Service { .. } => "service",
            ConfigChange::MockSet { .. } => "mock_set",
            ConfigChange::Unknown => "unknown",
        }
    }
}

/// A settled change, emitted once per quiet period per path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChangeEvent {
    pub path: PathBuf,
    pub change: ConfigChange,
    pub deleted: bool,
    pub timestamp: SystemTime,
}

fn is_config_file_name(name: &str) -> bool {
    name == "config.yaml" || name == "config.yml"
}

/// Extension check, ignoring ASCII case.
fn has_extension(name: &str, allowed: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| ext.eq_ignore_ascii_case(a)))
}

/// True for files the watcher cares about: visible YAML or JSON files.
pub fn is_watched_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.starts_with('.') && has_extension(name, &["yaml", "yml", "json"])
}

/// Classify `path` by its shape relative to `root`.
pub fn classify(root: &Path, path: &Path) -> ConfigChange {
    let Ok(relative) = path.strip_prefix(root) else {
        return ConfigChange::Unknown;
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => return ConfigChange::Unknown,
            },
            _ => return ConfigChange::Unknown,
        }
    }

    match parts.as_slice() {
        [file] if is_config_file_name(file) => ConfigChange::Global,
        [service, file] if is_config_file_name(file) => ConfigChange::Service {
            service: service.to_string(),
        },
        [service, dir, usecase, file] if *dir == USECASES_DIR && has_extension(file, &["json"]) => {
            ConfigChange::MockSet {
                service: service.to_string(),
                usecase: usecase.to_string(),
            }
        }
        _ => ConfigChange::Unknown,
    }
}
