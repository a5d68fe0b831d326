//! Configuration loading from disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::schema::{GlobalConfig, MockEntry, ServiceConfig, ServiceSpec};
use crate::config::validation::{
    validate_global, validate_mocks, validate_service, ValidationIssue, ValidationReport,
};

/// File name of both the root and the per-service config.
pub const CONFIG_FILE: &str = "config.yaml";
const CONFIG_FILE_ALT: &str = "config.yml";
/// Directory holding a service's usecases.
pub const USECASES_DIR: &str = "usecases";
/// File holding a usecase's mock entries.
pub const MOCKS_FILE: &str = "all.json";

/// Error type for reading a single configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{what} not found at '{}'", path.display())]
    Missing { path: PathBuf, what: String },

    #[error("failed to read {what} at '{}': {source}", path.display())]
    Unreadable {
        path: PathBuf,
        what: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed YAML in {what} at '{}': {source}", path.display())]
    MalformedYaml {
        path: PathBuf,
        what: String,
        #[source]
        source: serde_yml::Error,
    },

    #[error("malformed JSON in {what} at '{}': {source}", path.display())]
    MalformedJson {
        path: PathBuf,
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no mock entries in {what} at '{}'", path.display())]
    Empty { path: PathBuf, what: String },
}

impl ConfigError {
    /// The file the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Missing { path, .. }
            | ConfigError::Unreadable { path, .. }
            | ConfigError::MalformedYaml { path, .. }
            | ConfigError::MalformedJson { path, .. }
            | ConfigError::Empty { path, .. } => path,
        }
    }
}

/// Error type for loading plus validating.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid configuration in '{}': {report}", path.display())]
    Invalid { path: PathBuf, report: ValidationReport },
}

/// Read-only view over a configuration tree.
///
/// Every method is a pure function of the files on disk, so a store can be
/// shared freely between tasks.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the root config, preferring `config.yaml` over `config.yml`.
    pub fn global_path(&self) -> PathBuf {
        resolve_config_file(&self.root)
    }

    pub fn service_path(&self, service: &str) -> PathBuf {
        resolve_config_file(&self.root.join(service))
    }

    pub fn mocks_path(&self, service: &str, usecase: &str) -> PathBuf {
        self.root
            .join(service)
            .join(USECASES_DIR)
            .join(usecase)
            .join(MOCKS_FILE)
    }

    /// Load the root service list.
    pub fn load_global(&self) -> Result<GlobalConfig, ConfigError> {
        let path = self.global_path();
        let what = "global configuration";
        let content = read(&path, what)?;
        parse_yaml(&content, &path, what)
    }

    /// Load a service's settings. The name defaults to the directory name.
    pub fn load_service(&self, service: &str) -> Result<ServiceConfig, ConfigError> {
        let path = self.service_path(service);
        let what = format!("service configuration for '{service}'");
        let content = read(&path, &what)?;
        let mut config: ServiceConfig = parse_yaml(&content, &path, &what)?;
        if config.name.trim().is_empty() {
            config.name = service.to_string();
        }
        Ok(config)
    }

    /// Load a usecase's mock list. An empty list is an error.
    pub fn load_mocks(&self, service: &str, usecase: &str) -> Result<Vec<MockEntry>, ConfigError> {
        let path = self.mocks_path(service, usecase);
        let what = format!("mock configurations for '{service}/{usecase}'");
        let content = read(&path, &what)?;
        let mocks: Vec<MockEntry> =
            serde_json::from_str(&content).map_err(|source| ConfigError::MalformedJson {
                path: path.clone(),
                what: what.clone(),
                source,
            })?;
        if mocks.is_empty() {
            return Err(ConfigError::Empty { path, what });
        }
        Ok(mocks)
    }

    /// Load and validate the root service list.
    pub fn load_validated_global(&self) -> Result<GlobalConfig, LoadError> {
        let config = self.load_global()?;
        let path = self.global_path();
        let report = validate_global(&config, &path);
        report.log_warnings();
        if !report.is_valid() {
            return Err(LoadError::Invalid { path, report });
        }
        Ok(config)
    }

    /// Load and validate everything one service needs to run `usecase`.
    pub fn load_service_spec(&self, service: &str, usecase: &str) -> Result<ServiceSpec, LoadError> {
        let config = self.load_service(service)?;
        let config_path = self.service_path(service);
        let report = validate_service(&config, &config_path);
        report.log_warnings();
        if !report.is_valid() {
            return Err(LoadError::Invalid { path: config_path, report });
        }

        let mocks = self.load_mocks(service, usecase)?;
        let mocks_path = self.mocks_path(service, usecase);
        let report = validate_mocks(&mocks, &mocks_path);
        report.log_warnings();
        if !report.is_valid() {
            return Err(LoadError::Invalid { path: mocks_path, report });
        }

        let Some(port) = config.socket_port() else {
            let mut report = ValidationReport::default();
            report.errors.push(ValidationIssue {
                file: CONFIG_FILE.to_string(),
                field: "port".to_string(),
                message: format!("port {} cannot be bound", config.port),
            });
            return Err(LoadError::Invalid { path: config_path, report });
        };

        Ok(ServiceSpec {
            name: service.to_string(),
            usecase: usecase.to_string(),
            port,
            config,
            mocks,
        })
    }
}

fn resolve_config_file(dir: &Path) -> PathBuf {
    let primary = dir.join(CONFIG_FILE);
    if !primary.exists() {
        let alt = dir.join(CONFIG_FILE_ALT);
        if alt.exists() {
            return alt;
        }
    }
    primary
}

fn read(path: &Path, what: &str) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::Missing {
                path: path.to_path_buf(),
                what: what.to_string(),
            }
        } else {
            ConfigError::Unreadable {
                path: path.to_path_buf(),
                what: what.to_string(),
                source,
            }
        }
    })
}

fn parse_yaml<T: serde::de::DeserializeOwned + Default>(
    content: &str,
    path: &Path,
    what: &str,
) -> Result<T, ConfigError> {
    // An empty YAML document deserializes as null; treat it as all defaults.
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yml::from_str(content).map_err(|source| ConfigError::MalformedYaml {
        path: path.to_path_buf(),
        what: what.to_string(),
        source,
    })
}
