//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check value ranges (ports, status codes) and allowed HTTP methods
//! - Detect duplicate service names and duplicate endpoints
//!
//! # Design Decisions
//! - Returns all issues, not just the first
//! - Validation is a pure function producing a report; callers decide what
//!   is fatal (the whole global config, or a single service)
//! - Duplicate endpoints are warnings: first match wins at serve time

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::config::schema::{GlobalConfig, MockEntry, ServiceConfig};

const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// A single field-scoped finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub file: String,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.file, self.field, self.message)
    }
}

/// All findings for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, file: &str, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            file: file.to_string(),
            field: field.into(),
            message: message.into(),
        });
    }

    fn warning(&mut self, file: &str, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            file: file.to_string(),
            field: field.into(),
            message: message.into(),
        });
    }

    /// Emit every warning through `tracing`.
    pub fn log_warnings(&self) {
        for w in &self.warnings {
            tracing::warn!(file = %w.file, field = %w.field, "{}", w.message);
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            write!(f, "{} {}", if i == 0 { ":" } else { ";" }, err)?;
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Validate the root service list.
pub fn validate_global(config: &GlobalConfig, path: &Path) -> ValidationReport {
    let file = file_name(path);
    let mut report = ValidationReport::default();

    if config.services.is_empty() {
        report.error(&file, "services", "no services defined, at least one service must be specified");
    }

    let mut seen = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        let prefix = format!("services[{i}]");
        if service.name.trim().is_empty() {
            report.error(&file, format!("{prefix}.name"), "service name cannot be empty");
        } else if !seen.insert(service.name.as_str()) {
            report.error(
                &file,
                format!("{prefix}.name"),
                format!("duplicate service name '{}'", service.name),
            );
        }
        if service.usecase.trim().is_empty() {
            report.error(&file, format!("{prefix}.usecase"), "usecase cannot be empty");
        }
    }

    report
}

/// Validate one service's settings.
pub fn validate_service(config: &ServiceConfig, path: &Path) -> ValidationReport {
    let file = file_name(path);
    let mut report = ValidationReport::default();

    if config.name.trim().is_empty() {
        report.error(&file, "name", "service name cannot be empty");
    }

    if config.port <= 0 {
        report.error(&file, "port", format!("invalid port number: {}, must be positive", config.port));
    } else if !(1024..=65535).contains(&config.port) {
        report.error(
            &file,
            "port",
            format!("port number {} outside of allowed range (1024-65535)", config.port),
        );
    }

    let delay = &config.delay;
    if delay.enabled && delay.fixed.unwrap_or(0) == 0 {
        if let (Some(min), Some(max)) = (delay.min, delay.max) {
            if min > max {
                report.warning(
                    &file,
                    "delay",
                    format!("min ({min}) exceeds max ({max}), no delay will be applied"),
                );
            }
        }
    }

    report
}

/// Validate a usecase's mock list.
pub fn validate_mocks(mocks: &[MockEntry], path: &Path) -> ValidationReport {
    let file = file_name(path);
    let mut report = ValidationReport::default();

    if mocks.is_empty() {
        report.error(&file, "", "no mock configurations found");
    }

    let mut endpoints = HashSet::new();
    for (i, mock) in mocks.iter().enumerate() {
        let prefix = format!("[{i}]");
        let request = &mock.request;

        if request.path.is_empty() {
            report.error(&file, format!("{prefix}.request.path"), "path cannot be empty");
        } else if !request.path.starts_with('/') {
            report.error(
                &file,
                format!("{prefix}.request.path"),
                format!("path '{}' must start with '/'", request.path),
            );
        }

        let method = request.method.to_ascii_uppercase();
        if method.is_empty() {
            report.error(&file, format!("{prefix}.request.method"), "method cannot be empty");
        } else if !ALLOWED_METHODS.contains(&method.as_str()) {
            report.error(
                &file,
                format!("{prefix}.request.method"),
                format!("invalid HTTP method '{}'", request.method),
            );
        }

        if !endpoints.insert((method, request.path.clone())) {
            report.warning(
                &file,
                format!("{prefix}.request"),
                format!(
                    "duplicate endpoint {} {}, earlier entries take precedence",
                    request.method, request.path
                ),
            );
        }

        let status = mock.response.status_code;
        if !(100..=599).contains(&status) {
            report.error(
                &file,
                format!("{prefix}.response.statusCode"),
                format!("invalid HTTP status code: {status}"),
            );
        }
    }

    report
}
