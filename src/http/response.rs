//! Response construction from mock definitions.
//!
//! # Responsibilities
//! - Apply configured headers, then status, then the JSON body
//! - Produce the plain-text 404 for unmatched requests
//!
//! # Design Decisions
//! - Invalid header names/values are skipped with a warning, not fatal
//! - `Content-Type: application/json` is added only when a body is present
//!   and the mock does not set its own content type

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::config::ResponseSpec;

/// Body of the 404 returned when no mock matches.
pub const NO_MATCH_BODY: &str = "No matching mock found";

/// Build the HTTP response described by a mock entry.
pub fn mock_response(spec: &ResponseSpec) -> Response {
    let mut response = Response::new(Body::empty());

    let headers = response.headers_mut();
    for (name, value) in &spec.headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Skipping invalid mock response header"),
        }
    }

    *response.status_mut() = StatusCode::from_u16(spec.status_code).unwrap_or_else(|_| {
        tracing::warn!(status = spec.status_code, "Invalid mock status code, answering 500");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    if let Some(body) = &spec.body {
        match serde_json::to_vec(body) {
            Ok(bytes) => {
                response
                    .headers_mut()
                    .entry(header::CONTENT_TYPE)
                    .or_insert(HeaderValue::from_static("application/json"));
                *response.body_mut() = Body::from(bytes);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize mock response body");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    response
}

/// The 404 returned when no mock matches.
pub fn no_match() -> Response {
    (StatusCode::NOT_FOUND, NO_MATCH_BODY).into_response()
}
