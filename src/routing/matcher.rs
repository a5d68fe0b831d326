//! Mock matching logic.
//!
//! # Responsibilities
//! - Match HTTP method (case-insensitive)
//! - Match path (exact, case-sensitive)
//! - Match expected JSON body fields (subset semantics)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - No wildcards or templates in paths
//! - The request body is parsed at most once per request, and only when a
//!   body condition is evaluated
//! - An unparsable body never matches a body condition; it is not an error

use std::cell::OnceCell;

use serde_json::{Map, Value};

/// The parts of an incoming request that mocks match on.
pub struct RequestView<'a> {
    method: &'a str,
    path: &'a str,
    body: &'a [u8],
    parsed: OnceCell<Option<Value>>,
}

impl<'a> RequestView<'a> {
    pub fn new(method: &'a str, path: &'a str, body: &'a [u8]) -> Self {
        Self {
            method,
            path,
            body,
            parsed: OnceCell::new(),
        }
    }

    pub fn method(&self) -> &str {
        self.method
    }

    pub fn path(&self) -> &str {
        self.path
    }

    /// The body as JSON, or `None` when it is not valid JSON.
    pub fn json(&self) -> Option<&Value> {
        self.parsed
            .get_or_init(|| serde_json::from_slice(self.body).ok())
            .as_ref()
    }
}

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &RequestView<'_>) -> bool;
}

/// Matches the HTTP method.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    method: String,
}

impl MethodMatcher {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
        }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, req: &RequestView<'_>) -> bool {
        req.method().eq_ignore_ascii_case(&self.method)
    }
}

/// Matches the request path exactly.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    path: String,
}

impl PathMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, req: &RequestView<'_>) -> bool {
        req.path() == self.path
    }
}

/// Requires every expected field to be present in the JSON body.
#[derive(Debug, Clone)]
pub struct BodySubsetMatcher {
    expected: Map<String, Value>,
}

impl BodySubsetMatcher {
    pub fn new(expected: Map<String, Value>) -> Self {
        Self { expected }
    }
}

impl Matcher for BodySubsetMatcher {
    fn matches(&self, req: &RequestView<'_>) -> bool {
        match req.json() {
            Some(Value::Object(actual)) => object_contains(actual, &self.expected),
            _ => false,
        }
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &RequestView<'_>) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}

/// True when every key of `expected` is in `actual` with a matching value.
///
/// Nested objects recurse with the same rule; arrays and scalars must be
/// equal. Keys only present in `actual` are ignored.
pub fn object_contains(actual: &Map<String, Value>, expected: &Map<String, Value>) -> bool {
    expected.iter().all(|(key, want)| match (actual.get(key), want) {
        (Some(Value::Object(got)), Value::Object(want)) => object_contains(got, want),
        (Some(got), want) => values_equal(got, want),
        (None, _) => false,
    })
}

/// Structural equality where numbers compare by value (`1` equals `1.0`).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expect(value: Value) -> BodySubsetMatcher {
        match value {
            Value::Object(map) => BodySubsetMatcher::new(map),
            _ => panic!("expected an object"),
        }
    }

    fn body_matches(matcher: &BodySubsetMatcher, body: &str) -> bool {
        matcher.matches(&RequestView::new("POST", "/", body.as_bytes()))
    }

    #[test]
    fn test_method_matcher() {
        let matcher = MethodMatcher::new("post");
        assert!(matcher.matches(&RequestView::new("POST", "/", b"")));
        assert!(matcher.matches(&RequestView::new("post", "/", b"")));
        assert!(!matcher.matches(&RequestView::new("GET", "/", b"")));
    }

    #[test]
    fn test_path_matcher_is_exact() {
        let matcher = PathMatcher::new("/api/users");
        assert!(matcher.matches(&RequestView::new("GET", "/api/users", b"")));
        assert!(!matcher.matches(&RequestView::new("GET", "/api/users/1", b"")));
        assert!(!matcher.matches(&RequestView::new("GET", "/API/users", b"")));
    }

    #[test]
    fn body_is_a_subset_match() {
        let matcher = expect(json!({"a": 1}));
        assert!(body_matches(&matcher, r#"{"a": 1, "b": 2}"#));
        assert!(!body_matches(&matcher, r#"{"b": 2}"#));
        assert!(!body_matches(&matcher, r#"{"a": 2}"#));
    }

    #[test]
    fn nested_objects_recurse() {
        let matcher = expect(json!({"a": {"x": 1}}));
        assert!(body_matches(&matcher, r#"{"a": {"x": 1, "y": 2}}"#));
        assert!(!body_matches(&matcher, r#"{"a": {"y": 2}}"#));
        assert!(!body_matches(&matcher, r#"{"a": 1}"#));
    }

    #[test]
    fn arrays_need_exact_equality() {
        let matcher = expect(json!({"tags": ["a", "b"]}));
        assert!(body_matches(&matcher, r#"{"tags": ["a", "b"]}"#));
        assert!(!body_matches(&matcher, r#"{"tags": ["a", "b", "c"]}"#));
        assert!(!body_matches(&matcher, r#"{"tags": ["b", "a"]}"#));
    }

    #[test]
    fn numbers_compare_by_value() {
        let matcher = expect(json!({"n": 1}));
        assert!(body_matches(&matcher, r#"{"n": 1.0}"#));
    }

    #[test]
    fn invalid_json_never_matches() {
        let matcher = expect(json!({"a": 1}));
        assert!(!body_matches(&matcher, "a=1"));
        assert!(!body_matches(&matcher, ""));
        assert!(!body_matches(&matcher, "[1, 2]"));
    }

    #[test]
    fn and_matcher_requires_all() {
        let matcher = AndMatcher::new(vec![
            Box::new(MethodMatcher::new("GET")),
            Box::new(PathMatcher::new("/ping")),
        ]);
        assert!(matcher.matches(&RequestView::new("GET", "/ping", b"")));
        assert!(!matcher.matches(&RequestView::new("GET", "/pong", b"")));
        assert!(!matcher.matches(&RequestView::new("PUT", "/ping", b"")));
    }
}
