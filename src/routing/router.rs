//! Mock lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled mock entries in file order
//! - Look up the first entry matching a request
//! - Return the matched response plus its delay, or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in file order; first match wins
//! - A changed mock set means a new router, never mutation in place

use std::time::Duration;

use crate::config::{DelayConfig, MockEntry, ResponseSpec};
use crate::routing::delay::compute_delay;
use crate::routing::matcher::{
    AndMatcher, BodySubsetMatcher, Matcher, MethodMatcher, PathMatcher, RequestView,
};

/// One mock entry, ready for matching.
#[derive(Debug)]
pub struct CompiledMock {
    matcher: AndMatcher,
    method: String,
    path: String,
    response: ResponseSpec,
}

impl CompiledMock {
    fn compile(entry: &MockEntry) -> Self {
        let request = &entry.request;
        let mut matchers: Vec<Box<dyn Matcher>> = vec![
            Box::new(MethodMatcher::new(request.method.clone())),
            Box::new(PathMatcher::new(request.path.clone())),
        ];
        if let Some(body) = &request.body {
            matchers.push(Box::new(BodySubsetMatcher::new(body.clone())));
        }

        Self {
            matcher: AndMatcher::new(matchers),
            method: request.method.to_ascii_uppercase(),
            path: request.path.clone(),
            response: entry.response.clone(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn response(&self) -> &ResponseSpec {
        &self.response
    }
}

/// The outcome of a successful lookup.
#[derive(Debug)]
pub struct MockMatch<'a> {
    /// Position of the entry in the mock file.
    pub index: usize,
    pub response: &'a ResponseSpec,
    /// How long to wait before responding.
    pub delay: Duration,
}

/// Immutable request table of one service usecase.
#[derive(Debug)]
pub struct MockRouter {
    mocks: Vec<CompiledMock>,
    delay: DelayConfig,
}

impl MockRouter {
    /// Compile a mock list, preserving file order.
    pub fn new(mocks: &[MockEntry], delay: DelayConfig) -> Self {
        Self {
            mocks: mocks.iter().map(CompiledMock::compile).collect(),
            delay,
        }
    }

    pub fn len(&self) -> usize {
        self.mocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mocks.is_empty()
    }

    pub fn mocks(&self) -> &[CompiledMock] {
        &self.mocks
    }

    /// First entry matching the request, without computing a delay.
    pub fn find(&self, req: &RequestView<'_>) -> Option<(usize, &CompiledMock)> {
        self.mocks
            .iter()
            .enumerate()
            .find(|(_, mock)| mock.matcher.matches(req))
    }

    /// Look up a request and compute the delay for the matched response.
    pub fn match_request(&self, method: &str, path: &str, body: &[u8]) -> Option<MockMatch<'_>> {
        let req = RequestView::new(method, path, body);
        let (index, mock) = self.find(&req)?;
        Some(MockMatch {
            index,
            response: &mock.response,
            delay: compute_delay(&self.delay, &mut rand::thread_rng()),
        })
    }
}
