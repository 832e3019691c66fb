//! Route lookup.
//!
//! # Responsibilities
//! - Store the frozen routes
//! - Look up the route for a request path
//! - Return matched route or explicit NotFound
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) exact lookup via HashMap, tried before any prefix
//! - O(n) prefix scan over routes sorted longest pattern first

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::pipeline::Pipeline;
use crate::routing::matcher::normalize;
use crate::routing::PathMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteKind {
    Service,
    Proxy,
    Static,
}

/// A pattern bound to a pipeline.
#[derive(Debug)]
pub struct Route {
    matcher: PathMatcher,
    name: String,
    kind: RouteKind,
    secured: bool,
    pipeline: Arc<Pipeline>,
}

impl Route {
    pub fn new(
        matcher: PathMatcher,
        name: impl Into<String>,
        kind: RouteKind,
        secured: bool,
        pipeline: Arc<Pipeline>,
    ) -> Self {
        Self {
            matcher,
            name: name.into(),
            kind,
            secured,
            pipeline,
        }
    }

    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    pub fn is_secured(&self) -> bool {
        self.secured
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }
}

#[derive(Debug)]
pub enum Resolution<'a> {
    Matched(&'a Arc<Route>),
    NotFound,
}

/// Frozen routing table.
#[derive(Debug)]
pub struct RoutingTable {
    exact: HashMap<String, Arc<Route>>,
    /// Longest pattern first; equal lengths keep registration order.
    prefixes: Vec<Arc<Route>>,
    not_managed: Arc<Pipeline>,
}

impl RoutingTable {
    pub(crate) fn new(
        exact: HashMap<String, Arc<Route>>,
        mut prefixes: Vec<Arc<Route>>,
        not_managed: Arc<Pipeline>,
    ) -> Self {
        prefixes.sort_by(|a, b| b.pattern().len().cmp(&a.pattern().len()));
        Self {
            exact,
            prefixes,
            not_managed,
        }
    }

    pub fn resolve(&self, path: &str) -> Resolution<'_> {
        if let Some(route) = self.exact.get(normalize(path)) {
            return Resolution::Matched(route);
        }
        match self.prefixes.iter().find(|route| route.matcher().matches(path)) {
            Some(route) => Resolution::Matched(route),
            None => Resolution::NotFound,
        }
    }

    /// Pipeline for requests no route matched.
    pub fn not_managed(&self) -> &Arc<Pipeline> {
        &self.not_managed
    }

    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.exact.values().chain(self.prefixes.iter())
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
