//! Variable routes: ordered, regex-constrained matchers.
//!
//! A [`Route`] combines a handler with optional method, host, path and query
//! constraints, evaluated in that order. Routes are collected in a
//! [`RouteSet`] and tried in registration order. A route may also hold a
//! nested `RouteSet` (a subrouter) that is consulted once the outer
//! constraints pass.
//!
//! # Method mismatches
//!
//! A route whose only failing constraint is the method does not stop the
//! search. It records [`MatchError::MethodMismatch`] and the set keeps
//! going, so a later route accepting the method still wins. A mismatch left
//! over at the end tells the caller to answer 405 rather than 404.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use smallvec::SmallVec;

use super::regexp::{RegexpGroup, RegexpKind, RegexpOptions, RouteRegexp};
use crate::error::{Result, RouterError};
use crate::handler::Handler;
use crate::middleware::{Middleware, MiddlewareChain};
use crate::server::Request;

/// Why a resolution ended without a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchError {
    /// Nothing matched the request
    NotFound,
    /// A route matched everything except the method
    MethodMismatch,
}

/// Outcome of matching a request against routes
///
/// Filled in progressively while routes are tried; `vars` is only allocated
/// once a template actually captures something.
#[derive(Default, Clone)]
pub struct RouteMatch<'r> {
    /// The route that matched, if any
    pub route: Option<&'r Route>,
    /// Handler to run: the route's own, a redirect, or a fallback
    pub handler: Option<Handler>,
    /// Variables captured by host, path and query templates
    pub vars: Option<HashMap<String, String>>,
    /// Set when no route accepted the request
    pub error: Option<MatchError>,
}

impl std::fmt::Debug for RouteMatch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatch")
            .field("route", &self.route.map(Route::describe))
            .field("handler", &self.handler.is_some())
            .field("vars", &self.vars)
            .field("error", &self.error)
            .finish()
    }
}

/// A handler guarded by method, host, path and query constraints
pub struct Route {
    name: Option<String>,
    handler: Option<Handler>,
    /// Accepted methods; empty accepts any
    methods: SmallVec<[Method; 2]>,
    regexp: RegexpGroup,
    subroutes: Option<RouteSet>,
    build_only: bool,
    skip_clean: bool,
    scheme: Option<String>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("host", &self.regexp.host.as_ref().map(RouteRegexp::template))
            .field("path", &self.regexp.path.as_ref().map(RouteRegexp::template))
            .field("build_only", &self.build_only)
            .finish_non_exhaustive()
    }
}

impl Route {
    /// Start describing a route
    #[must_use]
    pub fn builder() -> RouteBuilder {
        RouteBuilder::default()
    }

    /// Route name used for URL building
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The route's own handler
    #[must_use]
    pub fn handler(&self) -> Option<&Handler> {
        self.handler.as_ref()
    }

    /// Accepted methods; empty means any method
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Path template, if the route has one
    #[must_use]
    pub fn path_template(&self) -> Option<&str> {
        self.regexp.path.as_ref().map(RouteRegexp::template)
    }

    /// Host template, if the route has one
    #[must_use]
    pub fn host_template(&self) -> Option<&str> {
        self.regexp.host.as_ref().map(RouteRegexp::template)
    }

    /// Whether the request path is used as-is without cleaning
    #[must_use]
    pub fn skips_clean(&self) -> bool {
        self.skip_clean
    }

    /// Nested routes consulted after this route's constraints pass
    #[must_use]
    pub fn subroutes(&self) -> Option<&RouteSet> {
        self.subroutes.as_ref()
    }

    /// `METHOD host path` summary for logs and route dumps
    #[must_use]
    pub fn describe(&self) -> String {
        let methods = if self.methods.is_empty() {
            "*".to_string()
        } else {
            self.methods
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(",")
        };
        format!(
            "{methods} {}{}",
            self.host_template().unwrap_or(""),
            self.path_template().unwrap_or("")
        )
    }

    /// Test the request against this route, updating `m`.
    ///
    /// Constraints run in order: method, host, path, queries, then the
    /// subrouter. A method failure is only remembered; any other failure
    /// ends the attempt and clears a stale `NotFound` left by a subrouter.
    pub fn matches<'r>(&'r self, request: &Request, m: &mut RouteMatch<'r>) -> bool {
        if self.build_only {
            return false;
        }

        let method_mismatch = !self.methods.is_empty() && !self.methods.contains(request.method());

        let regexps = self
            .regexp
            .host
            .iter()
            .chain(self.regexp.path.iter())
            .chain(self.regexp.queries.iter());

        for regexp in regexps {
            if !regexp.matches(request) {
                if m.error == Some(MatchError::NotFound) {
                    m.error = None;
                }
                return false;
            }
        }

        if let Some(subroutes) = &self.subroutes {
            if !subroutes.match_request(request, m) {
                if m.error == Some(MatchError::NotFound) {
                    m.error = None;
                }
                return false;
            }
        }

        if method_mismatch {
            m.error = Some(MatchError::MethodMismatch);
            return false;
        }

        // An earlier route mismatched on method but this one accepts it
        if m.error == Some(MatchError::MethodMismatch) && self.handler.is_some() {
            m.error = None;
            m.handler.clone_from(&self.handler);
        }

        if m.route.is_none() {
            m.route = Some(self);
        }
        if m.handler.is_none() {
            m.handler.clone_from(&self.handler);
        }

        self.regexp.set_match(request, m);
        true
    }

    /// Build a URL from this route's templates.
    ///
    /// `pairs` supplies a value for every variable in the host, path and
    /// query templates. Each value must satisfy its variable's pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::BuildUrl`] when the route has no host or path
    /// template, a variable is missing, or a value does not match.
    pub fn url(&self, pairs: &[(&str, &str)]) -> Result<String> {
        if self.regexp.host.is_none() && self.regexp.path.is_none() {
            return Err(RouterError::BuildUrl(
                "route has neither a host nor a path template".to_string(),
            ));
        }

        let values: HashMap<&str, &str> = pairs.iter().copied().collect();
        let mut url = String::new();

        if let Some(host) = &self.regexp.host {
            let scheme = self.scheme.as_deref().unwrap_or("http");
            url.push_str(scheme);
            url.push_str("://");
            url.push_str(&host.build(&values)?);
        }

        if let Some(path) = &self.regexp.path {
            url.push_str(&path.build(&values)?);
        }

        let queries = self
            .regexp
            .queries
            .iter()
            .map(|q| q.build(&values))
            .collect::<Result<Vec<_>>>()?;
        if !queries.is_empty() {
            url.push('?');
            url.push_str(&queries.join("&"));
        }

        Ok(url)
    }
}

/// Describes a [`Route`] before its templates are compiled
#[derive(Default)]
pub struct RouteBuilder {
    name: Option<String>,
    methods: SmallVec<[Method; 2]>,
    host: Option<String>,
    path: Option<(String, RegexpKind)>,
    queries: Vec<(String, String)>,
    options: RegexpOptions,
    skip_clean: bool,
    build_only: bool,
    scheme: Option<String>,
}

impl RouteBuilder {
    /// Name the route so it can be found with [`RouteSet::named`]
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Accept this method (may be called repeatedly)
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    /// Accept any of these methods
    #[must_use]
    pub fn methods(self, methods: impl IntoIterator<Item = Method>) -> Self {
        methods.into_iter().fold(self, Self::method)
    }

    /// Host template, e.g. `{subdomain}.example.com`
    #[must_use]
    pub fn host(mut self, template: impl Into<String>) -> Self {
        self.host = Some(template.into());
        self
    }

    /// Path template, e.g. `/articles/{id:[0-9]+}`
    #[must_use]
    pub fn path(mut self, template: impl Into<String>) -> Self {
        self.path = Some((template.into(), RegexpKind::Path));
        self
    }

    /// Path prefix template; the rest of the path is unconstrained
    #[must_use]
    pub fn path_prefix(mut self, template: impl Into<String>) -> Self {
        self.path = Some((template.into(), RegexpKind::PathPrefix));
        self
    }

    /// Require query key `key` with a value matching `value` (may be empty)
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.queries.push((key.into(), value.into()));
        self
    }

    /// Redirect between `/path` and `/path/` to the form the template uses
    #[must_use]
    pub fn strict_slash(mut self, enabled: bool) -> Self {
        self.options.strict_slash = enabled;
        self
    }

    /// Match the raw percent-encoded path
    #[must_use]
    pub fn use_encoded_path(mut self, enabled: bool) -> Self {
        self.options.use_encoded_path = enabled;
        self
    }

    /// Keep the route's path as written (no cleaning)
    #[must_use]
    pub fn skip_clean(mut self, enabled: bool) -> Self {
        self.skip_clean = enabled;
        self
    }

    /// Only use this route for URL building, never for matching
    #[must_use]
    pub fn build_only(mut self) -> Self {
        self.build_only = true;
        self
    }

    /// Scheme used when building URLs with a host (default `http`)
    #[must_use]
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Compile the templates and attach `handler`.
    ///
    /// # Errors
    ///
    /// Returns the first template compilation error.
    pub fn handler(self, handler: Handler) -> Result<Route> {
        self.finish(Some(handler), None)
    }

    /// Compile the templates and delegate to `routes` once they pass
    ///
    /// # Errors
    ///
    /// Returns the first template compilation error.
    pub fn subrouter(self, routes: RouteSet) -> Result<Route> {
        self.finish(None, Some(routes))
    }

    fn finish(self, handler: Option<Handler>, subroutes: Option<RouteSet>) -> Result<Route> {
        let host = self
            .host
            .map(|tpl| RouteRegexp::new(&tpl, RegexpKind::Host, self.options))
            .transpose()?;
        let path = self
            .path
            .map(|(tpl, kind)| RouteRegexp::new(&tpl, kind, self.options))
            .transpose()?;
        let queries = self
            .queries
            .iter()
            .map(|(key, value)| {
                RouteRegexp::new(&format!("{key}={value}"), RegexpKind::Query, self.options)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Route {
            name: self.name,
            handler,
            methods: self.methods,
            regexp: RegexpGroup {
                host,
                path,
                queries,
            },
            subroutes,
            build_only: self.build_only,
            skip_clean: self.skip_clean,
            scheme: self.scheme,
        })
    }
}

/// Ordered list of variable routes with its own middleware and fallbacks
#[derive(Default)]
pub struct RouteSet {
    routes: Vec<Route>,
    middlewares: MiddlewareChain,
    not_found: Option<Handler>,
    method_not_allowed: Option<Handler>,
}

impl RouteSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route; earlier routes take precedence
    pub fn push(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Wrap handlers matched in this set
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(middleware);
    }

    /// Handler used when nothing in this set matches
    pub fn set_not_found_handler(&mut self, handler: Handler) {
        self.not_found = Some(handler);
    }

    /// Handler used when only the method was wrong
    pub fn set_method_not_allowed_handler(&mut self, handler: Handler) {
        self.method_not_allowed = Some(handler);
    }

    /// Number of routes at this level
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the set has no routes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes in precedence order
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Find a route by name, searching subrouters depth-first
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find_map(|route| {
            if route.name() == Some(name) {
                return Some(route);
            }
            route.subroutes.as_ref().and_then(|sub| sub.named(name))
        })
    }

    /// Try every route in order.
    ///
    /// On a clean match the handler is wrapped in this set's middleware.
    /// With no match, a configured fallback handler is returned together
    /// with the error so the caller can tell it apart from a real match.
    pub fn match_request<'r>(&'r self, request: &Request, m: &mut RouteMatch<'r>) -> bool {
        for route in &self.routes {
            if route.matches(request, m) {
                if m.error.is_none() {
                    if let Some(handler) = m.handler.take() {
                        m.handler = Some(self.middlewares.then(handler));
                    }
                }
                return true;
            }
        }

        if m.error == Some(MatchError::MethodMismatch) {
            if let Some(handler) = &self.method_not_allowed {
                m.handler = Some(Arc::clone(handler));
                return true;
            }
            return false;
        }

        if let Some(handler) = &self.not_found {
            m.handler = Some(Arc::clone(handler));
            m.error = Some(MatchError::NotFound);
            return true;
        }

        m.error = Some(MatchError::NotFound);
        false
    }
}
