//! Router core module - hot path for request routing.
//!
//! This module is part of the request hot path. Trie lookups write into the
//! context's pre-allocated parameter slots and must not allocate, so the
//! following lints are denied:
//!
//! - `clippy::inefficient_to_string` - Catches unnecessary allocations
//! - `clippy::format_push_string` - Prevents format! string building
//! - `clippy::unnecessary_to_owned` - Catches needless owned copies

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use std::sync::Arc;

use http::Method;
use smallvec::SmallVec;
use tracing::{debug, info};

use super::params::Params;
use super::route::{MatchError, Route, RouteBuilder, RouteMatch, RouteSet};
use super::tree::Tree;
use crate::context::Context;
use crate::error::{Result, RouterError};
use crate::handler::{Handler, HandlerResult};
use crate::middleware::Middleware;
use crate::server::Request;

/// The nine methods with a dedicated tree, in tree order
pub const METHODS: [Method; 9] = [
    Method::GET,
    Method::POST,
    Method::DELETE,
    Method::PUT,
    Method::PATCH,
    Method::HEAD,
    Method::CONNECT,
    Method::TRACE,
    Method::OPTIONS,
];

/// Index of the tree serving `method`
#[inline]
fn method_index(method: &Method) -> Option<usize> {
    match method.as_str() {
        "GET" => Some(0),
        "POST" => Some(1),
        "DELETE" => Some(2),
        "PUT" => Some(3),
        "PATCH" => Some(4),
        "HEAD" => Some(5),
        "CONNECT" => Some(6),
        "TRACE" => Some(7),
        "OPTIONS" => Some(8),
        _ => None,
    }
}

/// Request router: one prefix tree per method plus ordered variable routes.
///
/// Paths without `{` go into the tree for their method and are matched in
/// O(k) of the path length. Routes built with [`Route::builder`] (or paths
/// containing `{name}` templates) are matched in registration order and take
/// precedence over the trees, since they carry host, query or regex
/// constraints the trees cannot express.
///
/// Registration takes `&mut self` and must complete before serving; lookups
/// only need `&self`.
///
/// # Example
///
/// ```rust,ignore
/// let mut router = Router::new();
/// router.get("/", |ctx| Ok(ctx.text("Hello World")?))?;
/// router.get("/user/:id", |ctx| {
///     let id = ctx.get("id").to_string();
///     ctx.text(id)?;
///     Ok(())
/// })?;
/// router.get("/articles/{id:[0-9]+}", article)?;
/// ```
pub struct Router {
    trees: [Tree<Handler>; 9],
    routes: RouteSet,
    registered: Vec<(Method, String)>,
    skip_clean: bool,
    strict_slash: bool,
    use_encoded_path: bool,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a router without routes
    #[must_use]
    pub fn new() -> Self {
        Self {
            trees: std::array::from_fn(|_| Tree::new()),
            routes: RouteSet::new(),
            registered: Vec::new(),
            skip_clean: false,
            strict_slash: false,
            use_encoded_path: false,
        }
    }

    /// Register `handler` for `method` and `path`.
    ///
    /// Registering the same method and path again replaces the handler.
    ///
    /// # Errors
    ///
    /// - [`RouterError::UnknownMethod`] if `method` is not one of [`METHODS`]
    /// - [`RouterError::InvalidPattern`] for malformed patterns
    /// - [`RouterError::TooManyParams`] if the pattern has too many captures
    pub fn add(&mut self, method: Method, path: &str, handler: Handler) -> Result<()> {
        let index =
            method_index(&method).ok_or_else(|| RouterError::UnknownMethod(method.to_string()))?;

        if path.contains('{') {
            let route = self
                .route()
                .method(method.clone())
                .path(path)
                .handler(handler)?;
            self.routes.push(route);
        } else {
            self.trees[index].add(path, handler)?;
        }

        debug!(method = %method, path = %path, "Route registered");
        self.registered.push((method, path.to_string()));
        Ok(())
    }

    /// Register a closure for `method` and `path`
    ///
    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn handle<F>(&mut self, method: Method, path: &str, f: F) -> Result<()>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.add(method, path, crate::handler::handler(f))
    }

    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn get<F>(&mut self, path: &str, f: F) -> Result<()>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.handle(Method::GET, path, f)
    }

    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn post<F>(&mut self, path: &str, f: F) -> Result<()>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.handle(Method::POST, path, f)
    }

    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn put<F>(&mut self, path: &str, f: F) -> Result<()>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.handle(Method::PUT, path, f)
    }

    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn patch<F>(&mut self, path: &str, f: F) -> Result<()>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.handle(Method::PATCH, path, f)
    }

    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn delete<F>(&mut self, path: &str, f: F) -> Result<()>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.handle(Method::DELETE, path, f)
    }

    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn head<F>(&mut self, path: &str, f: F) -> Result<()>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.handle(Method::HEAD, path, f)
    }

    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn options<F>(&mut self, path: &str, f: F) -> Result<()>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.handle(Method::OPTIONS, path, f)
    }

    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn connect<F>(&mut self, path: &str, f: F) -> Result<()>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.handle(Method::CONNECT, path, f)
    }

    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn trace<F>(&mut self, path: &str, f: F) -> Result<()>
    where
        F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.handle(Method::TRACE, path, f)
    }

    /// Start a variable route inheriting this router's slash and encoding
    /// settings; finish it and pass it to [`add_route`](Self::add_route)
    #[must_use]
    pub fn route(&self) -> RouteBuilder {
        Route::builder()
            .strict_slash(self.strict_slash)
            .use_encoded_path(self.use_encoded_path)
            .skip_clean(self.skip_clean)
    }

    /// Append a variable route; earlier routes take precedence
    pub fn add_route(&mut self, route: Route) {
        debug!(route = %route.describe(), "Variable route registered");
        self.routes.push(route);
    }

    /// Wrap handlers of variable routes with `middleware`
    pub fn use_route_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.routes.use_middleware(middleware);
    }

    /// Variable routes in precedence order
    #[must_use]
    pub fn routes(&self) -> &RouteSet {
        &self.routes
    }

    /// Find a named variable route, e.g. to build a URL
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&Route> {
        self.routes.named(name)
    }

    /// Serve requests without cleaning their paths first
    pub fn set_skip_clean(&mut self, skip: bool) {
        self.skip_clean = skip;
    }

    #[must_use]
    pub fn skips_clean(&self) -> bool {
        self.skip_clean
    }

    /// Default strict-slash setting for routes created with [`route`](Self::route)
    pub fn set_strict_slash(&mut self, strict: bool) {
        self.strict_slash = strict;
    }

    /// Default encoded-path setting for routes created with [`route`](Self::route)
    pub fn set_use_encoded_path(&mut self, encoded: bool) {
        self.use_encoded_path = encoded;
    }

    /// Trie-only lookup for `method` and `path`.
    ///
    /// Unknown methods and misses return `None`; captures from a miss are
    /// rolled back.
    #[inline]
    pub fn lookup(&self, method: &Method, path: &str, params: &mut Params) -> Option<&Handler> {
        let tree = &self.trees[method_index(method)?];
        let mark = params.len();
        let found = tree.find(path, params);
        if found.is_none() {
            params.truncate(mark);
        }
        found
    }

    /// Resolve a request to a handler.
    ///
    /// Variable routes are tried first, in registration order, then the
    /// tree for the request method. When neither produces a handler the
    /// result carries [`MatchError::MethodMismatch`] if a variable route
    /// only failed on the method or another method's tree knows the path,
    /// and [`MatchError::NotFound`] otherwise.
    pub fn resolve<'r>(&'r self, request: &Request, params: &mut Params) -> RouteMatch<'r> {
        let mut m = RouteMatch::default();

        if !self.routes.is_empty() && self.routes.match_request(request, &mut m) {
            return m;
        }

        if let Some(handler) = self.lookup(request.method(), request.path(), params) {
            return RouteMatch {
                handler: Some(Arc::clone(handler)),
                ..RouteMatch::default()
            };
        }

        let method_mismatch = m.error == Some(MatchError::MethodMismatch)
            || self.path_known_elsewhere(request.method(), request.path(), params);

        RouteMatch {
            error: Some(if method_mismatch {
                MatchError::MethodMismatch
            } else {
                MatchError::NotFound
            }),
            ..RouteMatch::default()
        }
    }

    /// Whether a tree other than `method`'s resolves `path`
    fn path_known_elsewhere(&self, method: &Method, path: &str, params: &mut Params) -> bool {
        let own = method_index(method);
        let mark = params.len();
        self.trees
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != own)
            .any(|(_, tree)| {
                let hit = tree.find(path, params).is_some();
                params.truncate(mark);
                hit
            })
    }

    /// Methods whose tree resolves `path`, for an `Allow` header
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> SmallVec<[Method; 9]> {
        let mut params = Params::new();
        METHODS
            .iter()
            .zip(&self.trees)
            .filter(|(_, tree)| {
                let hit = tree.find(path, &mut params).is_some();
                params.clear();
                hit
            })
            .map(|(method, _)| method.clone())
            .collect()
    }

    /// All registered `(method, pattern)` pairs in registration order
    #[must_use]
    pub fn registered_routes(&self) -> &[(Method, String)] {
        &self.registered
    }

    /// Log all registered routes at info level
    ///
    /// Useful for verifying at startup that routes are loaded as expected.
    pub fn dump_routes(&self) {
        info!(
            routes_count = self.registered.len(),
            variable_routes = self.routes.len(),
            "Routing table loaded"
        );
        for (method, path) in &self.registered {
            info!(method = %method, path = %path, "Route");
        }
        for route in self.routes.iter().filter(|r| r.name().is_some()) {
            info!(
                name = route.name().unwrap_or_default(),
                route = %route.describe(),
                "Named route"
            );
        }
    }
}

/// Collapse `//`, `.` and `..` segments.
///
/// Returns `None` when `path` is already clean. A trailing slash is kept;
/// `..` never climbs above the root.
#[must_use]
pub fn clean_path(path: &str) -> Option<String> {
    if is_clean(path) {
        return None;
    }

    let mut segments: SmallVec<[&str; 16]> = SmallVec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut out = String::with_capacity(path.len() + 1);
    for segment in &segments {
        out.push('/');
        out.push_str(segment);
    }

    if out.is_empty() {
        out.push('/');
    } else if path.ends_with('/') {
        out.push('/');
    }

    Some(out)
}

fn is_clean(path: &str) -> bool {
    path.starts_with('/')
        && !path.contains("//")
        && !path.contains("/./")
        && !path.contains("/../")
        && !path.ends_with("/.")
        && !path.ends_with("/..")
}
