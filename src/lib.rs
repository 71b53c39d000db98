//! # triemux
//!
//! **triemux** is an HTTP request router built around a per-method prefix
//! trie, with regex-constrained routes for the cases a trie cannot express.
//!
//! ## Overview
//!
//! A request is matched in two stages:
//!
//! 1. **Variable routes** registered with [`Router::route`] (or any pattern
//!    containing `{name}`) are tried in registration order. They can
//!    constrain the host, the path (with per-segment regular expressions) and
//!    query parameters, redirect on a trailing-slash mismatch and nest
//!    subrouters.
//! 2. **The tree** for the request method resolves literal, `:param` and
//!    `*wildcard` patterns in a single pass over the path.
//!
//! When neither stage produces a handler the request is answered with
//! `405 Method Not Allowed` if some other method would have matched, and
//! `404 Not Found` otherwise.
//!
//! ## Architecture
//!
//! - **[`router`]** - Prefix trees, variable routes and request resolution
//! - **[`context`]** - Pooled per-request [`Context`] handed to handlers
//! - **[`middleware`]** - Handler wrappers, applied on successful matches
//! - **[`server`]** - [`AppService`] request lifecycle and the response
//!   encoder (ETag, `304`, cache policy and gzip)
//! - **[`runtime_config`]** - Environment-driven tuning
//! - **[`logging`]** - `tracing` subscriber setup
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant T as Transport
//!     participant S as AppService
//!     participant P as Context pool
//!     participant R as Router
//!     participant M as Middleware
//!     participant H as Handler
//!     participant E as ResponseEncoder
//!
//!     T->>S: handle(Request)
//!     S->>P: acquire (reset)
//!     S->>S: rewrite hooks, clean path
//!     S->>R: resolve(request, params)
//!     R-->>S: handler / MethodMismatch / NotFound
//!     S->>M: wrap handler (clean match only)
//!     S->>H: handler(ctx)
//!     H->>E: ctx.text / ctx.json / ctx.bytes
//!     E-->>H: ETag, 304 or gzip
//!     S->>P: release
//!     S-->>T: Response
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use triemux::{AppService, Router, RuntimeConfig};
//!
//! let mut router = Router::new();
//! router.get("/", |ctx| Ok(ctx.text("Hello World")?))?;
//! router.get("/user/:name", |ctx| {
//!     let name = ctx.get("name").to_string();
//!     Ok(ctx.text(name)?)
//! })?;
//! router.add_route(
//!     router
//!         .route()
//!         .method(Method::GET)
//!         .path("/hello")
//!         .query("name", "{name}")
//!         .handler(triemux::handler(|ctx| Ok(ctx.text(ctx.get("name").to_string())?)))?,
//! );
//!
//! let service = AppService::new(router, RuntimeConfig::from_env());
//! let response = service.handle_http(http_request);
//! ```
//!
//! ## Runtime Considerations
//!
//! The crate performs no I/O. Registration takes `&mut Router` and must be
//! finished before the router is moved into an [`AppService`]; after that
//! everything is read-only except the context and compressor pools, so one
//! service can be shared across any number of worker threads.

pub mod context;
pub mod error;
mod handler;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod router;
pub mod runtime_config;
pub mod server;

pub use context::Context;
pub use error::{Result, RouterError};
pub use handler::{handler, Handler, HandlerResult};
pub use router::{Route, RouteSet, Router};
pub use runtime_config::RuntimeConfig;
pub use server::{AppService, Request, Response};
