//! # Router Module
//!
//! Path matching and route resolution for triemux.
//!
//! ## Overview
//!
//! Two matchers work side by side:
//!
//! - **Trees** ([`Tree`]): one compact prefix trie per HTTP method for
//!   patterns like `/user/:id` or `/static/*filepath`. Lookup walks the path
//!   once and writes captures into the caller's [`Params`] slots.
//! - **Variable routes** ([`Route`], [`RouteSet`]): ordered matchers with
//!   regex-constrained `{name:pattern}` templates for host, path and query,
//!   strict-slash redirects, subrouters and reverse URL building.
//!
//! [`Router::resolve`] consults the variable routes first, then the tree for
//! the request method, and classifies a miss as [`MatchError::NotFound`] or
//! [`MatchError::MethodMismatch`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use triemux::router::{Params, Router};
//!
//! let mut router = Router::new();
//! router.get("/user/:name", |ctx| Ok(ctx.text(ctx.get("name").to_string())?))?;
//!
//! let mut params = Params::new();
//! let handler = router.lookup(&Method::GET, "/user/akira", &mut params);
//! assert!(handler.is_some());
//! assert_eq!(params.get("name"), Some("akira"));
//! ```
//!
//! ## Performance
//!
//! - Literal lookups do not allocate
//! - Parameter slots are reused across pooled requests
//! - Lookup cost is O(k) in the path length, independent of route count

mod core;
mod params;
mod regexp;
mod route;
mod tree;
#[cfg(test)]
mod tests;

pub use self::core::{clean_path, Router, METHODS};
pub use params::{Params, MAX_PARAMS};
pub use regexp::{RegexpKind, RegexpOptions, RouteRegexp};
pub use route::{MatchError, Route, RouteBuilder, RouteMatch, RouteSet};
pub use tree::Tree;
