//! Handler wrappers applied around successfully matched routes.
//!
//! A [`MiddlewareChain`] folds its entries so the last one registered ends up
//! outermost. Fallback handlers never pass through it.

mod core;
mod tracing;

pub use self::core::{Middleware, MiddlewareChain};
pub use self::tracing::TracingMiddleware;
