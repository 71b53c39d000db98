use std::sync::Arc;

use crate::handler::Handler;

/// Wraps a handler with behaviour that runs around it.
///
/// Any `Fn(Handler) -> Handler` closure is a middleware:
///
/// ```rust,ignore
/// router.use_middleware(|next: Handler| -> Handler {
///     Arc::new(move |ctx| {
///         ctx.set_header(header::SERVER, HeaderValue::from_static("triemux"));
///         next(ctx)
///     })
/// });
/// ```
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: Handler) -> Handler;
}

impl<F> Middleware for F
where
    F: Fn(Handler) -> Handler + Send + Sync,
{
    fn wrap(&self, next: Handler) -> Handler {
        self(next)
    }
}

/// Ordered list of middleware.
///
/// Applied with [`then`](Self::then) so that the last-registered middleware
/// ends up outermost and runs first.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<M: Middleware + 'static>(&mut self, middleware: M) {
        self.layers.push(Arc::new(middleware));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wrap `handler` in every layer
    #[must_use]
    pub fn then(&self, handler: Handler) -> Handler {
        self.layers
            .iter()
            .fold(handler, |next, layer| layer.wrap(next))
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("layers", &self.layers.len())
            .finish()
    }
}
