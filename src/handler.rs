//! Handler signature shared by routes, middleware and fallbacks.

use std::sync::Arc;

use http::StatusCode;

use crate::context::Context;

/// Result returned by every handler.
///
/// Errors are opaque to the router; they are passed to the service's error
/// observers and never logged or rendered by the router itself.
pub type HandlerResult = anyhow::Result<()>;

/// A request handler.
///
/// Handlers receive the pooled [`Context`] of the current request and write
/// the response through it.
pub type Handler = Arc<dyn Fn(&mut Context) -> HandlerResult + Send + Sync>;

/// Box a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Handler that answers with `status` and a `Location` header
pub(crate) fn redirect_handler(location: String, status: StatusCode) -> Handler {
    Arc::new(move |ctx: &mut Context| {
        ctx.redirect(status, &location);
        Ok(())
    })
}
