use std::sync::Arc;
use std::time::Instant;

use tracing::{field, info_span};

use super::Middleware;
use crate::context::Context;
use crate::handler::Handler;

/// Opens a `request` span around the wrapped handler and records the final
/// status and latency on it.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn wrap(&self, next: Handler) -> Handler {
        Arc::new(move |ctx: &mut Context| {
            let span = info_span!(
                "request",
                method = %ctx.request().method(),
                path = %ctx.path(),
                request_id = %ctx.request_id(),
                status = field::Empty,
                latency_us = field::Empty,
            );
            let _guard = span.enter();
            let started = Instant::now();

            let result = next(ctx);

            span.record("status", ctx.effective_status().as_u16());
            span.record("latency_us", started.elapsed().as_micros() as u64);
            result
        })
    }
}
