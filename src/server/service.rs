use std::sync::Arc;
use std::time::Instant;

use http::header::{self, HeaderValue};
use http::StatusCode;
use tracing::{debug, warn};

use super::encoder::ResponseEncoder;
use super::{Request, Response};
use crate::context::{Context, Pool, SessionProvider};
use crate::handler::Handler;
use crate::middleware::{Middleware, MiddlewareChain};
use crate::router::{clean_path, MatchError, Router};
use crate::runtime_config::RuntimeConfig;

/// Called with the context and the error whenever a handler fails
pub type ErrorObserver = Box<dyn Fn(&mut Context, &anyhow::Error) + Send + Sync>;

/// Runs before path cleaning and resolution; may change the routing path
pub type RewriteHook = Box<dyn Fn(&mut Context) + Send + Sync>;

/// Serves requests against a [`Router`].
///
/// Each request gets a pooled [`Context`]; the service resolves the handler,
/// wraps it in the global middleware on a clean match, runs it and returns
/// the finished [`Response`]. The context goes back to the pool on every
/// exit path.
///
/// `AppService` is `Send + Sync` and meant to be shared behind an `Arc` by
/// whatever transport feeds it requests.
pub struct AppService {
    router: Router,
    middlewares: MiddlewareChain,
    contexts: Pool<Box<Context>>,
    encoder: Arc<ResponseEncoder>,
    not_found: Option<Handler>,
    method_not_allowed: Option<Handler>,
    on_error: Vec<ErrorObserver>,
    rewrites: Vec<RewriteHook>,
    sessions: Option<Arc<dyn SessionProvider>>,
    config: RuntimeConfig,
}

impl AppService {
    #[must_use]
    pub fn new(router: Router, config: RuntimeConfig) -> Self {
        let encoder = Arc::new(ResponseEncoder::new(&config));
        let shared = Arc::clone(&encoder);
        let contexts = Pool::new(config.context_pool_size, move || {
            Box::new(Context::new(Arc::clone(&shared)))
        });

        Self {
            router,
            middlewares: MiddlewareChain::new(),
            contexts,
            encoder,
            not_found: None,
            method_not_allowed: None,
            on_error: Vec::new(),
            rewrites: Vec::new(),
            sessions: None,
            config,
        }
    }

    /// Add a middleware around every successfully matched handler.
    ///
    /// The last middleware added is the outermost one.
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(middleware);
    }

    /// Observe handler errors; observers run in registration order
    pub fn on_error<F>(&mut self, observer: F)
    where
        F: Fn(&mut Context, &anyhow::Error) + Send + Sync + 'static,
    {
        self.on_error.push(Box::new(observer));
    }

    /// Register a hook that runs before routing.
    ///
    /// Hooks may call [`Context::set_path`] to route the request somewhere
    /// else without changing its URI.
    pub fn rewrite<F>(&mut self, hook: F)
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.rewrites.push(Box::new(hook));
    }

    pub fn set_not_found_handler(&mut self, handler: Handler) {
        self.not_found = Some(handler);
    }

    pub fn set_method_not_allowed_handler(&mut self, handler: Handler) {
        self.method_not_allowed = Some(handler);
    }

    pub fn set_session_provider(&mut self, provider: Arc<dyn SessionProvider>) {
        self.sessions = Some(provider);
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn encoder(&self) -> &ResponseEncoder {
        &self.encoder
    }

    /// Contexts waiting in the pool
    #[must_use]
    pub fn idle_contexts(&self) -> usize {
        self.contexts.idle()
    }

    /// Contexts created since the service started
    #[must_use]
    pub fn created_contexts(&self) -> usize {
        self.contexts.created()
    }

    /// Handle one request and return its response
    pub fn handle(&self, request: Request) -> Response {
        let started = Instant::now();
        let mut pooled = self.contexts.acquire();
        let ctx: &mut Context = &mut pooled;
        ctx.begin(request, self.sessions.clone());

        for hook in &self.rewrites {
            hook(ctx);
        }

        if !self.router.skips_clean() {
            if let Some(cleaned) = clean_path(ctx.path()) {
                let location = ctx.request().url_with_path(&cleaned);
                debug!(path = %ctx.path(), location = %location, "Redirecting to clean path");
                ctx.redirect(StatusCode::MOVED_PERMANENTLY, &location);
                return ctx.finish();
            }
        }

        let (handler, error, vars) = {
            let (request, params) = ctx.lookup_parts();
            let m = self.router.resolve(request, params);
            (m.handler, m.error, m.vars)
        };
        let resolved_in = started.elapsed();
        ctx.set_vars(vars);

        let handler = match (handler, error) {
            (Some(handler), None) => Some(self.middlewares.then(handler)),
            // Fallback handler supplied by a route set
            (Some(handler), Some(_)) => Some(handler),
            (None, Some(MatchError::MethodMismatch)) => {
                self.method_not_allowed.as_ref().map(Arc::clone).or_else(|| {
                    self.answer_method_not_allowed(ctx);
                    None
                })
            }
            (None, _) => self.not_found.as_ref().map(Arc::clone).or_else(|| {
                ctx.set_status(StatusCode::NOT_FOUND);
                None
            }),
        };

        if let Some(handler) = handler {
            ctx.set_handler(Some(Arc::clone(&handler)));
            if let Err(err) = handler(ctx) {
                for observer in &self.on_error {
                    observer(ctx, &err);
                }
            }
        }

        let response = ctx.finish();
        debug!(
            method = %ctx.request().method(),
            path = %ctx.path(),
            status = response.status().as_u16(),
            matched = error.is_none(),
            resolve_us = resolved_in.as_micros() as u64,
            total_us = started.elapsed().as_micros() as u64,
            "Request handled"
        );
        if resolved_in > self.config.slow_match_threshold {
            warn!(
                method = %ctx.request().method(),
                path = %ctx.path(),
                resolve_us = resolved_in.as_micros() as u64,
                threshold_us = self.config.slow_match_threshold.as_micros() as u64,
                "Slow route matching detected"
            );
        }
        response
    }

    /// Handle an `http::Request`; the body is ignored
    pub fn handle_http<B>(&self, request: http::Request<B>) -> http::Response<Vec<u8>> {
        self.handle(Request::from(request)).into_http()
    }

    /// 405 with an `Allow` header listing the methods whose tree knows the path
    fn answer_method_not_allowed(&self, ctx: &mut Context) {
        let allowed = self.router.allowed_methods(ctx.path());
        if !allowed.is_empty() {
            let list = allowed
                .iter()
                .map(http::Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::try_from(list) {
                ctx.set_header(header::ALLOW, value);
            }
        }
        ctx.set_status(StatusCode::METHOD_NOT_ALLOWED);
    }
}

impl std::fmt::Debug for AppService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppService")
            .field("routes", &self.router.registered_routes().len())
            .field("middlewares", &self.middlewares)
            .field("contexts", &self.contexts)
            .field("encoder", &self.encoder)
            .field("on_error", &self.on_error.len())
            .field("rewrites", &self.rewrites.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
