use std::collections::HashMap;
use std::fmt::Display;
use std::num::ParseIntError;
use std::sync::Arc;

use http::header::{self, HeaderName, HeaderValue};
use http::StatusCode;
use once_cell::unsync::OnceCell;
use serde::Serialize;
use smallvec::SmallVec;

use super::pool::Poolable;
use super::session::{Session, SessionProvider};
use crate::error::{Result, RouterError};
use crate::handler::Handler;
use crate::ids::RequestId;
use crate::router::Params;
use crate::server::encoder::ResponseEncoder;
use crate::server::{Request, Response};

/// Transforms a response body before it is encoded
pub type Modifier = Box<dyn Fn(Vec<u8>) -> Vec<u8> + Send + Sync>;

/// Body modifiers a single request may register
pub const MAX_MODIFIERS: usize = 4;

const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
const CONTENT_TYPE_CSS: &str = "text/css; charset=utf-8";
const CONTENT_TYPE_JS: &str = "application/javascript; charset=utf-8";
const CONTENT_TYPE_JSON: &str = "application/json";

/// Per-request state handed to handlers.
///
/// Contexts are pooled by the service and reset before each checkout, so a
/// handler never sees parameters, headers or modifiers of an earlier
/// request. A context is only ever used by one request at a time.
pub struct Context {
    status: StatusCode,
    request: Request,
    response: Response,
    params: Params,
    vars: Option<HashMap<String, String>>,
    modifiers: SmallVec<[Modifier; MAX_MODIFIERS]>,
    handler: Option<Handler>,
    session: OnceCell<Option<Arc<Session>>>,
    sessions: Option<Arc<dyn SessionProvider>>,
    encoder: Arc<ResponseEncoder>,
    request_id: RequestId,
}

impl Context {
    /// Create an idle context writing through `encoder`
    #[must_use]
    pub fn new(encoder: Arc<ResponseEncoder>) -> Self {
        Self {
            status: StatusCode::OK,
            request: Request::default(),
            response: Response::default(),
            params: Params::new(),
            vars: None,
            modifiers: SmallVec::new(),
            handler: None,
            session: OnceCell::new(),
            sessions: None,
            encoder,
            request_id: RequestId::new(),
        }
    }

    /// Bind the context to a new request
    pub(crate) fn begin(&mut self, request: Request, sessions: Option<Arc<dyn SessionProvider>>) {
        self.request_id = RequestId::from_header_or_new(request.header("x-request-id"));
        self.request = request;
        self.sessions = sessions;
    }

    /// Borrow the request and the parameter slots together for resolution
    pub(crate) fn lookup_parts(&mut self) -> (&Request, &mut Params) {
        (&self.request, &mut self.params)
    }

    pub(crate) fn set_vars(&mut self, vars: Option<HashMap<String, String>>) {
        self.vars = vars;
    }

    pub(crate) fn set_handler(&mut self, handler: Option<Handler>) {
        self.handler = handler;
    }

    /// Hand the response over, filling in the status if nothing was written
    pub(crate) fn finish(&mut self) -> Response {
        if !self.response.is_written() {
            self.response.set_status(self.status);
        }
        std::mem::take(&mut self.response)
    }

    /// The request being served
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The response written so far
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Handler selected for this request, after middleware wrapping
    #[must_use]
    pub fn handler(&self) -> Option<&Handler> {
        self.handler.as_ref()
    }

    /// Identifier of the current request
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Value of a path parameter or route variable, or "" if absent
    #[must_use]
    pub fn get(&self, name: &str) -> &str {
        self.params
            .get(name)
            .or_else(|| self.vars.as_ref()?.get(name).map(String::as_str))
            .unwrap_or("")
    }

    /// Path parameter or route variable parsed as an integer
    ///
    /// # Errors
    ///
    /// Returns the parse error for absent or non-numeric values.
    pub fn get_int(&self, name: &str) -> std::result::Result<i64, ParseIntError> {
        self.get(name).parse()
    }

    /// Parameters captured by the trie
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Variables captured by a variable route
    #[must_use]
    pub fn vars(&self) -> Option<&HashMap<String, String>> {
        self.vars.as_ref()
    }

    /// First value of a query-string parameter
    #[must_use]
    pub fn query(&self, name: &str) -> Option<String> {
        self.request
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Decoded request path
    #[must_use]
    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// Replace the path used for routing; meant for rewrite hooks
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.request.set_path(path.into());
    }

    /// Status the response will be sent with
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Status already on the wire if a body was written, else the pending one
    #[must_use]
    pub fn effective_status(&self) -> StatusCode {
        if self.response.is_written() {
            self.response.status()
        } else {
            self.status
        }
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response.headers_mut().insert(name, value);
    }

    /// Register a body transformation, applied in registration order
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::TooManyModifiers`] past [`MAX_MODIFIERS`].
    pub fn add_modifier<F>(&mut self, modifier: F) -> Result<()>
    where
        F: Fn(Vec<u8>) -> Vec<u8> + Send + Sync + 'static,
    {
        if self.modifiers.len() == MAX_MODIFIERS {
            return Err(RouterError::TooManyModifiers(MAX_MODIFIERS));
        }
        self.modifiers.push(Box::new(modifier));
        Ok(())
    }

    /// Send `body` as is.
    ///
    /// The body passes through the modifiers and the response encoder, which
    /// may answer 304 or compress it. Writing twice appends to the body.
    ///
    /// # Errors
    ///
    /// Fails when the client cancelled the request or compression fails.
    pub fn bytes(&mut self, body: Vec<u8>) -> Result<()> {
        self.encoder.emit(
            &self.request,
            &mut self.response,
            self.status,
            &self.modifiers,
            body,
        )
    }

    /// Send plain text
    ///
    /// # Errors
    ///
    /// See [`bytes`](Self::bytes).
    pub fn text(&mut self, body: impl Into<String>) -> Result<()> {
        self.set_header(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_TEXT));
        self.bytes(body.into().into_bytes())
    }

    /// Alias of [`text`](Self::text)
    ///
    /// # Errors
    ///
    /// See [`bytes`](Self::bytes).
    pub fn string(&mut self, body: impl Into<String>) -> Result<()> {
        self.text(body)
    }

    /// # Errors
    ///
    /// See [`bytes`](Self::bytes).
    pub fn html(&mut self, body: impl Into<String>) -> Result<()> {
        self.set_header(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_HTML));
        self.bytes(body.into().into_bytes())
    }

    /// # Errors
    ///
    /// See [`bytes`](Self::bytes).
    pub fn css(&mut self, body: impl Into<String>) -> Result<()> {
        self.set_header(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_CSS));
        self.bytes(body.into().into_bytes())
    }

    /// # Errors
    ///
    /// See [`bytes`](Self::bytes).
    pub fn javascript(&mut self, body: impl Into<String>) -> Result<()> {
        self.set_header(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JS));
        self.bytes(body.into().into_bytes())
    }

    /// Serialize `value` as the JSON body
    ///
    /// # Errors
    ///
    /// Fails on serialization errors and as for [`bytes`](Self::bytes).
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.set_header(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        self.bytes(body)
    }

    /// Point the client at `location`; nothing is written to the body
    pub fn redirect(&mut self, status: StatusCode, location: &str) {
        match HeaderValue::try_from(location) {
            Ok(value) => {
                self.set_header(header::LOCATION, value);
                self.status = status;
            }
            Err(_) => {
                tracing::warn!(location = %location, "Redirect target is not a valid header value");
                self.status = StatusCode::INTERNAL_SERVER_ERROR;
            }
        }
    }

    /// Set the status and build an error for the handler to return
    ///
    /// ```rust,ignore
    /// let id = ctx.get_int("id").map_err(|_| ctx.error(StatusCode::BAD_REQUEST, "bad id"))?;
    /// ```
    pub fn error(&mut self, status: StatusCode, message: impl Display) -> anyhow::Error {
        self.status = status;
        anyhow::anyhow!("{message}")
    }

    /// Session of the requesting client, resolved on first use
    #[must_use]
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session
            .get_or_init(|| self.sessions.as_ref()?.resolve(&self.request))
            .as_ref()
    }

    /// Whether a session exists, without resolving one
    #[must_use]
    pub fn has_session(&self) -> bool {
        matches!(self.session.get(), Some(Some(_)))
    }

    /// Client address, preferring the first `X-Forwarded-For` hop
    #[must_use]
    pub fn ip(&self) -> Option<String> {
        if let Some(forwarded) = self.request.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
                return Some(first.to_string());
            }
        }
        self.request.remote_addr().map(|addr| addr.ip().to_string())
    }
}

impl Poolable for Context {
    fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.request = Request::default();
        self.response = Response::default();
        self.params.clear();
        self.vars = None;
        self.modifiers.clear();
        self.handler = None;
        self.session = OnceCell::new();
        self.sessions = None;
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.request_id)
            .field("status", &self.status)
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("params", &self.params)
            .field("vars", &self.vars)
            .field("modifiers", &self.modifiers.len())
            .finish_non_exhaustive()
    }
}
