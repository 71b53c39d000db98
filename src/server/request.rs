use std::borrow::Cow;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::header::{self, AsHeaderName, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Uri};

use crate::error::Result;

/// Shared flag raised when the client goes away.
///
/// The transport keeps one clone and calls [`cancel`](Self::cancel) on
/// disconnect; response emission checks it before writing.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// An incoming request as seen by the router.
///
/// The body is not part of routing and is left to the transport. `path` is
/// the percent-decoded URI path used for lookup; rewrite hooks may replace
/// it without touching the URI.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    path: String,
    headers: HeaderMap,
    cancellation: CancellationSignal,
    remote_addr: Option<SocketAddr>,
}

impl Default for Request {
    fn default() -> Self {
        Self::from_parts(Method::GET, Uri::from_static("/"), HeaderMap::new())
    }
}

impl Request {
    /// Build a request from a method and a URI string
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidUri`](crate::RouterError::InvalidUri)
    /// when `uri` does not parse.
    pub fn new(method: Method, uri: &str) -> Result<Self> {
        Ok(Self::from_parts(method, Uri::from_str(uri)?, HeaderMap::new()))
    }

    #[must_use]
    pub fn from_parts(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            path: decode_path(uri.path()),
            method,
            uri,
            headers,
            cancellation: CancellationSignal::new(),
            remote_addr: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, signal: CancellationSignal) -> Self {
        self.cancellation = signal;
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Decoded path used for routing
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path exactly as it appeared in the URI
    #[must_use]
    pub fn raw_path(&self) -> &str {
        self.uri.path()
    }

    pub(crate) fn set_path(&mut self, path: String) {
        self.path = path;
    }

    /// Raw query string without the leading `?`
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Decoded query pairs in order of appearance
    pub fn query_pairs(&self) -> impl Iterator<Item = (Cow<'_, str>, Cow<'_, str>)> {
        url::form_urlencoded::parse(self.query().unwrap_or("").as_bytes())
    }

    /// Host with optional port, from the URI authority or the `Host` header
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.uri
            .authority()
            .map(|a| a.as_str())
            .or_else(|| self.header(header::HOST))
    }

    /// First value of a header, if it is visible ASCII
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// This request's URL with its path replaced by `raw_path`
    pub(crate) fn url_with_path(&self, raw_path: &str) -> String {
        let mut url = String::with_capacity(raw_path.len() + 32);
        if let (Some(scheme), Some(authority)) = (self.uri.scheme_str(), self.uri.authority()) {
            url.push_str(scheme);
            url.push_str("://");
            url.push_str(authority.as_str());
        }
        url.push_str(raw_path);
        if let Some(query) = self.query() {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

impl<B> From<http::Request<B>> for Request {
    fn from(request: http::Request<B>) -> Self {
        let (parts, _body) = request.into_parts();
        Self::from_parts(parts.method, parts.uri, parts.headers)
    }
}

/// Percent-decode a URI path; undecodable input is kept verbatim
fn decode_path(raw: &str) -> String {
    if !raw.contains('%') {
        return raw.to_string();
    }
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), Cow::into_owned)
}
