use http::header::{AsHeaderName, HeaderMap};
use http::StatusCode;

/// Response produced by a handler.
///
/// The status is fixed by the first body write; headers may still change
/// until the response is handed back to the transport.
#[derive(Debug, Default)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    written: bool,
}

impl Response {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First value of a header, if it is visible ASCII
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Whether a body write has happened
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Write `bytes`; the first write fixes the status
    pub(crate) fn write(&mut self, status: StatusCode, bytes: Vec<u8>) {
        if !self.written {
            self.status = status;
            self.written = true;
        }
        if self.body.is_empty() {
            self.body = bytes;
        } else {
            self.body.extend_from_slice(&bytes);
        }
    }

    /// Convert into an `http::Response` for the transport
    #[must_use]
    pub fn into_http(self) -> http::Response<Vec<u8>> {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
