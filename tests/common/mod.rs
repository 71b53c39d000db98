#![allow(dead_code)]

use std::io::Read;

use flate2::read::GzDecoder;
use http::header::{HeaderName, HeaderValue};
use http::Method;
use triemux::{AppService, Request, Response, Router, RuntimeConfig};

/// Service over `router` with default runtime settings
pub fn service(router: Router) -> AppService {
    AppService::new(router, RuntimeConfig::default())
}

pub fn request(method: Method, uri: &str) -> Request {
    Request::new(method, uri).unwrap()
}

/// Send a request with the given headers and return the response
pub fn send(
    service: &AppService,
    method: Method,
    uri: &str,
    headers: &[(HeaderName, &'static str)],
) -> Response {
    let request = headers.iter().fold(request(method, uri), |req, (name, value)| {
        req.with_header(name.clone(), HeaderValue::from_static(value))
    });
    service.handle(request)
}

pub fn get(service: &AppService, uri: &str) -> Response {
    send(service, Method::GET, uri, &[])
}

pub fn body_text(response: &Response) -> &str {
    std::str::from_utf8(response.body()).unwrap()
}

pub fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

/// A compressible body comfortably above the gzip threshold
pub fn large_text() -> String {
    "The quick brown fox jumps over the lazy dog. ".repeat(100)
}
