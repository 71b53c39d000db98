//! # Server Module
//!
//! The request lifecycle without the socket: [`Request`] and [`Response`]
//! types, the [`ResponseEncoder`] that writes bodies, and [`AppService`],
//! which resolves a request, runs its handler in a pooled context and hands
//! back the finished response. Transports convert to and from `http` types
//! at the edge.

pub mod encoder;
mod request;
mod response;
mod service;

pub use encoder::ResponseEncoder;
pub use request::{CancellationSignal, Request};
pub use response::Response;
pub use service::{AppService, ErrorObserver, RewriteHook};
