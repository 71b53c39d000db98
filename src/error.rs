//! Error types for route registration and response emission.
//!
//! Matching outcomes (`NotFound`, `MethodNotAllowed`) are not errors; they are
//! classifications carried by [`crate::router::MatchError`] and resolved to
//! fallback handlers. Handler failures are opaque [`anyhow::Error`] values.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors raised while building routes or emitting a response body
#[derive(Error, Debug)]
pub enum RouterError {
    /// The method has no dedicated tree (only the nine standard methods do)
    #[error("Unknown HTTP method: '{0}'")]
    UnknownMethod(String),

    /// A route declares more parameters than a context has slots for
    #[error("route {path:?} declares {count} parameters, but a context only has {max} slots")]
    TooManyParams {
        /// The offending route pattern
        path: String,
        /// Number of parameters the pattern declares
        count: usize,
        /// Slot capacity of a context
        max: usize,
    },

    /// Malformed route pattern or template
    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// What is wrong with it
        reason: String,
    },

    /// A variable pattern failed to compile
    #[error("route regexp failed to compile: {0}")]
    Regex(#[from] regex::Error),

    /// More body modifiers were registered than a context can hold
    #[error("a context holds at most {0} body modifiers")]
    TooManyModifiers(usize),

    /// The client went away before the body was written
    #[error("Request interrupted by the client")]
    RequestCancelled,

    /// Gzip encoding failed
    #[error("gzip compression failed: {0}")]
    Compression(#[from] flate2::CompressError),

    /// The request URI could not be parsed
    #[error("invalid request URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    /// A URL could not be built from a route's templates
    #[error("cannot build URL: {0}")]
    BuildUrl(String),

    /// A JSON body could not be serialized
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl RouterError {
    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}
