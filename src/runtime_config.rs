//! # Runtime Configuration Module
//!
//! Environment-variable configuration for the request pipeline.
//!
//! ## Environment Variables
//!
//! | variable                    | default | meaning                                      |
//! |-----------------------------|---------|----------------------------------------------|
//! | `TRIEMUX_GZIP`              | `true`  | compress eligible responses                  |
//! | `TRIEMUX_GZIP_LEVEL`        | `9`     | deflate level, 0-9                           |
//! | `TRIEMUX_CONTEXT_POOL_SIZE` | `1024`  | idle request contexts kept for reuse         |
//! | `TRIEMUX_GZIP_POOL_SIZE`    | `64`    | idle gzip compressors kept for reuse         |
//! | `TRIEMUX_SLOW_MATCH_MICROS` | `1000`  | route resolution slower than this is logged  |
//!
//! Numeric values accept decimal (`1024`) or hexadecimal (`0x400`).
//!
//! ## Usage
//!
//! ```rust
//! use triemux::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("gzip: {} (level {})", config.gzip, config.gzip_level);
//! ```
//!
//! Pool sizes bound *idle* objects only. Under a burst more contexts are
//! created as needed; the surplus is dropped when returned.

use std::env;
use std::time::Duration;

const DEFAULT_GZIP_LEVEL: u32 = 9;
const DEFAULT_CONTEXT_POOL_SIZE: usize = 1024;
const DEFAULT_GZIP_POOL_SIZE: usize = 64;
const DEFAULT_SLOW_MATCH_MICROS: u64 = 1000;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Compress eligible responses when the client accepts gzip
    pub gzip: bool,
    /// Deflate level used by pooled compressors (0-9)
    pub gzip_level: u32,
    /// Idle contexts kept by the context pool
    pub context_pool_size: usize,
    /// Idle compressors kept by the gzip pool
    pub gzip_pool_size: usize,
    /// Resolution time above which a warning is logged
    pub slow_match_threshold: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gzip: true,
            gzip_level: DEFAULT_GZIP_LEVEL,
            context_pool_size: DEFAULT_CONTEXT_POOL_SIZE,
            gzip_pool_size: DEFAULT_GZIP_POOL_SIZE,
            slow_match_threshold: Duration::from_micros(DEFAULT_SLOW_MATCH_MICROS),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|val| parse_number(&val))
                .unwrap_or(default)
        };

        Self {
            gzip: lookup("TRIEMUX_GZIP")
                .map(|val| parse_flag(&val))
                .unwrap_or(true),
            gzip_level: number("TRIEMUX_GZIP_LEVEL", u64::from(DEFAULT_GZIP_LEVEL)).min(9) as u32,
            context_pool_size: number("TRIEMUX_CONTEXT_POOL_SIZE", DEFAULT_CONTEXT_POOL_SIZE as u64)
                as usize,
            gzip_pool_size: number("TRIEMUX_GZIP_POOL_SIZE", DEFAULT_GZIP_POOL_SIZE as u64) as usize,
            slow_match_threshold: Duration::from_micros(number(
                "TRIEMUX_SLOW_MATCH_MICROS",
                DEFAULT_SLOW_MATCH_MICROS,
            )),
        }
    }
}

fn parse_number(val: &str) -> Option<u64> {
    let val = val.trim();
    if let Some(hex) = val.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    }
}

fn parse_flag(val: &str) -> bool {
    !matches!(
        val.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
