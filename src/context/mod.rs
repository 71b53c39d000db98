//! # Request Context Module
//!
//! [`Context`] is the per-request object handed to every handler. It holds
//! the request, the captured parameters, the pending status, body modifiers
//! and the response being written. Contexts come from a [`Pool`] and are
//! reset on checkout, so steady-state request handling reuses their buffers
//! instead of allocating new ones.

mod core;
pub mod pool;
mod session;

pub use self::core::{Context, Modifier, MAX_MODIFIERS};
pub use pool::{Pool, Poolable, Pooled};
pub use session::{Session, SessionProvider};
