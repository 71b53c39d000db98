use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::server::Request;

/// Per-client state shared across requests.
///
/// Storage and expiry belong to the [`SessionProvider`]; the router only
/// asks for the session of a request, at most once per request.
#[derive(Debug)]
pub struct Session {
    id: String,
    data: RwLock<HashMap<String, Value>>,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.data.write().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.write().remove(key)
    }
}

/// Looks up the session belonging to a request (typically via a cookie)
pub trait SessionProvider: Send + Sync {
    fn resolve(&self, request: &Request) -> Option<Arc<Session>>;
}
