//! Fixed-capacity parameter slots written by trie lookups.

use std::sync::Arc;

/// Maximum number of path parameters a single request can capture.
///
/// Routes declaring more than this are rejected at registration time.
pub const MAX_PARAMS: usize = 16;

/// Pre-allocated name/value slots for captured path parameters.
///
/// Names are `Arc<str>` shared with the trie node that declared them, so a
/// capture is an atomic increment plus a copy into a value buffer that is
/// reused across requests. Once a pooled context has warmed up, matching a
/// parameterized route does not touch the allocator.
pub struct Params {
    names: [Option<Arc<str>>; MAX_PARAMS],
    values: [String; MAX_PARAMS],
    len: usize,
}

impl Params {
    /// Create an empty set of slots
    #[must_use]
    pub fn new() -> Self {
        Self {
            names: std::array::from_fn(|_| None),
            values: std::array::from_fn(|_| String::new()),
            len: 0,
        }
    }

    /// Append a parameter into the next free slot.
    ///
    /// Returns `false` when every slot is taken. Registration bounds the
    /// parameter count per route, so this only happens when a wildcard
    /// fallback stacks on top of captures from a different branch.
    pub fn push(&mut self, name: &Arc<str>, value: &str) -> bool {
        if self.len == MAX_PARAMS {
            return false;
        }
        self.names[self.len] = Some(Arc::clone(name));
        let slot = &mut self.values[self.len];
        slot.clear();
        slot.push_str(value);
        self.len += 1;
        true
    }

    /// Look up a parameter by name.
    ///
    /// Uses "last write wins" semantics: with duplicate names at different
    /// depths the deepest capture is returned.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter().rev().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    /// Iterate over `(name, value)` pairs in capture order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &str)> {
        self.names[..self.len]
            .iter()
            .zip(&self.values[..self.len])
            .map(|(k, v)| (k.as_deref().unwrap_or(""), v.as_str()))
    }

    /// Number of captured parameters
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing was captured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forget all captures; value buffers keep their capacity
    pub fn clear(&mut self) {
        for name in &mut self.names[..self.len] {
            *name = None;
        }
        self.len = 0;
    }

    /// Drop captures past `len`; used to roll back a failed lookup
    pub(crate) fn truncate(&mut self, len: usize) {
        if len < self.len {
            for name in &mut self.names[len..self.len] {
                *name = None;
            }
            self.len = len;
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
