//! Compact prefix tree for per-method route lookup.
//!
//! This module provides the literal/parameter/wildcard prefix tree behind
//! [`Router`](super::Router). There is one tree per HTTP method, so a tree
//! never branches on the method itself.
//!
//! ## Pattern Syntax
//!
//! - Literal bytes match exactly (`/blog/feed`)
//! - `:name` captures up to the next `/` or the end of the path (`/user/:id`)
//! - `*name` captures the whole remainder and must be last (`/files/*rest`)
//!
//! ## Implementation Details
//!
//! Nodes live in an arena (`Vec<Node<T>>`) and refer to each other by index.
//! Each node keeps a small table of static children keyed by their first
//! byte, at most one parameter child and at most one wildcard child.
//!
//! Inserting walks the common prefix. At the first divergence the current
//! node is split: a new node takes over the remaining suffix together with
//! the old handler and children, and the original node is truncated in place
//! to the shared prefix.
//!
//! Lookup is a single forward pass, O(k) in the path length. It never
//! backtracks, with one exception: the most recently passed wildcard is
//! remembered and used when a static prefix diverges or a node offers no
//! child for the next byte. Only that one wildcard is kept, so the match is
//! not guaranteed to be the longest possible among nested wildcards, and a
//! path that *ends* inside a static prefix does not fall back at all.
//!
//! A newly appended static or parameter node whose prefix does not already
//! end in `/` receives an implicit `/` child carrying the same handler, so
//! `/blog` and `/blog/` resolve alike. This happens once, when the node is
//! created; re-registering `/blog` later does not touch the slash child.

// Hot path: lookups must not allocate
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use std::borrow::Cow;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::warn;

use super::params::{Params, MAX_PARAMS};
use crate::error::{Result, RouterError};

const SEPARATOR: u8 = b'/';
const PARAMETER: u8 = b':';
const WILDCARD: u8 = b'*';

type NodeId = usize;
const ROOT: NodeId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Static,
    Parameter,
    Wildcard,
}

struct Node<T> {
    /// Bytes this node consumes; for parameter/wildcard nodes, the name
    prefix: Box<[u8]>,
    /// Capture name for parameter and wildcard nodes
    name: Option<Arc<str>>,
    kind: NodeKind,
    data: Option<T>,
    /// Static children keyed by the first byte of their prefix
    children: SmallVec<[(u8, NodeId); 4]>,
    parameter: Option<NodeId>,
    wildcard: Option<NodeId>,
}

impl<T> Node<T> {
    fn new_static(prefix: &[u8], data: Option<T>) -> Self {
        Self {
            prefix: prefix.into(),
            name: None,
            kind: NodeKind::Static,
            data,
            children: SmallVec::new(),
            parameter: None,
            wildcard: None,
        }
    }

    fn new_capture(name: &[u8], kind: NodeKind, data: Option<T>) -> Self {
        Self {
            prefix: name.into(),
            name: Some(Arc::from(String::from_utf8_lossy(name).as_ref())),
            kind,
            data,
            children: SmallVec::new(),
            parameter: None,
            wildcard: None,
        }
    }

    #[inline]
    fn child(&self, byte: u8) -> Option<NodeId> {
        self.children
            .iter()
            .find(|(b, _)| *b == byte)
            .map(|(_, id)| *id)
    }

    fn set_child(&mut self, byte: u8, id: NodeId) {
        match self.children.iter_mut().find(|(b, _)| *b == byte) {
            Some(slot) => slot.1 = id,
            None => self.children.push((byte, id)),
        }
    }
}

/// What `add` does after a node's prefix has been fully consumed
enum Step {
    /// Continue into the static child, consuming its first byte
    Descend(NodeId),
    /// Re-examine the current byte from the parameter child
    Enter(NodeId),
    /// Attach the rest of the path below this node
    Append(NodeId),
}

/// Per-method prefix tree mapping path patterns to handlers
pub struct Tree<T> {
    nodes: Vec<Node<T>>,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Tree<T> {
    /// Create an empty tree
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new_static(b"", None)],
        }
    }

    /// Number of nodes in the arena, root included
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing has been registered yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.nodes[ROOT].prefix.is_empty() && self.nodes[ROOT].data.is_none()
    }

    /// Find the handler for `path`, writing captures into `params`.
    ///
    /// Captures made along a branch that ends without a handler are left in
    /// `params`; callers roll them back with the length they saw beforehand.
    pub fn find(&self, path: &str, params: &mut Params) -> Option<&T> {
        let root = &self.nodes[ROOT];

        // Fast path for the root node
        if *root.prefix == *path.as_bytes() {
            return root.data.as_ref();
        }

        let bytes = path.as_bytes();
        let mut node = root;
        let mut i = 0;
        let mut offset = 0;
        let mut last_wildcard: Option<(&Node<T>, usize)> = None;

        loop {
            match node.kind {
                NodeKind::Parameter => {
                    if i == bytes.len() {
                        capture(params, node, path, offset, i);
                        return node.data.as_ref();
                    }

                    if bytes[i] == SEPARATOR {
                        capture(params, node, path, offset, i);
                        node = &self.nodes[node.child(SEPARATOR)?];
                        offset = i;
                    }
                }

                NodeKind::Static | NodeKind::Wildcard => {
                    let matched = i - offset;

                    if i == bytes.len() {
                        // node: /blog|      node: /blog|feed
                        // path: /blog|      path: /blog|
                        return if matched == node.prefix.len() {
                            node.data.as_ref()
                        } else {
                            None
                        };
                    }

                    // node: /|
                    // path: /|blog
                    if matched == node.prefix.len() {
                        if let Some(wildcard) = node.wildcard {
                            last_wildcard = Some((&self.nodes[wildcard], i));
                        }

                        if let Some(child) = node.child(bytes[i]) {
                            node = &self.nodes[child];
                            offset = i;
                            i += 1;
                            continue;
                        }

                        // node: /|:id
                        // path: /|blog
                        if let Some(parameter) = node.parameter {
                            node = &self.nodes[parameter];
                            offset = i;
                            continue;
                        }

                        // node: /|*any          node: /a/bc/d|
                        // path: /|image.png     path: /a/bc/d|z
                        let (wildcard, at) = last_wildcard?;
                        capture(params, wildcard, path, at, bytes.len());
                        return wildcard.data.as_ref();
                    }

                    // node: /b|ag
                    // path: /b|riefcase
                    if bytes[i] != node.prefix[matched] {
                        let (wildcard, at) = last_wildcard?;
                        capture(params, wildcard, path, at, bytes.len());
                        return wildcard.data.as_ref();
                    }
                }
            }

            i += 1;
        }
    }

    fn push_node(&mut self, node: Node<T>) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

impl<T: Clone> Tree<T> {
    /// Register `data` for `path`.
    ///
    /// Registering the same pattern twice replaces the earlier handler.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidPattern`] for malformed patterns and
    /// [`RouterError::TooManyParams`] when the pattern declares more
    /// captures than a context can hold.
    pub fn add(&mut self, path: &str, data: T) -> Result<()> {
        validate_pattern(path)?;

        let bytes = path.as_bytes();
        let mut node = ROOT;
        let mut i = 0;
        let mut offset = 0;

        loop {
            let current = &self.nodes[node];
            let step = match current.kind {
                NodeKind::Parameter => {
                    // node: /post/:id|
                    // path: /post/:id|
                    if i == bytes.len() {
                        self.nodes[node].data = Some(data);
                        return Ok(());
                    }

                    (bytes[i] == SEPARATOR).then(|| self.end_step(node, bytes[i]))
                }

                NodeKind::Static | NodeKind::Wildcard => {
                    let matched = i - offset;

                    if i == bytes.len() {
                        // node: /blog|
                        // path: /blog|
                        if matched == current.prefix.len() {
                            self.nodes[node].data = Some(data);
                            return Ok(());
                        }

                        // node: /blog|feed
                        // path: /blog|
                        self.split(node, matched, b"", data);
                        return Ok(());
                    }

                    if matched == current.prefix.len() {
                        Some(self.end_step(node, bytes[i]))
                    } else if bytes[i] != current.prefix[matched] {
                        // node: /b|ag
                        // path: /b|riefcase
                        self.split(node, matched, &bytes[i..], data);
                        return Ok(());
                    } else {
                        None
                    }
                }
            };

            match step {
                Some(Step::Descend(child)) => {
                    node = child;
                    offset = i;
                    i += 1;
                }
                Some(Step::Enter(parameter)) => {
                    node = parameter;
                    offset = i;
                }
                Some(Step::Append(at)) => {
                    self.append(at, &bytes[i..], data);
                    return Ok(());
                }
                None => i += 1,
            }
        }
    }

    fn end_step(&self, node: NodeId, byte: u8) -> Step {
        let current = &self.nodes[node];

        if let Some(child) = current.child(byte) {
            return Step::Descend(child);
        }

        // Only the untouched root has no prefix
        if current.prefix.is_empty() {
            return Step::Append(node);
        }

        // node: /user/|:id           node: /user/|:id
        // path: /user/|:id/profile   path: /user/|new
        match current.parameter {
            Some(parameter) if byte == PARAMETER => Step::Enter(parameter),
            _ => Step::Append(node),
        }
    }

    /// Truncate `node` to `index` bytes; a new node inherits the rest
    fn split(&mut self, node: NodeId, index: usize, rest: &[u8], data: T) {
        let suffix_id = self.nodes.len();
        let original = &mut self.nodes[node];

        let suffix = Node {
            prefix: original.prefix[index..].into(),
            name: original.name.take(),
            kind: original.kind,
            data: original.data.take(),
            children: std::mem::take(&mut original.children),
            parameter: original.parameter.take(),
            wildcard: original.wildcard.take(),
        };
        let head: Box<[u8]> = original.prefix[..index].into();
        original.prefix = head;
        original.kind = NodeKind::Static;
        if let Some(&first) = suffix.prefix.first() {
            original.set_child(first, suffix_id);
        }
        self.nodes.push(suffix);

        if rest.is_empty() {
            self.nodes[node].data = Some(data);
            return;
        }

        self.append(node, rest, data);
    }

    /// Attach `path` below `node`, creating parameter and wildcard nodes
    fn append(&mut self, mut node: NodeId, mut path: &[u8], data: T) {
        loop {
            if path.is_empty() {
                self.nodes[node].data = Some(data);
                return;
            }

            let capture_start = path
                .iter()
                .position(|&b| b == PARAMETER)
                .or_else(|| path.iter().position(|&b| b == WILDCARD));

            let Some(start) = capture_start else {
                // The untouched root takes the whole path itself
                if self.nodes[node].prefix.is_empty() {
                    self.nodes[node].prefix = path.into();
                    self.nodes[node].data = Some(data.clone());
                    self.add_trailing_slash(node, data);
                    return;
                }

                let child = self.push_node(Node::new_static(path, Some(data.clone())));
                self.nodes[node].set_child(path[0], child);
                self.add_trailing_slash(child, data);
                return;
            };

            if start == 0 {
                let end = path
                    .iter()
                    .position(|&b| b == SEPARATOR)
                    .unwrap_or(path.len());
                let name = &path[1..end];

                if path[0] == PARAMETER {
                    let child = self.push_node(Node::new_capture(name, NodeKind::Parameter, None));
                    self.add_trailing_slash(child, data.clone());
                    self.nodes[node].parameter = Some(child);
                    node = child;
                    path = &path[end..];
                    continue;
                }

                let child =
                    self.push_node(Node::new_capture(name, NodeKind::Wildcard, Some(data)));
                self.nodes[node].wildcard = Some(child);
                return;
            }

            if self.nodes[node].prefix.is_empty() {
                self.nodes[node].prefix = path[..start].into();
                path = &path[start..];
                continue;
            }

            let mut child = Node::new_static(&path[..start], None);

            // A slash right before a capture answers like its parent
            if *child.prefix == [SEPARATOR] {
                child.data = self.nodes[node].data.clone();
            }

            let child = self.push_node(child);
            self.nodes[node].set_child(path[0], child);
            node = child;
            path = &path[start..];
        }
    }

    fn add_trailing_slash(&mut self, node: NodeId, data: T) {
        let current = &self.nodes[node];
        if current.prefix.ends_with(&[SEPARATOR])
            || current.child(SEPARATOR).is_some()
            || current.kind == NodeKind::Wildcard
        {
            return;
        }

        let slash = self.push_node(Node::new_static(&[SEPARATOR], Some(data)));
        self.nodes[node].set_child(SEPARATOR, slash);
    }
}

/// Write the capture for a parameter or wildcard node into the next slot
#[inline]
fn capture<T>(params: &mut Params, node: &Node<T>, path: &str, start: usize, end: usize) {
    let Some(name) = &node.name else {
        return;
    };

    // Slice boundaries can fall inside a multi-byte character when two
    // registered prefixes share only part of it.
    let value = match path.get(start..end) {
        Some(value) => Cow::Borrowed(value),
        None => String::from_utf8_lossy(&path.as_bytes()[start..end]),
    };

    if !params.push(name, &value) {
        warn!(
            param = %name,
            max_params = MAX_PARAMS,
            "Parameter slots exhausted, capture dropped"
        );
    }
}

/// Validate a trie pattern and return the number of captures it declares
pub(crate) fn validate_pattern(path: &str) -> Result<usize> {
    if !path.starts_with('/') {
        return Err(RouterError::invalid_pattern(path, "must start with '/'"));
    }

    let bytes = path.as_bytes();
    let mut count = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b != PARAMETER && b != WILDCARD {
            i += 1;
            continue;
        }

        let end = bytes[i..]
            .iter()
            .position(|&c| c == SEPARATOR)
            .map_or(bytes.len(), |p| i + p);
        let name = &bytes[i + 1..end];

        if name.is_empty() {
            return Err(RouterError::invalid_pattern(path, "capture without a name"));
        }
        if name.contains(&PARAMETER) || name.contains(&WILDCARD) {
            return Err(RouterError::invalid_pattern(
                path,
                "only one capture is allowed per segment",
            ));
        }
        if b == WILDCARD && end != bytes.len() {
            return Err(RouterError::invalid_pattern(
                path,
                "nothing may follow a wildcard",
            ));
        }

        count += 1;
        i = end;
    }

    if count > MAX_PARAMS {
        return Err(RouterError::TooManyParams {
            path: path.to_string(),
            count,
            max: MAX_PARAMS,
        });
    }

    Ok(count)
}
