//! The routing trie.
//!
//! Each node carries a map of literal path segments to children, an
//! optional parameter child (matching any non-`/` segment), and a
//! method-indexed array of handler slots. Lookup prefers literal children;
//! the parameter child is consulted only when no literal matches. Nodes own
//! their children, so dropping the root tears the whole tree down.

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::http::{Method, Request, Response};

/// Parameter captures stay on the stack for routes with up to this many
/// parameter segments.
pub const MAX_INLINE_CAPTURES: usize = 8;

/// Raw parameter segments captured during lookup, left to right.
pub type CaptureVec = SmallVec<[String; MAX_INLINE_CAPTURES]>;

/// An endpoint handler: the request plus the captured parameter segments.
pub type EndpointHandler = Arc<dyn Fn(Request, &[String]) -> Response + Send + Sync>;

pub(crate) struct TrieNode {
    children: HashMap<String, TrieNode>,
    param_child: Option<Box<TrieNode>>,
    handlers: [Option<EndpointHandler>; Method::COUNT],
}

impl TrieNode {
    pub fn new() -> Self {
        Self {
            children: HashMap::new(),
            param_child: None,
            handlers: std::array::from_fn(|_| None),
        }
    }

    /// Register a handler under `path` for `method`, creating nodes as
    /// needed. Segments shaped `{name}` or `:name` bind the parameter
    /// child.
    ///
    /// # Panics
    ///
    /// Panics on duplicate registration at the same `(path, method)`;
    /// endpoint tables are assembled at initialization, where clobbering a
    /// route silently would hide a real bug.
    pub fn insert(&mut self, path: &str, method: Method, handler: EndpointHandler) {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if is_param_segment(segment) {
                node = &mut **node
                    .param_child
                    .get_or_insert_with(|| Box::new(TrieNode::new()));
            } else {
                node = node
                    .children
                    .entry(segment.to_string())
                    .or_insert_with(TrieNode::new);
            }
        }
        let slot = &mut node.handlers[method.index()];
        if slot.is_some() {
            panic!("duplicate endpoint registration: {method} {path}");
        }
        *slot = Some(handler);
    }

    /// Walk `path` segment by segment, preferring literal children and
    /// recording parameter segments as captures. Returns the terminal node.
    pub fn lookup(&self, path: &str) -> Option<(&TrieNode, CaptureVec)> {
        let mut node = self;
        let mut captures = CaptureVec::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if let Some(child) = node.children.get(segment) {
                node = child;
            } else if let Some(param) = node.param_child.as_deref() {
                captures.push(segment.to_string());
                node = param;
            } else {
                return None;
            }
        }
        Some((node, captures))
    }

    pub fn handler(&self, method: Method) -> Option<&EndpointHandler> {
        self.handlers[method.index()].as_ref()
    }
}

fn is_param_segment(segment: &str) -> bool {
    (segment.starts_with('{') && segment.ends_with('}')) || segment.starts_with(':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;

    fn handler(tag: &'static str) -> EndpointHandler {
        Arc::new(move |_req, _captures| {
            let mut res = Response::new(StatusCode::Ok);
            res.reason = tag.to_string();
            res
        })
    }

    fn tag_of(node: &TrieNode, method: Method) -> Option<String> {
        node.handler(method)
            .map(|h| h(Request::new(method, "/"), &[]).reason)
    }

    #[test]
    fn literal_lookup_returns_the_exact_handler() {
        let mut root = TrieNode::new();
        root.insert("/tasks", Method::Get, handler("list"));
        root.insert("/tasks", Method::Post, handler("create"));

        let (node, captures) = root.lookup("/tasks").unwrap();
        assert!(captures.is_empty());
        assert_eq!(tag_of(node, Method::Get).as_deref(), Some("list"));
        assert_eq!(tag_of(node, Method::Post).as_deref(), Some("create"));
        assert!(node.handler(Method::Delete).is_none());
    }

    #[test]
    fn parameter_segments_capture_raw_values() {
        let mut root = TrieNode::new();
        root.insert("/tasks/{id}/toggle", Method::Put, handler("toggle"));

        let (node, captures) = root.lookup("/tasks/42/toggle").unwrap();
        assert_eq!(captures.as_slice(), ["42".to_string()]);
        assert_eq!(tag_of(node, Method::Put).as_deref(), Some("toggle"));
    }

    #[test]
    fn colon_syntax_binds_the_parameter_child_too() {
        let mut root = TrieNode::new();
        root.insert("/users/:name", Method::Get, handler("user"));

        let (_, captures) = root.lookup("/users/ada").unwrap();
        assert_eq!(captures.as_slice(), ["ada".to_string()]);
    }

    #[test]
    fn literal_children_win_over_the_parameter_child() {
        let mut root = TrieNode::new();
        root.insert("/tasks/{id}", Method::Get, handler("by-id"));
        root.insert("/tasks/all", Method::Get, handler("all"));

        let (node, captures) = root.lookup("/tasks/all").unwrap();
        assert!(captures.is_empty());
        assert_eq!(tag_of(node, Method::Get).as_deref(), Some("all"));

        let (node, captures) = root.lookup("/tasks/7").unwrap();
        assert_eq!(captures.as_slice(), ["7".to_string()]);
        assert_eq!(tag_of(node, Method::Get).as_deref(), Some("by-id"));
    }

    #[test]
    fn multiple_parameters_capture_in_order() {
        let mut root = TrieNode::new();
        root.insert("/users/{uid}/posts/{pid}", Method::Get, handler("post"));

        let (_, captures) = root.lookup("/users/3/posts/14").unwrap();
        assert_eq!(captures.as_slice(), ["3".to_string(), "14".to_string()]);
    }

    #[test]
    fn unregistered_paths_miss() {
        let mut root = TrieNode::new();
        root.insert("/tasks", Method::Get, handler("list"));

        assert!(root.lookup("/users").is_none());
        assert!(root.lookup("/tasks/42").is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate endpoint registration")]
    fn duplicate_registration_panics() {
        let mut root = TrieNode::new();
        root.insert("/tasks", Method::Get, handler("a"));
        root.insert("/tasks", Method::Get, handler("b"));
    }
}
