use std::collections::HashMap;

use fnv::FnvHashMap;

use crate::error::RouteError;
use crate::pattern::{Pattern, Segment};
use crate::protocol::Protocol;

/// A route tree node for one path-segment level. The tree branches only on
/// segment shape (literal text vs. a dynamic slot); parameter typing lives
/// in each registration's compiled [`Pattern`].
struct Node<T> {
    children: HashMap<String, Node<T>>,
    dynamic: Option<DynamicChild<T>>,
    entries: FnvHashMap<Protocol, T>,
}

struct DynamicChild<T> {
    param: String,
    node: Box<Node<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            dynamic: None,
            entries: FnvHashMap::default(),
        }
    }
}

/// A trie keyed by path segment, storing a protocol-to-data map at each
/// terminal node.
pub(crate) struct Tree<T> {
    root: Node<T>,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self {
            root: Node::default(),
        }
    }
}

impl<T> Tree<T> {
    /// Inserts a registration at the terminal node of `pattern`.
    ///
    /// A node holds at most one dynamic child; registering a second dynamic
    /// segment with a different parameter name at the same position is
    /// ambiguous and rejected. Re-registering a protocol at the same
    /// terminal overwrites the previous registration (last wins) with a
    /// warning.
    pub(crate) fn insert(
        &mut self,
        pattern: &Pattern,
        protocol: Protocol,
        data: T,
    ) -> Result<(), RouteError> {
        self.insert_upto(pattern, pattern.segments().len(), protocol, data)
    }

    /// Inserts at the node reached after the first `depth` segments of
    /// `pattern`. Routes with trailing optional parameters register at every
    /// prefix they can match, so a path omitting those segments still
    /// resolves to the same registration.
    pub(crate) fn insert_upto(
        &mut self,
        pattern: &Pattern,
        depth: usize,
        protocol: Protocol,
        data: T,
    ) -> Result<(), RouteError> {
        let mut node = &mut self.root;

        for segment in &pattern.segments()[..depth] {
            node = match segment {
                Segment::Literal(lit) => node.children.entry(lit.clone()).or_default(),
                Segment::Param(spec) => {
                    let dynamic = node.dynamic.get_or_insert_with(|| DynamicChild {
                        param: spec.name.clone(),
                        node: Box::default(),
                    });
                    if dynamic.param != spec.name {
                        return Err(RouteError::AmbiguousDynamic {
                            pattern: pattern.raw().to_string(),
                            existing: dynamic.param.clone(),
                            incoming: spec.name.clone(),
                        });
                    }
                    dynamic.node.as_mut()
                }
            };
        }

        if node.entries.insert(protocol, data).is_some() {
            tracing::warn!(
                pattern = %pattern.raw(),
                protocol = %protocol,
                "route re-registered; previous handler overwritten"
            );
        }
        Ok(())
    }

    /// Resolves a tokenized path to the protocol-handler map of its terminal
    /// node.
    ///
    /// A backtracking depth-first search with fixed precedence: at every
    /// level the literal child is fully explored before the dynamic child is
    /// tried, so a static route always beats a dynamic one at the same
    /// position even when the static subtree only fails deeper down.
    pub(crate) fn resolve(&self, segments: &[&str]) -> Option<&FnvHashMap<Protocol, T>> {
        Self::lookup(&self.root, segments)
    }

    fn lookup<'a>(node: &'a Node<T>, segments: &[&str]) -> Option<&'a FnvHashMap<Protocol, T>> {
        let (segment, rest) = match segments.split_first() {
            Some((segment, rest)) => (*segment, rest),
            // Path consumed: this node is a match target only if something
            // is registered here.
            None => {
                return if node.entries.is_empty() {
                    None
                } else {
                    Some(&node.entries)
                };
            }
        };

        if let Some(child) = node.children.get(segment) {
            if let Some(found) = Self::lookup(child, rest) {
                return Some(found);
            }
        }

        if let Some(dynamic) = &node.dynamic {
            if let Some(found) = Self::lookup(&dynamic.node, rest) {
                return Some(found);
            }
        }

        None
    }
}
