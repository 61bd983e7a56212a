//! The group hierarchy: a tree of named filters over entries.

use serde::{Deserialize, Serialize};

/// A node in the group tree.
///
/// The filter expression is opaque to the engine -- groups are compared
/// wholesale when diffing, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNode {
    pub name: String,
    /// Filter expression selecting the member entries.
    pub expression: String,
    #[serde(default)]
    pub children: Vec<GroupNode>,
}

impl GroupNode {
    pub fn new(name: &str, expression: &str) -> Self {
        Self {
            name: name.to_owned(),
            expression: expression.to_owned(),
            children: Vec::new(),
        }
    }

    /// Add a child node, returning `self` for chained construction.
    pub fn with_child(mut self, child: GroupNode) -> Self {
        self.children.push(child);
        self
    }

    /// Total number of nodes in this subtree, the root included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(GroupNode::node_count).sum::<usize>()
    }
}
