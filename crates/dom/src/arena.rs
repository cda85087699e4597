//! Arena-based DOM tree storage.
//!
//! Nodes live in one `Vec<DomNode>` addressed by `u32` index instead of
//! `Rc`/`Arc` pointers, so a parsed tree is one contiguous allocation and
//! traversal never recurses.

use crate::error::{DomError, Result};
use crate::types::{DomNode, NodeId, NodeType};
use ahash::AHashMap;

/// Arena allocator for DOM nodes.
#[derive(Debug)]
pub struct DomArena {
    /// All nodes stored sequentially (cache-friendly)
    nodes: Vec<DomNode>,

    /// Backend node ID → NodeId lookup (for CDP integration)
    backend_id_map: AHashMap<u32, NodeId>,

    /// Root node ID (if set)
    root_id: Option<NodeId>,
}

impl DomArena {
    /// Create a new empty arena
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(1024), // Pre-allocate for typical page
            backend_id_map: AHashMap::with_capacity(1024),
            root_id: None,
        }
    }

    /// Add a node to the arena, returns its ID
    pub fn add_node(&mut self, node: DomNode) -> NodeId {
        let node_id = self.nodes.len() as NodeId;
        self.backend_id_map.insert(node.backend_node_id, node_id);
        self.nodes.push(node);
        node_id
    }

    /// Get node by ID (immutable)
    pub fn get(&self, node_id: NodeId) -> Result<&DomNode> {
        self.nodes
            .get(node_id as usize)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Get node by ID (mutable)
    pub fn get_mut(&mut self, node_id: NodeId) -> Result<&mut DomNode> {
        self.nodes
            .get_mut(node_id as usize)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Set root node
    pub fn set_root(&mut self, node_id: NodeId) -> Result<()> {
        // Verify node exists
        self.get(node_id)?;
        self.root_id = Some(node_id);
        Ok(())
    }

    /// Get root node ID
    pub fn root_id(&self) -> Option<NodeId> {
        self.root_id
    }

    /// Get root node
    pub fn root(&self) -> Result<&DomNode> {
        let root_id = self
            .root_id
            .ok_or_else(|| DomError::CdpError("No root node set".to_string()))?;
        self.get(root_id)
    }

    /// Total number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if arena is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterator over all nodes
    pub fn iter(&self) -> impl Iterator<Item = &DomNode> {
        self.nodes.iter()
    }

    /// Iterator over all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|i| i as NodeId)
    }

    /// Traverse tree depth-first (iterative, no recursion)
    pub fn traverse_df<F>(&self, start_id: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(&DomNode) -> Result<()>,
    {
        let mut stack = vec![start_id];

        while let Some(node_id) = stack.pop() {
            let node = self.get(node_id)?;
            visit(node)?;

            // Push children in reverse order (so they're visited left-to-right)
            for &child_id in node.children_ids.iter().rev() {
                stack.push(child_id);
            }
        }

        Ok(())
    }

    /// Clear arena (reuse allocation)
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.backend_id_map.clear();
        self.root_id = None;
    }
}

impl Default for DomArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_basic() {
        let mut arena = DomArena::new();

        let node = DomNode::new(
            0,
            100,
            NodeType::Element,
            "div".to_string(),
            "target1".to_string(),
        );

        let id = arena.add_node(node);
        assert_eq!(id, 0);

        let retrieved = arena.get(id).unwrap();
        assert_eq!(retrieved.node_name, "div");
        assert_eq!(retrieved.backend_node_id, 100);
    }

    #[test]
    fn test_traverse_df() {
        let mut arena = DomArena::new();

        // Create tree: root -> [child1, child2]
        let mut root = DomNode::new(
            0,
            100,
            NodeType::Element,
            "div".to_string(),
            "target1".to_string(),
        );

        let child1 = DomNode::new(
            1,
            101,
            NodeType::Element,
            "span".to_string(),
            "target1".to_string(),
        );

        let child2 = DomNode::new(
            2,
            102,
            NodeType::Element,
            "span".to_string(),
            "target1".to_string(),
        );

        let id1 = arena.add_node(child1);
        let id2 = arena.add_node(child2);

        root.children_ids.push(id1);
        root.children_ids.push(id2);

        let root_id = arena.add_node(root);

        let mut visited = Vec::new();
        arena
            .traverse_df(root_id, |node| {
                visited.push(node.node_name.clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(visited, vec!["div", "span", "span"]);
    }
}
