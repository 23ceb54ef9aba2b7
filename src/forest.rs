//! Arena-backed forest used to model the coroutine parent/child relation.

/// Opaque index of a node within its [`Forest`]. Handles are only meaningful
/// for the forest that produced them.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct NodeHandle(u32);

struct Node<T> {
    value: T,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
}

/// A set of trees over an append-only node arena. Nodes are created either
/// as roots or under an existing parent, and never move; children keep
/// insertion order, so traversal is stable within a run.
pub struct Forest<T> {
    nodes: Vec<Node<T>>,
}

impl<T> Forest<T> {
    pub fn new() -> Forest<T> {
        Forest { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn new_root(&mut self, value: T) -> NodeHandle {
        let handle = NodeHandle(self.nodes.len() as u32);
        self.nodes.push(Node {
            value,
            parent: None,
            children: Vec::new(),
        });
        handle
    }

    /// `parent` must come from this forest.
    pub fn new_node(&mut self, value: T, parent: NodeHandle) -> NodeHandle {
        let handle = NodeHandle(self.nodes.len() as u32);
        self.nodes[parent.0 as usize].children.push(handle);
        self.nodes.push(Node {
            value,
            parent: Some(parent),
            children: Vec::new(),
        });
        handle
    }

    pub fn value(&self, node: NodeHandle) -> &T {
        &self.nodes[node.0 as usize].value
    }

    pub fn parent(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.nodes[node.0 as usize].parent
    }

    pub fn children(&self, node: NodeHandle) -> &[NodeHandle] {
        &self.nodes[node.0 as usize].children
    }

    /// Every node without a parent, in creation order.
    pub fn roots(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(i, _)| NodeHandle(i as u32))
    }
}

impl<T> Default for Forest<T> {
    fn default() -> Self {
        Forest::new()
    }
}
