use std::collections::HashSet;
use std::fmt;

use smallvec::SmallVec;
use tstack_core::{Result, Tensor, TsError};

use crate::bubble::{op, param, Bubble};

/// Handle of a node inside one [`Graph`]. Assigned at insertion, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A bubble and its ordered inputs. Immutable once inserted.
#[derive(Debug, Clone)]
pub struct Node {
    bubble: Bubble,
    inputs: SmallVec<[NodeId; 4]>,
}

impl Node {
    pub fn bubble(&self) -> &Bubble {
        &self.bubble
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }
}

/// Arena owning every node of a computation graph.
///
/// Inputs must exist before the node that consumes them, so handles are a
/// topological order and the graph cannot contain a cycle.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    /// Inserts a node. Fails with `OutOfRange` if an input is not in this graph.
    pub fn make(&mut self, bubble: Bubble, inputs: &[NodeId]) -> Result<NodeId> {
        if let Some(bad) = inputs.iter().find(|input| !self.contains(**input)) {
            return Err(TsError::OutOfRange {
                index: bad.0,
                len: self.nodes.len(),
            });
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            bubble,
            inputs: SmallVec::from_slice(inputs),
        });
        Ok(id)
    }

    pub fn op(
        &mut self,
        name: impl Into<String>,
        op: impl Into<String>,
        inputs: &[NodeId],
    ) -> Result<NodeId> {
        self.make(Bubble::new(op, name), inputs)
    }

    pub fn param(&mut self, name: impl Into<String>) -> NodeId {
        self.push_leaf(Bubble::new(op::PARAMETER, name))
    }

    pub fn constant(&mut self, name: impl Into<String>, value: Tensor) -> NodeId {
        self.push_leaf(Bubble::new(op::CONST, name).with_param(param::VALUE, value))
    }

    fn push_leaf(&mut self, bubble: Bubble) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            bubble,
            inputs: SmallVec::new(),
        });
        id
    }

    /// Panics if `id` does not belong to this graph.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn bubble(&self, id: NodeId) -> &Bubble {
        &self.node(id).bubble
    }

    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).inputs
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Nodes reading `id`, in insertion order. One entry per consumer even if
    /// it reads `id` more than once.
    pub fn users(&self, id: NodeId) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| node.inputs.contains(&id))
            .map(|(user, _)| user)
            .collect()
    }

    /// Every node `roots` depend on, inputs before consumers.
    pub fn reachable(&self, roots: &[NodeId]) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<(NodeId, bool)> = roots.iter().rev().map(|&r| (r, false)).collect();
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !self.contains(id) || !seen.insert(id) {
                continue;
            }
            stack.push((id, true));
            for &input in self.inputs(id).iter().rev() {
                stack.push((input, false));
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_rejects_foreign_inputs() {
        let mut g = Graph::new();
        let x = g.param("x");
        let err = g.op("y", "relu", &[NodeId(5)]).unwrap_err();
        assert!(matches!(err, TsError::OutOfRange { index: 5, len: 1 }));
        assert_eq!(g.len(), 1);
        assert!(g.op("y", "relu", &[x]).is_ok());
    }

    #[test]
    fn test_users_and_reachable() {
        let mut g = Graph::new();
        let x = g.param("x");
        let w = g.constant("w", Tensor::from_slice(&[1.0f32], [1]).unwrap());
        let a = g.op("a", "mul", &[x, w]).unwrap();
        let b = g.op("b", "add", &[a, a]).unwrap();
        let dead = g.op("dead", "neg", &[x]).unwrap();

        assert_eq!(g.users(x), vec![a, dead]);
        assert_eq!(g.users(a), vec![b]);
        assert_eq!(g.reachable(&[b]), vec![x, w, a, b]);
        assert_eq!(g.bubble(w).op(), op::CONST);
        assert!(g.bubble(w).get(param::VALUE).is_some());
    }
}
