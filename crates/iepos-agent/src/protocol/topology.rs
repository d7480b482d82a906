//! Static tree topology
//!
//! Children are kept in ascending id order. That order is the canonical
//! child order every node uses for mixed-radix decoding.

use std::collections::VecDeque;

use iepos_common::{ConfigError, NodeId, Result};

/// One node's view of the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTopology {
    pub id: NodeId,
    /// Absent iff root
    pub parent: Option<NodeId>,
    /// Canonical child order
    pub children: Vec<NodeId>,
}

impl NodeTopology {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Position of `child` in the canonical order
    pub fn child_position(&self, child: NodeId) -> Option<usize> {
        self.children.iter().position(|c| *c == child)
    }
}

/// A rooted tree over nodes `0..len`
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<NodeTopology>,
    root: NodeId,
}

impl Topology {
    /// Build from `parents[i]`, the parent index of node `i` (`None` for the
    /// root). Requires exactly one root and every node reachable from it.
    pub fn from_parents(parents: &[Option<usize>]) -> Result<Self> {
        let len = parents.len();
        if len == 0 {
            return Err(ConfigError::InvalidTopology("empty tree".into()).into());
        }

        let mut nodes: Vec<NodeTopology> = (0..len)
            .map(|i| NodeTopology {
                id: NodeId::from(i),
                parent: parents[i].map(NodeId::from),
                children: Vec::new(),
            })
            .collect();

        let mut root = None;
        for (i, parent) in parents.iter().enumerate() {
            match parent {
                None if root.is_some() => {
                    return Err(ConfigError::InvalidTopology(format!("multiple roots: {} and {}", root.unwrap_or(0), i)).into());
                }
                None => root = Some(i),
                Some(p) if *p >= len || *p == i => {
                    return Err(ConfigError::InvalidTopology(format!("node {} has invalid parent {}", i, p)).into());
                }
                Some(p) => nodes[*p].children.push(NodeId::from(i)),
            }
        }
        let root = root.ok_or_else(|| ConfigError::InvalidTopology("no root".into()))?;

        // every node must be reachable from the root, which also rules out cycles
        let mut seen = vec![false; len];
        let mut queue = VecDeque::from([root]);
        seen[root] = true;
        while let Some(i) = queue.pop_front() {
            for child in &nodes[i].children {
                if !seen[child.index()] {
                    seen[child.index()] = true;
                    queue.push_back(child.index());
                }
            }
        }
        if let Some(orphan) = seen.iter().position(|s| !*s) {
            return Err(ConfigError::InvalidTopology(format!("node {} is not reachable from the root", orphan)).into());
        }

        Ok(Self {
            nodes,
            root: NodeId::from(root),
        })
    }

    /// Balanced tree in breadth-first order: parent of `i` is `(i - 1) / branching`
    pub fn balanced(num_nodes: usize, branching: usize) -> Result<Self> {
        if branching == 0 {
            return Err(ConfigError::InvalidTopology("branching factor must be at least 1".into()).into());
        }
        let parents: Vec<Option<usize>> = (0..num_nodes)
            .map(|i| if i == 0 { None } else { Some((i - 1) / branching) })
            .collect();
        Self::from_parents(&parents)
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeTopology> {
        self.nodes.get(id.index())
    }

    pub fn nodes(&self) -> &[NodeTopology] {
        &self.nodes
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Hops from the root
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        let mut node = self.node(id)?;
        let mut depth = 0;
        while let Some(parent) = node.parent {
            node = self.node(parent)?;
            depth += 1;
        }
        Some(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain() {
        let topology = Topology::from_parents(&[None, Some(0), Some(1)]).unwrap();
        assert_eq!(topology.root(), NodeId(0));
        assert_eq!(topology.node(NodeId(1)).unwrap().children, vec![NodeId(2)]);
        assert!(topology.node(NodeId(2)).unwrap().is_leaf());
        assert_eq!(topology.depth(NodeId(2)), Some(2));
    }

    #[test]
    fn test_children_in_id_order() {
        let topology = Topology::from_parents(&[Some(3), Some(3), Some(3), None]).unwrap();
        let root = topology.node(topology.root()).unwrap();
        assert_eq!(root.children, vec![NodeId(0), NodeId(1), NodeId(2)]);
        assert_eq!(root.child_position(NodeId(2)), Some(2));
    }

    #[test]
    fn test_balanced() {
        let topology = Topology::balanced(7, 2).unwrap();
        assert_eq!(topology.node(NodeId(0)).unwrap().children, vec![NodeId(1), NodeId(2)]);
        assert_eq!(topology.node(NodeId(2)).unwrap().children, vec![NodeId(5), NodeId(6)]);
        assert_eq!(topology.depth(NodeId(6)), Some(2));
    }

    #[test]
    fn test_rejects_invalid_trees() {
        assert!(Topology::from_parents(&[]).is_err());
        assert!(Topology::from_parents(&[None, None]).is_err());
        assert!(Topology::from_parents(&[Some(1), Some(0)]).is_err());
        // 1 and 2 form a cycle detached from the root
        assert!(Topology::from_parents(&[None, Some(2), Some(1)]).is_err());
        assert!(Topology::from_parents(&[None, Some(5)]).is_err());
        assert!(Topology::balanced(3, 0).is_err());
    }
}
