//! Node registry
//!
//! Callers depend only on [`NodeSelector`]; the strategy behind it decides
//! which node a job lands on.

use spritestack_core::domain::node::ComputeNode;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// Selects a compute node for a job
pub trait NodeSelector: Send + Sync {
    /// Returns the node `job_id` should be dispatched to, if any is available
    fn select(&self, job_id: Uuid) -> Option<ComputeNode>;

    /// All nodes known to this selector
    fn nodes(&self) -> &[ComputeNode];
}

/// Passes every job to the same node
pub struct SingleNode {
    node: [ComputeNode; 1],
}

impl SingleNode {
    pub fn new(node: ComputeNode) -> Self {
        Self { node: [node] }
    }
}

impl NodeSelector for SingleNode {
    fn select(&self, _job_id: Uuid) -> Option<ComputeNode> {
        Some(self.node[0].clone())
    }

    fn nodes(&self) -> &[ComputeNode] {
        &self.node
    }
}

/// Cycles through a fixed list of nodes
pub struct RoundRobin {
    nodes: Vec<ComputeNode>,
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new(nodes: Vec<ComputeNode>) -> Self {
        Self {
            nodes,
            next: AtomicUsize::new(0),
        }
    }
}

impl NodeSelector for RoundRobin {
    fn select(&self, _job_id: Uuid) -> Option<ComputeNode> {
        if self.nodes.is_empty() {
            return None;
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.nodes.len();
        Some(self.nodes[index].clone())
    }

    fn nodes(&self) -> &[ComputeNode] {
        &self.nodes
    }
}
