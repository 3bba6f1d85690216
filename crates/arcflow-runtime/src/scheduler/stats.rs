//! Execution statistics and per-node reports.

use serde::{Deserialize, Serialize};

use arcflow_core::node::NodeState;
use arcflow_core::types::NodeId;

/// Node counts per lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    /// Nodes waiting on their readiness predicate.
    pub pending: usize,
    /// Nodes sitting in the ready queue.
    pub ready: usize,
    /// Nodes currently executing.
    pub running: usize,
    /// Nodes that completed successfully.
    pub completed: usize,
    /// Nodes whose behavior failed.
    pub failed: usize,
    /// Nodes cancelled cooperatively.
    pub cancelled: usize,
}

impl StateCounts {
    /// Adds one node in `state` to the tally.
    pub fn record(&mut self, state: NodeState) {
        match state {
            NodeState::Pending => self.pending += 1,
            NodeState::Ready => self.ready += 1,
            NodeState::Running => self.running += 1,
            NodeState::Completed => self.completed += 1,
            NodeState::Failed => self.failed += 1,
            NodeState::Cancelled => self.cancelled += 1,
        }
    }

    /// Total nodes recorded.
    pub fn total(&self) -> usize {
        self.pending + self.ready + self.running + self.completed + self.failed + self.cancelled
    }
}

/// Point-in-time snapshot of a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of registered nodes.
    pub total_nodes: usize,
    /// Number of registered edges.
    pub total_edges: usize,
    /// Node counts per lifecycle state.
    pub states: StateCounts,
    /// Ids of nodes currently executing, sorted.
    pub running_nodes: Vec<NodeId>,
    /// Ids of nodes currently queued, sorted.
    pub ready_nodes: Vec<NodeId>,
}

/// Timing and outcome of one node across the most recent execution.
///
/// Offsets are milliseconds since the execution started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeReport {
    /// Node identifier.
    pub node_id: NodeId,
    /// Lifecycle state at report time.
    pub state: NodeState,
    /// When the most recent run started, if the node ran.
    pub started_at_ms: Option<u128>,
    /// When the most recent run finished, if it did.
    pub finished_at_ms: Option<u128>,
    /// Duration of the most recent run.
    pub duration_ms: Option<u128>,
    /// Message of the most recent failure, if any.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_counts_tally() {
        let mut counts = StateCounts::default();
        counts.record(NodeState::Pending);
        counts.record(NodeState::Completed);
        counts.record(NodeState::Completed);
        counts.record(NodeState::Failed);

        assert_eq!(counts.pending, 1);
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = GraphStats {
            total_nodes: 2,
            total_edges: 1,
            states: StateCounts::default(),
            running_nodes: vec!["a".into()],
            ready_nodes: vec![],
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"total_nodes\":2"));
        assert!(json.contains("\"running_nodes\":[\"a\"]"));
    }
}
