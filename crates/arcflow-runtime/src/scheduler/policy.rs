//! Scheduling policies: total orders over ready nodes.
//!
//! A policy induces the extraction order of the ready queue. Policies must
//! be pure functions of the nodes' observable attributes; a policy that
//! needs to track graph mutations (like [`TemporalPolicy`]) declares the
//! interest through [`SchedulingPolicy::observes_insertions`] and is fed by
//! the graph from `add_node`.
//!
//! Queue position is fixed at enqueue time: if an attribute consulted by the
//! comparator changes while a node is queued, the queue is not re-sorted.
//! This is acceptable because a node is only queued once its dependencies
//! are already satisfied.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use dashmap::DashMap;

use arcflow_core::node::Node;
use arcflow_core::types::NodeId;

/// A total order over nodes, consulted at enqueue and extraction.
pub trait SchedulingPolicy: Send + Sync {
    /// Compares two nodes; `Less` means `a` is dispatched first.
    fn compare(&self, a: &Node, b: &Node) -> Ordering;

    /// Capability query: whether this policy wants to observe node
    /// insertions via [`note_insertion`](Self::note_insertion).
    fn observes_insertions(&self) -> bool {
        false
    }

    /// Notification hook, invoked from `Graph::add_node` for policies that
    /// declare interest.
    fn note_insertion(&self, _node: &Node) {}

    /// Short policy name used in traces.
    fn name(&self) -> &'static str;
}

/// Default order: priority ascending (lower = more important), then
/// in-degree ascending (favoring nodes with fewer remaining dependencies),
/// then cost ascending.
#[derive(Debug, Default)]
pub struct DefaultPolicy;

impl SchedulingPolicy for DefaultPolicy {
    fn compare(&self, a: &Node, b: &Node) -> Ordering {
        a.priority()
            .cmp(&b.priority())
            .then_with(|| a.in_degree().cmp(&b.in_degree()))
            .then_with(|| a.cost().cmp(&b.cost()))
    }

    fn name(&self) -> &'static str {
        "default"
    }
}

/// Insertion order: nodes dispatch in the order they were added to the
/// graph, regardless of priority.
#[derive(Debug, Default)]
pub struct TemporalPolicy {
    sequence: AtomicU64,
    order: DashMap<NodeId, u64>,
}

impl TemporalPolicy {
    /// Creates a policy with an empty insertion log.
    pub fn new() -> Self {
        Self::default()
    }

    fn rank(&self, node: &Node) -> u64 {
        // A node the policy never saw inserted sorts last.
        self.order
            .get(node.id())
            .map(|entry| *entry.value())
            .unwrap_or(u64::MAX)
    }
}

impl SchedulingPolicy for TemporalPolicy {
    fn compare(&self, a: &Node, b: &Node) -> Ordering {
        self.rank(a).cmp(&self.rank(b))
    }

    fn observes_insertions(&self) -> bool {
        true
    }

    fn note_insertion(&self, node: &Node) {
        self.order
            .entry(node.id().to_string())
            .or_insert_with(|| self.sequence.fetch_add(1, AtomicOrdering::Relaxed));
    }

    fn name(&self) -> &'static str {
        "temporal"
    }
}
