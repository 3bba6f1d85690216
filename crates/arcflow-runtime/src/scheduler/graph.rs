//! The graph: node/edge registries and live mutation.
//!
//! The graph is the single strong owner of nodes (which own their endpoints)
//! and of edges (which reference endpoints weakly). All mutation flows
//! through the methods here so the registries, the ready queue and the
//! handle map stay consistent; the dispatch loop lives in
//! [`dispatch`](super::dispatch) and shares the same scheduler core.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;

use arcflow_core::edge::Edge;
use arcflow_core::endpoint::EndpointRef;
use arcflow_core::error::{FlowError, FlowResult};
use arcflow_core::flow_sched;
use arcflow_core::node::{Node, NodeState};
use arcflow_core::types::{EdgeId, NodeId};

use crate::scheduler::config::GraphConfig;
use crate::scheduler::heap::{HeapHandle, PairingHeap};
use crate::scheduler::policy::{DefaultPolicy, SchedulingPolicy};
use crate::scheduler::stats::{GraphStats, NodeReport, StateCounts};

/// Queue, handle map and dispatch bookkeeping, guarded by one lock that is
/// never held across an await.
pub(crate) struct SchedulerCore {
    pub(crate) queue: PairingHeap<Arc<Node>>,
    pub(crate) handles: HashMap<NodeId, HeapHandle>,
    pub(crate) running: HashSet<NodeId>,
    pub(crate) completed: HashSet<NodeId>,
}

/// A dataflow graph plus its scheduler state.
pub struct Graph {
    pub(crate) config: GraphConfig,
    pub(crate) policy: Arc<dyn SchedulingPolicy>,
    pub(crate) nodes: DashMap<NodeId, Arc<Node>>,
    pub(crate) edges: DashMap<EdgeId, Arc<Edge>>,
    pub(crate) core: Mutex<SchedulerCore>,
    /// Start of the most recent `execute`, the zero point for reports.
    pub(crate) epoch: Mutex<Option<Instant>>,
}

impl Graph {
    /// Creates a graph with the default scheduling policy.
    pub fn new(config: GraphConfig) -> Self {
        Self::with_policy(config, Arc::new(DefaultPolicy))
    }

    /// Creates a graph ordered by a caller-supplied policy.
    pub fn with_policy(config: GraphConfig, policy: Arc<dyn SchedulingPolicy>) -> Self {
        let queue_policy = Arc::clone(&policy);
        let queue = PairingHeap::new(move |a: &Arc<Node>, b: &Arc<Node>| {
            queue_policy.compare(a, b)
        });
        flow_sched!(debug, policy = policy.name(), max_concurrency = config.max_concurrency, "graph created");
        Self {
            config,
            policy,
            nodes: DashMap::new(),
            edges: DashMap::new(),
            core: Mutex::new(SchedulerCore {
                queue,
                handles: HashMap::new(),
                running: HashSet::new(),
                completed: HashSet::new(),
            }),
            epoch: Mutex::new(None),
        }
    }

    /// Configuration this graph runs under.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    // ---- mutation -------------------------------------------------------

    /// Registers a node.
    ///
    /// The graph takes ownership; the returned `Arc` is an observer handle.
    /// If the node's readiness predicate already holds it is promoted to
    /// Ready and enqueued immediately.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::DuplicateNode`] when the id is taken.
    pub fn add_node(&self, node: Node) -> FlowResult<Arc<Node>> {
        let id = node.id().to_string();
        let node = Arc::new(node);
        match self.nodes.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(FlowError::DuplicateNode { id });
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&node));
            }
        }
        if self.policy.observes_insertions() {
            self.policy.note_insertion(&node);
        }
        flow_sched!(debug, node = %id, "node added");
        self.promote_if_ready(&node);
        Ok(node)
    }

    /// Deregisters a node, an absent id being a no-op.
    ///
    /// A running node is cancelled and dropped from the running set; a
    /// queued node is excised from the ready queue by handle. Every incident
    /// edge is removed through [`remove_edge`](Self::remove_edge).
    pub fn remove_node(&self, id: &str) {
        let Some((_, node)) = self.nodes.remove(id) else {
            return;
        };
        {
            let mut core = self.core.lock();
            core.running.remove(id);
            core.completed.remove(id);
            if let Some(handle) = core.handles.remove(id) {
                // The handle map is kept in lockstep with the queue, so this
                // only fails if the entry was already polled this instant.
                let _ = core.queue.delete(handle);
            }
        }
        node.cancel();

        let incident: Vec<EdgeId> = node
            .input_endpoints()
            .iter()
            .flat_map(|ep| ep.edges())
            .chain(node.output_endpoints().iter().flat_map(|ep| ep.edges()))
            .map(|edge| edge.id().to_string())
            .collect();
        for edge_id in incident {
            self.remove_edge(&edge_id);
        }
        flow_sched!(debug, node = %id, "node removed");
    }

    /// Connects an output port to an input port, creating an edge.
    ///
    /// Re-connecting an existing pair returns the existing edge. Readiness
    /// is deliberately not re-evaluated here: a new incident edge can only
    /// delay readiness, never enable it.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::UnknownNode`] / [`FlowError::UnknownPort`] for
    /// missing pieces and [`FlowError::IncompatibleEndpoints`] when the pair
    /// does not run output → input.
    pub fn connect(
        &self,
        source_node: &str,
        source_port: &str,
        target_node: &str,
        target_port: &str,
    ) -> FlowResult<Arc<Edge>> {
        let source = self.node(source_node).ok_or_else(|| FlowError::UnknownNode {
            id: source_node.to_string(),
        })?;
        let target = self.node(target_node).ok_or_else(|| FlowError::UnknownNode {
            id: target_node.to_string(),
        })?;

        let source_ref = source
            .find_endpoint(source_port)
            .ok_or_else(|| FlowError::UnknownPort {
                node: source_node.to_string(),
                port: source_port.to_string(),
            })?;
        let target_ref = target
            .find_endpoint(target_port)
            .ok_or_else(|| FlowError::UnknownPort {
                node: target_node.to_string(),
                port: target_port.to_string(),
            })?;

        let source_label = source_ref.label();
        let target_label = target_ref.label();
        let incompatible = || FlowError::IncompatibleEndpoints {
            from: source_label.clone(),
            target: target_label.clone(),
        };
        if !source_ref.can_connect(&target_ref) {
            return Err(incompatible());
        }
        // Orientation matters beyond direction opposition: data runs from an
        // output endpoint into an input endpoint.
        let (EndpointRef::Output(output), EndpointRef::Input(input)) = (source_ref, target_ref)
        else {
            return Err(incompatible());
        };

        let edge_id = Edge::canonical_id(source_node, source_port, target_node, target_port);
        if let Some(existing) = self.edges.get(&edge_id) {
            return Ok(Arc::clone(existing.value()));
        }

        let edge = Arc::new(Edge::between(&output, &input));
        output.register_edge(Arc::clone(&edge));
        input.register_edge(Arc::clone(&edge));
        self.edges.insert(edge_id, Arc::clone(&edge));
        flow_sched!(debug, edge = %edge.id(), "connected");
        Ok(edge)
    }

    /// Removes an edge, an absent id being a no-op.
    ///
    /// The target node's readiness is re-evaluated: dropping a blocking edge
    /// can make a Pending node Ready within the same turn.
    pub fn remove_edge(&self, edge_id: &str) {
        let Some((_, edge)) = self.edges.remove(edge_id) else {
            return;
        };
        if let Some(source) = edge.source() {
            source.remove_edge(edge_id);
        }
        if let Some(target) = edge.target() {
            target.remove_edge(edge_id);
        }
        flow_sched!(debug, edge = %edge_id, "edge removed");

        if let Some(target_node) = self.node(edge.target_node()) {
            self.promote_if_ready(&target_node);
        }
    }

    /// Cancels all running nodes and empties every registry.
    pub fn clear(&self) {
        for entry in self.nodes.iter() {
            if entry.value().state() == NodeState::Running {
                entry.value().cancel();
            }
        }
        {
            let mut core = self.core.lock();
            core.queue.clear();
            core.handles.clear();
            core.running.clear();
            core.completed.clear();
        }
        self.nodes.clear();
        self.edges.clear();
        flow_sched!(debug, "graph cleared");
    }

    // ---- lookup ---------------------------------------------------------

    /// Observer handle on a registered node.
    pub fn node(&self, id: &str) -> Option<Arc<Node>> {
        self.nodes.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Observer handle on a registered edge.
    pub fn edge(&self, id: &str) -> Option<Arc<Edge>> {
        self.edges.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of registered edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    // ---- readiness ------------------------------------------------------

    /// Promotes a Pending node whose readiness predicate holds: marks it
    /// Ready and enqueues it, recording the handle for later deletion.
    pub(crate) fn promote_if_ready(&self, node: &Arc<Node>) {
        if node.state() != NodeState::Pending || !node.is_ready() {
            return;
        }
        let mut core = self.core.lock();
        if core.handles.contains_key(node.id()) {
            return;
        }
        if !node.mark_ready() {
            return;
        }
        let handle = core.queue.insert(Arc::clone(node));
        core.handles.insert(node.id().to_string(), handle);
        flow_sched!(trace, node = %node.id(), "enqueued");
    }

    // ---- observation ----------------------------------------------------

    /// Point-in-time snapshot of node/edge counts and per-state tallies.
    pub fn stats(&self) -> GraphStats {
        let mut states = StateCounts::default();
        for entry in self.nodes.iter() {
            states.record(entry.value().state());
        }
        let core = self.core.lock();
        let mut running_nodes: Vec<NodeId> = core.running.iter().cloned().collect();
        let mut ready_nodes: Vec<NodeId> = core.handles.keys().cloned().collect();
        drop(core);
        running_nodes.sort_unstable();
        ready_nodes.sort_unstable();

        GraphStats {
            total_nodes: self.nodes.len(),
            total_edges: self.edges.len(),
            states,
            running_nodes,
            ready_nodes,
        }
    }

    /// Ids of nodes that completed during the most recent executions,
    /// sorted.
    pub fn completed_nodes(&self) -> Vec<NodeId> {
        let core = self.core.lock();
        let mut ids: Vec<NodeId> = core.completed.iter().cloned().collect();
        drop(core);
        ids.sort_unstable();
        ids
    }

    /// Per-node timing and outcome rows for the most recent execution,
    /// sorted by node id. Offsets are relative to the execute start.
    pub fn report(&self) -> Vec<NodeReport> {
        let epoch = *self.epoch.lock();
        let mut rows: Vec<NodeReport> = self
            .nodes
            .iter()
            .map(|entry| {
                let node = entry.value();
                let started = node.started_at();
                let finished = node.finished_at();
                let offset = |at: Option<Instant>| {
                    match (epoch, at) {
                        (Some(zero), Some(t)) => Some(t.duration_since(zero).as_millis()),
                        _ => None,
                    }
                };
                NodeReport {
                    node_id: node.id().to_string(),
                    state: node.state(),
                    started_at_ms: offset(started),
                    finished_at_ms: offset(finished),
                    duration_ms: match (started, finished) {
                        (Some(s), Some(f)) => Some(f.duration_since(s).as_millis()),
                        _ => None,
                    },
                    last_error: node.last_error(),
                }
            })
            .collect();
        rows.sort_unstable_by(|a, b| a.node_id.cmp(&b.node_id));
        rows
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("policy", &self.policy.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CollectValues, EmitValues};
    use arcflow_core::endpoint::DataFlowMode;
    use arcflow_core::node::NodeSpec;
    use arcflow_core::types::Value;
    use parking_lot::Mutex as PlMutex;

    fn source(id: &str, values: Vec<Value>) -> Node {
        let mut node = Node::new(
            NodeSpec::new(id),
            Arc::new(EmitValues {
                port: "out",
                values,
            }),
        );
        node.add_output_endpoint("out", DataFlowMode::Push).unwrap();
        node
    }

    fn sink(id: &str) -> (Node, Arc<PlMutex<Vec<Value>>>) {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let mut node = Node::new(
            NodeSpec::new(id),
            Arc::new(CollectValues {
                port: "in",
                seen: Arc::clone(&seen),
            }),
        );
        node.add_input_endpoint("in", DataFlowMode::Push).unwrap();
        (node, seen)
    }

    #[test]
    fn test_add_node_duplicate_id() {
        let graph = Graph::new(GraphConfig::default());
        graph.add_node(source("a", vec![])).unwrap();
        let err = graph.add_node(source("a", vec![])).unwrap_err();
        assert!(matches!(err, FlowError::DuplicateNode { .. }));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_source_enqueued_on_add() {
        let graph = Graph::new(GraphConfig::default());
        let node = graph.add_node(source("a", vec![])).unwrap();
        assert_eq!(node.state(), NodeState::Ready);

        let stats = graph.stats();
        assert_eq!(stats.ready_nodes, vec!["a".to_string()]);
        assert_eq!(stats.states.ready, 1);
    }

    #[test]
    fn test_connect_and_canonical_edge_id() {
        let graph = Graph::new(GraphConfig::default());
        graph.add_node(source("src", vec![])).unwrap();
        let (sink_node, _) = sink("dst");
        graph.add_node(sink_node).unwrap();

        let edge = graph.connect("src", "out", "dst", "in").unwrap();
        assert_eq!(edge.id(), "src.out->dst.in");
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.edge("src.out->dst.in").is_some());

        // Re-connecting the same pair is idempotent.
        let again = graph.connect("src", "out", "dst", "in").unwrap();
        assert_eq!(again.id(), edge.id());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_connect_error_taxonomy() {
        let graph = Graph::new(GraphConfig::default());
        graph.add_node(source("src", vec![])).unwrap();
        let (sink_node, _) = sink("dst");
        graph.add_node(sink_node).unwrap();

        assert!(matches!(
            graph.connect("ghost", "out", "dst", "in"),
            Err(FlowError::UnknownNode { .. })
        ));
        assert!(matches!(
            graph.connect("src", "ghost", "dst", "in"),
            Err(FlowError::UnknownPort { .. })
        ));
        // Input as source: direction-incompatible.
        assert!(matches!(
            graph.connect("dst", "in", "src", "out"),
            Err(FlowError::IncompatibleEndpoints { .. })
        ));
    }

    #[test]
    fn test_connect_does_not_demote_ready_target() {
        let graph = Graph::new(GraphConfig::default());
        graph.add_node(source("src", vec![])).unwrap();
        let (sink_node, _) = sink("dst");
        let dst = graph.add_node(sink_node).unwrap();

        // Unconnected input: the sink was promoted at add time.
        assert_eq!(dst.state(), NodeState::Ready);
        graph.connect("src", "out", "dst", "in").unwrap();
        // connect never re-evaluates readiness.
        assert_eq!(dst.state(), NodeState::Ready);
    }

    #[test]
    fn test_edge_removal_promotes_target_same_turn() {
        let graph = Graph::new(GraphConfig::default());
        graph.add_node(source("src", vec![])).unwrap();
        let (sink_node, _) = sink("dst");
        let dst = graph.add_node(sink_node).unwrap();
        graph.connect("src", "out", "dst", "in").unwrap();

        // Put the sink where a stale-readiness demotion would leave it:
        // Pending, out of the queue, blocked by the connected empty edge.
        {
            let mut core = graph.core.lock();
            if let Some(handle) = core.handles.remove("dst") {
                core.queue.delete(handle).unwrap();
            }
        }
        dst.demote_to_pending();
        assert_eq!(dst.state(), NodeState::Pending);
        assert!(!dst.is_ready());

        // Removing the last blocking edge promotes within the same turn.
        graph.remove_edge("src.out->dst.in");
        assert_eq!(dst.state(), NodeState::Ready);
        assert!(graph.stats().ready_nodes.contains(&"dst".to_string()));
    }

    #[test]
    fn test_remove_node_excises_queue_entry_and_edges() {
        let graph = Graph::new(GraphConfig::default());
        graph.add_node(source("src", vec![])).unwrap();
        let (sink_node, _) = sink("dst");
        graph.add_node(sink_node).unwrap();
        graph.connect("src", "out", "dst", "in").unwrap();

        graph.remove_node("src");
        assert!(graph.node("src").is_none());
        assert_eq!(graph.edge_count(), 0);
        let stats = graph.stats();
        assert!(!stats.ready_nodes.contains(&"src".to_string()));
        // The sink's blocking edge went away with the node.
        assert!(graph.node("dst").unwrap().is_ready());

        // Absent ids are a no-op.
        graph.remove_node("src");
    }

    #[test]
    fn test_clear_empties_everything() {
        let graph = Graph::new(GraphConfig::default());
        graph.add_node(source("a", vec![])).unwrap();
        graph.add_node(source("b", vec![])).unwrap();
        let (sink_node, _) = sink("c");
        graph.add_node(sink_node).unwrap();
        graph.connect("a", "out", "c", "in").unwrap();

        graph.clear();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        let stats = graph.stats();
        assert_eq!(stats.states.total(), 0);
        assert!(stats.ready_nodes.is_empty());
    }

    #[test]
    fn test_stats_counts_states() {
        let graph = Graph::new(GraphConfig::default());
        graph.add_node(source("a", vec![])).unwrap();
        let (mut sink_node, _) = sink("b");
        sink_node
            .add_input_endpoint("aux", DataFlowMode::Push)
            .unwrap();
        graph.add_node(sink_node).unwrap();
        graph.connect("a", "out", "b", "in").unwrap();
        // b stayed Ready from add time; a is Ready too.
        let stats = graph.stats();
        assert_eq!(stats.total_nodes, 2);
        assert_eq!(stats.total_edges, 1);
        assert_eq!(stats.states.ready, 2);
        assert_eq!(stats.states.total(), 2);
    }
}
