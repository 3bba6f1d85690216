//! Typed ports and their transport buffers.
//!
//! An endpoint is one port on a node: either an input or an output. Each
//! endpoint owns a FIFO buffer and moves values in one of two disciplines:
//!
//! - **Push**: the producer delivers eagerly. An output endpoint forwards
//!   every value to its connected targets; an input endpoint buffers what
//!   arrives (or hands it straight to a waiting consumer).
//! - **Pull**: the consumer drives. An output endpoint parks values in its
//!   local buffer; an input endpoint reaches upstream through its edges when
//!   asked for data.
//!
//! The mode of each side of a connection is independent: a push output can
//! feed a pull input and vice versa. Buffers are guarded by short-lived
//! locks and never held across an await.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::edge::Edge;
use crate::error::{FlowError, FlowResult};
use crate::flow_data;
use crate::types::{NodeId, PortId, Value};

/// Transport discipline of a single endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFlowMode {
    /// Producer-driven delivery into downstream buffers.
    #[default]
    Push,
    /// Consumer-driven retrieval from upstream buffers.
    Pull,
}

impl DataFlowMode {
    fn as_str(self) -> &'static str {
        match self {
            DataFlowMode::Push => "push",
            DataFlowMode::Pull => "pull",
        }
    }
}

/// Buffer plus pending awaiters of an input endpoint.
///
/// Both live under one lock so a value can never slip past a waiting
/// consumer between a buffer check and an awaiter registration.
#[derive(Default)]
struct InputState {
    buffer: VecDeque<Value>,
    waiters: VecDeque<oneshot::Sender<Value>>,
}

/// Receiving port of a node.
pub struct InputEndpoint {
    id: PortId,
    node_id: NodeId,
    mode: DataFlowMode,
    edges: Mutex<Vec<Arc<Edge>>>,
    state: Mutex<InputState>,
}

impl InputEndpoint {
    /// Creates a detached input endpoint owned by `node_id`.
    pub fn new(id: impl Into<PortId>, node_id: impl Into<NodeId>, mode: DataFlowMode) -> Self {
        Self {
            id: id.into(),
            node_id: node_id.into(),
            mode,
            edges: Mutex::new(Vec::new()),
            state: Mutex::new(InputState::default()),
        }
    }

    /// Port id, unique within the owning node.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the node this endpoint belongs to.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Transport mode of this endpoint.
    pub fn mode(&self) -> DataFlowMode {
        self.mode
    }

    /// `node.port` label used in errors and traces.
    pub fn label(&self) -> String {
        format!("{}.{}", self.node_id, self.id)
    }

    /// Delivers one value into this endpoint.
    ///
    /// Valid only in push mode. A pending awaiter (oldest first) receives the
    /// value directly; otherwise it is appended to the FIFO buffer.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::ModeMismatch`] when the endpoint is in pull mode.
    pub fn push_data(&self, value: Value) -> FlowResult<()> {
        if self.mode != DataFlowMode::Push {
            return Err(FlowError::ModeMismatch {
                endpoint: self.label(),
                operation: "push",
                mode: self.mode.as_str(),
            });
        }

        let mut state = self.state.lock();
        let mut value = value;
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(value) {
                Ok(()) => {
                    flow_data!(trace, endpoint = %self.label(), "delivered to awaiter");
                    return Ok(());
                }
                // Receiver gave up; reclaim the value and try the next one.
                Err(reclaimed) => value = reclaimed,
            }
        }
        state.buffer.push_back(value);
        flow_data!(trace, endpoint = %self.label(), depth = state.buffer.len(), "buffered");
        Ok(())
    }

    /// Retrieves one value, or `None` when nothing is available.
    ///
    /// In push mode this pops the front of the local buffer. In pull mode it
    /// chases the connected edges in insertion order and returns the first
    /// value an upstream pull-mode output yields.
    pub fn pull_data(&self) -> Option<Value> {
        match self.mode {
            DataFlowMode::Push => self.state.lock().buffer.pop_front(),
            DataFlowMode::Pull => {
                let edges = self.edges.lock().clone();
                edges.iter().find_map(|edge| edge.pull_from_source())
            }
        }
    }

    /// Resolves with the next value delivered to this endpoint.
    ///
    /// A buffered value resolves immediately (and is consumed); otherwise the
    /// caller is parked until the next [`push_data`](Self::push_data).
    pub async fn wait_for_data(&self) -> FlowResult<Value> {
        let receiver = {
            let mut state = self.state.lock();
            if let Some(value) = state.buffer.pop_front() {
                return Ok(value);
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };
        receiver.await.map_err(|_| FlowError::Cancelled)
    }

    /// True when the local buffer holds at least one value.
    pub fn has_data(&self) -> bool {
        !self.state.lock().buffer.is_empty()
    }

    /// Number of values currently buffered.
    pub fn buffered(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Readiness of this port for the owning node's readiness predicate.
    ///
    /// An unconnected port is trivially satisfied. A push port is satisfied
    /// when it has buffered data; a pull port when any upstream output has.
    pub fn is_satisfied(&self) -> bool {
        let edges = self.edges.lock();
        if edges.is_empty() {
            return true;
        }
        match self.mode {
            DataFlowMode::Push => self.has_data(),
            DataFlowMode::Pull => edges.iter().any(|edge| edge.source_has_data()),
        }
    }

    /// Registers an incident edge. Idempotent by edge id.
    pub fn register_edge(&self, edge: Arc<Edge>) {
        let mut edges = self.edges.lock();
        if edges.iter().all(|existing| existing.id() != edge.id()) {
            edges.push(edge);
        }
    }

    /// Detaches an incident edge by id. Returns whether it was present.
    pub fn remove_edge(&self, edge_id: &str) -> bool {
        let mut edges = self.edges.lock();
        let before = edges.len();
        edges.retain(|edge| edge.id() != edge_id);
        edges.len() != before
    }

    /// Snapshot of the incident edges, in insertion order.
    pub fn edges(&self) -> Vec<Arc<Edge>> {
        self.edges.lock().clone()
    }

    /// Number of incident edges.
    pub fn edge_count(&self) -> usize {
        self.edges.lock().len()
    }
}

impl std::fmt::Debug for InputEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputEndpoint")
            .field("id", &self.id)
            .field("node_id", &self.node_id)
            .field("mode", &self.mode)
            .field("buffered", &self.buffered())
            .finish()
    }
}

/// Emitting port of a node.
pub struct OutputEndpoint {
    id: PortId,
    node_id: NodeId,
    mode: DataFlowMode,
    edges: Mutex<Vec<Arc<Edge>>>,
    buffer: Mutex<VecDeque<Value>>,
}

impl OutputEndpoint {
    /// Creates a detached output endpoint owned by `node_id`.
    pub fn new(id: impl Into<PortId>, node_id: impl Into<NodeId>, mode: DataFlowMode) -> Self {
        Self {
            id: id.into(),
            node_id: node_id.into(),
            mode,
            edges: Mutex::new(Vec::new()),
            buffer: Mutex::new(VecDeque::new()),
        }
    }

    /// Port id, unique within the owning node.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the node this endpoint belongs to.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Transport mode of this endpoint.
    pub fn mode(&self) -> DataFlowMode {
        self.mode
    }

    /// `node.port` label used in errors and traces.
    pub fn label(&self) -> String {
        format!("{}.{}", self.node_id, self.id)
    }

    /// Emits one value through this endpoint.
    ///
    /// In push mode the value is forwarded to every connected edge's target
    /// before returning; per-edge delivery order is FIFO, cross-target order
    /// is unspecified. In pull mode the value is parked in the local buffer
    /// for downstream consumers to collect.
    pub fn push_data(&self, value: Value) -> FlowResult<()> {
        match self.mode {
            DataFlowMode::Push => {
                let edges = self.edges.lock().clone();
                flow_data!(trace, endpoint = %self.label(), fan_out = edges.len(), "push");
                for edge in &edges {
                    edge.transfer_data(value.clone())?;
                }
                Ok(())
            }
            DataFlowMode::Pull => {
                let mut buffer = self.buffer.lock();
                buffer.push_back(value);
                flow_data!(trace, endpoint = %self.label(), depth = buffer.len(), "parked");
                Ok(())
            }
        }
    }

    /// Removes and returns the front of the local buffer.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::ModeMismatch`] when the endpoint is in push mode;
    /// push outputs forward eagerly and never hold data.
    pub fn pull_data(&self) -> FlowResult<Option<Value>> {
        if self.mode != DataFlowMode::Pull {
            return Err(FlowError::ModeMismatch {
                endpoint: self.label(),
                operation: "pull",
                mode: self.mode.as_str(),
            });
        }
        Ok(self.buffer.lock().pop_front())
    }

    /// Front-of-buffer removal without the mode check; the pull chase in
    /// [`InputEndpoint::pull_data`] verifies the mode before calling this.
    pub(crate) fn dequeue(&self) -> Option<Value> {
        self.buffer.lock().pop_front()
    }

    /// True when the local buffer holds at least one value.
    pub fn has_data(&self) -> bool {
        !self.buffer.lock().is_empty()
    }

    /// Number of values currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Registers an incident edge. Idempotent by edge id.
    pub fn register_edge(&self, edge: Arc<Edge>) {
        let mut edges = self.edges.lock();
        if edges.iter().all(|existing| existing.id() != edge.id()) {
            edges.push(edge);
        }
    }

    /// Detaches an incident edge by id. Returns whether it was present.
    pub fn remove_edge(&self, edge_id: &str) -> bool {
        let mut edges = self.edges.lock();
        let before = edges.len();
        edges.retain(|edge| edge.id() != edge_id);
        edges.len() != before
    }

    /// Snapshot of the incident edges, in insertion order.
    pub fn edges(&self) -> Vec<Arc<Edge>> {
        self.edges.lock().clone()
    }

    /// Number of incident edges.
    pub fn edge_count(&self) -> usize {
        self.edges.lock().len()
    }
}

impl std::fmt::Debug for OutputEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputEndpoint")
            .field("id", &self.id)
            .field("node_id", &self.node_id)
            .field("mode", &self.mode)
            .field("buffered", &self.buffered())
            .finish()
    }
}

/// Direction-erased endpoint reference, used when resolving connection
/// requests by port id.
#[derive(Clone, Debug)]
pub enum EndpointRef {
    /// A receiving port.
    Input(Arc<InputEndpoint>),
    /// An emitting port.
    Output(Arc<OutputEndpoint>),
}

impl EndpointRef {
    /// Connection legality: endpoints pair only across directions.
    pub fn can_connect(&self, other: &EndpointRef) -> bool {
        matches!(
            (self, other),
            (EndpointRef::Output(_), EndpointRef::Input(_))
                | (EndpointRef::Input(_), EndpointRef::Output(_))
        )
    }

    /// `node.port` label used in errors.
    pub fn label(&self) -> String {
        match self {
            EndpointRef::Input(ep) => ep.label(),
            EndpointRef::Output(ep) => ep.label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_input() -> Arc<InputEndpoint> {
        Arc::new(InputEndpoint::new("in", "sink", DataFlowMode::Push))
    }

    #[test]
    fn test_push_buffers_fifo() {
        let input = push_input();
        for i in 1..=3i64 {
            input.push_data(Value::from(i)).unwrap();
        }

        assert!(input.has_data());
        assert_eq!(input.buffered(), 3);
        assert_eq!(input.pull_data().unwrap().as_i64(), Some(1));
        assert_eq!(input.pull_data().unwrap().as_i64(), Some(2));
        assert_eq!(input.pull_data().unwrap().as_i64(), Some(3));
        assert!(input.pull_data().is_none());
    }

    #[test]
    fn test_push_on_pull_input_is_mode_mismatch() {
        let input = InputEndpoint::new("in", "sink", DataFlowMode::Pull);
        let err = input.push_data(Value::Null).unwrap_err();
        assert!(matches!(err, FlowError::ModeMismatch { .. }));
    }

    #[test]
    fn test_pull_on_push_output_is_mode_mismatch() {
        let output = OutputEndpoint::new("out", "src", DataFlowMode::Push);
        let err = output.pull_data().unwrap_err();
        assert!(matches!(err, FlowError::ModeMismatch { .. }));
    }

    #[test]
    fn test_pull_output_parks_locally() {
        let output = OutputEndpoint::new("out", "src", DataFlowMode::Pull);
        output.push_data(Value::from(7i64)).unwrap();
        assert!(output.has_data());
        assert_eq!(output.pull_data().unwrap().unwrap().as_i64(), Some(7));
        assert!(output.pull_data().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wait_for_data_resolves_from_buffer() {
        let input = push_input();
        input.push_data(Value::from("x")).unwrap();

        let value = input.wait_for_data().await.unwrap();
        assert_eq!(value.as_str(), Some("x"));
        assert!(!input.has_data());
    }

    #[tokio::test]
    async fn test_wait_for_data_resolved_by_push() {
        let input = push_input();

        let waiter = {
            let input = Arc::clone(&input);
            tokio::spawn(async move { input.wait_for_data().await })
        };
        tokio::task::yield_now().await;

        input.push_data(Value::from(42i64)).unwrap();
        let value = waiter.await.unwrap().unwrap();
        assert_eq!(value.as_i64(), Some(42));
        // The value went to the awaiter, not the buffer.
        assert!(!input.has_data());
    }

    #[tokio::test]
    async fn test_awaiters_resolve_in_fifo_order() {
        let input = push_input();

        let first = {
            let input = Arc::clone(&input);
            tokio::spawn(async move { input.wait_for_data().await })
        };
        tokio::task::yield_now().await;
        let second = {
            let input = Arc::clone(&input);
            tokio::spawn(async move { input.wait_for_data().await })
        };
        tokio::task::yield_now().await;

        input.push_data(Value::from(1i64)).unwrap();
        input.push_data(Value::from(2i64)).unwrap();

        assert_eq!(first.await.unwrap().unwrap().as_i64(), Some(1));
        assert_eq!(second.await.unwrap().unwrap().as_i64(), Some(2));
    }

    #[test]
    fn test_unconnected_input_is_satisfied() {
        let input = push_input();
        assert!(input.is_satisfied());
    }

    #[test]
    fn test_connected_push_input_needs_data() {
        let output = Arc::new(OutputEndpoint::new("out", "src", DataFlowMode::Push));
        let input = push_input();
        let edge = Arc::new(Edge::between(&output, &input));
        input.register_edge(Arc::clone(&edge));

        assert!(!input.is_satisfied());
        input.push_data(Value::Null).unwrap();
        assert!(input.is_satisfied());
    }

    #[test]
    fn test_pull_input_chases_upstream() {
        let output = Arc::new(OutputEndpoint::new("out", "src", DataFlowMode::Pull));
        let input = Arc::new(InputEndpoint::new("in", "sink", DataFlowMode::Pull));
        let edge = Arc::new(Edge::between(&output, &input));
        output.register_edge(Arc::clone(&edge));
        input.register_edge(Arc::clone(&edge));

        assert!(!input.is_satisfied());
        output.push_data(Value::from(5i64)).unwrap();
        assert!(input.is_satisfied());
        assert_eq!(input.pull_data().unwrap().as_i64(), Some(5));
        assert!(input.pull_data().is_none());
    }

    #[test]
    fn test_register_edge_idempotent() {
        let output = Arc::new(OutputEndpoint::new("out", "src", DataFlowMode::Push));
        let input = push_input();
        let edge = Arc::new(Edge::between(&output, &input));

        input.register_edge(Arc::clone(&edge));
        input.register_edge(Arc::clone(&edge));
        assert_eq!(input.edge_count(), 1);

        assert!(input.remove_edge(edge.id()));
        assert_eq!(input.edge_count(), 0);
        assert!(!input.remove_edge(edge.id()));
    }

    #[test]
    fn test_can_connect_requires_opposite_directions() {
        let output = Arc::new(OutputEndpoint::new("out", "a", DataFlowMode::Push));
        let input = Arc::new(InputEndpoint::new("in", "b", DataFlowMode::Push));

        let o = EndpointRef::Output(Arc::clone(&output));
        let i = EndpointRef::Input(Arc::clone(&input));
        assert!(o.can_connect(&i));
        assert!(i.can_connect(&o));
        assert!(!o.can_connect(&EndpointRef::Output(output)));
        assert!(!i.can_connect(&EndpointRef::Input(input)));
    }
}
