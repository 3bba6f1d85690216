//! Nodes: user-supplied work units and their lifecycle.
//!
//! A node pairs immutable scheduling attributes (priority, cost, advisory
//! timeout/retries, metadata) and a fixed set of ports with a user-supplied
//! [`NodeBehavior`]. The scheduler drives the node through the lifecycle
//! below. `Failed` and `Cancelled` are dead ends; `Completed` is left only
//! through an explicit [`Node::rearm`] when buffered input remains.
//!
//! ```text
//! Pending ──(readiness satisfied)──► Ready ──(dispatched)──► Running
//! Running ──(run returns Ok)──► Completed
//! Running ──(run returns Err)──► Failed
//! Pending | Ready | Running ──(cancel)──► Cancelled
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::context::NodeContext;
use crate::endpoint::{DataFlowMode, EndpointRef, InputEndpoint, OutputEndpoint};
use crate::error::{FlowError, FlowResult};
use crate::flow_node;
use crate::types::{NodeId, Value};

/// Lifecycle state of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Waiting for its readiness predicate to hold.
    Pending,
    /// Readiness satisfied; sitting in the ready queue.
    Ready,
    /// Currently executing its behavior.
    Running,
    /// Behavior returned successfully. Left only through an explicit
    /// [`rearm`](Node::rearm) when residual buffered input allows another
    /// run.
    Completed,
    /// Behavior returned an error; terminal.
    Failed,
    /// Cancelled cooperatively; terminal.
    Cancelled,
}

impl NodeState {
    /// True for states the scheduler will not dispatch from without an
    /// explicit [`rearm`](Node::rearm).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Completed | NodeState::Failed | NodeState::Cancelled
        )
    }
}

/// User-supplied work contract.
///
/// Behaviors read their resolved inputs from the [`NodeContext`], emit
/// results through [`NodeContext::set_output`], and are expected to observe
/// the cancellation token at their own await points; the scheduler never
/// terminates a run forcefully.
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    /// Executes one invocation of this node.
    async fn run(&self, ctx: &mut NodeContext) -> FlowResult<()>;
}

/// Immutable scheduling attributes of a node.
#[derive(Clone, Debug)]
pub struct NodeSpec {
    /// Stable id, unique within a graph.
    pub id: NodeId,
    /// Scheduling priority; lower values are more important.
    pub priority: i64,
    /// Relative execution cost, used as a scheduling tiebreaker.
    pub cost: u64,
    /// Advisory per-run timeout; enforcement is policy-level.
    pub timeout: Duration,
    /// Advisory retry budget for user-built retrying behaviors.
    pub retries: u32,
    /// Opaque key/value bag carried alongside the node.
    pub metadata: HashMap<String, Value>,
}

impl NodeSpec {
    /// Creates a spec with the default attributes (priority 0, cost 1,
    /// 30 s advisory timeout, no retries).
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            cost: 1,
            timeout: Duration::from_millis(30_000),
            retries: 0,
            metadata: HashMap::new(),
        }
    }

    /// Sets the scheduling priority (lower = more important).
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the relative execution cost.
    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = cost;
        self
    }

    /// Sets the advisory timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the advisory retry budget.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Attaches one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Mutable execution record, guarded by one short-lived lock.
struct NodeRuntime {
    state: NodeState,
    /// Live only while the node is Running.
    cancel: Option<CancellationToken>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    last_error: Option<String>,
}

/// A vertex of the dataflow graph.
///
/// Ports are added while the node is still owned by the caller; once the
/// node moves into a graph (behind `Arc`) the port set is fixed for its
/// lifetime.
pub struct Node {
    spec: NodeSpec,
    behavior: Arc<dyn NodeBehavior>,
    inputs: Vec<Arc<InputEndpoint>>,
    outputs: Vec<Arc<OutputEndpoint>>,
    runtime: Mutex<NodeRuntime>,
}

impl Node {
    /// Creates a node from its spec and behavior, with no ports.
    pub fn new(spec: NodeSpec, behavior: Arc<dyn NodeBehavior>) -> Self {
        Self {
            spec,
            behavior,
            inputs: Vec::new(),
            outputs: Vec::new(),
            runtime: Mutex::new(NodeRuntime {
                state: NodeState::Pending,
                cancel: None,
                started_at: None,
                finished_at: None,
                last_error: None,
            }),
        }
    }

    /// Stable node id.
    pub fn id(&self) -> &str {
        &self.spec.id
    }

    /// Scheduling priority; lower values are more important.
    pub fn priority(&self) -> i64 {
        self.spec.priority
    }

    /// Relative execution cost.
    pub fn cost(&self) -> u64 {
        self.spec.cost
    }

    /// Advisory per-run timeout.
    pub fn timeout(&self) -> Duration {
        self.spec.timeout
    }

    /// Advisory retry budget.
    pub fn retries(&self) -> u32 {
        self.spec.retries
    }

    /// Metadata bag.
    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.spec.metadata
    }

    // ---- ports ----------------------------------------------------------

    /// Declares an input endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::DuplicatePort`] when the port id is already
    /// declared on this node, in either direction.
    pub fn add_input_endpoint(
        &mut self,
        id: impl Into<String>,
        mode: DataFlowMode,
    ) -> FlowResult<Arc<InputEndpoint>> {
        let id = id.into();
        self.ensure_port_free(&id)?;
        let endpoint = Arc::new(InputEndpoint::new(id, self.spec.id.clone(), mode));
        self.inputs.push(Arc::clone(&endpoint));
        Ok(endpoint)
    }

    /// Declares an output endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::DuplicatePort`] when the port id is already
    /// declared on this node, in either direction.
    pub fn add_output_endpoint(
        &mut self,
        id: impl Into<String>,
        mode: DataFlowMode,
    ) -> FlowResult<Arc<OutputEndpoint>> {
        let id = id.into();
        self.ensure_port_free(&id)?;
        let endpoint = Arc::new(OutputEndpoint::new(id, self.spec.id.clone(), mode));
        self.outputs.push(Arc::clone(&endpoint));
        Ok(endpoint)
    }

    fn ensure_port_free(&self, id: &str) -> FlowResult<()> {
        let taken = self.inputs.iter().any(|ep| ep.id() == id)
            || self.outputs.iter().any(|ep| ep.id() == id);
        if taken {
            return Err(FlowError::DuplicatePort {
                node: self.spec.id.clone(),
                port: id.to_string(),
            });
        }
        Ok(())
    }

    /// Looks up an input endpoint by port id.
    pub fn get_input_endpoint(&self, id: &str) -> Option<Arc<InputEndpoint>> {
        self.inputs.iter().find(|ep| ep.id() == id).cloned()
    }

    /// Looks up an output endpoint by port id.
    pub fn get_output_endpoint(&self, id: &str) -> Option<Arc<OutputEndpoint>> {
        self.outputs.iter().find(|ep| ep.id() == id).cloned()
    }

    /// Input endpoints in declaration order.
    pub fn input_endpoints(&self) -> &[Arc<InputEndpoint>] {
        &self.inputs
    }

    /// Output endpoints in declaration order.
    pub fn output_endpoints(&self) -> &[Arc<OutputEndpoint>] {
        &self.outputs
    }

    /// Resolves a port id to whichever endpoint declares it.
    pub fn find_endpoint(&self, id: &str) -> Option<EndpointRef> {
        if let Some(ep) = self.get_input_endpoint(id) {
            return Some(EndpointRef::Input(ep));
        }
        self.get_output_endpoint(id).map(EndpointRef::Output)
    }

    /// Number of edges arriving at this node.
    pub fn in_degree(&self) -> usize {
        self.inputs.iter().map(|ep| ep.edge_count()).sum()
    }

    /// Number of edges leaving this node.
    pub fn out_degree(&self) -> usize {
        self.outputs.iter().map(|ep| ep.edge_count()).sum()
    }

    /// True when at least one input endpoint has an incident edge.
    pub fn has_connected_inputs(&self) -> bool {
        self.inputs.iter().any(|ep| ep.edge_count() > 0)
    }

    /// Readiness predicate: every input endpoint is satisfied.
    ///
    /// A node with no input endpoints is trivially ready. The predicate is
    /// independent of lifecycle state; the scheduler applies it to Pending
    /// nodes only.
    pub fn is_ready(&self) -> bool {
        self.inputs.iter().all(|ep| ep.is_satisfied())
    }

    // ---- lifecycle ------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> NodeState {
        self.runtime.lock().state
    }

    /// Message of the most recent failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.runtime.lock().last_error.clone()
    }

    /// Instant the most recent run started.
    pub fn started_at(&self) -> Option<Instant> {
        self.runtime.lock().started_at
    }

    /// Instant the most recent run finished.
    pub fn finished_at(&self) -> Option<Instant> {
        self.runtime.lock().finished_at
    }

    /// Transitions Pending → Ready. Returns whether the transition applied.
    pub fn mark_ready(&self) -> bool {
        let mut rt = self.runtime.lock();
        if rt.state != NodeState::Pending {
            return false;
        }
        rt.state = NodeState::Ready;
        true
    }

    /// Transitions Ready → Pending, used when a queued node's readiness was
    /// invalidated by a later connection. Returns whether it applied.
    pub fn demote_to_pending(&self) -> bool {
        let mut rt = self.runtime.lock();
        if rt.state != NodeState::Ready {
            return false;
        }
        rt.state = NodeState::Pending;
        true
    }

    /// Returns a Completed node to Pending so residual buffered input can
    /// drive another execution. Each ready→run cycle is a distinct logical
    /// execution of the node. Returns whether the transition applied.
    pub fn rearm(&self) -> bool {
        let mut rt = self.runtime.lock();
        if rt.state != NodeState::Completed {
            return false;
        }
        rt.state = NodeState::Pending;
        true
    }

    /// Runs one invocation of this node.
    ///
    /// Marks the node Running, installs the context's cancellation token as
    /// the live cancellation source, and invokes the behavior. On return the
    /// source is released and the node lands in Completed or Failed, unless
    /// a concurrent [`cancel`](Self::cancel) already moved it to Cancelled.
    ///
    /// # Errors
    ///
    /// Re-raises whatever the behavior returned; the message is also
    /// recorded on the node.
    pub async fn execute(&self, ctx: &mut NodeContext) -> FlowResult<()> {
        {
            let mut rt = self.runtime.lock();
            // A cancel can land between dispatch and task start; terminal
            // states are never revived.
            if rt.state.is_terminal() {
                return Err(FlowError::Cancelled);
            }
            rt.state = NodeState::Running;
            rt.cancel = Some(ctx.token().clone());
            rt.started_at = Some(Instant::now());
            rt.finished_at = None;
            rt.last_error = None;
        }
        flow_node!(debug, node = %self.id(), "running");

        let behavior = Arc::clone(&self.behavior);
        let result = behavior.run(ctx).await;

        let mut rt = self.runtime.lock();
        rt.cancel = None;
        rt.finished_at = Some(Instant::now());
        match &result {
            Ok(()) => {
                if rt.state == NodeState::Running {
                    rt.state = NodeState::Completed;
                }
            }
            Err(err) if err.is_cancellation() => {
                if rt.state == NodeState::Running {
                    rt.state = NodeState::Cancelled;
                }
            }
            Err(err) => {
                rt.last_error = Some(err.to_string());
                if rt.state == NodeState::Running {
                    rt.state = NodeState::Failed;
                }
            }
        }
        let state = rt.state;
        drop(rt);
        flow_node!(debug, node = %self.id(), state = ?state, "run finished");

        result
    }

    /// Cancels this node cooperatively.
    ///
    /// Signals the live cancellation token (when Running) and moves the node
    /// to Cancelled from any non-terminal state. Terminal states are left
    /// untouched.
    pub fn cancel(&self) {
        let mut rt = self.runtime.lock();
        if rt.state.is_terminal() {
            return;
        }
        if let Some(token) = rt.cancel.take() {
            token.cancel();
        }
        rt.state = NodeState::Cancelled;
        drop(rt);
        flow_node!(debug, node = %self.id(), "cancelled");
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.spec.id)
            .field("priority", &self.spec.priority)
            .field("state", &self.state())
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}
