//! Per-invocation execution context handed to node behaviors.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{FlowError, FlowResult};
use crate::node::Node;
use crate::types::{PortId, Value};

/// Read-only handle a behavior receives for one invocation.
///
/// Inputs are resolved before the run starts: the scheduler pulls one value
/// per input endpoint (declaration order) and stores whatever was available
/// under the port id. Outputs are emitted through
/// [`set_output`](Self::set_output), which pushes through the named output
/// endpoint and its edges.
pub struct NodeContext {
    node: Arc<Node>,
    inputs: HashMap<PortId, Value>,
    token: CancellationToken,
}

impl NodeContext {
    /// Builds a context for one invocation of `node`.
    pub fn new(
        node: Arc<Node>,
        inputs: HashMap<PortId, Value>,
        token: CancellationToken,
    ) -> Self {
        Self {
            node,
            inputs,
            token,
        }
    }

    /// The node being run.
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// All resolved inputs for this invocation.
    pub fn inputs(&self) -> &HashMap<PortId, Value> {
        &self.inputs
    }

    /// Borrows the input resolved for `port`, if one was available.
    pub fn get_input(&self, port: &str) -> Option<&Value> {
        self.inputs.get(port)
    }

    /// Takes ownership of the input resolved for `port`.
    pub fn take_input(&mut self, port: &str) -> Option<Value> {
        self.inputs.remove(port)
    }

    /// Cancellation token for this invocation.
    ///
    /// Behaviors are expected to observe it at their own await points.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Emits one value through the named output endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::UnknownPort`] when the node declares no such
    /// output, or a transport error from the endpoint itself.
    pub fn set_output(&self, port: &str, value: Value) -> FlowResult<()> {
        let endpoint =
            self.node
                .get_output_endpoint(port)
                .ok_or_else(|| FlowError::UnknownPort {
                    node: self.node.id().to_string(),
                    port: port.to_string(),
                })?;
        endpoint.push_data(value)
    }
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("node", &self.node.id())
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
