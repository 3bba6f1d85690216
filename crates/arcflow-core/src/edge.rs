//! Directed conduits between endpoints.
//!
//! An edge binds exactly one output endpoint to one input endpoint and is
//! immutable once created; rerouting means deleting and recreating it. The
//! edge holds weak endpoint references: the graph owns the edge strongly
//! (keyed by its canonical id) and nodes own their endpoints, so delivery
//! across an edge whose node has been removed degrades to a no-op instead of
//! keeping the endpoint alive.

use std::sync::{Arc, Weak};

use crate::endpoint::{DataFlowMode, InputEndpoint, OutputEndpoint};
use crate::error::FlowResult;
use crate::types::{EdgeId, NodeId, PortId, Value};

/// An immutable binding of one output endpoint to one input endpoint.
pub struct Edge {
    id: EdgeId,
    source_node: NodeId,
    source_port: PortId,
    target_node: NodeId,
    target_port: PortId,
    source: Weak<OutputEndpoint>,
    target: Weak<InputEndpoint>,
}

impl Edge {
    /// Canonical edge id: `"<srcNode>.<srcPort>-><tgtNode>.<tgtPort>"`.
    pub fn canonical_id(
        source_node: &str,
        source_port: &str,
        target_node: &str,
        target_port: &str,
    ) -> EdgeId {
        format!("{source_node}.{source_port}->{target_node}.{target_port}")
    }

    /// Creates an edge between two endpoints.
    ///
    /// The caller is responsible for registering the edge with both
    /// endpoints; `Graph::connect` is the one place that does this.
    pub fn between(source: &Arc<OutputEndpoint>, target: &Arc<InputEndpoint>) -> Self {
        Self {
            id: Self::canonical_id(
                source.node_id(),
                source.id(),
                target.node_id(),
                target.id(),
            ),
            source_node: source.node_id().to_string(),
            source_port: source.id().to_string(),
            target_node: target.node_id().to_string(),
            target_port: target.id().to_string(),
            source: Arc::downgrade(source),
            target: Arc::downgrade(target),
        }
    }

    /// Canonical id of this edge.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the producing node.
    pub fn source_node(&self) -> &str {
        &self.source_node
    }

    /// Port id on the producing node.
    pub fn source_port(&self) -> &str {
        &self.source_port
    }

    /// Id of the consuming node.
    pub fn target_node(&self) -> &str {
        &self.target_node
    }

    /// Port id on the consuming node.
    pub fn target_port(&self) -> &str {
        &self.target_port
    }

    /// Upgraded source endpoint, if its node is still alive.
    pub fn source(&self) -> Option<Arc<OutputEndpoint>> {
        self.source.upgrade()
    }

    /// Upgraded target endpoint, if its node is still alive.
    pub fn target(&self) -> Option<Arc<InputEndpoint>> {
        self.target.upgrade()
    }

    /// Delivers one value to the target endpoint.
    ///
    /// A dropped target (node removed from the graph) swallows the value.
    pub fn transfer_data(&self, value: Value) -> FlowResult<()> {
        match self.target.upgrade() {
            Some(target) => target.push_data(value),
            None => Ok(()),
        }
    }

    /// Drains one value from a pull-mode source buffer, used by the pull
    /// chase in [`InputEndpoint::pull_data`].
    ///
    /// Push-mode sources deliver eagerly and buffer nothing, so they yield
    /// `None` here rather than an error mid-chase.
    pub(crate) fn pull_from_source(&self) -> Option<Value> {
        let source = self.source.upgrade()?;
        match source.mode() {
            DataFlowMode::Pull => source.dequeue(),
            DataFlowMode::Push => None,
        }
    }

    /// True when the source endpoint currently buffers data.
    pub(crate) fn source_has_data(&self) -> bool {
        self.source
            .upgrade()
            .map(|source| source.has_data())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge").field("id", &self.id).finish()
    }
}
