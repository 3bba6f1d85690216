//! arcflow runtime - the dataflow graph scheduler.
//!
//! Build a [`Graph`], register [`Node`]s, [`connect`](Graph::connect) output
//! ports to input ports, and [`execute`](Graph::execute): the engine
//! discovers ready work, dispatches it under the concurrency budget in the
//! order induced by the scheduling policy, moves values across edges in push
//! or pull discipline, and terminates when no work remains. Graphs can be
//! mutated while live; removing a queued node excises exactly its queue
//! entry.
//!
//! ```no_run
//! use std::sync::Arc;
//! use arcflow_core::{DataFlowMode, Node, NodeSpec};
//! use arcflow_runtime::{Graph, GraphConfig};
//! # use arcflow_core::{NodeBehavior, NodeContext, FlowResult};
//! # struct Emit;
//! # #[async_trait::async_trait]
//! # impl NodeBehavior for Emit {
//! #     async fn run(&self, _ctx: &mut NodeContext) -> FlowResult<()> { Ok(()) }
//! # }
//!
//! # async fn demo() -> FlowResult<()> {
//! let graph = Graph::new(GraphConfig::default());
//! let mut source = Node::new(NodeSpec::new("source"), Arc::new(Emit));
//! source.add_output_endpoint("out", DataFlowMode::Push)?;
//! graph.add_node(source)?;
//! graph.execute().await?;
//! # Ok(())
//! # }
//! ```

pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use scheduler::{
    DefaultPolicy, Graph, GraphConfig, GraphStats, HeapHandle, NodeReport, PairingHeap,
    SchedulingPolicy, StateCounts, TemporalPolicy,
};

// Re-export the core data model so most consumers depend on one crate.
pub use arcflow_core::{
    DataFlowMode, Edge, EndpointRef, FlowError, FlowResult, InputEndpoint, Node, NodeBehavior,
    NodeContext, NodeSpec, NodeState, Number, OutputEndpoint, Value,
};
