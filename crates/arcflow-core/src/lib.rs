//! arcflow core - data model for the arcflow dataflow graph scheduler.
//!
//! This crate provides the building blocks the runtime schedules: the
//! unified [`Value`] data plane, input/output [endpoints](endpoint) with
//! push/pull transport, [edges](edge), the [`Node`] contract and lifecycle,
//! and the per-invocation [`NodeContext`].

pub mod context;
pub mod edge;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod node;
pub mod types;

pub use context::NodeContext;
pub use edge::Edge;
pub use endpoint::{DataFlowMode, EndpointRef, InputEndpoint, OutputEndpoint};
pub use error::{FlowError, FlowResult};
pub use node::{Node, NodeBehavior, NodeSpec, NodeState};
pub use types::{EdgeId, NodeId, Number, PortId, Value};
