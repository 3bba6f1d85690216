//! Error handling for arcflow.
//!
//! This module centralizes every error the engine can surface: configuration
//! errors raised synchronously by graph mutators, priority-queue invariant
//! violations, and failures bubbling out of user node behaviors.

use thiserror::Error;

/// Convenience alias used across both arcflow crates.
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors surfaced by the arcflow engine.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A node with the same id is already registered in the graph.
    #[error("duplicate node id: {id}")]
    DuplicateNode {
        /// Id of the node that was added twice.
        id: String,
    },

    /// A graph operation referenced a node that is not registered.
    #[error("unknown node: {id}")]
    UnknownNode {
        /// Id of the missing node.
        id: String,
    },

    /// A graph operation referenced a port the node does not declare.
    #[error("unknown port {port} on node {node}")]
    UnknownPort {
        /// Id of the node that was inspected.
        node: String,
        /// Port id that could not be resolved.
        port: String,
    },

    /// An endpoint with the same port id is already declared on the node.
    #[error("duplicate port {port} on node {node}")]
    DuplicatePort {
        /// Id of the node being extended.
        node: String,
        /// Port id that was declared twice.
        port: String,
    },

    /// The two endpoints of a connection request cannot be paired.
    ///
    /// Connections run from an output endpoint to an input endpoint; any
    /// other pairing is rejected.
    #[error("incompatible endpoints: {from} -> {target}")]
    IncompatibleEndpoints {
        /// `node.port` label of the requested source.
        from: String,
        /// `node.port` label of the requested target.
        target: String,
    },

    /// A transport operation was invoked on an endpoint in the wrong mode.
    #[error("endpoint {endpoint} does not support {operation} in {mode} mode")]
    ModeMismatch {
        /// `node.port` label of the endpoint.
        endpoint: String,
        /// Operation that was attempted (`push`, `pull`).
        operation: &'static str,
        /// Mode the endpoint is configured with.
        mode: &'static str,
    },

    /// A decrease-key was attempted with a value that does not precede the
    /// current one under the queue comparator.
    #[error("decrease rejected: replacement value does not precede the current value")]
    InvalidDecrease,

    /// A queue handle no longer addresses a live occurrence.
    #[error("stale queue handle")]
    StaleHandle,

    /// The graph configuration failed validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the rejected setting.
        reason: String,
    },

    /// A user node behavior reported a failure.
    ///
    /// Behaviors are free to define their own error types internally; this
    /// variant is the uniform shape they surface through the scheduler.
    #[error("node behavior failed: {message}")]
    Behavior {
        /// Description of the failure, recorded on the node as well.
        message: String,
    },

    /// Execution was cancelled cooperatively.
    ///
    /// The scheduler never produces this on its own; behaviors that observe
    /// their cancellation token may return it to cut a run short.
    #[error("execution cancelled")]
    Cancelled,
}

impl FlowError {
    /// Builds a [`FlowError::Behavior`] from any displayable failure.
    pub fn behavior(message: impl std::fmt::Display) -> Self {
        FlowError::Behavior {
            message: message.to_string(),
        }
    }

    /// True when the error represents cooperative cancellation rather than a
    /// genuine failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FlowError::Cancelled)
    }
}
