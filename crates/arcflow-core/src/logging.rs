//! Structured tracing macros for arcflow.
//!
//! All engine logging flows through three target-scoped macros so consumers
//! can filter scheduler chatter, node lifecycle events, and data transport
//! independently (`arcflow::scheduler`, `arcflow::nodes`,
//! `arcflow::transport`).
//!
//! When the `no-trace` feature is enabled, every macro compiles to nothing
//! for zero overhead in production/benchmark builds.

// ---- With tracing enabled (default) ----

/// Trace scheduler-level events (dispatch, queue churn, termination).
#[cfg(not(feature = "no-trace"))]
#[macro_export]
macro_rules! flow_sched {
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!(target: "arcflow::scheduler", $($arg)*)
    }
}

/// Trace node lifecycle events (state transitions, failures, cancellation).
#[cfg(not(feature = "no-trace"))]
#[macro_export]
macro_rules! flow_node {
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!(target: "arcflow::nodes", $($arg)*)
    }
}

/// Trace data transport (push/pull delivery, buffer occupancy).
#[cfg(not(feature = "no-trace"))]
#[macro_export]
macro_rules! flow_data {
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!(target: "arcflow::transport", $($arg)*)
    }
}

// ---- With tracing disabled (no-trace feature) ----

/// Trace scheduler-level events - compiles to nothing when no-trace is enabled.
#[cfg(feature = "no-trace")]
#[macro_export]
macro_rules! flow_sched {
    ($level:ident, $($arg:tt)*) => {};
}

/// Trace node lifecycle events - compiles to nothing when no-trace is enabled.
#[cfg(feature = "no-trace")]
#[macro_export]
macro_rules! flow_node {
    ($level:ident, $($arg:tt)*) => {};
}

/// Trace data transport - compiles to nothing when no-trace is enabled.
#[cfg(feature = "no-trace")]
#[macro_export]
macro_rules! flow_data {
    ($level:ident, $($arg:tt)*) => {};
}
