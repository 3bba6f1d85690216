//! Node behaviors shared by the scheduler tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use arcflow_core::context::NodeContext;
use arcflow_core::error::{FlowError, FlowResult};
use arcflow_core::node::NodeBehavior;
use arcflow_core::types::Value;

use crate::scheduler::graph::Graph;

/// Emits a fixed list of values through one output port, in order.
pub(crate) struct EmitValues {
    pub port: &'static str,
    pub values: Vec<Value>,
}

#[async_trait]
impl NodeBehavior for EmitValues {
    async fn run(&self, ctx: &mut NodeContext) -> FlowResult<()> {
        for value in &self.values {
            ctx.set_output(self.port, value.clone())?;
        }
        Ok(())
    }
}

/// Applies a function to one input value and forwards the result.
pub(crate) struct MapValue {
    pub input: &'static str,
    pub output: &'static str,
    pub f: fn(Value) -> Value,
}

#[async_trait]
impl NodeBehavior for MapValue {
    async fn run(&self, ctx: &mut NodeContext) -> FlowResult<()> {
        let value = ctx.take_input(self.input).unwrap_or(Value::Null);
        ctx.set_output(self.output, (self.f)(value))
    }
}

/// Appends each received input value to a shared log.
pub(crate) struct CollectValues {
    pub port: &'static str,
    pub seen: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl NodeBehavior for CollectValues {
    async fn run(&self, ctx: &mut NodeContext) -> FlowResult<()> {
        if let Some(value) = ctx.take_input(self.port) {
            self.seen.lock().push(value);
        }
        Ok(())
    }
}

/// Sleeps, then forwards the input value unchanged.
pub(crate) struct SleepMap {
    pub input: &'static str,
    pub output: &'static str,
    pub delay: Duration,
}

#[async_trait]
impl NodeBehavior for SleepMap {
    async fn run(&self, ctx: &mut NodeContext) -> FlowResult<()> {
        tokio::time::sleep(self.delay).await;
        let value = ctx.take_input(self.input).unwrap_or(Value::Null);
        ctx.set_output(self.output, value)
    }
}

/// Concatenates string inputs (port declaration order), appends a suffix,
/// and records the result.
pub(crate) struct ConcatRecord {
    pub ports: Vec<&'static str>,
    pub suffix: &'static str,
    pub result: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl NodeBehavior for ConcatRecord {
    async fn run(&self, ctx: &mut NodeContext) -> FlowResult<()> {
        let mut combined = String::new();
        for port in &self.ports {
            if let Some(value) = ctx.get_input(port).and_then(Value::as_str) {
                combined.push_str(value);
            }
        }
        combined.push_str(self.suffix);
        *self.result.lock() = Some(combined);
        Ok(())
    }
}

/// Sums the integers of an array input and forwards the total.
pub(crate) struct SumArray {
    pub input: &'static str,
    pub output: &'static str,
}

#[async_trait]
impl NodeBehavior for SumArray {
    async fn run(&self, ctx: &mut NodeContext) -> FlowResult<()> {
        let total: i64 = ctx
            .get_input(self.input)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_i64).sum())
            .unwrap_or(0);
        ctx.set_output(self.output, Value::from(total))
    }
}

/// Fails with a fixed message, optionally after a delay.
pub(crate) struct FailWith {
    pub message: &'static str,
    pub delay: Duration,
}

#[async_trait]
impl NodeBehavior for FailWith {
    async fn run(&self, _ctx: &mut NodeContext) -> FlowResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Err(FlowError::behavior(self.message))
    }
}

/// Tracks how many invocations overlap, recording the peak.
pub(crate) struct TrackConcurrency {
    pub active: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub delay: Duration,
}

#[async_trait]
impl NodeBehavior for TrackConcurrency {
    async fn run(&self, _ctx: &mut NodeContext) -> FlowResult<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Removes another node from the graph mid-run.
pub(crate) struct RemoveNodeOnRun {
    pub graph: Arc<Graph>,
    pub target: &'static str,
}

#[async_trait]
impl NodeBehavior for RemoveNodeOnRun {
    async fn run(&self, _ctx: &mut NodeContext) -> FlowResult<()> {
        self.graph.remove_node(self.target);
        Ok(())
    }
}

/// Appends its own node id to a shared log, tracking execution order.
pub(crate) struct RecordRun {
    pub log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl NodeBehavior for RecordRun {
    async fn run(&self, ctx: &mut NodeContext) -> FlowResult<()> {
        self.log.lock().push(ctx.node().id().to_string());
        Ok(())
    }
}

/// Parks until cancelled, then reports the cancellation.
pub(crate) struct WaitForCancel;

#[async_trait]
impl NodeBehavior for WaitForCancel {
    async fn run(&self, ctx: &mut NodeContext) -> FlowResult<()> {
        ctx.token().cancelled().await;
        Err(FlowError::Cancelled)
    }
}
