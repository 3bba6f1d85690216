//! The dispatch loop.
//!
//! `Graph::execute` drains the ready queue under the concurrency budget:
//! poll the highest-priority ready node, verify its readiness still holds,
//! spawn its invocation, and on each completion propagate readiness to the
//! downstream targets. Execution terminates when the queue is empty and no
//! invocation is in flight.
//!
//! A failed behavior aborts the run: no further nodes are dispatched, the
//! in-flight invocations are awaited (never forcibly cancelled), and the
//! error bubbles out unchanged. Cancellation is not a failure; a node
//! observing its token and stopping early settles quietly in `Cancelled`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use arcflow_core::context::NodeContext;
use arcflow_core::error::{FlowError, FlowResult};
use arcflow_core::flow_sched;
use arcflow_core::node::{Node, NodeState};
use arcflow_core::types::NodeId;

use crate::scheduler::graph::Graph;

type Settled = (NodeId, FlowResult<()>);

impl Graph {
    /// Executes the graph to completion.
    ///
    /// Returns once the ready queue is empty and every in-flight invocation
    /// has settled. The first behavior failure aborts dispatch and is
    /// returned unchanged after the remaining in-flight runs are awaited;
    /// node states are then inspectable through [`stats`](Self::stats) and
    /// [`report`](Self::report).
    ///
    /// # Errors
    ///
    /// [`FlowError::InvalidConfig`] for a rejected configuration, otherwise
    /// whatever error the first failing behavior produced.
    pub async fn execute(&self) -> FlowResult<()> {
        self.config
            .validate()
            .map_err(|reason| FlowError::InvalidConfig { reason })?;
        *self.epoch.lock() = Some(Instant::now());
        flow_sched!(debug, max_concurrency = self.config.max_concurrency, "execute started");

        let mut inflight: JoinSet<Settled> = JoinSet::new();
        let mut first_error: Option<FlowError> = None;

        loop {
            if first_error.is_none() {
                self.fill_slots(&mut inflight);
            }
            match inflight.join_next().await {
                // Nothing in flight and nothing dispatchable: done.
                None => break,
                Some(Ok((id, result))) => self.on_settled(id, result, &mut first_error),
                Some(Err(join_error)) => {
                    // A panicking behavior surfaces as a join error; abort
                    // like any other failure.
                    flow_sched!(error, error = %join_error, "invocation task failed");
                    if first_error.is_none() {
                        first_error = Some(FlowError::behavior(join_error));
                    }
                }
            }
        }

        flow_sched!(debug, aborted = first_error.is_some(), "execute finished");
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Dispatches queued nodes until the budget is full or the queue runs
    /// dry.
    fn fill_slots(&self, inflight: &mut JoinSet<Settled>) {
        loop {
            let node = {
                let mut core = self.core.lock();
                if core.running.len() >= self.config.max_concurrency {
                    return;
                }
                let Some(node) = core.queue.poll() else {
                    return;
                };
                core.handles.remove(node.id());

                // Cancelled (or otherwise moved on) while queued.
                if node.state() != NodeState::Ready {
                    continue;
                }
                // A connection made after this node became Ready can
                // invalidate its readiness while queued; a stale entry is
                // demoted instead of run.
                if self.config.enable_dynamic_scheduling
                    && node.has_connected_inputs()
                    && !node.is_ready()
                {
                    node.demote_to_pending();
                    flow_sched!(trace, node = %node.id(), "stale readiness, demoted");
                    continue;
                }
                core.running.insert(node.id().to_string());
                node
            };
            flow_sched!(debug, node = %node.id(), "dispatched");
            inflight.spawn(invoke(node));
        }
    }

    /// Books one settled invocation: releases the slot, then either
    /// propagates readiness downstream or records the aborting error.
    fn on_settled(&self, id: NodeId, result: FlowResult<()>, first_error: &mut Option<FlowError>) {
        {
            self.core.lock().running.remove(&id);
        }
        let node = self.node(&id);

        match result {
            Ok(()) => {
                let Some(node) = node else {
                    // Removed from the graph mid-run; nothing to propagate.
                    return;
                };
                if node.state() != NodeState::Completed {
                    // A concurrent cancel won over the successful exit.
                    return;
                }
                if self.config.enable_dynamic_scheduling && first_error.is_none() {
                    self.propagate_downstream(&node);
                    // Residual buffered input drives another execution: each
                    // ready→run cycle is a distinct logical run of the node.
                    if node.has_connected_inputs() && node.is_ready() && node.rearm() {
                        flow_sched!(trace, node = %id, "rearmed on residual input");
                        self.promote_if_ready(&node);
                    }
                }
                if node.state() == NodeState::Completed {
                    self.core.lock().completed.insert(id.clone());
                    flow_sched!(debug, node = %id, "completed");
                }
            }
            Err(error) => {
                let cancelled = error.is_cancellation()
                    || node.map(|n| n.state() == NodeState::Cancelled).unwrap_or(true);
                if cancelled {
                    flow_sched!(debug, node = %id, "settled cancelled");
                    return;
                }
                flow_sched!(error, node = %id, error = %error, "node failed, aborting execution");
                if first_error.is_none() {
                    *first_error = Some(error);
                }
            }
        }
    }

    /// Re-evaluates readiness of every node fed by `node`'s outputs.
    fn propagate_downstream(&self, node: &Arc<Node>) {
        for output in node.output_endpoints() {
            for edge in output.edges() {
                if let Some(target) = self.node(edge.target_node()) {
                    self.promote_if_ready(&target);
                }
            }
        }
    }
}

/// Runs one invocation: gathers one value per input endpoint (declaration
/// order), builds a fresh context with its own cancellation token, and
/// executes the node.
async fn invoke(node: Arc<Node>) -> Settled {
    let id = node.id().to_string();

    let mut inputs = HashMap::new();
    for endpoint in node.input_endpoints() {
        if let Some(value) = endpoint.pull_data() {
            inputs.insert(endpoint.id().to_string(), value);
        }
    }

    let mut ctx = NodeContext::new(Arc::clone(&node), inputs, CancellationToken::new());
    let result = node.execute(&mut ctx).await;
    (id, result)
}
