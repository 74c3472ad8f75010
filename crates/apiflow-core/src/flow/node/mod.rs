//! Node execution.
//!
//! [`execute_node`] wraps every kind with the same bookkeeping: status
//! events, cancellation, and a `NodeExecution` record. The per-kind
//! modules only decide the outcome and the successors.

mod condition;
mod for_each;
mod for_loop;
mod js;
mod looping;
mod noop;
mod request;

use std::collections::VecDeque;

use apiflow_types::error::{CodedError, ErrorCode};
use apiflow_types::event::NodeStatus;
use apiflow_types::flow::{ErrorHandling, FlowNode, NodeConfig, NodeExecution, NodeState};
use apiflow_types::id::{NodeExecutionId, NodeId, ResponseId};
use chrono::Utc;
use serde_json::Value;

use super::context::FlowNodeRequest;
use super::ports::{BoxFuture, RequestTarget};

pub use js::SCRIPT_TIMEOUT;

/// What a node hands back to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct FlowNodeResult {
    /// Successors to start. Empty terminates this path.
    pub next: Vec<NodeId>,
    pub err: Option<CodedError>,
    pub output: Option<Value>,
    pub response_id: Option<ResponseId>,
}

impl FlowNodeResult {
    pub fn next(next: Vec<NodeId>) -> Self {
        Self {
            next,
            ..Default::default()
        }
    }

    pub fn failed(err: CodedError) -> Self {
        Self {
            err: Some(err),
            ..Default::default()
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }
}

fn state_of(err: Option<&CodedError>) -> NodeState {
    match err {
        None => NodeState::Success,
        Some(e) if e.code == ErrorCode::Canceled => NodeState::Canceled,
        Some(_) => NodeState::Failure,
    }
}

async fn run_kind(req: &FlowNodeRequest, node: &FlowNode) -> FlowNodeResult {
    match &node.config {
        NodeConfig::NoOp { .. } => noop::run(req, node),
        NodeConfig::Condition { condition } => condition::run(req, node, condition),
        NodeConfig::For {
            iter_count,
            break_condition,
        } => for_loop::run(req, node, *iter_count, break_condition.as_ref()).await,
        NodeConfig::ForEach {
            iter_path,
            break_condition,
        } => for_each::run(req, node, iter_path, break_condition.as_ref()).await,
        NodeConfig::Js { code } => js::run(req, node, code).await,
        NodeConfig::Request {
            endpoint_id,
            example_id,
            delta_endpoint_id,
            delta_example_id,
        } => {
            let target = RequestTarget {
                endpoint_id: *endpoint_id,
                example_id: *example_id,
                delta_endpoint_id: *delta_endpoint_id,
                delta_example_id: *delta_example_id,
            };
            request::run(req, node, target).await
        }
    }
}

/// Run one node with events, cancellation and recording.
///
/// Boxed because loop nodes call back into it for their bodies.
pub fn execute_node(req: &FlowNodeRequest, node_id: NodeId) -> BoxFuture<'_, FlowNodeResult> {
    Box::pin(async move {
        let Some(node) = req.graph.node(&node_id).cloned() else {
            return FlowNodeResult::failed(CodedError::new(
                ErrorCode::Unexpected,
                format!("node {node_id} is not part of the flow"),
            ));
        };
        if req.cancel.is_cancelled() {
            return FlowNodeResult::failed(CodedError::canceled());
        }

        let execution_id = NodeExecutionId::new();
        let input = Value::Object(req.vars.snapshot());
        req.emit(&node, NodeStatus::NodeStarted, Some(execution_id), None).await;
        tracing::debug!(run_id = %req.run_id, node = node.name.as_str(), kind = node.config.kind().as_str(), "node started");

        let mut result = tokio::select! {
            biased;
            _ = req.cancel.cancelled() => FlowNodeResult::failed(CodedError::canceled()),
            r = run_kind(req, &node) => r,
        };
        if result.err.is_none() && req.cancel.is_cancelled() {
            result.err = Some(CodedError::canceled());
            result.next.clear();
        }

        let state = state_of(result.err.as_ref());
        let error = result.err.as_ref().map(|e| e.to_string());
        let execution = NodeExecution {
            id: execution_id,
            flow_id: req.flow_id,
            node_id: node.id,
            run_id: req.run_id,
            name: node.name.clone(),
            state,
            error: error.clone(),
            input_data: Some(input),
            output_data: result.output.clone(),
            response_id: result.response_id,
            completed_at: Utc::now(),
        };
        if let Err(e) = req.services.recorder.record_execution(&execution).await {
            tracing::warn!(run_id = %req.run_id, node = node.name.as_str(), error = %e, "failed to record node execution");
        }

        match state {
            NodeState::Success => {
                req.emit(&node, NodeStatus::NodeSuccess, Some(execution_id), None).await;
            }
            _ => {
                tracing::info!(run_id = %req.run_id, node = node.name.as_str(), error = error.as_deref().unwrap_or(""), "node failed");
                req.emit(&node, NodeStatus::NodeFailed, Some(execution_id), error).await;
            }
        }
        result
    })
}

/// Run a chain of nodes to completion, one at a time, following each
/// node's successors. Used for loop bodies. A node reached along several
/// edges runs once per activation, as at the top level.
///
/// A failing node whose handling is `Ignore` continues along its regular
/// successors; any other failure ends the chain with that error.
pub async fn run_chain(req: &FlowNodeRequest, roots: Vec<NodeId>) -> Result<(), CodedError> {
    let mut queue: VecDeque<NodeId> = roots.into();
    while let Some(id) = queue.pop_front() {
        if req.cancel.is_cancelled() {
            return Err(CodedError::canceled());
        }
        let result = execute_node(req, id).await;
        match result.err {
            None => queue.extend(result.next),
            Some(err) => {
                let handling = req
                    .graph
                    .node(&id)
                    .map(|n| n.error_handling)
                    .unwrap_or_default();
                if handling == ErrorHandling::Ignore && err.code != ErrorCode::Canceled {
                    queue.extend(req.graph.next(&id));
                } else {
                    return Err(err);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing;
