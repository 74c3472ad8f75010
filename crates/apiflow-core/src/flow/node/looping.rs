//! Shared iteration driver for `for` and `for_each`.
//!
//! Each iteration binds `{index, key?, value?}` under the reserved `var`
//! key and under the loop node's name, runs the `loop` chain to completion,
//! and records one execution row. Both bindings are restored when the loop
//! ends.

use apiflow_types::assertion::AssertCondition;
use apiflow_types::error::{CodedError, ErrorCode};
use apiflow_types::flow::{EdgeHandle, ErrorHandling, FlowNode, NodeExecution, NodeState};
use apiflow_types::id::NodeExecutionId;
use chrono::Utc;
use serde_json::{Map, Value, json};

use super::{FlowNodeResult, run_chain};
use crate::flow::context::FlowNodeRequest;
use crate::flow::varmap::VAR_ALIAS;

pub(super) struct Iteration {
    pub index: usize,
    pub key: Option<String>,
    pub value: Option<Value>,
}

impl Iteration {
    fn binding(&self) -> Value {
        let mut map = Map::new();
        map.insert("index".into(), json!(self.index));
        if let Some(key) = &self.key {
            map.insert("key".into(), json!(key));
        }
        if let Some(value) = &self.value {
            map.insert("value".into(), value.clone());
        }
        Value::Object(map)
    }
}

async fn record_iteration(req: &FlowNodeRequest, node: &FlowNode, iteration: &Iteration, outcome: &Result<(), CodedError>) {
    let state = match outcome {
        Ok(()) => NodeState::Success,
        Err(e) if e.code == ErrorCode::Canceled => NodeState::Canceled,
        Err(_) => NodeState::Failure,
    };
    let execution = NodeExecution {
        id: NodeExecutionId::new(),
        flow_id: req.flow_id,
        node_id: node.id,
        run_id: req.run_id,
        name: format!("{} iteration {}", node.name, iteration.index),
        state,
        error: outcome.as_ref().err().map(|e| e.to_string()),
        input_data: Some(iteration.binding()),
        output_data: None,
        response_id: None,
        completed_at: Utc::now(),
    };
    if let Err(e) = req.services.recorder.record_execution(&execution).await {
        tracing::warn!(run_id = %req.run_id, node = node.name.as_str(), error = %e, "failed to record iteration");
    }
}

pub(super) async fn run_loop(
    req: &FlowNodeRequest,
    node: &FlowNode,
    iterations: impl IntoIterator<Item = Iteration>,
    break_condition: Option<&AssertCondition>,
) -> FlowNodeResult {
    let body = req.graph.targets(&node.id, EdgeHandle::Loop);
    let previous = req.vars.get(&node.name);
    let previous_alias = req.vars.get(VAR_ALIAS);
    let mut completed = 0usize;
    let mut failed = 0usize;
    let mut broke = false;
    let mut outcome: Result<(), CodedError> = Ok(());

    for iteration in iterations {
        if req.cancel.is_cancelled() {
            outcome = Err(CodedError::canceled());
            break;
        }
        let binding = iteration.binding();
        req.vars.set(VAR_ALIAS, binding.clone());
        req.vars.set(node.name.clone(), binding);

        if let Some(condition) = break_condition {
            match req
                .services
                .assertions
                .evaluate(condition, &req.vars.expression_context())
            {
                Ok(true) => {
                    broke = true;
                    break;
                }
                Ok(false) => {}
                Err(e) => {
                    outcome = Err(e.into());
                    break;
                }
            }
        }

        let result = run_chain(req, body.clone()).await;
        record_iteration(req, node, &iteration, &result).await;
        match result {
            Ok(()) => completed += 1,
            Err(e) if e.code == ErrorCode::Canceled => {
                outcome = Err(e);
                break;
            }
            Err(e) => match node.error_handling {
                ErrorHandling::Ignore => failed += 1,
                ErrorHandling::Break => {
                    failed += 1;
                    broke = true;
                    break;
                }
                ErrorHandling::Unspecified => {
                    outcome = Err(e);
                    break;
                }
            },
        }
    }

    req.vars.restore(&node.name, previous);
    req.vars.restore(VAR_ALIAS, previous_alias);

    match outcome {
        Ok(()) => FlowNodeResult::next(req.graph.next(&node.id)).with_output(json!({
            "iterations": completed,
            "failed": failed,
            "broke": broke,
        })),
        Err(e) => FlowNodeResult::failed(e),
    }
}
