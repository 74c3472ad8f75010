use apiflow_types::assertion::AssertCondition;
use apiflow_types::error::{CodedError, ErrorCode};
use apiflow_types::flow::FlowNode;
use serde_json::Value;

use super::FlowNodeResult;
use super::looping::{Iteration, run_loop};
use crate::flow::context::FlowNodeRequest;

/// Iterate an array (by index) or a map (by key, in insertion order)
/// found at `iter_path`.
pub(super) async fn run(
    req: &FlowNodeRequest,
    node: &FlowNode,
    iter_path: &str,
    break_condition: Option<&AssertCondition>,
) -> FlowNodeResult {
    let ctx = req.vars.expression_context();
    let source = match req.services.assertions.evaluate_value(iter_path, &ctx) {
        Ok(v) => v,
        Err(e) => return FlowNodeResult::failed(e.into()),
    };

    let iterations: Vec<Iteration> = match source {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, value)| Iteration {
                index,
                key: None,
                value: Some(value),
            })
            .collect(),
        Value::Object(map) => map
            .into_iter()
            .enumerate()
            .map(|(index, (key, value))| Iteration {
                index,
                key: Some(key),
                value: Some(value),
            })
            .collect(),
        other => {
            let kind = match other {
                Value::Null => "null",
                Value::Bool(_) => "a boolean",
                Value::Number(_) => "a number",
                _ => "a string",
            };
            return FlowNodeResult::failed(CodedError::new(
                ErrorCode::ExpressionRuntime,
                format!("'{iter_path}' resolved to {kind}, expected an array or a map"),
            ));
        }
    };

    run_loop(req, node, iterations, break_condition).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::node::testing::Harness;
    use apiflow_types::flow::NodeConfig;
    use apiflow_types::id::FlowId;
    use serde_json::json;

    #[tokio::test]
    async fn scalar_source_is_a_runtime_error() {
        let h = Harness::basic();
        let node = FlowNode::new(
            FlowId::new(),
            "each",
            NodeConfig::ForEach {
                iter_path: "count".into(),
                break_condition: None,
            },
        );
        let (req, _rx) = h.request(vec![node.clone()], vec![], json!({ "count": 3 }));
        let result = run(&req, &node, "count", None).await;
        let err = result.err.unwrap();
        assert_eq!(err.code, ErrorCode::ExpressionRuntime);
        assert!(err.message.contains("a number"), "{}", err.message);
    }

    #[tokio::test]
    async fn empty_array_completes_without_iterations() {
        let h = Harness::basic();
        let node = FlowNode::new(
            FlowId::new(),
            "each",
            NodeConfig::ForEach {
                iter_path: "items".into(),
                break_condition: None,
            },
        );
        let (req, _rx) = h.request(vec![node.clone()], vec![], json!({ "items": [] }));
        let result = run(&req, &node, "items", None).await;
        assert!(result.err.is_none());
        assert_eq!(result.output.unwrap()["iterations"], 0);
    }
}
