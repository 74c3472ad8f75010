use apiflow_types::assertion::AssertCondition;
use apiflow_types::flow::{EdgeHandle, FlowNode};
use serde_json::json;

use super::FlowNodeResult;
use crate::flow::context::FlowNodeRequest;

/// Follow `then` on true and `else` on false. A missing branch ends the path.
pub(super) fn run(req: &FlowNodeRequest, node: &FlowNode, condition: &AssertCondition) -> FlowNodeResult {
    let ctx = req.vars.expression_context();
    match req.services.assertions.evaluate(condition, &ctx) {
        Ok(result) => {
            let handle = if result { EdgeHandle::Then } else { EdgeHandle::Else };
            FlowNodeResult::next(req.graph.targets(&node.id, handle)).with_output(json!({ "result": result }))
        }
        Err(e) => FlowNodeResult::failed(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::node::testing::Harness;
    use apiflow_types::flow::{FlowEdge, NodeConfig, NoopKind};
    use apiflow_types::id::FlowId;

    fn if_node(expression: &str) -> (Vec<FlowNode>, Vec<FlowEdge>) {
        let flow = FlowId::new();
        let cond = FlowNode::new(
            flow,
            "if",
            NodeConfig::Condition {
                condition: AssertCondition::expression(expression),
            },
        );
        let then = FlowNode::new(flow, "then", NodeConfig::NoOp { noop_kind: NoopKind::Plain });
        let edges = vec![FlowEdge::new(flow, cond.id, then.id, EdgeHandle::Then)];
        (vec![cond, then], edges)
    }

    #[test]
    fn true_follows_then() {
        let h = Harness::basic();
        let (nodes, edges) = if_node("a == 1");
        let (cond, then_id) = (nodes[0].clone(), nodes[1].id);
        let (req, _rx) = h.request(nodes, edges, json!({ "a": 1 }));
        let result = run(&req, &cond, &AssertCondition::expression("a == 1"));
        assert!(result.err.is_none());
        assert_eq!(result.next, vec![then_id]);
    }

    #[test]
    fn false_without_else_ends_the_path() {
        let h = Harness::basic();
        let (nodes, edges) = if_node("a == 2");
        let cond = nodes[0].clone();
        let (req, _rx) = h.request(nodes, edges, json!({ "a": 1 }));
        let result = run(&req, &cond, &AssertCondition::expression("a == 2"));
        assert!(result.err.is_none());
        assert!(result.next.is_empty());
        assert_eq!(result.output, Some(json!({ "result": false })));
    }

    #[test]
    fn bad_expression_is_a_syntax_error() {
        let h = Harness::basic();
        let (nodes, edges) = if_node("a ==");
        let cond = nodes[0].clone();
        let (req, _rx) = h.request(nodes, edges, json!({ "a": 1 }));
        let result = run(&req, &cond, &AssertCondition::expression("a =="));
        assert_eq!(
            result.err.map(|e| e.code),
            Some(apiflow_types::error::ErrorCode::ExpressionSyntax)
        );
    }
}
