use apiflow_types::assertion::AssertCondition;
use apiflow_types::flow::FlowNode;

use super::FlowNodeResult;
use super::looping::{Iteration, run_loop};
use crate::flow::context::FlowNodeRequest;

pub(super) async fn run(
    req: &FlowNodeRequest,
    node: &FlowNode,
    iter_count: u64,
    break_condition: Option<&AssertCondition>,
) -> FlowNodeResult {
    let iterations = (0..iter_count).map(|i| Iteration {
        index: i as usize,
        key: None,
        value: None,
    });
    run_loop(req, node, iterations, break_condition).await
}
