use apiflow_types::flow::FlowNode;

use super::FlowNodeResult;
use crate::flow::context::FlowNodeRequest;

pub(super) fn run(req: &FlowNodeRequest, node: &FlowNode) -> FlowNodeResult {
    FlowNodeResult::next(req.graph.next(&node.id))
}
