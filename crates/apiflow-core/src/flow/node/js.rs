use std::time::Duration;

use apiflow_types::flow::FlowNode;

use super::FlowNodeResult;
use crate::flow::context::FlowNodeRequest;

/// Upper bound on a single script run.
pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(60);

pub(super) async fn run(req: &FlowNodeRequest, node: &FlowNode, code: &str) -> FlowNodeResult {
    let timeout = req.request_timeout.min(SCRIPT_TIMEOUT);
    match req.services.scripts.run(code, req.vars.clone(), timeout).await {
        Ok(value) => FlowNodeResult::next(req.graph.next(&node.id)).with_output(value),
        Err(e) => FlowNodeResult::failed(e.into()),
    }
}
