//! Per-run state handed to every node.

use std::sync::Arc;
use std::time::Duration;

use apiflow_types::event::{FlowEvent, LogEvent, LogLevel, NodeStatus};
use apiflow_types::flow::FlowNode;
use apiflow_types::id::{FlowId, NodeExecutionId, RunId, WorkspaceId};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::graph::FlowGraph;
use super::ports::RuntimeServices;
use super::varmap::VarMap;

/// Sending half of a run's event stream.
///
/// Sends wait for buffer space instead of dropping events. If the
/// consumer has gone away the run is canceled.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::Sender<FlowEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    pub fn new(sender: mpsc::Sender<FlowEvent>, cancel: CancellationToken) -> Self {
        Self { sender, cancel }
    }

    pub async fn send(&self, event: FlowEvent) {
        if self.sender.send(event).await.is_err() && !self.cancel.is_cancelled() {
            tracing::info!("event consumer dropped; canceling run");
            self.cancel.cancel();
        }
    }
}

#[derive(Clone)]
pub struct FlowNodeRequest {
    pub run_id: RunId,
    pub flow_id: FlowId,
    pub workspace_id: WorkspaceId,
    pub graph: Arc<FlowGraph>,
    pub vars: VarMap,
    pub events: EventSink,
    pub cancel: CancellationToken,
    pub services: Arc<RuntimeServices>,
    pub request_timeout: Duration,
}

impl FlowNodeRequest {
    pub async fn emit(
        &self,
        node: &FlowNode,
        status: NodeStatus,
        execution_id: Option<NodeExecutionId>,
        error: Option<String>,
    ) {
        if let Some(logs) = &self.services.logs {
            let level = match status {
                NodeStatus::NodeFailed => LogLevel::Error,
                _ => LogLevel::Info,
            };
            logs.publish(LogEvent {
                workspace_id: self.workspace_id,
                level,
                message: format!("{} {:?}", node.name, status),
                value: serde_json::json!({
                    "run_id": self.run_id,
                    "node_id": node.id,
                    "status": status,
                    "error": error,
                }),
                at: Utc::now(),
            });
        }

        self.events
            .send(FlowEvent::Node {
                run_id: self.run_id,
                node_id: node.id,
                node_name: node.name.clone(),
                status,
                execution_id,
                error,
                at: Utc::now(),
            })
            .await;
    }
}

impl std::fmt::Debug for FlowNodeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowNodeRequest")
            .field("run_id", &self.run_id)
            .field("flow_id", &self.flow_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
