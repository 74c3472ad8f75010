//! Events published while flows run and when stored entities change.
//!
//! All types are Clone + Send + Sync for use with tokio channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::{FlowId, NodeExecutionId, NodeId, RunId, WorkspaceId};

/// Status transitions of a node, in the order a consumer observes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    NodeStarted,
    NodeRunning,
    NodeSuccess,
    NodeFailed,
}

/// Events on a single run's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    Node {
        run_id: RunId,
        node_id: NodeId,
        node_name: String,
        status: NodeStatus,
        execution_id: Option<NodeExecutionId>,
        error: Option<String>,
        at: DateTime<Utc>,
    },
    /// Terminal event; nothing follows it on the stream.
    Finished {
        run_id: RunId,
        flow_id: FlowId,
        outcome: RunOutcome,
        error: Option<String>,
        duration_ms: u64,
    },
}

impl FlowEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            FlowEvent::Node { run_id, .. } | FlowEvent::Finished { run_id, .. } => *run_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowEvent::Finished { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed,
    Canceled,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Entry on a workspace's log channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub workspace_id: WorkspaceId,
    pub level: LogLevel,
    pub message: String,
    /// Structured context (node id, status, error code...).
    pub value: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Entity families whose changes are announced after commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTopic {
    Workspace,
    Collection,
    CollectionItem,
    Endpoint,
    Example,
    Header,
    Query,
    UrlEncoded,
    Form,
    Assert,
    RawBody,
    Flow,
    Node,
    Edge,
    FlowVariable,
    Environment,
    Variable,
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOp {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncChange {
    pub op: SyncOp,
    pub id: Uuid,
}

/// A batch of committed changes on one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub workspace_id: WorkspaceId,
    pub topic: SyncTopic,
    pub changes: Vec<SyncChange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_status_serializes_as_wire_names() {
        let json = serde_json::to_string(&NodeStatus::NodeStarted).unwrap();
        assert_eq!(json, "\"NODE_STARTED\"");
    }

    #[test]
    fn finished_is_terminal() {
        let run_id = RunId::new();
        let ev = FlowEvent::Finished {
            run_id,
            flow_id: FlowId::new(),
            outcome: RunOutcome::Completed,
            error: None,
            duration_ms: 3,
        };
        assert!(ev.is_terminal());
        assert_eq!(ev.run_id(), run_id);
    }
}
