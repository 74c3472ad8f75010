//! Flow graph types: flows, nodes (one variant per kind), edges and the
//! immutable node execution records a run produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assertion::AssertCondition;
use crate::id::{
    EdgeId, EndpointId, ExampleId, FlowId, FlowVariableId, NodeExecutionId, NodeId, ResponseId,
    RunId, WorkspaceId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: FlowId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    /// Upper bound for a whole run. `None` means unbounded.
    pub timeout_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// A flow-scoped variable, seeded into the run's variable map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowVariable {
    pub id: FlowVariableId,
    pub flow_id: FlowId,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
}

/// How a node's failure affects the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    /// Abort the flow.
    #[default]
    Unspecified,
    /// Record the failure and carry on.
    Ignore,
    /// Stop the enclosing loop (or the flow, outside a loop).
    Break,
}

impl ErrorHandling {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorHandling::Unspecified => "unspecified",
            ErrorHandling::Ignore => "ignore",
            ErrorHandling::Break => "break",
        }
    }
}

impl std::str::FromStr for ErrorHandling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unspecified" => Ok(ErrorHandling::Unspecified),
            "ignore" => Ok(ErrorHandling::Ignore),
            "break" => Ok(ErrorHandling::Break),
            other => Err(format!("unknown error handling: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoopKind {
    Start,
    #[default]
    Plain,
}

/// Kind-specific attributes of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeConfig {
    #[serde(rename = "noop")]
    NoOp { noop_kind: NoopKind },
    Request {
        endpoint_id: Option<EndpointId>,
        example_id: Option<ExampleId>,
        delta_endpoint_id: Option<EndpointId>,
        delta_example_id: Option<ExampleId>,
    },
    Condition { condition: AssertCondition },
    For {
        iter_count: u64,
        break_condition: Option<AssertCondition>,
    },
    ForEach {
        iter_path: String,
        break_condition: Option<AssertCondition>,
    },
    Js { code: String },
}

/// Discriminant of [`NodeConfig`], stored on the aggregate node row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    #[serde(rename = "noop")]
    NoOp,
    Request,
    Condition,
    For,
    ForEach,
    Js,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::NoOp => "noop",
            NodeKind::Request => "request",
            NodeKind::Condition => "condition",
            NodeKind::For => "for",
            NodeKind::ForEach => "for_each",
            NodeKind::Js => "js",
        }
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noop" => Ok(NodeKind::NoOp),
            "request" => Ok(NodeKind::Request),
            "condition" => Ok(NodeKind::Condition),
            "for" => Ok(NodeKind::For),
            "for_each" => Ok(NodeKind::ForEach),
            "js" => Ok(NodeKind::Js),
            other => Err(format!("unknown node kind: {other}")),
        }
    }
}

impl NodeConfig {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::NoOp { .. } => NodeKind::NoOp,
            NodeConfig::Request { .. } => NodeKind::Request,
            NodeConfig::Condition { .. } => NodeKind::Condition,
            NodeConfig::For { .. } => NodeKind::For,
            NodeConfig::ForEach { .. } => NodeKind::ForEach,
            NodeConfig::Js { .. } => NodeKind::Js,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: NodeId,
    pub flow_id: FlowId,
    pub name: String,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    #[serde(default)]
    pub position_x: f64,
    #[serde(default)]
    pub position_y: f64,
    pub config: NodeConfig,
}

impl FlowNode {
    pub fn new(flow_id: FlowId, name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: NodeId::new(),
            flow_id,
            name: name.into(),
            error_handling: ErrorHandling::default(),
            position_x: 0.0,
            position_y: 0.0,
            config,
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(
            self.config,
            NodeConfig::NoOp {
                noop_kind: NoopKind::Start
            }
        )
    }
}

/// Labelled output port of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeHandle {
    #[default]
    Unspecified,
    Then,
    Else,
    Loop,
}

impl EdgeHandle {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeHandle::Unspecified => "unspecified",
            EdgeHandle::Then => "then",
            EdgeHandle::Else => "else",
            EdgeHandle::Loop => "loop",
        }
    }
}

impl std::str::FromStr for EdgeHandle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unspecified" => Ok(EdgeHandle::Unspecified),
            "then" => Ok(EdgeHandle::Then),
            "else" => Ok(EdgeHandle::Else),
            "loop" => Ok(EdgeHandle::Loop),
            other => Err(format!("unknown edge handle: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub id: EdgeId,
    pub flow_id: FlowId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    #[serde(default)]
    pub source_handle: EdgeHandle,
    #[serde(default = "default_edge_kind")]
    pub kind: String,
}

fn default_edge_kind() -> String {
    "default".to_string()
}

impl FlowEdge {
    pub fn new(flow_id: FlowId, source_id: NodeId, target_id: NodeId, handle: EdgeHandle) -> Self {
        Self {
            id: EdgeId::new(),
            flow_id,
            source_id,
            target_id,
            source_handle: handle,
            kind: default_edge_kind(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Running,
    Success,
    Failure,
    Canceled,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Running => "running",
            NodeState::Success => "success",
            NodeState::Failure => "failure",
            NodeState::Canceled => "canceled",
        }
    }
}

impl std::str::FromStr for NodeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(NodeState::Running),
            "success" => Ok(NodeState::Success),
            "failure" => Ok(NodeState::Failure),
            "canceled" => Ok(NodeState::Canceled),
            other => Err(format!("unknown node state: {other}")),
        }
    }
}

/// Immutable record of one execution of one node within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
    pub id: NodeExecutionId,
    pub flow_id: FlowId,
    pub node_id: NodeId,
    pub run_id: RunId,
    pub name: String,
    pub state: NodeState,
    pub error: Option<String>,
    pub input_data: Option<serde_json::Value>,
    pub output_data: Option<serde_json::Value>,
    pub response_id: Option<ResponseId>,
    pub completed_at: DateTime<Utc>,
}

/// Per-node totals over a run's execution records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub canceled: usize,
}
