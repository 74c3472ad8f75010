//! Flows, their variables and graph, and execution records.

use std::collections::HashMap;
use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::Deserialize;

use apiflow_core::repository::FlowRepository;
use apiflow_infra::sqlite::Owned;
use apiflow_types::flow::{
    EdgeHandle, ErrorHandling, ExecutionSummary, Flow, FlowEdge, FlowNode, FlowVariable, NodeConfig,
    NodeExecution,
};
use apiflow_types::id::{EdgeId, FlowId, FlowVariableId, NodeId, WorkspaceId};

use super::{found, required_name};
use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::extractors::query::RunFilterQuery;
use crate::http::response::{ApiResult, ok};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FlowBody {
    pub name: Option<String>,
    /// Whole-run limit in milliseconds; `0` clears it.
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct FlowVariableBody {
    pub key: Option<String>,
    pub value: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct NodeBody {
    pub name: Option<String>,
    pub error_handling: Option<ErrorHandling>,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub config: Option<NodeConfig>,
}

#[derive(Debug, Deserialize)]
pub struct EdgeBody {
    pub source_id: NodeId,
    pub target_id: NodeId,
    #[serde(default)]
    pub source_handle: EdgeHandle,
}

fn repo(state: &AppState) -> &apiflow_infra::sqlite::SqliteFlowRepository {
    state.flow_service.repo()
}

/// Request nodes may only point at endpoints and examples of the flow's
/// own workspace.
async fn check_config(state: &AppState, workspace_id: WorkspaceId, config: &NodeConfig) -> Result<(), AppError> {
    let NodeConfig::Request {
        endpoint_id,
        example_id,
        delta_endpoint_id,
        delta_example_id,
    } = config
    else {
        return Ok(());
    };
    let refs = [
        endpoint_id.map(Owned::Endpoint),
        example_id.map(Owned::Example),
        delta_endpoint_id.map(Owned::Endpoint),
        delta_example_id.map(Owned::Example),
    ];
    for owned in refs.into_iter().flatten() {
        if state.ownership.workspace_of(owned).await? != workspace_id {
            return Err(AppError::Validation(
                "request node references an endpoint or example of another workspace".into(),
            ));
        }
    }
    Ok(())
}

/// GET /api/v1/workspaces/{id}/flows
pub async fn list_flows(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<WorkspaceId>,
) -> ApiResult<Vec<Flow>> {
    let start = Instant::now();
    auth.require(&state, Owned::Workspace(id)).await?;
    Ok(ok(repo(&state).list_flows(&id).await?, start))
}

/// POST /api/v1/workspaces/{id}/flows
pub async fn create_flow(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<WorkspaceId>,
    Json(body): Json<FlowBody>,
) -> ApiResult<Flow> {
    let start = Instant::now();
    auth.require(&state, Owned::Workspace(id)).await?;
    let flow = Flow {
        id: FlowId::new(),
        workspace_id: id,
        name: required_name(body.name.as_deref().unwrap_or_default(), "flow")?,
        timeout_ms: body.timeout_ms.filter(|ms| *ms > 0),
        created_at: Utc::now(),
    };
    let flow = repo(&state).create_flow(&flow).await?;
    let href = format!("/api/v1/flows/{}", flow.id);
    let Json(resp) = ok(flow, start);
    Ok(Json(
        resp.with_link("self", &href)
            .with_link("nodes", &format!("{href}/nodes"))
            .with_link("run", &format!("{href}/run")),
    ))
}

/// GET /api/v1/flows/{id}
pub async fn get_flow(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FlowId>,
) -> ApiResult<Flow> {
    let start = Instant::now();
    auth.require(&state, Owned::Flow(id)).await?;
    Ok(ok(state.flow_service.get_flow(&id).await?, start))
}

/// PUT /api/v1/flows/{id}
pub async fn update_flow(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FlowId>,
    Json(body): Json<FlowBody>,
) -> ApiResult<Flow> {
    let start = Instant::now();
    auth.require(&state, Owned::Flow(id)).await?;
    let mut flow = state.flow_service.get_flow(&id).await?;
    if let Some(name) = body.name {
        flow.name = required_name(&name, "flow")?;
    }
    if let Some(ms) = body.timeout_ms {
        flow.timeout_ms = (ms > 0).then_some(ms);
    }
    Ok(ok(repo(&state).update_flow(&flow).await?, start))
}

/// DELETE /api/v1/flows/{id}
pub async fn delete_flow(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FlowId>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Flow(id)).await?;
    repo(&state).delete_flow(&id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": id }), start))
}

/// GET /api/v1/flows/{id}/variables
pub async fn list_flow_variables(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FlowId>,
) -> ApiResult<Vec<FlowVariable>> {
    let start = Instant::now();
    auth.require(&state, Owned::Flow(id)).await?;
    Ok(ok(repo(&state).list_flow_variables(&id).await?, start))
}

/// POST /api/v1/flows/{id}/variables
pub async fn create_flow_variable(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FlowId>,
    Json(body): Json<FlowVariableBody>,
) -> ApiResult<FlowVariable> {
    let start = Instant::now();
    auth.require(&state, Owned::Flow(id)).await?;
    let key = body.key.unwrap_or_default();
    if key.trim().is_empty() {
        return Err(AppError::Validation("variable key cannot be empty".into()));
    }
    let variable = FlowVariable {
        id: FlowVariableId::new(),
        flow_id: id,
        key,
        value: body.value.unwrap_or_default(),
        description: body.description.unwrap_or_default(),
        enabled: body.enabled.unwrap_or(true),
    };
    Ok(ok(repo(&state).create_flow_variable(&variable).await?, start))
}

/// PUT /api/v1/flows/{flow_id}/variables/{id}
pub async fn update_flow_variable(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((flow_id, id)): Path<(FlowId, FlowVariableId)>,
    Json(body): Json<FlowVariableBody>,
) -> ApiResult<FlowVariable> {
    let start = Instant::now();
    auth.require(&state, Owned::FlowVariable(id)).await?;
    let existing = repo(&state)
        .list_flow_variables(&flow_id)
        .await?
        .into_iter()
        .find(|v| v.id == id);
    let mut variable = found(existing, format!("flow variable {id}"))?;
    if let Some(key) = body.key {
        if key.trim().is_empty() {
            return Err(AppError::Validation("variable key cannot be empty".into()));
        }
        variable.key = key;
    }
    if let Some(value) = body.value {
        variable.value = value;
    }
    if let Some(description) = body.description {
        variable.description = description;
    }
    if let Some(enabled) = body.enabled {
        variable.enabled = enabled;
    }
    Ok(ok(repo(&state).update_flow_variable(&variable).await?, start))
}

/// DELETE /api/v1/flows/{flow_id}/variables/{id}
pub async fn delete_flow_variable(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((_flow_id, id)): Path<(FlowId, FlowVariableId)>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::FlowVariable(id)).await?;
    repo(&state).delete_flow_variable(&id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": id }), start))
}

/// GET /api/v1/flows/{id}/nodes
pub async fn list_nodes(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FlowId>,
) -> ApiResult<Vec<FlowNode>> {
    let start = Instant::now();
    auth.require(&state, Owned::Flow(id)).await?;
    Ok(ok(repo(&state).list_nodes(&id).await?, start))
}

/// POST /api/v1/flows/{id}/nodes
pub async fn create_node(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FlowId>,
    Json(body): Json<NodeBody>,
) -> ApiResult<FlowNode> {
    let start = Instant::now();
    let workspace_id = auth.require(&state, Owned::Flow(id)).await?;
    let config = body
        .config
        .ok_or_else(|| AppError::Validation("node config is required".into()))?;
    check_config(&state, workspace_id, &config).await?;
    let mut node = FlowNode::new(id, required_name(body.name.as_deref().unwrap_or_default(), "node")?, config);
    node.error_handling = body.error_handling.unwrap_or_default();
    node.position_x = body.position_x.unwrap_or_default();
    node.position_y = body.position_y.unwrap_or_default();
    if node.is_start() && repo(&state).list_nodes(&id).await?.iter().any(FlowNode::is_start) {
        return Err(AppError::Validation("flow already has a start node".into()));
    }
    Ok(ok(repo(&state).create_node(&node).await?, start))
}

/// PUT /api/v1/nodes/{id}
pub async fn update_node(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<NodeId>,
    Json(body): Json<NodeBody>,
) -> ApiResult<FlowNode> {
    let start = Instant::now();
    let workspace_id = auth.require(&state, Owned::Node(id)).await?;
    let mut node = found(repo(&state).get_node(&id).await?, format!("node {id}"))?;
    if let Some(name) = body.name {
        node.name = required_name(&name, "node")?;
    }
    if let Some(mode) = body.error_handling {
        node.error_handling = mode;
    }
    if let Some(x) = body.position_x {
        node.position_x = x;
    }
    if let Some(y) = body.position_y {
        node.position_y = y;
    }
    if let Some(config) = body.config {
        if config.kind() != node.config.kind() {
            return Err(AppError::Validation(format!(
                "node kind cannot change from {} to {}",
                node.config.kind().as_str(),
                config.kind().as_str()
            )));
        }
        check_config(&state, workspace_id, &config).await?;
        node.config = config;
    }
    Ok(ok(repo(&state).update_node(&node).await?, start))
}

/// DELETE /api/v1/nodes/{id}
pub async fn delete_node(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<NodeId>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Node(id)).await?;
    repo(&state).delete_node(&id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": id }), start))
}

/// GET /api/v1/flows/{id}/edges
pub async fn list_edges(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FlowId>,
) -> ApiResult<Vec<FlowEdge>> {
    let start = Instant::now();
    auth.require(&state, Owned::Flow(id)).await?;
    Ok(ok(repo(&state).list_edges(&id).await?, start))
}

/// POST /api/v1/flows/{id}/edges
pub async fn create_edge(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FlowId>,
    Json(body): Json<EdgeBody>,
) -> ApiResult<FlowEdge> {
    let start = Instant::now();
    auth.require(&state, Owned::Flow(id)).await?;
    for node_id in [body.source_id, body.target_id] {
        let node = found(repo(&state).get_node(&node_id).await?, format!("node {node_id}"))?;
        if node.flow_id != id {
            return Err(AppError::Validation(format!("node {node_id} belongs to another flow")));
        }
    }
    let edge = FlowEdge::new(id, body.source_id, body.target_id, body.source_handle);
    Ok(ok(repo(&state).create_edge(&edge).await?, start))
}

/// DELETE /api/v1/edges/{id}
pub async fn delete_edge(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<EdgeId>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Edge(id)).await?;
    repo(&state).delete_edge(&id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": id }), start))
}

/// GET /api/v1/flows/{id}/executions?run_id=
pub async fn list_executions(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FlowId>,
    Query(query): Query<RunFilterQuery>,
) -> ApiResult<Vec<NodeExecution>> {
    let start = Instant::now();
    auth.require(&state, Owned::Flow(id)).await?;
    Ok(ok(repo(&state).list_executions(&id, query.run_id).await?, start))
}

/// GET /api/v1/flows/{id}/summary?run_id= - Per-node outcome counts.
pub async fn execution_summary(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FlowId>,
    Query(query): Query<RunFilterQuery>,
) -> ApiResult<HashMap<NodeId, ExecutionSummary>> {
    let start = Instant::now();
    auth.require(&state, Owned::Flow(id)).await?;
    Ok(ok(state.flow_service.execution_summary(&id, query.run_id).await?, start))
}

/// GET /api/v1/nodes/{id}/executions
pub async fn list_node_executions(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<NodeId>,
) -> ApiResult<Vec<NodeExecution>> {
    let start = Instant::now();
    auth.require(&state, Owned::Node(id)).await?;
    Ok(ok(repo(&state).list_node_executions(&id).await?, start))
}
