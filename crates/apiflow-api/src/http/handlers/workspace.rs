//! Workspaces, membership, environments and variables.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use serde::Deserialize;

use apiflow_core::repository::WorkspaceRepository;
use apiflow_infra::sqlite::Owned;
use apiflow_types::id::{EnvId, VariableId, WorkspaceId};
use apiflow_types::workspace::{Environment, Variable, Workspace, WorkspaceRole};

use super::{found, required_name};
use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::{ApiResult, ok};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WorkspaceBody {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberBody {
    pub email: String,
    #[serde(default = "member_role")]
    pub role: WorkspaceRole,
}

fn member_role() -> WorkspaceRole {
    WorkspaceRole::Member
}

#[derive(Debug, Deserialize)]
pub struct EnvironmentBody {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VariableBody {
    pub key: Option<String>,
    pub value: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

/// POST /api/v1/workspaces
pub async fn create_workspace(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(body): Json<WorkspaceBody>,
) -> ApiResult<Workspace> {
    let start = Instant::now();
    let workspace = state
        .workspace_service
        .create_workspace(&auth.user_id, &body.name)
        .await?;
    let href = format!("/api/v1/workspaces/{}", workspace.id);
    let Json(resp) = ok(workspace, start);
    Ok(Json(resp.with_link("self", &href).with_link("environments", &format!("{href}/environments"))))
}

/// GET /api/v1/workspaces
pub async fn list_workspaces(State(state): State<AppState>, auth: Authenticated) -> ApiResult<Vec<Workspace>> {
    let start = Instant::now();
    let workspaces = state.workspace_service.repo().list_workspaces(&auth.user_id).await?;
    Ok(ok(workspaces, start))
}

/// GET /api/v1/workspaces/{id}
pub async fn get_workspace(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<WorkspaceId>,
) -> ApiResult<Workspace> {
    let start = Instant::now();
    auth.require(&state, Owned::Workspace(id)).await?;
    let workspace = found(state.workspace_service.repo().get_workspace(&id).await?, format!("workspace {id}"))?;
    Ok(ok(workspace, start))
}

/// PUT /api/v1/workspaces/{id}
pub async fn update_workspace(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<WorkspaceId>,
    Json(body): Json<WorkspaceBody>,
) -> ApiResult<Workspace> {
    let start = Instant::now();
    auth.require(&state, Owned::Workspace(id)).await?;
    let repo = state.workspace_service.repo();
    let mut workspace = found(repo.get_workspace(&id).await?, format!("workspace {id}"))?;
    workspace.name = required_name(&body.name, "workspace")?;
    workspace.updated_at = Utc::now();
    let workspace = repo.update_workspace(&workspace).await?;
    Ok(ok(workspace, start))
}

/// DELETE /api/v1/workspaces/{id} (owners only)
pub async fn delete_workspace(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<WorkspaceId>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require_owner(&state, &id).await?;
    state.workspace_service.repo().delete_workspace(&id).await?;
    tracing::info!(workspace_id = %id, user_id = %auth.user_id, "workspace deleted");
    Ok(ok(serde_json::json!({ "deleted": true, "id": id }), start))
}

/// POST /api/v1/workspaces/{id}/members (owners only)
pub async fn add_member(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<WorkspaceId>,
    Json(body): Json<AddMemberBody>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require_owner(&state, &id).await?;
    let repo = state.workspace_service.repo();
    let email = body.email.trim().to_lowercase();
    let user = found(repo.get_user_by_email(&email).await?, format!("user {email}"))?;
    if repo.member_role(&id, &user.id).await?.is_some() {
        return Err(AppError::Service(apiflow_core::service::ServiceError::Conflict(format!(
            "{email} is already a member"
        ))));
    }
    repo.add_member(&id, &user.id, body.role).await?;
    Ok(ok(
        serde_json::json!({ "workspace_id": id, "user_id": user.id, "role": body.role }),
        start,
    ))
}

/// GET /api/v1/workspaces/{id}/environments
pub async fn list_environments(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<WorkspaceId>,
) -> ApiResult<Vec<Environment>> {
    let start = Instant::now();
    auth.require(&state, Owned::Workspace(id)).await?;
    let envs = state.workspace_service.repo().list_environments(&id).await?;
    Ok(ok(envs, start))
}

/// POST /api/v1/workspaces/{id}/environments
pub async fn create_environment(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<WorkspaceId>,
    Json(body): Json<EnvironmentBody>,
) -> ApiResult<Environment> {
    let start = Instant::now();
    auth.require(&state, Owned::Workspace(id)).await?;
    let env = Environment {
        id: EnvId::new(),
        workspace_id: id,
        name: required_name(body.name.as_deref().unwrap_or_default(), "environment")?,
        description: body.description.unwrap_or_default(),
        is_active: false,
        created_at: Utc::now(),
    };
    let env = state.workspace_service.repo().create_environment(&env).await?;
    Ok(ok(env, start))
}

/// PUT /api/v1/environments/{id}
pub async fn update_environment(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<EnvId>,
    Json(body): Json<EnvironmentBody>,
) -> ApiResult<Environment> {
    let start = Instant::now();
    auth.require(&state, Owned::Environment(id)).await?;
    let repo = state.workspace_service.repo();
    let mut env = found(repo.get_environment(&id).await?, format!("environment {id}"))?;
    if let Some(name) = body.name {
        env.name = required_name(&name, "environment")?;
    }
    if let Some(description) = body.description {
        env.description = description;
    }
    let env = repo.update_environment(&env).await?;
    Ok(ok(env, start))
}

/// DELETE /api/v1/environments/{id}
pub async fn delete_environment(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<EnvId>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Environment(id)).await?;
    state.workspace_service.repo().delete_environment(&id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": id }), start))
}

/// POST /api/v1/environments/{id}/activate
pub async fn activate_environment(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<EnvId>,
) -> ApiResult<Environment> {
    let start = Instant::now();
    let workspace_id = auth.require(&state, Owned::Environment(id)).await?;
    let repo = state.workspace_service.repo();
    repo.activate_environment(&workspace_id, &id).await?;
    let env = found(repo.get_environment(&id).await?, format!("environment {id}"))?;
    Ok(ok(env, start))
}

/// GET /api/v1/environments/{id}/variables
pub async fn list_variables(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<EnvId>,
) -> ApiResult<Vec<Variable>> {
    let start = Instant::now();
    auth.require(&state, Owned::Environment(id)).await?;
    let vars = state.workspace_service.repo().list_variables(&id).await?;
    Ok(ok(vars, start))
}

/// POST /api/v1/environments/{id}/variables
pub async fn create_variable(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<EnvId>,
    Json(body): Json<VariableBody>,
) -> ApiResult<Variable> {
    let start = Instant::now();
    auth.require(&state, Owned::Environment(id)).await?;
    let key = body.key.unwrap_or_default();
    if key.trim().is_empty() {
        return Err(AppError::Validation("variable key cannot be empty".into()));
    }
    let variable = Variable {
        id: VariableId::new(),
        env_id: id,
        key,
        value: body.value.unwrap_or_default(),
        description: body.description.unwrap_or_default(),
        enabled: body.enabled.unwrap_or(true),
    };
    let variable = state.workspace_service.repo().create_variable(&variable).await?;
    Ok(ok(variable, start))
}

/// PUT /api/v1/environments/{env_id}/variables/{id}
pub async fn update_variable(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((env_id, id)): Path<(EnvId, VariableId)>,
    Json(body): Json<VariableBody>,
) -> ApiResult<Variable> {
    let start = Instant::now();
    auth.require(&state, Owned::Variable(id)).await?;
    let repo = state.workspace_service.repo();
    let existing = repo.list_variables(&env_id).await?.into_iter().find(|v| v.id == id);
    let mut variable = found(existing, format!("variable {id}"))?;
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
    let variable = repo.update_variable(&variable).await?;
    Ok(ok(variable, start))
}

/// DELETE /api/v1/environments/{env_id}/variables/{id}
pub async fn delete_variable(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((_env_id, id)): Path<(EnvId, VariableId)>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Variable(id)).await?;
    state.workspace_service.repo().delete_variable(&id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": id }), start))
}
