//! Workspace lifecycle and membership checks.

use apiflow_types::id::{UserId, WorkspaceId};
use apiflow_types::workspace::{Variable, Workspace, WorkspaceRole};

use super::ServiceError;
use crate::repository::WorkspaceRepository;

pub struct WorkspaceService<W: WorkspaceRepository> {
    repo: W,
}

impl<W: WorkspaceRepository> WorkspaceService<W> {
    pub fn new(repo: W) -> Self {
        Self { repo }
    }

    pub fn repo(&self) -> &W {
        &self.repo
    }

    /// Create a workspace owned by `owner`.
    pub async fn create_workspace(&self, owner: &UserId, name: &str) -> Result<Workspace, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Invalid("workspace name cannot be empty".into()));
        }
        let workspace = self.repo.create_workspace(&Workspace::new(name)).await?;
        self.repo
            .add_member(&workspace.id, owner, WorkspaceRole::Owner)
            .await?;
        tracing::info!(workspace_id = %workspace.id, user_id = %owner, "workspace created");
        Ok(workspace)
    }

    /// The caller's role in the workspace. Fails before any mutation when
    /// the workspace is missing or the caller is not a member.
    pub async fn ensure_member(&self, workspace_id: &WorkspaceId, user_id: &UserId) -> Result<WorkspaceRole, ServiceError> {
        if self.repo.get_workspace(workspace_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("workspace {workspace_id}")));
        }
        match self.repo.member_role(workspace_id, user_id).await? {
            Some(role) => Ok(role),
            None => {
                tracing::debug!(workspace_id = %workspace_id, user_id = %user_id, "membership check failed");
                Err(ServiceError::PermissionDenied)
            }
        }
    }

    pub async fn ensure_owner(&self, workspace_id: &WorkspaceId, user_id: &UserId) -> Result<(), ServiceError> {
        match self.ensure_member(workspace_id, user_id).await? {
            WorkspaceRole::Owner => Ok(()),
            WorkspaceRole::Member => Err(ServiceError::PermissionDenied),
        }
    }

    /// Enabled variables of the active environment, if one is active.
    pub async fn active_variables(&self, workspace_id: &WorkspaceId) -> Result<Vec<Variable>, ServiceError> {
        let Some(env) = self.repo.active_environment(workspace_id).await? else {
            return Ok(Vec::new());
        };
        let vars = self.repo.list_variables(&env.id).await?;
        Ok(vars.into_iter().filter(|v| v.enabled).collect())
    }
}
