//! Workspace, membership, environment and variable storage.

use apiflow_types::error::RepositoryError;
use apiflow_types::id::{EnvId, UserId, VariableId, WorkspaceId};
use apiflow_types::workspace::{Environment, User, Variable, Workspace, WorkspaceRole};

/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkspaceRepository: Send + Sync {
    fn create_workspace(
        &self,
        workspace: &Workspace,
    ) -> impl std::future::Future<Output = Result<Workspace, RepositoryError>> + Send;

    fn get_workspace(
        &self,
        id: &WorkspaceId,
    ) -> impl std::future::Future<Output = Result<Option<Workspace>, RepositoryError>> + Send;

    /// Workspaces the user belongs to, oldest first.
    fn list_workspaces(
        &self,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Workspace>, RepositoryError>> + Send;

    fn update_workspace(
        &self,
        workspace: &Workspace,
    ) -> impl std::future::Future<Output = Result<Workspace, RepositoryError>> + Send;

    fn delete_workspace(
        &self,
        id: &WorkspaceId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn create_user(
        &self,
        user: &User,
    ) -> impl std::future::Future<Output = Result<User, RepositoryError>> + Send;

    fn get_user(
        &self,
        id: &UserId,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    fn get_user_by_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    fn add_member(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &UserId,
        role: WorkspaceRole,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn member_role(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &UserId,
    ) -> impl std::future::Future<Output = Result<Option<WorkspaceRole>, RepositoryError>> + Send;

    fn create_environment(
        &self,
        env: &Environment,
    ) -> impl std::future::Future<Output = Result<Environment, RepositoryError>> + Send;

    fn get_environment(
        &self,
        id: &EnvId,
    ) -> impl std::future::Future<Output = Result<Option<Environment>, RepositoryError>> + Send;

    fn list_environments(
        &self,
        workspace_id: &WorkspaceId,
    ) -> impl std::future::Future<Output = Result<Vec<Environment>, RepositoryError>> + Send;

    fn update_environment(
        &self,
        env: &Environment,
    ) -> impl std::future::Future<Output = Result<Environment, RepositoryError>> + Send;

    fn delete_environment(
        &self,
        id: &EnvId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Make `env_id` the only active environment of its workspace.
    fn activate_environment(
        &self,
        workspace_id: &WorkspaceId,
        env_id: &EnvId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn active_environment(
        &self,
        workspace_id: &WorkspaceId,
    ) -> impl std::future::Future<Output = Result<Option<Environment>, RepositoryError>> + Send;

    fn create_variable(
        &self,
        variable: &Variable,
    ) -> impl std::future::Future<Output = Result<Variable, RepositoryError>> + Send;

    fn list_variables(
        &self,
        env_id: &EnvId,
    ) -> impl std::future::Future<Output = Result<Vec<Variable>, RepositoryError>> + Send;

    fn update_variable(
        &self,
        variable: &Variable,
    ) -> impl std::future::Future<Output = Result<Variable, RepositoryError>> + Send;

    fn delete_variable(
        &self,
        id: &VariableId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
