//! SQLite workspace repository: workspaces, users, memberships,
//! environments and environment variables.

use apiflow_core::event::{EventBus, SyncTracker};
use apiflow_core::repository::WorkspaceRepository;
use apiflow_types::error::RepositoryError;
use apiflow_types::event::{SyncEvent, SyncOp, SyncTopic};
use apiflow_types::id::{EnvId, UserId, VariableId, WorkspaceId};
use apiflow_types::workspace::{Environment, User, Variable, Workspace, WorkspaceRole};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::pool::DatabasePool;
use super::util::{
    commit, format_datetime, parse_datetime, parse_enum, parse_id, query_err, workspace_of_env,
    write_err,
};

/// SQLite-backed implementation of `WorkspaceRepository`.
pub struct SqliteWorkspaceRepository {
    pool: DatabasePool,
    sync: Option<EventBus<SyncEvent>>,
}

impl SqliteWorkspaceRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool, sync: None }
    }

    /// Publish committed changes on `bus`.
    pub fn with_sync(mut self, bus: EventBus<SyncEvent>) -> Self {
        self.sync = Some(bus);
        self
    }

    /// Handle whose queries run on `conn`, typically an open transaction.
    pub fn tx<'c>(&self, conn: &'c mut SqliteConnection) -> WorkspaceQueries<'c> {
        WorkspaceQueries { conn }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_workspace(row: &SqliteRow) -> Result<Workspace, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_err)?;
    Ok(Workspace {
        id: parse_id(&id)?,
        name: row.try_get("name").map_err(query_err)?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    Ok(User {
        id: parse_id(&id)?,
        email: row.try_get("email").map_err(query_err)?,
        name: row.try_get("name").map_err(query_err)?,
        created_at: parse_datetime(&created_at)?,
    })
}

fn row_to_environment(row: &SqliteRow) -> Result<Environment, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let workspace_id: String = row.try_get("workspace_id").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    Ok(Environment {
        id: parse_id(&id)?,
        workspace_id: parse_id(&workspace_id)?,
        name: row.try_get("name").map_err(query_err)?,
        description: row.try_get("description").map_err(query_err)?,
        is_active: row.try_get("is_active").map_err(query_err)?,
        created_at: parse_datetime(&created_at)?,
    })
}

fn row_to_variable(row: &SqliteRow) -> Result<Variable, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let env_id: String = row.try_get("env_id").map_err(query_err)?;
    Ok(Variable {
        id: parse_id(&id)?,
        env_id: parse_id(&env_id)?,
        key: row.try_get("var_key").map_err(query_err)?,
        value: row.try_get("value").map_err(query_err)?,
        description: row.try_get("description").map_err(query_err)?,
        enabled: row.try_get("enabled").map_err(query_err)?,
    })
}

// ---------------------------------------------------------------------------
// Connection-bound queries
// ---------------------------------------------------------------------------

/// Workspace queries bound to one connection.
pub struct WorkspaceQueries<'c> {
    conn: &'c mut SqliteConnection,
}

impl WorkspaceQueries<'_> {
    pub async fn insert_workspace(&mut self, workspace: &Workspace) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO workspaces (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(workspace.id.to_string())
            .bind(&workspace.name)
            .bind(format_datetime(&workspace.created_at))
            .bind(format_datetime(&workspace.updated_at))
            .execute(&mut *self.conn)
            .await
            .map_err(|e| write_err(e, "workspace"))?;
        Ok(())
    }

    pub async fn get_workspace(&mut self, id: &WorkspaceId) -> Result<Option<Workspace>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workspaces WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_workspace).transpose()
    }

    pub async fn workspace_exists(&mut self, id: &WorkspaceId) -> Result<bool, RepositoryError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM workspaces WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        Ok(row.is_some())
    }

    pub async fn list_workspaces(&mut self, user_id: &UserId) -> Result<Vec<Workspace>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT w.* FROM workspaces w
               JOIN workspace_users wu ON wu.workspace_id = w.id
              WHERE wu.user_id = ?
              ORDER BY w.created_at ASC, w.id ASC",
        )
        .bind(user_id.to_string())
        .fetch_all(&mut *self.conn)
        .await
        .map_err(query_err)?;
        rows.iter().map(row_to_workspace).collect()
    }

    pub async fn update_workspace(&mut self, workspace: &Workspace) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE workspaces SET name = ?, updated_at = ? WHERE id = ?")
            .bind(&workspace.name)
            .bind(format_datetime(&workspace.updated_at))
            .bind(workspace.id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_workspace(&mut self, id: &WorkspaceId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM workspaces WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn insert_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO users (id, email, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(user.id.to_string())
            .bind(&user.email)
            .bind(&user.name)
            .bind(format_datetime(&user.created_at))
            .execute(&mut *self.conn)
            .await
            .map_err(|e| write_err(e, "user"))?;
        Ok(())
    }

    pub async fn get_user(&mut self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn upsert_member(
        &mut self,
        workspace_id: &WorkspaceId,
        user_id: &UserId,
        role: WorkspaceRole,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO workspace_users (workspace_id, user_id, role) VALUES (?, ?, ?)
             ON CONFLICT(workspace_id, user_id) DO UPDATE SET role = excluded.role",
        )
        .bind(workspace_id.to_string())
        .bind(user_id.to_string())
        .bind(role.as_str())
        .execute(&mut *self.conn)
        .await
        .map_err(|e| write_err(e, "membership"))?;
        Ok(())
    }

    pub async fn member_role(
        &mut self,
        workspace_id: &WorkspaceId,
        user_id: &UserId,
    ) -> Result<Option<WorkspaceRole>, RepositoryError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT role FROM workspace_users WHERE workspace_id = ? AND user_id = ?")
                .bind(workspace_id.to_string())
                .bind(user_id.to_string())
                .fetch_optional(&mut *self.conn)
                .await
                .map_err(query_err)?;
        row.map(|(role,)| parse_enum(&role)).transpose()
    }

    pub async fn insert_environment(&mut self, env: &Environment) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO environments (id, workspace_id, name, description, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(env.id.to_string())
        .bind(env.workspace_id.to_string())
        .bind(&env.name)
        .bind(&env.description)
        .bind(env.is_active)
        .bind(format_datetime(&env.created_at))
        .execute(&mut *self.conn)
        .await
        .map_err(|e| write_err(e, "environment"))?;
        Ok(())
    }

    pub async fn get_environment(&mut self, id: &EnvId) -> Result<Option<Environment>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM environments WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_environment).transpose()
    }

    pub async fn list_environments(&mut self, workspace_id: &WorkspaceId) -> Result<Vec<Environment>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM environments WHERE workspace_id = ? ORDER BY created_at ASC, id ASC")
            .bind(workspace_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        rows.iter().map(row_to_environment).collect()
    }

    pub async fn update_environment(&mut self, env: &Environment) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE environments SET name = ?, description = ? WHERE id = ?")
            .bind(&env.name)
            .bind(&env.description)
            .bind(env.id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_environment(&mut self, id: &EnvId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM environments WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn activate_environment(
        &mut self,
        workspace_id: &WorkspaceId,
        env_id: &EnvId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE environments SET is_active = (id = ?) WHERE workspace_id = ?")
            .bind(env_id.to_string())
            .bind(workspace_id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn active_environment(
        &mut self,
        workspace_id: &WorkspaceId,
    ) -> Result<Option<Environment>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM environments WHERE workspace_id = ? AND is_active = 1 LIMIT 1")
            .bind(workspace_id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_environment).transpose()
    }

    pub async fn insert_variable(&mut self, variable: &Variable) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO variables (id, env_id, var_key, value, description, enabled)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(variable.id.to_string())
        .bind(variable.env_id.to_string())
        .bind(&variable.key)
        .bind(&variable.value)
        .bind(&variable.description)
        .bind(variable.enabled)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| write_err(e, "variable"))?;
        Ok(())
    }

    pub async fn list_variables(&mut self, env_id: &EnvId) -> Result<Vec<Variable>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM variables WHERE env_id = ? ORDER BY rowid")
            .bind(env_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        rows.iter().map(row_to_variable).collect()
    }

    pub async fn env_of_variable(&mut self, id: &VariableId) -> Result<EnvId, RepositoryError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT env_id FROM variables WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        match row {
            Some((env_id,)) => parse_id(&env_id),
            None => Err(RepositoryError::NotFound),
        }
    }

    pub async fn update_variable(&mut self, variable: &Variable) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE variables SET var_key = ?, value = ?, description = ?, enabled = ? WHERE id = ?",
        )
        .bind(&variable.key)
        .bind(&variable.value)
        .bind(&variable.description)
        .bind(variable.enabled)
        .bind(variable.id.to_string())
        .execute(&mut *self.conn)
        .await
        .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_variable(&mut self, id: &VariableId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM variables WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WorkspaceRepository impl
// ---------------------------------------------------------------------------

impl SqliteWorkspaceRepository {
    async fn reader(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>, RepositoryError> {
        self.pool.reader.acquire().await.map_err(query_err)
    }
}

impl WorkspaceRepository for SqliteWorkspaceRepository {
    async fn create_workspace(&self, workspace: &Workspace) -> Result<Workspace, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        self.tx(&mut tx).insert_workspace(workspace).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace.id, SyncTopic::Workspace, SyncOp::Insert, workspace.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(workspace.clone())
    }

    async fn get_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).get_workspace(id).await
    }

    async fn list_workspaces(&self, user_id: &UserId) -> Result<Vec<Workspace>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_workspaces(user_id).await
    }

    async fn update_workspace(&self, workspace: &Workspace) -> Result<Workspace, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        self.tx(&mut tx).update_workspace(workspace).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace.id, SyncTopic::Workspace, SyncOp::Update, workspace.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(workspace.clone())
    }

    async fn delete_workspace(&self, id: &WorkspaceId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        self.tx(&mut tx).delete_workspace(id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(*id, SyncTopic::Workspace, SyncOp::Delete, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn create_user(&self, user: &User) -> Result<User, RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_err)?;
        self.tx(&mut conn).insert_user(user).await?;
        Ok(user.clone())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).get_user(id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).get_user_by_email(email).await
    }

    async fn add_member(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &UserId,
        role: WorkspaceRole,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_err)?;
        self.tx(&mut conn).upsert_member(workspace_id, user_id, role).await
    }

    async fn member_role(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &UserId,
    ) -> Result<Option<WorkspaceRole>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).member_role(workspace_id, user_id).await
    }

    async fn create_environment(&self, env: &Environment) -> Result<Environment, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        queries.insert_environment(env).await?;
        if env.is_active {
            queries.activate_environment(&env.workspace_id, &env.id).await?;
        }
        let mut tracker = SyncTracker::new();
        tracker.track(env.workspace_id, SyncTopic::Environment, SyncOp::Insert, env.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(env.clone())
    }

    async fn get_environment(&self, id: &EnvId) -> Result<Option<Environment>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).get_environment(id).await
    }

    async fn list_environments(&self, workspace_id: &WorkspaceId) -> Result<Vec<Environment>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_environments(workspace_id).await
    }

    async fn update_environment(&self, env: &Environment) -> Result<Environment, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        self.tx(&mut tx).update_environment(env).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(env.workspace_id, SyncTopic::Environment, SyncOp::Update, env.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(env.clone())
    }

    async fn delete_environment(&self, id: &EnvId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let workspace_id = workspace_of_env(&mut tx, id).await?;
        self.tx(&mut tx).delete_environment(id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Environment, SyncOp::Delete, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn activate_environment(&self, workspace_id: &WorkspaceId, env_id: &EnvId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        match queries.get_environment(env_id).await? {
            Some(env) if env.workspace_id == *workspace_id => {}
            Some(_) => {
                return Err(RepositoryError::Invalid(
                    "environment belongs to another workspace".into(),
                ));
            }
            None => return Err(RepositoryError::NotFound),
        }
        queries.activate_environment(workspace_id, env_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(*workspace_id, SyncTopic::Environment, SyncOp::Update, *env_id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn active_environment(&self, workspace_id: &WorkspaceId) -> Result<Option<Environment>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).active_environment(workspace_id).await
    }

    async fn create_variable(&self, variable: &Variable) -> Result<Variable, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        self.tx(&mut tx).insert_variable(variable).await?;
        let workspace_id = workspace_of_env(&mut tx, &variable.env_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Variable, SyncOp::Insert, variable.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(variable.clone())
    }

    async fn list_variables(&self, env_id: &EnvId) -> Result<Vec<Variable>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_variables(env_id).await
    }

    async fn update_variable(&self, variable: &Variable) -> Result<Variable, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        self.tx(&mut tx).update_variable(variable).await?;
        let workspace_id = workspace_of_env(&mut tx, &variable.env_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Variable, SyncOp::Update, variable.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(variable.clone())
    }

    async fn delete_variable(&self, id: &VariableId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let env_id = queries.env_of_variable(id).await?;
        queries.delete_variable(id).await?;
        let workspace_id = workspace_of_env(&mut tx, &env_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Variable, SyncOp::Delete, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }
}
