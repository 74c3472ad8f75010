//! Row parsing, error mapping and commit helpers shared by the repositories.

use std::str::FromStr;

use apiflow_core::event::{EventBus, SyncTracker};
use apiflow_types::error::RepositoryError;
use apiflow_types::event::SyncEvent;
use apiflow_types::id::{CollectionId, EnvId, ExampleId, FlowId, WorkspaceId};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, Transaction};

pub(crate) fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

/// Map a failed INSERT/UPDATE, turning constraint violations into typed errors.
pub(crate) fn write_err(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e {
        let message = db_err.message();
        if message.contains("UNIQUE") || message.contains("PRIMARY KEY") {
            return RepositoryError::Conflict(format!("{what} already exists"));
        }
        if message.contains("FOREIGN KEY") {
            return RepositoryError::Invalid(format!("{what} references a missing row"));
        }
    }
    RepositoryError::Query(e.to_string())
}

pub(crate) fn parse_id<I>(s: &str) -> Result<I, RepositoryError>
where
    I: FromStr<Err = uuid::Error>,
{
    s.parse::<I>()
        .map_err(|e| RepositoryError::Query(format!("invalid id '{s}': {e}")))
}

pub(crate) fn parse_opt_id<I>(s: Option<String>) -> Result<Option<I>, RepositoryError>
where
    I: FromStr<Err = uuid::Error>,
{
    s.as_deref().map(parse_id).transpose()
}

pub(crate) fn parse_enum<T>(s: &str) -> Result<T, RepositoryError>
where
    T: FromStr<Err = String>,
{
    s.parse::<T>().map_err(RepositoryError::Query)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn opt_id<I: ToString>(id: Option<I>) -> Option<String> {
    id.map(|i| i.to_string())
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Invalid(format!("serialize: {e}")))
}

pub(crate) fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid stored JSON: {e}")))
}

/// Commit `tx`, then publish what `tracker` collected. A failed commit
/// publishes nothing.
pub(crate) async fn commit(
    tx: Transaction<'static, Sqlite>,
    tracker: SyncTracker,
    bus: Option<&EventBus<SyncEvent>>,
) -> Result<(), RepositoryError> {
    let commit = async { tx.commit().await.map_err(query_err) };
    match bus {
        Some(bus) => tracker.publish_after(commit, bus).await,
        None => commit.await,
    }
}

async fn lookup_workspace(
    conn: &mut SqliteConnection,
    sql: &str,
    key: String,
) -> Result<WorkspaceId, RepositoryError> {
    let row: Option<(String,)> = sqlx::query_as(sql)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_err)?;
    match row {
        Some((id,)) => parse_id(&id),
        None => Err(RepositoryError::NotFound),
    }
}

pub(crate) async fn workspace_of_collection(
    conn: &mut SqliteConnection,
    id: &CollectionId,
) -> Result<WorkspaceId, RepositoryError> {
    lookup_workspace(conn, "SELECT workspace_id FROM collections WHERE id = ?", id.to_string()).await
}

pub(crate) async fn workspace_of_example(
    conn: &mut SqliteConnection,
    id: &ExampleId,
) -> Result<WorkspaceId, RepositoryError> {
    lookup_workspace(
        conn,
        "SELECT c.workspace_id FROM examples ex
           JOIN endpoints e ON e.id = ex.endpoint_id
           JOIN collections c ON c.id = e.collection_id
          WHERE ex.id = ?",
        id.to_string(),
    )
    .await
}

pub(crate) async fn workspace_of_flow(
    conn: &mut SqliteConnection,
    id: &FlowId,
) -> Result<WorkspaceId, RepositoryError> {
    lookup_workspace(conn, "SELECT workspace_id FROM flows WHERE id = ?", id.to_string()).await
}

pub(crate) async fn workspace_of_env(
    conn: &mut SqliteConnection,
    id: &EnvId,
) -> Result<WorkspaceId, RepositoryError> {
    lookup_workspace(conn, "SELECT workspace_id FROM environments WHERE id = ?", id.to_string()).await
}
