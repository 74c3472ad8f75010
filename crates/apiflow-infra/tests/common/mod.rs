//! Shared setup for the infra integration tests.

#![allow(dead_code)]

use apiflow_core::repository::{CollectionRepository, ExampleRepository, WorkspaceRepository};
use apiflow_infra::sqlite::{
    DatabasePool, SqliteCollectionRepository, SqliteExampleRepository, SqliteWorkspaceRepository,
};
use apiflow_types::collection::{BodyKind, Collection, Endpoint, Example, FieldKind, KeyValue};
use apiflow_types::id::{CollectionId, EndpointId, ExampleId};
use apiflow_types::workspace::Workspace;
use chrono::Utc;
use tempfile::TempDir;

/// A migrated database that is removed when dropped.
pub struct TestDb {
    pub pool: DatabasePool,
    _dir: TempDir,
}

pub async fn test_db() -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("apiflow.db").display());
    let pool = DatabasePool::new(&url).await.unwrap();
    TestDb { pool, _dir: dir }
}

pub async fn workspace(pool: &DatabasePool) -> Workspace {
    SqliteWorkspaceRepository::new(pool.clone())
        .create_workspace(&Workspace::new("integration"))
        .await
        .unwrap()
}

pub async fn endpoint(pool: &DatabasePool, workspace: &Workspace, method: &str, url: &str) -> Endpoint {
    let collections = SqliteCollectionRepository::new(pool.clone());
    let collection = collections
        .create_collection(&Collection {
            id: CollectionId::new(),
            workspace_id: workspace.id,
            name: "api".into(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    collections
        .create_endpoint(&Endpoint {
            id: EndpointId::new(),
            collection_id: collection.id,
            folder_id: None,
            name: "endpoint".into(),
            method: method.into(),
            url: url.into(),
            delta_parent_id: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

pub async fn example(pool: &DatabasePool, endpoint_id: EndpointId, name: &str) -> Example {
    SqliteExampleRepository::new(pool.clone())
        .create_example(&Example {
            id: ExampleId::new(),
            endpoint_id,
            name: name.into(),
            is_default: false,
            body_kind: BodyKind::None,
            version_parent_id: None,
            prev: None,
            next: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

/// Append headers `keys` (value = lowercase key) to `example_id`.
pub async fn headers(pool: &DatabasePool, example_id: ExampleId, keys: &[&str]) -> Vec<KeyValue> {
    let repo = SqliteExampleRepository::new(pool.clone());
    let mut out = Vec::new();
    for key in keys {
        let field = KeyValue::new(example_id, *key, key.to_lowercase());
        out.push(repo.append_field(FieldKind::Header, &field).await.unwrap());
    }
    out
}
