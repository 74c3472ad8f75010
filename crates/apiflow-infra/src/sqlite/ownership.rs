//! Resolves the workspace that owns a stored row, for permission checks
//! made before any mutation.

use apiflow_types::collection::FieldKind;
use apiflow_types::error::RepositoryError;
use apiflow_types::id::{
    AssertId, CollectionId, CollectionItemId, EdgeId, EndpointId, EnvId, ExampleId, FieldId, FlowId, FlowVariableId,
    FolderId, NodeId, ResponseId, VariableId, WorkspaceId,
};

use super::example::field_table;
use super::pool::DatabasePool;
use super::util::{parse_id, query_err};

/// A row whose owning workspace is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owned {
    Workspace(WorkspaceId),
    Collection(CollectionId),
    CollectionItem(CollectionItemId),
    Folder(FolderId),
    Endpoint(EndpointId),
    Example(ExampleId),
    Field(FieldKind, FieldId),
    Assert(AssertId),
    Response(ResponseId),
    Environment(EnvId),
    Variable(VariableId),
    Flow(FlowId),
    FlowVariable(FlowVariableId),
    Node(NodeId),
    Edge(EdgeId),
}

const EXAMPLE_TO_WORKSPACE: &str = "JOIN examples ex ON ex.id = t.example_id
       JOIN endpoints e ON e.id = ex.endpoint_id
       JOIN collections c ON c.id = e.collection_id";

#[derive(Clone)]
pub struct SqliteOwnership {
    pool: DatabasePool,
}

impl SqliteOwnership {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// The owning workspace, or `NotFound` when the row does not exist.
    pub async fn workspace_of(&self, owned: Owned) -> Result<WorkspaceId, RepositoryError> {
        let (sql, key) = match owned {
            Owned::Workspace(id) => ("SELECT id FROM workspaces WHERE id = ?".to_string(), id.to_string()),
            Owned::Collection(id) => (
                "SELECT workspace_id FROM collections WHERE id = ?".to_string(),
                id.to_string(),
            ),
            Owned::CollectionItem(id) => (
                "SELECT c.workspace_id FROM collection_items i JOIN collections c ON c.id = i.collection_id WHERE i.id = ?"
                    .to_string(),
                id.to_string(),
            ),
            Owned::Folder(id) => (
                "SELECT c.workspace_id FROM folders f JOIN collections c ON c.id = f.collection_id WHERE f.id = ?"
                    .to_string(),
                id.to_string(),
            ),
            Owned::Endpoint(id) => (
                "SELECT c.workspace_id FROM endpoints e JOIN collections c ON c.id = e.collection_id WHERE e.id = ?"
                    .to_string(),
                id.to_string(),
            ),
            Owned::Example(id) => (
                "SELECT c.workspace_id FROM examples ex
                   JOIN endpoints e ON e.id = ex.endpoint_id
                   JOIN collections c ON c.id = e.collection_id
                  WHERE ex.id = ?"
                    .to_string(),
                id.to_string(),
            ),
            Owned::Field(kind, id) => (
                format!(
                    "SELECT c.workspace_id FROM {} t {EXAMPLE_TO_WORKSPACE} WHERE t.id = ?",
                    field_table(kind)
                ),
                id.to_string(),
            ),
            Owned::Assert(id) => (
                format!("SELECT c.workspace_id FROM asserts t {EXAMPLE_TO_WORKSPACE} WHERE t.id = ?"),
                id.to_string(),
            ),
            Owned::Response(id) => (
                format!("SELECT c.workspace_id FROM example_responses t {EXAMPLE_TO_WORKSPACE} WHERE t.id = ?"),
                id.to_string(),
            ),
            Owned::Environment(id) => (
                "SELECT workspace_id FROM environments WHERE id = ?".to_string(),
                id.to_string(),
            ),
            Owned::Variable(id) => (
                "SELECT en.workspace_id FROM variables v JOIN environments en ON en.id = v.env_id WHERE v.id = ?"
                    .to_string(),
                id.to_string(),
            ),
            Owned::Flow(id) => ("SELECT workspace_id FROM flows WHERE id = ?".to_string(), id.to_string()),
            Owned::FlowVariable(id) => (
                "SELECT f.workspace_id FROM flow_variables v JOIN flows f ON f.id = v.flow_id WHERE v.id = ?"
                    .to_string(),
                id.to_string(),
            ),
            Owned::Node(id) => (
                "SELECT f.workspace_id FROM flow_nodes n JOIN flows f ON f.id = n.flow_id WHERE n.id = ?"
                    .to_string(),
                id.to_string(),
            ),
            Owned::Edge(id) => (
                "SELECT f.workspace_id FROM flow_edges e JOIN flows f ON f.id = e.flow_id WHERE e.id = ?"
                    .to_string(),
                id.to_string(),
            ),
        };

        let row: Option<(String,)> = sqlx::query_as(&sql)
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;
        match row {
            Some((id,)) => parse_id(&id),
            None => Err(RepositoryError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::testing::test_pool;
    use crate::sqlite::{SqliteCollectionRepository, SqliteExampleRepository, SqliteWorkspaceRepository};
    use apiflow_core::repository::{CollectionRepository, ExampleRepository, WorkspaceRepository};
    use apiflow_types::collection::{BodyKind, Collection, Endpoint, Example, KeyValue};
    use apiflow_types::workspace::Workspace;
    use chrono::Utc;

    #[tokio::test]
    async fn nested_rows_resolve_to_their_workspace() {
        let pool = test_pool().await;
        let ws = SqliteWorkspaceRepository::new(pool.clone())
            .create_workspace(&Workspace::new("w"))
            .await
            .unwrap();
        let collections = SqliteCollectionRepository::new(pool.clone());
        let collection = collections
            .create_collection(&Collection {
                id: CollectionId::new(),
                workspace_id: ws.id,
                name: "c".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let endpoint = collections
            .create_endpoint(&Endpoint {
                id: EndpointId::new(),
                collection_id: collection.id,
                folder_id: None,
                name: "e".into(),
                method: "GET".into(),
                url: "https://api.test".into(),
                delta_parent_id: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let examples = SqliteExampleRepository::new(pool.clone());
        let example = examples
            .create_example(&Example {
                id: ExampleId::new(),
                endpoint_id: endpoint.id,
                name: "x".into(),
                is_default: true,
                body_kind: BodyKind::None,
                version_parent_id: None,
                prev: None,
                next: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let header = examples
            .append_field(FieldKind::Header, &KeyValue::new(example.id, "A", "a"))
            .await
            .unwrap();

        let ownership = SqliteOwnership::new(pool.clone());
        for owned in [
            Owned::Workspace(ws.id),
            Owned::Collection(collection.id),
            Owned::Endpoint(endpoint.id),
            Owned::Example(example.id),
            Owned::Field(FieldKind::Header, header.id),
        ] {
            assert_eq!(ownership.workspace_of(owned).await.unwrap(), ws.id);
        }
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let pool = test_pool().await;
        let ownership = SqliteOwnership::new(pool);
        let err = ownership.workspace_of(Owned::Flow(FlowId::new())).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
        let err = ownership
            .workspace_of(Owned::Field(FieldKind::Form, FieldId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }
}
