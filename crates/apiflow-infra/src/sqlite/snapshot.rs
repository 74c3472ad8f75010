//! Workspace export and import.
//!
//! Export reads every owned row inside one read transaction, so the dump is
//! consistent even while writers commit. Import validates the aggregate,
//! rejects identifiers that already exist, then writes everything in one
//! write transaction with foreign keys deferred to commit. Linked-list
//! pointers are restored verbatim.

use apiflow_core::event::{EventBus, SyncTracker};
use apiflow_core::ordering::Links;
use apiflow_core::snapshot::{SnapshotError, filter_snapshot, owned_ids, remap_ids, validate_snapshot};
use apiflow_types::collection::{FieldKind, ItemRef};
use apiflow_types::error::RepositoryError;
use apiflow_types::event::{SyncEvent, SyncOp, SyncTopic};
use apiflow_types::id::WorkspaceId;
use apiflow_types::overlay::{AssertFields, KeyValueFields, OverlayKind};
use apiflow_types::snapshot::{
    ExportFilter, KeyValueDeltaRecord, KeyValueStateRecord, OverlayOrderRecord, WorkspaceSnapshot,
};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::collection::{SqliteCollectionRepository, row_to_folder, row_to_item};
use super::example::{SqliteExampleRepository, field_table};
use super::flow::SqliteFlowRepository;
use super::linked::set_links;
use super::overlay::OverlayQueries;
use super::pool::DatabasePool;
use super::util::{commit, opt_id, query_err, write_err};
use super::workspace::SqliteWorkspaceRepository;

/// Tables whose `id` column may collide with an imported identifier.
const ID_TABLES: &[&str] = &[
    "workspaces",
    "environments",
    "variables",
    "collections",
    "folders",
    "endpoints",
    "collection_items",
    "examples",
    "headers",
    "queries",
    "urlenc_fields",
    "form_fields",
    "asserts",
    "delta_header_delta",
    "delta_query_delta",
    "delta_urlenc_delta",
    "delta_assert_delta",
    "flows",
    "flow_variables",
    "flow_nodes",
    "flow_edges",
];

const KV_OVERLAYS: [OverlayKind; 3] = [OverlayKind::Header, OverlayKind::Query, OverlayKind::UrlEncoded];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Give every row a fresh id when the workspace already exists instead
    /// of failing.
    pub remap: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub workspace_id: WorkspaceId,
    pub remapped: bool,
    pub rows: usize,
}

pub struct SqliteSnapshotStore {
    pool: DatabasePool,
    sync: Option<EventBus<SyncEvent>>,
    workspaces: SqliteWorkspaceRepository,
    collections: SqliteCollectionRepository,
    examples: SqliteExampleRepository,
    flows: SqliteFlowRepository,
}

impl SqliteSnapshotStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            workspaces: SqliteWorkspaceRepository::new(pool.clone()),
            collections: SqliteCollectionRepository::new(pool.clone()),
            examples: SqliteExampleRepository::new(pool.clone()),
            flows: SqliteFlowRepository::new(pool.clone()),
            pool,
            sync: None,
        }
    }

    pub fn with_sync(mut self, bus: EventBus<SyncEvent>) -> Self {
        self.sync = Some(bus);
        self
    }

    /// Dump a workspace, optionally restricted to some flows and examples
    /// plus their dependencies.
    pub async fn export(
        &self,
        workspace_id: &WorkspaceId,
        filter: &ExportFilter,
    ) -> Result<WorkspaceSnapshot, SnapshotError> {
        let mut tx = self.pool.reader.begin().await.map_err(query_err)?;
        let snapshot = self.read_workspace(&mut tx, workspace_id).await?;
        tx.rollback().await.map_err(query_err)?;
        let snapshot = filter_snapshot(snapshot, filter);
        tracing::info!(
            workspace_id = %workspace_id,
            examples = snapshot.examples.len(),
            flows = snapshot.flows.len(),
            "workspace exported"
        );
        Ok(snapshot)
    }

    async fn read_workspace(
        &self,
        conn: &mut SqliteConnection,
        workspace_id: &WorkspaceId,
    ) -> Result<WorkspaceSnapshot, SnapshotError> {
        let workspace = self
            .workspaces
            .tx(conn)
            .get_workspace(workspace_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let mut s = WorkspaceSnapshot::empty(workspace);

        s.environments = self.workspaces.tx(conn).list_environments(workspace_id).await?;
        for env in &s.environments {
            let vars = self.workspaces.tx(conn).list_variables(&env.id).await?;
            s.variables.extend(vars);
        }

        s.collections = self.collections.tx(conn).list_collections(workspace_id).await?;
        for c in &s.collections {
            let folders = sqlx::query("SELECT * FROM folders WHERE collection_id = ? ORDER BY rowid")
                .bind(c.id.to_string())
                .fetch_all(&mut *conn)
                .await
                .map_err(query_err)?;
            for row in &folders {
                s.folders.push(row_to_folder(row)?);
            }
            let items = sqlx::query("SELECT * FROM collection_items WHERE collection_id = ? ORDER BY rowid")
                .bind(c.id.to_string())
                .fetch_all(&mut *conn)
                .await
                .map_err(query_err)?;
            for row in &items {
                s.collection_items.push(row_to_item(row)?);
            }
            let endpoints = self.collections.tx(conn).list_endpoints(&c.id).await?;
            s.endpoints.extend(endpoints);
        }

        for e in &s.endpoints {
            let examples = self.examples.tx(conn).list_examples(&e.id).await?;
            s.examples.extend(examples);
        }

        for ex in &s.examples {
            let mut q = self.examples.tx(conn);
            s.headers.extend(q.list_fields(FieldKind::Header, &ex.id).await?);
            s.queries.extend(q.list_fields(FieldKind::Query, &ex.id).await?);
            s.urlencoded.extend(q.list_fields(FieldKind::UrlEncoded, &ex.id).await?);
            s.form_fields.extend(q.list_fields(FieldKind::Form, &ex.id).await?);
            s.asserts.extend(q.list_asserts(&ex.id).await?);
            if let Some(body) = q.get_raw_body(&ex.id).await? {
                s.raw_bodies.push(body);
            }

            if ex.version_parent_id.is_none() {
                continue;
            }
            for kind in KV_OVERLAYS {
                let mut q = OverlayQueries::<KeyValueFields>::new(conn, kind);
                for row in q.order_rows(&ex.id).await? {
                    s.overlay.orders.push(OverlayOrderRecord { kind, row });
                }
                for row in q.delta_rows(&ex.id).await? {
                    s.overlay.kv_deltas.push(KeyValueDeltaRecord { kind, row });
                }
                for row in q.state_rows(&ex.id).await? {
                    s.overlay.kv_states.push(KeyValueStateRecord { kind, row });
                }
            }
            let mut q = OverlayQueries::<AssertFields>::new(conn, OverlayKind::Assert);
            for row in q.order_rows(&ex.id).await? {
                s.overlay.orders.push(OverlayOrderRecord {
                    kind: OverlayKind::Assert,
                    row,
                });
            }
            s.overlay.assert_deltas.extend(q.delta_rows(&ex.id).await?);
            s.overlay.assert_states.extend(q.state_rows(&ex.id).await?);
        }

        s.flows = self.flows.tx(conn).list_flows(workspace_id).await?;
        for f in &s.flows {
            let mut q = self.flows.tx(conn);
            s.flow_variables.extend(q.list_variables(&f.id).await?);
            s.nodes.extend(q.list_nodes(&f.id).await?);
            s.edges.extend(q.list_edges(&f.id).await?);
        }
        Ok(s)
    }

    /// Load a snapshot into the database.
    pub async fn import(
        &self,
        snapshot: WorkspaceSnapshot,
        options: ImportOptions,
    ) -> Result<ImportReport, SnapshotError> {
        validate_snapshot(&snapshot)?;

        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let exists = self
            .workspaces
            .tx(&mut tx)
            .workspace_exists(&snapshot.workspace.id)
            .await?;
        let (snapshot, remapped) = match (exists, options.remap) {
            (false, _) => (snapshot, false),
            (true, false) => return Err(SnapshotError::WorkspaceExists(snapshot.workspace.id)),
            (true, true) => (remap_ids(snapshot).0, true),
        };

        let ids = owned_ids(&snapshot);
        if let Some(id) = existing_id(&mut tx, &ids).await? {
            return Err(SnapshotError::IdExists(id));
        }

        sqlx::query("PRAGMA defer_foreign_keys = ON")
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        self.write_rows(&mut tx, &snapshot).await?;

        let workspace_id = snapshot.workspace.id;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Workspace, SyncOp::Insert, workspace_id);
        commit(tx, tracker, self.sync.as_ref()).await?;

        tracing::info!(workspace_id = %workspace_id, rows = ids.len(), remapped, "workspace imported");
        Ok(ImportReport {
            workspace_id,
            remapped,
            rows: ids.len(),
        })
    }

    async fn write_rows(&self, conn: &mut SqliteConnection, s: &WorkspaceSnapshot) -> Result<(), SnapshotError> {
        let mut ws = self.workspaces.tx(conn);
        ws.insert_workspace(&s.workspace).await?;
        for env in &s.environments {
            ws.insert_environment(env).await?;
        }
        for var in &s.variables {
            ws.insert_variable(var).await?;
        }

        let mut cq = self.collections.tx(conn);
        for c in &s.collections {
            cq.insert_collection(c).await?;
        }
        for f in &s.folders {
            cq.insert_folder(f).await?;
        }
        for e in &s.endpoints {
            cq.insert_endpoint(e).await?;
        }
        for item in &s.collection_items {
            let (item_type, folder_id, endpoint_id) = match item.item {
                ItemRef::Folder(f) => ("folder", Some(f.to_string()), None),
                ItemRef::Endpoint(e) => ("endpoint", None, Some(e.to_string())),
            };
            sqlx::query(
                "INSERT INTO collection_items
                   (id, collection_id, parent_folder_id, item_type, folder_id, endpoint_id, prev_id, next_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(item.id.to_string())
            .bind(item.collection_id.to_string())
            .bind(opt_id(item.parent_folder_id))
            .bind(item_type)
            .bind(folder_id)
            .bind(endpoint_id)
            .bind(opt_id(item.prev))
            .bind(opt_id(item.next))
            .execute(&mut *conn)
            .await
            .map_err(|e| write_err(e, "collection item"))?;
        }

        for ex in &s.examples {
            self.examples.tx(conn).insert_example(ex).await?;
            let links = Links {
                id: ex.id.0,
                prev: ex.prev.map(|p| p.0),
                next: ex.next.map(|n| n.0),
            };
            set_links(conn, "examples", &links).await?;
        }
        let families = [
            (FieldKind::Header, &s.headers),
            (FieldKind::Query, &s.queries),
            (FieldKind::UrlEncoded, &s.urlencoded),
            (FieldKind::Form, &s.form_fields),
        ];
        for (kind, rows) in families {
            for f in rows {
                self.examples.tx(conn).insert_field(kind, f).await?;
                let links = Links {
                    id: f.id.0,
                    prev: f.prev.map(|p| p.0),
                    next: f.next.map(|n| n.0),
                };
                set_links(conn, field_table(kind), &links).await?;
            }
        }
        for a in &s.asserts {
            self.examples.tx(conn).insert_assert(a).await?;
            let links = Links {
                id: a.id.0,
                prev: a.prev.map(|p| p.0),
                next: a.next.map(|n| n.0),
            };
            set_links(conn, "asserts", &links).await?;
        }
        for body in &s.raw_bodies {
            self.examples.tx(conn).upsert_raw_body(body).await?;
        }

        for record in &s.overlay.orders {
            if record.kind == OverlayKind::Assert {
                OverlayQueries::<AssertFields>::new(conn, record.kind).insert_order(&record.row).await?;
            } else {
                OverlayQueries::<KeyValueFields>::new(conn, record.kind).insert_order(&record.row).await?;
            }
        }
        for record in &s.overlay.kv_deltas {
            OverlayQueries::<KeyValueFields>::new(conn, record.kind).insert_delta(&record.row).await?;
        }
        for record in &s.overlay.kv_states {
            OverlayQueries::<KeyValueFields>::new(conn, record.kind).upsert_state(&record.row).await?;
        }
        let mut aq = OverlayQueries::<AssertFields>::new(conn, OverlayKind::Assert);
        for row in &s.overlay.assert_deltas {
            aq.insert_delta(row).await?;
        }
        for row in &s.overlay.assert_states {
            aq.upsert_state(row).await?;
        }

        let mut fq = self.flows.tx(conn);
        for f in &s.flows {
            fq.insert_flow(f).await?;
        }
        for v in &s.flow_variables {
            fq.insert_variable(v).await?;
        }
        for n in &s.nodes {
            fq.insert_node(n).await?;
        }
        for e in &s.edges {
            fq.insert_edge(e).await?;
        }
        Ok(())
    }
}

/// First of `ids` already present in any id-carrying table.
async fn existing_id(conn: &mut SqliteConnection, ids: &[Uuid]) -> Result<Option<Uuid>, RepositoryError> {
    let wanted = serde_json::to_string(&ids.iter().map(|id| id.to_string()).collect::<Vec<_>>())
        .map_err(|e| RepositoryError::Invalid(format!("serialize: {e}")))?;
    for table in ID_TABLES {
        let sql = format!("SELECT id FROM {table} WHERE id IN (SELECT value FROM json_each(?)) LIMIT 1");
        let row: Option<(String,)> = sqlx::query_as(&sql)
            .bind(&wanted)
            .fetch_optional(&mut *conn)
            .await
            .map_err(query_err)?;
        if let Some((id,)) = row {
            return Ok(Some(super::util::parse_id(&id)?));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteKeyValueOverlay;
    use crate::sqlite::example::testing::{endpoint, example};
    use crate::sqlite::pool::testing::test_pool;
    use apiflow_core::repository::{DeltaOverlay, ExampleRepository, FlowRepository};
    use apiflow_types::collection::{Example, KeyValue};
    use apiflow_types::flow::{EdgeHandle, Flow, FlowEdge, FlowNode, NodeConfig, NoopKind};
    use apiflow_types::id::FlowId;
    use apiflow_types::overlay::KeyValuePatch;
    use chrono::Utc;

    struct Seeded {
        pool: DatabasePool,
        workspace_id: WorkspaceId,
        parent: Example,
        delta: Example,
        flow_id: FlowId,
    }

    async fn seeded() -> Seeded {
        let pool = test_pool().await;
        let ep = endpoint(&pool).await;
        let examples = SqliteExampleRepository::new(pool.clone());
        let parent = examples.create_example(&example(ep.id, "base")).await.unwrap();
        for (k, v) in [("Accept", "json"), ("X-Trace", "1")] {
            examples
                .append_field(FieldKind::Header, &KeyValue::new(parent.id, k, v))
                .await
                .unwrap();
        }
        let mut delta = example(ep.id, "delta");
        delta.version_parent_id = Some(parent.id);
        let delta = examples.create_example(&delta).await.unwrap();

        let overlay = SqliteKeyValueOverlay::headers(pool.clone());
        let items = overlay.list(&delta.id, &parent.id).await.unwrap();
        overlay
            .update(
                &delta.id,
                &parent.id,
                items[0].item_id,
                KeyValuePatch {
                    value: Some("xml".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let workspace_id: (String,) = sqlx::query_as(
            "SELECT c.workspace_id FROM endpoints e JOIN collections c ON c.id = e.collection_id WHERE e.id = ?",
        )
        .bind(ep.id.to_string())
        .fetch_one(&pool.reader)
        .await
        .unwrap();
        let workspace_id: WorkspaceId = workspace_id.0.parse().unwrap();

        let flows = SqliteFlowRepository::new(pool.clone());
        let flow = flows
            .create_flow(&Flow {
                id: FlowId::new(),
                workspace_id,
                name: "f".into(),
                timeout_ms: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let start = flows
            .create_node(&FlowNode::new(flow.id, "start", NodeConfig::NoOp { noop_kind: NoopKind::Start }))
            .await
            .unwrap();
        let call = flows
            .create_node(&FlowNode::new(
                flow.id,
                "call",
                NodeConfig::Request {
                    endpoint_id: Some(ep.id),
                    example_id: Some(parent.id),
                    delta_endpoint_id: None,
                    delta_example_id: Some(delta.id),
                },
            ))
            .await
            .unwrap();
        flows
            .create_edge(&FlowEdge::new(flow.id, start.id, call.id, EdgeHandle::Unspecified))
            .await
            .unwrap();

        Seeded {
            pool,
            workspace_id,
            parent,
            delta,
            flow_id: flow.id,
        }
    }

    #[tokio::test]
    async fn export_then_import_into_a_fresh_database() {
        let s = seeded().await;
        let store = SqliteSnapshotStore::new(s.pool.clone());
        let exported = store.export(&s.workspace_id, &ExportFilter::default()).await.unwrap();
        assert_eq!(exported.headers.len(), 2);
        assert_eq!(exported.overlay.orders.len(), 2);
        assert_eq!(exported.overlay.kv_states.len(), 1);
        assert_eq!(exported.nodes.len(), 2);

        let target = SqliteSnapshotStore::new(test_pool().await);
        let report = target.import(exported.clone(), ImportOptions::default()).await.unwrap();
        assert!(!report.remapped);
        let again = target.export(&s.workspace_id, &ExportFilter::default()).await.unwrap();
        assert_eq!(again, exported);
    }

    #[tokio::test]
    async fn importing_an_existing_workspace_fails_without_remap() {
        let s = seeded().await;
        let store = SqliteSnapshotStore::new(s.pool.clone());
        let exported = store.export(&s.workspace_id, &ExportFilter::default()).await.unwrap();
        let err = store.import(exported, ImportOptions::default()).await.unwrap_err();
        assert!(matches!(err, SnapshotError::WorkspaceExists(id) if id == s.workspace_id));
    }

    #[tokio::test]
    async fn colliding_ids_are_rejected() {
        let s = seeded().await;
        let store = SqliteSnapshotStore::new(s.pool.clone());
        let mut exported = store.export(&s.workspace_id, &ExportFilter::default()).await.unwrap();
        exported.workspace.id = WorkspaceId::new();
        for c in &mut exported.collections {
            c.workspace_id = exported.workspace.id;
        }
        for f in &mut exported.flows {
            f.workspace_id = exported.workspace.id;
        }
        for e in &mut exported.environments {
            e.workspace_id = exported.workspace.id;
        }
        let err = store.import(exported, ImportOptions::default()).await.unwrap_err();
        assert!(matches!(err, SnapshotError::IdExists(_)));
    }

    #[tokio::test]
    async fn remapped_import_keeps_the_overlay_working() {
        let s = seeded().await;
        let store = SqliteSnapshotStore::new(s.pool.clone());
        let exported = store.export(&s.workspace_id, &ExportFilter::default()).await.unwrap();
        let report = store.import(exported, ImportOptions { remap: true }).await.unwrap();
        assert!(report.remapped);
        assert_ne!(report.workspace_id, s.workspace_id);

        let copy = store.export(&report.workspace_id, &ExportFilter::default()).await.unwrap();
        let delta = copy.examples.iter().find(|e| e.version_parent_id.is_some()).unwrap();
        let parent = delta.version_parent_id.unwrap();
        assert_ne!(delta.id, s.delta.id);
        assert_ne!(parent, s.parent.id);

        let overlay = SqliteKeyValueOverlay::headers(s.pool.clone());
        let items = overlay.list(&delta.id, &parent).await.unwrap();
        let values: Vec<&str> = items.iter().map(|i| i.fields.value.as_str()).collect();
        assert_eq!(values, ["xml", "1"]);
    }

    #[tokio::test]
    async fn flow_filter_keeps_referenced_examples() {
        let s = seeded().await;
        let examples = SqliteExampleRepository::new(s.pool.clone());
        let other = examples
            .create_example(&example(s.parent.endpoint_id, "unused"))
            .await
            .unwrap();
        let store = SqliteSnapshotStore::new(s.pool.clone());
        let filter = ExportFilter {
            flow_ids: vec![s.flow_id],
            example_ids: Vec::new(),
        };
        let exported = store.export(&s.workspace_id, &filter).await.unwrap();
        assert!(exported.examples.iter().any(|e| e.id == s.delta.id));
        assert!(exported.examples.iter().any(|e| e.id == s.parent.id));
        assert!(exported.examples.iter().all(|e| e.id != other.id));
    }
}
