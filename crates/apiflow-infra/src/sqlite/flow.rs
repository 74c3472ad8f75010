//! SQLite flow repository: flows, flow variables, nodes (aggregate row plus
//! one attribute row per kind), edges and node execution records.

use apiflow_core::event::{EventBus, SyncTracker};
use apiflow_core::repository::FlowRepository;
use apiflow_types::assertion::AssertCondition;
use apiflow_types::error::RepositoryError;
use apiflow_types::event::{SyncEvent, SyncOp, SyncTopic};
use apiflow_types::flow::{
    Flow, FlowEdge, FlowNode, FlowVariable, NodeConfig, NodeExecution, NodeKind, NoopKind,
};
use apiflow_types::id::{EdgeId, FlowId, FlowVariableId, NodeId, RunId, WorkspaceId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::pool::DatabasePool;
use super::util::{
    commit, format_datetime, from_json, opt_id, parse_datetime, parse_enum, parse_id,
    parse_opt_id, query_err, to_json, workspace_of_flow, write_err,
};

/// SQLite-backed implementation of `FlowRepository`.
pub struct SqliteFlowRepository {
    pool: DatabasePool,
    sync: Option<EventBus<SyncEvent>>,
}

impl SqliteFlowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool, sync: None }
    }

    pub fn with_sync(mut self, bus: EventBus<SyncEvent>) -> Self {
        self.sync = Some(bus);
        self
    }

    pub fn tx<'c>(&self, conn: &'c mut SqliteConnection) -> FlowQueries<'c> {
        FlowQueries { conn }
    }

    async fn reader(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>, RepositoryError> {
        self.pool.reader.acquire().await.map_err(query_err)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

pub(crate) fn row_to_flow(row: &SqliteRow) -> Result<Flow, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let workspace_id: String = row.try_get("workspace_id").map_err(query_err)?;
    let timeout_ms: Option<i64> = row.try_get("timeout_ms").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    Ok(Flow {
        id: parse_id(&id)?,
        workspace_id: parse_id(&workspace_id)?,
        name: row.try_get("name").map_err(query_err)?,
        timeout_ms: timeout_ms.map(|t| t.max(0) as u64),
        created_at: parse_datetime(&created_at)?,
    })
}

pub(crate) fn row_to_variable(row: &SqliteRow) -> Result<FlowVariable, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let flow_id: String = row.try_get("flow_id").map_err(query_err)?;
    Ok(FlowVariable {
        id: parse_id(&id)?,
        flow_id: parse_id(&flow_id)?,
        key: row.try_get("var_key").map_err(query_err)?,
        value: row.try_get("value").map_err(query_err)?,
        description: row.try_get("description").map_err(query_err)?,
        enabled: row.try_get("enabled").map_err(query_err)?,
    })
}

pub(crate) fn row_to_edge(row: &SqliteRow) -> Result<FlowEdge, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let flow_id: String = row.try_get("flow_id").map_err(query_err)?;
    let source_id: String = row.try_get("source_id").map_err(query_err)?;
    let target_id: String = row.try_get("target_id").map_err(query_err)?;
    let handle: String = row.try_get("source_handle").map_err(query_err)?;
    Ok(FlowEdge {
        id: parse_id(&id)?,
        flow_id: parse_id(&flow_id)?,
        source_id: parse_id(&source_id)?,
        target_id: parse_id(&target_id)?,
        source_handle: parse_enum(&handle)?,
        kind: row.try_get("kind").map_err(query_err)?,
    })
}

fn row_to_execution(row: &SqliteRow) -> Result<NodeExecution, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let flow_id: String = row.try_get("flow_id").map_err(query_err)?;
    let node_id: String = row.try_get("node_id").map_err(query_err)?;
    let run_id: String = row.try_get("run_id").map_err(query_err)?;
    let state: String = row.try_get("state").map_err(query_err)?;
    let input: Option<String> = row.try_get("input_data").map_err(query_err)?;
    let output: Option<String> = row.try_get("output_data").map_err(query_err)?;
    let response_id: Option<String> = row.try_get("response_id").map_err(query_err)?;
    let completed_at: String = row.try_get("completed_at").map_err(query_err)?;
    Ok(NodeExecution {
        id: parse_id(&id)?,
        flow_id: parse_id(&flow_id)?,
        node_id: parse_id(&node_id)?,
        run_id: parse_id(&run_id)?,
        name: row.try_get("name").map_err(query_err)?,
        state: parse_enum(&state)?,
        error: row.try_get("error").map_err(query_err)?,
        input_data: input.as_deref().map(from_json).transpose()?,
        output_data: output.as_deref().map(from_json).transpose()?,
        response_id: parse_opt_id(response_id)?,
        completed_at: parse_datetime(&completed_at)?,
    })
}

fn opt_condition(raw: Option<String>) -> Result<Option<AssertCondition>, RepositoryError> {
    raw.as_deref().map(from_json).transpose()
}

// ---------------------------------------------------------------------------
// Connection-bound queries
// ---------------------------------------------------------------------------

/// Flow queries bound to one connection.
pub struct FlowQueries<'c> {
    conn: &'c mut SqliteConnection,
}

impl FlowQueries<'_> {
    pub async fn workspace(&mut self, flow_id: &FlowId) -> Result<WorkspaceId, RepositoryError> {
        workspace_of_flow(&mut *self.conn, flow_id).await
    }

    pub async fn insert_flow(&mut self, flow: &Flow) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO flows (id, workspace_id, name, timeout_ms, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(flow.id.to_string())
            .bind(flow.workspace_id.to_string())
            .bind(&flow.name)
            .bind(flow.timeout_ms.map(|t| t as i64))
            .bind(format_datetime(&flow.created_at))
            .execute(&mut *self.conn)
            .await
            .map_err(|e| write_err(e, "flow"))?;
        Ok(())
    }

    pub async fn get_flow(&mut self, id: &FlowId) -> Result<Option<Flow>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM flows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_flow).transpose()
    }

    pub async fn list_flows(&mut self, workspace_id: &WorkspaceId) -> Result<Vec<Flow>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM flows WHERE workspace_id = ? ORDER BY created_at, rowid")
            .bind(workspace_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        rows.iter().map(row_to_flow).collect()
    }

    pub async fn update_flow(&mut self, flow: &Flow) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE flows SET name = ?, timeout_ms = ? WHERE id = ?")
            .bind(&flow.name)
            .bind(flow.timeout_ms.map(|t| t as i64))
            .bind(flow.id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_flow(&mut self, id: &FlowId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM flows WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn insert_variable(&mut self, v: &FlowVariable) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO flow_variables (id, flow_id, var_key, value, description, enabled)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(v.id.to_string())
        .bind(v.flow_id.to_string())
        .bind(&v.key)
        .bind(&v.value)
        .bind(&v.description)
        .bind(v.enabled)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| write_err(e, "flow variable"))?;
        Ok(())
    }

    pub async fn get_variable(&mut self, id: &FlowVariableId) -> Result<Option<FlowVariable>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM flow_variables WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_variable).transpose()
    }

    pub async fn list_variables(&mut self, flow_id: &FlowId) -> Result<Vec<FlowVariable>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM flow_variables WHERE flow_id = ? ORDER BY rowid")
            .bind(flow_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        rows.iter().map(row_to_variable).collect()
    }

    pub async fn update_variable(&mut self, v: &FlowVariable) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE flow_variables SET var_key = ?, value = ?, description = ?, enabled = ? WHERE id = ?",
        )
        .bind(&v.key)
        .bind(&v.value)
        .bind(&v.description)
        .bind(v.enabled)
        .bind(v.id.to_string())
        .execute(&mut *self.conn)
        .await
        .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_variable(&mut self, id: &FlowVariableId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM flow_variables WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn insert_node(&mut self, node: &FlowNode) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO flow_nodes (id, flow_id, name, kind, error_handling, position_x, position_y)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(node.id.to_string())
        .bind(node.flow_id.to_string())
        .bind(&node.name)
        .bind(node.config.kind().as_str())
        .bind(node.error_handling.as_str())
        .bind(node.position_x)
        .bind(node.position_y)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| write_err(e, "node"))?;
        self.put_config(&node.id, &node.config).await
    }

    /// Write the node's per-kind attribute row, replacing any previous one.
    async fn put_config(&mut self, id: &NodeId, config: &NodeConfig) -> Result<(), RepositoryError> {
        let node_id = id.to_string();
        let query = match config {
            NodeConfig::NoOp { noop_kind } => {
                let kind = match noop_kind {
                    NoopKind::Start => "start",
                    NoopKind::Plain => "plain",
                };
                sqlx::query("INSERT OR REPLACE INTO node_noop (node_id, noop_kind) VALUES (?, ?)")
                    .bind(node_id)
                    .bind(kind)
            }
            NodeConfig::Request {
                endpoint_id,
                example_id,
                delta_endpoint_id,
                delta_example_id,
            } => sqlx::query(
                "INSERT OR REPLACE INTO node_request
                   (node_id, endpoint_id, example_id, delta_endpoint_id, delta_example_id)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(node_id)
            .bind(opt_id(*endpoint_id))
            .bind(opt_id(*example_id))
            .bind(opt_id(*delta_endpoint_id))
            .bind(opt_id(*delta_example_id)),
            NodeConfig::Condition { condition } => {
                sqlx::query("INSERT OR REPLACE INTO node_if (node_id, condition) VALUES (?, ?)")
                    .bind(node_id)
                    .bind(to_json(condition)?)
            }
            NodeConfig::For {
                iter_count,
                break_condition,
            } => sqlx::query("INSERT OR REPLACE INTO node_for (node_id, iter_count, break_condition) VALUES (?, ?, ?)")
                .bind(node_id)
                .bind(*iter_count as i64)
                .bind(break_condition.as_ref().map(to_json).transpose()?),
            NodeConfig::ForEach {
                iter_path,
                break_condition,
            } => sqlx::query(
                "INSERT OR REPLACE INTO node_for_each (node_id, iter_path, break_condition) VALUES (?, ?, ?)",
            )
            .bind(node_id)
            .bind(iter_path.clone())
            .bind(break_condition.as_ref().map(to_json).transpose()?),
            NodeConfig::Js { code } => sqlx::query("INSERT OR REPLACE INTO node_js (node_id, code) VALUES (?, ?)")
                .bind(node_id)
                .bind(code.clone()),
        };
        query
            .execute(&mut *self.conn)
            .await
            .map_err(|e| write_err(e, "node attributes"))?;
        Ok(())
    }

    async fn load_config(&mut self, id: &NodeId, kind: NodeKind) -> Result<NodeConfig, RepositoryError> {
        let (sql, missing) = match kind {
            NodeKind::NoOp => ("SELECT * FROM node_noop WHERE node_id = ?", "noop"),
            NodeKind::Request => ("SELECT * FROM node_request WHERE node_id = ?", "request"),
            NodeKind::Condition => ("SELECT * FROM node_if WHERE node_id = ?", "condition"),
            NodeKind::For => ("SELECT * FROM node_for WHERE node_id = ?", "for"),
            NodeKind::ForEach => ("SELECT * FROM node_for_each WHERE node_id = ?", "for_each"),
            NodeKind::Js => ("SELECT * FROM node_js WHERE node_id = ?", "js"),
        };
        let row = sqlx::query(sql)
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?
            .ok_or_else(|| RepositoryError::Query(format!("node {id} has no {missing} attributes")))?;

        Ok(match kind {
            NodeKind::NoOp => {
                let noop: String = row.try_get("noop_kind").map_err(query_err)?;
                NodeConfig::NoOp {
                    noop_kind: if noop == "start" { NoopKind::Start } else { NoopKind::Plain },
                }
            }
            NodeKind::Request => NodeConfig::Request {
                endpoint_id: parse_opt_id(row.try_get("endpoint_id").map_err(query_err)?)?,
                example_id: parse_opt_id(row.try_get("example_id").map_err(query_err)?)?,
                delta_endpoint_id: parse_opt_id(row.try_get("delta_endpoint_id").map_err(query_err)?)?,
                delta_example_id: parse_opt_id(row.try_get("delta_example_id").map_err(query_err)?)?,
            },
            NodeKind::Condition => {
                let condition: String = row.try_get("condition").map_err(query_err)?;
                NodeConfig::Condition {
                    condition: from_json(&condition)?,
                }
            }
            NodeKind::For => {
                let iter_count: i64 = row.try_get("iter_count").map_err(query_err)?;
                NodeConfig::For {
                    iter_count: iter_count.max(0) as u64,
                    break_condition: opt_condition(row.try_get("break_condition").map_err(query_err)?)?,
                }
            }
            NodeKind::ForEach => NodeConfig::ForEach {
                iter_path: row.try_get("iter_path").map_err(query_err)?,
                break_condition: opt_condition(row.try_get("break_condition").map_err(query_err)?)?,
            },
            NodeKind::Js => NodeConfig::Js {
                code: row.try_get("code").map_err(query_err)?,
            },
        })
    }

    async fn node_from_row(&mut self, row: &SqliteRow) -> Result<FlowNode, RepositoryError> {
        let id: String = row.try_get("id").map_err(query_err)?;
        let flow_id: String = row.try_get("flow_id").map_err(query_err)?;
        let kind: String = row.try_get("kind").map_err(query_err)?;
        let error_handling: String = row.try_get("error_handling").map_err(query_err)?;
        let id: NodeId = parse_id(&id)?;
        let config = self.load_config(&id, parse_enum(&kind)?).await?;
        Ok(FlowNode {
            id,
            flow_id: parse_id(&flow_id)?,
            name: row.try_get("name").map_err(query_err)?,
            error_handling: parse_enum(&error_handling)?,
            position_x: row.try_get("position_x").map_err(query_err)?,
            position_y: row.try_get("position_y").map_err(query_err)?,
            config,
        })
    }

    pub async fn get_node(&mut self, id: &NodeId) -> Result<Option<FlowNode>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM flow_nodes WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        match row {
            Some(row) => Ok(Some(self.node_from_row(&row).await?)),
            None => Ok(None),
        }
    }

    pub async fn list_nodes(&mut self, flow_id: &FlowId) -> Result<Vec<FlowNode>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM flow_nodes WHERE flow_id = ? ORDER BY rowid")
            .bind(flow_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            nodes.push(self.node_from_row(row).await?);
        }
        Ok(nodes)
    }

    pub async fn update_node(&mut self, node: &FlowNode) -> Result<(), RepositoryError> {
        let current: Option<(String,)> = sqlx::query_as("SELECT kind FROM flow_nodes WHERE id = ?")
            .bind(node.id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        let Some((kind,)) = current else {
            return Err(RepositoryError::NotFound);
        };
        let kind: NodeKind = parse_enum(&kind)?;
        if kind != node.config.kind() {
            return Err(RepositoryError::Invalid(format!(
                "node kind cannot change from {} to {}",
                kind.as_str(),
                node.config.kind().as_str()
            )));
        }
        sqlx::query("UPDATE flow_nodes SET name = ?, error_handling = ?, position_x = ?, position_y = ? WHERE id = ?")
            .bind(&node.name)
            .bind(node.error_handling.as_str())
            .bind(node.position_x)
            .bind(node.position_y)
            .bind(node.id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        self.put_config(&node.id, &node.config).await
    }

    pub async fn delete_node(&mut self, id: &NodeId) -> Result<Option<FlowId>, RepositoryError> {
        let flow: Option<(String,)> = sqlx::query_as("SELECT flow_id FROM flow_nodes WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        sqlx::query("DELETE FROM flow_nodes WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        flow.map(|(f,)| parse_id(&f)).transpose()
    }

    pub async fn insert_edge(&mut self, edge: &FlowEdge) -> Result<(), RepositoryError> {
        let endpoints: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM flow_nodes WHERE flow_id = ? AND id IN (?, ?)")
            .bind(edge.flow_id.to_string())
            .bind(edge.source_id.to_string())
            .bind(edge.target_id.to_string())
            .fetch_one(&mut *self.conn)
            .await
            .map_err(query_err)?;
        let expected = if edge.source_id == edge.target_id { 1 } else { 2 };
        if endpoints.0 != expected {
            return Err(RepositoryError::Invalid("edge endpoints must be nodes of the same flow".into()));
        }
        sqlx::query(
            "INSERT INTO flow_edges (id, flow_id, source_id, target_id, source_handle, kind)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(edge.id.to_string())
        .bind(edge.flow_id.to_string())
        .bind(edge.source_id.to_string())
        .bind(edge.target_id.to_string())
        .bind(edge.source_handle.as_str())
        .bind(&edge.kind)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| write_err(e, "edge"))?;
        Ok(())
    }

    pub async fn list_edges(&mut self, flow_id: &FlowId) -> Result<Vec<FlowEdge>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM flow_edges WHERE flow_id = ? ORDER BY rowid")
            .bind(flow_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        rows.iter().map(row_to_edge).collect()
    }

    pub async fn delete_edge(&mut self, id: &EdgeId) -> Result<Option<FlowId>, RepositoryError> {
        let flow: Option<(String,)> = sqlx::query_as("SELECT flow_id FROM flow_edges WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        sqlx::query("DELETE FROM flow_edges WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        flow.map(|(f,)| parse_id(&f)).transpose()
    }

    pub async fn insert_execution(&mut self, e: &NodeExecution) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO node_executions
               (id, flow_id, node_id, run_id, name, state, error, input_data, output_data, response_id, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(e.id.to_string())
        .bind(e.flow_id.to_string())
        .bind(e.node_id.to_string())
        .bind(e.run_id.to_string())
        .bind(&e.name)
        .bind(e.state.as_str())
        .bind(&e.error)
        .bind(e.input_data.as_ref().map(to_json).transpose()?)
        .bind(e.output_data.as_ref().map(to_json).transpose()?)
        .bind(opt_id(e.response_id))
        .bind(format_datetime(&e.completed_at))
        .execute(&mut *self.conn)
        .await
        .map_err(|err| write_err(err, "node execution"))?;
        Ok(())
    }

    pub async fn list_executions(
        &mut self,
        flow_id: &FlowId,
        run_id: Option<RunId>,
    ) -> Result<Vec<NodeExecution>, RepositoryError> {
        let rows = match run_id {
            Some(run) => {
                sqlx::query(
                    "SELECT * FROM node_executions WHERE flow_id = ? AND run_id = ?
                     ORDER BY completed_at DESC, rowid DESC",
                )
                .bind(flow_id.to_string())
                .bind(run.to_string())
                .fetch_all(&mut *self.conn)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM node_executions WHERE flow_id = ? ORDER BY completed_at DESC, rowid DESC")
                    .bind(flow_id.to_string())
                    .fetch_all(&mut *self.conn)
                    .await
            }
        }
        .map_err(query_err)?;
        rows.iter().map(row_to_execution).collect()
    }

    pub async fn list_node_executions(&mut self, node_id: &NodeId) -> Result<Vec<NodeExecution>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM node_executions WHERE node_id = ? ORDER BY completed_at DESC, rowid DESC")
            .bind(node_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        rows.iter().map(row_to_execution).collect()
    }
}

impl FlowRepository for SqliteFlowRepository {
    async fn create_flow(&self, flow: &Flow) -> Result<Flow, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        self.tx(&mut tx).insert_flow(flow).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(flow.workspace_id, SyncTopic::Flow, SyncOp::Insert, flow.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(flow.clone())
    }

    async fn get_flow(&self, id: &FlowId) -> Result<Option<Flow>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).get_flow(id).await
    }

    async fn list_flows(&self, workspace_id: &WorkspaceId) -> Result<Vec<Flow>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_flows(workspace_id).await
    }

    async fn update_flow(&self, flow: &Flow) -> Result<Flow, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        queries.update_flow(flow).await?;
        let updated = queries.get_flow(&flow.id).await?.ok_or(RepositoryError::NotFound)?;
        let mut tracker = SyncTracker::new();
        tracker.track(updated.workspace_id, SyncTopic::Flow, SyncOp::Update, flow.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(updated)
    }

    async fn delete_flow(&self, id: &FlowId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let workspace_id = queries.workspace(id).await?;
        queries.delete_flow(id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Flow, SyncOp::Delete, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn create_node(&self, node: &FlowNode) -> Result<FlowNode, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        queries.insert_node(node).await?;
        let workspace_id = queries.workspace(&node.flow_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Node, SyncOp::Insert, node.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(node.clone())
    }

    async fn get_node(&self, id: &NodeId) -> Result<Option<FlowNode>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).get_node(id).await
    }

    async fn list_nodes(&self, flow_id: &FlowId) -> Result<Vec<FlowNode>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_nodes(flow_id).await
    }

    async fn update_node(&self, node: &FlowNode) -> Result<FlowNode, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        queries.update_node(node).await?;
        let workspace_id = queries.workspace(&node.flow_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Node, SyncOp::Update, node.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(node.clone())
    }

    async fn delete_node(&self, id: &NodeId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let Some(flow_id) = queries.delete_node(id).await? else {
            return Ok(());
        };
        let workspace_id = queries.workspace(&flow_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Node, SyncOp::Delete, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn create_edge(&self, edge: &FlowEdge) -> Result<FlowEdge, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        queries.insert_edge(edge).await?;
        let workspace_id = queries.workspace(&edge.flow_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Edge, SyncOp::Insert, edge.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(edge.clone())
    }

    async fn list_edges(&self, flow_id: &FlowId) -> Result<Vec<FlowEdge>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_edges(flow_id).await
    }

    async fn delete_edge(&self, id: &EdgeId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let Some(flow_id) = queries.delete_edge(id).await? else {
            return Ok(());
        };
        let workspace_id = queries.workspace(&flow_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Edge, SyncOp::Delete, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn create_flow_variable(&self, variable: &FlowVariable) -> Result<FlowVariable, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        queries.insert_variable(variable).await?;
        let workspace_id = queries.workspace(&variable.flow_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::FlowVariable, SyncOp::Insert, variable.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(variable.clone())
    }

    async fn list_flow_variables(&self, flow_id: &FlowId) -> Result<Vec<FlowVariable>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_variables(flow_id).await
    }

    async fn update_flow_variable(&self, variable: &FlowVariable) -> Result<FlowVariable, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        queries.update_variable(variable).await?;
        let stored = queries.get_variable(&variable.id).await?.ok_or(RepositoryError::NotFound)?;
        let workspace_id = queries.workspace(&stored.flow_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::FlowVariable, SyncOp::Update, variable.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(stored)
    }

    async fn delete_flow_variable(&self, id: &FlowVariableId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let Some(variable) = queries.get_variable(id).await? else {
            return Ok(());
        };
        queries.delete_variable(id).await?;
        let workspace_id = queries.workspace(&variable.flow_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::FlowVariable, SyncOp::Delete, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn record_execution(&self, execution: &NodeExecution) -> Result<(), RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_err)?;
        self.tx(&mut conn).insert_execution(execution).await
    }

    async fn list_executions(
        &self,
        flow_id: &FlowId,
        run_id: Option<RunId>,
    ) -> Result<Vec<NodeExecution>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_executions(flow_id, run_id).await
    }

    async fn list_node_executions(&self, node_id: &NodeId) -> Result<Vec<NodeExecution>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_node_executions(node_id).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::flow;
    use super::*;
    use crate::sqlite::pool::testing::test_pool;
    use apiflow_types::assertion::AssertKind;
    use apiflow_types::flow::{EdgeHandle, ErrorHandling, NodeState};
    use apiflow_types::id::NodeExecutionId;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn all_kinds(flow_id: FlowId) -> Vec<FlowNode> {
        let stop = AssertCondition::expression("var.count > 3");
        vec![
            FlowNode::new(flow_id, "start", NodeConfig::NoOp { noop_kind: NoopKind::Start }),
            FlowNode::new(
                flow_id,
                "call",
                NodeConfig::Request {
                    endpoint_id: None,
                    example_id: None,
                    delta_endpoint_id: None,
                    delta_example_id: None,
                },
            ),
            FlowNode::new(
                flow_id,
                "check",
                NodeConfig::Condition {
                    condition: AssertCondition::predicate(AssertKind::Equal, "call.response.status", "200"),
                },
            ),
            FlowNode::new(
                flow_id,
                "repeat",
                NodeConfig::For {
                    iter_count: 3,
                    break_condition: Some(stop.clone()),
                },
            ),
            FlowNode::new(
                flow_id,
                "each",
                NodeConfig::ForEach {
                    iter_path: "call.response.body.items".into(),
                    break_condition: None,
                },
            ),
            FlowNode::new(flow_id, "script", NodeConfig::Js { code: "setVal('x', 1)".into() }),
        ]
    }

    #[tokio::test]
    async fn every_node_kind_round_trips() {
        let pool = test_pool().await;
        let f = flow(&pool).await;
        let repo = SqliteFlowRepository::new(pool);
        let nodes = all_kinds(f.id);
        for node in &nodes {
            repo.create_node(node).await.unwrap();
        }
        assert_eq!(repo.list_nodes(&f.id).await.unwrap(), nodes);
    }

    #[tokio::test]
    async fn update_node_keeps_kind() {
        let pool = test_pool().await;
        let f = flow(&pool).await;
        let repo = SqliteFlowRepository::new(pool);
        let mut node = repo
            .create_node(&FlowNode::new(f.id, "loop", NodeConfig::For { iter_count: 2, break_condition: None }))
            .await
            .unwrap();

        node.config = NodeConfig::For {
            iter_count: 5,
            break_condition: None,
        };
        node.error_handling = ErrorHandling::Break;
        repo.update_node(&node).await.unwrap();
        assert_eq!(repo.get_node(&node.id).await.unwrap().unwrap(), node);

        node.config = NodeConfig::Js { code: String::new() };
        let err = repo.update_node(&node).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Invalid(_)));
    }

    #[tokio::test]
    async fn edges_cascade_with_their_nodes() {
        let pool = test_pool().await;
        let f = flow(&pool).await;
        let repo = SqliteFlowRepository::new(pool);
        let nodes = all_kinds(f.id);
        for node in &nodes {
            repo.create_node(node).await.unwrap();
        }
        repo.create_edge(&FlowEdge::new(f.id, nodes[0].id, nodes[2].id, EdgeHandle::Unspecified))
            .await
            .unwrap();
        repo.create_edge(&FlowEdge::new(f.id, nodes[2].id, nodes[1].id, EdgeHandle::Then))
            .await
            .unwrap();
        assert_eq!(repo.list_edges(&f.id).await.unwrap().len(), 2);

        repo.delete_node(&nodes[2].id).await.unwrap();
        assert!(repo.list_edges(&f.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edges_across_flows_are_rejected() {
        let pool = test_pool().await;
        let a = flow(&pool).await;
        let b = flow(&pool).await;
        let repo = SqliteFlowRepository::new(pool);
        let na = repo.create_node(&FlowNode::new(a.id, "a", NodeConfig::Js { code: String::new() })).await.unwrap();
        let nb = repo.create_node(&FlowNode::new(b.id, "b", NodeConfig::Js { code: String::new() })).await.unwrap();
        let err = repo
            .create_edge(&FlowEdge::new(a.id, na.id, nb.id, EdgeHandle::Unspecified))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Invalid(_)));
    }

    #[tokio::test]
    async fn executions_are_listed_newest_first() {
        let pool = test_pool().await;
        let f = flow(&pool).await;
        let repo = SqliteFlowRepository::new(pool);
        let node = repo.create_node(&FlowNode::new(f.id, "script", NodeConfig::Js { code: String::new() })).await.unwrap();
        let (run_a, run_b) = (RunId::new(), RunId::new());
        for (i, run) in [run_a, run_a, run_b].into_iter().enumerate() {
            repo.record_execution(&NodeExecution {
                id: NodeExecutionId::new(),
                flow_id: f.id,
                node_id: node.id,
                run_id: run,
                name: format!("script {i}"),
                state: NodeState::Success,
                error: None,
                input_data: Some(json!({"i": i})),
                output_data: Some(json!({"ok": true})),
                response_id: None,
                completed_at: Utc::now() + Duration::milliseconds(i as i64),
            })
            .await
            .unwrap();
        }

        let all = repo.list_executions(&f.id, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].name, "script 2");
        assert_eq!(all[2].input_data, Some(json!({"i": 0})));

        let only_a = repo.list_executions(&f.id, Some(run_a)).await.unwrap();
        assert_eq!(only_a.len(), 2);
        assert_eq!(repo.list_node_executions(&node.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn variables_crud() {
        let pool = test_pool().await;
        let f = flow(&pool).await;
        let repo = SqliteFlowRepository::new(pool);
        let mut v = repo
            .create_flow_variable(&FlowVariable {
                id: FlowVariableId::new(),
                flow_id: f.id,
                key: "token".into(),
                value: "abc".into(),
                description: String::new(),
                enabled: true,
            })
            .await
            .unwrap();
        v.value = "def".into();
        assert_eq!(repo.update_flow_variable(&v).await.unwrap().value, "def");
        repo.delete_flow_variable(&v.id).await.unwrap();
        assert!(repo.list_flow_variables(&f.id).await.unwrap().is_empty());
    }
}
