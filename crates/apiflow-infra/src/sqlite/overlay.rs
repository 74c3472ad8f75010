//! SQLite delta-overlay stores.
//!
//! One generic store serves every overlayed family. The field type decides
//! which columns the `delta_<kind>_delta` and `delta_<kind>_state` tables
//! carry; the order table is the same for all kinds. Ranking and
//! classification come from `apiflow_core::overlay`.

use std::collections::HashMap;
use std::marker::PhantomData;

use apiflow_core::event::{EventBus, SyncTracker};
use apiflow_core::ordering::{Links, walk};
use apiflow_core::overlay::{
    MovePlan, OverlayError, OverlayFields, append_rank, max_revision, plan_move, resolve,
    seed_rows, sort_order, unreferenced_origins,
};
use apiflow_core::repository::DeltaOverlay;
use apiflow_types::assertion::AssertCondition;
use apiflow_types::error::RepositoryError;
use apiflow_types::event::{SyncEvent, SyncOp, SyncTopic};
use apiflow_types::id::{ExampleId, WorkspaceId};
use apiflow_types::overlay::{
    AssertFields, AssertPatch, Classification, DeltaRow, KeyValueFields, KeyValuePatch,
    MovePosition, OrderRow, OverlayItem, OverlayKind, RefKind, StateRow,
};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::example::{row_to_assert, row_to_field};
use super::pool::DatabasePool;
use super::util::{
    commit, from_json, parse_enum, parse_id, query_err, to_json,
    workspace_of_example, write_err,
};

/// A bindable column value.
pub(crate) enum SqlValue {
    Text(Option<String>),
    Bool(Option<bool>),
}

fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: Vec<SqlValue>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::Text(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
        };
    }
    query
}

/// Table holding the parent example's rows of `kind`.
pub(crate) fn origin_table(kind: OverlayKind) -> &'static str {
    match kind {
        OverlayKind::Header => "headers",
        OverlayKind::Query => "queries",
        OverlayKind::UrlEncoded => "urlenc_fields",
        OverlayKind::Assert => "asserts",
    }
}

/// How an overlayed field set maps onto its delta and state columns.
pub trait StoredFields: OverlayFields {
    /// Content columns, in bind order. Non-null in the delta table,
    /// nullable (one override each) in the state table.
    const COLUMNS: &'static [&'static str];

    /// A parent row with its list pointers.
    fn from_origin_row(row: &SqliteRow) -> Result<(Links<Uuid>, Self), RepositoryError>;

    fn from_delta_row(row: &SqliteRow) -> Result<Self, RepositoryError>;

    fn patch_from_state_row(row: &SqliteRow) -> Result<Self::Patch, RepositoryError>;

    fn values(&self) -> Result<Vec<SqlValue>, RepositoryError>;

    fn patch_values(patch: &Self::Patch) -> Result<Vec<SqlValue>, RepositoryError>;

    /// What a reset leaves in a delta-only row.
    fn blank() -> Self;
}

impl StoredFields for KeyValueFields {
    const COLUMNS: &'static [&'static str] = &["key", "value", "description", "enabled"];

    fn from_origin_row(row: &SqliteRow) -> Result<(Links<Uuid>, Self), RepositoryError> {
        let kv = row_to_field(row)?;
        let links = Links {
            id: kv.id.0,
            prev: kv.prev.map(|p| p.0),
            next: kv.next.map(|n| n.0),
        };
        Ok((
            links,
            KeyValueFields {
                key: kv.key,
                value: kv.value,
                description: kv.description,
                enabled: kv.enabled,
            },
        ))
    }

    fn from_delta_row(row: &SqliteRow) -> Result<Self, RepositoryError> {
        Ok(KeyValueFields {
            key: row.try_get("key").map_err(query_err)?,
            value: row.try_get("value").map_err(query_err)?,
            description: row.try_get("description").map_err(query_err)?,
            enabled: row.try_get("enabled").map_err(query_err)?,
        })
    }

    fn patch_from_state_row(row: &SqliteRow) -> Result<KeyValuePatch, RepositoryError> {
        Ok(KeyValuePatch {
            key: row.try_get("key").map_err(query_err)?,
            value: row.try_get("value").map_err(query_err)?,
            description: row.try_get("description").map_err(query_err)?,
            enabled: row.try_get("enabled").map_err(query_err)?,
        })
    }

    fn values(&self) -> Result<Vec<SqlValue>, RepositoryError> {
        Ok(vec![
            SqlValue::Text(Some(self.key.clone())),
            SqlValue::Text(Some(self.value.clone())),
            SqlValue::Text(Some(self.description.clone())),
            SqlValue::Bool(Some(self.enabled)),
        ])
    }

    fn patch_values(patch: &KeyValuePatch) -> Result<Vec<SqlValue>, RepositoryError> {
        Ok(vec![
            SqlValue::Text(patch.key.clone()),
            SqlValue::Text(patch.value.clone()),
            SqlValue::Text(patch.description.clone()),
            SqlValue::Bool(patch.enabled),
        ])
    }

    fn blank() -> Self {
        KeyValueFields::default()
    }
}

impl StoredFields for AssertFields {
    const COLUMNS: &'static [&'static str] = &["condition", "enabled"];

    fn from_origin_row(row: &SqliteRow) -> Result<(Links<Uuid>, Self), RepositoryError> {
        let a = row_to_assert(row)?;
        let links = Links {
            id: a.id.0,
            prev: a.prev.map(|p| p.0),
            next: a.next.map(|n| n.0),
        };
        Ok((
            links,
            AssertFields {
                condition: a.condition,
                enabled: a.enabled,
            },
        ))
    }

    fn from_delta_row(row: &SqliteRow) -> Result<Self, RepositoryError> {
        let condition: String = row.try_get("condition").map_err(query_err)?;
        Ok(AssertFields {
            condition: from_json(&condition)?,
            enabled: row.try_get("enabled").map_err(query_err)?,
        })
    }

    fn patch_from_state_row(row: &SqliteRow) -> Result<AssertPatch, RepositoryError> {
        let condition: Option<String> = row.try_get("condition").map_err(query_err)?;
        Ok(AssertPatch {
            condition: condition.as_deref().map(from_json).transpose()?,
            enabled: row.try_get("enabled").map_err(query_err)?,
        })
    }

    fn values(&self) -> Result<Vec<SqlValue>, RepositoryError> {
        Ok(vec![
            SqlValue::Text(Some(to_json(&self.condition)?)),
            SqlValue::Bool(Some(self.enabled)),
        ])
    }

    fn patch_values(patch: &AssertPatch) -> Result<Vec<SqlValue>, RepositoryError> {
        Ok(vec![
            SqlValue::Text(patch.condition.as_ref().map(to_json).transpose()?),
            SqlValue::Bool(patch.enabled),
        ])
    }

    fn blank() -> Self {
        AssertFields {
            condition: AssertCondition::expression(""),
            enabled: false,
        }
    }
}

/// SQLite-backed `DeltaOverlay` for one overlay kind.
pub struct SqliteOverlay<F> {
    pool: DatabasePool,
    kind: OverlayKind,
    sync: Option<EventBus<SyncEvent>>,
    _fields: PhantomData<fn() -> F>,
}

pub type SqliteKeyValueOverlay = SqliteOverlay<KeyValueFields>;
pub type SqliteAssertOverlay = SqliteOverlay<AssertFields>;

impl SqliteOverlay<KeyValueFields> {
    pub fn headers(pool: DatabasePool) -> Self {
        Self::with_kind(pool, OverlayKind::Header)
    }

    pub fn queries(pool: DatabasePool) -> Self {
        Self::with_kind(pool, OverlayKind::Query)
    }

    pub fn url_encoded(pool: DatabasePool) -> Self {
        Self::with_kind(pool, OverlayKind::UrlEncoded)
    }
}

impl SqliteOverlay<AssertFields> {
    pub fn new(pool: DatabasePool) -> Self {
        Self::with_kind(pool, OverlayKind::Assert)
    }
}

impl<F: StoredFields> SqliteOverlay<F> {
    fn with_kind(pool: DatabasePool, kind: OverlayKind) -> Self {
        Self {
            pool,
            kind,
            sync: None,
            _fields: PhantomData,
        }
    }

    pub fn with_sync(mut self, bus: EventBus<SyncEvent>) -> Self {
        self.sync = Some(bus);
        self
    }

    pub fn tx<'c>(&self, conn: &'c mut SqliteConnection) -> OverlayQueries<'c, F> {
        OverlayQueries::new(conn, self.kind)
    }

    async fn reader(&self) -> Result<sqlx::pool::PoolConnection<Sqlite>, RepositoryError> {
        self.pool.reader.acquire().await.map_err(query_err)
    }

    async fn finish(
        &self,
        tx: sqlx::Transaction<'static, Sqlite>,
        workspace_id: WorkspaceId,
        changes: &[(SyncOp, Uuid)],
    ) -> Result<(), OverlayError> {
        let mut tracker = SyncTracker::new();
        for (op, id) in changes {
            tracker.track(workspace_id, SyncTopic::Overlay, *op, *id);
        }
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(())
    }
}

/// Overlay queries of one kind bound to one connection.
pub struct OverlayQueries<'c, F> {
    conn: &'c mut SqliteConnection,
    kind: OverlayKind,
    _fields: PhantomData<fn() -> F>,
}

impl<'c, F: StoredFields> OverlayQueries<'c, F> {
    pub(crate) fn new(conn: &'c mut SqliteConnection, kind: OverlayKind) -> Self {
        Self {
            conn,
            kind,
            _fields: PhantomData,
        }
    }

    fn table(&self, suffix: &str) -> String {
        format!("delta_{}_{suffix}", self.kind.table_infix())
    }

    pub async fn workspace(&mut self, example_id: &ExampleId) -> Result<WorkspaceId, RepositoryError> {
        workspace_of_example(&mut *self.conn, example_id).await
    }

    /// The parent of `example_id`, or `NotDelta` when it has none.
    pub async fn parent_of(&mut self, example_id: &ExampleId) -> Result<ExampleId, OverlayError> {
        let row: Option<(Option<String>,)> = sqlx::query_as("SELECT version_parent_id FROM examples WHERE id = ?")
            .bind(example_id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        match row {
            None => Err(RepositoryError::NotFound.into()),
            Some((None,)) => Err(OverlayError::NotDelta),
            Some((Some(parent),)) => Ok(parse_id(&parent)?),
        }
    }

    /// Check `example_id` overlays `origin_id`.
    pub async fn ensure_delta(&mut self, example_id: &ExampleId, origin_id: &ExampleId) -> Result<(), OverlayError> {
        if self.parent_of(example_id).await? != *origin_id {
            return Err(OverlayError::NotDelta);
        }
        Ok(())
    }

    pub async fn order_rows(&mut self, example_id: &ExampleId) -> Result<Vec<OrderRow>, RepositoryError> {
        let sql = format!("SELECT * FROM {} WHERE example_id = ?", self.table("order"));
        let rows = sqlx::query(&sql)
            .bind(example_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        let mut order = rows
            .iter()
            .map(|row| {
                let ref_kind: String = row.try_get("ref_kind").map_err(query_err)?;
                let ref_id: String = row.try_get("ref_id").map_err(query_err)?;
                Ok(OrderRow {
                    example_id: *example_id,
                    ref_kind: parse_enum::<RefKind>(&ref_kind)?,
                    ref_id: parse_id(&ref_id)?,
                    rank: row.try_get("rank").map_err(query_err)?,
                    revision: row.try_get("revision").map_err(query_err)?,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;
        sort_order(&mut order);
        Ok(order)
    }

    pub async fn delta_rows(&mut self, example_id: &ExampleId) -> Result<Vec<DeltaRow<F>>, RepositoryError> {
        let sql = format!("SELECT * FROM {} WHERE example_id = ? ORDER BY rowid", self.table("delta"));
        let rows = sqlx::query(&sql)
            .bind(example_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(query_err)?;
                Ok(DeltaRow {
                    id: parse_id(&id)?,
                    example_id: *example_id,
                    fields: F::from_delta_row(row)?,
                })
            })
            .collect()
    }

    pub async fn state_rows(&mut self, example_id: &ExampleId) -> Result<Vec<StateRow<F::Patch>>, RepositoryError> {
        let sql = format!("SELECT * FROM {} WHERE example_id = ? ORDER BY rowid", self.table("state"));
        let rows = sqlx::query(&sql)
            .bind(example_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        rows.iter()
            .map(|row| {
                let origin_id: String = row.try_get("origin_id").map_err(query_err)?;
                Ok(StateRow {
                    example_id: *example_id,
                    origin_id: parse_id(&origin_id)?,
                    suppressed: row.try_get("suppressed").map_err(query_err)?,
                    patch: F::patch_from_state_row(row)?,
                })
            })
            .collect()
    }

    /// The parent's rows in list order.
    pub async fn origin_rows(&mut self, origin_id: &ExampleId) -> Result<Vec<(Uuid, F)>, RepositoryError> {
        let sql = format!("SELECT * FROM {} WHERE example_id = ? ORDER BY rowid", origin_table(self.kind));
        let rows = sqlx::query(&sql)
            .bind(origin_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        let parsed = rows.iter().map(F::from_origin_row).collect::<Result<Vec<_>, _>>()?;
        let links: Vec<Links<Uuid>> = parsed.iter().map(|(l, _)| *l).collect();
        let mut by_id: HashMap<Uuid, F> = parsed.into_iter().map(|(l, f)| (l.id, f)).collect();
        Ok(walk(&links)
            .all()
            .into_iter()
            .filter_map(|id| by_id.remove(&id).map(|f| (id, f)))
            .collect())
    }

    pub async fn insert_order(&mut self, row: &OrderRow) -> Result<bool, RepositoryError> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} (example_id, ref_kind, ref_id, rank, revision) VALUES (?, ?, ?, ?, ?)",
            self.table("order")
        );
        let result = sqlx::query(&sql)
            .bind(row.example_id.to_string())
            .bind(row.ref_kind.as_str())
            .bind(row.ref_id.to_string())
            .bind(&row.rank)
            .bind(row.revision)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| write_err(e, "overlay order row"))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_rank(
        &mut self,
        example_id: &ExampleId,
        ref_id: Uuid,
        rank: &str,
        revision: i64,
    ) -> Result<(), RepositoryError> {
        let sql = format!("UPDATE {} SET rank = ?, revision = ? WHERE example_id = ? AND ref_id = ?", self.table("order"));
        sqlx::query(&sql)
            .bind(rank)
            .bind(revision)
            .bind(example_id.to_string())
            .bind(ref_id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn delete_order(&mut self, example_id: &ExampleId, ref_id: Uuid) -> Result<(), RepositoryError> {
        let sql = format!("DELETE FROM {} WHERE example_id = ? AND ref_id = ?", self.table("order"));
        sqlx::query(&sql)
            .bind(example_id.to_string())
            .bind(ref_id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn insert_delta(&mut self, row: &DeltaRow<F>) -> Result<(), RepositoryError> {
        let placeholders = vec!["?"; F::COLUMNS.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} (id, example_id, {}) VALUES (?, ?, {placeholders})",
            self.table("delta"),
            F::COLUMNS.join(", ")
        );
        let query = sqlx::query(&sql)
            .bind(row.id.to_string())
            .bind(row.example_id.to_string());
        bind_values(query, row.fields.values()?)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| write_err(e, "overlay delta row"))?;
        Ok(())
    }

    pub async fn delta_fields(&mut self, example_id: &ExampleId, id: Uuid) -> Result<Option<F>, RepositoryError> {
        let sql = format!("SELECT * FROM {} WHERE example_id = ? AND id = ?", self.table("delta"));
        let row = sqlx::query(&sql)
            .bind(example_id.to_string())
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(F::from_delta_row).transpose()
    }

    pub async fn update_delta(&mut self, example_id: &ExampleId, id: Uuid, fields: &F) -> Result<(), RepositoryError> {
        let set = F::COLUMNS.iter().map(|c| format!("{c} = ?")).collect::<Vec<_>>().join(", ");
        let sql = format!("UPDATE {} SET {set} WHERE example_id = ? AND id = ?", self.table("delta"));
        bind_values(sqlx::query(&sql), fields.values()?)
            .bind(example_id.to_string())
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn delete_delta(&mut self, example_id: &ExampleId, id: Uuid) -> Result<(), RepositoryError> {
        let sql = format!("DELETE FROM {} WHERE example_id = ? AND id = ?", self.table("delta"));
        sqlx::query(&sql)
            .bind(example_id.to_string())
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn state_row(
        &mut self,
        example_id: &ExampleId,
        origin_id: Uuid,
    ) -> Result<Option<StateRow<F::Patch>>, RepositoryError> {
        let sql = format!("SELECT * FROM {} WHERE example_id = ? AND origin_id = ?", self.table("state"));
        let row = sqlx::query(&sql)
            .bind(example_id.to_string())
            .bind(origin_id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref()
            .map(|r| {
                Ok(StateRow {
                    example_id: *example_id,
                    origin_id,
                    suppressed: r.try_get("suppressed").map_err(query_err)?,
                    patch: F::patch_from_state_row(r)?,
                })
            })
            .transpose()
    }

    pub async fn upsert_state(&mut self, state: &StateRow<F::Patch>) -> Result<(), RepositoryError> {
        let placeholders = vec!["?"; F::COLUMNS.len()].join(", ");
        let updates = F::COLUMNS
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} (example_id, origin_id, suppressed, {}) VALUES (?, ?, ?, {placeholders})
             ON CONFLICT(example_id, origin_id) DO UPDATE SET suppressed = excluded.suppressed, {updates}",
            self.table("state"),
            F::COLUMNS.join(", ")
        );
        let query = sqlx::query(&sql)
            .bind(state.example_id.to_string())
            .bind(state.origin_id.to_string())
            .bind(state.suppressed);
        bind_values(query, F::patch_values(&state.patch)?)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| write_err(e, "overlay state row"))?;
        Ok(())
    }

    pub async fn delete_state(&mut self, example_id: &ExampleId, origin_id: Uuid) -> Result<(), RepositoryError> {
        let sql = format!("DELETE FROM {} WHERE example_id = ? AND origin_id = ?", self.table("state"));
        sqlx::query(&sql)
            .bind(example_id.to_string())
            .bind(origin_id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    /// Parent rows the order table does not reference yet.
    pub async fn missing_origins(
        &mut self,
        example_id: &ExampleId,
        origin_id: &ExampleId,
    ) -> Result<Vec<Uuid>, RepositoryError> {
        let order = self.order_rows(example_id).await?;
        let parent_ids: Vec<Uuid> = self.origin_rows(origin_id).await?.into_iter().map(|(id, _)| id).collect();
        Ok(unreferenced_origins(&order, &parent_ids))
    }

    /// Add order rows for unreferenced parent rows: a full spread on an
    /// empty list, appended ranks otherwise. Returns the rows added.
    pub async fn seed_missing(
        &mut self,
        example_id: &ExampleId,
        origin_id: &ExampleId,
    ) -> Result<Vec<Uuid>, OverlayError> {
        let mut order = self.order_rows(example_id).await?;
        let parent_ids: Vec<Uuid> = self.origin_rows(origin_id).await?.into_iter().map(|(id, _)| id).collect();
        let rows = if order.is_empty() {
            seed_rows(*example_id, &parent_ids)
        } else {
            let mut added = Vec::new();
            for id in unreferenced_origins(&order, &parent_ids) {
                let row = OrderRow {
                    example_id: *example_id,
                    ref_kind: RefKind::Origin,
                    ref_id: id,
                    rank: append_rank(&order)?,
                    revision: max_revision(&order) + 1,
                };
                order.push(row.clone());
                added.push(row);
            }
            added
        };

        let mut inserted = Vec::new();
        for row in &rows {
            if self.insert_order(row).await? {
                inserted.push(row.ref_id);
            }
        }
        if !inserted.is_empty() {
            tracing::debug!(example_id = %example_id, kind = ?self.kind, rows = inserted.len(), "overlay seeded");
        }
        Ok(inserted)
    }

    /// The effective list.
    pub async fn effective(
        &mut self,
        example_id: &ExampleId,
        origin_id: &ExampleId,
    ) -> Result<Vec<OverlayItem<F>>, RepositoryError> {
        let order = self.order_rows(example_id).await?;
        let origins: HashMap<Uuid, F> = self.origin_rows(origin_id).await?.into_iter().collect();
        let deltas: HashMap<Uuid, F> = self
            .delta_rows(example_id)
            .await?
            .into_iter()
            .map(|d| (d.id, d.fields))
            .collect();
        let states: HashMap<Uuid, StateRow<F::Patch>> = self
            .state_rows(example_id)
            .await?
            .into_iter()
            .map(|s| (s.origin_id, s))
            .collect();
        Ok(resolve(&order, &origins, &deltas, &states))
    }

    async fn entry(&mut self, example_id: &ExampleId, item_id: Uuid) -> Result<OrderRow, OverlayError> {
        self.order_rows(example_id)
            .await?
            .into_iter()
            .find(|r| r.ref_id == item_id)
            .ok_or(OverlayError::ItemNotFound(item_id))
    }

    async fn begin_write(&mut self, example_id: &ExampleId, origin_id: &ExampleId) -> Result<Vec<Uuid>, OverlayError> {
        self.ensure_delta(example_id, origin_id).await?;
        self.seed_missing(example_id, origin_id).await
    }
}

fn inserted(seeded: Vec<Uuid>) -> Vec<(SyncOp, Uuid)> {
    seeded.into_iter().map(|id| (SyncOp::Insert, id)).collect()
}

impl<F: StoredFields> DeltaOverlay for SqliteOverlay<F> {
    type Fields = F;

    fn kind(&self) -> OverlayKind {
        self.kind
    }

    async fn seed(&self, example_id: &ExampleId, origin_id: &ExampleId) -> Result<(), OverlayError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let seeded = queries.begin_write(example_id, origin_id).await?;
        let workspace_id = queries.workspace(example_id).await?;
        self.finish(tx, workspace_id, &inserted(seeded)).await
    }

    async fn list(&self, example_id: &ExampleId, origin_id: &ExampleId) -> Result<Vec<OverlayItem<F>>, OverlayError> {
        {
            let mut conn = self.reader().await?;
            let mut queries = self.tx(&mut conn);
            queries.ensure_delta(example_id, origin_id).await?;
            if queries.missing_origins(example_id, origin_id).await?.is_empty() {
                return Ok(queries.effective(example_id, origin_id).await?);
            }
        }
        self.seed(example_id, origin_id).await?;
        let mut conn = self.reader().await?;
        Ok(self.tx(&mut conn).effective(example_id, origin_id).await?)
    }

    async fn create(
        &self,
        example_id: &ExampleId,
        origin_id: &ExampleId,
        fields: F,
    ) -> Result<OverlayItem<F>, OverlayError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let mut changes = inserted(queries.begin_write(example_id, origin_id).await?);

        let order = queries.order_rows(example_id).await?;
        let row = DeltaRow {
            id: Uuid::now_v7(),
            example_id: *example_id,
            fields,
        };
        queries.insert_delta(&row).await?;
        queries
            .insert_order(&OrderRow {
                example_id: *example_id,
                ref_kind: RefKind::Delta,
                ref_id: row.id,
                rank: append_rank(&order)?,
                revision: max_revision(&order) + 1,
            })
            .await?;
        changes.push((SyncOp::Insert, row.id));
        let workspace_id = queries.workspace(example_id).await?;
        self.finish(tx, workspace_id, &changes).await?;

        Ok(OverlayItem {
            item_id: row.id,
            origin_id: None,
            origin: None,
            fields: row.fields,
            classification: Classification::Delta,
        })
    }

    async fn update(
        &self,
        example_id: &ExampleId,
        origin_id: &ExampleId,
        item_id: Uuid,
        patch: F::Patch,
    ) -> Result<OverlayItem<F>, OverlayError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let mut changes = inserted(queries.begin_write(example_id, origin_id).await?);

        match queries.entry(example_id, item_id).await?.ref_kind {
            RefKind::Delta => {
                let current = queries
                    .delta_fields(example_id, item_id)
                    .await?
                    .ok_or(OverlayError::ItemNotFound(item_id))?;
                queries.update_delta(example_id, item_id, &current.apply(&patch)).await?;
            }
            RefKind::Origin => {
                let state = match queries.state_row(example_id, item_id).await? {
                    Some(existing) => StateRow {
                        patch: F::merge_patch(&existing.patch, &patch),
                        ..existing
                    },
                    None => StateRow {
                        example_id: *example_id,
                        origin_id: item_id,
                        suppressed: false,
                        patch,
                    },
                };
                queries.upsert_state(&state).await?;
            }
        }

        let item = queries
            .effective(example_id, origin_id)
            .await?
            .into_iter()
            .find(|i| i.item_id == item_id)
            .ok_or(OverlayError::ItemNotFound(item_id))?;
        changes.push((SyncOp::Update, item_id));
        let workspace_id = queries.workspace(example_id).await?;
        self.finish(tx, workspace_id, &changes).await?;
        Ok(item)
    }

    async fn reset(&self, example_id: &ExampleId, origin_id: &ExampleId, item_id: Uuid) -> Result<(), OverlayError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let mut changes = inserted(queries.begin_write(example_id, origin_id).await?);

        match queries.entry(example_id, item_id).await?.ref_kind {
            RefKind::Delta => queries.update_delta(example_id, item_id, &F::blank()).await?,
            RefKind::Origin => queries.delete_state(example_id, item_id).await?,
        }
        changes.push((SyncOp::Update, item_id));
        let workspace_id = queries.workspace(example_id).await?;
        self.finish(tx, workspace_id, &changes).await
    }

    async fn delete(&self, example_id: &ExampleId, origin_id: &ExampleId, item_id: Uuid) -> Result<(), OverlayError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let mut changes = inserted(queries.begin_write(example_id, origin_id).await?);

        match queries.entry(example_id, item_id).await?.ref_kind {
            RefKind::Delta => {
                queries.delete_delta(example_id, item_id).await?;
                queries.delete_order(example_id, item_id).await?;
            }
            RefKind::Origin => {
                // The order row stays so a restore lands in the same place.
                let state = match queries.state_row(example_id, item_id).await? {
                    Some(existing) => StateRow {
                        suppressed: true,
                        ..existing
                    },
                    None => StateRow {
                        example_id: *example_id,
                        origin_id: item_id,
                        suppressed: true,
                        patch: F::Patch::default(),
                    },
                };
                queries.upsert_state(&state).await?;
            }
        }
        changes.push((SyncOp::Delete, item_id));
        let workspace_id = queries.workspace(example_id).await?;
        self.finish(tx, workspace_id, &changes).await
    }

    async fn restore(&self, example_id: &ExampleId, item_id: Uuid) -> Result<(), OverlayError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        queries.parent_of(example_id).await?;
        let state = queries
            .state_row(example_id, item_id)
            .await?
            .ok_or(OverlayError::ItemNotFound(item_id))?;
        if !state.suppressed {
            return Ok(());
        }
        queries
            .upsert_state(&StateRow {
                suppressed: false,
                ..state
            })
            .await?;
        let workspace_id = queries.workspace(example_id).await?;
        self.finish(tx, workspace_id, &[(SyncOp::Update, item_id)]).await
    }

    async fn move_item(
        &self,
        example_id: &ExampleId,
        origin_id: &ExampleId,
        item_id: Uuid,
        target_id: Uuid,
        position: MovePosition,
    ) -> Result<(), OverlayError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let mut changes = inserted(queries.begin_write(example_id, origin_id).await?);

        let order = queries.order_rows(example_id).await?;
        match plan_move(&order, item_id, target_id, position)? {
            MovePlan::Single { ref_id, rank, revision } => {
                queries.set_rank(example_id, ref_id, &rank, revision).await?;
            }
            MovePlan::Rebalance { ranks, revision } => {
                for (ref_id, rank) in &ranks {
                    queries.set_rank(example_id, *ref_id, rank, revision).await?;
                }
            }
        }
        changes.push((SyncOp::Update, item_id));
        let workspace_id = queries.workspace(example_id).await?;
        self.finish(tx, workspace_id, &changes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::example::SqliteExampleRepository;
    use crate::sqlite::example::testing::{endpoint, example};
    use crate::sqlite::pool::testing::test_pool;
    use apiflow_core::repository::ExampleRepository;
    use apiflow_types::assertion::AssertKind;
    use apiflow_types::collection::{Assertion, Example, FieldKind, KeyValue};

    struct Setup {
        pool: DatabasePool,
        examples: SqliteExampleRepository,
        parent: Example,
        delta: Example,
        parent_rows: Vec<KeyValue>,
    }

    async fn setup() -> Setup {
        let pool = test_pool().await;
        let ep = endpoint(&pool).await;
        let examples = SqliteExampleRepository::new(pool.clone());
        let parent = examples.create_example(&example(ep.id, "base")).await.unwrap();
        let mut delta = example(ep.id, "delta");
        delta.version_parent_id = Some(parent.id);
        let delta = examples.create_example(&delta).await.unwrap();
        let mut parent_rows = Vec::new();
        for (k, v) in [("Accept", "json"), ("X-Trace", "1"), ("X-Env", "dev")] {
            parent_rows.push(
                examples
                    .append_field(FieldKind::Header, &KeyValue::new(parent.id, k, v))
                    .await
                    .unwrap(),
            );
        }
        Setup {
            pool,
            examples,
            parent,
            delta,
            parent_rows,
        }
    }

    fn summary(items: &[OverlayItem<KeyValueFields>]) -> Vec<(String, String, Classification)> {
        items
            .iter()
            .map(|i| (i.fields.key.clone(), i.fields.value.clone(), i.classification))
            .collect()
    }

    fn row(key: &str, value: &str, class: Classification) -> (String, String, Classification) {
        (key.into(), value.into(), class)
    }

    #[tokio::test]
    async fn first_read_seeds_from_the_parent() {
        let s = setup().await;
        let overlay = SqliteKeyValueOverlay::headers(s.pool.clone());
        let items = overlay.list(&s.delta.id, &s.parent.id).await.unwrap();
        assert_eq!(
            summary(&items),
            [
                row("Accept", "json", Classification::Origin),
                row("X-Trace", "1", Classification::Origin),
                row("X-Env", "dev", Classification::Origin),
            ]
        );
        let again = overlay.list(&s.delta.id, &s.parent.id).await.unwrap();
        assert_eq!(items, again);
    }

    #[tokio::test]
    async fn concurrent_seeding_creates_one_row_per_parent_row() {
        let s = setup().await;
        let overlay = std::sync::Arc::new(SqliteKeyValueOverlay::headers(s.pool.clone()));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let overlay = overlay.clone();
            let (delta, parent) = (s.delta.id, s.parent.id);
            handles.push(tokio::spawn(async move { overlay.list(&delta, &parent).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 3);
        }
        let mut conn = s.pool.reader.acquire().await.unwrap();
        let order = overlay.tx(&mut conn).order_rows(&s.delta.id).await.unwrap();
        assert_eq!(order.len(), 3);
    }

    #[tokio::test]
    async fn update_override_then_reset() {
        let s = setup().await;
        let overlay = SqliteKeyValueOverlay::headers(s.pool.clone());
        let accept = s.parent_rows[0].id.0;
        let patch = KeyValuePatch {
            value: Some("xml".into()),
            ..Default::default()
        };
        let item = overlay.update(&s.delta.id, &s.parent.id, accept, patch).await.unwrap();
        assert_eq!(item.classification, Classification::Mixed);
        assert_eq!(item.fields.value, "xml");
        assert_eq!(item.origin.unwrap().value, "json");

        overlay.reset(&s.delta.id, &s.parent.id, accept).await.unwrap();
        let items = overlay.list(&s.delta.id, &s.parent.id).await.unwrap();
        assert_eq!(summary(&items)[0], row("Accept", "json", Classification::Origin));
    }

    #[tokio::test]
    async fn delete_suppresses_and_restore_returns_to_position() {
        let s = setup().await;
        let overlay = SqliteKeyValueOverlay::headers(s.pool.clone());
        let trace = s.parent_rows[1].id.0;
        overlay.delete(&s.delta.id, &s.parent.id, trace).await.unwrap();
        let items = overlay.list(&s.delta.id, &s.parent.id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.item_id != trace));

        overlay.restore(&s.delta.id, trace).await.unwrap();
        let items = overlay.list(&s.delta.id, &s.parent.id).await.unwrap();
        assert_eq!(items[1].item_id, trace);

        // The parent example is untouched throughout.
        let parent = s.examples.list_fields(FieldKind::Header, &s.parent.id).await.unwrap();
        assert_eq!(parent, s.parent_rows);
    }

    #[tokio::test]
    async fn delta_rows_append_move_and_blank_on_reset() {
        let s = setup().await;
        let overlay = SqliteKeyValueOverlay::headers(s.pool.clone());
        let created = overlay
            .create(
                &s.delta.id,
                &s.parent.id,
                KeyValueFields {
                    key: "X-Extra".into(),
                    value: "1".into(),
                    description: String::new(),
                    enabled: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(created.classification, Classification::Delta);

        overlay
            .move_item(&s.delta.id, &s.parent.id, created.item_id, s.parent_rows[0].id.0, MovePosition::Before)
            .await
            .unwrap();
        let items = overlay.list(&s.delta.id, &s.parent.id).await.unwrap();
        assert_eq!(items[0].item_id, created.item_id);
        assert_eq!(items.len(), 4);

        overlay.reset(&s.delta.id, &s.parent.id, created.item_id).await.unwrap();
        let items = overlay.list(&s.delta.id, &s.parent.id).await.unwrap();
        assert_eq!(items[0].fields, KeyValueFields::default());

        overlay.delete(&s.delta.id, &s.parent.id, created.item_id).await.unwrap();
        let items = overlay.list(&s.delta.id, &s.parent.id).await.unwrap();
        assert_eq!(items.len(), 3);
        let mut conn = s.pool.reader.acquire().await.unwrap();
        assert_eq!(overlay.tx(&mut conn).order_rows(&s.delta.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn parent_rows_added_later_are_appended() {
        let s = setup().await;
        let overlay = SqliteKeyValueOverlay::headers(s.pool.clone());
        overlay.list(&s.delta.id, &s.parent.id).await.unwrap();
        s.examples
            .append_field(FieldKind::Header, &KeyValue::new(s.parent.id, "X-Late", "1"))
            .await
            .unwrap();
        let items = overlay.list(&s.delta.id, &s.parent.id).await.unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[3].fields.key, "X-Late");
    }

    #[tokio::test]
    async fn non_delta_examples_are_rejected() {
        let s = setup().await;
        let overlay = SqliteKeyValueOverlay::headers(s.pool.clone());
        let err = overlay.list(&s.parent.id, &s.parent.id).await.unwrap_err();
        assert!(matches!(err, OverlayError::NotDelta));
    }

    #[tokio::test]
    async fn overlay_kinds_do_not_share_rows() {
        let s = setup().await;
        let queries = SqliteKeyValueOverlay::queries(s.pool.clone());
        assert!(queries.list(&s.delta.id, &s.parent.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn assert_overlay_overrides_conditions() {
        let s = setup().await;
        let status = AssertCondition::predicate(AssertKind::Equal, "response.status", "200");
        let origin = s
            .examples
            .append_assert(&Assertion::new(s.parent.id, status))
            .await
            .unwrap();
        let overlay = SqliteAssertOverlay::new(s.pool.clone());
        let relaxed = AssertCondition::expression("response.status < 500");
        let item = overlay
            .update(
                &s.delta.id,
                &s.parent.id,
                origin.id.0,
                AssertPatch {
                    condition: Some(relaxed.clone()),
                    enabled: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(item.classification, Classification::Mixed);
        assert_eq!(item.fields.condition, relaxed);
        assert!(item.fields.enabled);
    }
}
