//! SQLite example repository: examples, their key/value field families,
//! assertions and raw bodies.

use apiflow_core::event::{EventBus, SyncTracker};
use apiflow_core::ordering::sort_linked;
use apiflow_core::repository::ExampleRepository;
use apiflow_types::collection::{Assertion, BodyKind, Example, FieldKind, KeyValue, RawBody};
use apiflow_types::error::RepositoryError;
use apiflow_types::event::{SyncEvent, SyncOp, SyncTopic};
use apiflow_types::id::{AssertId, EndpointId, ExampleId, FieldId};
use apiflow_types::overlay::MovePosition;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::linked::{self, ListScope};
use super::pool::DatabasePool;
use super::util::{
    commit, format_datetime, from_json, opt_id, parse_datetime, parse_enum, parse_id, parse_opt_id,
    query_err, to_json, workspace_of_example, write_err,
};

/// SQLite-backed implementation of `ExampleRepository`.
pub struct SqliteExampleRepository {
    pool: DatabasePool,
    sync: Option<EventBus<SyncEvent>>,
}

impl SqliteExampleRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool, sync: None }
    }

    pub fn with_sync(mut self, bus: EventBus<SyncEvent>) -> Self {
        self.sync = Some(bus);
        self
    }

    pub fn tx<'c>(&self, conn: &'c mut SqliteConnection) -> ExampleQueries<'c> {
        ExampleQueries { conn }
    }
}

pub(crate) fn field_table(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Header => "headers",
        FieldKind::Query => "queries",
        FieldKind::UrlEncoded => "urlenc_fields",
        FieldKind::Form => "form_fields",
    }
}

fn field_topic(kind: FieldKind) -> SyncTopic {
    match kind {
        FieldKind::Header => SyncTopic::Header,
        FieldKind::Query => SyncTopic::Query,
        FieldKind::UrlEncoded => SyncTopic::UrlEncoded,
        FieldKind::Form => SyncTopic::Form,
    }
}

fn example_scope(endpoint_id: &EndpointId) -> ListScope {
    ListScope::new("examples").filter("endpoint_id", Some(endpoint_id.to_string()))
}

fn field_scope(kind: FieldKind, example_id: &ExampleId) -> ListScope {
    ListScope::new(field_table(kind)).filter("example_id", Some(example_id.to_string()))
}

fn assert_scope(example_id: &ExampleId) -> ListScope {
    ListScope::new("asserts").filter("example_id", Some(example_id.to_string()))
}

pub(crate) fn row_to_example(row: &SqliteRow) -> Result<Example, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let endpoint_id: String = row.try_get("endpoint_id").map_err(query_err)?;
    let body_kind: String = row.try_get("body_kind").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    Ok(Example {
        id: parse_id(&id)?,
        endpoint_id: parse_id(&endpoint_id)?,
        name: row.try_get("name").map_err(query_err)?,
        is_default: row.try_get("is_default").map_err(query_err)?,
        body_kind: parse_enum::<BodyKind>(&body_kind)?,
        version_parent_id: parse_opt_id(row.try_get("version_parent_id").map_err(query_err)?)?,
        prev: parse_opt_id(row.try_get("prev_id").map_err(query_err)?)?,
        next: parse_opt_id(row.try_get("next_id").map_err(query_err)?)?,
        created_at: parse_datetime(&created_at)?,
    })
}

pub(crate) fn row_to_field(row: &SqliteRow) -> Result<KeyValue, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let example_id: String = row.try_get("example_id").map_err(query_err)?;
    Ok(KeyValue {
        id: parse_id(&id)?,
        example_id: parse_id(&example_id)?,
        key: row.try_get("key").map_err(query_err)?,
        value: row.try_get("value").map_err(query_err)?,
        description: row.try_get("description").map_err(query_err)?,
        enabled: row.try_get("enabled").map_err(query_err)?,
        delta_parent_id: parse_opt_id(row.try_get("delta_parent_id").map_err(query_err)?)?,
        prev: parse_opt_id(row.try_get("prev_id").map_err(query_err)?)?,
        next: parse_opt_id(row.try_get("next_id").map_err(query_err)?)?,
    })
}

pub(crate) fn row_to_assert(row: &SqliteRow) -> Result<Assertion, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let example_id: String = row.try_get("example_id").map_err(query_err)?;
    let condition: String = row.try_get("condition").map_err(query_err)?;
    Ok(Assertion {
        id: parse_id(&id)?,
        example_id: parse_id(&example_id)?,
        condition: from_json(&condition)?,
        enabled: row.try_get("enabled").map_err(query_err)?,
        delta_parent_id: parse_opt_id(row.try_get("delta_parent_id").map_err(query_err)?)?,
        prev: parse_opt_id(row.try_get("prev_id").map_err(query_err)?)?,
        next: parse_opt_id(row.try_get("next_id").map_err(query_err)?)?,
    })
}

/// Example queries bound to one connection.
pub struct ExampleQueries<'c> {
    conn: &'c mut SqliteConnection,
}

impl ExampleQueries<'_> {
    pub async fn insert_example(&mut self, ex: &Example) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO examples (id, endpoint_id, name, is_default, body_kind, version_parent_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ex.id.to_string())
        .bind(ex.endpoint_id.to_string())
        .bind(&ex.name)
        .bind(ex.is_default)
        .bind(ex.body_kind.as_str())
        .bind(opt_id(ex.version_parent_id))
        .bind(format_datetime(&ex.created_at))
        .execute(&mut *self.conn)
        .await
        .map_err(|e| write_err(e, "example"))?;
        Ok(())
    }

    pub async fn get_example(&mut self, id: &ExampleId) -> Result<Option<Example>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM examples WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_example).transpose()
    }

    pub async fn list_examples(&mut self, endpoint_id: &EndpointId) -> Result<Vec<Example>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM examples WHERE endpoint_id = ? ORDER BY rowid")
            .bind(endpoint_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        let examples = rows.iter().map(row_to_example).collect::<Result<Vec<_>, _>>()?;
        Ok(sort_linked(examples))
    }

    /// `id` and every example overlaying it, transitively.
    pub async fn with_descendants(&mut self, id: &ExampleId) -> Result<Vec<Example>, RepositoryError> {
        let rows = sqlx::query(
            "WITH RECURSIVE tree(id) AS (
                 SELECT ?
                 UNION
                 SELECT e.id FROM examples e JOIN tree ON e.version_parent_id = tree.id
             )
             SELECT ex.* FROM examples ex JOIN tree ON ex.id = tree.id",
        )
        .bind(id.to_string())
        .fetch_all(&mut *self.conn)
        .await
        .map_err(query_err)?;
        rows.iter().map(row_to_example).collect()
    }

    pub async fn update_example_row(&mut self, ex: &Example) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE examples SET name = ?, body_kind = ? WHERE id = ?")
            .bind(&ex.name)
            .bind(ex.body_kind.as_str())
            .bind(ex.id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn set_default(&mut self, endpoint_id: &EndpointId, id: &ExampleId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE examples SET is_default = (id = ?) WHERE endpoint_id = ?")
            .bind(id.to_string())
            .bind(endpoint_id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    /// Promote the list head when no example of the endpoint is default.
    pub async fn ensure_default(&mut self, endpoint_id: &EndpointId) -> Result<Option<ExampleId>, RepositoryError> {
        let examples = self.list_examples(endpoint_id).await?;
        if examples.iter().any(|e| e.is_default) {
            return Ok(None);
        }
        let Some(head) = examples.first() else {
            return Ok(None);
        };
        self.set_default(endpoint_id, &head.id).await?;
        Ok(Some(head.id))
    }

    pub async fn insert_field(&mut self, kind: FieldKind, f: &KeyValue) -> Result<(), RepositoryError> {
        let sql = format!(
            "INSERT INTO {} (id, example_id, key, value, description, enabled, delta_parent_id)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            field_table(kind)
        );
        sqlx::query(&sql)
            .bind(f.id.to_string())
            .bind(f.example_id.to_string())
            .bind(&f.key)
            .bind(&f.value)
            .bind(&f.description)
            .bind(f.enabled)
            .bind(opt_id(f.delta_parent_id))
            .execute(&mut *self.conn)
            .await
            .map_err(|e| write_err(e, kind.as_str()))?;
        Ok(())
    }

    pub async fn get_field(&mut self, kind: FieldKind, id: &FieldId) -> Result<Option<KeyValue>, RepositoryError> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", field_table(kind));
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_field).transpose()
    }

    pub async fn list_fields(&mut self, kind: FieldKind, example_id: &ExampleId) -> Result<Vec<KeyValue>, RepositoryError> {
        let sql = format!("SELECT * FROM {} WHERE example_id = ? ORDER BY rowid", field_table(kind));
        let rows = sqlx::query(&sql)
            .bind(example_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        let fields = rows.iter().map(row_to_field).collect::<Result<Vec<_>, _>>()?;
        Ok(sort_linked(fields))
    }

    pub async fn update_field_row(&mut self, kind: FieldKind, f: &KeyValue) -> Result<(), RepositoryError> {
        let sql = format!(
            "UPDATE {} SET key = ?, value = ?, description = ?, enabled = ? WHERE id = ?",
            field_table(kind)
        );
        let result = sqlx::query(&sql)
            .bind(&f.key)
            .bind(&f.value)
            .bind(&f.description)
            .bind(f.enabled)
            .bind(f.id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_field_row(&mut self, kind: FieldKind, id: &FieldId) -> Result<(), RepositoryError> {
        let sql = format!("DELETE FROM {} WHERE id = ?", field_table(kind));
        sqlx::query(&sql)
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    pub async fn insert_assert(&mut self, a: &Assertion) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO asserts (id, example_id, condition, enabled, delta_parent_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(a.id.to_string())
        .bind(a.example_id.to_string())
        .bind(to_json(&a.condition)?)
        .bind(a.enabled)
        .bind(opt_id(a.delta_parent_id))
        .execute(&mut *self.conn)
        .await
        .map_err(|e| write_err(e, "assert"))?;
        Ok(())
    }

    pub async fn get_assert(&mut self, id: &AssertId) -> Result<Option<Assertion>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM asserts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        row.as_ref().map(row_to_assert).transpose()
    }

    pub async fn list_asserts(&mut self, example_id: &ExampleId) -> Result<Vec<Assertion>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM asserts WHERE example_id = ? ORDER BY rowid")
            .bind(example_id.to_string())
            .fetch_all(&mut *self.conn)
            .await
            .map_err(query_err)?;
        let asserts = rows.iter().map(row_to_assert).collect::<Result<Vec<_>, _>>()?;
        Ok(sort_linked(asserts))
    }

    pub async fn update_assert_row(&mut self, a: &Assertion) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE asserts SET condition = ?, enabled = ? WHERE id = ?")
            .bind(to_json(&a.condition)?)
            .bind(a.enabled)
            .bind(a.id.to_string())
            .execute(&mut *self.conn)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    pub async fn get_raw_body(&mut self, example_id: &ExampleId) -> Result<Option<RawBody>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM raw_bodies WHERE example_id = ?")
            .bind(example_id.to_string())
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(query_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(RawBody {
            example_id: *example_id,
            data: row.try_get("data").map_err(query_err)?,
            visualize_mode: row.try_get("visualize_mode").map_err(query_err)?,
            compress: row.try_get("compress").map_err(query_err)?,
        }))
    }

    pub async fn upsert_raw_body(&mut self, body: &RawBody) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO raw_bodies (example_id, data, visualize_mode, compress) VALUES (?, ?, ?, ?)
             ON CONFLICT(example_id) DO UPDATE SET
                 data = excluded.data,
                 visualize_mode = excluded.visualize_mode,
                 compress = excluded.compress",
        )
        .bind(body.example_id.to_string())
        .bind(&body.data)
        .bind(&body.visualize_mode)
        .bind(&body.compress)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| write_err(e, "raw body"))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ExampleRepository impl
// ---------------------------------------------------------------------------

impl SqliteExampleRepository {
    async fn reader(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>, RepositoryError> {
        self.pool.reader.acquire().await.map_err(query_err)
    }
}

impl ExampleRepository for SqliteExampleRepository {
    async fn create_example(&self, example: &Example) -> Result<Example, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let first = queries.list_examples(&example.endpoint_id).await?.is_empty();
        let mut stored = example.clone();
        stored.is_default = first || example.is_default;
        queries.insert_example(&stored).await?;
        linked::append(&mut tx, &example_scope(&stored.endpoint_id), stored.id.0).await?;
        if stored.is_default && !first {
            self.tx(&mut tx).set_default(&stored.endpoint_id, &stored.id).await?;
        }
        let created = self.tx(&mut tx).get_example(&stored.id).await?.ok_or(RepositoryError::NotFound)?;

        let workspace_id = workspace_of_example(&mut tx, &created.id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Example, SyncOp::Insert, created.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(created)
    }

    async fn get_example(&self, id: &ExampleId) -> Result<Option<Example>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).get_example(id).await
    }

    async fn list_examples(&self, endpoint_id: &EndpointId) -> Result<Vec<Example>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_examples(endpoint_id).await
    }

    async fn update_example(&self, example: &Example) -> Result<Example, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        queries.update_example_row(example).await?;
        let updated = queries.get_example(&example.id).await?.ok_or(RepositoryError::NotFound)?;
        let workspace_id = workspace_of_example(&mut tx, &example.id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Example, SyncOp::Update, example.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(updated)
    }

    async fn delete_example(&self, id: &ExampleId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let workspace_id = workspace_of_example(&mut tx, id).await?;
        // Overlaying examples cascade with their parent; unlink them first so
        // no surviving row points at a deleted one.
        let doomed = self.tx(&mut tx).with_descendants(id).await?;
        for ex in &doomed {
            linked::unlink(&mut tx, &example_scope(&ex.endpoint_id), ex.id.0).await?;
        }
        sqlx::query("DELETE FROM examples WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        let mut tracker = SyncTracker::new();
        let mut endpoints: Vec<EndpointId> = doomed.iter().map(|e| e.endpoint_id).collect();
        endpoints.sort();
        endpoints.dedup();
        for endpoint_id in endpoints {
            if let Some(promoted) = self.tx(&mut tx).ensure_default(&endpoint_id).await? {
                tracker.track(workspace_id, SyncTopic::Example, SyncOp::Update, promoted);
            }
        }
        for ex in &doomed {
            tracker.track(workspace_id, SyncTopic::Example, SyncOp::Delete, ex.id);
        }
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn set_default_example(&self, id: &ExampleId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let example = queries.get_example(id).await?.ok_or(RepositoryError::NotFound)?;
        queries.set_default(&example.endpoint_id, id).await?;
        let workspace_id = workspace_of_example(&mut tx, id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Example, SyncOp::Update, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn list_fields(&self, kind: FieldKind, example_id: &ExampleId) -> Result<Vec<KeyValue>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_fields(kind, example_id).await
    }

    async fn get_field(&self, kind: FieldKind, id: &FieldId) -> Result<Option<KeyValue>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).get_field(kind, id).await
    }

    async fn append_field(&self, kind: FieldKind, field: &KeyValue) -> Result<KeyValue, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        self.tx(&mut tx).insert_field(kind, field).await?;
        linked::append(&mut tx, &field_scope(kind, &field.example_id), field.id.0).await?;
        let created = self.tx(&mut tx).get_field(kind, &field.id).await?.ok_or(RepositoryError::NotFound)?;
        let workspace_id = workspace_of_example(&mut tx, &field.example_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, field_topic(kind), SyncOp::Insert, field.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(created)
    }

    async fn bulk_append_fields(
        &self,
        kind: FieldKind,
        example_id: &ExampleId,
        fields: &[KeyValue],
    ) -> Result<Vec<KeyValue>, RepositoryError> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        let mut ids = Vec::with_capacity(fields.len());
        for field in fields {
            if field.example_id != *example_id {
                return Err(RepositoryError::Invalid("every field must belong to the target example".into()));
            }
            queries.insert_field(kind, field).await?;
            ids.push(field.id.0);
        }
        linked::append_many(&mut tx, &field_scope(kind, example_id), &ids).await?;

        let all = self.tx(&mut tx).list_fields(kind, example_id).await?;
        let created: Vec<KeyValue> = all.into_iter().filter(|f| ids.contains(&f.id.0)).collect();
        let workspace_id = workspace_of_example(&mut tx, example_id).await?;
        let mut tracker = SyncTracker::new();
        for field in &created {
            tracker.track(workspace_id, field_topic(kind), SyncOp::Insert, field.id);
        }
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(created)
    }

    async fn update_field(&self, kind: FieldKind, field: &KeyValue) -> Result<KeyValue, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        queries.update_field_row(kind, field).await?;
        let updated = queries.get_field(kind, &field.id).await?.ok_or(RepositoryError::NotFound)?;
        let workspace_id = workspace_of_example(&mut tx, &updated.example_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, field_topic(kind), SyncOp::Update, field.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(updated)
    }

    async fn delete_field(&self, kind: FieldKind, id: &FieldId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let field = self.tx(&mut tx).get_field(kind, id).await?.ok_or(RepositoryError::NotFound)?;
        linked::unlink(&mut tx, &field_scope(kind, &field.example_id), id.0).await?;
        self.tx(&mut tx).delete_field_row(kind, id).await?;
        let workspace_id = workspace_of_example(&mut tx, &field.example_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, field_topic(kind), SyncOp::Delete, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn move_field(
        &self,
        kind: FieldKind,
        id: &FieldId,
        target: &FieldId,
        position: MovePosition,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let field = self.tx(&mut tx).get_field(kind, id).await?.ok_or(RepositoryError::NotFound)?;
        linked::move_item(&mut tx, &field_scope(kind, &field.example_id), id.0, target.0, position).await?;
        let workspace_id = workspace_of_example(&mut tx, &field.example_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, field_topic(kind), SyncOp::Update, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn list_asserts(&self, example_id: &ExampleId) -> Result<Vec<Assertion>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).list_asserts(example_id).await
    }

    async fn append_assert(&self, assertion: &Assertion) -> Result<Assertion, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        self.tx(&mut tx).insert_assert(assertion).await?;
        linked::append(&mut tx, &assert_scope(&assertion.example_id), assertion.id.0).await?;
        let created = self.tx(&mut tx).get_assert(&assertion.id).await?.ok_or(RepositoryError::NotFound)?;
        let workspace_id = workspace_of_example(&mut tx, &assertion.example_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Assert, SyncOp::Insert, assertion.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(created)
    }

    async fn update_assert(&self, assertion: &Assertion) -> Result<Assertion, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let mut queries = self.tx(&mut tx);
        queries.update_assert_row(assertion).await?;
        let updated = queries.get_assert(&assertion.id).await?.ok_or(RepositoryError::NotFound)?;
        let workspace_id = workspace_of_example(&mut tx, &updated.example_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Assert, SyncOp::Update, assertion.id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(updated)
    }

    async fn delete_assert(&self, id: &AssertId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let assertion = self.tx(&mut tx).get_assert(id).await?.ok_or(RepositoryError::NotFound)?;
        linked::unlink(&mut tx, &assert_scope(&assertion.example_id), id.0).await?;
        sqlx::query("DELETE FROM asserts WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        let workspace_id = workspace_of_example(&mut tx, &assertion.example_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Assert, SyncOp::Delete, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn move_assert(&self, id: &AssertId, target: &AssertId, position: MovePosition) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let assertion = self.tx(&mut tx).get_assert(id).await?.ok_or(RepositoryError::NotFound)?;
        linked::move_item(&mut tx, &assert_scope(&assertion.example_id), id.0, target.0, position).await?;
        let workspace_id = workspace_of_example(&mut tx, &assertion.example_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::Assert, SyncOp::Update, *id);
        commit(tx, tracker, self.sync.as_ref()).await
    }

    async fn get_raw_body(&self, example_id: &ExampleId) -> Result<Option<RawBody>, RepositoryError> {
        let mut conn = self.reader().await?;
        self.tx(&mut conn).get_raw_body(example_id).await
    }

    async fn put_raw_body(&self, body: &RawBody) -> Result<RawBody, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        self.tx(&mut tx).upsert_raw_body(body).await?;
        let workspace_id = workspace_of_example(&mut tx, &body.example_id).await?;
        let mut tracker = SyncTracker::new();
        tracker.track(workspace_id, SyncTopic::RawBody, SyncOp::Update, body.example_id);
        commit(tx, tracker, self.sync.as_ref()).await?;
        Ok(body.clone())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Workspace → collection → endpoint chain for tests that need examples.

    use super::*;
    use crate::sqlite::collection::SqliteCollectionRepository;
    use crate::sqlite::workspace::SqliteWorkspaceRepository;
    use apiflow_core::repository::{CollectionRepository, WorkspaceRepository};
    use apiflow_types::collection::{Collection, Endpoint};
    use apiflow_types::id::CollectionId;
    use apiflow_types::workspace::Workspace;
    use chrono::Utc;

    pub(crate) async fn endpoint(pool: &DatabasePool) -> Endpoint {
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
        collections
            .create_endpoint(&Endpoint {
                id: EndpointId::new(),
                collection_id: collection.id,
                folder_id: None,
                name: "users".into(),
                method: "GET".into(),
                url: "https://api.test/users".into(),
                delta_parent_id: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    pub(crate) fn example(endpoint_id: EndpointId, name: &str) -> Example {
        Example {
            id: ExampleId::new(),
            endpoint_id,
            name: name.into(),
            is_default: false,
            body_kind: BodyKind::None,
            version_parent_id: None,
            prev: None,
            next: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{endpoint, example};
    use super::*;
    use crate::sqlite::pool::testing::test_pool;
    use apiflow_core::ordering::check_well_formed;
    use apiflow_types::assertion::{AssertCondition, AssertKind};

    async fn setup() -> (SqliteExampleRepository, Example) {
        let pool = test_pool().await;
        let ep = endpoint(&pool).await;
        let repo = SqliteExampleRepository::new(pool);
        let ex = repo.create_example(&example(ep.id, "default")).await.unwrap();
        (repo, ex)
    }

    fn keys(fields: &[KeyValue]) -> Vec<&str> {
        fields.iter().map(|f| f.key.as_str()).collect()
    }

    #[tokio::test]
    async fn first_example_becomes_default() {
        let (repo, first) = setup().await;
        assert!(first.is_default);
        let second = repo.create_example(&example(first.endpoint_id, "second")).await.unwrap();
        assert!(!second.is_default);

        let list = repo.list_examples(&first.endpoint_id).await.unwrap();
        assert_eq!(list.iter().map(|e| e.id).collect::<Vec<_>>(), [first.id, second.id]);
    }

    #[tokio::test]
    async fn deleting_the_default_promotes_the_head() {
        let (repo, first) = setup().await;
        let second = repo.create_example(&example(first.endpoint_id, "second")).await.unwrap();
        repo.delete_example(&first.id).await.unwrap();

        let list = repo.list_examples(&first.endpoint_id).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, second.id);
        assert!(list[0].is_default);
        assert_eq!((list[0].prev, list[0].next), (None, None));
    }

    #[tokio::test]
    async fn deleting_a_parent_unlinks_its_deltas() {
        let (repo, base) = setup().await;
        let mut delta = example(base.endpoint_id, "delta");
        delta.version_parent_id = Some(base.id);
        repo.create_example(&delta).await.unwrap();
        let keep = repo.create_example(&example(base.endpoint_id, "keep")).await.unwrap();

        repo.delete_example(&base.id).await.unwrap();
        let list = repo.list_examples(&base.endpoint_id).await.unwrap();
        assert_eq!(list.iter().map(|e| e.id).collect::<Vec<_>>(), [keep.id]);
        check_well_formed(&list).unwrap();
    }

    #[tokio::test]
    async fn set_default_clears_siblings() {
        let (repo, first) = setup().await;
        let second = repo.create_example(&example(first.endpoint_id, "second")).await.unwrap();
        repo.set_default_example(&second.id).await.unwrap();
        let list = repo.list_examples(&first.endpoint_id).await.unwrap();
        assert_eq!(list.iter().filter(|e| e.is_default).count(), 1);
        assert!(list[1].is_default);
    }

    #[tokio::test]
    async fn fields_keep_list_order_through_moves_and_deletes() {
        let (repo, ex) = setup().await;
        for key in ["a", "b", "c"] {
            repo.append_field(FieldKind::Header, &KeyValue::new(ex.id, key, "1")).await.unwrap();
        }
        let fields = repo.list_fields(FieldKind::Header, &ex.id).await.unwrap();
        assert_eq!(keys(&fields), ["a", "b", "c"]);

        repo.move_field(FieldKind::Header, &fields[2].id, &fields[0].id, MovePosition::Before)
            .await
            .unwrap();
        let moved = repo.list_fields(FieldKind::Header, &ex.id).await.unwrap();
        assert_eq!(keys(&moved), ["c", "a", "b"]);

        repo.delete_field(FieldKind::Header, &moved[1].id).await.unwrap();
        let remaining = repo.list_fields(FieldKind::Header, &ex.id).await.unwrap();
        assert_eq!(keys(&remaining), ["c", "b"]);
        check_well_formed(&remaining).unwrap();
    }

    #[tokio::test]
    async fn field_families_are_separate_lists() {
        let (repo, ex) = setup().await;
        repo.append_field(FieldKind::Header, &KeyValue::new(ex.id, "h", "1")).await.unwrap();
        repo.append_field(FieldKind::Query, &KeyValue::new(ex.id, "q", "1")).await.unwrap();
        assert_eq!(keys(&repo.list_fields(FieldKind::Header, &ex.id).await.unwrap()), ["h"]);
        assert_eq!(keys(&repo.list_fields(FieldKind::Query, &ex.id).await.unwrap()), ["q"]);
        assert!(repo.list_fields(FieldKind::Form, &ex.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bulk_append_links_after_the_tail() {
        let (repo, ex) = setup().await;
        repo.append_field(FieldKind::Query, &KeyValue::new(ex.id, "first", "1")).await.unwrap();
        let batch: Vec<KeyValue> = ["x", "y", "z"].iter().map(|k| KeyValue::new(ex.id, *k, "v")).collect();
        let created = repo.bulk_append_fields(FieldKind::Query, &ex.id, &batch).await.unwrap();
        assert_eq!(keys(&created), ["x", "y", "z"]);

        let all = repo.list_fields(FieldKind::Query, &ex.id).await.unwrap();
        assert_eq!(keys(&all), ["first", "x", "y", "z"]);
        check_well_formed(&all).unwrap();
    }

    #[tokio::test]
    async fn update_field_keeps_links() {
        let (repo, ex) = setup().await;
        let a = repo.append_field(FieldKind::Header, &KeyValue::new(ex.id, "a", "1")).await.unwrap();
        let b = repo.append_field(FieldKind::Header, &KeyValue::new(ex.id, "b", "1")).await.unwrap();

        let mut edit = a.clone();
        edit.value = "2".into();
        edit.next = None;
        let updated = repo.update_field(FieldKind::Header, &edit).await.unwrap();
        assert_eq!(updated.value, "2");
        assert_eq!(updated.next, Some(b.id));
    }

    #[tokio::test]
    async fn asserts_round_trip_their_condition() {
        let (repo, ex) = setup().await;
        let condition = AssertCondition::predicate(AssertKind::Equal, "response.status", "200");
        let created = repo.append_assert(&Assertion::new(ex.id, condition.clone())).await.unwrap();
        let listed = repo.list_asserts(&ex.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].condition, condition);

        repo.delete_assert(&created.id).await.unwrap();
        assert!(repo.list_asserts(&ex.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn raw_body_is_upserted() {
        let (repo, ex) = setup().await;
        assert!(repo.get_raw_body(&ex.id).await.unwrap().is_none());
        let mut body = RawBody {
            example_id: ex.id,
            data: b"{}".to_vec(),
            visualize_mode: "json".into(),
            compress: "none".into(),
        };
        repo.put_raw_body(&body).await.unwrap();
        body.data = b"{\"a\":1}".to_vec();
        repo.put_raw_body(&body).await.unwrap();
        assert_eq!(repo.get_raw_body(&ex.id).await.unwrap().unwrap().data, body.data);
    }
}
