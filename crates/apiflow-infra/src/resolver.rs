//! Storage-backed runtime ports: loading what a request node should send,
//! and persisting what a run produces.

use apiflow_core::flow::{BoxFuture, ExampleResolver, ExecutionRecorder, PreparedRequest, RequestTarget};
use apiflow_core::repository::{
    CollectionRepository, DeltaOverlay, ExampleRepository, FlowRepository, ResponseRepository,
};
use apiflow_core::request::{ResolvedBody, ResolvedExample};
use apiflow_types::assertion::AssertCondition;
use apiflow_types::collection::{BodyKind, Example, FieldKind, KeyValue};
use apiflow_types::error::{CodedError, ErrorCode, RepositoryError};
use apiflow_types::flow::NodeExecution;
use apiflow_types::id::{AssertId, ExampleId};
use apiflow_types::overlay::KeyValueFields;
use apiflow_types::response::CapturedResponse;

use crate::sqlite::{
    DatabasePool, SqliteAssertOverlay, SqliteCollectionRepository, SqliteExampleRepository,
    SqliteFlowRepository, SqliteKeyValueOverlay, SqliteResponseRepository,
};

fn load_failed(cause: impl std::fmt::Display) -> CodedError {
    CodedError::new(ErrorCode::Unexpected, "could not load the request").with_cause(cause)
}

fn missing(what: &str) -> CodedError {
    CodedError::new(ErrorCode::Unexpected, format!("{what} not found"))
}

fn plain(kv: KeyValue) -> KeyValueFields {
    KeyValueFields {
        key: kv.key,
        value: kv.value,
        description: kv.description,
        enabled: kv.enabled,
    }
}

/// Effective rows of one example before the body is chosen.
struct Rows {
    headers: Vec<KeyValueFields>,
    queries: Vec<KeyValueFields>,
    url_encoded: Vec<KeyValueFields>,
    form: Vec<KeyValueFields>,
    asserts: Vec<(AssertId, AssertCondition)>,
}

/// Resolves request targets from SQLite. Delta examples are read through
/// their overlays, so unseeded deltas get seeded on first run.
pub struct SqliteExampleResolver {
    collections: SqliteCollectionRepository,
    examples: SqliteExampleRepository,
    headers: SqliteKeyValueOverlay,
    queries: SqliteKeyValueOverlay,
    url_encoded: SqliteKeyValueOverlay,
    asserts: SqliteAssertOverlay,
}

impl SqliteExampleResolver {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            collections: SqliteCollectionRepository::new(pool.clone()),
            examples: SqliteExampleRepository::new(pool.clone()),
            headers: SqliteKeyValueOverlay::headers(pool.clone()),
            queries: SqliteKeyValueOverlay::queries(pool.clone()),
            url_encoded: SqliteKeyValueOverlay::url_encoded(pool.clone()),
            asserts: SqliteAssertOverlay::new(pool),
        }
    }

    async fn prepare(&self, target: &RequestTarget) -> Result<PreparedRequest, CodedError> {
        let endpoint_id = target
            .endpoint_id
            .ok_or_else(|| CodedError::new(ErrorCode::Unexpected, "request node has no endpoint"))?;
        let base = self
            .collections
            .get_endpoint(&endpoint_id)
            .await
            .map_err(load_failed)?
            .ok_or_else(|| missing("endpoint"))?;

        let (method, url) = match target.delta_endpoint_id {
            Some(id) => {
                let delta = self
                    .collections
                    .get_endpoint(&id)
                    .await
                    .map_err(load_failed)?
                    .ok_or_else(|| missing("delta endpoint"))?;
                delta.inherit_from(Some(&base))
            }
            None => {
                let parent = match base.delta_parent_id {
                    Some(id) => self.collections.get_endpoint(&id).await.map_err(load_failed)?,
                    None => None,
                };
                base.inherit_from(parent.as_ref())
            }
        };

        let base_example = match target.example_id {
            Some(id) => self.examples.get_example(&id).await.map_err(load_failed)?,
            None => self
                .examples
                .list_examples(&endpoint_id)
                .await
                .map_err(load_failed)?
                .into_iter()
                .find(|e| e.is_default),
        }
        .ok_or_else(|| missing("example"))?;

        let example = match target.delta_example_id {
            Some(id) => self
                .examples
                .get_example(&id)
                .await
                .map_err(load_failed)?
                .ok_or_else(|| missing("delta example"))?,
            None => base_example,
        };

        let rows = match example.version_parent_id {
            Some(origin) => self.overlay_rows(&example, &origin).await?,
            None => self.own_rows(&example.id).await?,
        };

        let body = match example.body_kind {
            BodyKind::None => ResolvedBody::None,
            BodyKind::Raw => {
                let raw = match self.examples.get_raw_body(&example.id).await.map_err(load_failed)? {
                    Some(raw) => Some(raw),
                    None => match example.version_parent_id {
                        Some(parent) => self.examples.get_raw_body(&parent).await.map_err(load_failed)?,
                        None => None,
                    },
                };
                ResolvedBody::Raw(raw.map(|r| r.data).unwrap_or_default())
            }
            BodyKind::Form => ResolvedBody::Form(rows.form),
            BodyKind::UrlEncoded => ResolvedBody::UrlEncoded(rows.url_encoded),
        };

        tracing::debug!(
            example_id = %example.id,
            delta = example.version_parent_id.is_some(),
            headers = rows.headers.len(),
            asserts = rows.asserts.len(),
            "request resolved"
        );
        Ok(PreparedRequest {
            example_id: example.id,
            example: ResolvedExample {
                method,
                url,
                headers: rows.headers,
                queries: rows.queries,
                body,
            },
            asserts: rows.asserts,
        })
    }

    async fn own_rows(&self, example_id: &ExampleId) -> Result<Rows, CodedError> {
        let mut lists = Vec::with_capacity(FieldKind::ALL.len());
        for kind in FieldKind::ALL {
            let rows = self.examples.list_fields(kind, example_id).await.map_err(load_failed)?;
            lists.push(rows.into_iter().map(plain).collect::<Vec<_>>());
        }
        let asserts = self
            .examples
            .list_asserts(example_id)
            .await
            .map_err(load_failed)?
            .into_iter()
            .filter(|a| a.enabled)
            .map(|a| (a.id, a.condition))
            .collect();
        let mut lists = lists.into_iter();
        Ok(Rows {
            headers: lists.next().unwrap_or_default(),
            queries: lists.next().unwrap_or_default(),
            url_encoded: lists.next().unwrap_or_default(),
            form: lists.next().unwrap_or_default(),
            asserts,
        })
    }

    async fn overlay_rows(&self, delta: &Example, origin: &ExampleId) -> Result<Rows, CodedError> {
        let effective = |items: Vec<apiflow_types::overlay::OverlayItem<KeyValueFields>>| {
            items.into_iter().map(|i| i.fields).collect::<Vec<_>>()
        };
        let headers = effective(self.headers.list(&delta.id, origin).await.map_err(load_failed)?);
        let queries = effective(self.queries.list(&delta.id, origin).await.map_err(load_failed)?);
        let url_encoded = effective(self.url_encoded.list(&delta.id, origin).await.map_err(load_failed)?);
        let asserts = self
            .asserts
            .list(&delta.id, origin)
            .await
            .map_err(load_failed)?
            .into_iter()
            .filter(|i| i.fields.enabled)
            .map(|i| (AssertId(i.item_id), i.fields.condition))
            .collect();
        // Multipart fields are not overlayed; the delta keeps its own rows.
        let form = self
            .examples
            .list_fields(FieldKind::Form, &delta.id)
            .await
            .map_err(load_failed)?
            .into_iter()
            .map(plain)
            .collect();
        Ok(Rows {
            headers,
            queries,
            url_encoded,
            form,
            asserts,
        })
    }
}

impl ExampleResolver for SqliteExampleResolver {
    fn resolve<'a>(&'a self, target: &'a RequestTarget) -> BoxFuture<'a, Result<PreparedRequest, CodedError>> {
        Box::pin(self.prepare(target))
    }
}

/// Writes node executions and captured responses.
pub struct SqliteExecutionRecorder {
    flows: SqliteFlowRepository,
    responses: SqliteResponseRepository,
}

impl SqliteExecutionRecorder {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            flows: SqliteFlowRepository::new(pool.clone()),
            responses: SqliteResponseRepository::new(pool),
        }
    }
}

impl ExecutionRecorder for SqliteExecutionRecorder {
    fn record_execution<'a>(&'a self, execution: &'a NodeExecution) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(self.flows.record_execution(execution))
    }

    fn record_response<'a>(&'a self, captured: &'a CapturedResponse) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(self.responses.save_response(captured))
    }
}
