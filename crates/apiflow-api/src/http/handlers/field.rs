//! Ordered example rows: headers, queries, body fields and assertions.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;

use apiflow_core::repository::ExampleRepository;
use apiflow_infra::sqlite::Owned;
use apiflow_types::assertion::AssertCondition;
use apiflow_types::collection::{Assertion, FieldKind, KeyValue};
use apiflow_types::id::{AssertId, ExampleId, FieldId};

use super::collection::MoveBody;
use super::found;
use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::{ApiResult, ok};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FieldBody {
    pub key: Option<String>,
    pub value: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AssertBody {
    pub condition: Option<AssertCondition>,
    pub enabled: Option<bool>,
}

fn new_field(example_id: ExampleId, body: FieldBody) -> Result<KeyValue, AppError> {
    let key = body.key.unwrap_or_default();
    if key.trim().is_empty() {
        return Err(AppError::Validation("field key cannot be empty".into()));
    }
    let mut field = KeyValue::new(example_id, key, body.value.unwrap_or_default());
    field.description = body.description.unwrap_or_default();
    field.enabled = body.enabled.unwrap_or(true);
    Ok(field)
}

/// GET /api/v1/examples/{id}/fields/{kind}
pub async fn list_fields(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, kind)): Path<(ExampleId, FieldKind)>,
) -> ApiResult<Vec<KeyValue>> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    Ok(ok(state.examples.list_fields(kind, &id).await?, start))
}

/// POST /api/v1/examples/{id}/fields/{kind} - Append a row at the tail.
pub async fn append_field(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, kind)): Path<(ExampleId, FieldKind)>,
    Json(body): Json<FieldBody>,
) -> ApiResult<KeyValue> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    let field = new_field(id, body)?;
    Ok(ok(state.examples.append_field(kind, &field).await?, start))
}

/// POST /api/v1/examples/{id}/fields/{kind}/bulk - Append several rows in
/// one transaction, in the order given.
pub async fn bulk_append_fields(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, kind)): Path<(ExampleId, FieldKind)>,
    Json(body): Json<Vec<FieldBody>>,
) -> ApiResult<Vec<KeyValue>> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    let fields = body
        .into_iter()
        .map(|b| new_field(id, b))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ok(state.examples.bulk_append_fields(kind, &id, &fields).await?, start))
}

/// PUT /api/v1/fields/{kind}/{id}
pub async fn update_field(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((kind, id)): Path<(FieldKind, FieldId)>,
    Json(body): Json<FieldBody>,
) -> ApiResult<KeyValue> {
    let start = Instant::now();
    auth.require(&state, Owned::Field(kind, id)).await?;
    let mut field = found(state.examples.get_field(kind, &id).await?, format!("{} {id}", kind.as_str()))?;
    if let Some(key) = body.key {
        if key.trim().is_empty() {
            return Err(AppError::Validation("field key cannot be empty".into()));
        }
        field.key = key;
    }
    if let Some(value) = body.value {
        field.value = value;
    }
    if let Some(description) = body.description {
        field.description = description;
    }
    if let Some(enabled) = body.enabled {
        field.enabled = enabled;
    }
    Ok(ok(state.examples.update_field(kind, &field).await?, start))
}

/// DELETE /api/v1/fields/{kind}/{id}
pub async fn delete_field(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((kind, id)): Path<(FieldKind, FieldId)>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Field(kind, id)).await?;
    state.examples.delete_field(kind, &id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": id }), start))
}

/// POST /api/v1/fields/{kind}/{id}/move
pub async fn move_field(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((kind, id)): Path<(FieldKind, FieldId)>,
    Json(body): Json<MoveBody<FieldId>>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Field(kind, id)).await?;
    state.examples.move_field(kind, &id, &body.target_id, body.position).await?;
    Ok(ok(serde_json::json!({ "moved": true, "id": id }), start))
}

/// GET /api/v1/examples/{id}/asserts
pub async fn list_asserts(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ExampleId>,
) -> ApiResult<Vec<Assertion>> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    Ok(ok(state.examples.list_asserts(&id).await?, start))
}

/// POST /api/v1/examples/{id}/asserts
pub async fn append_assert(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ExampleId>,
    Json(body): Json<AssertBody>,
) -> ApiResult<Assertion> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    let condition = body
        .condition
        .ok_or_else(|| AppError::Validation("assertion condition is required".into()))?;
    let mut assertion = Assertion::new(id, condition);
    assertion.enabled = body.enabled.unwrap_or(true);
    Ok(ok(state.examples.append_assert(&assertion).await?, start))
}

async fn assert_of(state: &AppState, example_id: &ExampleId, id: &AssertId) -> Result<Assertion, AppError> {
    let existing = state
        .examples
        .list_asserts(example_id)
        .await?
        .into_iter()
        .find(|a| a.id == *id);
    found(existing, format!("assert {id}"))
}

/// PUT /api/v1/examples/{id}/asserts/{assert_id}
pub async fn update_assert(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((example_id, id)): Path<(ExampleId, AssertId)>,
    Json(body): Json<AssertBody>,
) -> ApiResult<Assertion> {
    let start = Instant::now();
    auth.require(&state, Owned::Assert(id)).await?;
    let mut assertion = assert_of(&state, &example_id, &id).await?;
    if let Some(condition) = body.condition {
        assertion.condition = condition;
    }
    if let Some(enabled) = body.enabled {
        assertion.enabled = enabled;
    }
    Ok(ok(state.examples.update_assert(&assertion).await?, start))
}

/// DELETE /api/v1/examples/{id}/asserts/{assert_id}
pub async fn delete_assert(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((example_id, id)): Path<(ExampleId, AssertId)>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Assert(id)).await?;
    assert_of(&state, &example_id, &id).await?;
    state.examples.delete_assert(&id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": id }), start))
}

/// POST /api/v1/examples/{id}/asserts/{assert_id}/move
pub async fn move_assert(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((example_id, id)): Path<(ExampleId, AssertId)>,
    Json(body): Json<MoveBody<AssertId>>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Assert(id)).await?;
    assert_of(&state, &example_id, &id).await?;
    state.examples.move_assert(&id, &body.target_id, body.position).await?;
    Ok(ok(serde_json::json!({ "moved": true, "id": id }), start))
}
