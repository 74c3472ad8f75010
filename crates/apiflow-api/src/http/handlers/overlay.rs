//! Delta overlay routes.
//!
//! Key/value kinds live under `/examples/{id}/delta/{kind}`; assertions
//! under `/examples/{id}/delta-asserts`. The origin defaults to the delta
//! example's version parent and may be named with `?origin_id=`.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use uuid::Uuid;

use apiflow_core::overlay::OverlayError;
use apiflow_core::repository::{DeltaOverlay, ExampleRepository};
use apiflow_infra::sqlite::{Owned, SqliteKeyValueOverlay};
use apiflow_types::id::ExampleId;
use apiflow_types::overlay::{AssertFields, AssertPatch, KeyValueFields, KeyValuePatch, OverlayItem, OverlayKind};

use super::collection::MoveBody;
use super::found;
use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::extractors::query::OriginQuery;
use crate::http::response::{ApiResult, ok};
use crate::state::AppState;

/// Check access and settle which example the delta overlays.
async fn delta_origin(
    state: &AppState,
    auth: &Authenticated,
    example_id: ExampleId,
    query: &OriginQuery,
) -> Result<ExampleId, AppError> {
    auth.require(state, Owned::Example(example_id)).await?;
    if let Some(origin) = query.origin_id {
        return Ok(origin);
    }
    let example = found(state.examples.get_example(&example_id).await?, format!("example {example_id}"))?;
    example.version_parent_id.ok_or(AppError::Overlay(OverlayError::NotDelta))
}

fn key_value_store(state: &AppState, kind: OverlayKind) -> Result<&SqliteKeyValueOverlay, AppError> {
    state
        .overlays
        .key_value(kind)
        .ok_or_else(|| AppError::Validation("assertion overlays live under /delta-asserts".into()))
}

async fn move_in<O: DeltaOverlay>(
    store: &O,
    example_id: &ExampleId,
    origin_id: &ExampleId,
    item_id: Uuid,
    body: MoveBody<Uuid>,
) -> Result<(), OverlayError> {
    if item_id == body.target_id {
        return Err(OverlayError::InvalidMove("an item cannot move relative to itself".into()));
    }
    store
        .move_item(example_id, origin_id, item_id, body.target_id, body.position)
        .await
}

/// GET /api/v1/examples/{id}/delta/{kind}
pub async fn list_kv(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, kind)): Path<(ExampleId, OverlayKind)>,
    Query(query): Query<OriginQuery>,
) -> ApiResult<Vec<OverlayItem<KeyValueFields>>> {
    let start = Instant::now();
    let origin = delta_origin(&state, &auth, id, &query).await?;
    let items = key_value_store(&state, kind)?.list(&id, &origin).await?;
    Ok(ok(items, start))
}

/// POST /api/v1/examples/{id}/delta/{kind} - Add a delta-only row.
pub async fn create_kv(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, kind)): Path<(ExampleId, OverlayKind)>,
    Query(query): Query<OriginQuery>,
    Json(fields): Json<KeyValueFields>,
) -> ApiResult<OverlayItem<KeyValueFields>> {
    let start = Instant::now();
    let origin = delta_origin(&state, &auth, id, &query).await?;
    if fields.key.trim().is_empty() {
        return Err(AppError::Validation("field key cannot be empty".into()));
    }
    let item = key_value_store(&state, kind)?.create(&id, &origin, fields).await?;
    Ok(ok(item, start))
}

/// PATCH /api/v1/examples/{id}/delta/{kind}/{item_id} - Edit a delta row,
/// or override an origin row.
pub async fn update_kv(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, kind, item_id)): Path<(ExampleId, OverlayKind, Uuid)>,
    Query(query): Query<OriginQuery>,
    Json(patch): Json<KeyValuePatch>,
) -> ApiResult<OverlayItem<KeyValueFields>> {
    let start = Instant::now();
    let origin = delta_origin(&state, &auth, id, &query).await?;
    let item = key_value_store(&state, kind)?.update(&id, &origin, item_id, patch).await?;
    Ok(ok(item, start))
}

/// POST /api/v1/examples/{id}/delta/{kind}/{item_id}/reset - Drop the
/// override so the origin values show through again.
pub async fn reset_kv(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, kind, item_id)): Path<(ExampleId, OverlayKind, Uuid)>,
    Query(query): Query<OriginQuery>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    let origin = delta_origin(&state, &auth, id, &query).await?;
    key_value_store(&state, kind)?.reset(&id, &origin, item_id).await?;
    Ok(ok(serde_json::json!({ "reset": true, "id": item_id }), start))
}

/// DELETE /api/v1/examples/{id}/delta/{kind}/{item_id} - Remove a delta
/// row, or suppress an origin row.
pub async fn delete_kv(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, kind, item_id)): Path<(ExampleId, OverlayKind, Uuid)>,
    Query(query): Query<OriginQuery>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    let origin = delta_origin(&state, &auth, id, &query).await?;
    key_value_store(&state, kind)?.delete(&id, &origin, item_id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": item_id }), start))
}

/// POST /api/v1/examples/{id}/delta/{kind}/{item_id}/restore
pub async fn restore_kv(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, kind, item_id)): Path<(ExampleId, OverlayKind, Uuid)>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    key_value_store(&state, kind)?.restore(&id, item_id).await?;
    Ok(ok(serde_json::json!({ "restored": true, "id": item_id }), start))
}

/// POST /api/v1/examples/{id}/delta/{kind}/{item_id}/move
pub async fn move_kv(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, kind, item_id)): Path<(ExampleId, OverlayKind, Uuid)>,
    Query(query): Query<OriginQuery>,
    Json(body): Json<MoveBody<Uuid>>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    let origin = delta_origin(&state, &auth, id, &query).await?;
    move_in(key_value_store(&state, kind)?, &id, &origin, item_id, body).await?;
    Ok(ok(serde_json::json!({ "moved": true, "id": item_id }), start))
}

/// GET /api/v1/examples/{id}/delta-asserts
pub async fn list_asserts(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ExampleId>,
    Query(query): Query<OriginQuery>,
) -> ApiResult<Vec<OverlayItem<AssertFields>>> {
    let start = Instant::now();
    let origin = delta_origin(&state, &auth, id, &query).await?;
    Ok(ok(state.overlays.asserts.list(&id, &origin).await?, start))
}

/// POST /api/v1/examples/{id}/delta-asserts
pub async fn create_assert(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ExampleId>,
    Query(query): Query<OriginQuery>,
    Json(fields): Json<AssertFields>,
) -> ApiResult<OverlayItem<AssertFields>> {
    let start = Instant::now();
    let origin = delta_origin(&state, &auth, id, &query).await?;
    Ok(ok(state.overlays.asserts.create(&id, &origin, fields).await?, start))
}

/// PATCH /api/v1/examples/{id}/delta-asserts/{item_id}
pub async fn update_assert(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, item_id)): Path<(ExampleId, Uuid)>,
    Query(query): Query<OriginQuery>,
    Json(patch): Json<AssertPatch>,
) -> ApiResult<OverlayItem<AssertFields>> {
    let start = Instant::now();
    let origin = delta_origin(&state, &auth, id, &query).await?;
    Ok(ok(state.overlays.asserts.update(&id, &origin, item_id, patch).await?, start))
}

/// POST /api/v1/examples/{id}/delta-asserts/{item_id}/reset
pub async fn reset_assert(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, item_id)): Path<(ExampleId, Uuid)>,
    Query(query): Query<OriginQuery>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    let origin = delta_origin(&state, &auth, id, &query).await?;
    state.overlays.asserts.reset(&id, &origin, item_id).await?;
    Ok(ok(serde_json::json!({ "reset": true, "id": item_id }), start))
}

/// DELETE /api/v1/examples/{id}/delta-asserts/{item_id}
pub async fn delete_assert(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, item_id)): Path<(ExampleId, Uuid)>,
    Query(query): Query<OriginQuery>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    let origin = delta_origin(&state, &auth, id, &query).await?;
    state.overlays.asserts.delete(&id, &origin, item_id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": item_id }), start))
}

/// POST /api/v1/examples/{id}/delta-asserts/{item_id}/restore
pub async fn restore_assert(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, item_id)): Path<(ExampleId, Uuid)>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    state.overlays.asserts.restore(&id, item_id).await?;
    Ok(ok(serde_json::json!({ "restored": true, "id": item_id }), start))
}

/// POST /api/v1/examples/{id}/delta-asserts/{item_id}/move
pub async fn move_assert(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, item_id)): Path<(ExampleId, Uuid)>,
    Query(query): Query<OriginQuery>,
    Json(body): Json<MoveBody<Uuid>>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    let origin = delta_origin(&state, &auth, id, &query).await?;
    move_in(&state.overlays.asserts, &id, &origin, item_id, body).await?;
    Ok(ok(serde_json::json!({ "moved": true, "id": item_id }), start))
}
