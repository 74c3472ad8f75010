//! Examples: CRUD, default selection, delta creation, raw bodies, cURL
//! export and captured responses.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use apiflow_core::flow::{ExampleResolver, RequestTarget};
use apiflow_core::repository::{ExampleRepository, ResponseRepository};
use apiflow_core::request::{Substitutions, build_request, to_curl};
use apiflow_core::service::seed_variables;
use apiflow_infra::sqlite::Owned;
use apiflow_types::collection::{BodyKind, Example, RawBody};
use apiflow_types::id::{EndpointId, ExampleId};
use apiflow_types::response::ExampleResponse;

use super::{found, required_name};
use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::extractors::query::ResponseListQuery;
use crate::http::response::{ApiResult, ok};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExampleBody {
    pub name: Option<String>,
    pub body_kind: Option<BodyKind>,
    pub is_default: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DeltaBody {
    pub name: String,
}

/// Raw body as sent over JSON: UTF-8 text rather than a byte array.
#[derive(Debug, Serialize, Deserialize)]
pub struct RawBodyView {
    pub data: String,
    #[serde(default = "text_mode")]
    pub visualize_mode: String,
    #[serde(default = "no_compression")]
    pub compress: String,
}

fn text_mode() -> String {
    "text".to_string()
}

fn no_compression() -> String {
    "none".to_string()
}

#[derive(Debug, Serialize)]
pub struct CurlView {
    pub example_id: ExampleId,
    pub curl: String,
}

async fn load_example(state: &AppState, id: &ExampleId) -> Result<Example, AppError> {
    found(state.examples.get_example(id).await?, format!("example {id}"))
}

/// GET /api/v1/endpoints/{id}/examples
pub async fn list_examples(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<EndpointId>,
) -> ApiResult<Vec<Example>> {
    let start = Instant::now();
    auth.require(&state, Owned::Endpoint(id)).await?;
    Ok(ok(state.examples.list_examples(&id).await?, start))
}

/// POST /api/v1/endpoints/{id}/examples
pub async fn create_example(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<EndpointId>,
    Json(body): Json<ExampleBody>,
) -> ApiResult<Example> {
    let start = Instant::now();
    auth.require(&state, Owned::Endpoint(id)).await?;
    let example = Example {
        id: ExampleId::new(),
        endpoint_id: id,
        name: required_name(body.name.as_deref().unwrap_or_default(), "example")?,
        is_default: body.is_default.unwrap_or(false),
        body_kind: body.body_kind.unwrap_or_default(),
        version_parent_id: None,
        prev: None,
        next: None,
        created_at: Utc::now(),
    };
    let example = state.examples.create_example(&example).await?;
    let href = format!("/api/v1/examples/{}", example.id);
    let Json(resp) = ok(example, start);
    Ok(Json(resp.with_link("self", &href).with_link("curl", &format!("{href}/curl"))))
}

/// GET /api/v1/examples/{id}
pub async fn get_example(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ExampleId>,
) -> ApiResult<Example> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    Ok(ok(load_example(&state, &id).await?, start))
}

/// PUT /api/v1/examples/{id}
pub async fn update_example(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ExampleId>,
    Json(body): Json<ExampleBody>,
) -> ApiResult<Example> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    let mut example = load_example(&state, &id).await?;
    if let Some(name) = body.name {
        example.name = required_name(&name, "example")?;
    }
    if let Some(kind) = body.body_kind {
        example.body_kind = kind;
    }
    let example = state.examples.update_example(&example).await?;
    if body.is_default == Some(true) && !example.is_default {
        state.examples.set_default_example(&id).await?;
        return Ok(ok(load_example(&state, &id).await?, start));
    }
    Ok(ok(example, start))
}

/// DELETE /api/v1/examples/{id}
pub async fn delete_example(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ExampleId>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    state.examples.delete_example(&id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": id }), start))
}

/// POST /api/v1/examples/{id}/default
pub async fn set_default_example(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ExampleId>,
) -> ApiResult<Example> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    state.examples.set_default_example(&id).await?;
    Ok(ok(load_example(&state, &id).await?, start))
}

/// POST /api/v1/examples/{id}/deltas - Create a delta example that
/// overlays this one.
pub async fn create_delta(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ExampleId>,
    Json(body): Json<DeltaBody>,
) -> ApiResult<Example> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    let delta = state.example_service.create_delta(&id, &body.name).await?;
    let href = format!("/api/v1/examples/{}", delta.id);
    let Json(resp) = ok(delta, start);
    Ok(Json(
        resp.with_link("self", &href)
            .with_link("headers", &format!("{href}/delta/header"))
            .with_link("asserts", &format!("{href}/delta-asserts")),
    ))
}

/// GET /api/v1/examples/{id}/body
pub async fn get_raw_body(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ExampleId>,
) -> ApiResult<Option<RawBodyView>> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    let body = state.examples.get_raw_body(&id).await?.map(|raw| RawBodyView {
        data: String::from_utf8_lossy(&raw.data).into_owned(),
        visualize_mode: raw.visualize_mode,
        compress: raw.compress,
    });
    Ok(ok(body, start))
}

/// PUT /api/v1/examples/{id}/body
pub async fn put_raw_body(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ExampleId>,
    Json(body): Json<RawBodyView>,
) -> ApiResult<RawBodyView> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    let stored = state
        .examples
        .put_raw_body(&RawBody {
            example_id: id,
            data: body.data.into_bytes(),
            visualize_mode: body.visualize_mode,
            compress: body.compress,
        })
        .await?;
    Ok(ok(
        RawBodyView {
            data: String::from_utf8_lossy(&stored.data).into_owned(),
            visualize_mode: stored.visualize_mode,
            compress: stored.compress,
        },
        start,
    ))
}

/// GET /api/v1/examples/{id}/curl - The example as a cURL command, with
/// the active environment's variables substituted.
pub async fn export_curl(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ExampleId>,
) -> ApiResult<CurlView> {
    let start = Instant::now();
    let workspace_id = auth.require(&state, Owned::Example(id)).await?;
    let curl = render_curl(&state, &id, &workspace_id).await?;
    Ok(ok(CurlView { example_id: id, curl }, start))
}

/// Resolve the example (through its overlay if it is a delta) and render
/// the request it would send.
pub async fn render_curl(
    state: &AppState,
    id: &ExampleId,
    workspace_id: &apiflow_types::id::WorkspaceId,
) -> Result<String, AppError> {
    let example = load_example(state, id).await?;
    let target = RequestTarget {
        endpoint_id: Some(example.endpoint_id),
        example_id: Some(example.id),
        delta_endpoint_id: None,
        delta_example_id: None,
    };
    let prepared = state.resolver.resolve(&target).await?;
    let vars = state.workspace_service.active_variables(workspace_id).await?;
    let subs = Substitutions::new().with_layer(seed_variables(&vars, &[]));
    let request = build_request(&prepared.example, &subs)?;
    Ok(to_curl(&request))
}

/// GET /api/v1/examples/{id}/responses?limit=
pub async fn list_responses(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ExampleId>,
    Query(query): Query<ResponseListQuery>,
) -> ApiResult<Vec<ExampleResponse>> {
    let start = Instant::now();
    auth.require(&state, Owned::Example(id)).await?;
    let limit = query.limit.clamp(1, 500);
    Ok(ok(state.responses.list_responses(&id, limit).await?, start))
}
