//! Workspace snapshot export and import.

use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use serde::Serialize;

use apiflow_core::repository::WorkspaceRepository;
use apiflow_infra::sqlite::Owned;
use apiflow_infra::sqlite::snapshot::ImportOptions;
use apiflow_types::id::WorkspaceId;
use apiflow_types::snapshot::{ExportFilter, WorkspaceSnapshot};
use apiflow_types::workspace::WorkspaceRole;

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::extractors::query::ImportQuery;
use crate::http::response::{ApiResult, ok};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ImportView {
    pub workspace_id: WorkspaceId,
    pub remapped: bool,
    pub rows: usize,
}

/// POST /api/v1/workspaces/{id}/export - Body is an optional filter of
/// flow and example ids; an empty filter exports everything.
pub async fn export_workspace(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<WorkspaceId>,
    body: Bytes,
) -> ApiResult<WorkspaceSnapshot> {
    let start = Instant::now();
    auth.require(&state, Owned::Workspace(id)).await?;
    let filter: ExportFilter = if body.iter().all(u8::is_ascii_whitespace) {
        ExportFilter::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::Validation(format!("invalid export filter: {e}")))?
    };
    let snapshot = state.snapshots.export(&id, &filter).await?;
    Ok(ok(snapshot, start))
}

/// POST /api/v1/import?remap=true - Load a snapshot; the caller becomes
/// owner of the imported workspace.
pub async fn import_workspace(
    State(state): State<AppState>,
    auth: Authenticated,
    Query(query): Query<ImportQuery>,
    Json(snapshot): Json<WorkspaceSnapshot>,
) -> ApiResult<ImportView> {
    let start = Instant::now();
    let report = state
        .snapshots
        .import(snapshot, ImportOptions { remap: query.remap })
        .await?;

    let repo = state.workspace_service.repo();
    if repo.member_role(&report.workspace_id, &auth.user_id).await?.is_none() {
        repo.add_member(&report.workspace_id, &auth.user_id, WorkspaceRole::Owner)
            .await?;
    }
    tracing::info!(
        workspace_id = %report.workspace_id,
        user_id = %auth.user_id,
        rows = report.rows,
        remapped = report.remapped,
        "snapshot imported"
    );
    Ok(ok(
        ImportView {
            workspace_id: report.workspace_id,
            remapped: report.remapped,
            rows: report.rows,
        },
        start,
    ))
}
