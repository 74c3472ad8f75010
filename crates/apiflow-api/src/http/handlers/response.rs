//! Captured response lookup.

use std::time::Instant;

use axum::extract::{Path, State};

use apiflow_core::repository::ResponseRepository;
use apiflow_infra::sqlite::Owned;
use apiflow_types::id::ResponseId;
use apiflow_types::response::CapturedResponse;

use super::found;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::{ApiResult, ok};
use crate::state::AppState;

/// GET /api/v1/responses/{id} - A response with its headers and assertion
/// outcomes.
pub async fn get_response(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<ResponseId>,
) -> ApiResult<CapturedResponse> {
    let start = Instant::now();
    auth.require(&state, Owned::Response(id)).await?;
    let captured = found(state.responses.get_response(&id).await?, format!("response {id}"))?;
    Ok(ok(captured, start))
}
