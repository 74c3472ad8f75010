//! Caller identity.

use std::time::Instant;

use axum::extract::State;

use apiflow_core::repository::WorkspaceRepository;
use apiflow_types::workspace::User;

use super::found;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::{ApiResult, ok};
use crate::state::AppState;

/// GET /api/v1/me
pub async fn me(State(state): State<AppState>, auth: Authenticated) -> ApiResult<User> {
    let start = Instant::now();
    let user = state.workspace_service.repo().get_user(&auth.user_id).await?;
    let user = found(user, format!("user {}", auth.user_id))?;
    Ok(ok(user, start))
}
