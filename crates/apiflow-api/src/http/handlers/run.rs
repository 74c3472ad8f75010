//! Flow runs and live workspace channels over Server-Sent Events.
//!
//! `POST /flows/{id}/run` streams one run:
//! - `node`: a node status transition (`NODE_STARTED`, `NODE_RUNNING`,
//!   `NODE_SUCCESS`, `NODE_FAILED`)
//! - `finished`: the terminal event with the run outcome
//! - `summary`: final variables and error, sent once the run task ends
//!
//! Closing the connection drops the event receiver, which cancels the run.

use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use tokio::sync::broadcast::error::RecvError;

use apiflow_infra::sqlite::Owned;
use apiflow_types::event::FlowEvent;
use apiflow_types::id::{FlowId, RunId, WorkspaceId};

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::{ApiResult, ok};
use crate::state::AppState;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

fn event_name(event: &FlowEvent) -> &'static str {
    match event {
        FlowEvent::Node { .. } => "node",
        FlowEvent::Finished { .. } => "finished",
    }
}

/// POST /api/v1/flows/{id}/run
pub async fn run_flow(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FlowId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    auth.require(&state, Owned::Flow(id)).await?;
    let handle = state.flow_service.run(&id).await?;
    let run_id = handle.run_id;
    let (mut events, join) = handle.into_parts();

    let stream = async_stream::stream! {
        yield Ok::<_, Infallible>(
            Event::default()
                .event("run")
                .data(serde_json::json!({ "run_id": run_id, "flow_id": id }).to_string()),
        );

        while let Some(event) = events.recv().await {
            let name = event_name(&event);
            match serde_json::to_string(&event) {
                Ok(data) => yield Ok(Event::default().event(name).data(data)),
                Err(e) => tracing::warn!(run_id = %run_id, error = %e, "flow event not serializable"),
            }
        }

        match join.await {
            Ok(summary) => {
                let data = serde_json::to_string(&summary).unwrap_or_else(|_| "{}".to_string());
                yield Ok(Event::default().event("summary").data(data));
            }
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "flow run task failed");
                let data = serde_json::json!({ "error": e.to_string() });
                yield Ok(Event::default().event("error").data(data.to_string()));
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE)))
}

/// POST /api/v1/flows/{id}/runs/{run_id}/cancel
pub async fn cancel_run(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, run_id)): Path<(FlowId, RunId)>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Flow(id)).await?;
    let canceled = state.flow_service.cancel(&run_id);
    if canceled {
        tracing::info!(flow_id = %id, run_id = %run_id, user_id = %auth.user_id, "flow run canceled");
    }
    Ok(ok(serde_json::json!({ "run_id": run_id, "canceled": canceled }), start))
}

/// GET /api/v1/workspaces/{id}/logs - The workspace's log channel.
pub async fn stream_logs(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<WorkspaceId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    auth.require(&state, Owned::Workspace(id)).await?;
    let mut rx = state.logs.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(entry) if entry.workspace_id == id => {
                    if let Ok(data) = serde_json::to_string(&entry) {
                        yield Ok::<_, Infallible>(Event::default().event("log").data(data));
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(workspace_id = %id, skipped, "log subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE)))
}

/// GET /api/v1/workspaces/{id}/sync - Committed changes, one event per
/// topic batch.
pub async fn stream_sync(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<WorkspaceId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    auth.require(&state, Owned::Workspace(id)).await?;
    let mut rx = state.sync.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(batch) if batch.workspace_id == id => {
                    if let Ok(data) = serde_json::to_string(&batch) {
                        yield Ok::<_, Infallible>(Event::default().event("sync").data(data));
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(workspace_id = %id, skipped, "sync subscriber lagged");
                    let data = serde_json::json!({ "skipped": skipped });
                    yield Ok(Event::default().event("resync").data(data.to_string()));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE)))
}
