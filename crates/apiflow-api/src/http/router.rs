//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`; `/health` is public.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{delete, get, patch, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers::{
    auth, collection, example, field, flow, overlay, response, run, snapshot, workspace,
};
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/me", get(auth::me))
        // Workspaces and membership
        .route(
            "/workspaces",
            get(workspace::list_workspaces).post(workspace::create_workspace),
        )
        .route(
            "/workspaces/{id}",
            get(workspace::get_workspace)
                .put(workspace::update_workspace)
                .delete(workspace::delete_workspace),
        )
        .route("/workspaces/{id}/members", post(workspace::add_member))
        // Environments
        .route(
            "/workspaces/{id}/environments",
            get(workspace::list_environments).post(workspace::create_environment),
        )
        .route(
            "/environments/{id}",
            put(workspace::update_environment).delete(workspace::delete_environment),
        )
        .route("/environments/{id}/activate", post(workspace::activate_environment))
        .route(
            "/environments/{id}/variables",
            get(workspace::list_variables).post(workspace::create_variable),
        )
        .route(
            "/environments/{id}/variables/{var_id}",
            put(workspace::update_variable).delete(workspace::delete_variable),
        )
        // Collections
        .route(
            "/workspaces/{id}/collections",
            get(collection::list_collections).post(collection::create_collection),
        )
        .route(
            "/collections/{id}",
            put(collection::update_collection).delete(collection::delete_collection),
        )
        .route("/collections/{id}/items", get(collection::list_items))
        .route("/items/{id}/move", post(collection::move_item))
        .route("/collections/{id}/folders", post(collection::create_folder))
        .route(
            "/folders/{id}",
            put(collection::update_folder).delete(collection::delete_folder),
        )
        .route(
            "/collections/{id}/endpoints",
            get(collection::list_endpoints).post(collection::create_endpoint),
        )
        .route(
            "/endpoints/{id}",
            get(collection::get_endpoint)
                .put(collection::update_endpoint)
                .delete(collection::delete_endpoint),
        )
        // Examples
        .route(
            "/endpoints/{id}/examples",
            get(example::list_examples).post(example::create_example),
        )
        .route(
            "/examples/{id}",
            get(example::get_example)
                .put(example::update_example)
                .delete(example::delete_example),
        )
        .route("/examples/{id}/default", post(example::set_default_example))
        .route("/examples/{id}/deltas", post(example::create_delta))
        .route(
            "/examples/{id}/body",
            get(example::get_raw_body).put(example::put_raw_body),
        )
        .route("/examples/{id}/curl", get(example::export_curl))
        .route("/examples/{id}/responses", get(example::list_responses))
        // Example rows
        .route(
            "/examples/{id}/fields/{kind}",
            get(field::list_fields).post(field::append_field),
        )
        .route("/examples/{id}/fields/{kind}/bulk", post(field::bulk_append_fields))
        .route(
            "/fields/{kind}/{id}",
            put(field::update_field).delete(field::delete_field),
        )
        .route("/fields/{kind}/{id}/move", post(field::move_field))
        .route(
            "/examples/{id}/asserts",
            get(field::list_asserts).post(field::append_assert),
        )
        .route(
            "/examples/{id}/asserts/{assert_id}",
            put(field::update_assert).delete(field::delete_assert),
        )
        .route("/examples/{id}/asserts/{assert_id}/move", post(field::move_assert))
        // Delta overlays
        .route(
            "/examples/{id}/delta/{kind}",
            get(overlay::list_kv).post(overlay::create_kv),
        )
        .route(
            "/examples/{id}/delta/{kind}/{item_id}",
            patch(overlay::update_kv).delete(overlay::delete_kv),
        )
        .route("/examples/{id}/delta/{kind}/{item_id}/reset", post(overlay::reset_kv))
        .route("/examples/{id}/delta/{kind}/{item_id}/restore", post(overlay::restore_kv))
        .route("/examples/{id}/delta/{kind}/{item_id}/move", post(overlay::move_kv))
        .route(
            "/examples/{id}/delta-asserts",
            get(overlay::list_asserts).post(overlay::create_assert),
        )
        .route(
            "/examples/{id}/delta-asserts/{item_id}",
            patch(overlay::update_assert).delete(overlay::delete_assert),
        )
        .route("/examples/{id}/delta-asserts/{item_id}/reset", post(overlay::reset_assert))
        .route("/examples/{id}/delta-asserts/{item_id}/restore", post(overlay::restore_assert))
        .route("/examples/{id}/delta-asserts/{item_id}/move", post(overlay::move_assert))
        // Responses
        .route("/responses/{id}", get(response::get_response))
        // Flows
        .route(
            "/workspaces/{id}/flows",
            get(flow::list_flows).post(flow::create_flow),
        )
        .route(
            "/flows/{id}",
            get(flow::get_flow).put(flow::update_flow).delete(flow::delete_flow),
        )
        .route(
            "/flows/{id}/variables",
            get(flow::list_flow_variables).post(flow::create_flow_variable),
        )
        .route(
            "/flows/{id}/variables/{var_id}",
            put(flow::update_flow_variable).delete(flow::delete_flow_variable),
        )
        .route("/flows/{id}/nodes", get(flow::list_nodes).post(flow::create_node))
        .route("/nodes/{id}", put(flow::update_node).delete(flow::delete_node))
        .route("/nodes/{id}/executions", get(flow::list_node_executions))
        .route("/flows/{id}/edges", get(flow::list_edges).post(flow::create_edge))
        .route("/edges/{id}", delete(flow::delete_edge))
        .route("/flows/{id}/executions", get(flow::list_executions))
        .route("/flows/{id}/summary", get(flow::execution_summary))
        // Runs and live channels
        .route("/flows/{id}/run", post(run::run_flow))
        .route("/flows/{id}/runs/{run_id}/cancel", post(run::cancel_run))
        .route("/workspaces/{id}/logs", get(run::stream_logs))
        .route("/workspaces/{id}/sync", get(run::stream_sync))
        // Snapshots
        .route("/workspaces/{id}/export", post(snapshot::export_workspace))
        .route("/import", post(snapshot::import_workspace));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
