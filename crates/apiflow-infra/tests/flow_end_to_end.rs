//! A stored flow run end to end: SQLite storage, a local HTTP server,
//! the reqwest executor and the script sandbox.

mod common;

use std::sync::Arc;
use std::time::Duration;

use apiflow_core::assertion::AssertionEvaluator;
use apiflow_core::flow::{FlowRunner, RuntimeServices};
use apiflow_core::repository::{ExampleRepository, FlowRepository, ResponseRepository};
use apiflow_core::service::FlowService;
use apiflow_infra::http::ReqwestExecutor;
use apiflow_infra::resolver::{SqliteExampleResolver, SqliteExecutionRecorder};
use apiflow_infra::script::BoaScriptEngine;
use apiflow_infra::sqlite::{
    DatabasePool, SqliteExampleRepository, SqliteFlowRepository, SqliteResponseRepository,
    SqliteWorkspaceRepository,
};
use apiflow_types::assertion::{AssertCondition, AssertKind};
use apiflow_types::collection::{Assertion, FieldKind, KeyValue};
use apiflow_types::event::RunOutcome;
use apiflow_types::flow::{
    EdgeHandle, ErrorHandling, Flow, FlowEdge, FlowNode, FlowVariable, NodeConfig, NodeState, NoopKind,
};
use apiflow_types::id::{FlowId, FlowVariableId};
use apiflow_types::workspace::Workspace;
use axum::Router;
use axum::extract::Path;
use axum::http::HeaderMap;
use axum::routing::get;
use chrono::Utc;
use common::{endpoint, example, test_db, workspace};
use serde_json::json;

async fn serve() -> String {
    let router = Router::new().route(
        "/users/{id}",
        get(|Path(id): Path<u32>, headers: HeaderMap| async move {
            let token = headers
                .get("x-token")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            axum::Json(json!({ "id": id, "token": token, "name": "ada" }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn service(pool: &DatabasePool) -> FlowService<SqliteFlowRepository, SqliteWorkspaceRepository> {
    let services = RuntimeServices {
        resolver: Arc::new(SqliteExampleResolver::new(pool.clone())),
        http: Arc::new(ReqwestExecutor::new().unwrap()),
        scripts: Arc::new(BoaScriptEngine::new()),
        recorder: Arc::new(SqliteExecutionRecorder::new(pool.clone())),
        assertions: AssertionEvaluator::new(),
        logs: None,
    };
    let runner = FlowRunner::new(Arc::new(services)).with_request_timeout(Duration::from_secs(5));
    FlowService::new(
        SqliteFlowRepository::new(pool.clone()),
        SqliteWorkspaceRepository::new(pool.clone()),
        runner,
        Some(Duration::from_secs(30)),
    )
}

async fn flow(flows: &SqliteFlowRepository, ws: &Workspace) -> Flow {
    flows
        .create_flow(&Flow {
            id: FlowId::new(),
            workspace_id: ws.id,
            name: "lookup".into(),
            timeout_ms: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

async fn variable(flows: &SqliteFlowRepository, flow: &Flow, key: &str, value: &str) {
    flows
        .create_flow_variable(&FlowVariable {
            id: FlowVariableId::new(),
            flow_id: flow.id,
            key: key.into(),
            value: value.into(),
            description: String::new(),
            enabled: true,
        })
        .await
        .unwrap();
}

async fn link(flows: &SqliteFlowRepository, flow: &Flow, from: &FlowNode, to: &FlowNode) {
    flows
        .create_edge(&FlowEdge::new(flow.id, from.id, to.id, EdgeHandle::Unspecified))
        .await
        .unwrap();
}

#[tokio::test]
async fn request_then_script_runs_and_persists_everything() {
    let db = test_db().await;
    let base = serve().await;
    let ws = workspace(&db.pool).await;
    let ep = endpoint(&db.pool, &ws, "GET", "{{ base }}/users/{{ user }}").await;
    let ex = example(&db.pool, ep.id, "default").await;
    let examples = SqliteExampleRepository::new(db.pool.clone());
    examples
        .append_field(FieldKind::Header, &KeyValue::new(ex.id, "X-Token", "{{ token }}"))
        .await
        .unwrap();
    examples
        .append_assert(&Assertion::new(
            ex.id,
            AssertCondition::predicate(AssertKind::Equal, "response.body.name", "ada"),
        ))
        .await
        .unwrap();

    let flows = SqliteFlowRepository::new(db.pool.clone());
    let f = flow(&flows, &ws).await;
    variable(&flows, &f, "base", &base).await;
    variable(&flows, &f, "user", "7").await;
    variable(&flows, &f, "token", "secret-token").await;

    let start = FlowNode::new(f.id, "start", NodeConfig::NoOp { noop_kind: NoopKind::Start });
    let fetch = FlowNode::new(
        f.id,
        "fetch",
        NodeConfig::Request {
            endpoint_id: Some(ep.id),
            example_id: Some(ex.id),
            delta_endpoint_id: None,
            delta_example_id: None,
        },
    );
    let script = FlowNode::new(
        f.id,
        "extract",
        NodeConfig::Js {
            code: r#"
                const res = getVal("fetch").response;
                setVal("user_id", res.body.id);
                setVal("echoed", res.body.token);
                res.status
            "#
            .into(),
        },
    );
    for node in [&start, &fetch, &script] {
        flows.create_node(node).await.unwrap();
    }
    link(&flows, &f, &start, &fetch).await;
    link(&flows, &f, &fetch, &script).await;

    let svc = service(&db.pool);
    let (events, summary) = svc.run(&f.id).await.unwrap().finish().await;
    assert_eq!(summary.outcome, RunOutcome::Completed, "{:?}", summary.error);
    assert!(events.last().unwrap().is_terminal());
    assert_eq!(summary.vars["user_id"], json!(7));
    assert_eq!(summary.vars["echoed"], json!("secret-token"));

    let executions = flows.list_executions(&f.id, Some(summary.run_id)).await.unwrap();
    let fetched = executions.iter().find(|e| e.node_id == fetch.id).unwrap();
    assert_eq!(fetched.state, NodeState::Success);
    let response_id = fetched.response_id.unwrap();
    let extracted = executions.iter().find(|e| e.node_id == script.id).unwrap();
    assert_eq!(extracted.state, NodeState::Success);

    let captured = SqliteResponseRepository::new(db.pool.clone())
        .get_response(&response_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(captured.response.status, 200);
    assert_eq!(captured.response.example_id, ex.id);
    assert_eq!(captured.assert_results.len(), 1);
    assert!(captured.assert_results[0].result);
}

#[tokio::test]
async fn unreachable_host_fails_the_run_with_a_classified_error() {
    let db = test_db().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let ws = workspace(&db.pool).await;
    let ep = endpoint(&db.pool, &ws, "GET", &format!("{closed}/health")).await;
    let ex = example(&db.pool, ep.id, "default").await;

    let flows = SqliteFlowRepository::new(db.pool.clone());
    let f = flow(&flows, &ws).await;
    let start = FlowNode::new(f.id, "start", NodeConfig::NoOp { noop_kind: NoopKind::Start });
    let mut ping = FlowNode::new(
        f.id,
        "ping",
        NodeConfig::Request {
            endpoint_id: Some(ep.id),
            example_id: Some(ex.id),
            delta_endpoint_id: None,
            delta_example_id: None,
        },
    );
    ping.error_handling = ErrorHandling::Break;
    for node in [&start, &ping] {
        flows.create_node(node).await.unwrap();
    }
    link(&flows, &f, &start, &ping).await;

    let svc = service(&db.pool);
    let (_, summary) = svc.run(&f.id).await.unwrap().finish().await;
    assert_eq!(summary.outcome, RunOutcome::Failed);
    let err = summary.error.unwrap();
    assert_eq!(err.code, apiflow_types::error::ErrorCode::ConnectionRefused);

    let executions = flows.list_executions(&f.id, Some(summary.run_id)).await.unwrap();
    let failed = executions.iter().find(|e| e.node_id == ping.id).unwrap();
    assert_eq!(failed.state, NodeState::Failure);
}
