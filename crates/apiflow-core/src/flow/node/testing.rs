//! In-memory collaborators for runtime tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use apiflow_types::assertion::AssertCondition;
use apiflow_types::error::{CodedError, ErrorCode, RepositoryError};
use apiflow_types::event::FlowEvent;
use apiflow_types::flow::{FlowEdge, FlowNode, NodeExecution, NodeState};
use apiflow_types::http::{HttpRequest, HttpResponse};
use apiflow_types::id::{AssertId, RunId, WorkspaceId};
use apiflow_types::response::CapturedResponse;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::assertion::AssertionEvaluator;
use crate::flow::context::{EventSink, FlowNodeRequest};
use crate::flow::error::ScriptError;
use crate::flow::graph::FlowGraph;
use crate::flow::ports::{
    BoxFuture, ExampleResolver, ExecutionRecorder, HttpExecutor, PreparedRequest, RequestTarget,
    RuntimeServices, ScriptEngine,
};
use crate::flow::varmap::VarMap;
use crate::request::{ResolvedBody, ResolvedExample};

/// Resolves every target to `GET {url}` with the given asserts.
pub struct FakeResolver {
    pub url: String,
    pub asserts: Vec<(AssertId, AssertCondition)>,
}

impl FakeResolver {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            asserts: Vec::new(),
        }
    }
}

impl ExampleResolver for FakeResolver {
    fn resolve<'a>(&'a self, target: &'a RequestTarget) -> BoxFuture<'a, Result<PreparedRequest, CodedError>> {
        Box::pin(async move {
            Ok(PreparedRequest {
                example_id: target.example_id.unwrap_or_default(),
                example: ResolvedExample {
                    method: "GET".into(),
                    url: self.url.clone(),
                    headers: vec![],
                    queries: vec![],
                    body: ResolvedBody::None,
                },
                asserts: self.asserts.clone(),
            })
        })
    }
}

/// Answers with a fixed JSON body after `delay`, counting calls.
pub struct FakeHttp {
    pub status: u16,
    pub body: Value,
    pub delay: Duration,
    pub calls: Mutex<Vec<HttpRequest>>,
}

impl FakeHttp {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::ok(json!({}))
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl HttpExecutor for FakeHttp {
    fn execute<'a>(
        &'a self,
        request: &'a HttpRequest,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<HttpResponse, CodedError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(request.clone());
            if self.delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(CodedError::new(ErrorCode::Timeout, "deadline elapsed"));
            }
            tokio::time::sleep(self.delay).await;
            Ok(HttpResponse {
                status: self.status,
                headers: vec![("Content-Type".into(), "application/json".into())],
                body: serde_json::to_vec(&self.body).unwrap(),
                duration_ms: self.delay.as_millis() as u64,
            })
        })
    }
}

/// Understands two scripts: `fail` and `set <key> <json>`.
pub struct FakeScripts;

impl ScriptEngine for FakeScripts {
    fn run<'a>(&'a self, code: &'a str, vars: VarMap, _timeout: Duration) -> BoxFuture<'a, Result<Value, ScriptError>> {
        Box::pin(async move {
            let mut parts = code.splitn(3, ' ');
            match (parts.next(), parts.next(), parts.next()) {
                (Some("fail"), _, _) => Err(ScriptError::Runtime("boom".into())),
                (Some("set"), Some(key), Some(raw)) => {
                    let value: Value = serde_json::from_str(raw).map_err(|e| ScriptError::Syntax(e.to_string()))?;
                    vars.set(key, value.clone());
                    Ok(value)
                }
                _ => Ok(Value::Null),
            }
        })
    }
}

#[derive(Default)]
pub struct MemoryRecorder {
    pub executions: Mutex<Vec<NodeExecution>>,
    pub responses: Mutex<Vec<CapturedResponse>>,
}

impl MemoryRecorder {
    pub fn executions(&self) -> Vec<NodeExecution> {
        self.executions.lock().unwrap().clone()
    }

    pub fn named(&self, prefix: &str) -> Vec<NodeExecution> {
        self.executions()
            .into_iter()
            .filter(|e| e.name.starts_with(prefix))
            .collect()
    }

    pub fn count(&self, state: NodeState) -> usize {
        self.executions().iter().filter(|e| e.state == state).count()
    }
}

impl ExecutionRecorder for MemoryRecorder {
    fn record_execution<'a>(&'a self, execution: &'a NodeExecution) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(async move {
            self.executions.lock().unwrap().push(execution.clone());
            Ok(())
        })
    }

    fn record_response<'a>(&'a self, captured: &'a CapturedResponse) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(async move {
            self.responses.lock().unwrap().push(captured.clone());
            Ok(())
        })
    }
}

pub struct Harness {
    pub http: Arc<FakeHttp>,
    pub recorder: Arc<MemoryRecorder>,
    pub services: Arc<RuntimeServices>,
}

impl Harness {
    pub fn new(resolver: FakeResolver, http: FakeHttp) -> Self {
        let http = Arc::new(http);
        let recorder = Arc::new(MemoryRecorder::default());
        let services = Arc::new(RuntimeServices {
            resolver: Arc::new(resolver),
            http: http.clone(),
            scripts: Arc::new(FakeScripts),
            recorder: recorder.clone(),
            assertions: AssertionEvaluator::new(),
            logs: None,
        });
        Self {
            http,
            recorder,
            services,
        }
    }

    pub fn basic() -> Self {
        Self::new(FakeResolver::new("http://api.test/items"), FakeHttp::ok(json!({ "ok": true })))
    }

    /// A node request over `nodes`/`edges`, plus the receiving end of its events.
    pub fn request(
        &self,
        nodes: Vec<FlowNode>,
        edges: Vec<FlowEdge>,
        vars: Value,
    ) -> (FlowNodeRequest, mpsc::Receiver<FlowEvent>) {
        let flow_id = nodes.first().map(|n| n.flow_id).unwrap_or_default();
        let graph = FlowGraph::build(flow_id, nodes, edges).unwrap();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1024);
        let vars = match vars {
            Value::Object(map) => VarMap::from_map(map),
            _ => VarMap::new(),
        };
        let req = FlowNodeRequest {
            run_id: RunId::new(),
            flow_id,
            workspace_id: WorkspaceId::new(),
            graph: Arc::new(graph),
            vars,
            events: EventSink::new(tx, cancel.clone()),
            cancel,
            services: self.services.clone(),
            request_timeout: Duration::from_secs(5),
        };
        (req, rx)
    }
}
