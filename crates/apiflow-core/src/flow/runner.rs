//! Flow runner: spawns runs, fans out nodes, enforces timeouts and
//! cancellation, and reports the terminal outcome.
//!
//! Mirrors the shape of a workflow executor: each run gets its own
//! `CancellationToken` registered in a `DashMap`, nodes run on a `JoinSet`,
//! and every node emits status events on a bounded per-run channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use apiflow_types::error::{CodedError, ErrorCode};
use apiflow_types::event::{FlowEvent, RunOutcome};
use apiflow_types::flow::ErrorHandling;
use apiflow_types::id::{FlowId, NodeId, RunId, WorkspaceId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::context::{EventSink, FlowNodeRequest};
use super::graph::FlowGraph;
use super::node::{FlowNodeResult, execute_node};
use super::ports::RuntimeServices;
use super::varmap::VarMap;

/// Default per-request timeout inside a run.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Default capacity of a run's event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Input for [`FlowRunner::start`].
#[derive(Debug)]
pub struct StartRun {
    pub flow_id: FlowId,
    pub workspace_id: WorkspaceId,
    pub graph: FlowGraph,
    /// Initial variables (environment, then flow variables).
    pub vars: Map<String, Value>,
    /// Whole-run limit. `None` runs until every path ends.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub flow_id: FlowId,
    pub outcome: RunOutcome,
    pub error: Option<CodedError>,
    pub duration_ms: u64,
    /// Variables as they stood when the run ended.
    pub vars: Map<String, Value>,
}

/// A started run: its event stream and its eventual summary.
///
/// Dropping `events` cancels the run.
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: RunId,
    pub events: mpsc::Receiver<FlowEvent>,
    join: JoinHandle<RunSummary>,
}

impl RunHandle {
    /// Drain the event stream and wait for the summary.
    pub async fn finish(mut self) -> (Vec<FlowEvent>, RunSummary) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let summary = match self.join.await {
            Ok(summary) => summary,
            Err(e) => RunSummary {
                run_id: self.run_id,
                flow_id: FlowId::from_uuid(uuid::Uuid::nil()),
                outcome: RunOutcome::Failed,
                error: Some(CodedError::new(ErrorCode::Unexpected, format!("run task failed: {e}"))),
                duration_ms: 0,
                vars: Map::new(),
            },
        };
        (events, summary)
    }

    /// Split into the event stream and the join handle.
    pub fn into_parts(self) -> (mpsc::Receiver<FlowEvent>, JoinHandle<RunSummary>) {
        (self.events, self.join)
    }
}

#[derive(Clone)]
pub struct FlowRunner {
    services: Arc<RuntimeServices>,
    active: Arc<DashMap<RunId, CancellationToken>>,
    event_buffer: usize,
    request_timeout: Duration,
}

impl FlowRunner {
    pub fn new(services: Arc<RuntimeServices>) -> Self {
        Self {
            services,
            active: Arc::new(DashMap::new()),
            event_buffer: DEFAULT_EVENT_BUFFER,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn services(&self) -> &Arc<RuntimeServices> {
        &self.services
    }

    /// Spawn a run and return immediately.
    pub fn start(&self, run: StartRun) -> RunHandle {
        let run_id = RunId::new();
        let cancel = CancellationToken::new();
        self.active.insert(run_id, cancel.clone());

        let (tx, rx) = mpsc::channel(self.event_buffer);
        let req = FlowNodeRequest {
            run_id,
            flow_id: run.flow_id,
            workspace_id: run.workspace_id,
            graph: Arc::new(run.graph),
            vars: VarMap::from_map(run.vars),
            events: EventSink::new(tx, cancel.clone()),
            cancel,
            services: self.services.clone(),
            request_timeout: self.request_timeout,
        };
        let active = self.active.clone();
        let join = tokio::spawn(run_to_end(req, run.timeout, active));

        RunHandle {
            run_id,
            events: rx,
            join,
        }
    }

    /// Request cancellation. Returns false when the run is not active.
    pub fn cancel(&self, run_id: &RunId) -> bool {
        match self.active.get(run_id) {
            Some(token) => {
                tracing::info!(run_id = %run_id, "cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, run_id: &RunId) -> bool {
        self.active.contains_key(run_id)
    }

    pub fn active_runs(&self) -> Vec<RunId> {
        self.active.iter().map(|e| *e.key()).collect()
    }

    /// Cancel every active run. Used on shutdown.
    pub fn cancel_all(&self) {
        for entry in self.active.iter() {
            entry.value().cancel();
        }
    }
}

impl std::fmt::Debug for FlowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRunner")
            .field("active", &self.active.len())
            .field("event_buffer", &self.event_buffer)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

async fn run_to_end(
    req: FlowNodeRequest,
    timeout: Option<Duration>,
    active: Arc<DashMap<RunId, CancellationToken>>,
) -> RunSummary {
    let started = Instant::now();
    tracing::info!(run_id = %req.run_id, flow_id = %req.flow_id, nodes = req.graph.len(), "flow run started");

    let drive = drive(req.clone());
    tokio::pin!(drive);
    let finished = match timeout {
        Some(limit) => {
            let deadline = tokio::time::sleep(limit);
            tokio::pin!(deadline);
            tokio::select! {
                first_err = &mut drive => Some(first_err),
                _ = &mut deadline => None,
            }
        }
        None => Some((&mut drive).await),
    };
    let (first_err, timed_out) = match finished {
        Some(first_err) => (first_err, false),
        None => {
            tracing::warn!(run_id = %req.run_id, "flow run timed out");
            req.cancel.cancel();
            // Let in-flight nodes observe the token and record themselves.
            (drive.await, true)
        }
    };
    active.remove(&req.run_id);

    let (outcome, error) = if timed_out {
        (
            RunOutcome::TimedOut,
            Some(CodedError::new(ErrorCode::Timeout, "flow exceeded its time limit")),
        )
    } else {
        match first_err {
            Some(err) if err.code != ErrorCode::Canceled => (RunOutcome::Failed, Some(err)),
            Some(err) => (RunOutcome::Canceled, Some(err)),
            None if req.cancel.is_cancelled() => (RunOutcome::Canceled, Some(CodedError::canceled())),
            None => (RunOutcome::Completed, None),
        }
    };
    let duration_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        run_id = %req.run_id,
        outcome = ?outcome,
        duration_ms,
        "flow run finished"
    );

    req.events
        .send(FlowEvent::Finished {
            run_id: req.run_id,
            flow_id: req.flow_id,
            outcome,
            error: error.as_ref().map(|e| e.to_string()),
            duration_ms,
        })
        .await;

    RunSummary {
        run_id: req.run_id,
        flow_id: req.flow_id,
        outcome,
        error,
        duration_ms,
        vars: req.vars.snapshot(),
    }
}

fn spawn_node(set: &mut JoinSet<(NodeId, FlowNodeResult)>, req: &FlowNodeRequest, node_id: NodeId) {
    let req = req.clone();
    set.spawn(async move {
        let result = execute_node(&req, node_id).await;
        (node_id, result)
    });
}

/// Run the graph from its start node. Successors of a node are spawned as
/// soon as it finishes, so parallel branches overlap. Siblings are never
/// joined: a node with several incoming edges runs once per activation.
///
/// Returns the first error that ended the run, if any.
async fn drive(req: FlowNodeRequest) -> Option<CodedError> {
    let mut set = JoinSet::new();
    let mut first_err: Option<CodedError> = None;

    spawn_node(&mut set, &req, req.graph.start());

    while let Some(joined) = set.join_next().await {
        let (node_id, result) = match joined {
            Ok(done) => done,
            Err(e) => {
                tracing::error!(run_id = %req.run_id, error = %e, "node task failed");
                first_err.get_or_insert_with(|| CodedError::new(ErrorCode::Unexpected, format!("node task failed: {e}")));
                req.cancel.cancel();
                continue;
            }
        };

        let next = match result.err {
            None => result.next,
            Some(err) => {
                let handling = req
                    .graph
                    .node(&node_id)
                    .map(|n| n.error_handling)
                    .unwrap_or_default();
                if handling == ErrorHandling::Ignore && err.code != ErrorCode::Canceled {
                    req.graph.next(&node_id)
                } else {
                    // Break outside a loop has nothing to break out of and
                    // ends the run like an unhandled failure.
                    first_err.get_or_insert(err);
                    req.cancel.cancel();
                    Vec::new()
                }
            }
        };

        if req.cancel.is_cancelled() {
            continue;
        }
        for id in next {
            spawn_node(&mut set, &req, id);
        }
    }

    first_err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::node::testing::{FakeHttp, FakeResolver, Harness};
    use apiflow_types::assertion::AssertCondition;
    use apiflow_types::event::NodeStatus;
    use apiflow_types::flow::{EdgeHandle, FlowEdge, FlowNode, NodeConfig, NodeState, NoopKind};
    use serde_json::json;

    fn noop(flow: FlowId, name: &str) -> FlowNode {
        FlowNode::new(flow, name, NodeConfig::NoOp { noop_kind: NoopKind::Plain })
    }

    fn start(flow: FlowId) -> FlowNode {
        FlowNode::new(flow, "start", NodeConfig::NoOp { noop_kind: NoopKind::Start })
    }

    fn request_node(flow: FlowId, name: &str) -> FlowNode {
        FlowNode::new(
            flow,
            name,
            NodeConfig::Request {
                endpoint_id: None,
                example_id: None,
                delta_endpoint_id: None,
                delta_example_id: None,
            },
        )
    }

    fn edge(flow: FlowId, from: &FlowNode, to: &FlowNode, handle: EdgeHandle) -> FlowEdge {
        FlowEdge::new(flow, from.id, to.id, handle)
    }

    fn vars(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn run(flow: FlowId, nodes: Vec<FlowNode>, edges: Vec<FlowEdge>, initial: Value) -> StartRun {
        StartRun {
            flow_id: flow,
            workspace_id: WorkspaceId::new(),
            graph: FlowGraph::build(flow, nodes, edges).unwrap(),
            vars: vars(initial),
            timeout: None,
        }
    }

    #[tokio::test]
    async fn for_each_runs_the_body_chain_per_entry() {
        let h = Harness::basic();
        let flow = FlowId::new();
        let s = start(flow);
        let each = FlowNode::new(
            flow,
            "each",
            NodeConfig::ForEach {
                iter_path: "var.hash".into(),
                break_condition: None,
            },
        );
        let (b1, b2, b3) = (noop(flow, "body-1"), noop(flow, "body-2"), noop(flow, "body-3"));
        let edges = vec![
            edge(flow, &s, &each, EdgeHandle::Then),
            edge(flow, &each, &b1, EdgeHandle::Loop),
            edge(flow, &b1, &b2, EdgeHandle::Then),
            edge(flow, &b2, &b3, EdgeHandle::Then),
        ];
        let runner = FlowRunner::new(h.services.clone());
        let handle = runner.start(run(
            flow,
            vec![s, each, b1, b2, b3],
            edges,
            json!({ "hash": { "a": "va", "b": "vb", "c": "vc" } }),
        ));
        let (_, summary) = handle.finish().await;

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(h.recorder.named("body-").len(), 9);
        assert_eq!(h.recorder.named("each iteration").len(), 3);
        // The loop binding does not outlive the loop.
        assert!(!summary.vars.contains_key("each"));
    }

    #[tokio::test]
    async fn for_each_binds_keys_in_insertion_order() {
        let h = Harness::basic();
        let flow = FlowId::new();
        let s = start(flow);
        let each = FlowNode::new(
            flow,
            "item",
            NodeConfig::ForEach {
                iter_path: "hash".into(),
                break_condition: None,
            },
        );
        let body = noop(flow, "body");
        let edges = vec![edge(flow, &s, &each, EdgeHandle::Then), edge(flow, &each, &body, EdgeHandle::Loop)];
        let runner = FlowRunner::new(h.services.clone());
        let (_, summary) = runner
            .start(run(flow, vec![s, each, body], edges, json!({ "hash": { "z": 1, "a": 2 } })))
            .finish()
            .await;
        assert_eq!(summary.outcome, RunOutcome::Completed);

        let keys: Vec<Value> = h
            .recorder
            .named("body")
            .iter()
            .map(|e| e.input_data.as_ref().unwrap()["item"]["key"].clone())
            .collect();
        assert_eq!(keys, vec![json!("z"), json!("a")]);
    }

    #[tokio::test]
    async fn for_loop_stops_on_break_condition() {
        let h = Harness::basic();
        let flow = FlowId::new();
        let s = start(flow);
        let lp = FlowNode::new(
            flow,
            "lp",
            NodeConfig::For {
                iter_count: 10,
                break_condition: Some(AssertCondition::expression("lp.index == 4")),
            },
        );
        let body = noop(flow, "body");
        let after = noop(flow, "after");
        let edges = vec![
            edge(flow, &s, &lp, EdgeHandle::Then),
            edge(flow, &lp, &body, EdgeHandle::Loop),
            edge(flow, &lp, &after, EdgeHandle::Then),
        ];
        let runner = FlowRunner::new(h.services.clone());
        let (_, summary) = runner.start(run(flow, vec![s, lp, body, after], edges, json!({}))).finish().await;

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(h.recorder.named("body").len(), 4);
        assert_eq!(h.recorder.named("after").len(), 1);
    }

    #[tokio::test]
    async fn loop_error_handling_decides_what_happens_after_a_failed_iteration() {
        for (handling, body_runs, outcome) in [
            (ErrorHandling::Ignore, 3, RunOutcome::Completed),
            (ErrorHandling::Break, 1, RunOutcome::Completed),
            (ErrorHandling::Unspecified, 1, RunOutcome::Failed),
        ] {
            let h = Harness::basic();
            let flow = FlowId::new();
            let s = start(flow);
            let mut lp = FlowNode::new(
                flow,
                "lp",
                NodeConfig::For {
                    iter_count: 3,
                    break_condition: None,
                },
            );
            lp.error_handling = handling;
            let body = FlowNode::new(flow, "body", NodeConfig::Js { code: "fail".into() });
            let edges = vec![edge(flow, &s, &lp, EdgeHandle::Then), edge(flow, &lp, &body, EdgeHandle::Loop)];
            let runner = FlowRunner::new(h.services.clone());
            let (_, summary) = runner.start(run(flow, vec![s, lp, body], edges, json!({}))).finish().await;

            assert_eq!(summary.outcome, outcome, "{handling:?}");
            assert_eq!(h.recorder.named("body").len(), body_runs, "{handling:?}");
        }
    }

    #[tokio::test]
    async fn ignored_failure_continues_and_unhandled_failure_stops() {
        let flow = FlowId::new();
        let s = start(flow);
        let mut bad = FlowNode::new(flow, "bad", NodeConfig::Js { code: "fail".into() });
        bad.error_handling = ErrorHandling::Ignore;
        let after = noop(flow, "after");
        let edges = vec![edge(flow, &s, &bad, EdgeHandle::Then), edge(flow, &bad, &after, EdgeHandle::Then)];

        let h = Harness::basic();
        let runner = FlowRunner::new(h.services.clone());
        let (_, summary) = runner
            .start(run(flow, vec![s.clone(), bad.clone(), after.clone()], edges.clone(), json!({})))
            .finish()
            .await;
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(h.recorder.named("after").len(), 1);

        bad.error_handling = ErrorHandling::Unspecified;
        let h = Harness::basic();
        let runner = FlowRunner::new(h.services.clone());
        let (_, summary) = runner.start(run(flow, vec![s, bad, after], edges, json!({}))).finish().await;
        assert_eq!(summary.outcome, RunOutcome::Failed);
        assert_eq!(summary.error.unwrap().code, ErrorCode::ExpressionRuntime);
        assert!(h.recorder.named("after").is_empty());
    }

    #[tokio::test]
    async fn request_output_is_visible_to_later_nodes() {
        let h = Harness::new(
            FakeResolver::new("http://api.test/login"),
            FakeHttp::ok(json!({ "token": "abc" })),
        );
        let flow = FlowId::new();
        let s = start(flow);
        let login = request_node(flow, "login");
        let check = FlowNode::new(
            flow,
            "check",
            NodeConfig::Condition {
                condition: AssertCondition::expression("login.response.body.token == 'abc'"),
            },
        );
        let yes = noop(flow, "yes");
        let edges = vec![
            edge(flow, &s, &login, EdgeHandle::Then),
            edge(flow, &login, &check, EdgeHandle::Then),
            edge(flow, &check, &yes, EdgeHandle::Then),
        ];
        let runner = FlowRunner::new(h.services.clone());
        let (events, summary) = runner.start(run(flow, vec![s, login, check, yes], edges, json!({}))).finish().await;

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(h.recorder.named("yes").len(), 1);
        assert_eq!(h.http.call_count(), 1);
        let login_exec = h.recorder.named("login").pop().unwrap();
        assert!(login_exec.response_id.is_some());
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn node_events_are_ordered_start_before_finish() {
        let h = Harness::basic();
        let flow = FlowId::new();
        let s = start(flow);
        let req = request_node(flow, "req");
        let edges = vec![edge(flow, &s, &req, EdgeHandle::Then)];
        let runner = FlowRunner::new(h.services.clone());
        let (events, _) = runner.start(run(flow, vec![s, req.clone()], edges, json!({}))).finish().await;

        let statuses: Vec<NodeStatus> = events
            .iter()
            .filter_map(|e| match e {
                FlowEvent::Node { node_id, status, .. } if *node_id == req.id => Some(*status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![NodeStatus::NodeStarted, NodeStatus::NodeRunning, NodeStatus::NodeSuccess]
        );
    }

    #[tokio::test]
    async fn fan_in_node_runs_per_incoming_activation() {
        let h = Harness::basic();
        let flow = FlowId::new();
        let s = start(flow);
        let (a, b, join) = (noop(flow, "a"), noop(flow, "b"), noop(flow, "join"));
        let edges = vec![
            edge(flow, &s, &a, EdgeHandle::Then),
            edge(flow, &s, &b, EdgeHandle::Then),
            edge(flow, &a, &join, EdgeHandle::Then),
            edge(flow, &b, &join, EdgeHandle::Then),
        ];
        let runner = FlowRunner::new(h.services.clone());
        let (_, summary) = runner.start(run(flow, vec![s, a, b, join], edges, json!({}))).finish().await;
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(h.recorder.named("join").len(), 2);
    }

    #[tokio::test]
    async fn cancel_before_any_node_finishes_leaves_no_success() {
        let h = Harness::new(FakeResolver::new("http://api.test"), FakeHttp::slow(Duration::from_secs(30)));
        let flow = FlowId::new();
        let s = start(flow);
        let req = request_node(flow, "slow");
        let edges = vec![edge(flow, &s, &req, EdgeHandle::Then)];
        let runner = FlowRunner::new(h.services.clone());
        let handle = runner.start(run(flow, vec![s, req], edges, json!({})));
        assert!(runner.cancel(&handle.run_id));

        let (_, summary) = handle.finish().await;
        assert_eq!(summary.outcome, RunOutcome::Canceled);
        assert_eq!(h.recorder.count(NodeState::Success), 0);
        assert!(!runner.is_running(&summary.run_id));
    }

    #[tokio::test]
    async fn cancel_interrupts_in_flight_request() {
        let h = Harness::new(FakeResolver::new("http://api.test"), FakeHttp::slow(Duration::from_secs(30)));
        let flow = FlowId::new();
        let s = start(flow);
        let req = request_node(flow, "slow");
        let edges = vec![edge(flow, &s, &req, EdgeHandle::Then)];
        let runner = FlowRunner::new(h.services.clone());
        let mut handle = runner.start(run(flow, vec![s, req], edges, json!({})));

        // Wait until the request is on the wire.
        while let Some(event) = handle.events.recv().await {
            if matches!(event, FlowEvent::Node { status: NodeStatus::NodeRunning, .. }) {
                break;
            }
        }
        runner.cancel(&handle.run_id);
        let (_, summary) = handle.finish().await;
        assert_eq!(summary.outcome, RunOutcome::Canceled);
        assert_eq!(h.recorder.named("slow")[0].state, NodeState::Canceled);
    }

    #[tokio::test]
    async fn flow_timeout_ends_the_run() {
        let h = Harness::new(FakeResolver::new("http://api.test"), FakeHttp::slow(Duration::from_secs(30)));
        let flow = FlowId::new();
        let s = start(flow);
        let req = request_node(flow, "slow");
        let edges = vec![edge(flow, &s, &req, EdgeHandle::Then)];
        let runner = FlowRunner::new(h.services.clone());
        let mut start_run = run(flow, vec![s, req], edges, json!({}));
        start_run.timeout = Some(Duration::from_millis(50));

        let (events, summary) = runner.start(start_run).finish().await;
        assert_eq!(summary.outcome, RunOutcome::TimedOut);
        assert_eq!(summary.error.unwrap().code, ErrorCode::Timeout);
        assert!(matches!(
            events.last(),
            Some(FlowEvent::Finished {
                outcome: RunOutcome::TimedOut,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn dropping_the_event_stream_cancels_the_run() {
        let h = Harness::new(FakeResolver::new("http://api.test"), FakeHttp::slow(Duration::from_secs(30)));
        let flow = FlowId::new();
        let s = start(flow);
        let req = request_node(flow, "slow");
        let edges = vec![edge(flow, &s, &req, EdgeHandle::Then)];
        let runner = FlowRunner::new(h.services.clone()).with_event_buffer(1);
        let (events, join) = runner.start(run(flow, vec![s, req], edges, json!({}))).into_parts();
        drop(events);

        let summary = join.await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Canceled);
    }
}
