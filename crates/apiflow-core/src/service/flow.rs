//! Loading a flow and starting runs of it.

use std::collections::HashMap;
use std::time::Duration;

use apiflow_types::flow::{ExecutionSummary, Flow, FlowVariable, NodeExecution, NodeState};
use apiflow_types::id::{FlowId, NodeId, RunId};
use apiflow_types::workspace::Variable;
use serde_json::{Map, Value};

use super::ServiceError;
use crate::flow::{FlowError, FlowGraph, FlowRunner, RunHandle, StartRun};
use crate::repository::{FlowRepository, WorkspaceRepository};

/// Initial run variables: enabled environment variables, then enabled flow
/// variables on top.
pub fn seed_variables(env: &[Variable], flow: &[FlowVariable]) -> Map<String, Value> {
    let mut vars = Map::new();
    for v in env.iter().filter(|v| v.enabled) {
        vars.insert(v.key.clone(), Value::String(v.value.clone()));
    }
    for v in flow.iter().filter(|v| v.enabled) {
        vars.insert(v.key.clone(), Value::String(v.value.clone()));
    }
    vars
}

/// Per-node totals over a set of execution rows.
pub fn summarize(executions: &[NodeExecution]) -> HashMap<NodeId, ExecutionSummary> {
    let mut out: HashMap<NodeId, ExecutionSummary> = HashMap::new();
    for e in executions {
        let s = out.entry(e.node_id).or_default();
        s.total += 1;
        match e.state {
            NodeState::Success => s.success += 1,
            NodeState::Failure => s.failure += 1,
            NodeState::Canceled => s.canceled += 1,
            NodeState::Running => {}
        }
    }
    out
}

pub struct FlowService<F: FlowRepository, W: WorkspaceRepository> {
    flows: F,
    workspaces: W,
    runner: FlowRunner,
    /// Used when the flow sets no timeout of its own.
    default_timeout: Option<Duration>,
}

impl<F: FlowRepository, W: WorkspaceRepository> FlowService<F, W> {
    pub fn new(flows: F, workspaces: W, runner: FlowRunner, default_timeout: Option<Duration>) -> Self {
        Self {
            flows,
            workspaces,
            runner,
            default_timeout,
        }
    }

    pub fn runner(&self) -> &FlowRunner {
        &self.runner
    }

    pub fn repo(&self) -> &F {
        &self.flows
    }

    pub async fn get_flow(&self, flow_id: &FlowId) -> Result<Flow, ServiceError> {
        self.flows
            .get_flow(flow_id)
            .await?
            .ok_or_else(|| FlowError::FlowNotFound(*flow_id).into())
    }

    /// Load and validate the flow's graph.
    pub async fn load_graph(&self, flow_id: &FlowId) -> Result<(Flow, FlowGraph), ServiceError> {
        let flow = self.get_flow(flow_id).await?;
        let nodes = self.flows.list_nodes(flow_id).await?;
        let edges = self.flows.list_edges(flow_id).await?;
        let graph = FlowGraph::build(flow.id, nodes, edges)?;
        Ok((flow, graph))
    }

    /// Start a run of the flow. The returned handle streams node events
    /// until the run ends.
    pub async fn run(&self, flow_id: &FlowId) -> Result<RunHandle, ServiceError> {
        let (flow, graph) = self.load_graph(flow_id).await?;

        let env_vars = match self.workspaces.active_environment(&flow.workspace_id).await? {
            Some(env) => self.workspaces.list_variables(&env.id).await?,
            None => Vec::new(),
        };
        let flow_vars = self.flows.list_flow_variables(flow_id).await?;
        let timeout = flow
            .timeout_ms
            .map(Duration::from_millis)
            .or(self.default_timeout);

        let handle = self.runner.start(StartRun {
            flow_id: flow.id,
            workspace_id: flow.workspace_id,
            graph,
            vars: seed_variables(&env_vars, &flow_vars),
            timeout,
        });
        tracing::info!(flow_id = %flow.id, run_id = %handle.run_id, "flow run requested");
        Ok(handle)
    }

    pub fn cancel(&self, run_id: &RunId) -> bool {
        self.runner.cancel(run_id)
    }

    pub async fn execution_summary(
        &self,
        flow_id: &FlowId,
        run_id: Option<RunId>,
    ) -> Result<HashMap<NodeId, ExecutionSummary>, ServiceError> {
        let executions = self.flows.list_executions(flow_id, run_id).await?;
        Ok(summarize(&executions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiflow_types::id::{EnvId, FlowVariableId, NodeExecutionId, VariableId};
    use chrono::Utc;

    fn env_var(key: &str, value: &str, enabled: bool) -> Variable {
        Variable {
            id: VariableId::new(),
            env_id: EnvId::new(),
            key: key.into(),
            value: value.into(),
            description: String::new(),
            enabled,
        }
    }

    fn flow_var(key: &str, value: &str) -> FlowVariable {
        FlowVariable {
            id: FlowVariableId::new(),
            flow_id: FlowId::new(),
            key: key.into(),
            value: value.into(),
            description: String::new(),
            enabled: true,
        }
    }

    #[test]
    fn flow_variables_override_environment() {
        let vars = seed_variables(
            &[env_var("host", "env.local", true), env_var("off", "x", false), env_var("token", "t", true)],
            &[flow_var("host", "flow.local")],
        );
        assert_eq!(vars["host"], "flow.local");
        assert_eq!(vars["token"], "t");
        assert!(!vars.contains_key("off"));
    }

    #[test]
    fn summary_counts_per_node() {
        let node = NodeId::new();
        let row = |state| NodeExecution {
            id: NodeExecutionId::new(),
            flow_id: FlowId::new(),
            node_id: node,
            run_id: RunId::new(),
            name: "n".into(),
            state,
            error: None,
            input_data: None,
            output_data: None,
            response_id: None,
            completed_at: Utc::now(),
        };
        let summary = summarize(&[row(NodeState::Success), row(NodeState::Failure), row(NodeState::Success)]);
        let s = &summary[&node];
        assert_eq!((s.total, s.success, s.failure, s.canceled), (3, 2, 1, 0));
    }
}
