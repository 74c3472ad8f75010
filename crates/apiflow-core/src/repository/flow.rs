//! Flows, their graph and execution records.

use apiflow_types::error::RepositoryError;
use apiflow_types::flow::{Flow, FlowEdge, FlowNode, FlowVariable, NodeExecution};
use apiflow_types::id::{EdgeId, FlowId, FlowVariableId, NodeId, RunId, WorkspaceId};

pub trait FlowRepository: Send + Sync {
    fn create_flow(
        &self,
        flow: &Flow,
    ) -> impl std::future::Future<Output = Result<Flow, RepositoryError>> + Send;

    fn get_flow(
        &self,
        id: &FlowId,
    ) -> impl std::future::Future<Output = Result<Option<Flow>, RepositoryError>> + Send;

    fn list_flows(
        &self,
        workspace_id: &WorkspaceId,
    ) -> impl std::future::Future<Output = Result<Vec<Flow>, RepositoryError>> + Send;

    fn update_flow(
        &self,
        flow: &Flow,
    ) -> impl std::future::Future<Output = Result<Flow, RepositoryError>> + Send;

    fn delete_flow(
        &self,
        id: &FlowId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Insert the aggregate node row and its per-kind attribute row.
    fn create_node(
        &self,
        node: &FlowNode,
    ) -> impl std::future::Future<Output = Result<FlowNode, RepositoryError>> + Send;

    fn get_node(
        &self,
        id: &NodeId,
    ) -> impl std::future::Future<Output = Result<Option<FlowNode>, RepositoryError>> + Send;

    fn list_nodes(
        &self,
        flow_id: &FlowId,
    ) -> impl std::future::Future<Output = Result<Vec<FlowNode>, RepositoryError>> + Send;

    /// Replace the node's attributes. Changing its kind is rejected.
    fn update_node(
        &self,
        node: &FlowNode,
    ) -> impl std::future::Future<Output = Result<FlowNode, RepositoryError>> + Send;

    fn delete_node(
        &self,
        id: &NodeId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn create_edge(
        &self,
        edge: &FlowEdge,
    ) -> impl std::future::Future<Output = Result<FlowEdge, RepositoryError>> + Send;

    fn list_edges(
        &self,
        flow_id: &FlowId,
    ) -> impl std::future::Future<Output = Result<Vec<FlowEdge>, RepositoryError>> + Send;

    fn delete_edge(
        &self,
        id: &EdgeId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn create_flow_variable(
        &self,
        variable: &FlowVariable,
    ) -> impl std::future::Future<Output = Result<FlowVariable, RepositoryError>> + Send;

    fn list_flow_variables(
        &self,
        flow_id: &FlowId,
    ) -> impl std::future::Future<Output = Result<Vec<FlowVariable>, RepositoryError>> + Send;

    fn update_flow_variable(
        &self,
        variable: &FlowVariable,
    ) -> impl std::future::Future<Output = Result<FlowVariable, RepositoryError>> + Send;

    fn delete_flow_variable(
        &self,
        id: &FlowVariableId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn record_execution(
        &self,
        execution: &NodeExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Executions of a flow, newest first, optionally limited to one run.
    fn list_executions(
        &self,
        flow_id: &FlowId,
        run_id: Option<RunId>,
    ) -> impl std::future::Future<Output = Result<Vec<NodeExecution>, RepositoryError>> + Send;

    fn list_node_executions(
        &self,
        node_id: &NodeId,
    ) -> impl std::future::Future<Output = Result<Vec<NodeExecution>, RepositoryError>> + Send;
}
