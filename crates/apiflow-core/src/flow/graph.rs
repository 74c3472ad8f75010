//! Validated, immutable view of a flow's nodes and edges.
//!
//! Uses `petgraph` only for validation: a topological sort rejects cycles
//! before a run starts. Loop bodies hang off `loop` edges and never point
//! back at their loop node, so a valid flow is always acyclic.

use std::collections::HashMap;

use apiflow_types::flow::{EdgeHandle, FlowEdge, FlowNode};
use apiflow_types::id::{FlowId, NodeId};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use super::error::FlowError;

#[derive(Debug, Clone)]
pub struct FlowGraph {
    flow_id: FlowId,
    nodes: HashMap<NodeId, FlowNode>,
    /// source -> handle -> targets, in edge order.
    edges: HashMap<NodeId, HashMap<EdgeHandle, Vec<NodeId>>>,
    start: NodeId,
}

impl FlowGraph {
    pub fn build(flow_id: FlowId, nodes: Vec<FlowNode>, edges: Vec<FlowEdge>) -> Result<Self, FlowError> {
        let mut graph = DiGraph::<NodeId, ()>::new();
        let mut index = HashMap::new();
        for node in &nodes {
            index.insert(node.id, graph.add_node(node.id));
        }

        let mut edge_map: HashMap<NodeId, HashMap<EdgeHandle, Vec<NodeId>>> = HashMap::new();
        let mut has_incoming: HashMap<NodeId, bool> = HashMap::new();
        for edge in &edges {
            let (Some(&from), Some(&to)) = (index.get(&edge.source_id), index.get(&edge.target_id)) else {
                return Err(FlowError::InvalidGraph(format!(
                    "edge {} references a node outside the flow",
                    edge.id
                )));
            };
            if edge.source_id == edge.target_id {
                return Err(FlowError::CycleDetected(edge.source_id.to_string()));
            }
            graph.add_edge(from, to, ());
            edge_map
                .entry(edge.source_id)
                .or_default()
                .entry(edge.source_handle)
                .or_default()
                .push(edge.target_id);
            has_incoming.insert(edge.target_id, true);
        }

        toposort(&graph, None).map_err(|cycle| {
            let id = graph[cycle.node_id()];
            let name = nodes
                .iter()
                .find(|n| n.id == id)
                .map_or_else(|| id.to_string(), |n| n.name.clone());
            FlowError::CycleDetected(name)
        })?;

        let starts: Vec<&FlowNode> = nodes.iter().filter(|n| n.is_start()).collect();
        let start = match starts.as_slice() {
            [one] => one.id,
            [] => {
                // Without an explicit start node, a single root is accepted.
                let roots: Vec<&FlowNode> = nodes
                    .iter()
                    .filter(|n| !has_incoming.contains_key(&n.id))
                    .collect();
                match roots.as_slice() {
                    [one] => one.id,
                    [] => return Err(FlowError::NoStartNode),
                    _ => {
                        return Err(FlowError::InvalidGraph(
                            "flow has several root nodes and no start node".into(),
                        ));
                    }
                }
            }
            _ => return Err(FlowError::MultipleStartNodes),
        };
        if has_incoming.contains_key(&start) {
            return Err(FlowError::InvalidGraph("the start node has an incoming edge".into()));
        }

        Ok(Self {
            flow_id,
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
            edges: edge_map,
            start,
        })
    }

    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn node(&self, id: &NodeId) -> Option<&FlowNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn targets(&self, source: &NodeId, handle: EdgeHandle) -> Vec<NodeId> {
        self.edges
            .get(source)
            .and_then(|by_handle| by_handle.get(&handle))
            .cloned()
            .unwrap_or_default()
    }

    /// Successors on the regular path: `then` edges plus unlabelled ones.
    pub fn next(&self, source: &NodeId) -> Vec<NodeId> {
        let mut out = self.targets(source, EdgeHandle::Then);
        out.extend(self.targets(source, EdgeHandle::Unspecified));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiflow_types::flow::{NodeConfig, NoopKind};

    fn noop(flow: FlowId, name: &str, kind: NoopKind) -> FlowNode {
        FlowNode::new(flow, name, NodeConfig::NoOp { noop_kind: kind })
    }

    #[test]
    fn start_node_is_found_and_successors_are_ordered() {
        let flow = FlowId::new();
        let start = noop(flow, "start", NoopKind::Start);
        let a = noop(flow, "a", NoopKind::Plain);
        let b = noop(flow, "b", NoopKind::Plain);
        let edges = vec![
            FlowEdge::new(flow, start.id, a.id, EdgeHandle::Unspecified),
            FlowEdge::new(flow, start.id, b.id, EdgeHandle::Then),
        ];
        let (sid, aid, bid) = (start.id, a.id, b.id);
        let graph = FlowGraph::build(flow, vec![start, a, b], edges).unwrap();
        assert_eq!(graph.start(), sid);
        assert_eq!(graph.next(&sid), vec![bid, aid]);
    }

    #[test]
    fn single_root_without_start_node() {
        let flow = FlowId::new();
        let a = noop(flow, "a", NoopKind::Plain);
        let b = noop(flow, "b", NoopKind::Plain);
        let edges = vec![FlowEdge::new(flow, a.id, b.id, EdgeHandle::Then)];
        let aid = a.id;
        assert_eq!(FlowGraph::build(flow, vec![a, b], edges).unwrap().start(), aid);
    }

    #[test]
    fn cycles_are_rejected() {
        let flow = FlowId::new();
        let start = noop(flow, "start", NoopKind::Start);
        let a = noop(flow, "a", NoopKind::Plain);
        let b = noop(flow, "b", NoopKind::Plain);
        let edges = vec![
            FlowEdge::new(flow, start.id, a.id, EdgeHandle::Then),
            FlowEdge::new(flow, a.id, b.id, EdgeHandle::Then),
            FlowEdge::new(flow, b.id, a.id, EdgeHandle::Then),
        ];
        assert!(matches!(
            FlowGraph::build(flow, vec![start, a, b], edges),
            Err(FlowError::CycleDetected(_))
        ));
    }

    #[test]
    fn two_start_nodes_are_rejected() {
        let flow = FlowId::new();
        let s1 = noop(flow, "s1", NoopKind::Start);
        let s2 = noop(flow, "s2", NoopKind::Start);
        assert!(matches!(
            FlowGraph::build(flow, vec![s1, s2], vec![]),
            Err(FlowError::MultipleStartNodes)
        ));
    }

    #[test]
    fn dangling_edges_are_rejected() {
        let flow = FlowId::new();
        let start = noop(flow, "start", NoopKind::Start);
        let edge = FlowEdge::new(flow, start.id, NodeId::new(), EdgeHandle::Then);
        assert!(matches!(
            FlowGraph::build(flow, vec![start], vec![edge]),
            Err(FlowError::InvalidGraph(_))
        ));
    }
}
