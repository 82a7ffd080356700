// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation order and adjacency records.
//!
//! The core does not compute node semantics. It hands the host a dependency
//! order over one scope plus the wiring of each node, keyed by both handle
//! and uuid.

use crate::graph::Graph;
use crate::id::{ConnectionHandle, NodeHandle, PinHandle, SubgraphHandle};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Topological order over a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationOrder {
    /// Every node of the scope exactly once. The first `sorted` entries are
    /// in dependency order; the rest sit on or behind a cycle and follow in
    /// insertion order.
    pub nodes: Vec<NodeHandle>,
    /// Length of the acyclic prefix
    pub sorted: usize,
}

impl EvaluationOrder {
    /// Whether the scope contains a cycle
    pub fn has_cycle(&self) -> bool {
        self.sorted < self.nodes.len()
    }

    /// Nodes that could not be ordered
    pub fn unsorted(&self) -> &[NodeHandle] {
        &self.nodes[self.sorted..]
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the scope is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Kahn's algorithm over the nodes contained by `scope`
pub fn evaluation_order(graph: &Graph, scope: Option<SubgraphHandle>) -> EvaluationOrder {
    let nodes: Vec<NodeHandle> = graph.nodes_in(scope).map(|n| n.handle).collect();
    let mut in_degree: HashMap<NodeHandle, usize> = nodes.iter().map(|n| (*n, 0)).collect();
    let mut successors: HashMap<NodeHandle, Vec<NodeHandle>> = HashMap::new();

    for conn in graph.connections() {
        let (from, to) = (conn.source.node, conn.target.node);
        if !in_degree.contains_key(&from) {
            continue;
        }
        if let Some(degree) = in_degree.get_mut(&to) {
            *degree += 1;
            successors.entry(from).or_default().push(to);
        }
    }

    let mut ready: VecDeque<NodeHandle> = nodes.iter().copied().filter(|n| in_degree[n] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = ready.pop_front() {
        order.push(node);
        for next in successors.get(&node).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(*next);
                }
            }
        }
    }

    let sorted = order.len();
    if sorted < nodes.len() {
        let emitted: std::collections::HashSet<NodeHandle> = order.iter().copied().collect();
        order.extend(nodes.iter().filter(|n| !emitted.contains(n)));
        tracing::debug!(scope = ?scope, cyclic = nodes.len() - sorted, "cycle detected");
    }

    EvaluationOrder { nodes: order, sorted }
}

/// One end of a connection record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinLink {
    /// Node handle
    pub node: NodeHandle,
    /// Node uuid
    pub node_uuid: Uuid,
    /// Pin handle
    pub pin: PinHandle,
    /// Pin uuid
    pub pin_uuid: Uuid,
}

/// A connection as handed to a host evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Connection handle
    pub handle: ConnectionHandle,
    /// Connection uuid
    pub uuid: Uuid,
    /// Output side
    pub source: PinLink,
    /// Input side
    pub target: PinLink,
}

fn record(graph: &Graph, handle: ConnectionHandle) -> Option<ConnectionRecord> {
    let conn = graph.connection(handle)?;
    let link = |node: NodeHandle, pin: PinHandle| {
        let n = graph.node(node)?;
        Some(PinLink {
            node,
            node_uuid: n.uuid,
            pin,
            pin_uuid: n.pin(pin)?.uuid,
        })
    };
    Some(ConnectionRecord {
        handle,
        uuid: conn.uuid,
        source: link(conn.source.node, conn.source.pin)?,
        target: link(conn.target.node, conn.target.pin)?,
    })
}

/// Connections feeding the node's inputs
pub fn input_connections(graph: &Graph, node: NodeHandle) -> Vec<ConnectionRecord> {
    graph
        .input_connections(node)
        .filter_map(|c| record(graph, c.handle))
        .collect()
}

/// Connections leaving the node's outputs
pub fn output_connections(graph: &Graph, node: NodeHandle) -> Vec<ConnectionRecord> {
    graph
        .output_connections(node)
        .filter_map(|c| record(graph, c.handle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::{PinDirection, PinShape, PinType};
    use egui::Pos2;

    fn chain(graph: &mut Graph, names: &[&str]) -> Vec<(NodeHandle, PinHandle, PinHandle)> {
        names
            .iter()
            .map(|name| {
                let n = graph.add_node(*name, "t", Pos2::ZERO, None).unwrap();
                let i = graph
                    .add_pin(n, "in", PinDirection::Input, PinType::Float, PinShape::Circle, None)
                    .unwrap();
                let o = graph
                    .add_pin(n, "out", PinDirection::Output, PinType::Float, PinShape::Circle, None)
                    .unwrap();
                (n, i, o)
            })
            .collect()
    }

    #[test]
    fn test_topological_order() {
        let mut graph = Graph::new("eval");
        let n = chain(&mut graph, &["C", "A", "B"]);
        // A -> B -> C, inserted as C, A, B
        graph.add_connection(n[1].0, n[1].2, n[2].0, n[2].1, None).unwrap();
        graph.add_connection(n[2].0, n[2].2, n[0].0, n[0].1, None).unwrap();

        let order = evaluation_order(&graph, None);
        assert_eq!(order.nodes, vec![n[1].0, n[2].0, n[0].0]);
        assert!(!order.has_cycle());
    }

    #[test]
    fn test_cycle_falls_back_to_insertion_order() {
        let mut graph = Graph::new("eval");
        let n = chain(&mut graph, &["Free", "X", "Y"]);
        graph.add_connection(n[1].0, n[1].2, n[2].0, n[2].1, None).unwrap();
        graph.add_connection(n[2].0, n[2].2, n[1].0, n[1].1, None).unwrap();

        let order = evaluation_order(&graph, None);
        assert_eq!(order.nodes, vec![n[0].0, n[1].0, n[2].0]);
        assert_eq!(order.sorted, 1);
        assert_eq!(order.unsorted(), &[n[1].0, n[2].0]);
        assert!(order.has_cycle());
    }

    #[test]
    fn test_scope_confines_order() {
        let mut graph = Graph::new("eval");
        let s = graph.add_subgraph(None, "S", None).unwrap();
        graph.add_node("Root", "t", Pos2::ZERO, None).unwrap();
        let inner = graph.add_node_in(Some(s), "Inner", "t", Pos2::ZERO, None).unwrap();

        let order = evaluation_order(&graph, Some(s));
        let sub = graph.subgraph(s).unwrap();
        assert_eq!(order.nodes, vec![sub.input_node, sub.output_node, inner]);
    }

    #[test]
    fn test_adjacency_records() {
        let mut graph = Graph::new("eval");
        let n = chain(&mut graph, &["A", "B"]);
        let conn = graph.add_connection(n[0].0, n[0].2, n[1].0, n[1].1, None).unwrap();

        let inputs = input_connections(&graph, n[1].0);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].handle, conn);
        assert_eq!(inputs[0].source.node, n[0].0);
        assert_eq!(inputs[0].source.node_uuid, graph.node(n[0].0).unwrap().uuid);
        assert_eq!(inputs[0].target.pin_uuid, graph.pin(n[1].0, n[1].1).unwrap().uuid);
        assert!(output_connections(&graph, n[1].0).is_empty());
        assert_eq!(output_connections(&graph, n[0].0), inputs);
    }
}
