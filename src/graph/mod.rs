//! Node Dependency Graph
//!
//! Builds the entity relationship graph from each node's `links` and orders
//! entities so that every upstream entity comes before its dependents.
//!
//! Edges point from the linked-to entity (upstream, the link's `target_type`)
//! to the declaring entity (downstream). `sample` linking to `subject` yields
//! `subject -> sample`.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::warn;

use crate::error::{Result, ValidatorError};
use crate::schema::{is_listed, SchemaDocument};

/// Entity moved to the end of every node order by default
pub const AGGREGATION_NODE: &str = "core_metadata_collection";

/// One `(upstream, downstream)` pair.
///
/// Both sides are `None` when a link was missing its `target_type` or the
/// declaring node had no `id`; the placeholder keeps the authoring error
/// visible instead of dropping the node silently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodePair {
    pub upstream: Option<String>,
    pub downstream: Option<String>,
}

impl NodePair {
    pub fn new(upstream: impl Into<String>, downstream: impl Into<String>) -> Self {
        Self {
            upstream: Some(upstream.into()),
            downstream: Some(downstream.into()),
        }
    }

    pub fn placeholder() -> Self {
        Self {
            upstream: None,
            downstream: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.upstream.is_none() || self.downstream.is_none()
    }
}

/// Extract node pairs from every node not in `excluded`
pub fn build_edges(document: &SchemaDocument, excluded: &[String]) -> Vec<NodePair> {
    let mut pairs = Vec::new();

    for name in document.node_names() {
        if is_listed(name, excluded) {
            continue;
        }

        let id = document.node_id(name).filter(|id| !id.is_empty());
        for link in document.node_links(name) {
            match (link.target_type.as_deref().filter(|t| !t.is_empty()), id) {
                (Some(target), Some(id)) => pairs.push(NodePair::new(target, id)),
                _ => {
                    warn!(node = name, ?link, "link is missing its target_type or node id");
                    pairs.push(NodePair::placeholder());
                }
            }
        }
    }

    pairs
}

/// Topologically order the entities named by `edges`.
///
/// `last`, when present in the graph, is moved to the very end.
pub fn order(edges: &[NodePair], last: Option<&str>) -> Result<Vec<String>> {
    let graph = NodeGraph::from_pairs(edges);
    let mut sorted = graph.topological_order()?;

    if let Some(last) = last {
        if let Some(pos) = sorted.iter().position(|n| n == last) {
            let node = sorted.remove(pos);
            sorted.push(node);
        }
    }

    Ok(sorted)
}

/// Entity relationship graph
pub struct NodeGraph {
    graph: DiGraph<String, ()>,
}

impl NodeGraph {
    /// Build the graph from node pairs, skipping placeholders.
    ///
    /// Nodes are registered downstream-first for each pair; this registration
    /// order seeds the ordering queue and breaks ties between roots.
    pub fn from_pairs(pairs: &[NodePair]) -> Self {
        let mut graph = DiGraph::with_capacity(pairs.len() * 2, pairs.len());
        let mut node_indices: HashMap<String, NodeIndex> = HashMap::with_capacity(pairs.len() * 2);

        for pair in pairs {
            let (Some(upstream), Some(downstream)) = (&pair.upstream, &pair.downstream) else {
                warn!("skipping placeholder node pair");
                continue;
            };

            let mut index_of = |name: &String| {
                *node_indices
                    .entry(name.clone())
                    .or_insert_with(|| graph.add_node(name.clone()))
            };
            let down_idx = index_of(downstream);
            let up_idx = index_of(upstream);
            graph.add_edge(up_idx, down_idx, ());
        }

        Self { graph }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Kahn's algorithm with a FIFO queue.
    ///
    /// Ties are broken by registration order and neighbours are released in
    /// edge insertion order, so a fixed edge list always yields the same order.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.edges_directed(n, Direction::Incoming).count())
            .collect();

        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .collect();

        let mut sorted = Vec::with_capacity(self.graph.node_count());
        while let Some(node) = queue.pop_front() {
            sorted.push(self.graph[node].clone());

            let mut edges: Vec<_> = self.graph.edges_directed(node, Direction::Outgoing).collect();
            edges.sort_by_key(|e| e.id());
            for edge in edges {
                let target = edge.target();
                in_degree[target.index()] -= 1;
                if in_degree[target.index()] == 0 {
                    queue.push_back(target);
                }
            }
        }

        if sorted.len() < self.graph.node_count() {
            return Err(ValidatorError::NodeCycle(self.cycle_members()));
        }

        Ok(sorted)
    }

    /// Nodes that sit on a cycle (SCCs larger than one, or self-links)
    pub fn cycle_members(&self) -> Vec<String> {
        let mut members: Vec<String> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .map(|idx| self.graph[idx].clone())
            .collect();
        members.sort();
        members
    }

    /// Export the graph to GraphViz DOT format
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph NodeGraph {\n");
        output.push_str("  rankdir=TB;\n");
        output.push_str("  node [shape=box, style=\"rounded\", fontname=\"Helvetica\", fontsize=10];\n\n");

        for idx in self.graph.node_indices() {
            output.push_str(&format!("  \"{}\";\n", self.graph[idx]));
        }
        output.push('\n');

        for edge in self.graph.edge_references() {
            output.push_str(&format!(
                "  \"{}\" -> \"{}\";\n",
                self.graph[edge.source()],
                self.graph[edge.target()]
            ));
        }

        output.push_str("}\n");
        output
    }
}
