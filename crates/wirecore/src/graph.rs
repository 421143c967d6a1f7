use crate::{GraphError, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub type GraphId = Uuid;

/// Complete workflow graph: nodes plus directed dependency edges.
/// Read-only during execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowGraph {
    pub id: GraphId,
    pub name: String,
    pub description: Option<String>,
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub settings: RunSettings,
}

impl FlowGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            settings: RunSettings::default(),
        }
    }

    pub fn add_node(&mut self, node: FlowNode) -> String {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Connect source → target. The target becomes eligible only once
    /// every edge with that target has a succeeded source.
    pub fn connect(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.edges.push(Edge {
            source: source.into(),
            target: target.into(),
        });
    }

    pub fn find_node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Node ids feeding into `id`.
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.target == id)
            .map(|e| e.source.as_str())
            .collect()
    }

    /// Structural validation: unique ids and titles, no dangling edges,
    /// action bindings consistent with node kinds. Cycle detection is the
    /// executor's concern (it builds the dependency graph anyway).
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut ids = HashSet::new();
        let mut titles = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNodeId(node.id.clone()));
            }
            if !titles.insert(node.title.as_str()) {
                return Err(GraphError::DuplicateTitle(node.title.clone()));
            }
            match node.kind {
                NodeKind::Trigger => {
                    if node.action.is_some() {
                        return Err(GraphError::TriggerWithAction(node.id.clone()));
                    }
                }
                NodeKind::Action | NodeKind::Condition => {
                    if node.action.is_none() {
                        return Err(GraphError::MissingAction(node.id.clone()));
                    }
                }
            }
        }
        for edge in &self.edges {
            if !ids.contains(edge.source.as_str()) {
                return Err(GraphError::DanglingEdge(edge.source.clone()));
            }
            if !ids.contains(edge.target.as_str()) {
                return Err(GraphError::DanglingEdge(edge.target.clone()));
            }
        }
        Ok(())
    }
}

/// One node in a workflow graph. The title doubles as the key other
/// nodes use in `{{Title.field}}` placeholders, which is why it must be
/// unique within a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    pub id: String,
    pub title: String,
    pub kind: NodeKind,
    /// Bound action slug. Absent for triggers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    /// Integration instance whose credentials the step needs, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_id: Option<String>,
}

impl FlowNode {
    pub fn trigger(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: NodeKind::Trigger,
            action: None,
            config: HashMap::new(),
            integration_id: None,
        }
    }

    pub fn action(
        id: impl Into<String>,
        title: impl Into<String>,
        slug: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: NodeKind::Action,
            action: Some(slug.into()),
            config: HashMap::new(),
            integration_id: None,
        }
    }

    pub fn condition(
        id: impl Into<String>,
        title: impl Into<String>,
        slug: impl Into<String>,
    ) -> Self {
        Self {
            kind: NodeKind::Condition,
            ..Self::action(id, title, slug)
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_integration(mut self, integration_id: impl Into<String>) -> Self {
        self.integration_id = Some(integration_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Trigger,
    Action,
    Condition,
}

/// Directed dependency between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// Per-graph execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunSettings {
    pub on_error: ErrorPolicy,
    pub max_parallel_nodes: usize,
    /// Whole-run deadline. Nodes unfinished at the deadline end in Error.
    pub run_timeout_ms: Option<u64>,
    /// Per-node deadline applied by the invocation wrapper.
    pub node_timeout_ms: Option<u64>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            on_error: ErrorPolicy::FailRun,
            max_parallel_nodes: 10,
            run_timeout_ms: None,
            node_timeout_ms: None,
        }
    }
}

/// Whether one node error fails the whole run or only its downstream
/// branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorPolicy {
    FailRun,
    IsolateBranch,
}

/// Life of a node within one run. Transitions are one-directional; a
/// node never re-enters Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRunState {
    Pending,
    Running,
    Success,
    Error,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_graph() -> FlowGraph {
        let mut graph = FlowGraph::new("test");
        graph.add_node(FlowNode::trigger("t", "Telegram"));
        graph.add_node(FlowNode::action("a", "Extract", "extract-ca"));
        graph.connect("t", "a");
        graph
    }

    #[test]
    fn valid_graph_passes() {
        assert!(two_node_graph().validate().is_ok());
    }

    #[test]
    fn duplicate_title_rejected() {
        let mut graph = two_node_graph();
        graph.add_node(FlowNode::action("b", "Extract", "extract-ca"));
        assert_eq!(
            graph.validate(),
            Err(GraphError::DuplicateTitle("Extract".to_string()))
        );
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut graph = two_node_graph();
        graph.add_node(FlowNode::action("a", "Other", "extract-ca"));
        assert_eq!(
            graph.validate(),
            Err(GraphError::DuplicateNodeId("a".to_string()))
        );
    }

    #[test]
    fn dangling_edge_rejected() {
        let mut graph = two_node_graph();
        graph.connect("a", "missing");
        assert_eq!(
            graph.validate(),
            Err(GraphError::DanglingEdge("missing".to_string()))
        );
    }

    #[test]
    fn action_node_requires_slug() {
        let mut graph = FlowGraph::new("test");
        let mut node = FlowNode::action("a", "A", "x");
        node.action = None;
        graph.add_node(node);
        assert_eq!(
            graph.validate(),
            Err(GraphError::MissingAction("a".to_string()))
        );
    }
}
