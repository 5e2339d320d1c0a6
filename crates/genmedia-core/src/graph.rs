use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GenmediaError, Result};

pub type NodeData = serde_json::Map<String, serde_json::Value>;

/// A node in a workflow graph.
///
/// `data` is open-ended: the core never interprets node types, it only
/// inspects data fields that follow the reference naming convention.
/// Anything else the editor stores on the node (position, size, ...) rides
/// along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub data: NodeData,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: NodeData::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Set a data field.
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// A directed edge. Endpoints are not required to name existing nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Nodes and edges of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Check the only structural invariant the core cares about: every node
    /// has an id and ids are unique. Edge endpoints and cycles are not checked.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for (index, node) in self.nodes.iter().enumerate() {
            if node.id.trim().is_empty() {
                return Err(GenmediaError::MalformedGraph(format!(
                    "node at index {} has no id",
                    index
                )));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(GenmediaError::MalformedGraph(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }
        Ok(())
    }
}

// ── Workflow documents ───────────────────────────────────────────

pub const MAX_WORKFLOW_NAME_LEN: usize = 100;
pub const MAX_WORKFLOW_NODES: usize = 100;

/// A persisted workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub thumbnail_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    #[serde(rename = "user_email", default)]
    pub owner_email: String,
    #[serde(flatten)]
    pub graph: WorkflowGraph,
}

impl WorkflowDocument {
    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            is_public: self.is_public,
            thumbnail_ref: self.thumbnail_ref.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            owner_id: self.owner_id.clone(),
            owner_email: self.owner_email.clone(),
            node_count: self.graph.nodes.len(),
            edge_count: self.graph.edges.len(),
        }
    }
}

/// List-view projection of a workflow (no graph, no resolution).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_public: bool,
    pub thumbnail_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    #[serde(rename = "user_email")]
    pub owner_email: String,
    pub node_count: usize,
    pub edge_count: usize,
}

/// Caller-supplied fields of a workflow create/update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(flatten)]
    pub graph: WorkflowGraph,
}

impl WorkflowDraft {
    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(GenmediaError::InvalidInput("Workflow name is required".into()));
        }
        if self.name.chars().count() > MAX_WORKFLOW_NAME_LEN {
            return Err(GenmediaError::InvalidInput(format!(
                "Workflow name must be {} characters or less",
                MAX_WORKFLOW_NAME_LEN
            )));
        }
        if self.graph.nodes.is_empty() {
            return Err(GenmediaError::InvalidInput("At least one node is required".into()));
        }
        if self.graph.nodes.len() > MAX_WORKFLOW_NODES {
            return Err(GenmediaError::InvalidInput(format!(
                "Maximum {} nodes allowed per workflow",
                MAX_WORKFLOW_NODES
            )));
        }
        Ok(())
    }
}

/// Which workflows a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowScope {
    My,
    Public,
}

impl WorkflowScope {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "my" => Ok(Self::My),
            "public" => Ok(Self::Public),
            _ => Err(GenmediaError::InvalidInput(
                "Invalid scope. Must be 'my' or 'public'".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_preserves_unknown_fields() {
        let raw = json!({
            "id": "n1",
            "type": "imageGen",
            "position": {"x": 10, "y": 20},
            "data": {"prompt": "a fox", "imageRef": "abc"}
        });
        let node: Node = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(node.id, "n1");
        assert_eq!(node.node_type, "imageGen");
        assert_eq!(node.extra.get("position"), Some(&json!({"x": 10, "y": 20})));
        assert_eq!(serde_json::to_value(&node).unwrap(), raw);
    }

    #[test]
    fn test_validate_rejects_missing_and_duplicate_ids() {
        let graph: WorkflowGraph = serde_json::from_value(json!({
            "nodes": [{"type": "text", "data": {}}]
        }))
        .unwrap();
        assert!(matches!(graph.validate(), Err(GenmediaError::MalformedGraph(_))));

        let graph = WorkflowGraph::new(vec![Node::new("a", "x"), Node::new("a", "y")], vec![]);
        assert!(matches!(graph.validate(), Err(GenmediaError::MalformedGraph(_))));
    }

    #[test]
    fn test_validate_ignores_dangling_edges() {
        let graph = WorkflowGraph::new(
            vec![Node::new("a", "x")],
            vec![Edge::new("e1", "a", "ghost")],
        );
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_draft_validation() {
        let mut draft = WorkflowDraft {
            name: "Storyboard".into(),
            description: String::new(),
            is_public: false,
            graph: WorkflowGraph::new(vec![Node::new("a", "x")], vec![]),
        };
        assert!(draft.validate().is_ok());

        draft.name = "   ".into();
        assert!(draft.validate().is_err());

        draft.name = "x".repeat(101);
        assert!(draft.validate().is_err());

        draft.name = "ok".into();
        draft.graph.nodes.clear();
        assert!(draft.validate().is_err());

        draft.graph.nodes = (0..101).map(|i| Node::new(format!("n{}", i), "x")).collect();
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(WorkflowScope::parse("my").unwrap(), WorkflowScope::My);
        assert_eq!(WorkflowScope::parse("public").unwrap(), WorkflowScope::Public);
        assert!(WorkflowScope::parse("all").is_err());
    }
}
