//! Graph records and read-side views
//!
//! Write-side records (`NodeRecord`, `EdgeRecord`) are what the extractor
//! produces and the store persists under a version tag. Read-side views
//! (`NodeView`, `EdgeView`, `GraphSlice`) are what versioned queries return,
//! with store-assigned element ids.
//!
//! Identity:
//! - a node is (`kg_version`, `entity_label`, `name`)
//! - an edge is (`kg_version`, source, target, `predicate`)
//!
//! Property bags overwrite on upsert.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form properties attached to a node or edge.
pub type PropertyBag = serde_json::Map<String, serde_json::Value>;

/// Identity of a node within one version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    /// Type tag, e.g. `"Person"`.
    pub entity_label: String,
    /// Human-readable key, e.g. `"Alice"`.
    pub name: String,
}

impl NodeKey {
    /// Construct a key from label and name.
    pub fn new(entity_label: impl Into<String>, name: impl Into<String>) -> Self {
        NodeKey {
            entity_label: entity_label.into(),
            name: name.into(),
        }
    }
}

/// A node as produced by extraction, before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Type tag.
    pub entity_label: String,
    /// Human-readable key.
    pub name: String,
    /// Property bag; overwrites on upsert.
    #[serde(default)]
    pub properties: PropertyBag,
}

impl NodeRecord {
    /// A node with an empty property bag.
    pub fn new(entity_label: impl Into<String>, name: impl Into<String>) -> Self {
        NodeRecord {
            entity_label: entity_label.into(),
            name: name.into(),
            properties: PropertyBag::new(),
        }
    }

    /// The identity of this node within its version.
    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.entity_label.clone(), self.name.clone())
    }
}

/// An edge as produced by extraction, endpoints referenced by node key.
///
/// The property bag may carry `atomic_facts`, `t_obs`, `t_start`, `t_end`,
/// and `embeddings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Source node identity.
    pub source: NodeKey,
    /// Target node identity.
    pub target: NodeKey,
    /// Type tag, e.g. `"knows"`.
    pub predicate: String,
    /// Property bag; overwrites on upsert.
    #[serde(default)]
    pub properties: PropertyBag,
}

impl EdgeRecord {
    /// An edge with an empty property bag.
    pub fn new(source: NodeKey, target: NodeKey, predicate: impl Into<String>) -> Self {
        EdgeRecord {
            source,
            target,
            predicate: predicate.into(),
            properties: PropertyBag::new(),
        }
    }
}

/// The extractor's output: a full set of nodes and edges for one version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    /// All nodes, deduplicated by [`NodeKey`].
    pub nodes: Vec<NodeRecord>,
    /// All edges, deduplicated by (source, target, predicate).
    pub edges: Vec<EdgeRecord>,
}

impl KnowledgeGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or merge a node. Merging unions the property bags, with the
    /// incoming bag winning on key collisions.
    pub fn upsert_node(&mut self, node: NodeRecord) {
        if let Some(existing) = self
            .nodes
            .iter_mut()
            .find(|n| n.entity_label == node.entity_label && n.name == node.name)
        {
            existing.properties.extend(node.properties);
        } else {
            self.nodes.push(node);
        }
    }

    /// Insert or merge an edge, analogous to [`Self::upsert_node`].
    pub fn upsert_edge(&mut self, edge: EdgeRecord) {
        if let Some(existing) = self.edges.iter_mut().find(|e| {
            e.source == edge.source && e.target == edge.target && e.predicate == edge.predicate
        }) {
            existing.properties.extend(edge.properties);
        } else {
            self.edges.push(edge);
        }
    }

    /// Merge another graph into this one.
    pub fn merge(&mut self, other: KnowledgeGraph) {
        for node in other.nodes {
            self.upsert_node(node);
        }
        for edge in other.edges {
            self.upsert_edge(edge);
        }
    }

    /// True when the graph holds no nodes and no edges.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// A node in a query response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    /// Store-assigned element id, stable within one response.
    pub id: String,
    /// Type tags; for this service always a single entity label.
    pub labels: Vec<String>,
    /// Human-readable key, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Property bag; omitted when the caller asked for bare topology.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<PropertyBag>,
}

/// An edge in a query response. `source`/`target` reference [`NodeView::id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeView {
    /// Store-assigned element id.
    pub id: String,
    /// The edge's predicate.
    #[serde(rename = "type")]
    pub predicate: String,
    /// Element id of the source node.
    pub source: String,
    /// Element id of the target node.
    pub target: String,
    /// Property bag; omitted when the caller asked for bare topology.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<PropertyBag>,
}

/// Result of a versioned graph read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSlice {
    /// Nodes, up to the caller's limit.
    pub nodes: Vec<NodeView>,
    /// Edges, up to the caller's limit.
    pub edges: Vec<EdgeView>,
    /// True when either limit cut the result short.
    pub truncated: bool,
}

impl GraphSlice {
    /// Drop all property bags, keeping topology only.
    pub fn without_properties(mut self) -> Self {
        for node in &mut self.nodes {
            node.properties = None;
        }
        for edge in &mut self.edges {
            edge.properties = None;
        }
        self
    }

    /// Project a slice back to the extractor's graph type.
    ///
    /// Used to feed the previous version into an incremental build. Nodes
    /// without a name cannot be addressed by extraction and are skipped, as
    /// are edges referencing them.
    pub fn to_knowledge_graph(&self) -> KnowledgeGraph {
        let mut keys_by_id: HashMap<&str, NodeKey> = HashMap::new();
        let mut kg = KnowledgeGraph::new();
        for node in &self.nodes {
            let (Some(label), Some(name)) = (node.labels.first(), node.name.as_ref()) else {
                continue;
            };
            let key = NodeKey::new(label.clone(), name.clone());
            keys_by_id.insert(node.id.as_str(), key.clone());
            kg.upsert_node(NodeRecord {
                entity_label: key.entity_label,
                name: key.name,
                properties: node.properties.clone().unwrap_or_default(),
            });
        }
        for edge in &self.edges {
            let (Some(source), Some(target)) = (
                keys_by_id.get(edge.source.as_str()),
                keys_by_id.get(edge.target.as_str()),
            ) else {
                continue;
            };
            kg.upsert_edge(EdgeRecord {
                source: source.clone(),
                target: target.clone(),
                predicate: edge.predicate.clone(),
                properties: edge.properties.clone().unwrap_or_default(),
            });
        }
        kg
    }
}

/// Aggregate counts for one version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of nodes.
    pub entity_count: u64,
    /// Number of edges.
    pub relation_count: u64,
    /// Number of distinct entity labels.
    pub node_type_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(pairs: &[(&str, serde_json::Value)]) -> PropertyBag {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn upsert_node_merges_properties() {
        let mut kg = KnowledgeGraph::new();
        kg.upsert_node(NodeRecord {
            entity_label: "Person".into(),
            name: "Alice".into(),
            properties: bag(&[("age", json!(30)), ("city", json!("Paris"))]),
        });
        kg.upsert_node(NodeRecord {
            entity_label: "Person".into(),
            name: "Alice".into(),
            properties: bag(&[("age", json!(31))]),
        });

        assert_eq!(kg.nodes.len(), 1);
        assert_eq!(kg.nodes[0].properties["age"], json!(31));
        assert_eq!(kg.nodes[0].properties["city"], json!("Paris"));
    }

    #[test]
    fn same_name_different_label_is_a_different_node() {
        let mut kg = KnowledgeGraph::new();
        kg.upsert_node(NodeRecord::new("Person", "Mercury"));
        kg.upsert_node(NodeRecord::new("Planet", "Mercury"));
        assert_eq!(kg.nodes.len(), 2);
    }

    #[test]
    fn slice_projects_back_to_knowledge_graph() {
        let slice = GraphSlice {
            nodes: vec![
                NodeView {
                    id: "0".into(),
                    labels: vec!["Person".into()],
                    name: Some("Alice".into()),
                    properties: Some(bag(&[("age", json!(30))])),
                },
                NodeView {
                    id: "1".into(),
                    labels: vec!["Person".into()],
                    name: Some("Bob".into()),
                    properties: None,
                },
            ],
            edges: vec![EdgeView {
                id: "10".into(),
                predicate: "knows".into(),
                source: "0".into(),
                target: "1".into(),
                properties: None,
            }],
            truncated: false,
        };

        let kg = slice.to_knowledge_graph();
        assert_eq!(kg.nodes.len(), 2);
        assert_eq!(kg.edges.len(), 1);
        assert_eq!(kg.edges[0].source, NodeKey::new("Person", "Alice"));
        assert_eq!(kg.edges[0].target, NodeKey::new("Person", "Bob"));
    }

    #[test]
    fn edge_with_unknown_endpoint_is_dropped_in_projection() {
        let slice = GraphSlice {
            nodes: vec![NodeView {
                id: "0".into(),
                labels: vec!["Person".into()],
                name: Some("Alice".into()),
                properties: None,
            }],
            edges: vec![EdgeView {
                id: "10".into(),
                predicate: "knows".into(),
                source: "0".into(),
                target: "99".into(),
                properties: None,
            }],
            truncated: false,
        };
        assert!(slice.to_knowledge_graph().edges.is_empty());
    }
}
