use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use genmedia_core::config::ResolverConfig;
use genmedia_core::error::{GenmediaError, Result};
use genmedia_core::graph::{Node, NodeData, WorkflowGraph};
use genmedia_core::traits::ArtifactStore;
use genmedia_core::types::{ArtifactId, ResolvedLocator};

use crate::convention::ReferenceConvention;

/// Rewrites graphs so that every artifact reference sits next to its locator.
///
/// Resolution is additive and never fails on a bad reference: a missing or
/// unreachable artifact becomes `exists: false` with a null locator. Only a
/// structurally malformed graph is an error.
pub struct GraphResolver {
    store: Arc<dyn ArtifactStore>,
    convention: ReferenceConvention,
    max_concurrent_lookups: usize,
}

impl GraphResolver {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        convention: ReferenceConvention,
        max_concurrent_lookups: usize,
    ) -> Self {
        Self {
            store,
            convention,
            max_concurrent_lookups: max_concurrent_lookups.max(1),
        }
    }

    pub fn from_config(store: Arc<dyn ArtifactStore>, config: &ResolverConfig) -> Self {
        Self::new(
            store,
            ReferenceConvention::from_config(config),
            config.max_concurrent_lookups,
        )
    }

    /// Return a resolved copy of `graph`. The input is not modified.
    pub async fn resolve(&self, graph: &WorkflowGraph) -> Result<WorkflowGraph> {
        graph.validate()?;

        let mut ids = BTreeSet::new();
        for node in &graph.nodes {
            self.convention.collect_ids(&node.data, &mut ids);
        }

        let locators = if ids.is_empty() {
            HashMap::new()
        } else {
            let ids: Vec<ArtifactId> = ids.into_iter().collect();
            self.lookup(&ids).await
        };

        let nodes = graph
            .nodes
            .iter()
            .map(|node| self.rewrite_node(node, &locators))
            .collect();

        Ok(WorkflowGraph {
            nodes,
            edges: graph.edges.clone(),
        })
    }

    /// Resolve each id independently, at most `max_concurrent_lookups` at a time.
    pub async fn lookup(&self, ids: &[ArtifactId]) -> HashMap<ArtifactId, ResolvedLocator> {
        let outcomes = self
            .store
            .batch_get(ids, self.max_concurrent_lookups)
            .await;

        let mut locators = HashMap::with_capacity(ids.len());
        for id in ids {
            let locator = match outcomes.get(id) {
                Some(Ok(record)) => ResolvedLocator::found(record),
                Some(Err(GenmediaError::NotFound(_))) | None => {
                    debug!(artifact_id = %id, "Referenced artifact does not exist");
                    ResolvedLocator::missing()
                }
                Some(Err(e)) => {
                    warn!(artifact_id = %id, error = %e, "Failed to resolve artifact");
                    ResolvedLocator::missing()
                }
            };
            locators.insert(id.clone(), locator);
        }
        locators
    }

    fn rewrite_node(&self, node: &Node, locators: &HashMap<ArtifactId, ResolvedLocator>) -> Node {
        if !self.convention.has_refs(&node.data) {
            return node.clone();
        }

        let mut data = node.data.clone();
        for (key, value) in self.convention.top_level_refs(&node.data) {
            let resolved = value
                .as_str()
                .and_then(|id| locators.get(&ArtifactId::from(id)));
            self.add_companions(&mut data, key, resolved);
        }

        let nested_key = self.convention.nested_map_key();
        let mut outputs = None;
        for (key, id) in self.convention.nested_refs(&node.data) {
            let map = outputs.get_or_insert_with(|| nested_map(&node.data, nested_key));
            self.add_companions(map, key, locators.get(&ArtifactId::from(id)));
        }
        if let Some(map) = outputs {
            data.insert(nested_key.to_string(), Value::Object(map));
        }

        Node {
            data,
            ..node.clone()
        }
    }

    fn add_companions(&self, data: &mut NodeData, key: &str, resolved: Option<&ResolvedLocator>) {
        let (locator, exists) = match resolved {
            Some(r) => (r.locator.clone(), r.exists),
            None => (None, false),
        };
        data.insert(
            self.convention.locator_key(key),
            locator.map(Value::String).unwrap_or(Value::Null),
        );
        data.insert(self.convention.exists_key(key), Value::Bool(exists));
    }
}

fn nested_map(data: &NodeData, key: &str) -> NodeData {
    data.get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use genmedia_core::graph::Edge;
    use genmedia_core::types::ArtifactKind;
    use genmedia_test_utils::*;
    use serde_json::json;

    fn resolver(store: &Arc<MemoryArtifactStore>) -> GraphResolver {
        GraphResolver::new(store.clone(), ReferenceConvention::default(), 8)
    }

    #[tokio::test]
    async fn test_missing_reference_scenario() {
        let store = Arc::new(MemoryArtifactStore::new());
        let graph = WorkflowGraph::new(
            vec![Node::new("n1", "imageInput").with_data("imageRef", json!("abc-123"))],
            vec![],
        );

        let resolved = resolver(&store).resolve(&graph).await.unwrap();
        let data = &resolved.nodes[0].data;
        assert_eq!(data["imageRef"], json!("abc-123"));
        assert_eq!(data["imageUrl"], Value::Null);
        assert_eq!(data["imageRefExists"], json!(false));
    }

    #[tokio::test]
    async fn test_partial_failure_never_raises() {
        let store = Arc::new(MemoryArtifactStore::new());
        let record = store.insert("present", ArtifactKind::Image, "u1");
        store.break_id("unreachable");
        let graph = WorkflowGraph::new(
            vec![
                image_node("a", "present"),
                image_node("b", "gone"),
                image_node("c", "unreachable"),
            ],
            vec![],
        );

        let resolved = resolver(&store).resolve(&graph).await.unwrap();
        assert_eq!(resolved.nodes[0].data["imageUrl"], json!(record.locator));
        assert_eq!(resolved.nodes[0].data["imageRefExists"], json!(true));
        assert_eq!(resolved.nodes[1].data["imageRefExists"], json!(false));
        assert_eq!(resolved.nodes[2].data["imageRefExists"], json!(false));
        assert_eq!(resolved.nodes[2].data["imageUrl"], Value::Null);
    }

    #[tokio::test]
    async fn test_graph_without_references_is_unchanged() {
        let store = Arc::new(MemoryArtifactStore::new());
        let graph = WorkflowGraph::new(
            vec![
                Node::new("t1", "text").with_data("prompt", json!("abc-123")),
                Node::new("t2", "text"),
            ],
            vec![Edge::new("e1", "t1", "t2")],
        );

        let resolved = resolver(&store).resolve(&graph).await.unwrap();
        assert_eq!(resolved, graph);
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_shared_reference_resolved_once() {
        let store = Arc::new(MemoryArtifactStore::new());
        store.insert("shared", ArtifactKind::Video, "u1");
        let graph = WorkflowGraph::new(
            vec![
                Node::new("a", "video").with_data("videoRef", json!("shared")),
                image_node("b", "shared"),
                Node::new("c", "gen").with_data("outputs", json!({"videoRef": "shared"})),
            ],
            vec![],
        );

        let resolved = resolver(&store).resolve(&graph).await.unwrap();
        assert_eq!(store.get_calls(), 1);
        assert_eq!(resolved.nodes[2].data["outputs"]["videoRefExists"], json!(true));
        assert_eq!(resolved.nodes[2].data["outputs"]["videoRef"], json!("shared"));
    }

    #[tokio::test]
    async fn test_nested_outputs_keep_other_fields() {
        let store = Arc::new(MemoryArtifactStore::new());
        let graph = WorkflowGraph::new(
            vec![Node::new("g", "videoGen").with_data(
                "outputs",
                json!({"videoRef": "missing", "duration": 8, "label": "clipRef"}),
            )],
            vec![],
        );

        let resolved = resolver(&store).resolve(&graph).await.unwrap();
        let outputs = &resolved.nodes[0].data["outputs"];
        assert_eq!(
            outputs,
            &json!({
                "videoRef": "missing",
                "videoUrl": null,
                "videoRefExists": false,
                "duration": 8,
                "label": "clipRef"
            })
        );
    }

    #[tokio::test]
    async fn test_non_string_reference_marked_missing() {
        let store = Arc::new(MemoryArtifactStore::new());
        let graph = WorkflowGraph::new(
            vec![Node::new("n", "imageInput").with_data("imageRef", Value::Null)],
            vec![],
        );

        let resolved = resolver(&store).resolve(&graph).await.unwrap();
        assert_eq!(resolved.nodes[0].data["imageRefExists"], json!(false));
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_stored_graph_not_mutated_and_edges_untouched() {
        let store = Arc::new(MemoryArtifactStore::new());
        let graph = WorkflowGraph::new(
            vec![image_node("a", "x")],
            vec![Edge::new("e1", "a", "ghost")],
        );
        let before = graph.clone();

        let resolved = resolver(&store).resolve(&graph).await.unwrap();
        assert_eq!(graph, before);
        assert_eq!(resolved.edges, before.edges);
        assert!(!graph.nodes[0].data.contains_key("imageUrl"));
    }

    #[tokio::test]
    async fn test_malformed_graph_is_an_error() {
        let store = Arc::new(MemoryArtifactStore::new());
        let graph = WorkflowGraph::new(vec![image_node("", "x")], vec![]);
        let err = resolver(&store).resolve(&graph).await.unwrap_err();
        assert!(matches!(err, GenmediaError::MalformedGraph(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_respect_concurrency_cap() {
        let store = Arc::new(MemoryArtifactStore::new().with_get_delay(Duration::from_millis(50)));
        let nodes = (0..20)
            .map(|i| image_node(&format!("n{}", i), &format!("ref-{}", i)))
            .collect();
        let graph = WorkflowGraph::new(nodes, vec![]);

        let resolver = GraphResolver::new(store.clone(), ReferenceConvention::default(), 4);
        resolver.resolve(&graph).await.unwrap();

        assert_eq!(store.get_calls(), 20);
        assert!(store.peak_in_flight() <= 4, "peak {}", store.peak_in_flight());
        assert!(store.peak_in_flight() > 1);
    }
}
