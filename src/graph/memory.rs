//! In-process reference backend.
//!
//! Vertices and edges live in hash maps, with a petgraph graph mirroring the
//! topology for traversal. Tests can inject transient failures to exercise
//! the access layer's reconnect path.

use async_trait::async_trait;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::Direction;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::GraphError;
use crate::graph::backend::{
    EdgeId, EdgeView, GraphBackend, NameMatch, PathElement, VertexId, VertexView,
};
use crate::graph::{PROP_INTERESTED, PROP_NAME};

#[derive(Debug, Clone)]
struct VertexData {
    label: String,
    name: String,
    properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct EdgeData {
    label: String,
    src: VertexId,
    dst: VertexId,
    properties: BTreeMap<String, String>,
}

#[derive(Default)]
struct Inner {
    graph: Graph<VertexId, EdgeId>,
    node_index: HashMap<VertexId, NodeIndex>,
    vertices: HashMap<VertexId, VertexData>,
    edges: HashMap<EdgeId, EdgeData>,
    pending_failures: u32,
}

impl Inner {
    fn take_failure(&mut self) -> Result<(), GraphError> {
        if self.pending_failures > 0 {
            self.pending_failures -= 1;
            return Err(GraphError::Transient(
                "503, message='Invalid response status'".to_string(),
            ));
        }
        Ok(())
    }

    fn view(&self, id: &VertexId) -> Option<VertexView> {
        self.vertices.get(id).map(|data| VertexView {
            id: id.clone(),
            label: data.label.clone(),
            name: data.name.clone(),
            properties: data.properties.clone(),
        })
    }

    fn edge_view(&self, id: &EdgeId) -> Option<EdgeView> {
        self.edges.get(id).map(|data| EdgeView {
            id: id.clone(),
            label: data.label.clone(),
            src: data.src.clone(),
            dst: data.dst.clone(),
            properties: data.properties.clone(),
        })
    }

    fn is_interested(&self, id: &VertexId) -> bool {
        self.vertices
            .get(id)
            .and_then(|v| v.properties.get(PROP_INTERESTED))
            .map(|v| v == "YES")
            .unwrap_or(false)
    }

    /// DFS over both edge directions collecting simple paths that end at an
    /// interested vertex, emitting at every depth up to `n`.
    fn collect_paths(
        &self,
        current: NodeIndex,
        depth_left: u32,
        path: &mut Vec<PathElement>,
        visited: &mut HashSet<NodeIndex>,
        out: &mut Vec<Vec<PathElement>>,
    ) {
        if depth_left == 0 {
            return;
        }
        let mut incident: Vec<petgraph::graph::EdgeIndex> = self
            .graph
            .edges_directed(current, Direction::Outgoing)
            .chain(self.graph.edges_directed(current, Direction::Incoming))
            .map(|e| petgraph::visit::EdgeRef::id(&e))
            .collect();
        incident.sort();
        incident.dedup();
        for edge_idx in incident {
            let Some((a, b)) = self.graph.edge_endpoints(edge_idx) else {
                continue;
            };
            let neighbor = if a == current { b } else { a };
            if visited.contains(&neighbor) {
                continue;
            }
            let edge_id = &self.graph[edge_idx];
            let Some(edge_view) = self.edge_view(edge_id) else {
                continue;
            };
            let neighbor_id = &self.graph[neighbor];
            let Some(neighbor_view) = self.view(neighbor_id) else {
                continue;
            };
            path.push(PathElement::Edge(edge_view));
            path.push(PathElement::Vertex(neighbor_view));
            visited.insert(neighbor);
            if self.is_interested(neighbor_id) {
                out.push(path.clone());
            }
            self.collect_paths(neighbor, depth_left - 1, path, visited, out);
            visited.remove(&neighbor);
            path.pop();
            path.pop();
        }
    }
}

pub struct MemoryGraph {
    inner: Mutex<Inner>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Make the next `count` backend operations fail transiently.
    pub fn inject_transient_failures(&self, count: u32) {
        self.inner.lock().expect("graph poisoned").pending_failures = count;
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphBackend for MemoryGraph {
    async fn create_vertex(
        &self,
        label: &str,
        name: &str,
        mut properties: BTreeMap<String, String>,
    ) -> Result<VertexId, GraphError> {
        let mut inner = self.inner.lock().expect("graph poisoned");
        inner.take_failure()?;
        let id = Uuid::new_v4().to_string();
        properties.remove(PROP_NAME);
        let node = inner.graph.add_node(id.clone());
        inner.node_index.insert(id.clone(), node);
        inner.vertices.insert(
            id.clone(),
            VertexData {
                label: label.to_string(),
                name: name.to_string(),
                properties,
            },
        );
        Ok(id)
    }

    async fn vertex(&self, id: &VertexId) -> Result<VertexView, GraphError> {
        let mut inner = self.inner.lock().expect("graph poisoned");
        inner.take_failure()?;
        inner
            .view(id)
            .ok_or_else(|| GraphError::VertexNotFound(id.clone()))
    }

    async fn set_vertex_property(
        &self,
        id: &VertexId,
        key: &str,
        value: &str,
    ) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().expect("graph poisoned");
        inner.take_failure()?;
        let data = inner
            .vertices
            .get_mut(id)
            .ok_or_else(|| GraphError::VertexNotFound(id.clone()))?;
        if key == PROP_NAME {
            data.name = value.to_string();
        } else {
            data.properties.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn find_vertices(
        &self,
        label: &str,
        name: &NameMatch,
    ) -> Result<Vec<VertexView>, GraphError> {
        let mut inner = self.inner.lock().expect("graph poisoned");
        inner.take_failure()?;
        let regex = match name {
            NameMatch::Regex(pattern) => Some(
                Regex::new(pattern).map_err(|e| GraphError::InvalidPattern(e.to_string()))?,
            ),
            _ => None,
        };
        let mut found: Vec<VertexView> = inner
            .vertices
            .iter()
            .filter(|(_, data)| data.label == label)
            .filter(|(_, data)| match name {
                NameMatch::Exact(wanted) => &data.name == wanted,
                NameMatch::Containing(wanted) => data.name.contains(wanted.as_str()),
                NameMatch::Regex(_) => regex.as_ref().expect("compiled above").is_match(&data.name),
            })
            .map(|(id, data)| VertexView {
                id: id.clone(),
                label: data.label.clone(),
                name: data.name.clone(),
                properties: data.properties.clone(),
            })
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn all_vertices(&self) -> Result<Vec<VertexView>, GraphError> {
        let mut inner = self.inner.lock().expect("graph poisoned");
        inner.take_failure()?;
        let mut all: Vec<VertexView> = inner
            .vertices
            .keys()
            .filter_map(|id| inner.view(id))
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn all_edges(&self) -> Result<Vec<EdgeView>, GraphError> {
        let mut inner = self.inner.lock().expect("graph poisoned");
        inner.take_failure()?;
        let mut all: Vec<EdgeView> = inner
            .edges
            .keys()
            .filter_map(|id| inner.edge_view(id))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn edges_of(
        &self,
        id: &VertexId,
    ) -> Result<(Vec<(EdgeView, VertexView)>, Vec<(EdgeView, VertexView)>), GraphError> {
        let mut inner = self.inner.lock().expect("graph poisoned");
        inner.take_failure()?;
        let mut outgoing = Vec::new();
        let mut incoming = Vec::new();
        for (edge_id, data) in &inner.edges {
            if &data.src == id {
                if let (Some(edge), Some(dst)) = (inner.edge_view(edge_id), inner.view(&data.dst)) {
                    outgoing.push((edge, dst));
                }
            }
            if &data.dst == id {
                if let (Some(edge), Some(src)) = (inner.edge_view(edge_id), inner.view(&data.src)) {
                    incoming.push((edge, src));
                }
            }
        }
        outgoing.sort_by(|a, b| a.0.id.cmp(&b.0.id));
        incoming.sort_by(|a, b| a.0.id.cmp(&b.0.id));
        Ok((outgoing, incoming))
    }

    async fn find_edge(
        &self,
        src: &VertexId,
        label: &str,
        dst: &VertexId,
    ) -> Result<Option<EdgeView>, GraphError> {
        let mut inner = self.inner.lock().expect("graph poisoned");
        inner.take_failure()?;
        let found = inner
            .edges
            .iter()
            .find(|(_, data)| &data.src == src && data.label == label && &data.dst == dst)
            .map(|(id, _)| id.clone());
        Ok(found.and_then(|id| inner.edge_view(&id)))
    }

    async fn create_edge(
        &self,
        src: &VertexId,
        label: &str,
        dst: &VertexId,
        properties: BTreeMap<String, String>,
    ) -> Result<EdgeId, GraphError> {
        let mut inner = self.inner.lock().expect("graph poisoned");
        inner.take_failure()?;
        let (src_node, dst_node) = match (
            inner.node_index.get(src).copied(),
            inner.node_index.get(dst).copied(),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(GraphError::VertexNotFound(format!("{src} or {dst}")));
            }
        };
        let id = Uuid::new_v4().to_string();
        inner.graph.add_edge(src_node, dst_node, id.clone());
        inner.edges.insert(
            id.clone(),
            EdgeData {
                label: label.to_string(),
                src: src.clone(),
                dst: dst.clone(),
                properties,
            },
        );
        Ok(id)
    }

    async fn set_edge_property(
        &self,
        edge_id: &EdgeId,
        key: &str,
        value: &str,
    ) -> Result<(), GraphError> {
        let mut inner = self.inner.lock().expect("graph poisoned");
        inner.take_failure()?;
        let data = inner
            .edges
            .get_mut(edge_id)
            .ok_or_else(|| GraphError::EdgeNotFound(edge_id.clone()))?;
        data.properties.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn paths_to_interested(
        &self,
        start: &VertexId,
        n: u32,
    ) -> Result<Vec<Vec<PathElement>>, GraphError> {
        let mut inner = self.inner.lock().expect("graph poisoned");
        inner.take_failure()?;
        let Some(&start_node) = inner.node_index.get(start) else {
            return Err(GraphError::VertexNotFound(start.clone()));
        };
        let start_view = inner
            .view(start)
            .ok_or_else(|| GraphError::VertexNotFound(start.clone()))?;

        let mut paths = Vec::new();
        if inner.is_interested(start) {
            paths.push(vec![PathElement::Vertex(start_view.clone())]);
        }
        let mut path = vec![PathElement::Vertex(start_view)];
        let mut visited = HashSet::from([start_node]);
        inner.collect_paths(start_node, n, &mut path, &mut visited, &mut paths);
        Ok(paths)
    }

    async fn purge(&self) -> Result<(usize, usize), GraphError> {
        let mut inner = self.inner.lock().expect("graph poisoned");
        inner.take_failure()?;
        let vertex_count = inner.vertices.len();
        let edge_count = inner.edges.len();
        inner.edges.clear();
        inner.vertices.clear();
        inner.node_index.clear();
        inner.graph = Graph::new();
        Ok((vertex_count, edge_count))
    }

    async fn reconnect(&self) -> Result<(), GraphError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn vertex_round_trip_and_lookup_modes() {
        let graph = MemoryGraph::new();
        let id = graph
            .create_vertex("COMPANY", "ADVANCED MICRO DEVICES", props(&[("INDUSTRY", "SEMICONDUCTORS")]))
            .await
            .unwrap();

        let exact = graph
            .find_vertices("COMPANY", &NameMatch::Exact("ADVANCED MICRO DEVICES".into()))
            .await
            .unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].id, id);

        let containing = graph
            .find_vertices("COMPANY", &NameMatch::Containing("MICRO".into()))
            .await
            .unwrap();
        assert_eq!(containing.len(), 1);

        let regex = graph
            .find_vertices(
                "COMPANY",
                &NameMatch::Regex(crate::graph::names::acronym_pattern("AMD")),
            )
            .await
            .unwrap();
        assert_eq!(regex.len(), 1);

        let wrong_label = graph
            .find_vertices("PERSON", &NameMatch::Containing("MICRO".into()))
            .await
            .unwrap();
        assert!(wrong_label.is_empty());
    }

    #[tokio::test]
    async fn paths_include_self_when_interested() {
        let graph = MemoryGraph::new();
        let id = graph
            .create_vertex("COMPANY", "ACME", props(&[("INTERESTED", "YES")]))
            .await
            .unwrap();
        let paths = graph.paths_to_interested(&id, 0).await.unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 1);
    }

    #[tokio::test]
    async fn paths_traverse_both_directions_within_n() {
        let graph = MemoryGraph::new();
        let a = graph.create_vertex("COMPANY", "A", props(&[])).await.unwrap();
        let b = graph.create_vertex("COMPANY", "B", props(&[])).await.unwrap();
        let c = graph
            .create_vertex("COMPANY", "C", props(&[("INTERESTED", "YES")]))
            .await
            .unwrap();
        // A -> B, C -> B: reaching C from A requires following an incoming edge.
        graph.create_edge(&a, "is a customer of", &b, props(&[])).await.unwrap();
        graph.create_edge(&c, "is a supplier/partner of", &b, props(&[])).await.unwrap();

        let paths = graph.paths_to_interested(&a, 2).await.unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 5); // V E V E V

        let too_short = graph.paths_to_interested(&a, 1).await.unwrap();
        assert!(too_short.is_empty());
    }

    #[tokio::test]
    async fn simple_path_never_revisits_vertices() {
        let graph = MemoryGraph::new();
        let a = graph.create_vertex("COMPANY", "A", props(&[])).await.unwrap();
        let b = graph
            .create_vertex("COMPANY", "B", props(&[("INTERESTED", "YES")]))
            .await
            .unwrap();
        graph.create_edge(&a, "knows", &b, props(&[])).await.unwrap();
        graph.create_edge(&b, "knows", &a, props(&[])).await.unwrap();
        let paths = graph.paths_to_interested(&a, 4).await.unwrap();
        // Both parallel edges reach B once each; no path bounces back to A.
        assert_eq!(paths.len(), 2);
        for path in paths {
            assert_eq!(path.len(), 3);
        }
    }

    #[tokio::test]
    async fn transient_injection_surfaces_and_clears() {
        let graph = MemoryGraph::new();
        graph.inject_transient_failures(1);
        let err = graph.all_vertices().await.unwrap_err();
        assert!(matches!(err, GraphError::Transient(_)));
        assert!(graph.all_vertices().await.is_ok());
    }
}
