//! Property-graph backend contract.
//!
//! The engine itself is opaque; this trait captures the operations the
//! access layer needs: single-cardinality property writes, label+NAME
//! lookups (exact, containing, regex) and simple-path enumeration to
//! user-flagged vertices. [`crate::graph::MemoryGraph`] is the in-process
//! reference implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::GraphError;

pub type VertexId = String;
pub type EdgeId = String;

/// NAME lookup mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameMatch {
    Exact(String),
    Containing(String),
    Regex(String),
}

/// Element map of a vertex: id, label, NAME and remaining properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexView {
    pub id: VertexId,
    pub label: String,
    pub name: String,
    pub properties: BTreeMap<String, String>,
}

/// Element map of an edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeView {
    pub id: EdgeId,
    pub label: String,
    pub src: VertexId,
    pub dst: VertexId,
    pub properties: BTreeMap<String, String>,
}

/// One element of an alternating vertex/edge path.
#[derive(Debug, Clone)]
pub enum PathElement {
    Vertex(VertexView),
    Edge(EdgeView),
}

#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Insert a vertex with its NAME and initial properties.
    async fn create_vertex(
        &self,
        label: &str,
        name: &str,
        properties: BTreeMap<String, String>,
    ) -> Result<VertexId, GraphError>;

    async fn vertex(&self, id: &VertexId) -> Result<VertexView, GraphError>;

    /// Single-cardinality property write (replaces any existing value).
    async fn set_vertex_property(
        &self,
        id: &VertexId,
        key: &str,
        value: &str,
    ) -> Result<(), GraphError>;

    /// Vertices of `label` whose NAME matches.
    async fn find_vertices(
        &self,
        label: &str,
        name: &NameMatch,
    ) -> Result<Vec<VertexView>, GraphError>;

    async fn all_vertices(&self) -> Result<Vec<VertexView>, GraphError>;

    async fn all_edges(&self) -> Result<Vec<EdgeView>, GraphError>;

    /// Outgoing and incoming edges of a vertex, each paired with the
    /// neighbor's element map.
    async fn edges_of(
        &self,
        id: &VertexId,
    ) -> Result<(Vec<(EdgeView, VertexView)>, Vec<(EdgeView, VertexView)>), GraphError>;

    /// The unique edge `(src, label, dst)`, if present.
    async fn find_edge(
        &self,
        src: &VertexId,
        label: &str,
        dst: &VertexId,
    ) -> Result<Option<EdgeView>, GraphError>;

    async fn create_edge(
        &self,
        src: &VertexId,
        label: &str,
        dst: &VertexId,
        properties: BTreeMap<String, String>,
    ) -> Result<EdgeId, GraphError>;

    /// Single-cardinality edge property write.
    async fn set_edge_property(
        &self,
        edge_id: &EdgeId,
        key: &str,
        value: &str,
    ) -> Result<(), GraphError>;

    /// The self path (when `start` is itself flagged interested) plus all
    /// simple paths of length <= `n` hops terminating at an interested
    /// vertex, as alternating vertex/edge element maps.
    async fn paths_to_interested(
        &self,
        start: &VertexId,
        n: u32,
    ) -> Result<Vec<Vec<PathElement>>, GraphError>;

    /// Drop every edge, then every vertex. Destructive and unrecoverable;
    /// returns the deleted (vertex, edge) counts.
    async fn purge(&self) -> Result<(usize, usize), GraphError>;

    /// Re-establish the connection after a transient failure.
    async fn reconnect(&self) -> Result<(), GraphError>;
}
