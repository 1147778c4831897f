//! Entity resolution and idempotent graph mutation.
//!
//! Every vertex write goes through four-way candidate search (exact,
//! acronym, substring, acronym expansion) followed by LLM disambiguation, so
//! re-ingesting a document lands on the same vertices. Edge writes MERGE
//! property values as comma-joined sets, which is what makes reruns safe.

use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{GraphError, Result};
use crate::graph::backend::{GraphBackend, NameMatch, PathElement, VertexId, VertexView};
use crate::graph::names::{acronym, acronym_pattern, clean_name, sub_name};
use crate::graph::{PROP_INTERESTED, PROP_NAME};
use crate::llm::client::transcript;
use crate::llm::{prompts, text_within_tags, LlmGateway};

/// Narrative vertex attributes that overwrite instead of set-merging.
const NARRATIVE_ATTRIBUTES: [&str; 2] = [
    "SUMMARY_OF_BUSINESS_PERFORMANCE",
    "SUMMARY_OF_BUSINESS_STRATEGY",
];

const NO_MATCH: &str = "NO MATCH FOUND";

/// Edge property hidden from rendered path strings.
const HIDDEN_PATH_PROP: &str = "ROLE";

/// A path from a query entity to an interested entity, rendered for prompts
/// and for the persisted news record.
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct PathHit {
    pub path: String,
    pub interested_entity: String,
}

/// Row of the entities listing.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySummary {
    #[serde(rename = "ID")]
    pub id: VertexId,
    #[serde(rename = "LABEL")]
    pub label: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "INTERESTED")]
    pub interested: String,
}

struct Candidate {
    view: VertexView,
    edges: Vec<String>,
}

impl Candidate {
    fn to_json(&self) -> Value {
        json!({
            "ID": self.view.id,
            "LABEL": self.view.label,
            "NAME": self.view.name,
            "PROPERTIES": self.view.properties,
            "EDGES": self.edges,
        })
    }
}

pub struct GraphAccess {
    backend: Arc<dyn GraphBackend>,
    gateway: Arc<LlmGateway>,
    transient_backoff_secs: RangeInclusive<u64>,
}

impl GraphAccess {
    pub fn new(backend: Arc<dyn GraphBackend>, gateway: Arc<LlmGateway>) -> Self {
        Self {
            backend,
            gateway,
            transient_backoff_secs: 10..=30,
        }
    }

    /// Override the transient-failure backoff window; tests shrink it.
    pub fn with_transient_backoff(mut self, range: RangeInclusive<u64>) -> Self {
        self.transient_backoff_secs = range;
        self
    }

    pub fn backend(&self) -> &Arc<dyn GraphBackend> {
        &self.backend
    }

    /// Resolve `name` to an existing vertex id, or create one with the
    /// supplied attributes. Existing vertices get their attributes MERGEd.
    pub async fn get_or_create_id(
        &self,
        label: &str,
        name: &str,
        attributes: &[(String, String)],
        context_edges: &[String],
    ) -> Result<VertexId> {
        let first = self
            .get_or_create_inner(label, name, attributes, context_edges)
            .await;
        match first {
            Err(crate::error::DocGraphError::Graph(GraphError::Transient(msg))) => {
                let secs = rand::thread_rng().gen_range(self.transient_backoff_secs.clone());
                debug!("transient graph failure ({msg}), reconnecting in {secs}s");
                tokio::time::sleep(Duration::from_secs(secs)).await;
                self.backend.reconnect().await?;
                self.get_or_create_inner(label, name, attributes, context_edges)
                    .await
            }
            other => other,
        }
    }

    async fn get_or_create_inner(
        &self,
        label: &str,
        name: &str,
        attributes: &[(String, String)],
        context_edges: &[String],
    ) -> Result<VertexId> {
        let properties = attributes_as_json(attributes);
        let edges = Value::Array(
            context_edges
                .iter()
                .map(|e| Value::String(e.clone()))
                .collect(),
        );
        match self.resolve(label, name, &properties, &edges).await? {
            Some(id) => {
                self.merge_vertex_attributes(&id, attributes).await?;
                Ok(id)
            }
            None => {
                let cleaned = clean_name(name);
                let mut props: BTreeMap<String, String> = BTreeMap::new();
                for (key, value) in attributes {
                    props.insert(key.clone(), value.clone());
                }
                let id = self.backend.create_vertex(label, &cleaned, props).await?;
                info!(label, name = %cleaned, "created vertex");
                Ok(id)
            }
        }
    }

    /// Four-way candidate search plus LLM disambiguation; `None` when the
    /// graph has no plausible match.
    pub async fn resolve(
        &self,
        label: &str,
        name: &str,
        properties: &Value,
        edges: &Value,
    ) -> Result<Option<VertexId>> {
        let cleaned = clean_name(name);
        let candidates = self.candidates(label, name, &cleaned).await?;
        if candidates.is_empty() {
            return Ok(None);
        }
        let entity = json!({
            "LABEL": label,
            "NAME": cleaned,
            "PROPERTIES": properties,
            "EDGES": edges,
        });
        self.disambiguate(&entity, &cleaned, &candidates).await
    }

    async fn candidates(
        &self,
        label: &str,
        raw_name: &str,
        cleaned: &str,
    ) -> Result<Vec<Candidate>> {
        let mut searches = vec![NameMatch::Exact(cleaned.to_string())];
        if let Some(acr) = acronym(cleaned) {
            searches.push(NameMatch::Exact(acr));
        }
        if let Some(sub) = sub_name(cleaned) {
            searches.push(NameMatch::Containing(sub));
        }
        searches.push(NameMatch::Regex(acronym_pattern(raw_name)));

        let mut seen: Vec<VertexView> = Vec::new();
        for search in &searches {
            let found = match self.backend.find_vertices(label, search).await {
                Ok(found) => found,
                // A degenerate name can produce an unusable pattern; the
                // other searches still stand.
                Err(GraphError::InvalidPattern(_)) => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            for view in found {
                if !seen.iter().any(|v| v.id == view.id) {
                    seen.push(view);
                }
            }
        }

        let mut candidates = Vec::with_capacity(seen.len());
        for view in seen {
            let (outgoing, incoming) = self.backend.edges_of(&view.id).await?;
            let mut edges = Vec::new();
            for (edge, dst) in &outgoing {
                edges.push(render_context_edge(&view.name, edge, &dst.name, true));
            }
            for (edge, src) in &incoming {
                edges.push(render_context_edge(&view.name, edge, &src.name, false));
            }
            candidates.push(Candidate { view, edges });
        }
        Ok(candidates)
    }

    async fn disambiguate(
        &self,
        entity: &Value,
        entity_name: &str,
        candidates: &[Candidate],
    ) -> Result<Option<VertexId>> {
        let mut blocks = String::new();
        for candidate in candidates {
            blocks.push_str("<potential-entity-match>\n");
            blocks.push_str(&candidate.to_json().to_string());
            blocks.push_str("\n</potential-entity-match>\n\n");
        }
        let messages = prompts::disambiguation(&entity.to_string(), &blocks);
        let completion = self.gateway.query(messages.clone()).await?;
        let results = text_within_tags(&completion, "results").trim().to_string();

        let history = format!("{}\n\n{completion}", transcript(&messages));
        self.gateway
            .audit()
            .save(&format!("disambiguate->{entity_name}"), &history);

        if results == NO_MATCH || results.is_empty() {
            Ok(None)
        } else {
            Ok(Some(results))
        }
    }

    /// MERGE attributes into an existing vertex: list-valued attributes
    /// union with the stored comma-set, narrative summaries overwrite.
    async fn merge_vertex_attributes(
        &self,
        id: &VertexId,
        attributes: &[(String, String)],
    ) -> Result<()> {
        let existing = self.backend.vertex(id).await?.properties;
        for (key, value) in attributes {
            if NARRATIVE_ATTRIBUTES.contains(&key.as_str()) {
                self.backend.set_vertex_property(id, key, value).await?;
            } else {
                let mut combined = value.clone();
                if let Some(current) = existing.get(key) {
                    combined.push(',');
                    combined.push_str(current);
                }
                let merged = merge_comma_set(&combined.to_uppercase(), "");
                self.backend.set_vertex_property(id, key, &merged).await?;
            }
        }
        Ok(())
    }

    /// Insert the `(src, label, dst)` edge or MERGE properties into it.
    /// Property values are comma-joined sets; merging is a set union.
    pub async fn add_or_update_edge(
        &self,
        src: &VertexId,
        label: &str,
        dst: &VertexId,
        properties: &BTreeMap<String, String>,
    ) -> Result<()> {
        let first = self.add_or_update_edge_inner(src, label, dst, properties).await;
        match first {
            Err(crate::error::DocGraphError::Graph(GraphError::Transient(msg))) => {
                let secs = rand::thread_rng().gen_range(self.transient_backoff_secs.clone());
                debug!("transient graph failure ({msg}), reconnecting in {secs}s");
                tokio::time::sleep(Duration::from_secs(secs)).await;
                self.backend.reconnect().await?;
                self.add_or_update_edge_inner(src, label, dst, properties)
                    .await
            }
            other => other,
        }
    }

    async fn add_or_update_edge_inner(
        &self,
        src: &VertexId,
        label: &str,
        dst: &VertexId,
        properties: &BTreeMap<String, String>,
    ) -> Result<()> {
        match self.backend.find_edge(src, label, dst).await? {
            None => {
                let deduped: BTreeMap<String, String> = properties
                    .iter()
                    .map(|(k, v)| (k.clone(), merge_comma_set(v, "")))
                    .collect();
                self.backend.create_edge(src, label, dst, deduped).await?;
            }
            Some(edge) => {
                for (key, value) in properties {
                    let merged = match edge.properties.get(key) {
                        Some(existing) => merge_comma_set(value, existing),
                        None => merge_comma_set(value, ""),
                    };
                    self.backend
                        .set_edge_property(&edge.id, key, &merged)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Self path plus simple paths of length <= N ending at an interested
    /// vertex, rendered human-readable.
    pub async fn find_within_n_hops(
        &self,
        label: &str,
        name: &str,
        properties: Value,
        edge_hints: Value,
        n: u32,
    ) -> Result<Vec<PathHit>> {
        let Some(id) = self.resolve(label, name, &properties, &edge_hints).await? else {
            return Ok(Vec::new());
        };
        let paths = self.backend.paths_to_interested(&id, n).await?;
        Ok(format_paths(&paths))
    }

    pub async fn get_entities(&self) -> Result<Vec<EntitySummary>> {
        let vertices = self.backend.all_vertices().await?;
        Ok(vertices
            .into_iter()
            .map(|v| EntitySummary {
                interested: v
                    .properties
                    .get(PROP_INTERESTED)
                    .cloned()
                    .unwrap_or_else(|| "NO".to_string()),
                id: v.id,
                label: v.label,
                name: v.name,
            })
            .collect())
    }

    pub async fn update_interested(&self, id: &VertexId, interested: &str) -> Result<()> {
        self.backend
            .set_vertex_property(id, PROP_INTERESTED, interested)
            .await?;
        Ok(())
    }

    /// Drop the entire graph. Returns the deleted (vertex, edge) counts.
    pub async fn purge(&self) -> Result<(usize, usize)> {
        let (vertices, edges) = self.backend.purge().await?;
        info!(vertices, edges, "graph purged");
        Ok((vertices, edges))
    }
}

/// Attributes rendered the way the disambiguator sees them: a list of
/// single-key objects.
fn attributes_as_json(attributes: &[(String, String)]) -> Value {
    Value::Array(
        attributes
            .iter()
            .map(|(k, v)| json!({ k.clone(): v.clone() }))
            .collect(),
    )
}

/// Union two comma-joined value sets: split, trim, drop empties, dedup,
/// rejoin in stable order.
fn merge_comma_set(a: &str, b: &str) -> String {
    let mut tokens: Vec<String> = a
        .split(',')
        .chain(b.split(','))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens.join(",")
}

fn render_context_edge(vertex_name: &str, edge: &crate::graph::EdgeView, other: &str, outgoing: bool) -> String {
    let props: Vec<String> = edge
        .properties
        .iter()
        .filter(|(k, _)| k.as_str() != PROP_NAME)
        .map(|(k, v)| format!("{k}:{v}"))
        .collect();
    let rendered_props = if props.is_empty() {
        String::new()
    } else {
        format!("({})", props.join(","))
    };
    if outgoing {
        format!("{vertex_name} -> {} {rendered_props} -> {other}", edge.label)
    } else {
        format!("{other} -> {} {rendered_props} -> {vertex_name}", edge.label)
    }
}

/// Render backend paths as `A --> label(props) --> B` strings with the
/// terminal interested entity name.
fn format_paths(paths: &[Vec<PathElement>]) -> Vec<PathHit> {
    let mut hits = Vec::with_capacity(paths.len());
    for path in paths {
        let mut rendered = String::new();
        let mut last_vertex = String::new();
        for (index, element) in path.iter().enumerate() {
            match element {
                PathElement::Vertex(vertex) => {
                    rendered.push_str(&vertex.name);
                    if index < path.len() - 1 {
                        if let Some(PathElement::Edge(next)) = path.get(index + 1) {
                            rendered.push_str(arrow(next.dst == vertex.id));
                        }
                    } else {
                        last_vertex = vertex.name.clone();
                    }
                }
                PathElement::Edge(edge) => {
                    rendered.push_str(&edge.label);
                    let props: Vec<String> = edge
                        .properties
                        .iter()
                        .filter(|(k, _)| k.as_str() != HIDDEN_PATH_PROP)
                        .map(|(k, v)| format!("{k}:{v}"))
                        .collect();
                    if !props.is_empty() {
                        rendered.push_str(&format!(" ({})", props.join(",")));
                    }
                    let previous_id = match index.checked_sub(1).and_then(|i| path.get(i)) {
                        Some(PathElement::Vertex(v)) => v.id.as_str(),
                        _ => "",
                    };
                    rendered.push_str(arrow(edge.dst == previous_id));
                }
            }
        }
        hits.push(PathHit {
            path: rendered,
            interested_entity: last_vertex,
        });
    }
    hits
}

fn arrow(points_back: bool) -> &'static str {
    if points_back {
        " <-- "
    } else {
        " --> "
    }
}
