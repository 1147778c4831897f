//! Graph access layer
//!
//! Idempotent vertex/edge writes, fuzzy name lookup, LLM-assisted entity
//! disambiguation and N-hop path enumeration over an opaque property-graph
//! backend.

pub mod access;
pub mod backend;
pub mod memory;
pub mod names;

pub use access::{EntitySummary, GraphAccess, PathHit};
pub use backend::{EdgeView, GraphBackend, NameMatch, PathElement, VertexId, VertexView};
pub use memory::MemoryGraph;
pub use names::{acronym, acronym_pattern, clean_name, sub_name};

/// Vertex label for companies and organisations.
pub const LABEL_COMPANY: &str = "COMPANY";
/// Vertex label for people.
pub const LABEL_PERSON: &str = "PERSON";
/// Property marking user-curated entities; path searches terminate here.
pub const PROP_INTERESTED: &str = "INTERESTED";
/// Normalized display-name property present on every vertex.
pub const PROP_NAME: &str = "NAME";
