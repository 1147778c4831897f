//! Document ingestion pipeline stages.
//!
//! A document flows chunker -> extractor (per chunk) -> consolidator ->
//! filter (per bucket) -> graph writer, with all intermediate state in the
//! scratch table. The orchestrator in [`crate::pipeline`] wires the stages
//! together.

pub mod chunker;
pub mod consolidate;
pub mod extractor;
pub mod filter;
pub mod records;
pub mod writer;

pub use chunker::{Chunker, ChunkOutput, StoredChunk};
pub use consolidate::Consolidator;
pub use extractor::ChunkExtractor;
pub use filter::RecordFilter;
pub use records::{ConsolidatedRecords, DocumentSummary, RawRecordSet};
pub use writer::{FinalBucketIds, GraphWriter, WriteReport};
