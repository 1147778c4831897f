//! Persisted state: KV tables with TTL semantics, the blob store and
//! user-tunable settings.

pub mod blob;
pub mod kv;
pub mod settings;

pub use blob::{BlobStore, LocalBlobStore};
pub use kv::{KvStore, KvTable};
pub use settings::Settings;

/// Per-execution ingestion scratch records (TTL 2 h).
pub const TABLE_INGESTION: &str = "ingestion";
/// Processed news records (no TTL).
pub const TABLE_NEWS: &str = "news";
/// Key-value settings such as the hop radius N.
pub const TABLE_SETTINGS: &str = "settings";
/// Append-only prompt audit (TTL 24 h).
pub const TABLE_PROMPTS: &str = "prompts";
/// Ingestion/news progress records (no TTL).
pub const TABLE_PROCESSING_STATUS: &str = "processing_status";
