//! Append-only prompt audit log.
//!
//! Every prompt/completion transcript is recorded with a 24 h TTL so
//! operators can inspect what the model was asked. Audit failures never fail
//! the caller.

use chrono::Utc;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::store::{KvStore, KvTable, TABLE_PROMPTS};

#[derive(Clone)]
pub struct PromptAudit {
    table: KvTable,
    ttl_secs: i64,
}

impl PromptAudit {
    pub fn new(store: &KvStore, ttl_secs: i64) -> Self {
        Self {
            table: store.table(TABLE_PROMPTS),
            ttl_secs,
        }
    }

    /// Record a transcript under `<id><uuid>`.
    pub fn save(&self, id: &str, prompt: &str) {
        let key = format!("{id}{}", Uuid::new_v4());
        let item = json!({
            "id": key,
            "prompt": prompt,
            "timestamp": Utc::now().format("%Y-%m-%d %H:%M").to_string(),
        });
        if let Err(e) = self.table.put(&key, &item, Some(self.ttl_secs)) {
            warn!("failed to record prompt audit entry: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_with_prefix_and_ttl() {
        let store = KvStore::in_memory();
        let audit = PromptAudit::new(&store, 86400);
        audit.save("ACME CORP->summary->", "Human: hi");
        let rows = store.table(TABLE_PROMPTS).scan();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].0.starts_with("ACME CORP->summary->"));
        assert_eq!(rows[0].1["prompt"], "Human: hi");
    }
}
