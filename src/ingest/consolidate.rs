//! Cross-chunk consolidation.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::ingest::records::{ConsolidatedRecords, RawRecordSet};
use crate::llm::uppercase_json;
use crate::store::KvTable;

/// Scratch ids of the four persisted buckets.
#[derive(Debug, Clone)]
pub struct ConsolidatedIds {
    pub customers: String,
    pub suppliers_or_partners: String,
    pub competitors: String,
    pub directors: String,
}

pub struct Consolidator {
    scratch: KvTable,
    scratch_ttl_secs: i64,
}

impl Consolidator {
    pub fn new(scratch: KvTable, scratch_ttl_secs: i64) -> Self {
        Self {
            scratch,
            scratch_ttl_secs,
        }
    }

    /// Union the per-chunk record sets into the four buckets and persist
    /// each bucket. Chunks that fail to load or parse are logged and
    /// skipped; extraction order does not affect the result.
    pub fn consolidate(
        &self,
        chunk_record_ids: &[String],
    ) -> Result<(ConsolidatedRecords, ConsolidatedIds)> {
        let mut consolidated = ConsolidatedRecords::default();
        for record_id in chunk_record_ids {
            let Some(raw) = self.scratch.get(record_id) else {
                warn!(record_id, "chunk record missing during consolidation, skipping");
                continue;
            };
            match serde_json::from_value::<RawRecordSet>(uppercase_json(raw)) {
                Ok(record_set) => consolidated.absorb(&record_set),
                Err(e) => {
                    warn!(record_id, "chunk record unparsable ({e}), skipping");
                }
            }
        }

        let ids = ConsolidatedIds {
            customers: self.persist("raw_customers", &consolidated.customers)?,
            suppliers_or_partners: self
                .persist("raw_suppliers_or_partners", &consolidated.suppliers_or_partners)?,
            competitors: self.persist("raw_competitors", &consolidated.competitors)?,
            directors: self.persist("raw_directors", &consolidated.directors)?,
        };
        Ok((consolidated, ids))
    }

    fn persist<T: Serialize>(&self, bucket_type: &str, data: &T) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let item = serde_json::json!({
            "type": bucket_type,
            "data": data,
        });
        self.scratch.put(&id, &item, Some(self.scratch_ttl_secs))?;
        Ok(id)
    }

    /// Load a persisted bucket's data payload.
    pub fn load_bucket<T: DeserializeOwned + Default>(&self, id: &str) -> Result<T> {
        let item = self.scratch.get_typed::<serde_json::Value>(id)?;
        let data = item.get("data").cloned().unwrap_or_default();
        Ok(serde_json::from_value(data)?)
    }
}
